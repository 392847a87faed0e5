//! Player-related type definitions
//!
//! Supporting types for player state and error classification.

use serde::{Deserialize, Serialize};

/// Chunked player state
///
/// - `Idle`: nothing queued, nothing playing
/// - `Buffering`: at least one segment queued, debounce timer pending
/// - `Playing`: one segment handed to the sink
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Idle,
    Buffering,
    Playing,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::Playing => write!(f, "playing"),
        }
    }
}

/// Classification carried by `PlayerEvent::Error`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerErrorKind {
    /// Payload could not be turned into a segment; segment dropped
    Decode,
    /// Sink failed to render a segment; skipped
    Playback,
}

impl std::fmt::Display for PlayerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerErrorKind::Decode => write!(f, "decode"),
            PlayerErrorKind::Playback => write!(f, "playback"),
        }
    }
}
