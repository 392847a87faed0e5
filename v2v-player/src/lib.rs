//! # Voice-to-voice chunked audio player (v2v-player)
//!
//! Plays the audio half of a voice conversation as it streams in: short
//! encoded segments are buffered briefly, then played back to back in the
//! order they arrived, with lifecycle events published on an `EventBus`.
//!
//! **Architecture:** pure `PlaybackMachine` driven by a tokio task; platform
//! output through symphonia + rubato + cpal behind the `PlaybackSink` trait.

pub mod audio;
pub mod config;
pub mod error;
pub mod input;
pub mod playback;

pub use error::{DecodeError, Error, Result};
pub use playback::{ChunkedAudioPlayer, EncodedAudio, PlaybackSink};
