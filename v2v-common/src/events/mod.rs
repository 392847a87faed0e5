//! Event types for the V2V event system
//!
//! Provides the player event definitions and the EventBus used to fan them
//! out to callers (status display, CLI exit logic, tests).

mod player_types;

pub use player_types::{PlayerErrorKind, PlayerState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Player event types
///
/// Events are broadcast via EventBus and serialize as JSON objects tagged by
/// `type`, so they can be forwarded to a UI unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Player state changed
    StateChanged {
        /// State before the transition
        old_state: PlayerState,
        /// State after the transition
        new_state: PlayerState,
        timestamp: DateTime<Utc>,
    },

    /// A decoded segment was appended to the queue
    SegmentQueued {
        /// Arrival sequence number of the segment
        sequence: u64,
        /// Queue length after the append
        queued: usize,
        timestamp: DateTime<Utc>,
    },

    /// A segment was handed to the sink
    SegmentStarted {
        sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// The sink reported the end of a segment (natural end or skipped after failure)
    SegmentFinished {
        sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// Queue drained and nothing is playing
    ///
    /// Emitted exactly once per transition into `Idle` from `Playing`.
    PlaybackComplete {
        timestamp: DateTime<Utc>,
    },

    /// Decode or playback failure; the pipeline keeps running
    Error {
        kind: PlayerErrorKind,
        /// Sequence of the affected segment, if it got one
        sequence: Option<u64>,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Player was reset; everything from earlier sessions is discarded
    Reset {
        /// Session token now in effect
        session: u64,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Event name as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::SegmentQueued { .. } => "SegmentQueued",
            PlayerEvent::SegmentStarted { .. } => "SegmentStarted",
            PlayerEvent::SegmentFinished { .. } => "SegmentFinished",
            PlayerEvent::PlaybackComplete { .. } => "PlaybackComplete",
            PlayerEvent::Error { .. } => "Error",
            PlayerEvent::Reset { .. } => "Reset",
        }
    }

    /// When the event was created
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PlayerEvent::StateChanged { timestamp, .. }
            | PlayerEvent::SegmentQueued { timestamp, .. }
            | PlayerEvent::SegmentStarted { timestamp, .. }
            | PlayerEvent::SegmentFinished { timestamp, .. }
            | PlayerEvent::PlaybackComplete { timestamp }
            | PlayerEvent::Error { timestamp, .. }
            | PlayerEvent::Reset { timestamp, .. } => *timestamp,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the player)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use v2v_common::events::{EventBus, PlayerEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PlayerEvent::PlaybackComplete {
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(PlayerEvent::PlaybackComplete { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped (the subscriber then sees `Lagged`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
