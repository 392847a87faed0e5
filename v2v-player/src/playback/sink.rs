//! Playback sink interface
//!
//! A sink renders one segment at a time. It reports the outcome
//! asynchronously through `SinkSignals`, tagged with the ticket it was given,
//! from whatever thread it likes (audio callbacks included).

use super::machine::PlaybackTicket;
use super::segment::AudioSegment;
use crate::error::Result;
use tokio::sync::mpsc;
use tracing::debug;

/// Outcome reported by a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSignal {
    /// Segment reached its natural end
    Finished(PlaybackTicket),
    /// Segment could not be rendered
    Failed(PlaybackTicket, String),
}

impl SinkSignal {
    pub fn ticket(&self) -> PlaybackTicket {
        match self {
            SinkSignal::Finished(ticket) | SinkSignal::Failed(ticket, _) => *ticket,
        }
    }
}

/// Handle a sink uses to report back to the player
///
/// Cheap to clone; sending never blocks, so it is safe from real-time
/// audio callbacks. Signals sent after the player is gone are discarded.
#[derive(Debug, Clone)]
pub struct SinkSignals {
    tx: mpsc::UnboundedSender<SinkSignal>,
}

impl SinkSignals {
    pub fn new(tx: mpsc::UnboundedSender<SinkSignal>) -> Self {
        Self { tx }
    }

    pub fn finished(&self, ticket: PlaybackTicket) {
        self.send(SinkSignal::Finished(ticket));
    }

    pub fn failed(&self, ticket: PlaybackTicket, message: impl Into<String>) {
        self.send(SinkSignal::Failed(ticket, message.into()));
    }

    fn send(&self, signal: SinkSignal) {
        if self.tx.send(signal).is_err() {
            debug!("Player gone, dropping sink signal");
        }
    }
}

/// Platform audio output driven by the player, one segment at a time
pub trait PlaybackSink: Send + 'static {
    /// Start rendering `segment`; the sink now owns it
    ///
    /// Returning `Err` counts as a playback failure of this ticket. On `Ok`,
    /// exactly one of `signals.finished` / `signals.failed` should follow,
    /// unless `stop` is called first.
    fn play(
        &mut self,
        ticket: PlaybackTicket,
        segment: AudioSegment,
        signals: SinkSignals,
    ) -> Result<()>;

    /// Abandon the in-flight segment, if any. Late signals are tolerated.
    fn stop(&mut self);

    /// A segment joined the queue; sinks that decode may start on it now
    /// so that `play` has nothing left to do but hand the samples over.
    fn prepare(&mut self, _segment: &AudioSegment) {}

    /// The queue was cleared; forget anything prepared for it
    fn discard_prepared(&mut self) {}

    /// Release device resources when the player shuts down
    fn shutdown(&mut self) {
        self.stop();
    }
}

/// Sink that finishes every segment immediately without producing sound
#[derive(Debug, Default)]
pub struct NullSink {
    played: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments consumed so far
    pub fn played(&self) -> u64 {
        self.played
    }
}

impl PlaybackSink for NullSink {
    fn play(
        &mut self,
        ticket: PlaybackTicket,
        segment: AudioSegment,
        signals: SinkSignals,
    ) -> Result<()> {
        debug!("NullSink consuming segment {} ({} bytes)", ticket.sequence, segment.len());
        self.played += 1;
        signals.finished(ticket);
        Ok(())
    }

    fn stop(&mut self) {}
}
