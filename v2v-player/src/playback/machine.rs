//! Chunked playback state machine
//!
//! Pure transition logic for the chunked player: every input event is a
//! method that mutates the machine and returns the effects the caller must
//! carry out (arm/cancel the debounce timer, start/stop the sink, publish
//! events). No clock, no I/O, no sink; the async driver in `player.rs`
//! executes the effects.
//!
//! ```text
//! Idle --enqueue--> Buffering --timer--> Playing --finished, queue empty--> Idle
//!                                        Playing --finished, queue non-empty--> Playing
//! reset: any state --> Idle
//! ```
//!
//! Every timer and every sink hand-off carries the session token in effect
//! when it was issued. `reset` bumps the token, so a timer or sink signal
//! from an earlier session matches nothing and is dropped.

use super::queue::PlaybackQueue;
use super::segment::{AudioSegment, SegmentPayload};
use crate::error::DecodeError;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use v2v_common::events::{PlayerErrorKind, PlayerEvent, PlayerState};

/// Default debounce before the first segment plays
pub const DEFAULT_BUFFER_DELAY: Duration = Duration::from_millis(400);

/// Identifies one hand-off of a segment to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlaybackTicket {
    pub session: u64,
    pub sequence: u64,
}

impl std::fmt::Display for PlaybackTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.session, self.sequence)
    }
}

/// Side effect requested by a transition
#[derive(Debug)]
pub enum Effect {
    /// Arm the one-shot debounce timer; it must report back with `session`
    ArmTimer { session: u64, delay: Duration },
    /// Drop the pending debounce timer
    CancelTimer,
    /// Hand `segment` to the sink; completion must be reported with `ticket`
    StartPlayback {
        ticket: PlaybackTicket,
        segment: AudioSegment,
    },
    /// Let the sink start preparing a queued segment ahead of its turn
    PrepareSegment(AudioSegment),
    /// Stop whatever the sink is rendering
    StopPlayback,
    /// Drop whatever the sink prepared for segments that will never play
    DiscardPrepared,
    /// Publish an event to subscribers
    Emit(PlayerEvent),
}

/// Point-in-time view of the machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    /// Segments waiting in the queue (the playing one is not counted)
    pub queued: usize,
    pub session: u64,
    /// Ticket of the segment currently with the sink
    pub current: Option<PlaybackTicket>,
    pub timer_armed: bool,
}

/// Chunked playback state machine
#[derive(Debug)]
pub struct PlaybackMachine {
    state: PlayerState,
    queue: PlaybackQueue,
    session: u64,
    next_sequence: u64,
    current: Option<PlaybackTicket>,
    timer_armed: bool,
    buffer_delay: Duration,
}

impl PlaybackMachine {
    pub fn new(buffer_delay: Duration) -> Self {
        Self {
            state: PlayerState::Idle,
            queue: PlaybackQueue::new(),
            session: 0,
            next_sequence: 0,
            current: None,
            timer_armed: false,
            buffer_delay,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn current(&self) -> Option<PlaybackTicket> {
        self.current
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_sequences(&self) -> Vec<u64> {
        self.queue.sequences()
    }

    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    pub fn buffer_delay(&self) -> Duration {
        self.buffer_delay
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            state: self.state,
            queued: self.queue.len(),
            session: self.session,
            current: self.current,
            timer_armed: self.timer_armed,
        }
    }

    /// A validated payload arrived
    ///
    /// Appends it to the queue. From `Idle` this moves to `Buffering` and
    /// arms the debounce timer; in `Buffering` or `Playing` no timer is armed.
    pub fn on_enqueue(&mut self, payload: SegmentPayload) -> Vec<Effect> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let segment = AudioSegment::new(sequence, payload);
        debug!(
            "Queued segment {} ({} bytes, {})",
            sequence,
            segment.len(),
            segment.mime_type()
        );
        self.queue.enqueue(segment.clone());

        let mut effects = vec![
            Effect::PrepareSegment(segment),
            Effect::Emit(PlayerEvent::SegmentQueued {
                sequence,
                queued: self.queue.len(),
                timestamp: Utc::now(),
            }),
        ];

        if self.state == PlayerState::Idle {
            self.timer_armed = true;
            effects.push(Effect::ArmTimer {
                session: self.session,
                delay: self.buffer_delay,
            });
            effects.push(self.transition(PlayerState::Buffering));
        }

        effects
    }

    /// A payload failed validation; state and queue are left alone
    pub fn on_decode_failed(&mut self, error: &DecodeError) -> Vec<Effect> {
        warn!("Dropping undecodable payload: {}", error);
        vec![Effect::Emit(PlayerEvent::Error {
            kind: PlayerErrorKind::Decode,
            sequence: None,
            message: error.to_string(),
            timestamp: Utc::now(),
        })]
    }

    /// The debounce timer armed for `session` fired
    pub fn on_timer_fired(&mut self, session: u64) -> Vec<Effect> {
        if session != self.session || !self.timer_armed || self.state != PlayerState::Buffering {
            debug!(
                "Ignoring stale timer (timer session {}, current session {}, state {})",
                session, self.session, self.state
            );
            return Vec::new();
        }

        self.timer_armed = false;

        let mut effects = Vec::new();
        if self.queue.is_empty() {
            effects.push(self.transition(PlayerState::Idle));
            return effects;
        }

        effects.push(self.transition(PlayerState::Playing));
        self.start_next(&mut effects);
        effects
    }

    /// The sink finished rendering the segment behind `ticket`
    pub fn on_playback_finished(&mut self, ticket: PlaybackTicket) -> Vec<Effect> {
        if !self.is_current(ticket) {
            debug!("Ignoring stale finish signal for {}", ticket);
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.finish_current(ticket, &mut effects);
        effects
    }

    /// The sink failed on the segment behind `ticket`; skip to the next one
    pub fn on_playback_failed(&mut self, ticket: PlaybackTicket, message: &str) -> Vec<Effect> {
        if !self.is_current(ticket) {
            debug!("Ignoring stale failure signal for {}: {}", ticket, message);
            return Vec::new();
        }

        warn!("Playback of segment {} failed: {}", ticket.sequence, message);
        let mut effects = vec![Effect::Emit(PlayerEvent::Error {
            kind: PlayerErrorKind::Playback,
            sequence: Some(ticket.sequence),
            message: message.to_string(),
            timestamp: Utc::now(),
        })];
        self.finish_current(ticket, &mut effects);
        effects
    }

    /// Discard everything and return to `Idle` under a new session
    pub fn reset(&mut self) -> Vec<Effect> {
        self.session += 1;
        let dropped = self.queue.clear();

        let mut effects = Vec::new();
        if self.timer_armed {
            self.timer_armed = false;
            effects.push(Effect::CancelTimer);
        }
        let stopped = self.current.take().is_some();
        if stopped {
            effects.push(Effect::StopPlayback);
        }
        if stopped || dropped > 0 {
            effects.push(Effect::DiscardPrepared);
        }
        if self.state != PlayerState::Idle {
            effects.push(self.transition(PlayerState::Idle));
        }

        info!(
            "Player reset: session {} ({} queued segments dropped)",
            self.session, dropped
        );
        effects.push(Effect::Emit(PlayerEvent::Reset {
            session: self.session,
            timestamp: Utc::now(),
        }));
        effects
    }

    fn is_current(&self, ticket: PlaybackTicket) -> bool {
        self.state == PlayerState::Playing && self.current == Some(ticket)
    }

    fn finish_current(&mut self, ticket: PlaybackTicket, effects: &mut Vec<Effect>) {
        self.current = None;
        effects.push(Effect::Emit(PlayerEvent::SegmentFinished {
            sequence: ticket.sequence,
            timestamp: Utc::now(),
        }));

        if self.queue.is_empty() {
            effects.push(self.transition(PlayerState::Idle));
            info!("Playback complete");
            effects.push(Effect::Emit(PlayerEvent::PlaybackComplete {
                timestamp: Utc::now(),
            }));
        } else {
            self.start_next(effects);
        }
    }

    /// Dequeue the front segment and hand it to the sink
    ///
    /// `StartPlayback` is always the last effect of a batch, so a driver can
    /// append the effects of a synchronous sink failure after it.
    fn start_next(&mut self, effects: &mut Vec<Effect>) {
        let Some(segment) = self.queue.dequeue_next() else {
            return;
        };

        let ticket = PlaybackTicket {
            session: self.session,
            sequence: segment.sequence(),
        };
        self.current = Some(ticket);

        info!("Starting segment {} ({} remaining)", ticket.sequence, self.queue.len());
        effects.push(Effect::Emit(PlayerEvent::SegmentStarted {
            sequence: ticket.sequence,
            timestamp: Utc::now(),
        }));
        effects.push(Effect::StartPlayback { ticket, segment });
    }

    fn transition(&mut self, new_state: PlayerState) -> Effect {
        let old_state = self.state;
        self.state = new_state;
        debug!("Player state {} -> {}", old_state, new_state);
        Effect::Emit(PlayerEvent::StateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        })
    }
}

impl Default for PlaybackMachine {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_DELAY)
    }
}
