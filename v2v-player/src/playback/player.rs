//! Chunked audio player
//!
//! Async driver around `PlaybackMachine`. One spawned task owns the machine,
//! the sink and the debounce timer, and reacts to three kinds of input:
//! commands from `ChunkedAudioPlayer` handles, the timer, and sink signals.
//! Each input is processed to completion before the next is looked at, so the
//! machine needs no locking.

use super::machine::{Effect, PlaybackMachine, PlayerSnapshot};
use super::segment::{EncodedAudio, SegmentPayload};
use super::sink::{PlaybackSink, SinkSignal, SinkSignals};
use crate::error::{DecodeError, Error, Result};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, info};
use v2v_common::events::{EventBus, PlayerEvent};

enum Command {
    Enqueue(SegmentPayload),
    DecodeFailed(DecodeError),
    Reset,
    Snapshot(oneshot::Sender<PlayerSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running chunked player
///
/// Cheap to clone; all clones drive the same player. Dropping every handle
/// shuts the player down.
#[derive(Clone)]
pub struct ChunkedAudioPlayer {
    tx: mpsc::UnboundedSender<Command>,
    events: EventBus,
}

impl ChunkedAudioPlayer {
    /// Spawn the player task on the current tokio runtime
    ///
    /// Events are published on `events`; subscribe before enqueueing to see
    /// everything.
    pub fn spawn<S: PlaybackSink>(sink: S, buffer_delay: Duration, events: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let task = PlayerTask {
            machine: PlaybackMachine::new(buffer_delay),
            sink,
            events: events.clone(),
            signals: SinkSignals::new(signal_tx),
            timer: None,
        };
        tokio::spawn(task.run(rx, signal_rx));

        debug!("Chunked player started (buffer delay {:?})", buffer_delay);
        Self { tx, events }
    }

    /// Decode `payload` and append it to the playback queue
    ///
    /// Returns immediately; playback is driven by the timer and the sink. A
    /// payload that fails to decode is dropped, reported as an `Error` event
    /// and returned as `Error::Decode`; nothing else changes.
    pub fn enqueue(&self, payload: EncodedAudio) -> Result<()> {
        match payload.decode() {
            Ok(decoded) => self.send(Command::Enqueue(decoded)),
            Err(e) => {
                self.send(Command::DecodeFailed(e.clone()))?;
                Err(Error::Decode(e))
            }
        }
    }

    /// Clear the queue, cancel the timer, stop playback and return to `Idle`
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Current state, queue length and session
    pub async fn snapshot(&self) -> Result<PlayerSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Snapshot(reply_tx))?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Stop playback, release the sink and end the player task
    pub async fn shutdown(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Shutdown(ack_tx))?;
        ack_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Receive all events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::ChannelClosed)
    }
}

struct PlayerTask<S> {
    machine: PlaybackMachine,
    sink: S,
    events: EventBus,
    signals: SinkSignals,
    /// Pending debounce timer and the session it was armed for
    timer: Option<(u64, Pin<Box<Sleep>>)>,
}

impl<S: PlaybackSink> PlayerTask<S> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut sink_signals: mpsc::UnboundedReceiver<SinkSignal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        self.sink.shutdown();
                        break;
                    }
                },
                Some(signal) = sink_signals.recv() => self.handle_signal(signal),
                session = wait_timer(&mut self.timer) => {
                    self.timer = None;
                    let effects = self.machine.on_timer_fired(session);
                    self.apply(effects);
                }
            }
        }

        info!("Chunked player stopped");
    }

    /// Returns false once the player should stop
    fn handle_command(&mut self, command: Command) -> bool {
        let effects = match command {
            Command::Enqueue(payload) => self.machine.on_enqueue(payload),
            Command::DecodeFailed(error) => self.machine.on_decode_failed(&error),
            Command::Reset => self.machine.reset(),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.machine.snapshot());
                return true;
            }
            Command::Shutdown(ack) => {
                self.sink.shutdown();
                let _ = ack.send(());
                return false;
            }
        };
        self.apply(effects);
        true
    }

    fn handle_signal(&mut self, signal: SinkSignal) {
        let effects = match signal {
            SinkSignal::Finished(ticket) => self.machine.on_playback_finished(ticket),
            SinkSignal::Failed(ticket, message) => {
                self.machine.on_playback_failed(ticket, &message)
            }
        };
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        let mut pending: VecDeque<Effect> = effects.into();

        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::ArmTimer { session, delay } => {
                    self.timer = Some((session, Box::pin(tokio::time::sleep(delay))));
                }
                Effect::CancelTimer => {
                    self.timer = None;
                }
                Effect::StartPlayback { ticket, segment } => {
                    if let Err(e) = self.sink.play(ticket, segment, self.signals.clone()) {
                        pending.extend(self.machine.on_playback_failed(ticket, &e.to_string()));
                    }
                }
                Effect::PrepareSegment(segment) => {
                    self.sink.prepare(&segment);
                }
                Effect::StopPlayback => {
                    self.sink.stop();
                }
                Effect::DiscardPrepared => {
                    self.sink.discard_prepared();
                }
                Effect::Emit(event) => {
                    self.events.emit_lossy(event);
                }
            }
        }
    }
}

/// Resolves with the timer's session when it fires; never resolves if unarmed
async fn wait_timer(timer: &mut Option<(u64, Pin<Box<Sleep>>)>) -> u64 {
    match timer {
        Some((session, sleep)) => {
            sleep.as_mut().await;
            *session
        }
        None => std::future::pending::<u64>().await,
    }
}
