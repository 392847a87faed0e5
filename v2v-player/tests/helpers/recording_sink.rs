//! Scripted playback sink for driving the player from tests
//!
//! `RecordingSink` never finishes anything on its own. Tests hold a
//! `SinkProbe` and decide when the current segment finishes or fails, which
//! makes ordering and race scenarios deterministic.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use v2v_player::error::{Error, Result};
use v2v_player::playback::{AudioSegment, PlaybackSink, PlaybackTicket, SinkSignals};

#[derive(Default)]
struct Recorder {
    prepared: Vec<u64>,
    discards: usize,
    started: Vec<PlaybackTicket>,
    current: Option<(PlaybackTicket, SinkSignals)>,
    last_signals: Option<SinkSignals>,
    stops: usize,
    reject: HashSet<u64>,
    shut_down: bool,
}

/// Sink half, handed to the player
pub struct RecordingSink {
    recorder: Arc<Mutex<Recorder>>,
}

/// Test half, used to inspect and steer the sink
#[derive(Clone)]
pub struct SinkProbe {
    recorder: Arc<Mutex<Recorder>>,
}

pub fn recording_sink() -> (RecordingSink, SinkProbe) {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    (
        RecordingSink {
            recorder: Arc::clone(&recorder),
        },
        SinkProbe { recorder },
    )
}

impl PlaybackSink for RecordingSink {
    fn play(
        &mut self,
        ticket: PlaybackTicket,
        segment: AudioSegment,
        signals: SinkSignals,
    ) -> Result<()> {
        let mut recorder = self.recorder.lock().unwrap();
        assert_eq!(ticket.sequence, segment.sequence());
        assert!(
            recorder.prepared.contains(&ticket.sequence),
            "segment {} played without being prepared",
            ticket.sequence
        );
        recorder.started.push(ticket);

        if recorder.reject.remove(&ticket.sequence) {
            return Err(Error::Playback(format!(
                "device rejected segment {}",
                ticket.sequence
            )));
        }

        recorder.last_signals = Some(signals.clone());
        recorder.current = Some((ticket, signals));
        Ok(())
    }

    fn prepare(&mut self, segment: &AudioSegment) {
        self.recorder.lock().unwrap().prepared.push(segment.sequence());
    }

    fn discard_prepared(&mut self) {
        self.recorder.lock().unwrap().discards += 1;
    }

    fn stop(&mut self) {
        let mut recorder = self.recorder.lock().unwrap();
        recorder.stops += 1;
        recorder.current = None;
    }

    fn shutdown(&mut self) {
        self.stop();
        self.recorder.lock().unwrap().shut_down = true;
    }
}

impl SinkProbe {
    /// Sequences handed to the sink, in order
    pub fn started(&self) -> Vec<u64> {
        self.recorder
            .lock()
            .unwrap()
            .started
            .iter()
            .map(|t| t.sequence)
            .collect()
    }

    pub fn started_tickets(&self) -> Vec<PlaybackTicket> {
        self.recorder.lock().unwrap().started.clone()
    }

    pub fn current(&self) -> Option<PlaybackTicket> {
        self.recorder.lock().unwrap().current.as_ref().map(|(t, _)| *t)
    }

    /// Sequences the player asked the sink to prepare, in order
    pub fn prepared(&self) -> Vec<u64> {
        self.recorder.lock().unwrap().prepared.clone()
    }

    pub fn discards(&self) -> usize {
        self.recorder.lock().unwrap().discards
    }

    pub fn stops(&self) -> usize {
        self.recorder.lock().unwrap().stops
    }

    pub fn is_shut_down(&self) -> bool {
        self.recorder.lock().unwrap().shut_down
    }

    /// Make `play` return an error for this sequence
    pub fn reject_sequence(&self, sequence: u64) {
        self.recorder.lock().unwrap().reject.insert(sequence);
    }

    /// Report natural end of the current segment
    pub fn finish_current(&self) -> PlaybackTicket {
        let (ticket, signals) = self
            .recorder
            .lock()
            .unwrap()
            .current
            .take()
            .expect("no segment playing");
        signals.finished(ticket);
        ticket
    }

    /// Report a render failure for the current segment
    pub fn fail_current(&self, message: &str) -> PlaybackTicket {
        let (ticket, signals) = self
            .recorder
            .lock()
            .unwrap()
            .current
            .take()
            .expect("no segment playing");
        signals.failed(ticket, message);
        ticket
    }

    /// Send a finished signal for an arbitrary (possibly stale) ticket
    pub fn send_finished(&self, ticket: PlaybackTicket) {
        let signals = self
            .recorder
            .lock()
            .unwrap()
            .last_signals
            .clone()
            .expect("sink never played anything");
        signals.finished(ticket);
    }
}
