//! Test helpers for v2v-player integration tests
//!
//! - RecordingSink / SinkProbe: scripted sink with manual finish/fail control
//! - audio_generator: WAV fixtures built with hound

#![allow(dead_code)]

pub mod audio_generator;
pub mod recording_sink;

pub use audio_generator::{sine_wav_bytes, voice_segment_b64, write_sine_wav, VOICE_SAMPLE_RATE};
pub use recording_sink::{recording_sink, RecordingSink, SinkProbe};

use std::time::Duration;
use tokio::sync::broadcast;
use v2v_common::events::PlayerEvent;

/// Let the player task drain everything that is ready.
///
/// Under a paused clock the runtime only advances time once every task is
/// idle, so sleeping one tick is a reliable barrier.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Collect all events currently buffered on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_complete(events: &[PlayerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::PlaybackComplete { .. }))
        .count()
}
