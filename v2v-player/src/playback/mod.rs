//! Chunked playback
//!
//! Segments arrive as encoded payloads, wait out a short buffering delay and
//! then play strictly one at a time in arrival order. `PlaybackMachine` holds
//! the rules; `ChunkedAudioPlayer` drives it against a `PlaybackSink`.

pub mod machine;
pub mod player;
pub mod queue;
pub mod segment;
pub mod sink;

pub use machine::{Effect, PlaybackMachine, PlaybackTicket, PlayerSnapshot, DEFAULT_BUFFER_DELAY};
pub use player::ChunkedAudioPlayer;
pub use queue::PlaybackQueue;
pub use segment::{AudioContainer, AudioSegment, EncodedAudio, SegmentPayload};
pub use sink::{NullSink, PlaybackSink, SinkSignal, SinkSignals};
