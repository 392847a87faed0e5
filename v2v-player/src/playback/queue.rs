//! Playback queue
//!
//! FIFO of decoded segments. Insertion order is playback order; the only
//! mutations are append, pop-front and clear.

use super::segment::AudioSegment;
use std::collections::VecDeque;

/// Ordered segments waiting for the sink
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    segments: VecDeque<AudioSegment>,
}

impl PlaybackQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
        }
    }

    /// Append a segment at the back
    pub fn enqueue(&mut self, segment: AudioSegment) {
        self.segments.push_back(segment);
    }

    /// Remove and return the front segment
    ///
    /// Each segment leaves the queue exactly once, right before it is handed
    /// to playback.
    pub fn dequeue_next(&mut self) -> Option<AudioSegment> {
        self.segments.pop_front()
    }

    /// Segment that would play next
    pub fn peek(&self) -> Option<&AudioSegment> {
        self.segments.front()
    }

    /// Sequence numbers in playback order
    pub fn sequences(&self) -> Vec<u64> {
        self.segments.iter().map(AudioSegment::sequence).collect()
    }

    /// Drop all queued segments, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.segments.len();
        self.segments.clear();
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }
}
