//! Segment preparation off the player task
//!
//! `SegmentPreparer` owns one decoder thread. Segments are submitted as they
//! are queued and decoded to device-format PCM in arrival order, so by the
//! time the player hands a segment over its samples are usually waiting.
//!
//! A segment asked for before it is ready jumps to the front of the job
//! queue, and its samples are delivered from the decoder thread the moment
//! they exist.

use super::output::{prepare_segment, OutputFormat};
use crate::error::{Error, Result};
use crate::playback::{AudioSegment, PlaybackTicket, SinkSignals};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// A hand-off that arrived before its samples were ready
pub struct Handoff {
    pub ticket: PlaybackTicket,
    pub signals: SinkSignals,
}

struct Job {
    generation: u64,
    segment: AudioSegment,
}

#[derive(Default)]
struct PrepareState {
    jobs: VecDeque<Job>,
    /// Prepared samples by segment sequence
    ready: HashMap<u64, Result<Vec<f32>>>,
    /// Sequences queued or being decoded
    in_flight: HashSet<u64>,
    waiting: Option<Handoff>,
    /// Bumped by `discard`; results from an older generation are dropped
    generation: u64,
    stopping: bool,
}

struct Shared {
    state: Mutex<PrepareState>,
    condvar: Condvar,
    decoded: AtomicUsize,
}

fn lock(shared: &Shared) -> MutexGuard<'_, PrepareState> {
    shared.state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decoder thread plus the samples it has prepared
pub struct SegmentPreparer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl SegmentPreparer {
    /// Start the decoder thread.
    ///
    /// `deliver` receives late hand-offs together with their samples (or the
    /// decode error). It runs on the decoder thread with the preparer's lock
    /// held, so `cancel_pending` and `discard` never race a delivery.
    pub fn spawn<F>(format: OutputFormat, deliver: F) -> Result<Self>
    where
        F: Fn(Handoff, Result<Vec<f32>>) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(PrepareState::default()),
            condvar: Condvar::new(),
            decoded: AtomicUsize::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("v2v-decoder".to_string())
            .spawn(move || worker_loop(worker_shared, format, deliver))
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn decoder thread: {}", e)))?;

        debug!(
            "Segment decoder started ({}Hz, {} channels)",
            format.sample_rate, format.channels
        );

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Queue `segment` for decoding unless it is already ready or pending
    pub fn prefetch(&self, segment: &AudioSegment) {
        let mut state = lock(&self.shared);
        let sequence = segment.sequence();
        if state.ready.contains_key(&sequence) || !state.in_flight.insert(sequence) {
            return;
        }

        let generation = state.generation;
        state.jobs.push_back(Job {
            generation,
            segment: segment.clone(),
        });
        drop(state);
        self.shared.condvar.notify_one();
    }

    /// Take the prepared samples for `ticket`.
    ///
    /// Returns `None` when they are not ready yet; the hand-off is then parked
    /// and passed to `deliver` once the decoder gets to it. Only one hand-off
    /// is parked at a time.
    pub fn take(
        &self,
        ticket: PlaybackTicket,
        segment: AudioSegment,
        signals: &SinkSignals,
    ) -> Option<Result<Vec<f32>>> {
        let mut state = lock(&self.shared);
        let sequence = segment.sequence();

        if let Some(prepared) = state.ready.remove(&sequence) {
            return Some(prepared);
        }

        if let Some(previous) = state.waiting.take() {
            warn!("Hand-off {} replaced before its samples were ready", previous.ticket);
        }
        state.waiting = Some(Handoff {
            ticket,
            signals: signals.clone(),
        });

        // Needed now: move it ahead of segments that are only queued
        let job = match state.jobs.iter().position(|j| j.segment.sequence() == sequence) {
            Some(index) => state.jobs.remove(index),
            None => None,
        };
        let job = match job {
            Some(job) => Some(job),
            None if state.in_flight.insert(sequence) => Some(Job {
                generation: state.generation,
                segment,
            }),
            // Already on the decoder
            None => None,
        };
        if let Some(job) = job {
            state.jobs.push_front(job);
        }

        debug!("Segment {} not prepared yet, waiting on decoder", ticket);
        drop(state);
        self.shared.condvar.notify_one();
        None
    }

    /// Drop the parked hand-off, if any
    pub fn cancel_pending(&self) {
        if let Some(handoff) = lock(&self.shared).waiting.take() {
            debug!("Cancelled pending hand-off {}", handoff.ticket);
        }
    }

    /// Forget every prepared and pending segment
    pub fn discard(&self) {
        let mut state = lock(&self.shared);
        state.generation += 1;
        state.jobs.clear();
        state.ready.clear();
        state.in_flight.clear();
        state.waiting = None;
    }

    pub fn is_ready(&self, sequence: u64) -> bool {
        lock(&self.shared).ready.contains_key(&sequence)
    }

    /// Number of segments decoded so far
    pub fn decoded_count(&self) -> usize {
        self.shared.decoded.load(Ordering::Acquire)
    }

    /// Stop the decoder thread; a decode in progress is finished first
    pub fn shutdown(&mut self) {
        lock(&self.shared).stopping = true;
        self.shared.condvar.notify_all();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Decoder thread panicked");
            }
        }
    }
}

impl Drop for SegmentPreparer {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

fn worker_loop<F>(shared: Arc<Shared>, format: OutputFormat, deliver: F)
where
    F: Fn(Handoff, Result<Vec<f32>>),
{
    debug!("Decoder thread started");

    loop {
        let job = {
            let mut state = lock(&shared);
            loop {
                if state.stopping {
                    debug!("Decoder thread exiting");
                    return;
                }
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                state = shared
                    .condvar
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let sequence = job.segment.sequence();
        let result = prepare_segment(&job.segment, format);
        shared.decoded.fetch_add(1, Ordering::Release);

        match &result {
            Ok(samples) => debug!("Segment {} prepared: {} samples", sequence, samples.len()),
            Err(e) => warn!("Segment {} failed to prepare: {}", sequence, e),
        }

        let mut state = lock(&shared);
        if state.generation != job.generation {
            debug!("Discarding segment {} prepared for a cleared queue", sequence);
            continue;
        }
        state.in_flight.remove(&sequence);

        match state.waiting.take() {
            Some(handoff) if handoff.ticket.sequence == sequence => deliver(handoff, result),
            other => {
                state.waiting = other;
                state.ready.insert(sequence, result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{EncodedAudio, SinkSignal};
    use std::sync::mpsc as std_mpsc;
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    const FORMAT: OutputFormat = OutputFormat {
        sample_rate: 16000,
        channels: 1,
    };

    fn wav_segment(sequence: u64, frames: u32) -> AudioSegment {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: FORMAT.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                writer.write_sample(((i % 100) as i16 - 50) * 100).unwrap();
            }
            writer.finalize().unwrap();
        }
        let payload = EncodedAudio::binary(cursor.into_inner(), "audio/wav")
            .decode()
            .unwrap();
        AudioSegment::new(sequence, payload)
    }

    fn broken_segment(sequence: u64) -> AudioSegment {
        let mut bytes = wav_segment(sequence, 100).bytes().to_vec();
        bytes.truncate(20);
        AudioSegment::new(
            sequence,
            EncodedAudio::binary(bytes, "audio/wav").decode().unwrap(),
        )
    }

    fn ticket(sequence: u64) -> PlaybackTicket {
        PlaybackTicket {
            session: 0,
            sequence,
        }
    }

    type Delivered = std_mpsc::Receiver<(PlaybackTicket, Result<Vec<f32>>)>;

    fn preparer() -> (SegmentPreparer, Delivered) {
        let (tx, rx) = std_mpsc::channel();
        let preparer = SegmentPreparer::spawn(FORMAT, move |handoff, result| {
            let _ = tx.send((handoff.ticket, result));
        })
        .unwrap();
        (preparer, rx)
    }

    fn signals() -> SinkSignals {
        let (tx, _rx) = mpsc::unbounded_channel::<SinkSignal>();
        SinkSignals::new(tx)
    }

    fn wait_ready(preparer: &SegmentPreparer, sequence: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !preparer.is_ready(sequence) {
            assert!(Instant::now() < deadline, "segment {} never prepared", sequence);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_prefetched_segment_is_taken_without_decoding() {
        let (preparer, delivered) = preparer();
        let segment = wav_segment(0, 1600);

        preparer.prefetch(&segment);
        wait_ready(&preparer, 0);
        assert_eq!(preparer.decoded_count(), 1);

        let samples = preparer
            .take(ticket(0), segment, &signals())
            .expect("prepared samples")
            .unwrap();
        assert_eq!(samples.len(), 1600);

        // Hand-off did no decode work of its own and parked nothing
        assert_eq!(preparer.decoded_count(), 1);
        assert!(delivered.try_recv().is_err());
        assert!(!preparer.is_ready(0));
    }

    #[test]
    fn test_prefetch_twice_decodes_once() {
        let (preparer, _delivered) = preparer();
        let segment = wav_segment(4, 800);

        preparer.prefetch(&segment);
        preparer.prefetch(&segment);
        wait_ready(&preparer, 4);
        preparer.prefetch(&segment);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(preparer.decoded_count(), 1);
    }

    #[test]
    fn test_unprepared_segment_is_delivered_later() {
        let (preparer, delivered) = preparer();

        let taken = preparer.take(ticket(2), wav_segment(2, 400), &signals());
        assert!(taken.is_none());

        let (delivered_ticket, result) = delivered
            .recv_timeout(Duration::from_secs(5))
            .expect("late delivery");
        assert_eq!(delivered_ticket, ticket(2));
        assert_eq!(result.unwrap().len(), 400);
        assert!(!preparer.is_ready(2));
    }

    #[test]
    fn test_prepare_failure_is_returned_on_take() {
        let (preparer, _delivered) = preparer();
        let segment = broken_segment(1);

        preparer.prefetch(&segment);
        wait_ready(&preparer, 1);
        let taken = preparer.take(ticket(1), segment, &signals());
        assert!(matches!(taken, Some(Err(_))));
    }

    #[test]
    fn test_discard_drops_prepared_samples() {
        let (preparer, _delivered) = preparer();
        let segment = wav_segment(0, 400);

        preparer.prefetch(&segment);
        wait_ready(&preparer, 0);
        preparer.discard();
        assert!(!preparer.is_ready(0));

        // Has to be decoded again
        assert!(preparer.take(ticket(0), segment, &signals()).is_none());
    }

    #[test]
    fn test_shutdown_joins_decoder_thread() {
        let (mut preparer, _delivered) = preparer();
        preparer.prefetch(&wav_segment(0, 100));
        preparer.shutdown();
        assert!(preparer.thread.is_none());
    }
}
