//! Audio output using cpal
//!
//! `CpalSink` keeps a single output stream open for its whole life. The
//! stream lives on a dedicated thread (cpal streams are not `Send` on every
//! platform). Segments are decoded ahead of time on the `SegmentPreparer`
//! thread; a hand-off from the player only swaps prepared samples into the
//! shared feed slot, and the audio callback reports back through
//! `SinkSignals` when the slot runs dry.

use super::decoder::SegmentDecoder;
use super::prefetch::{Handoff, SegmentPreparer};
use super::resampler::Resampler;
use crate::config::clamp_volume;
use crate::error::{Error, Result};
use crate::playback::{AudioSegment, PlaybackSink, PlaybackTicket, SinkSignals};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Device format every segment is converted to before playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Segment currently being rendered by the callback
struct ActiveSegment {
    ticket: PlaybackTicket,
    samples: Vec<f32>,
    position: usize,
    signals: SinkSignals,
}

/// Slot shared between the player and the audio callback
#[derive(Default)]
struct Feed {
    active: Option<ActiveSegment>,
}

type SharedFeed = Arc<Mutex<Feed>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Playback sink backed by the platform audio device
pub struct CpalSink {
    feed: SharedFeed,
    volume: Arc<Mutex<f32>>,
    format: OutputFormat,
    device_name: String,
    preparer: SegmentPreparer,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the output device and start the (silent) stream.
    ///
    /// A named device that cannot be found falls back to the default device.
    /// Blocks until the output thread has the stream running or has failed.
    pub fn open(device_name: Option<String>, volume: f32) -> Result<Self> {
        let feed: SharedFeed = Arc::new(Mutex::new(Feed::default()));
        let volume = Arc::new(Mutex::new(clamp_volume(volume)));

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(OutputFormat, String)>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_feed = Arc::clone(&feed);
        let thread_volume = Arc::clone(&volume);
        let thread = thread::Builder::new()
            .name("v2v-output".to_string())
            .spawn(move || {
                match open_stream(device_name, thread_feed, thread_volume) {
                    Ok((stream, format, name)) => {
                        let _ = ready_tx.send(Ok((format, name)));
                        // Hold the stream until shutdown (or the sink is dropped)
                        let _ = stop_rx.recv();
                        if let Err(e) = stream.pause() {
                            debug!("Failed to pause stream on shutdown: {}", e);
                        }
                        drop(stream);
                        debug!("Output thread exiting");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let (format, device_name) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during startup".to_string()))??;

        let deliver_feed = Arc::clone(&feed);
        let preparer = SegmentPreparer::spawn(format, move |handoff: Handoff, prepared| {
            match prepared {
                Ok(samples) => install(&deliver_feed, handoff.ticket, samples, handoff.signals),
                Err(e) => handoff.signals.failed(handoff.ticket, e.to_string()),
            }
        })?;

        info!(
            "Audio output ready: {} ({}Hz, {} channels)",
            device_name, format.sample_rate, format.channels
        );

        Ok(Self {
            feed,
            volume,
            format,
            device_name,
            preparer,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Set output volume (clamped to 0.0..=1.0)
    pub fn set_volume(&self, volume: f32) {
        let clamped = clamp_volume(volume);
        *lock(&self.volume) = clamped;
        debug!("Volume set to {:.2}", clamped);
    }

    pub fn volume(&self) -> f32 {
        *lock(&self.volume)
    }
}

/// Decode a segment and convert it to the device format
pub fn prepare_segment(segment: &AudioSegment, format: OutputFormat) -> Result<Vec<f32>> {
    let pcm = SegmentDecoder::decode(segment)?;
    let remapped = Resampler::remap_channels(&pcm.samples, pcm.channels, format.channels);
    Resampler::resample(&remapped, pcm.sample_rate, format.sample_rate, format.channels)
}

impl PlaybackSink for CpalSink {
    fn play(
        &mut self,
        ticket: PlaybackTicket,
        segment: AudioSegment,
        signals: SinkSignals,
    ) -> Result<()> {
        match self.preparer.take(ticket, segment, &signals) {
            Some(prepared) => {
                install(&self.feed, ticket, prepared?, signals);
            }
            None => debug!("Segment {} starts once decoded", ticket),
        }
        Ok(())
    }

    fn prepare(&mut self, segment: &AudioSegment) {
        self.preparer.prefetch(segment);
    }

    fn discard_prepared(&mut self) {
        self.preparer.discard();
    }

    fn stop(&mut self) {
        self.preparer.cancel_pending();
        if let Some(active) = lock(&self.feed).active.take() {
            debug!(
                "Stopped segment {} at {}/{} samples",
                active.ticket,
                active.position,
                active.samples.len()
            );
        }
    }

    fn shutdown(&mut self) {
        self.stop();
        self.preparer.shutdown();
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Output thread panicked");
            }
        }
        info!("Audio output closed");
    }
}

/// Make `samples` the segment the callback renders next
fn install(feed: &SharedFeed, ticket: PlaybackTicket, samples: Vec<f32>, signals: SinkSignals) {
    debug!("Segment {} handed to output: {} samples", ticket, samples.len());

    let mut feed = lock(feed);
    if let Some(previous) = feed.active.take() {
        warn!("Segment {} replaced before it finished", previous.ticket);
    }
    feed.active = Some(ActiveSegment {
        ticket,
        samples,
        position: 0,
        signals,
    });
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

/// Runs on the output thread: pick a device, build and start the stream
fn open_stream(
    device_name: Option<String>,
    feed: SharedFeed,
    volume: Arc<Mutex<f32>>,
) -> Result<(Stream, OutputFormat, String)> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name.as_deref())?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, feed, volume)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, feed, volume)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, feed, volume)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    let format = OutputFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };
    Ok((stream, format, name))
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<Device> {
    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }

        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    feed: SharedFeed,
    volume: Arc<Mutex<f32>>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let error_feed = Arc::clone(&feed);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let gain = *lock(&volume);
                let mut feed = lock(&feed);
                fill_buffer(data, &mut feed, gain);
            },
            move |err| {
                error!("Audio stream error: {}", err);
                if let Some(active) = lock(&error_feed).active.take() {
                    active
                        .signals
                        .failed(active.ticket, format!("Audio stream error: {}", err));
                }
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

/// Copy samples from the active segment into `data`, padding with silence.
///
/// Reports `finished` the moment the active segment's last sample is written.
fn fill_buffer<T>(data: &mut [T], feed: &mut Feed, gain: f32)
where
    T: SizedSample + FromSample<f32>,
{
    let mut written = 0;

    if let Some(active) = feed.active.as_mut() {
        let remaining = &active.samples[active.position..];
        let count = remaining.len().min(data.len());

        for (out, sample) in data.iter_mut().zip(remaining) {
            *out = T::from_sample((sample * gain).clamp(-1.0, 1.0));
        }
        active.position += count;
        written = count;

        if active.position >= active.samples.len() {
            if let Some(done) = feed.active.take() {
                done.signals.finished(done.ticket);
            }
        }
    }

    for out in &mut data[written..] {
        *out = T::EQUILIBRIUM;
    }
}
