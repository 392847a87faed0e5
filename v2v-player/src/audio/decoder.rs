//! Segment decoder using symphonia
//!
//! Decodes one in-memory segment (WAV, Ogg Vorbis, WebM/Matroska, FLAC, MP3,
//! AAC/MP4, and whatever else symphonia's default registry knows) to interleaved f32 PCM.

use crate::error::{Error, Result};
use crate::playback::AudioSegment;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decoded PCM for one segment
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Stateless symphonia front end
pub struct SegmentDecoder;

impl SegmentDecoder {
    /// Decode a whole segment to PCM.
    ///
    /// The container is probed with a hint taken from the segment's MIME type.
    /// Corrupt packets are skipped; a segment that yields no samples at all is
    /// an error.
    pub fn decode(segment: &AudioSegment) -> Result<PcmAudio> {
        Self::decode_bytes(segment.bytes().to_vec(), segment.container().extension())
    }

    /// Decode raw container bytes, optionally hinting the file extension
    pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<PcmAudio> {
        debug!("Decoding {} bytes (hint: {:?})", bytes.len(), extension);

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Playback(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Playback("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|c| c.count() as u16);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Playback(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate.get_or_insert(spec.rate);
                    channels.get_or_insert(spec.channels.count() as u16);

                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Playback(format!("Decode failed: {}", e)));
                }
            }
        }

        let sample_rate =
            sample_rate.ok_or_else(|| Error::Playback("Sample rate not found".to_string()))?;
        let channels =
            channels.ok_or_else(|| Error::Playback("Channel count not found".to_string()))?;

        if samples.is_empty() {
            return Err(Error::Playback("Segment contains no audio".to_string()));
        }

        let pcm = PcmAudio {
            samples,
            sample_rate,
            channels,
        };
        debug!(
            "Decoded {} frames at {}Hz, {} channels ({}ms)",
            pcm.frames(),
            pcm.sample_rate,
            pcm.channels,
            pcm.duration_ms()
        );
        Ok(pcm)
    }
}
