//! Audio payloads and decoded segments
//!
//! An `EncodedAudio` is what the transport hands us: base64 text or raw bytes,
//! tagged with a MIME type. Decoding validates it and yields a
//! `SegmentPayload`; the player then stamps it with an arrival sequence number
//! to form an immutable `AudioSegment`.

use crate::error::DecodeError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use std::sync::Arc;

/// Standard alphabet, padding optional
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encoded audio as received from the producer
#[derive(Clone, PartialEq, Eq)]
pub enum EncodedAudio {
    /// Base64 text, optionally a `data:` URL
    Base64 { data: String, mime_type: String },
    /// Pre-decoded bytes
    Binary { bytes: Vec<u8>, mime_type: String },
}

impl EncodedAudio {
    pub fn base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        EncodedAudio::Base64 {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn binary(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        EncodedAudio::Binary {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Build from a `data:<mime>;base64,<data>` URL, taking the MIME type from the URL
    pub fn from_data_url(url: &str) -> Result<Self, DecodeError> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| DecodeError::InvalidBase64("not a data URL".to_string()))?;

        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| DecodeError::InvalidBase64("data URL has no payload".to_string()))?;

        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| DecodeError::InvalidBase64("data URL is not base64".to_string()))?;

        Ok(Self::base64(data, mime_type))
    }

    /// Declared MIME type, parameters included
    pub fn mime_type(&self) -> &str {
        match self {
            EncodedAudio::Base64 { mime_type, .. } | EncodedAudio::Binary { mime_type, .. } => {
                mime_type
            }
        }
    }

    /// Validate and decode into raw segment bytes
    pub fn decode(self) -> Result<SegmentPayload, DecodeError> {
        let (bytes, mime_type) = match self {
            EncodedAudio::Base64 { data, mime_type } => (decode_base64(&data)?, mime_type),
            EncodedAudio::Binary { bytes, mime_type } => (bytes, mime_type),
        };

        if bytes.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        let container = AudioContainer::from_mime(&mime_type)?;
        container.check_magic(&bytes, &mime_type)?;

        Ok(SegmentPayload { mime_type, bytes })
    }
}

impl std::fmt::Debug for EncodedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodedAudio::Base64 { data, mime_type } => f
                .debug_struct("Base64")
                .field("mime_type", mime_type)
                .field("len", &data.len())
                .finish(),
            EncodedAudio::Binary { bytes, mime_type } => f
                .debug_struct("Binary")
                .field("mime_type", mime_type)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// Decode base64 text, tolerating a `data:` prefix, whitespace and missing padding
fn decode_base64(data: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = data.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, body)| body)
            .ok_or_else(|| DecodeError::InvalidBase64("data URL has no payload".to_string()))?,
        None => trimmed,
    };

    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    LENIENT_BASE64
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

/// Container family derived from the MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContainer {
    Wav,
    Ogg,
    Webm,
    Flac,
    Mp3,
    Mp4,
    /// Some other `audio/*` type; bytes passed through unchecked
    Other,
}

impl AudioContainer {
    /// Classify a MIME type; anything outside `audio/*` is rejected
    pub fn from_mime(mime_type: &str) -> Result<Self, DecodeError> {
        let essence = mime_essence(mime_type);

        let Some(subtype) = essence.strip_prefix("audio/") else {
            return Err(DecodeError::UnsupportedMimeType(mime_type.to_string()));
        };

        let container = match subtype {
            "wav" | "x-wav" | "wave" | "vnd.wave" => AudioContainer::Wav,
            "ogg" | "opus" => AudioContainer::Ogg,
            "webm" => AudioContainer::Webm,
            "flac" | "x-flac" => AudioContainer::Flac,
            "mpeg" | "mp3" => AudioContainer::Mp3,
            "mp4" | "aac" | "x-m4a" | "m4a" => AudioContainer::Mp4,
            "" => return Err(DecodeError::UnsupportedMimeType(mime_type.to_string())),
            _ => AudioContainer::Other,
        };

        Ok(container)
    }

    /// File extension used as a format hint for the decoder
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            AudioContainer::Wav => Some("wav"),
            AudioContainer::Ogg => Some("ogg"),
            AudioContainer::Webm => Some("webm"),
            AudioContainer::Flac => Some("flac"),
            AudioContainer::Mp3 => Some("mp3"),
            AudioContainer::Mp4 => Some("m4a"),
            AudioContainer::Other => None,
        }
    }

    /// Container for a file extension (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(AudioContainer::Wav),
            "ogg" | "oga" | "opus" => Some(AudioContainer::Ogg),
            "webm" => Some(AudioContainer::Webm),
            "flac" => Some(AudioContainer::Flac),
            "mp3" => Some(AudioContainer::Mp3),
            "m4a" | "mp4" | "aac" => Some(AudioContainer::Mp4),
            _ => None,
        }
    }

    /// Canonical MIME type for the container
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioContainer::Wav => "audio/wav",
            AudioContainer::Ogg => "audio/ogg",
            AudioContainer::Webm => "audio/webm",
            AudioContainer::Flac => "audio/flac",
            AudioContainer::Mp3 => "audio/mpeg",
            AudioContainer::Mp4 => "audio/mp4",
            AudioContainer::Other => "application/octet-stream",
        }
    }

    fn check_magic(&self, bytes: &[u8], mime_type: &str) -> Result<(), DecodeError> {
        let malformed = |reason: &str| DecodeError::MalformedContainer {
            mime_type: mime_type.to_string(),
            reason: reason.to_string(),
        };

        match self {
            AudioContainer::Wav => {
                if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
                    return Err(malformed("missing RIFF/WAVE header"));
                }
            }
            AudioContainer::Ogg => {
                if !bytes.starts_with(b"OggS") {
                    return Err(malformed("missing OggS capture pattern"));
                }
            }
            AudioContainer::Webm => {
                if !bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
                    return Err(malformed("missing EBML header"));
                }
            }
            AudioContainer::Flac => {
                if !bytes.starts_with(b"fLaC") {
                    return Err(malformed("missing fLaC marker"));
                }
            }
            AudioContainer::Mp3 | AudioContainer::Mp4 | AudioContainer::Other => {}
        }

        Ok(())
    }
}

/// MIME type without parameters, lowercased (`audio/webm;codecs=opus` -> `audio/webm`)
pub fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Validated bytes waiting for a sequence number
#[derive(Clone, PartialEq, Eq)]
pub struct SegmentPayload {
    mime_type: String,
    bytes: Vec<u8>,
}

impl SegmentPayload {
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for SegmentPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentPayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One decoded unit of audio, immutable once built
///
/// Owned by the queue until handed to the sink. Clones share the encoded
/// bytes, so a sink can start preparing a segment while it is still queued.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioSegment {
    sequence: u64,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl AudioSegment {
    pub fn new(sequence: u64, payload: SegmentPayload) -> Self {
        Self {
            sequence,
            mime_type: payload.mime_type,
            bytes: payload.bytes.into(),
        }
    }

    /// Arrival order, starting at 0 for the first segment a player accepts
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Container family; `Other` if the type is unrecognized
    pub fn container(&self) -> AudioContainer {
        AudioContainer::from_mime(&self.mime_type).unwrap_or(AudioContainer::Other)
    }
}

impl std::fmt::Debug for AudioSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSegment")
            .field("sequence", &self.sequence)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_header() -> Vec<u8> {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&36u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes
    }

    #[test]
    fn test_binary_wav_decodes() {
        let payload = EncodedAudio::binary(wav_header(), "audio/wav").decode().unwrap();
        assert_eq!(payload.mime_type(), "audio/wav");
        assert_eq!(payload.len(), 16);
    }

    #[test]
    fn test_base64_with_data_url_prefix() {
        let encoded = LENIENT_BASE64.encode(wav_header());
        let url = format!("data:audio/wav;base64,{}", encoded);

        let payload = EncodedAudio::base64(url, "audio/wav").decode().unwrap();
        assert_eq!(payload.len(), 16);
    }

    #[test]
    fn test_base64_ignores_whitespace_and_missing_padding() {
        let encoded = LENIENT_BASE64.encode(b"OggS-page");
        let unpadded = encoded.trim_end_matches('=');
        let wrapped = format!("  {}\n{}\n", &unpadded[..4], &unpadded[4..]);

        let payload = EncodedAudio::base64(wrapped, "audio/ogg").decode().unwrap();
        assert_eq!(payload.len(), 9);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result = EncodedAudio::base64("not*base64!", "audio/wav").decode();
        assert!(matches!(result, Err(DecodeError::InvalidBase64(_))));
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert_eq!(
            EncodedAudio::base64("", "audio/wav").decode(),
            Err(DecodeError::EmptyPayload)
        );
        assert_eq!(
            EncodedAudio::binary(Vec::new(), "audio/wav").decode(),
            Err(DecodeError::EmptyPayload)
        );
    }

    #[test]
    fn test_non_audio_mime_rejected() {
        let result = EncodedAudio::binary(wav_header(), "text/plain").decode();
        assert_eq!(
            result,
            Err(DecodeError::UnsupportedMimeType("text/plain".to_string()))
        );

        let result = EncodedAudio::binary(wav_header(), "audio/").decode();
        assert!(matches!(result, Err(DecodeError::UnsupportedMimeType(_))));
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let result = EncodedAudio::binary(b"garbage-bytes".to_vec(), "audio/wav").decode();
        assert!(matches!(result, Err(DecodeError::MalformedContainer { .. })));

        let result = EncodedAudio::binary(b"RIFF".to_vec(), "audio/x-wav").decode();
        assert!(matches!(result, Err(DecodeError::MalformedContainer { .. })));

        let result = EncodedAudio::binary(b"OggS".to_vec(), "audio/webm").decode();
        assert!(matches!(result, Err(DecodeError::MalformedContainer { .. })));
    }

    #[test]
    fn test_mime_parameters_kept_on_segment() {
        let ebml = vec![0x1A, 0x45, 0xDF, 0xA3, 0x01];
        let payload = EncodedAudio::binary(ebml, "audio/webm;codecs=opus").decode().unwrap();
        let segment = AudioSegment::new(7, payload);

        assert_eq!(segment.sequence(), 7);
        assert_eq!(segment.mime_type(), "audio/webm;codecs=opus");
        assert_eq!(segment.container(), AudioContainer::Webm);
    }

    #[test]
    fn test_unknown_audio_type_passes_through() {
        let payload = EncodedAudio::binary(vec![1, 2, 3], "audio/x-custom").decode().unwrap();
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn test_from_data_url_takes_mime_from_url() {
        let encoded = LENIENT_BASE64.encode(b"fLaC\0\0\0\x22");
        let audio = EncodedAudio::from_data_url(&format!("data:audio/flac;base64,{}", encoded))
            .unwrap();
        assert_eq!(audio.mime_type(), "audio/flac");
        assert!(audio.decode().is_ok());

        assert!(EncodedAudio::from_data_url("audio/wav,AAAA").is_err());
        assert!(EncodedAudio::from_data_url("data:audio/wav,AAAA").is_err());
    }

    #[test]
    fn test_mime_essence() {
        assert_eq!(mime_essence(" Audio/WebM ; codecs=opus"), "audio/webm");
        assert_eq!(mime_essence("audio/wav"), "audio/wav");
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(AudioContainer::from_extension("WAV"), Some(AudioContainer::Wav));
        assert_eq!(AudioContainer::from_extension("txt"), None);
        assert_eq!(AudioContainer::Wav.extension(), Some("wav"));
        assert_eq!(AudioContainer::Ogg.mime_type(), "audio/ogg");
    }
}
