//! Error types for v2v-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Reasons a payload cannot become an `AudioSegment`
///
/// A decode failure only drops the offending payload; queued segments and
/// player state are untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Nothing left after decoding
    #[error("Empty audio payload")]
    EmptyPayload,

    /// Base64 text did not decode
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),

    /// Declared type is not an audio MIME type
    #[error("Unsupported MIME type: {0}")]
    UnsupportedMimeType(String),

    /// Bytes do not match the declared container
    #[error("Payload is not valid {mime_type} data: {reason}")]
    MalformedContainer { mime_type: String, reason: String },
}

/// Main error type for v2v-player
#[derive(Error, Debug)]
pub enum Error {
    /// Payload decoding errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Sink failed to render a segment
    #[error("Playback error: {0}")]
    Playback(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file could not be turned into a payload
    #[error("Input error: {0}")]
    Input(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Player task is gone (shut down or panicked)
    #[error("Player channel closed")]
    ChannelClosed,

    /// Errors from the shared crate
    #[error(transparent)]
    Common(#[from] v2v_common::Error),
}

/// Convenience Result type using v2v-player Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_converts() {
        let err: Error = DecodeError::EmptyPayload.into();
        assert!(matches!(err, Error::Decode(DecodeError::EmptyPayload)));
        assert_eq!(err.to_string(), "Decode error: Empty audio payload");
    }

    #[test]
    fn test_malformed_container_message() {
        let err = DecodeError::MalformedContainer {
            mime_type: "audio/wav".to_string(),
            reason: "missing RIFF header".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Payload is not valid audio/wav data: missing RIFF header"
        );
    }
}
