//! Loading segment payloads from files
//!
//! Three kinds of input are accepted, chosen by extension:
//! - `.b64` / `.txt`: base64 text, or a `data:audio/...;base64,` URL
//! - `.json`: a voice response as returned by the voice-to-voice server
//! - anything else: raw container bytes
//!
//! MIME type resolution for text and binary inputs: `--mime-type` override,
//! then the data URL / file extension, then the configured default.

use crate::error::{Error, Result};
use crate::playback::{AudioContainer, EncodedAudio};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Voice response body
///
/// Every field is optional; a response without `audio_b64`, or with `error`
/// set, carries no playable audio.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceResponse {
    #[serde(default)]
    pub audio_b64: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub llm_response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl VoiceResponse {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Input(format!("Invalid voice response: {}", e)))
    }

    /// Extract the audio payload, or explain why there is none
    pub fn into_payload(self, mime_type: &str) -> Result<EncodedAudio> {
        if let Some(error) = self.error {
            return Err(Error::Input(format!("No audio response: {}", error)));
        }

        match self.audio_b64 {
            Some(audio) if !audio.trim().is_empty() => Ok(EncodedAudio::base64(audio, mime_type)),
            _ => Err(Error::Input("No audio response".to_string())),
        }
    }
}

/// One input file ready to enqueue, with the text that came with it
#[derive(Debug)]
pub struct LoadedInput {
    pub path: PathBuf,
    pub payload: EncodedAudio,
    pub transcription: Option<String>,
    pub llm_response: Option<String>,
}

/// How an input file is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Base64Text,
    VoiceResponse,
    Binary,
}

impl InputKind {
    pub fn for_path(path: &Path) -> Self {
        match extension(path).as_deref() {
            Some("b64") | Some("txt") => InputKind::Base64Text,
            Some("json") => InputKind::VoiceResponse,
            _ => InputKind::Binary,
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Read `path` and turn it into a payload
pub fn load_input(
    path: &Path,
    mime_override: Option<&str>,
    default_mime: &str,
) -> Result<LoadedInput> {
    let kind = InputKind::for_path(path);
    debug!("Loading {} as {:?}", path.display(), kind);

    let mut transcription = None;
    let mut llm_response = None;

    let payload = match kind {
        InputKind::Base64Text => {
            let text = std::fs::read_to_string(path)?;
            let text = text.trim();
            match (text.starts_with("data:"), mime_override) {
                (true, None) => EncodedAudio::from_data_url(text)?,
                (_, Some(mime)) => EncodedAudio::base64(text, mime),
                (false, None) => EncodedAudio::base64(text, default_mime),
            }
        }
        InputKind::VoiceResponse => {
            let json = std::fs::read_to_string(path)?;
            let response = VoiceResponse::from_json(&json)?;

            if let Some(rate) = response.sample_rate {
                debug!("Declared sample rate: {}Hz", rate);
            }

            transcription = response.transcription.clone();
            llm_response = response.llm_response.clone();
            response.into_payload(mime_override.unwrap_or(default_mime))?
        }
        InputKind::Binary => {
            let bytes = std::fs::read(path)?;
            let mime = mime_override
                .map(str::to_string)
                .or_else(|| {
                    extension(path)
                        .and_then(|ext| AudioContainer::from_extension(&ext))
                        .map(|c| c.mime_type().to_string())
                })
                .unwrap_or_else(|| default_mime.to_string());
            EncodedAudio::binary(bytes, mime)
        }
    };

    Ok(LoadedInput {
        path: path.to_path_buf(),
        payload,
        transcription,
        llm_response,
    })
}
