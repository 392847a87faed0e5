//! WAV fixtures
//!
//! Deterministic sine segments shaped like voice-service output (mono,
//! 16-bit, speech sample rates).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::Path;

/// Sample rate the voice service typically returns
pub const VOICE_SAMPLE_RATE: u32 = 24000;

/// Encode a mono sine tone as an in-memory WAV file
pub fn sine_wav_bytes(sample_rate: u32, duration_ms: u64, frequency_hz: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let frames = sample_rate as u64 * duration_ms / 1000;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = (2.0 * PI * frequency_hz * t).sin() * 0.5;
            writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Short voice-like segment, base64 encoded as it arrives over the wire
pub fn voice_segment_b64(duration_ms: u64) -> String {
    STANDARD.encode(sine_wav_bytes(VOICE_SAMPLE_RATE, duration_ms, 220.0))
}

/// Write a WAV fixture to disk
pub fn write_sine_wav<P: AsRef<Path>>(path: P, sample_rate: u32, duration_ms: u64) {
    std::fs::write(path, sine_wav_bytes(sample_rate, duration_ms, 440.0)).unwrap();
}
