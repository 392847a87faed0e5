//! Sample rate and channel conversion
//!
//! Segments arrive at whatever rate the voice service produced (commonly
//! 16 kHz or 24 kHz mono) and must be rendered at the output device's native
//! format.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Audio resampler using rubato
pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// Returns a copy when the rates already match.
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if input_rate == output_rate || input.is_empty() {
            return Ok(input.to_vec());
        }
        if channels == 0 || input_rate == 0 || output_rate == 0 {
            return Err(Error::Playback(format!(
                "Cannot resample {}Hz -> {}Hz with {} channels",
                input_rate, output_rate, channels
            )));
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        let planar_input = Self::deinterleave(input, channels);
        let input_frames = planar_input[0].len();

        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| Error::Playback(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Playback(format!("Resampling failed: {}", e)))?;

        let output = Self::interleave(planar_output);
        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            output.len() / channels as usize
        );
        Ok(output)
    }

    /// Convert interleaved audio between channel counts.
    ///
    /// Mono is duplicated to every output channel; anything else is mixed
    /// down to mono first when the counts differ.
    pub fn remap_channels(input: &[f32], from: u16, to: u16) -> Vec<f32> {
        if from == to || from == 0 || to == 0 {
            return input.to_vec();
        }

        let from = from as usize;
        let to = to as usize;
        let frames = input.len() / from;
        let mut output = Vec::with_capacity(frames * to);

        for frame in input.chunks_exact(from) {
            let mono = if from == 1 {
                frame[0]
            } else {
                frame.iter().sum::<f32>() / from as f32
            };
            output.extend(std::iter::repeat(mono).take(to));
        }

        output
    }

    /// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch_idx, sample) in frame.iter().enumerate() {
                planar[ch_idx].push(*sample);
            }
        }

        planar
    }

    /// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        if planar.is_empty() {
            return Vec::new();
        }

        let num_channels = planar.len();
        let num_frames = planar[0].len();
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);

        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }

        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planar = Resampler::deinterleave(&interleaved, 2);

        assert_eq!(planar.len(), 2);
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_interleave() {
        let planar = vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]];
        assert_eq!(Resampler::interleave(planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_resample_same_rate() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        let output = Resampler::resample(&input, 24000, 24000, 1).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_upsamples_voice_rate() {
        let input: Vec<f32> = (0..2400).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let output = Resampler::resample(&input, 24000, 48000, 1).unwrap();

        // 2x ratio; allow for the resampler's edge handling
        let expected = 4800;
        assert!(
            output.len().abs_diff(expected) <= 64,
            "expected about {} frames, got {}",
            expected,
            output.len()
        );
    }

    #[test]
    fn test_resample_rejects_zero_channels() {
        assert!(Resampler::resample(&[0.1, 0.2], 16000, 48000, 0).is_err());
    }

    #[test]
    fn test_mono_to_stereo() {
        let output = Resampler::remap_channels(&[0.1, 0.2, 0.3], 1, 2);
        assert_eq!(output, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_stereo_downmix_to_mono() {
        let output = Resampler::remap_channels(&[0.2, 0.4, -0.5, 0.5], 2, 1);
        assert_eq!(output.len(), 2);
        assert!((output[0] - 0.3).abs() < 1e-6);
        assert!(output[1].abs() < 1e-6);
    }

    #[test]
    fn test_remap_same_count_is_copy() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(Resampler::remap_channels(&input, 2, 2), input);
    }
}
