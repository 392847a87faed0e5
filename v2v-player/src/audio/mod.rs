//! Audio decoding, conversion and device output

pub mod decoder;
pub mod output;
pub mod prefetch;
pub mod resampler;

pub use decoder::{PcmAudio, SegmentDecoder};
pub use output::{prepare_segment, CpalSink, OutputFormat};
pub use prefetch::SegmentPreparer;
pub use resampler::Resampler;
