//! Decode interface and codec selection.
//!
//! Every backend delivers interleaved `f32` PCM through the [`Decoder`] trait. Which backend
//! handles a file is decided by [`registry::codec_for_path`] from the file extension alone.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

mod frames;
mod media;
pub mod registry;

pub use registry::{Backend, CodecId, CodecRegistry, codec_for_path};

/// Format of decoded PCM as delivered to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    /// Bit depth of the source material (decoded samples are always `f32`).
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn frames_to_millis(&self, frames: u64) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        frames.saturating_mul(1000) / self.sample_rate as u64
    }
}

/// Reference point for [`Decoder::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported file extension: {ext:?}")]
    UnsupportedExtension { ext: String },
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no decodable audio track")]
    NoAudioTrack,
    #[error("stream does not declare its {0}")]
    MissingParameter(&'static str),
    #[error("channel layout changed mid-stream ({expected} -> {got} channels)")]
    LayoutChanged { expected: usize, got: usize },
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("decoder: {0}")]
    Backend(#[from] symphonia::core::errors::Error),
}

/// An open, positioned PCM source. Closing is dropping.
pub trait Decoder {
    fn format(&self) -> AudioFormat;

    /// Total length in frames, when the container declares it.
    fn total_frames(&self) -> Option<u64>;

    /// Index of the next frame `read_chunk` will return.
    fn position(&self) -> u64;

    /// Replace the contents of `out` with up to `frames` interleaved frames.
    ///
    /// Returns the number of frames read; `0` only at end of stream.
    fn read_chunk(&mut self, out: &mut Vec<f32>, frames: usize) -> Result<usize, DecodeError>;

    /// Move to `offset` frames relative to `whence` and return the new position.
    ///
    /// The target is clamped to `[0, total]`. Overshooting a stream of unknown length lands at
    /// end of stream.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, DecodeError>;
}

/// Opens decoders for files. Shared between threads.
pub trait DecoderFactory: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_to_millis_handles_zero_rate() {
        let f = AudioFormat {
            channels: 2,
            sample_rate: 0,
            bits_per_sample: 16,
        };
        assert_eq!(f.frames_to_millis(1000), 0);
    }

    #[test]
    fn frames_to_millis_computes() {
        let f = AudioFormat {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 24,
        };
        assert_eq!(f.frames_to_millis(96_000), 2000);
    }
}
