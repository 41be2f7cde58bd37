//! One open file being played: decoder, sink, and the chunk buffer between them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::EngineConfig;
use crate::decode::{AudioFormat, DecodeError, Decoder, DecoderFactory, Whence};
use crate::device::{Sink, SinkFactory};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("unsupported stream format: {channels} channels at {sample_rate} Hz")]
    InvalidFormat { channels: u16, sample_rate: u32 },
    #[error("output device unavailable: {0:#}")]
    Sink(anyhow::Error),
    #[error("cannot allocate a {frames}-frame chunk buffer")]
    Allocation { frames: usize },
}

/// A live session.
///
/// Fields drop in declaration order: the sink closes before the decoder.
pub struct PlaybackSession {
    sink: Box<dyn Sink>,
    decoder: Box<dyn Decoder>,
    path: PathBuf,
    format: AudioFormat,
    chunk: Vec<f32>,
    chunk_frames: usize,
}

impl PlaybackSession {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Decoder position: the frame after the last one decoded into the chunk buffer.
    pub fn position(&self) -> u64 {
        self.decoder.position()
    }

    /// Decode the next chunk into the session buffer. Returns frames decoded, `0` at EOF.
    pub fn read_chunk(&mut self) -> Result<usize, DecodeError> {
        self.decoder.read_chunk(&mut self.chunk, self.chunk_frames)
    }

    /// Write `frames` frames of the current chunk starting at frame `offset`.
    pub fn write_frames(&mut self, offset: usize, frames: usize) -> anyhow::Result<()> {
        let ch = self.format.channels as usize;
        let start = (offset * ch).min(self.chunk.len());
        let end = ((offset + frames) * ch).min(self.chunk.len());
        self.sink.write(&self.chunk[start..end])
    }

    /// Jump to `frame` (clamped by the decoder) and drop audio the sink has not played yet.
    pub fn seek_to(&mut self, frame: u64) -> Result<u64, DecodeError> {
        let target = i64::try_from(frame).unwrap_or(i64::MAX);
        let pos = self.decoder.seek(target, Whence::Start)?;
        self.sink.discard();
        Ok(pos)
    }

    pub fn pause(&mut self) -> anyhow::Result<()> {
        self.sink.pause()
    }

    pub fn resume(&mut self) -> anyhow::Result<()> {
        self.sink.resume()
    }

    pub fn drain(&mut self) {
        self.sink.drain();
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), position = self.decoder.position(), "session released");
    }
}

/// Builds sessions from the configured decoder and sink factories.
#[derive(Clone)]
pub struct SessionOpener {
    decoders: Arc<dyn DecoderFactory>,
    sinks: Arc<dyn SinkFactory>,
    config: EngineConfig,
}

impl SessionOpener {
    pub fn new(decoders: Arc<dyn DecoderFactory>, sinks: Arc<dyn SinkFactory>, config: EngineConfig) -> Self {
        Self {
            decoders,
            sinks,
            config,
        }
    }

    /// Chunking and seek settings shared by every session this opener creates.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open decoder, then sink, then the chunk buffer.
    ///
    /// Anything opened before a failure is released on return.
    pub fn open(&self, path: &Path) -> Result<PlaybackSession, SessionError> {
        let decoder = self.decoders.open(path)?;
        let format = decoder.format();
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(SessionError::InvalidFormat {
                channels: format.channels,
                sample_rate: format.sample_rate,
            });
        }

        let sink = self.sinks.open(&format).map_err(SessionError::Sink)?;

        let chunk_frames = self.config.chunk_frames(format.sample_rate);
        let samples = chunk_frames
            .checked_mul(format.channels as usize)
            .ok_or(SessionError::Allocation { frames: chunk_frames })?;
        let mut chunk = Vec::new();
        chunk
            .try_reserve_exact(samples)
            .map_err(|_| SessionError::Allocation { frames: chunk_frames })?;

        Ok(PlaybackSession {
            sink,
            decoder,
            path: path.to_path_buf(),
            format,
            chunk,
            chunk_frames,
        })
    }
}
