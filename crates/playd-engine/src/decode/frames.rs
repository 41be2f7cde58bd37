//! Frame-exact reading and seeking on top of block-oriented decoders.
//!
//! Codecs hand out PCM in blocks whose size they choose (one packet, one frame of MP3, ...).
//! [`FrameReader`] turns that into exact frame counts, keeps the partially consumed block
//! between calls, and implements seeking as "reposition natively if possible, then decode and
//! discard the remainder".

use super::{AudioFormat, DecodeError, Decoder, Whence};

/// A decoder that produces interleaved PCM a block at a time.
pub(crate) trait BlockSource {
    fn format(&self) -> AudioFormat;

    fn total_frames(&self) -> Option<u64>;

    /// Append the next decoded block to `out`. Returns `false` at end of stream.
    fn next_block(&mut self, out: &mut Vec<f32>) -> Result<bool, DecodeError>;

    /// Whether [`BlockSource::reposition`] can jump forward without decoding.
    fn random_access(&self) -> bool;

    /// Move the decode cursor to `frame` or earlier.
    ///
    /// Returns the frame the next block starts at, or `None` if `frame` is past the end.
    fn reposition(&mut self, frame: u64) -> Result<Option<u64>, DecodeError>;
}

pub(crate) struct FrameReader<S> {
    source: S,
    channels: usize,
    pending: Vec<f32>,
    pending_pos: usize,
    position: u64,
    ended: bool,
}

impl<S: BlockSource> FrameReader<S> {
    pub(crate) fn new(source: S) -> Self {
        let channels = (source.format().channels as usize).max(1);
        Self {
            source,
            channels,
            pending: Vec::new(),
            pending_pos: 0,
            position: 0,
            ended: false,
        }
    }

    fn pending_frames(&self) -> usize {
        (self.pending.len() - self.pending_pos) / self.channels
    }

    /// Decode the next non-empty block into `pending`. Returns `false` at end of stream.
    fn refill(&mut self) -> Result<bool, DecodeError> {
        self.pending.clear();
        self.pending_pos = 0;
        while !self.ended {
            if !self.source.next_block(&mut self.pending)? {
                self.ended = true;
                break;
            }
            if self.pending.len() >= self.channels {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Decode and drop up to `frames` frames. Stops early at end of stream.
    fn skip(&mut self, frames: u64) -> Result<(), DecodeError> {
        let mut left = frames;
        while left > 0 {
            let avail = self.pending_frames();
            if avail == 0 {
                if !self.refill()? {
                    break;
                }
                continue;
            }
            let take = (avail as u64).min(left) as usize;
            self.pending_pos += take * self.channels;
            self.position += take as u64;
            left -= take as u64;
        }
        Ok(())
    }

    fn drop_pending(&mut self) {
        self.pending.clear();
        self.pending_pos = 0;
    }
}

impl<S: BlockSource> Decoder for FrameReader<S> {
    fn format(&self) -> AudioFormat {
        self.source.format()
    }

    fn total_frames(&self) -> Option<u64> {
        self.source.total_frames()
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read_chunk(&mut self, out: &mut Vec<f32>, frames: usize) -> Result<usize, DecodeError> {
        out.clear();
        let mut left = frames;
        while left > 0 {
            let avail = self.pending_frames();
            if avail == 0 {
                if !self.refill()? {
                    break;
                }
                continue;
            }
            let take = avail.min(left);
            let end = self.pending_pos + take * self.channels;
            out.extend_from_slice(&self.pending[self.pending_pos..end]);
            self.pending_pos = end;
            left -= take;
        }
        let got = frames - left;
        self.position += got as u64;
        Ok(got)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, DecodeError> {
        let total = self.source.total_frames();
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.position,
            Whence::End => match total {
                Some(t) => t,
                None => {
                    self.skip(u64::MAX)?;
                    self.position
                }
            },
        };
        let target = (base as i128 + offset as i128).max(0);
        let mut target = u64::try_from(target).unwrap_or(u64::MAX);
        if let Some(t) = total {
            target = target.min(t);
        }
        if target == self.position {
            return Ok(self.position);
        }

        if target < self.position || self.source.random_access() {
            match self.source.reposition(target)? {
                Some(start) => {
                    self.drop_pending();
                    self.ended = false;
                    self.position = start;
                }
                None => {
                    self.drop_pending();
                    self.ended = true;
                    self.position = total.unwrap_or(target);
                    return Ok(self.position);
                }
            }
        }
        if target > self.position {
            self.skip(target - self.position)?;
        }
        Ok(self.position)
    }
}
