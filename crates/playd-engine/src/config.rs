/// Playback loop tuning shared by the worker, session, and sink.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Length of one decoded chunk, in milliseconds of audio.
    pub chunk_millis: u32,
    /// Number of pieces each chunk is written in; the mailbox is polled before every piece.
    pub sub_chunks: u32,
    /// Fast-forward/rewind distance, in chunk lengths.
    pub seek_chunks: u32,
    /// Target buffer duration of the output sink queue.
    pub sink_buffer_millis: u32,
}

impl Default for EngineConfig {
    /// One-second chunks written in 1/16 s pieces; seeks move four chunks.
    fn default() -> Self {
        Self {
            chunk_millis: 1000,
            sub_chunks: 16,
            seek_chunks: 4,
            sink_buffer_millis: 250,
        }
    }
}

impl EngineConfig {
    /// Frames per chunk at `sample_rate` (never zero).
    pub fn chunk_frames(&self, sample_rate: u32) -> usize {
        let frames = (sample_rate as u64).saturating_mul(self.chunk_millis.max(1) as u64) / 1000;
        frames.max(1) as usize
    }

    /// Frames per written piece at `sample_rate` (never zero).
    pub fn sub_chunk_frames(&self, sample_rate: u32) -> usize {
        (self.chunk_frames(sample_rate) / self.sub_chunks.max(1) as usize).max(1)
    }

    /// Seek distance in frames. Scales with the chunk length, not with wall-clock time.
    pub fn seek_frames(&self, sample_rate: u32) -> u64 {
        (self.chunk_frames(sample_rate) as u64).saturating_mul(self.seek_chunks as u64)
    }
}
