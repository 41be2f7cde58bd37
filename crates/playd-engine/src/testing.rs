//! Fakes shared by the engine's unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::command::{StatusEvent, StatusKind};
use crate::decode::{AudioFormat, DecodeError, Decoder, DecoderFactory, Whence};
use crate::device::{Sink, SinkFactory};
use crate::notifier::StatusEmitter;

/// Write a 16-bit WAV whose every sample holds its frame index (`frames` must stay below 32768).
pub(crate) fn write_index_wav(path: &Path, rate: u32, channels: u16, frames: u32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for f in 0..frames {
        for _ in 0..channels {
            w.write_sample(f as i16).unwrap();
        }
    }
    w.finalize().unwrap();
}

/// Mono decoder whose sample values are their frame index.
struct RampDecoder {
    rate: u32,
    len: u64,
    pos: u64,
    live: Arc<AtomicUsize>,
}

impl Decoder for RampDecoder {
    fn format(&self) -> AudioFormat {
        AudioFormat {
            channels: 1,
            sample_rate: self.rate,
            bits_per_sample: 16,
        }
    }

    fn total_frames(&self) -> Option<u64> {
        Some(self.len)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn read_chunk(&mut self, out: &mut Vec<f32>, frames: usize) -> Result<usize, DecodeError> {
        out.clear();
        let end = (self.pos + frames as u64).min(self.len);
        out.extend((self.pos..end).map(|f| f as f32));
        let got = (end - self.pos) as usize;
        self.pos = end;
        Ok(got)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, DecodeError> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos as i64,
            Whence::End => self.len as i64,
        };
        self.pos = (base.saturating_add(offset)).clamp(0, self.len as i64) as u64;
        Ok(self.pos)
    }
}

impl Drop for RampDecoder {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Opens a [`RampDecoder`] for any `*.ramp` path and rejects everything else.
#[derive(Clone)]
pub(crate) struct FakeDecoders {
    rate: u32,
    frames: u64,
    opened: Arc<Mutex<Vec<PathBuf>>>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl FakeDecoders {
    pub(crate) fn new(rate: u32, frames: u64) -> Self {
        Self {
            rate,
            frames,
            opened: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn live_counter(&self) -> Arc<AtomicUsize> {
        self.live.clone()
    }

    /// Most decoders ever open at the same time.
    pub(crate) fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for FakeDecoders {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, DecodeError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        if ext != "ramp" {
            return Err(DecodeError::UnsupportedExtension { ext });
        }
        self.opened.lock().unwrap().push(path.to_path_buf());
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(RampDecoder {
            rate: self.rate,
            len: self.frames,
            pos: 0,
            live: self.live.clone(),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Pause,
    Resume,
    Discard,
    Drain,
}

#[derive(Default)]
pub(crate) struct SinkLog {
    samples: Mutex<Vec<f32>>,
    events: Mutex<Vec<SinkEvent>>,
    opened: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    closed_with_live_decoders: Mutex<Vec<usize>>,
}

impl SinkLog {
    pub(crate) fn samples(&self) -> Vec<f32> {
        self.samples.lock().unwrap().clone()
    }

    pub(crate) fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Live decoder count observed at each sink close.
    pub(crate) fn closed_with_live_decoders(&self) -> Vec<usize> {
        self.closed_with_live_decoders.lock().unwrap().clone()
    }
}

/// Records everything written; optionally sleeps per write to pace the loop.
#[derive(Clone, Default)]
pub(crate) struct FakeSinks {
    log: Arc<SinkLog>,
    write_delay: Duration,
    fail: bool,
    decoders: Option<Arc<AtomicUsize>>,
}

impl FakeSinks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn watch_decoders(mut self, live: Arc<AtomicUsize>) -> Self {
        self.decoders = Some(live);
        self
    }

    pub(crate) fn log(&self) -> &SinkLog {
        &self.log
    }
}

impl SinkFactory for FakeSinks {
    fn open(&self, _format: &AudioFormat) -> anyhow::Result<Box<dyn Sink>> {
        if self.fail {
            anyhow::bail!("no such device");
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.log.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeSink {
            log: self.log.clone(),
            write_delay: self.write_delay,
            decoders: self.decoders.clone(),
        }))
    }
}

struct FakeSink {
    log: Arc<SinkLog>,
    write_delay: Duration,
    decoders: Option<Arc<AtomicUsize>>,
}

impl FakeSink {
    fn record(&self, ev: SinkEvent) {
        self.log.events.lock().unwrap().push(ev);
    }
}

impl Sink for FakeSink {
    fn write(&mut self, samples: &[f32]) -> anyhow::Result<()> {
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        self.log.samples.lock().unwrap().extend_from_slice(samples);
        Ok(())
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        self.record(SinkEvent::Pause);
        Ok(())
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        self.record(SinkEvent::Resume);
        Ok(())
    }

    fn discard(&mut self) {
        self.record(SinkEvent::Discard);
    }

    fn drain(&mut self) {
        self.record(SinkEvent::Drain);
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        if let Some(d) = &self.decoders {
            let n = d.load(Ordering::SeqCst);
            self.log.closed_with_live_decoders.lock().unwrap().push(n);
        }
        self.log.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Forwards every emitted status to a channel, without latest-wins dropping.
pub(crate) struct ChannelEmitter {
    tx: Sender<StatusEvent>,
}

impl ChannelEmitter {
    pub(crate) fn new() -> (Self, Receiver<StatusEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl StatusEmitter for ChannelEmitter {
    fn emit(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

/// Skip events until one of `kind` arrives. An unexpected `Error` fails the test.
pub(crate) fn expect_status(rx: &Receiver<StatusEvent>, kind: StatusKind, timeout: Duration) -> StatusEvent {
    let deadline = Instant::now() + timeout;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let ev = rx
            .recv_timeout(left)
            .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"));
        if ev.kind == kind {
            return ev;
        }
        assert_ne!(ev.kind, StatusKind::Error, "unexpected error status: {:?}", ev.info);
    }
}
