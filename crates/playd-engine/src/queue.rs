//! Bounded queue of interleaved samples between the playback loop and the output callback.
//!
//! - playback loop → [`SampleQueue::push_blocking`] (blocks while full, which paces the loop)
//! - output callback → [`SampleQueue::pop_into`] (never blocks)
//!
//! The `closed` flag lives under the same mutex as the samples so a closing sink can never miss
//! a writer that is about to wait.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Interleaved `f32` samples with a hard cap.
///
/// Capacity is counted in samples, not frames, but readers only ever see whole frames.
pub struct SampleQueue {
    channels: usize,
    max_samples: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
}

struct Inner {
    samples: VecDeque<f32>,
    closed: bool,
}

/// Queue capacity in samples for `millis` of audio, rounded to whole frames and at least one.
pub fn capacity_for(rate_hz: u32, channels: usize, millis: u32) -> usize {
    let frames = (rate_hz as u64 * millis as u64).div_ceil(1000).max(1);
    (frames as usize).saturating_mul(channels.max(1))
}

impl SampleQueue {
    /// `max_samples` is raised to at least one frame.
    pub fn new(channels: usize, max_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            max_samples: max_samples.max(channels),
            inner: Mutex::new(Inner {
                samples: VecDeque::with_capacity(max_samples),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Interleaved channel count the queue was created for.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whole frames currently buffered.
    pub fn len_frames(&self) -> usize {
        self.lock().samples.len() / self.channels
    }

    /// True once [`SampleQueue::close`] was called; a closed queue never reopens.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Append samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before everything was accepted; the rest is
    /// dropped.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        let mut g = self.lock();
        while offset < samples.len() {
            while g.samples.len() >= self.max_samples && !g.closed {
                g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
            if g.closed {
                return false;
            }
            let room = self.max_samples - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;
            self.cv.notify_all();
        }
        true
    }

    /// Move up to `out.len()` whole-frame samples into `out` without blocking.
    ///
    /// Returns the number of samples written.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut g = self.lock();
        let avail = g.samples.len() - g.samples.len() % self.channels;
        let want = out.len() - out.len() % self.channels;
        let n = avail.min(want);
        for (dst, src) in out.iter_mut().zip(g.samples.drain(..n)) {
            *dst = src;
        }
        drop(g);
        if n > 0 {
            self.cv.notify_all();
        }
        n
    }

    /// Drop everything queued. Returns the number of frames discarded.
    pub fn clear(&self) -> usize {
        let mut g = self.lock();
        let dropped = g.samples.len() / self.channels;
        g.samples.clear();
        drop(g);
        self.cv.notify_all();
        dropped
    }

    /// Wait until the consumer has emptied the queue, the queue is closed, or `timeout` expires.
    ///
    /// Returns `true` if the queue is empty.
    pub fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock();
        loop {
            if g.samples.is_empty() {
                return true;
            }
            if g.closed {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .cv
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            g = next;
        }
    }

    /// Mark the queue closed and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cv.notify_all();
    }
}
