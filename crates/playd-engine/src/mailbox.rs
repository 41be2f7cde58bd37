//! Single-slot, latest-wins mailbox.
//!
//! A posted value replaces any value that has not been taken yet; nothing is queued.
//! The slot lives under the same mutex the condition variable waits on, so a post can never
//! slip between a waiter's emptiness check and its wait.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// One-value slot shared by a producer side (`post`/`update`) and a single consumer.
///
/// Lock poisoning is ignored: the slot holds plain data and stays consistent even if a holder
/// panicked.
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    cv: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    /// An empty mailbox.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`, overwriting anything pending, and wake waiters.
    pub fn post(&self, value: T) {
        self.update(|slot| *slot = Some(value));
    }

    /// Inspect and modify the slot under the lock, then wake waiters.
    ///
    /// Used for supersession rules that are stricter than plain overwrite.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Option<T>),
    {
        let mut g = self.lock();
        f(&mut g);
        drop(g);
        self.cv.notify_all();
    }

    /// Take the pending value without blocking.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Block until a value is pending, then take it.
    pub fn wait_take(&self) -> T {
        let mut g = self.lock();
        loop {
            if let Some(v) = g.take() {
                return v;
            }
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn latest_post_wins() {
        let mb = Mailbox::new();
        mb.post(1);
        mb.post(2);
        mb.post(3);
        assert_eq!(mb.take(), Some(3));
        assert_eq!(mb.take(), None);
    }

    #[test]
    fn update_can_keep_pending_value() {
        let mb = Mailbox::new();
        mb.post("keep");
        mb.update(|slot| {
            if slot.is_none() {
                *slot = Some("replace");
            }
        });
        assert_eq!(mb.take(), Some("keep"));
    }

    #[test]
    fn wait_take_wakes_on_post_from_other_thread() {
        let mb = Arc::new(Mailbox::new());
        let poster = mb.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post(7u32);
        });
        assert_eq!(mb.wait_take(), 7);
        t.join().unwrap();
    }

    #[test]
    fn wait_take_returns_immediately_when_pending() {
        let mb = Mailbox::new();
        mb.post('x');
        assert_eq!(mb.wait_take(), 'x');
    }

    #[test]
    fn never_holds_more_than_one_value_under_contention() {
        let mb = Arc::new(Mailbox::new());
        let mut handles = Vec::new();
        for t in 0..4u32 {
            let mb = mb.clone();
            handles.push(thread::spawn(move || {
                for i in 0..500u32 {
                    mb.post(t * 1000 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // Only the final value of one poster can remain.
        let last = mb.take().unwrap();
        assert_eq!(last % 1000, 499);
        assert!(mb.take().is_none());
    }
}
