//! Status notifier thread.
//!
//! The playback loop posts [`StatusEvent`]s by value and moves on. A dedicated thread takes
//! the latest one and hands it to a [`StatusSink`], which may block (socket writes) without
//! stalling playback. A [`StatusKind::Quit`] event is delivered and then ends the thread.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::command::{StatusEvent, StatusKind};
use crate::mailbox::Mailbox;

/// Final destination of status events (usually the client socket).
pub trait StatusSink: Send {
    fn deliver(&mut self, event: &StatusEvent) -> anyhow::Result<()>;
}

/// Fire-and-forget status publishing, as seen by the playback loop.
pub trait StatusEmitter: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

#[derive(Clone)]
pub struct StatusHandle {
    slot: Arc<Mailbox<StatusEvent>>,
}

impl StatusHandle {
    /// Post an event, replacing any undelivered one. A pending `Quit` is never replaced.
    pub fn post(&self, event: StatusEvent) {
        self.slot.update(|slot| {
            if matches!(slot, Some(ev) if ev.kind == StatusKind::Quit) {
                return;
            }
            *slot = Some(event);
        });
    }
}

impl StatusEmitter for StatusHandle {
    fn emit(&self, event: StatusEvent) {
        self.post(event);
    }
}

pub struct StatusNotifier {
    handle: StatusHandle,
    thread: Option<JoinHandle<()>>,
}

impl StatusNotifier {
    pub fn spawn<S>(mut sink: S) -> io::Result<Self>
    where
        S: StatusSink + 'static,
    {
        let handle = StatusHandle {
            slot: Arc::new(Mailbox::new()),
        };
        let slot = handle.slot.clone();
        let thread = thread::Builder::new()
            .name("status-notifier".to_string())
            .spawn(move || {
                loop {
                    let event = slot.wait_take();
                    let terminal = event.kind == StatusKind::Quit;
                    if let Err(e) = sink.deliver(&event) {
                        tracing::warn!(status = ?event.kind, "status delivery failed: {e:#}");
                    }
                    if terminal {
                        break;
                    }
                }
                tracing::debug!("status notifier stopped");
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> StatusHandle {
        self.handle.clone()
    }

    /// Deliver the terminal `Quit` event and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.handle.post(StatusEvent::new(StatusKind::Quit));
            if thread.join().is_err() {
                tracing::error!("status notifier panicked");
            }
        }
    }
}

impl Drop for StatusNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}
