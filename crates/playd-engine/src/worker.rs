//! Playback loop.
//!
//! Runs on its own thread. While idle it blocks on the controller; while a session is live it
//! decodes one chunk at a time and writes it in sub-chunk pieces, polling the controller before
//! every piece. The sink's blocking `write` paces the loop.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::command::{Command, PlaybackState, StatusEvent, StatusKind};
use crate::controller::{Action, Controller, SeekDirection, transition};
use crate::notifier::StatusEmitter;
use crate::session::{PlaybackSession, SessionOpener};

/// Why a session ended.
enum SessionEnd {
    /// Decoder reached end of stream and the sink drained.
    Finished,
    Stopped,
    Failed(String),
    /// Leave the session and handle this command next (`Play` of another file, or `Quit`).
    Handoff(Command),
}

/// What the piece loop does after a command was applied mid-session.
enum Flow {
    Continue,
    /// Decoder moved; drop the rest of the current chunk.
    Reposition,
    Exit(SessionEnd),
}

pub struct PlaybackWorker {
    controller: Arc<Controller>,
    opener: SessionOpener,
    status: Arc<dyn StatusEmitter>,
}

impl PlaybackWorker {
    pub fn new(controller: Arc<Controller>, opener: SessionOpener, status: Arc<dyn StatusEmitter>) -> Self {
        Self {
            controller,
            opener,
            status,
        }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || self.run())
    }

    /// Idle loop. Returns after `Quit`.
    pub fn run(self) {
        tracing::debug!("playback loop started");
        let mut carried: Option<Command> = None;
        loop {
            let cmd = match carried.take() {
                Some(cmd) => cmd,
                None => match self.controller.wait_for_command(true) {
                    Some(cmd) => cmd,
                    None => continue,
                },
            };
            let (next, action) = transition(self.controller.state(), &cmd, None);
            match action {
                Action::Open(path) | Action::Replace(path) => carried = self.play(path),
                Action::AcknowledgeStop => {
                    self.controller.set_state(next);
                    self.emit(StatusEvent::new(StatusKind::Stopped));
                }
                Action::Shutdown => break,
                _ => tracing::debug!(command = cmd.name(), "ignored while idle"),
            }
        }
        self.controller.set_state(PlaybackState::Stopped);
        tracing::debug!("playback loop stopped");
    }

    fn emit(&self, event: StatusEvent) {
        self.status.emit(event);
    }

    /// Open, play, and release one file. Returns a command to handle next, if any.
    fn play(&self, path: PathBuf) -> Option<Command> {
        let mut session = match self.opener.open(&path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot play: {e}");
                self.controller.set_state(PlaybackState::Error);
                self.emit(StatusEvent::with_info(StatusKind::Error, e.to_string()));
                return None;
            }
        };
        let format = session.format();
        tracing::info!(
            path = %path.display(),
            rate = format.sample_rate,
            channels = format.channels,
            bits = format.bits_per_sample,
            "playing"
        );
        self.controller.set_state(PlaybackState::Playing);
        self.emit(StatusEvent::with_info(StatusKind::Playing, path.display().to_string()));

        let end = self.drive(&mut session);
        let position = session.position();
        drop(session);

        match end {
            SessionEnd::Finished => {
                tracing::info!(
                    path = %path.display(),
                    frames = position,
                    duration_ms = format.frames_to_millis(position),
                    "end of file"
                );
                self.controller.set_state(PlaybackState::Stopped);
                self.emit(StatusEvent::new(StatusKind::Stopped));
                None
            }
            SessionEnd::Stopped => {
                tracing::info!(path = %path.display(), "stopped");
                self.controller.set_state(PlaybackState::Stopped);
                self.emit(StatusEvent::new(StatusKind::Stopped));
                None
            }
            SessionEnd::Failed(msg) => {
                tracing::warn!(path = %path.display(), "playback failed: {msg}");
                self.controller.set_state(PlaybackState::Error);
                self.emit(StatusEvent::with_info(StatusKind::Error, msg));
                None
            }
            SessionEnd::Handoff(cmd) => {
                self.controller.set_state(PlaybackState::Stopped);
                Some(cmd)
            }
        }
    }

    fn drive(&self, session: &mut PlaybackSession) -> SessionEnd {
        let rate = session.format().sample_rate;
        let piece = self.opener.config().sub_chunk_frames(rate);

        'chunks: loop {
            let got = match session.read_chunk() {
                Ok(n) => n,
                Err(e) => return SessionEnd::Failed(e.to_string()),
            };
            if got == 0 {
                session.drain();
                return SessionEnd::Finished;
            }
            let chunk_start = session.position() - got as u64;

            let mut offset = 0;
            while offset < got {
                if let Some(cmd) = self.controller.wait_for_command(false) {
                    match self.apply(session, cmd, chunk_start + offset as u64) {
                        Flow::Continue => {}
                        Flow::Reposition => continue 'chunks,
                        Flow::Exit(end) => return end,
                    }
                }
                let n = piece.min(got - offset);
                if let Err(e) = session.write_frames(offset, n) {
                    return SessionEnd::Failed(format!("{e:#}"));
                }
                offset += n;
            }
        }
    }

    /// Apply a command received while playing. `played` is the next frame to be written.
    fn apply(&self, session: &mut PlaybackSession, cmd: Command, played: u64) -> Flow {
        let (next, action) = transition(self.controller.state(), &cmd, Some(session.path()));
        match action {
            Action::Suspend => {
                if let Err(e) = session.pause() {
                    return Flow::Exit(SessionEnd::Failed(format!("{e:#}")));
                }
                self.controller.set_state(next);
                self.emit(StatusEvent::new(StatusKind::Paused));
                tracing::info!(frame = played, "paused");
                self.suspend(session, played)
            }
            Action::Seek(dir) => self.seek(session, dir, played),
            Action::Teardown => Flow::Exit(SessionEnd::Stopped),
            Action::Replace(path) => Flow::Exit(SessionEnd::Handoff(Command::Play(path))),
            Action::Shutdown => Flow::Exit(SessionEnd::Handoff(Command::Quit)),
            Action::Resume | Action::Open(_) | Action::AcknowledgeStop | Action::Ignore => Flow::Continue,
        }
    }

    /// Block until a command ends the pause.
    fn suspend(&self, session: &mut PlaybackSession, played: u64) -> Flow {
        loop {
            let Some(cmd) = self.controller.wait_for_command(true) else {
                continue;
            };
            let (next, action) = transition(PlaybackState::Paused, &cmd, Some(session.path()));
            let flow = match action {
                Action::Resume => Flow::Continue,
                Action::Seek(dir) => self.seek(session, dir, played),
                Action::Teardown => return Flow::Exit(SessionEnd::Stopped),
                Action::Replace(path) => return Flow::Exit(SessionEnd::Handoff(Command::Play(path))),
                Action::Shutdown => return Flow::Exit(SessionEnd::Handoff(Command::Quit)),
                _ => continue,
            };
            if let Flow::Exit(_) = flow {
                return flow;
            }
            if let Err(e) = session.resume() {
                return Flow::Exit(SessionEnd::Failed(format!("{e:#}")));
            }
            self.controller.set_state(next);
            self.emit(StatusEvent::with_info(
                StatusKind::Playing,
                session.path().display().to_string(),
            ));
            tracing::info!("resumed");
            return flow;
        }
    }

    fn seek(&self, session: &mut PlaybackSession, dir: SeekDirection, played: u64) -> Flow {
        let distance = self.opener.config().seek_frames(session.format().sample_rate);
        let target = match dir {
            SeekDirection::Forward => played.saturating_add(distance),
            SeekDirection::Backward => played.saturating_sub(distance),
        };
        match session.seek_to(target) {
            Ok(pos) => {
                let format = session.format();
                tracing::debug!(
                    ?dir,
                    from_ms = format.frames_to_millis(played),
                    to_ms = format.frames_to_millis(pos),
                    "seek"
                );
                Flow::Reposition
            }
            Err(e) => Flow::Exit(SessionEnd::Failed(e.to_string())),
        }
    }
}
