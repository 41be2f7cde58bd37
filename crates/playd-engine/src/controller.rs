//! Playback controller: the single authority for what should currently be happening.
//!
//! Commands land in a latest-wins [`Mailbox`]; the playback loop consumes them. The controller
//! never waits on the loop, and the loop publishes its [`PlaybackState`] back here so other
//! threads can observe it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::command::{Command, PlaybackState};
use crate::mailbox::Mailbox;

/// Seek direction for fast-forward/rewind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// What the playback loop must do to apply a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No session is live: open one.
    Open(PathBuf),
    /// Tear the live session down, then open a new one.
    Replace(PathBuf),
    /// Pause output and wait for the next command.
    Suspend,
    /// Leave the paused wait.
    Resume,
    /// Seek and continue playing.
    Seek(SeekDirection),
    /// Tear the live session down and report `Stopped`.
    Teardown,
    /// No session to tear down; report `Stopped` anyway.
    AcknowledgeStop,
    /// Tear everything down and exit the loop.
    Shutdown,
    /// Inapplicable in the current state.
    Ignore,
}

/// Transition table: `(state, command)` → `(next state, action)`.
///
/// `current` is the file of the live session, used to tell "resume" from "switch track" when a
/// `Play` arrives while paused.
pub fn transition(state: PlaybackState, cmd: &Command, current: Option<&Path>) -> (PlaybackState, Action) {
    use PlaybackState::*;

    match (state, cmd) {
        (_, Command::Quit) => (Stopped, Action::Shutdown),

        (Idle | Stopped | Error, Command::Play(p)) => (Playing, Action::Open(p.clone())),
        (Playing, Command::Play(p)) => (Playing, Action::Replace(p.clone())),
        (Paused, Command::Play(p)) => {
            let same = p.as_os_str().is_empty() || current.is_some_and(|c| c == p.as_path());
            if same {
                (Playing, Action::Resume)
            } else {
                (Playing, Action::Replace(p.clone()))
            }
        }

        (Playing, Command::Pause) => (Paused, Action::Suspend),
        (Paused, Command::Pause) => (Playing, Action::Resume),

        (s, Command::Stop) if s.has_session() => (Stopped, Action::Teardown),
        (_, Command::Stop) => (Stopped, Action::AcknowledgeStop),

        (s, Command::FastForward) if s.has_session() => (Playing, Action::Seek(SeekDirection::Forward)),
        (s, Command::Rewind) if s.has_session() => (Playing, Action::Seek(SeekDirection::Backward)),

        (s, _) => (s, Action::Ignore),
    }
}

/// Command mailbox plus the published transport state.
///
/// Any thread may `post`; only the playback loop takes commands and publishes state.
pub struct Controller {
    commands: Mailbox<Command>,
    state: AtomicU8,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    /// Idle, with no pending command.
    pub fn new() -> Self {
        Self {
            commands: Mailbox::new(),
            state: AtomicU8::new(PlaybackState::Idle as u8),
        }
    }

    /// Submit a command and wake the playback loop.
    ///
    /// Supersession: `Stop`/`Quit` always replace a pending command; a pending `Play` is only
    /// replaced by a newer `Play`; a pending `Quit` is never replaced.
    pub fn post(&self, cmd: Command) {
        tracing::debug!(command = cmd.name(), "command posted");
        self.commands.update(|slot| {
            let keep_pending = match (slot.as_ref(), &cmd) {
                (Some(Command::Quit), _) => true,
                (_, Command::Stop | Command::Quit) => false,
                (Some(Command::Play(_)), Command::Play(_)) => false,
                (Some(Command::Play(_)), _) => true,
                _ => false,
            };
            if keep_pending {
                tracing::debug!(dropped = cmd.name(), "command superseded by pending command");
            } else {
                *slot = Some(cmd);
            }
        });
    }

    /// Take the next command.
    ///
    /// Blocking waits until one is posted and always returns `Some`; non-blocking returns the
    /// pending command, if any.
    pub fn wait_for_command(&self, blocking: bool) -> Option<Command> {
        if blocking {
            Some(self.commands.wait_take())
        } else {
            self.commands.take()
        }
    }

    /// State last published by the playback loop. Lock-free; may lag a just-posted command.
    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: PlaybackState) {
        let prev = self.state.swap(state as u8, Ordering::AcqRel);
        if prev != state as u8 {
            tracing::debug!(?state, "playback state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn play(p: &str) -> Command {
        Command::Play(PathBuf::from(p))
    }

    #[test]
    fn latest_command_wins() {
        let c = Controller::new();
        c.post(Command::Pause);
        c.post(Command::FastForward);
        c.post(Command::Rewind);
        assert_eq!(c.wait_for_command(false), Some(Command::Rewind));
        assert_eq!(c.wait_for_command(false), None);
    }

    #[test]
    fn pending_play_survives_pause_and_seek() {
        let c = Controller::new();
        c.post(play("a.wav"));
        c.post(Command::Pause);
        c.post(Command::FastForward);
        assert_eq!(c.wait_for_command(false), Some(play("a.wav")));
    }

    #[test]
    fn newer_play_replaces_pending_play() {
        let c = Controller::new();
        c.post(play("a.wav"));
        c.post(play("b.wav"));
        assert_eq!(c.wait_for_command(false), Some(play("b.wav")));
        assert_eq!(c.wait_for_command(false), None);
    }

    #[test]
    fn stop_cancels_pending_play() {
        let c = Controller::new();
        c.post(play("a.wav"));
        c.post(Command::Stop);
        assert_eq!(c.wait_for_command(false), Some(Command::Stop));
    }

    #[test]
    fn quit_is_never_replaced() {
        let c = Controller::new();
        c.post(Command::Quit);
        c.post(play("a.wav"));
        c.post(Command::Stop);
        assert_eq!(c.wait_for_command(false), Some(Command::Quit));
    }

    #[test]
    fn blocking_wait_wakes_on_post() {
        let c = Arc::new(Controller::new());
        let poster = c.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post(Command::Stop);
        });
        assert_eq!(c.wait_for_command(true), Some(Command::Stop));
        t.join().unwrap();
    }

    #[test]
    fn state_is_observable() {
        let c = Controller::new();
        assert_eq!(c.state(), PlaybackState::Idle);
        c.set_state(PlaybackState::Paused);
        assert_eq!(c.state(), PlaybackState::Paused);
    }

    #[test]
    fn table_play_from_idle_and_stopped_opens() {
        for s in [PlaybackState::Idle, PlaybackState::Stopped, PlaybackState::Error] {
            let (next, action) = transition(s, &play("a.wav"), None);
            assert_eq!(next, PlaybackState::Playing);
            assert_eq!(action, Action::Open(PathBuf::from("a.wav")));
        }
    }

    #[test]
    fn table_play_while_playing_replaces() {
        let (next, action) = transition(PlaybackState::Playing, &play("b.wav"), Some(Path::new("a.wav")));
        assert_eq!(next, PlaybackState::Playing);
        assert_eq!(action, Action::Replace(PathBuf::from("b.wav")));
    }

    #[test]
    fn table_pause_toggles() {
        assert_eq!(
            transition(PlaybackState::Playing, &Command::Pause, None),
            (PlaybackState::Paused, Action::Suspend)
        );
        assert_eq!(
            transition(PlaybackState::Paused, &Command::Pause, None),
            (PlaybackState::Playing, Action::Resume)
        );
    }

    #[test]
    fn table_play_while_paused_resumes_same_file() {
        let cur = Some(Path::new("a.wav"));
        assert_eq!(
            transition(PlaybackState::Paused, &play("a.wav"), cur),
            (PlaybackState::Playing, Action::Resume)
        );
        assert_eq!(
            transition(PlaybackState::Paused, &play(""), cur),
            (PlaybackState::Playing, Action::Resume)
        );
        assert_eq!(
            transition(PlaybackState::Paused, &play("b.wav"), cur),
            (PlaybackState::Playing, Action::Replace(PathBuf::from("b.wav")))
        );
    }

    #[test]
    fn table_stop_and_seek() {
        assert_eq!(
            transition(PlaybackState::Paused, &Command::Stop, None),
            (PlaybackState::Stopped, Action::Teardown)
        );
        assert_eq!(
            transition(PlaybackState::Idle, &Command::Stop, None),
            (PlaybackState::Stopped, Action::AcknowledgeStop)
        );
        assert_eq!(
            transition(PlaybackState::Paused, &Command::Rewind, None),
            (PlaybackState::Playing, Action::Seek(SeekDirection::Backward))
        );
        assert_eq!(
            transition(PlaybackState::Playing, &Command::FastForward, None),
            (PlaybackState::Playing, Action::Seek(SeekDirection::Forward))
        );
    }

    #[test]
    fn table_quit_from_anywhere() {
        for s in [
            PlaybackState::Idle,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Stopped,
            PlaybackState::Error,
        ] {
            assert_eq!(transition(s, &Command::Quit, None).1, Action::Shutdown);
        }
    }

    #[test]
    fn table_inapplicable_commands_are_noops() {
        for cmd in [Command::Pause, Command::FastForward, Command::Rewind] {
            assert_eq!(
                transition(PlaybackState::Idle, &cmd, None),
                (PlaybackState::Idle, Action::Ignore)
            );
        }
    }
}
