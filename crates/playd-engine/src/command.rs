//! Commands, status events, and their wire conversions.

use std::path::PathBuf;

use playd_proto::{CommandCode, Packet, StatusCode};

/// A transport command issued by the controlling client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Play a file. An empty path means "the current file" (resume when paused).
    Play(PathBuf),
    Pause,
    Stop,
    Quit,
    FastForward,
    Rewind,
}

impl Command {
    /// Decode a client packet. Unknown codes (including the reserved `Unknown = 0`) yield `None`.
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        let cmd = match CommandCode::from_u32(packet.code)? {
            CommandCode::Unknown => return None,
            CommandCode::Play => Command::Play(PathBuf::from(packet.payload_str().unwrap_or_default())),
            CommandCode::Stop => Command::Stop,
            CommandCode::Quit => Command::Quit,
            CommandCode::Pause => Command::Pause,
            CommandCode::FastForward => Command::FastForward,
            CommandCode::Rewind => Command::Rewind,
        };
        Some(cmd)
    }

    /// Encode as a client packet.
    pub fn to_packet(&self) -> Packet {
        match self {
            Command::Play(path) => {
                let s = path.to_string_lossy();
                let payload = if s.is_empty() { None } else { Some(s.as_bytes().to_vec()) };
                Packet::new(CommandCode::Play as u32, payload)
            }
            Command::Stop => Packet::new(CommandCode::Stop as u32, None),
            Command::Quit => Packet::new(CommandCode::Quit as u32, None),
            Command::Pause => Packet::new(CommandCode::Pause as u32, None),
            Command::FastForward => Packet::new(CommandCode::FastForward as u32, None),
            Command::Rewind => Packet::new(CommandCode::Rewind as u32, None),
        }
    }

    /// Lower-case label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Quit => "quit",
            Command::FastForward => "fast-forward",
            Command::Rewind => "rewind",
        }
    }
}

/// What the transport is doing right now.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle = 0,
    Playing = 1,
    Paused = 2,
    Stopped = 3,
    Error = 4,
}

impl PlaybackState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            3 => PlaybackState::Stopped,
            4 => PlaybackState::Error,
            _ => PlaybackState::Idle,
        }
    }

    /// True when a session is live (playing or paused).
    pub fn has_session(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Playing,
    Paused,
    Stopped,
    Error,
    /// Terminal event: delivered as `Quitting`, then the notifier exits.
    Quit,
}

/// Status update for the controlling client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub info: Option<String>,
}

impl StatusEvent {
    pub fn new(kind: StatusKind) -> Self {
        Self { kind, info: None }
    }

    /// Status carrying a track path or error text.
    pub fn with_info(kind: StatusKind, info: impl Into<String>) -> Self {
        Self {
            kind,
            info: Some(info.into()),
        }
    }

    pub fn code(&self) -> StatusCode {
        match self.kind {
            StatusKind::Playing => StatusCode::Playing,
            StatusKind::Paused => StatusCode::Paused,
            StatusKind::Stopped => StatusCode::Stopped,
            StatusKind::Error => StatusCode::Error,
            StatusKind::Quit => StatusCode::Quitting,
        }
    }

    pub fn to_packet(&self) -> Packet {
        let payload = self.info.as_ref().map(|s| s.as_bytes().to_vec());
        Packet::new(self.code() as u32, payload)
    }

    /// Decode a daemon packet; `None` for codes outside the status space or `Unknown`.
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        let kind = match StatusCode::from_u32(packet.code)? {
            StatusCode::Unknown => return None,
            StatusCode::Playing => StatusKind::Playing,
            StatusCode::Stopped => StatusKind::Stopped,
            StatusCode::Paused => StatusKind::Paused,
            StatusCode::Quitting => StatusKind::Quit,
            StatusCode::Error => StatusKind::Error,
        };
        Some(Self {
            kind,
            info: packet.payload_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_packet_carries_path() {
        let pkt = Command::Play(PathBuf::from("/music/a.flac")).to_packet();
        assert_eq!(pkt.code, 1);
        assert_eq!(
            Command::from_packet(&pkt),
            Some(Command::Play(PathBuf::from("/music/a.flac")))
        );
    }

    #[test]
    fn play_without_payload_is_empty_path() {
        let pkt = Packet::new(1, None);
        assert_eq!(Command::from_packet(&pkt), Some(Command::Play(PathBuf::new())));
    }

    #[test]
    fn unknown_and_reserved_codes_are_ignored() {
        assert_eq!(Command::from_packet(&Packet::new(0, None)), None);
        assert_eq!(Command::from_packet(&Packet::new(99, None)), None);
        // Status codes are not commands.
        assert_eq!(Command::from_packet(&Packet::new(8, None)), None);
    }

    #[test]
    fn status_codes_match_wire_numbers() {
        assert_eq!(StatusEvent::new(StatusKind::Playing).to_packet().code, 8);
        assert_eq!(StatusEvent::new(StatusKind::Stopped).to_packet().code, 9);
        assert_eq!(StatusEvent::new(StatusKind::Paused).to_packet().code, 10);
        assert_eq!(StatusEvent::new(StatusKind::Quit).to_packet().code, 11);
        assert_eq!(StatusEvent::new(StatusKind::Error).to_packet().code, 12);
    }

    #[test]
    fn error_status_keeps_message() {
        let ev = StatusEvent::with_info(StatusKind::Error, "unsupported extension: xyz");
        let back = StatusEvent::from_packet(&ev.to_packet()).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn playback_state_byte_mapping() {
        for s in [
            PlaybackState::Idle,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Stopped,
            PlaybackState::Error,
        ] {
            assert_eq!(PlaybackState::from_u8(s as u8), s);
        }
        assert!(PlaybackState::Paused.has_session());
        assert!(!PlaybackState::Error.has_session());
    }
}
