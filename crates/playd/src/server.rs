//! Per-connection command reader.

use std::io::Read;

use playd_engine::command::Command;
use playd_engine::controller::Controller;
use playd_proto::FrameError;

/// Why a connection stopped being read.
#[derive(Debug)]
pub enum ConnectionEnd {
    /// The client asked the daemon to quit.
    Quit,
    /// The stream ended or a packet could not be framed.
    Dropped(FrameError),
}

/// Read packets from one client and post the commands they carry.
///
/// Packets with unknown codes are skipped. Returns after a `Quit` has been posted or the
/// stream fails.
pub fn serve_connection<R: Read>(mut reader: R, controller: &Controller, max_payload: u32) -> ConnectionEnd {
    loop {
        let packet = match playd_proto::read_packet(&mut reader, max_payload) {
            Ok(p) => p,
            Err(e) => return ConnectionEnd::Dropped(e),
        };
        let Some(cmd) = Command::from_packet(&packet) else {
            tracing::debug!(code = packet.code, "ignoring unknown command code");
            continue;
        };
        tracing::debug!(command = cmd.name(), "command received");
        let quit = cmd == Command::Quit;
        controller.post(cmd);
        if quit {
            return ConnectionEnd::Quit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn stream(packets: &[(u32, Option<&[u8]>)]) -> Cursor<Vec<u8>> {
        let mut buf = Vec::new();
        for (code, payload) in packets {
            playd_proto::write_packet(&mut buf, *code, *payload).unwrap();
        }
        Cursor::new(buf)
    }

    #[test]
    fn posts_commands_until_eof() {
        let c = Controller::new();
        let end = serve_connection(stream(&[(1, Some(b"/a.flac"))]), &c, 4096);
        assert!(matches!(end, ConnectionEnd::Dropped(FrameError::Closed)));
        assert_eq!(c.wait_for_command(false), Some(Command::Play(PathBuf::from("/a.flac"))));
    }

    #[test]
    fn quit_ends_reading() {
        let c = Controller::new();
        let end = serve_connection(stream(&[(3, None), (1, Some(b"/b.flac"))]), &c, 4096);
        assert!(matches!(end, ConnectionEnd::Quit));
        assert_eq!(c.wait_for_command(false), Some(Command::Quit));
    }

    #[test]
    fn unknown_codes_are_skipped() {
        let c = Controller::new();
        let end = serve_connection(stream(&[(0, None), (99, Some(b"x")), (4, None)]), &c, 4096);
        assert!(matches!(end, ConnectionEnd::Dropped(FrameError::Closed)));
        assert_eq!(c.wait_for_command(false), Some(Command::Pause));
    }

    #[test]
    fn oversized_payload_drops_connection() {
        let c = Controller::new();
        let end = serve_connection(stream(&[(1, Some(&[b'a'; 64]))]), &c, 16);
        assert!(matches!(end, ConnectionEnd::Dropped(FrameError::PayloadTooLarge { .. })));
        assert_eq!(c.wait_for_command(false), None);
    }

    #[test]
    fn truncated_header_drops_connection() {
        let c = Controller::new();
        let end = serve_connection(Cursor::new(vec![0u8, 0, 0]), &c, 4096);
        assert!(matches!(end, ConnectionEnd::Dropped(FrameError::ShortHeader { got: 3 })));
    }
}
