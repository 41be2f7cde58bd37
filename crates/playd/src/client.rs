//! `playd send`: a one-shot control client.

use std::net::{Shutdown, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{RecvTimeoutError, unbounded};
use playd_engine::command::{StatusEvent, StatusKind};

use crate::cli::SendArgs;

pub fn run_send(args: &SendArgs) -> Result<()> {
    let cmd = args.action.to_command();
    let stream = TcpStream::connect(&args.addr).with_context(|| format!("connect {}", args.addr))?;
    let _ = stream.set_nodelay(true);
    let packet = cmd.to_packet();
    playd_proto::write_packet(&stream, packet.code, packet.payload.as_deref())
        .with_context(|| format!("send {}", cmd.name()))?;
    tracing::debug!(command = cmd.name(), addr = %args.addr, "command sent");

    let until = if args.follow {
        Until::PlaybackEnds
    } else {
        Until::Elapsed(Duration::from_millis(args.wait_ms))
    };
    collect_statuses(stream, until, |ev| {
        println!("{}", describe(ev));
    })?;
    Ok(())
}

/// When `playd send` hangs up. Disconnecting also stops playback on the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    /// After a fixed time, or earlier on `Quitting`.
    Elapsed(Duration),
    /// On the first `Stopped`, `Error`, or `Quitting`.
    PlaybackEnds,
}

impl Until {
    fn is_final(self, ev: &StatusEvent) -> bool {
        match self {
            Until::Elapsed(_) => ev.kind == StatusKind::Quit,
            Until::PlaybackEnds => {
                matches!(ev.kind, StatusKind::Stopped | StatusKind::Error | StatusKind::Quit)
            }
        }
    }
}

/// Read status packets until `until` is met or the daemon closes the connection. Every event is
/// passed to `on_event` as it comes in.
pub fn collect_statuses(
    stream: TcpStream,
    until: Until,
    mut on_event: impl FnMut(&StatusEvent),
) -> Result<Vec<StatusEvent>> {
    let reader = stream.try_clone().context("clone stream")?;
    let (tx, rx) = unbounded();
    let handle = thread::Builder::new()
        .name("status-reader".to_string())
        .spawn(move || {
            loop {
                match playd_proto::read_packet(&reader, playd_proto::DEFAULT_MAX_PAYLOAD) {
                    Ok(packet) => match StatusEvent::from_packet(&packet) {
                        Some(ev) => {
                            if tx.send(ev).is_err() {
                                break;
                            }
                        }
                        None => tracing::debug!(code = packet.code, "ignoring unknown status code"),
                    },
                    Err(e) => {
                        tracing::debug!("status stream ended: {e}");
                        break;
                    }
                }
            }
        })
        .context("spawn status reader")?;

    let deadline = match until {
        Until::Elapsed(wait) => Some(Instant::now() + wait),
        Until::PlaybackEnds => None,
    };
    let mut events = Vec::new();
    loop {
        let next = match deadline {
            Some(d) => rx.recv_timeout(d.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match next {
            Ok(ev) => {
                on_event(&ev);
                let done = until.is_final(&ev);
                events.push(ev);
                if done {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
    if handle.join().is_err() {
        tracing::warn!("status reader panicked");
    }
    Ok(events)
}

fn describe(ev: &StatusEvent) -> String {
    let label = match ev.kind {
        StatusKind::Playing => "playing",
        StatusKind::Paused => "paused",
        StatusKind::Stopped => "stopped",
        StatusKind::Error => "error",
        StatusKind::Quit => "quitting",
    };
    match ev.info.as_deref() {
        Some(info) if !info.is_empty() => format!("{label}: {info}"),
        _ => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn serve_statuses(events: Vec<StatusEvent>, hold: Duration) -> (std::net::SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let t = thread::spawn(move || {
            let (s, _) = listener.accept().unwrap();
            for ev in events {
                let p = ev.to_packet();
                playd_proto::write_packet(&s, p.code, p.payload.as_deref()).unwrap();
            }
            thread::sleep(hold);
        });
        (addr, t)
    }

    #[test]
    fn stops_at_quitting() {
        let (addr, t) = serve_statuses(
            vec![
                StatusEvent::new(StatusKind::Stopped),
                StatusEvent::new(StatusKind::Quit),
                StatusEvent::new(StatusKind::Playing),
            ],
            Duration::from_secs(2),
        );
        let stream = TcpStream::connect(addr).unwrap();
        let started = Instant::now();
        let mut seen = 0;
        let events = collect_statuses(stream, Until::Elapsed(Duration::from_secs(10)), |_| seen += 1).unwrap();
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![StatusKind::Stopped, StatusKind::Quit]
        );
        assert_eq!(seen, 2);
        assert!(started.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }

    #[test]
    fn stops_when_daemon_closes() {
        let (addr, t) = serve_statuses(
            vec![StatusEvent::with_info(StatusKind::Playing, "/a.flac")],
            Duration::ZERO,
        );
        let stream = TcpStream::connect(addr).unwrap();
        let events = collect_statuses(stream, Until::Elapsed(Duration::from_secs(10)), |_| {}).unwrap();
        assert_eq!(events, vec![StatusEvent::with_info(StatusKind::Playing, "/a.flac")]);
        t.join().unwrap();
    }

    #[test]
    fn stops_after_wait_elapses() {
        let (addr, t) = serve_statuses(Vec::new(), Duration::from_millis(500));
        let stream = TcpStream::connect(addr).unwrap();
        let started = Instant::now();
        let events = collect_statuses(stream, Until::Elapsed(Duration::from_millis(50)), |_| {}).unwrap();
        assert!(events.is_empty());
        assert!(started.elapsed() < Duration::from_millis(450));
        t.join().unwrap();
    }

    #[test]
    fn follow_stops_at_end_of_playback() {
        let (addr, t) = serve_statuses(
            vec![
                StatusEvent::with_info(StatusKind::Playing, "/a.flac"),
                StatusEvent::new(StatusKind::Paused),
                StatusEvent::with_info(StatusKind::Playing, "/a.flac"),
                StatusEvent::new(StatusKind::Stopped),
                StatusEvent::new(StatusKind::Playing),
            ],
            Duration::from_secs(2),
        );
        let stream = TcpStream::connect(addr).unwrap();
        let started = Instant::now();
        let events = collect_statuses(stream, Until::PlaybackEnds, |_| {}).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events.last().map(|e| e.kind), Some(StatusKind::Stopped));
        assert!(started.elapsed() < Duration::from_secs(2));
        t.join().unwrap();
    }

    #[test]
    fn describe_includes_info() {
        assert_eq!(describe(&StatusEvent::new(StatusKind::Stopped)), "stopped");
        assert_eq!(
            describe(&StatusEvent::with_info(StatusKind::Error, "cannot open x")),
            "error: cannot open x"
        );
    }
}
