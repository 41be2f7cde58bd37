//! Wire protocol shared by the `playd` daemon and its clients.
//!
//! A single TCP connection carries packets in both directions:
//! - client → daemon: commands (`Play`, `Pause`, `Stop`, ...)
//! - daemon → client: status updates (`Playing`, `Stopped`, ...)
//!
//! Packet format (all integers big-endian):
//! - code: u32
//! - size: u32
//! - payload: [u8; size] (optional string, e.g. a file path for `Play`)

use std::io::{self, Read, Write};

use thiserror::Error;

/// Fixed daemon port.
pub const DEFAULT_PORT: u16 = 10000;
/// Default bind address (loopback only).
pub const DEFAULT_BIND: &str = "127.0.0.1:10000";
/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 8;
/// Default upper bound on a single payload.
pub const DEFAULT_MAX_PAYLOAD: u32 = 4096;

/// Client → daemon command codes.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    Unknown = 0,
    Play = 1,
    Stop = 2,
    Quit = 3,
    Pause = 4,
    FastForward = 5,
    Rewind = 6,
}

impl CommandCode {
    /// Map a raw code to a command; `None` for anything this daemon does not know.
    pub fn from_u32(code: u32) -> Option<Self> {
        let c = match code {
            0 => CommandCode::Unknown,
            1 => CommandCode::Play,
            2 => CommandCode::Stop,
            3 => CommandCode::Quit,
            4 => CommandCode::Pause,
            5 => CommandCode::FastForward,
            6 => CommandCode::Rewind,
            _ => return None,
        };
        Some(c)
    }
}

/// Daemon → client status codes.
///
/// Numbered after the command codes so the two spaces never overlap.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Unknown = 7,
    Playing = 8,
    Stopped = 9,
    Paused = 10,
    Quitting = 11,
    Error = 12,
}

impl StatusCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        let c = match code {
            7 => StatusCode::Unknown,
            8 => StatusCode::Playing,
            9 => StatusCode::Stopped,
            10 => StatusCode::Paused,
            11 => StatusCode::Quitting,
            12 => StatusCode::Error,
            _ => return None,
        };
        Some(c)
    }
}

/// Framing failures. Every variant is fatal to the connection it occurred on.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed by peer")]
    Closed,
    #[error("short header: got {got} of 8 bytes")]
    ShortHeader { got: usize },
    #[error("short payload: got {got} of {expected} bytes")]
    ShortPayload { expected: u32, got: usize },
    #[error("payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: u32, limit: u32 },
    #[error("payload too large to encode")]
    Unencodable,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub code: u32,
    pub size: u32,
}

impl Header {
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.code.to_be_bytes());
        out[4..].copy_from_slice(&self.size.to_be_bytes());
        out
    }

    pub fn from_bytes(b: [u8; HEADER_LEN]) -> Self {
        Self {
            code: u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            size: u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
        }
    }
}

/// One packet as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub code: u32,
    /// `None` when the header declared a zero size.
    pub payload: Option<Vec<u8>>,
}

impl Packet {
    pub fn new(code: u32, payload: Option<Vec<u8>>) -> Self {
        Self { code, payload }
    }

    /// Payload as a string, bounded by the declared size.
    ///
    /// Trailing NUL bytes are stripped (some senders terminate strings); invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn payload_str(&self) -> Option<String> {
        let bytes = self.payload.as_deref()?;
        let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        if end == 0 {
            return None;
        }
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Encode a packet (header + payload) into a single buffer.
pub fn encode_packet(code: u32, payload: Option<&[u8]>) -> Result<Vec<u8>, FrameError> {
    let body = payload.unwrap_or(&[]);
    let size: u32 = body.len().try_into().map_err(|_| FrameError::Unencodable)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&Header { code, size }.to_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Write one packet with a single `write_all`, so concurrent writers never interleave halves.
pub fn write_packet(mut w: impl Write, code: u32, payload: Option<&[u8]>) -> Result<(), FrameError> {
    let buf = encode_packet(code, payload)?;
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// Read one packet.
///
/// A clean EOF before any header byte is [`FrameError::Closed`]; any partial header or payload
/// is a framing error. Payloads larger than `max_payload` are rejected before allocation.
pub fn read_packet(mut r: impl Read, max_payload: u32) -> Result<Packet, FrameError> {
    let mut hdr = [0u8; HEADER_LEN];
    let got = read_full(&mut r, &mut hdr)?;
    if got == 0 {
        return Err(FrameError::Closed);
    }
    if got < HEADER_LEN {
        return Err(FrameError::ShortHeader { got });
    }
    let header = Header::from_bytes(hdr);
    if header.size == 0 {
        return Ok(Packet::new(header.code, None));
    }
    if header.size > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: header.size,
            limit: max_payload,
        });
    }

    let mut payload = vec![0u8; header.size as usize];
    let got = read_full(&mut r, &mut payload)?;
    if got < payload.len() {
        return Err(FrameError::ShortPayload {
            expected: header.size,
            got,
        });
    }
    Ok(Packet::new(header.code, Some(payload)))
}

/// Fill `buf` as far as the reader allows; returns the number of bytes read before EOF.
fn read_full(r: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
