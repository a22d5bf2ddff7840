//! Command frame encoding and inbound line classification.
//!
//! The command channel carries newline-terminated ASCII lines. Commands flow
//! from client to radio; replies, status lines, messages and the two
//! handshake lines flow back.
//!
//! # Line formats
//!
//! ```text
//! Command:   C<seq>|<command_text>\n
//! Diag cmd:  CD<seq>|<command_text>\n
//! Reply:     R<seq>|<hex_code>|<reply_text>\n
//! Status:    S<hex_handle>|<object> <rest>\n
//! Message:   M<hex_code>|<text>\n
//! Version:   V<major>.<minor>.<patch>.<build>\n
//! Handle:    H<hex_handle>\n
//! ```
//!
//! All encoding/decoding in this module is pure parsing -- no I/O is performed.

use bytes::{BufMut, Bytes, BytesMut};
use flexkit_core::{Error, Result};

// ---------------------------------------------------------------------------
// Frequency conversion helpers
// ---------------------------------------------------------------------------

/// Convert frequency in Hz (`u64`) to MHz (`f64`) for outbound commands.
pub fn hz_to_mhz(hz: u64) -> f64 {
    hz as f64 / 1_000_000.0
}

/// Convert frequency in MHz (`f64`) to integer Hz.
pub fn mhz_to_hz(mhz: f64) -> u64 {
    (mhz * 1_000_000.0).round() as u64
}

// ---------------------------------------------------------------------------
// Command encoding
// ---------------------------------------------------------------------------

/// Encode a command frame with the given sequence number.
///
/// Format: `C<seq>|<command>\n`, or `CD<seq>|<command>\n` when `diagnostic`
/// is set.
pub fn encode_command(seq: u32, command: &str, diagnostic: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(command.len() + 16);
    buf.put_u8(b'C');
    if diagnostic {
        buf.put_u8(b'D');
    }
    buf.put_slice(seq.to_string().as_bytes());
    buf.put_u8(b'|');
    buf.put_slice(command.as_bytes());
    buf.put_u8(b'\n');
    buf.freeze()
}

// ---------------------------------------------------------------------------
// Command builders
//
// Each builder returns the command text WITHOUT the `C<seq>|` prefix.
// ---------------------------------------------------------------------------

/// Subscribe to status for an object class.
///
/// Example output: `"sub slice all"`
pub fn cmd_subscribe(object: &str) -> String {
    format!("sub {}", object)
}

/// Register the client program name.
///
/// Example output: `"client program flexkit"`
pub fn cmd_client_program(name: &str) -> String {
    format!("client program {}", name)
}

// ---------------------------------------------------------------------------
// Inbound line types
// ---------------------------------------------------------------------------

/// A reply to a previously sent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Sequence number of the originating command.
    pub sequence: u32,
    /// Result code. `0` means success.
    pub code: u32,
    /// Reply text (may be empty).
    pub text: String,
}

/// An unsolicited status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// The client handle the status was addressed to.
    pub handle: u32,
    /// The object class, i.e. the first word (`"slice"`, `"display"`, `"meter"`).
    pub object: String,
    /// Everything after the object class, e.g. `"0 RF_frequency=14.2 mode=USB"`.
    pub rest: String,
}

/// A decoded handshake version line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

/// Types of lines received on a command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Handshake version line: `V1.4.0.0`
    Version(ProtocolVersion),
    /// Handshake client handle: `H12345678`
    Handle(u32),
    /// Reply to a command: `R<seq>|<code>|<text>`
    Reply(Reply),
    /// Status line: `S<handle>|<object> ...`
    Status(StatusLine),
    /// Informational message: `M<code>|<text>`
    Message(String),
    /// An unrecognised line.
    Unknown(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Classify a single line received on the command channel.
///
/// The line should NOT include the trailing `\n`. Surrounding whitespace is
/// stripped.
pub fn parse_line(line: &str) -> Result<Inbound> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::Protocol("empty line".into()));
    }

    match line.as_bytes()[0] {
        b'V' => parse_version(line),
        b'H' => parse_handle(line),
        b'R' => parse_reply(line),
        b'S' => parse_status(line),
        b'M' => parse_msg(line),
        _ => Ok(Inbound::Unknown(line.to_string())),
    }
}

/// Parse a version line: `V<major>.<minor>.<patch>.<build>`
fn parse_version(line: &str) -> Result<Inbound> {
    let parts: Vec<&str> = line[1..].split('.').collect();
    if parts.len() != 4 {
        return Err(Error::Protocol(format!("invalid version format: {line}")));
    }

    let parse_u32 = |s: &str| -> Result<u32> {
        s.parse::<u32>()
            .map_err(|_| Error::Protocol(format!("invalid version number: {s}")))
    };

    Ok(Inbound::Version(ProtocolVersion {
        major: parse_u32(parts[0])?,
        minor: parse_u32(parts[1])?,
        patch: parse_u32(parts[2])?,
        build: parse_u32(parts[3])?,
    }))
}

/// Parse a handle line: `H<hex>`
fn parse_handle(line: &str) -> Result<Inbound> {
    let body = &line[1..];
    let handle = parse_hex_u32(body)
        .ok_or_else(|| Error::Protocol(format!("invalid hex handle: {body}")))?;
    Ok(Inbound::Handle(handle))
}

/// Parse a reply line: `R<seq>|<hex_code>|<text>`
fn parse_reply(line: &str) -> Result<Inbound> {
    let parts: Vec<&str> = line[1..].splitn(3, '|').collect();
    if parts.len() < 2 {
        return Err(Error::Protocol(format!(
            "malformed reply (need at least seq|code): {line}"
        )));
    }

    let sequence = parts[0]
        .parse::<u32>()
        .map_err(|_| Error::Protocol(format!("invalid reply sequence number: {}", parts[0])))?;
    let code = parse_hex_u32(parts[1])
        .ok_or_else(|| Error::Protocol(format!("invalid reply code: {}", parts[1])))?;
    let text = parts.get(2).map(|s| s.to_string()).unwrap_or_default();

    Ok(Inbound::Reply(Reply {
        sequence,
        code,
        text,
    }))
}

/// Parse a status line: `S<hex_handle>|<object> <rest>`
fn parse_status(line: &str) -> Result<Inbound> {
    let (handle_str, payload) = line[1..]
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed status (no pipe): {line}")))?;
    let handle = parse_hex_u32(handle_str)
        .ok_or_else(|| Error::Protocol(format!("invalid status handle: {handle_str}")))?;

    let payload = payload.trim_start();
    let (object, rest) = match payload.split_once(' ') {
        Some((object, rest)) => (object, rest.trim_start()),
        None => (payload, ""),
    };

    Ok(Inbound::Status(StatusLine {
        handle,
        object: object.to_string(),
        rest: rest.to_string(),
    }))
}

/// Parse a message line: `M<code>|<text>`
fn parse_msg(line: &str) -> Result<Inbound> {
    let (_code, text) = line[1..]
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed message (no pipe): {line}")))?;
    Ok(Inbound::Message(text.to_string()))
}

/// Parse a hexadecimal `u32`, with or without a `0x` prefix.
pub fn parse_hex_u32(s: &str) -> Option<u32> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).ok()
}
