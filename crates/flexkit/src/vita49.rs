//! VITA-49.0 framing of discovery broadcasts.
//!
//! Radios announce themselves by broadcasting VITA-49 extension-data packets
//! with packet class code `0xFFFF` on UDP port 4992. The payload is
//! space-separated `key=value` text, padded to a 32-bit boundary.
//!
//! ```text
//! offset  0  header word: type(4) C(1) T(1) rr TSI(2) TSF(2) count(4) size(16)
//! offset  4  stream id
//! offset  8  OUI (24) | reserved (8)
//! offset 12  information class (16) | packet class (16)
//! offset 16  integer timestamp
//! offset 20  fractional timestamp (64)
//! offset 28  payload ... [trailer]
//! ```
//!
//! Pure parsing and encoding, no I/O.

use bytes::{BufMut, Bytes, BytesMut};
use flexkit_core::error::{Error, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 28;

/// Vendor OUI carried in the class id.
pub const VENDOR_OUI: u32 = 0x001C2D;

/// Information class code used by the vendor.
pub const INFO_CLASS_CODE: u16 = 0x534C;

/// Packet class code of a discovery broadcast.
pub const DISCOVERY_CLASS_CODE: u16 = 0xFFFF;

/// Packet type: extension data with stream id.
const EXT_DATA_WITH_STREAM_ID: u8 = 0x3;

/// Parsed packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub class_id_present: bool,
    pub trailer_present: bool,
    /// 4-bit rolling counter.
    pub packet_count: u8,
    /// Total size in 32-bit words, header included.
    pub size_words: u16,
    pub stream_id: u32,
    pub oui: u32,
    pub info_class_code: u16,
    pub packet_class_code: u16,
    /// Integer timestamp, seconds.
    pub timestamp: u32,
}

impl PacketHeader {
    pub fn is_discovery(&self) -> bool {
        self.packet_class_code == DISCOVERY_CLASS_CODE
    }
}

/// A packet borrowed from the receive buffer.
#[derive(Debug, PartialEq)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Parse one datagram.
///
/// The declared size must fit in the buffer. Bytes past the declared size
/// and the trailer word, when present, are excluded from the payload.
pub fn parse_packet(data: &[u8]) -> Result<Packet<'_>> {
    if data.len() < HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "VITA-49 packet too short: {} bytes",
            data.len()
        )));
    }

    let word = be_u32(data, 0);
    let trailer_present = (word >> 26) & 1 == 1;
    let size_words = (word & 0xFFFF) as u16;
    let size = usize::from(size_words) * 4;
    if size > data.len() {
        return Err(Error::Protocol(format!(
            "VITA-49 size {size} exceeds datagram length {}",
            data.len()
        )));
    }
    let end = if trailer_present { size.saturating_sub(4) } else { size };
    if end < HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "VITA-49 declared size {size} is smaller than the header"
        )));
    }

    let class_lower = be_u32(data, 12);
    let header = PacketHeader {
        packet_type: ((word >> 28) & 0x0F) as u8,
        class_id_present: (word >> 27) & 1 == 1,
        trailer_present,
        packet_count: ((word >> 16) & 0x0F) as u8,
        size_words,
        stream_id: be_u32(data, 4),
        oui: (be_u32(data, 8) >> 8) & 0x00FF_FFFF,
        info_class_code: (class_lower >> 16) as u16,
        packet_class_code: (class_lower & 0xFFFF) as u16,
        timestamp: be_u32(data, 16),
    };

    if header.oui != VENDOR_OUI {
        tracing::trace!(oui = header.oui, "VITA-49 packet from unexpected vendor");
    }

    Ok(Packet {
        header,
        payload: &data[HEADER_SIZE..end],
    })
}

/// Frame a discovery payload, padding it with spaces to a word boundary.
pub fn encode_discovery(payload: &str, packet_count: u8) -> Bytes {
    let padded = payload.len().div_ceil(4) * 4;
    let size_words = ((HEADER_SIZE + padded) / 4) as u32;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + padded);
    let mut word = u32::from(EXT_DATA_WITH_STREAM_ID) << 28;
    word |= 1 << 27; // class id present
    word |= 0x1 << 22; // TSI: UTC
    word |= u32::from(packet_count & 0x0F) << 16;
    word |= size_words & 0xFFFF;
    buf.put_u32(word);
    buf.put_u32(0x0000_0800);
    buf.put_u32(VENDOR_OUI << 8);
    buf.put_u32((u32::from(INFO_CLASS_CODE) << 16) | u32::from(DISCOVERY_CLASS_CODE));
    buf.put_u32(0);
    buf.put_u64(0);
    buf.put_slice(payload.as_bytes());
    buf.put_bytes(b' ', padded - payload.len());
    buf.freeze()
}
