//! Wire format for a cTCP segment: fixed header, Internet checksum, payload.
//!
//! All multi-byte header fields travel big-endian on the wire; in memory
//! they are held in host order. Encoding/decoding and the checksum are kept
//! together here since the checksum is only ever computed over the wire
//! (network-order) form of a segment.

use std::fmt;

/// Size in bytes of the fixed cTCP header (`seqno`, `ackno`, `len`, `flags`,
/// `window`, `cksum`).
pub const HEADER_SIZE: usize = 4 + 4 + 2 + 4 + 2 + 2;

/// Segment carries a cumulative ACK.
pub const ACK: u32 = 1 << 0;
/// Segment consumes one sequence number to signal end-of-stream.
pub const FIN: u32 = 1 << 1;

/// A decoded cTCP segment, header fields in host byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seqno: u32,
    pub ackno: u32,
    pub flags: u32,
    pub window: u16,
    pub data: Vec<u8>,
}

impl Segment {
    pub fn flag(&self, bit: u32) -> bool {
        self.flags & bit != 0
    }

    /// Total wire length of this segment: header plus payload.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }

    /// Sequence number one past the last byte (or control bit) this segment
    /// occupies. For a pure-ACK segment with no FIN this equals `seqno`.
    pub fn seq_end(&self) -> u32 {
        self.seqno
            .wrapping_add(self.data.len() as u32)
            .wrapping_add(if self.flag(FIN) { 1 } else { 0 })
    }

    /// Encodes this segment to its wire (network byte order) representation,
    /// computing the Internet checksum over the zeroed-checksum form.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.wire_len() as u16;
        let mut buf = Vec::with_capacity(len as usize);

        buf.extend_from_slice(&self.seqno.to_be_bytes());
        buf.extend_from_slice(&self.ackno.to_be_bytes());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.window.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // cksum placeholder
        buf.extend_from_slice(&self.data);

        let cksum = internet_checksum(&buf);
        buf[CKSUM_OFFSET..CKSUM_OFFSET + 2].copy_from_slice(&cksum.to_be_bytes());

        buf
    }

    /// Decodes a wire-format segment, validating length and checksum.
    ///
    /// Returns `None` on truncation or checksum mismatch; the caller should
    /// drop the datagram silently and rely on the peer's retransmission
    /// timer, per the error-handling design.
    pub fn decode(bytes: &[u8]) -> Option<Segment> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }

        let len = u16::from_be_bytes([bytes[8], bytes[9]]) as usize;
        if len < HEADER_SIZE || len > bytes.len() {
            return None;
        }

        let mut verify = bytes[..len].to_vec();
        let wire_cksum = u16::from_be_bytes([verify[CKSUM_OFFSET], verify[CKSUM_OFFSET + 1]]);
        verify[CKSUM_OFFSET] = 0;
        verify[CKSUM_OFFSET + 1] = 0;
        if internet_checksum(&verify) != wire_cksum {
            return None;
        }

        let seqno = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let ackno = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        let flags = u32::from_be_bytes(bytes[10..14].try_into().unwrap());
        let window = u16::from_be_bytes(bytes[14..16].try_into().unwrap());
        let data = bytes[HEADER_SIZE..len].to_vec();

        Some(Segment {
            seqno,
            ackno,
            flags,
            window,
            data,
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seqno={} ackno={} len={} ack={} fin={} window={}",
            self.seqno,
            self.ackno,
            self.wire_len(),
            self.flag(ACK),
            self.flag(FIN),
            self.window
        )
    }
}

const CKSUM_OFFSET: usize = 4 + 4 + 2 + 4 + 2;

/// 16-bit one's-complement Internet checksum (RFC 1071) over `bytes`, which
/// must have any checksum field already zeroed. An odd trailing byte is
/// treated as the high byte of a zero-padded 16-bit word.
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = bytes.chunks_exact(2);

    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}
