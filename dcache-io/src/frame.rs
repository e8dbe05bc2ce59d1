//! # Wire Framing
//!
//! Purpose: Define the datagram packet header and the binary request stamp
//! shared by the stream and datagram paths.
//!
//! ## Design Principles
//! 1. **Fixed Layout**: the datagram header is always eight bytes, all
//!    fields big-endian, so a receiver can reassemble without negotiation.
//! 2. **Engine-Owned Identifiers**: message and request identifiers are
//!    stamped by the connection, never chosen by callers.

use bytes::BufMut;

/// Encoded size of [`DatagramHeader`] in bytes.
pub const DATAGRAM_HEADER_LEN: usize = 8;

/// Magic byte opening every binary-protocol request.
pub const BINARY_MAGIC_REQUEST: u8 = 0x80;

/// Line delimiter for text-protocol responses.
pub const LINE_DELIMITER: u8 = b'\n';

/// Per-packet header prepended to every outgoing datagram.
///
/// Layout (big-endian): message id, fragment sequence, total fragments,
/// and a reserved word that is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    /// Identifier shared by all fragments of one logical message.
    pub message_id: u16,
    /// Zero-based index of this fragment within the message.
    pub sequence: u16,
    /// Total number of fragments in the message.
    pub total: u16,
}

impl DatagramHeader {
    /// Writes the header into `out`, which must hold at least
    /// [`DATAGRAM_HEADER_LEN`] bytes.
    pub fn encode(&self, mut out: &mut [u8]) {
        debug_assert!(out.len() >= DATAGRAM_HEADER_LEN);
        out.put_u16(self.message_id);
        out.put_u16(self.sequence);
        out.put_u16(self.total);
        out.put_u16(0);
    }
}

/// Identifier fields the engine stamps onto a binary-protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryRequestStamp {
    /// Always [`BINARY_MAGIC_REQUEST`].
    pub magic: u8,
    /// Monotonically increasing request identifier, per connection.
    pub request_id: u16,
}
