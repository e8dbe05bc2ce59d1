//! # Connection Buffers
//!
//! Purpose: Own the per-connection byte staging so cursor arithmetic lives
//! in one place and cannot drift out of bounds.
//!
//! ## Design Principles
//! 1. **Views, Not Cursors**: callers get an "unread" slice and a "free
//!    tail" slice; they never touch raw offsets.
//! 2. **Fixed Capacity**: both buffers allocate once at construction and
//!    never grow.
//! 3. **Reservation-Aware**: the write buffer can reserve a fixed prefix
//!    for a datagram header that survives every reset.

/// Inbound staging buffer.
///
/// Bytes arrive from the socket into the free tail and are consumed from
/// the front of the unread region.
pub(crate) struct ReadBuffer {
    data: Box<[u8]>,
    start: usize,
    len: usize,
}

impl ReadBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        ReadBuffer {
            data: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            len: 0,
        }
    }

    /// Number of buffered bytes not yet consumed.
    pub(crate) fn remaining(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffered bytes awaiting consumption.
    pub(crate) fn unread(&self) -> &[u8] {
        &self.data[self.start..self.start + self.len]
    }

    /// Marks `n` unread bytes as consumed.
    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.start += n;
        self.len -= n;
        if self.len == 0 {
            self.start = 0;
        }
    }

    /// Moves the unread bytes to the base of the buffer, maximizing the
    /// free tail.
    pub(crate) fn repack(&mut self) {
        if self.start > 0 && self.len > 0 {
            self.data.copy_within(self.start..self.start + self.len, 0);
        }
        self.start = 0;
    }

    /// Writable space after the unread region. Call [`commit`] with the
    /// number of bytes actually received.
    ///
    /// [`commit`]: ReadBuffer::commit
    pub(crate) fn free_tail(&mut self) -> &mut [u8] {
        let from = self.start + self.len;
        &mut self.data[from..]
    }

    /// Records `n` bytes received into the free tail.
    pub(crate) fn commit(&mut self, n: usize) {
        debug_assert!(self.start + self.len + n <= self.data.len());
        self.len += n;
    }

    pub(crate) fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}

/// Outbound staging buffer.
///
/// Bytes are queued at the tail; a flush consumes from the front through a
/// persistent sent cursor so a partial flush resumes where it stopped.
pub(crate) struct WriteBuffer {
    data: Box<[u8]>,
    sent: usize,
    queued: usize,
    reserved: usize,
}

impl WriteBuffer {
    /// `reserved` bytes at the base are excluded from queuing and survive
    /// every reset; a datagram connection keeps its packet header there.
    pub(crate) fn with_capacity(capacity: usize, reserved: usize) -> Self {
        debug_assert!(reserved <= capacity);
        WriteBuffer {
            data: vec![0u8; capacity].into_boxed_slice(),
            sent: reserved,
            queued: reserved,
            reserved,
        }
    }

    /// Payload bytes queued and not yet fully flushed.
    pub(crate) fn queued(&self) -> usize {
        self.queued - self.reserved
    }

    /// Bytes queued but not yet handed to the socket.
    pub(crate) fn pending(&self) -> usize {
        self.queued - self.sent
    }

    pub(crate) fn is_full(&self) -> bool {
        self.queued == self.data.len()
    }

    /// Copies as much of `input` as fits, returning the count accepted.
    pub(crate) fn queue(&mut self, input: &[u8]) -> usize {
        let take = input.len().min(self.data.len() - self.queued);
        self.data[self.queued..self.queued + take].copy_from_slice(&input[..take]);
        self.queued += take;
        take
    }

    /// The queued bytes not yet sent.
    pub(crate) fn unsent(&self) -> &[u8] {
        &self.data[self.sent..self.queued]
    }

    /// Records `n` bytes accepted by the socket.
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.sent + n <= self.queued);
        self.sent += n;
    }

    /// Empties the buffer back to its reservation.
    pub(crate) fn reset(&mut self) {
        self.sent = self.reserved;
        self.queued = self.reserved;
    }

    /// The reserved header prefix.
    pub(crate) fn header_slot(&mut self) -> &mut [u8] {
        &mut self.data[..self.reserved]
    }
}
