//! # Write Path
//!
//! Purpose: Queue outgoing bytes into the write buffer and flush them to
//! the socket, relieving backpressure through the read side when the
//! kernel's send queue is full.
//!
//! ## Design Principles
//! 1. **Queue Then Flush**: callers fill the buffer; the socket only sees
//!    buffer-sized sends.
//! 2. **Relieve Before Waiting**: a full send queue usually means the peer
//!    is blocked writing to us; consuming inbound bytes unblocks both
//!    sides before we ever sleep in poll.
//! 3. **Coalescing Hints**: intermediate flushes carry the kernel's
//!    more-data hint; only a final flush lets the packet go out short.

use crate::error::{EngineError, EngineResult};
use crate::poll::Readiness;
use crate::sys;

impl crate::Connection {
    /// Queues `payload` without requesting a flush. Intermediate flushes
    /// still happen whenever the buffer fills. Returns the bytes accepted,
    /// which is always the full payload on success.
    pub fn queue(&mut self, payload: &[u8]) -> EngineResult<usize> {
        self.write(payload, false)
    }

    /// Queues `payload`, flushing whenever the buffer fills; `flush`
    /// forces the remainder out before returning.
    pub fn write(&mut self, payload: &[u8], flush: bool) -> EngineResult<usize> {
        self.require_socket()?;
        let mut remaining = payload;
        while !remaining.is_empty() {
            let accepted = self.write.queue(remaining);
            remaining = &remaining[accepted..];
            if self.write.is_full() {
                self.flush(!flush)?;
            }
        }
        if flush {
            self.flush(false)?;
        }
        Ok(payload.len())
    }

    /// Writes a request assembled from multiple segments through the
    /// stream buffer. Empty segments are skipped.
    pub fn write_vectored(&mut self, vector: &[&[u8]], flush: bool) -> EngineResult<usize> {
        if self.transport() == crate::Transport::Datagram {
            return Err(EngineError::NotSupported(
                "vectored stream write on a datagram connection",
            ));
        }
        let mut written = 0;
        for segment in vector {
            if !segment.is_empty() {
                written += self.write(segment, false)?;
            }
        }
        if flush {
            self.flush(false)?;
        }
        Ok(written)
    }

    /// Sends every buffered byte. `more` keeps the kernel coalescing hint
    /// on because the caller will queue further data immediately.
    ///
    /// A wait timeout surfaces as [`EngineError::Timeout`] with the unsent
    /// bytes still buffered; any other failure resets the connection.
    pub fn flush(&mut self, more: bool) -> EngineResult<()> {
        self.require_socket()?;
        while self.write.pending() > 0 {
            let fd = self.require_socket()?;
            let n = sys::send(fd, self.write.unsent(), more);
            if n > 0 {
                self.write.advance(n as usize);
                self.counters.bytes_sent += n as u64;
                self.counters.send_calls += 1;
                continue;
            }
            // a zero-byte send made no progress, treat it like a full queue
            if n == 0 {
                if self.relieve_backpressure() {
                    continue;
                }
                self.wait(Readiness::Writable)?;
                continue;
            }
            let errno = sys::last_errno();
            if sys::is_wouldblock(errno) || errno == libc::ENOBUFS {
                if self.relieve_backpressure() {
                    continue;
                }
                self.wait(Readiness::Writable)?;
                continue;
            }
            tracing::warn!(fd, errno, "send failed, resetting connection");
            self.reset();
            return Err(EngineError::classify(errno));
        }
        self.write.reset();
        Ok(())
    }

    /// Makes room in the kernel's queues without sleeping: repack and
    /// refill the read buffer, or dispatch one completed response.
    /// Returns whether any progress was made.
    pub(crate) fn relieve_backpressure(&mut self) -> bool {
        if self.refill_opportunistic() {
            return true;
        }
        self.drain_one()
    }
}
