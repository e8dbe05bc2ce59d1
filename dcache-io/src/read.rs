//! # Read Path
//!
//! Purpose: Refill the read buffer from the socket and hand out bytes,
//! lines, or a full drain on top of it.
//!
//! ## Design Principles
//! 1. **One Recv per Refill**: a refill issues a single successful recv;
//!    consumption loops over the buffer, not the socket.
//! 2. **Closed Peer Is Fatal**: zero bytes from recv resets the connection
//!    and surfaces `ConnectionFailure`.
//! 3. **Waits Are Delegated**: would-block conditions go through the
//!    readiness wait; this module never spins.

use crate::error::{EngineError, EngineResult};
use crate::frame::LINE_DELIMITER;
use crate::poll::Readiness;
use crate::sys;

impl crate::Connection {
    /// Blocks (via readiness waits) until at least one byte is buffered.
    ///
    /// Only called with an empty read buffer; the whole buffer becomes the
    /// receive window.
    pub(crate) fn fill(&mut self) -> EngineResult<()> {
        debug_assert!(self.read.is_empty());
        self.read.clear();
        loop {
            let fd = self.require_socket()?;
            let n = sys::recv(fd, self.read.free_tail());
            if n > 0 {
                self.read.commit(n as usize);
                self.counters.bytes_read += n as u64;
                return Ok(());
            }
            if n == 0 {
                tracing::debug!(fd, "peer closed the connection");
                self.reset();
                return Err(EngineError::ConnectionFailure(
                    "peer closed the connection".to_string(),
                ));
            }
            let errno = sys::last_errno();
            if errno == libc::EINTR {
                continue;
            }
            if sys::is_wouldblock(errno) || sys::is_restartable(errno) || errno == libc::ETIMEDOUT {
                self.wait(Readiness::Readable)?;
                continue;
            }
            tracing::warn!(fd, errno, "recv failed, resetting connection");
            self.reset();
            return Err(EngineError::classify(errno));
        }
    }

    /// Opportunistic refill used to relieve write-side backpressure.
    ///
    /// Repacks the buffer and tries one non-blocking recv into the free
    /// tail. Returns whether any bytes arrived.
    pub(crate) fn refill_opportunistic(&mut self) -> bool {
        let Ok(fd) = self.require_socket() else {
            return false;
        };
        self.read.repack();
        let tail = self.read.free_tail();
        if tail.is_empty() {
            return false;
        }
        let n = sys::recv(fd, tail);
        if n > 0 {
            self.read.commit(n as usize);
            self.counters.bytes_read += n as u64;
            return true;
        }
        if n == 0 {
            tracing::debug!(fd, "peer closed while relieving backpressure");
        }
        false
    }

    /// Reads exactly `out.len()` bytes, refilling whenever the buffer runs
    /// dry. Returns the count produced.
    pub fn read(&mut self, out: &mut [u8]) -> EngineResult<usize> {
        self.require_socket()?;
        let mut produced = 0;
        while produced < out.len() {
            if self.read.is_empty() {
                self.fill()?;
            }
            let take = (out.len() - produced).min(self.read.remaining());
            out[produced..produced + take].copy_from_slice(&self.read.unread()[..take]);
            self.read.consume(take);
            produced += take;
        }
        Ok(produced)
    }

    /// Like [`read`](Self::read), discarding the count: on success the
    /// output is always filled completely.
    pub fn read_exact(&mut self, out: &mut [u8]) -> EngineResult<()> {
        self.read(out).map(|_| ())
    }

    /// Reads one delimited line into `out`, including the delimiter, and
    /// returns its length. Bytes past the delimiter stay buffered for the
    /// next read.
    ///
    /// Filling `out` without seeing the delimiter is a protocol error.
    pub fn read_line(&mut self, out: &mut [u8]) -> EngineResult<usize> {
        self.require_socket()?;
        let mut total = 0;
        loop {
            if self.read.is_empty() {
                self.fill()?;
            }
            while !self.read.is_empty() && total < out.len() {
                let byte = self.read.unread()[0];
                self.read.consume(1);
                out[total] = byte;
                total += 1;
                if byte == LINE_DELIMITER {
                    return Ok(total);
                }
            }
            if total == out.len() {
                return Err(EngineError::Protocol);
            }
        }
    }

    /// Discards everything the peer sends until it closes the connection,
    /// which is the terminal state this drain exists to reach: the
    /// connection is reset and `ConnectionFailure` returned.
    ///
    /// Used before abandoning a connection so no stale response bytes
    /// survive into a reuse. A failed readiness wait surfaces as
    /// `InProgress` so the caller can retry the drain later.
    pub fn drain_until_closed(&mut self) -> EngineResult<()> {
        let mut scratch = vec![0u8; self.config.buffer_capacity];
        self.read.clear();
        loop {
            let fd = self.require_socket()?;
            let n = sys::recv(fd, &mut scratch);
            if n > 0 {
                continue;
            }
            if n == 0 {
                self.reset();
                return Err(EngineError::ConnectionFailure(
                    "peer closed the connection".to_string(),
                ));
            }
            let errno = sys::last_errno();
            if errno == libc::EINTR {
                continue;
            }
            if sys::is_wouldblock(errno) || sys::is_restartable(errno) || errno == libc::ETIMEDOUT {
                if self.wait(Readiness::Readable).is_err() {
                    return Err(EngineError::InProgress);
                }
                continue;
            }
            return Err(EngineError::classify(errno));
        }
    }
}
