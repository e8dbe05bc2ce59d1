//! # Datagram Path
//!
//! Purpose: Send one request as a single datagram, with the engine's
//! packet header stamped ahead of the caller's payload.
//!
//! ## Design Principles
//! 1. **Header Slot Contract**: the caller leaves the first vector slot
//!    empty; the engine fills it from the write buffer's reservation.
//! 2. **One Syscall per Packet**: header and payload go out in a single
//!    scatter-gather send, never copied into one allocation.
//! 3. **Oversize Fails Fast**: a payload the transport cannot carry is a
//!    hard failure with no retries.

use crate::error::{EngineError, EngineResult};
use crate::frame::{DatagramHeader, DATAGRAM_HEADER_LEN};
use crate::sys;

impl crate::Connection {
    /// Sends `vector` as one datagram. The first slot must be empty; it is
    /// replaced by the packet header. Transient send failures are retried
    /// up to the configured limit.
    pub fn send_datagram(&mut self, vector: &[&[u8]]) -> EngineResult<()> {
        if self.transport() != crate::Transport::Datagram {
            return Err(EngineError::NotSupported(
                "datagram send on a stream connection",
            ));
        }
        let Some(first) = vector.first() else {
            return Err(EngineError::NotSupported("empty datagram vector"));
        };
        if !first.is_empty() {
            return Err(EngineError::NotSupported(
                "first vector slot is reserved for the datagram header",
            ));
        }

        let header = DatagramHeader {
            message_id: self.next_datagram_message_id(),
            sequence: 0,
            total: 1,
        };
        header.encode(self.write.header_slot());
        let header_ptr = self.write.header_slot().as_mut_ptr();

        let mut iov: Vec<libc::iovec> = Vec::with_capacity(vector.len());
        iov.push(libc::iovec {
            iov_base: header_ptr as *mut libc::c_void,
            iov_len: DATAGRAM_HEADER_LEN,
        });
        for segment in &vector[1..] {
            if !segment.is_empty() {
                iov.push(libc::iovec {
                    iov_base: segment.as_ptr() as *mut libc::c_void,
                    iov_len: segment.len(),
                });
            }
        }

        let mut attempts = self.config.datagram_retry_limit;
        while attempts > 0 {
            let fd = self.require_socket()?;
            let n = sys::sendmsg(fd, &mut iov);
            if n > 0 {
                self.counters.bytes_sent += n as u64;
                return Ok(());
            }
            if n < 0 {
                let errno = sys::last_errno();
                if errno == libc::EMSGSIZE {
                    return Err(EngineError::WriteFailure);
                }
                if !(sys::is_wouldblock(errno)
                    || sys::is_restartable(errno)
                    || errno == libc::ENOBUFS)
                {
                    tracing::warn!(fd, errno, "datagram send failed, resetting connection");
                    self.reset();
                    return Err(EngineError::classify(errno));
                }
            }
            attempts -= 1;
            if attempts > 0 {
                self.counters.datagram_retries += 1;
            }
        }
        Err(EngineError::WriteFailure)
    }
}
