//! # Readiness Multiplexer
//!
//! Purpose: Block a single connection until its socket is ready, and pick
//! the next readable connection out of a set.
//!
//! ## Design Principles
//! 1. **One Descriptor per Wait**: a readiness wait polls exactly the
//!    connection's own socket; fan-out lives in [`select_ready`].
//! 2. **Bounded Retries**: interrupted polls retry a fixed number of times
//!    and then fail rather than loop forever.
//! 3. **Buffered Data Wins**: selection prefers connections that already
//!    hold unconsumed bytes, skipping the syscall entirely.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::sys;
use crate::Connection;

/// Direction of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Readable,
    Writable,
}

/// Attempts on one wait before giving up on an interrupt storm.
const POLL_RETRY_LIMIT: u32 = 5;

impl Connection {
    /// Blocks until the socket is ready in the requested direction.
    ///
    /// Before a writability wait, pending inbound responses are drained to
    /// break the mutual-blocking case where the peer cannot read us until
    /// we read it. A configured timeout of zero fails immediately with
    /// `Timeout` instead of blocking.
    pub fn wait(&mut self, readiness: Readiness) -> EngineResult<()> {
        if readiness == Readiness::Writable {
            let _ = self.relieve_backpressure();
        }
        if self.config.poll_timeout_ms == 0 {
            return Err(EngineError::Timeout);
        }
        match readiness {
            Readiness::Readable => self.counters.read_waits += 1,
            Readiness::Writable => self.counters.write_waits += 1,
        }
        let events = match readiness {
            Readiness::Readable => libc::POLLIN,
            Readiness::Writable => libc::POLLOUT,
        };
        let timeout = self.config.poll_timeout_ms;
        for _ in 0..POLL_RETRY_LIMIT {
            let fd = self.require_socket()?;
            let (rc, revents) = sys::poll_one(fd, events, timeout);
            if rc > 0 {
                if revents & (libc::POLLIN | libc::POLLOUT) != 0 {
                    return Ok(());
                }
                if revents & libc::POLLHUP != 0 {
                    self.reset();
                    return Err(EngineError::ConnectionFailure(
                        "poll reported hang-up".to_string(),
                    ));
                }
                if revents & libc::POLLERR != 0 {
                    match sys::socket_error(fd) {
                        // no pending error recorded, treat like an interrupt
                        Some(0) => continue,
                        Some(errno) => {
                            self.reset();
                            return Err(EngineError::classify(errno));
                        }
                        None => {
                            self.reset();
                            return Err(EngineError::ConnectionFailure(
                                "poll reported an error the socket would not explain".to_string(),
                            ));
                        }
                    }
                }
                self.reset();
                return Err(EngineError::ConnectionFailure(format!(
                    "unexpected poll events {revents:#x}"
                )));
            }
            if rc == 0 {
                return Err(EngineError::Timeout);
            }
            let errno = sys::last_errno();
            if sys::is_restartable(errno) {
                continue;
            }
            self.reset();
            return Err(match errno {
                libc::EFAULT | libc::ENOMEM | libc::EINVAL => EngineError::AllocationFailure,
                _ => EngineError::classify(errno),
            });
        }
        tracing::warn!("poll retry attempts exhausted");
        self.reset();
        Err(EngineError::ConnectionFailure(
            "poll retry attempts exhausted".to_string(),
        ))
    }
}

/// Picks the index of the next connection with a response to consume.
///
/// Connections that already hold buffered bytes win without a syscall.
/// Otherwise, connections awaiting responses are polled together, capped
/// at `max_poll_candidates`; with fewer than two candidates the poll is
/// skipped and the first awaiting connection is returned directly.
pub fn select_ready(connections: &[Connection], config: &EngineConfig) -> Option<usize> {
    let mut candidates = Vec::new();
    for (index, conn) in connections.iter().enumerate() {
        if conn.read_buffered() > 0 {
            return Some(index);
        }
        if candidates.len() < config.max_poll_candidates
            && conn.pending_responses() > 0
            && !conn.is_closed()
        {
            candidates.push(index);
        }
    }

    if candidates.len() < 2 {
        return connections
            .iter()
            .position(|conn| conn.pending_responses() > 0 && !conn.is_closed());
    }

    let mut fds: Vec<libc::pollfd> = candidates
        .iter()
        .map(|&index| libc::pollfd {
            // candidates are open, checked above
            fd: connections[index].require_socket().unwrap_or(-1),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let rc = sys::poll_many(&mut fds, config.poll_timeout_ms);
    if rc < 0 {
        tracing::debug!(errno = sys::last_errno(), "poll failed selecting a connection");
        return None;
    }
    if rc == 0 {
        return None;
    }
    fds.iter()
        .zip(candidates)
        .find(|(pfd, _)| pfd.revents & libc::POLLIN != 0)
        .map(|(_, index)| index)
}
