//! # Error Taxonomy
//!
//! Purpose: Give callers typed, connection-level failures instead of raw
//! errno values.
//!
//! ## Design Principles
//! 1. **Classify Once**: errno inspection happens next to the syscall; the
//!    caller only ever sees an `EngineError`.
//! 2. **Transient vs Fatal**: transient conditions are retried locally and
//!    never surface; everything else resets the connection first.
//! 3. **Fail Fast**: operations on a closed connection return
//!    `ConnectionFailure` immediately.

use thiserror::Error;

/// Result type for the I/O engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the I/O engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Peer closed, hang-up, or an unrecoverable socket error.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    /// Poll/wait deadline exceeded.
    #[error("timed out waiting for socket readiness")]
    Timeout,
    /// A response line exceeded the caller's buffer without a delimiter.
    #[error("protocol error: response line exceeded the caller buffer")]
    Protocol,
    /// A send could not make progress.
    #[error("write failure: send could not make progress")]
    WriteFailure,
    /// Operation invalid for this transport.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    /// OS resource exhaustion surfaced through poll.
    #[error("allocation failure reported by the OS")]
    AllocationFailure,
    /// Non-fatal transient state; the caller should retry at a higher level.
    #[error("operation in progress, retry later")]
    InProgress,
}

impl EngineError {
    /// Builds a `ConnectionFailure` from a raw OS error code.
    pub(crate) fn from_errno(errno: i32) -> Self {
        EngineError::ConnectionFailure(std::io::Error::from_raw_os_error(errno).to_string())
    }

    /// Maps a fatal errno to its engine classification.
    ///
    /// Memory and address-space errors become `AllocationFailure`; anything
    /// else is a connection-level failure carrying the OS description.
    pub(crate) fn classify(errno: i32) -> Self {
        match errno {
            libc::ENOMEM | libc::EFAULT => EngineError::AllocationFailure,
            _ => EngineError::from_errno(errno),
        }
    }
}
