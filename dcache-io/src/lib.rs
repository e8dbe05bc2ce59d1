//! # dcache-io
//!
//! Purpose: Buffered, non-blocking socket I/O engine for a distributed
//! key-value cache client. One [`Connection`] wraps one server socket and
//! provides queued writes, buffered reads, readiness waits, datagram
//! framing, and response dispatch, all driven synchronously by the
//! caller.
//!
//! ## Design Principles
//! 1. **Buffer Before the Socket**: callers talk to fixed-capacity
//!    buffers; syscalls happen in buffer-sized units.
//! 2. **Never Block Blindly**: every wait first tries to make progress in
//!    the opposite direction, because a stuck send queue usually means
//!    unread responses.
//! 3. **Typed Failures, Clean Resets**: callers see the error taxonomy in
//!    [`EngineError`]; fatal conditions return the connection to a blank,
//!    reusable state.

mod buffer;
mod config;
mod connection;
mod dispatch;
mod error;
mod frame;
mod poll;
mod read;
mod request;
mod sys;
mod udp;
mod write;

pub use config::{
    EngineConfig, DEFAULT_BUFFER_CAPACITY, DEFAULT_DATAGRAM_RETRY_LIMIT,
    DEFAULT_MAX_POLL_CANDIDATES, DEFAULT_POLL_TIMEOUT_MS, DEFAULT_UDP_HEADER_LEN,
};
pub use connection::{Connection, ConnectionState, IoCounters, ProtocolVersion, Transport};
pub use dispatch::{CallbackRegistry, ResponseCallback};
pub use error::{EngineError, EngineResult};
pub use frame::{
    BinaryRequestStamp, DatagramHeader, BINARY_MAGIC_REQUEST, DATAGRAM_HEADER_LEN, LINE_DELIMITER,
};
pub use poll::{select_ready, Readiness};
