//! # Engine Configuration
//!
//! Purpose: Make every capacity constant of the engine configurable instead
//! of baked into the code.

/// Default per-connection buffer capacity in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;

/// Default UDP datagram header reservation in bytes.
pub const DEFAULT_UDP_HEADER_LEN: usize = 8;

/// Default number of attempts for a datagram send.
pub const DEFAULT_DATAGRAM_RETRY_LIMIT: u32 = 5;

/// Default cap on connections polled at once by `select_ready`.
pub const DEFAULT_MAX_POLL_CANDIDATES: usize = 100;

/// Default poll timeout in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: i32 = 1000;

/// Configuration for a connection's buffering and readiness waits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the read and write buffers, per connection.
    pub buffer_capacity: usize,
    /// Bytes reserved at the front of a datagram connection's write buffer
    /// for the per-packet header.
    pub udp_header_len: usize,
    /// Maximum attempts for a single datagram send.
    pub datagram_retry_limit: u32,
    /// Maximum connections placed in one `select_ready` poll set.
    pub max_poll_candidates: usize,
    /// Poll timeout in milliseconds. Zero means "fail immediately with a
    /// timeout rather than block".
    pub poll_timeout_ms: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            udp_header_len: DEFAULT_UDP_HEADER_LEN,
            datagram_retry_limit: DEFAULT_DATAGRAM_RETRY_LIMIT,
            max_poll_candidates: DEFAULT_MAX_POLL_CANDIDATES,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}
