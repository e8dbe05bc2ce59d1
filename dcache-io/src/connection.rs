//! # Connection State
//!
//! Purpose: Own a socket's descriptor, buffers, counters, and protocol
//! bookkeeping as a single unit with one lifecycle.
//!
//! ## Design Principles
//! 1. **Closed Is a State**: the descriptor is an `Option<OwnedFd>`; every
//!    operation checks it first and fails fast when absent.
//! 2. **Reset Restores Invariants**: any fatal error funnels through
//!    [`Connection::reset`], which returns the connection to a reusable
//!    blank state.
//! 3. **Single Thread**: a connection is driven by one caller at a time;
//!    there is no internal locking.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::config::EngineConfig;
use crate::dispatch::CallbackRegistry;
use crate::error::{EngineError, EngineResult};
use crate::frame::{BinaryRequestStamp, BINARY_MAGIC_REQUEST, DATAGRAM_HEADER_LEN};
use crate::sys;

/// Transport a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Connected byte stream (TCP).
    Stream,
    /// Connected datagram socket (UDP).
    Datagram,
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live socket.
    New,
    /// Socket attached, handshake not finished.
    Connecting,
    /// Fully usable.
    Connected,
    /// Write side shut down; reads may still drain.
    ShuttingDown,
}

/// Byte and syscall counters, observable by callers and zeroed on reset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoCounters {
    pub bytes_sent: u64,
    pub bytes_read: u64,
    /// Successful send(2) calls on the stream path.
    pub send_calls: u64,
    /// Readiness waits entered for reading.
    pub read_waits: u64,
    /// Readiness waits entered for writing.
    pub write_waits: u64,
    /// Datagram send attempts beyond the first.
    pub datagram_retries: u64,
}

/// Server protocol version learned during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub micro: u8,
}

impl ProtocolVersion {
    /// Sentinel meaning "not yet negotiated".
    pub const UNKNOWN: Self = ProtocolVersion {
        major: u8::MAX,
        minor: u8::MAX,
        micro: u8::MAX,
    };

    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }
}

/// A buffered, non-blocking connection to one cache server.
pub struct Connection {
    socket: Option<OwnedFd>,
    transport: Transport,
    state: ConnectionState,
    pub(crate) read: ReadBuffer,
    pub(crate) write: WriteBuffer,
    pub(crate) config: EngineConfig,
    pub(crate) counters: IoCounters,
    pub(crate) callbacks: Option<CallbackRegistry>,
    pub(crate) dispatching: bool,
    pending_responses: u32,
    datagram_message_id: u16,
    request_id: u16,
    version: ProtocolVersion,
}

impl Connection {
    /// Wraps a connected stream socket. The descriptor is switched to
    /// non-blocking mode.
    pub fn stream(socket: OwnedFd, config: EngineConfig) -> EngineResult<Self> {
        Self::new(socket, Transport::Stream, config)
    }

    /// Wraps a connected datagram socket. The write buffer reserves space
    /// for the per-packet header.
    pub fn datagram(socket: OwnedFd, config: EngineConfig) -> EngineResult<Self> {
        if config.udp_header_len < DATAGRAM_HEADER_LEN {
            return Err(EngineError::NotSupported(
                "datagram header reservation smaller than the wire header",
            ));
        }
        Self::new(socket, Transport::Datagram, config)
    }

    fn new(socket: OwnedFd, transport: Transport, config: EngineConfig) -> EngineResult<Self> {
        sys::set_nonblocking(socket.as_raw_fd()).map_err(EngineError::from_errno)?;
        let reserved = match transport {
            Transport::Stream => 0,
            Transport::Datagram => config.udp_header_len,
        };
        Ok(Connection {
            socket: Some(socket),
            transport,
            state: ConnectionState::Connected,
            read: ReadBuffer::with_capacity(config.buffer_capacity),
            write: WriteBuffer::with_capacity(config.buffer_capacity, reserved),
            config,
            counters: IoCounters::default(),
            callbacks: None,
            dispatching: false,
            pending_responses: 0,
            datagram_message_id: 0,
            request_id: 0,
            version: ProtocolVersion::UNKNOWN,
        })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Lifecycle transitions are driven by the external connect
    /// collaborator; the engine itself only moves to `New` on reset and
    /// `ShuttingDown` on [`start_shutdown`](Self::start_shutdown).
    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    pub fn counters(&self) -> IoCounters {
        self.counters
    }

    /// Unconsumed bytes sitting in the read buffer.
    pub fn read_buffered(&self) -> usize {
        self.read.remaining()
    }

    /// Payload bytes queued for sending and not yet flushed.
    pub fn write_queued(&self) -> usize {
        self.write.queued()
    }

    /// Responses sent for and not yet consumed.
    pub fn pending_responses(&self) -> u32 {
        self.pending_responses
    }

    /// Records that a request expecting a reply went out.
    pub fn mark_request_sent(&mut self) {
        self.pending_responses += 1;
    }

    /// Records that one complete response was consumed.
    pub fn mark_response_consumed(&mut self) {
        self.pending_responses = self.pending_responses.saturating_sub(1);
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Stores the version learned from the server's handshake reply.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// Allocates the identifier fields for the next binary request.
    pub fn stamp_binary_request(&mut self) -> BinaryRequestStamp {
        self.request_id = self.request_id.wrapping_add(1);
        BinaryRequestStamp {
            magic: BINARY_MAGIC_REQUEST,
            request_id: self.request_id,
        }
    }

    pub(crate) fn next_datagram_message_id(&mut self) -> u16 {
        self.datagram_message_id = self.datagram_message_id.wrapping_add(1);
        self.datagram_message_id
    }

    /// The raw descriptor, or a fail-fast error when the connection is
    /// closed.
    pub(crate) fn require_socket(&self) -> EngineResult<RawFd> {
        match &self.socket {
            Some(fd) => Ok(fd.as_raw_fd()),
            None => Err(EngineError::ConnectionFailure(
                "connection is closed".to_string(),
            )),
        }
    }

    /// Shuts down the write side, leaving reads open to drain responses.
    pub fn start_shutdown(&mut self) {
        if let Some(fd) = &self.socket {
            sys::shutdown(fd.as_raw_fd(), libc::SHUT_WR);
            self.state = ConnectionState::ShuttingDown;
        }
    }

    /// Closes the socket and restores the blank-state invariants: buffers
    /// cleared, counters zeroed, pending responses dropped, version
    /// invalidated.
    pub fn reset(&mut self) {
        if let Some(fd) = self.socket.take() {
            let how = if self.state == ConnectionState::ShuttingDown {
                libc::SHUT_RD
            } else {
                libc::SHUT_RDWR
            };
            sys::shutdown(fd.as_raw_fd(), how);
            tracing::debug!(fd = fd.as_raw_fd(), "connection reset");
            // OwnedFd closes on drop
        }
        self.state = ConnectionState::New;
        self.read.clear();
        self.write.reset();
        self.counters = IoCounters::default();
        self.pending_responses = 0;
        self.version = ProtocolVersion::UNKNOWN;
    }
}
