//! # Response Dispatch
//!
//! Purpose: Let a higher layer register ordered callbacks that consume
//! response lines when the write side needs the read side drained.
//!
//! ## Design Principles
//! 1. **Ordered, Short-Circuiting**: callbacks fire in registration order;
//!    the first one returning `false` stops the chain for that response.
//! 2. **No Reentry**: a callback that triggers further I/O cannot recurse
//!    into the dispatcher.
//! 3. **Failures Stay Local**: a failed response read is logged and
//!    reported as "nothing consumed", never propagated out of the relief
//!    path.

/// Upper bound on a dispatched response line.
const RESPONSE_LINE_MAX: usize = 1024;

/// A response consumer. Receives the full line including the delimiter
/// and returns whether later callbacks should still run.
pub type ResponseCallback = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// Ordered set of response callbacks attached to a connection.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: Vec<ResponseCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: impl FnMut(&[u8]) -> bool + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    fn dispatch(&mut self, line: &[u8]) {
        for callback in &mut self.callbacks {
            if !callback(line) {
                break;
            }
        }
    }
}

impl crate::Connection {
    /// Installs the registry consulted by the blocked-write relief path.
    pub fn set_response_callbacks(&mut self, registry: CallbackRegistry) {
        self.callbacks = Some(registry);
    }

    pub fn has_response_callbacks(&self) -> bool {
        self.callbacks.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Consumes one completed response through the registered callbacks.
    /// Returns whether a response was consumed.
    ///
    /// Does nothing without a registry, without an outstanding response,
    /// or when called from inside a callback.
    pub fn drain_one(&mut self) -> bool {
        if self.dispatching || self.pending_responses() == 0 {
            return false;
        }
        let Some(mut registry) = self.callbacks.take() else {
            return false;
        };
        if registry.is_empty() {
            self.callbacks = Some(registry);
            return false;
        }
        self.dispatching = true;
        let mut line = [0u8; RESPONSE_LINE_MAX];
        let consumed = match self.read_line(&mut line) {
            Ok(n) => {
                registry.dispatch(&line[..n]);
                self.mark_response_consumed();
                true
            }
            Err(err) => {
                tracing::debug!(%err, "response read failed during dispatch");
                false
            }
        };
        self.dispatching = false;
        self.callbacks = Some(registry);
        consumed
    }
}
