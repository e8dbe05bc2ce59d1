//! # Request Submission
//!
//! Purpose: Route an assembled request vector to the right transport path
//! and keep the pending-response count honest.

use crate::error::EngineResult;
use crate::Transport;

impl crate::Connection {
    /// Submits one request built from `vector`.
    ///
    /// Datagram connections send a single packet (the first vector slot
    /// must be the empty header slot) and track no pending response, as
    /// datagram replies are matched by message id instead. Stream
    /// connections queue the segments and flush when asked;
    /// `expects_response` increments the pending-response count once the
    /// request is accepted.
    pub fn submit(
        &mut self,
        vector: &[&[u8]],
        expects_response: bool,
        flush: bool,
    ) -> EngineResult<()> {
        match self.transport() {
            Transport::Datagram => self.send_datagram(vector),
            Transport::Stream => {
                self.write_vectored(vector, flush)?;
                if expects_response {
                    self.mark_request_sent();
                }
                Ok(())
            }
        }
    }
}
