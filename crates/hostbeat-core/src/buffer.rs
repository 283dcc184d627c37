//! Bounded output buffer between record producers and a channel.
//!
//! Sits between the encoder and a `FifoChannel`: producers append complete
//! records, the buffer drains through the channel as the pipe accepts bytes.
//! When the downstream cannot absorb data the buffer grows up to a hard cap;
//! past the cap, new appends are dropped whole rather than blocking the
//! producer or splitting a record.

use crate::channel::{FifoChannel, WriteOutcome};

use tracing::debug;

/// Default capacity cap for an output buffer (1 MiB).
pub const MAX_OUTBUF: usize = 1024 * 1024;

/// Growable byte buffer with a send cursor and a capacity cap.
///
/// Invariant: `sent <= data.len() <= capacity`. Both reset to zero only once
/// the cursor reaches the logical length.
pub struct OutBuffer {
    data: Vec<u8>,
    sent: usize,
    capacity: usize,
}

impl OutBuffer {
    /// Creates an empty buffer capped at `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            sent: 0,
            capacity,
        }
    }

    /// Logical length: total buffered bytes, sent and unsent.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes buffered but not yet accepted by the channel.
    pub fn pending(&self) -> usize {
        self.data.len() - self.sent
    }

    /// Appends a payload, rejecting it whole if it would exceed the cap.
    ///
    /// Returns `false` when the payload was dropped; the buffer contents are
    /// unchanged in that case.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        if self.data.len() + bytes.len() > self.capacity {
            debug!(
                "output buffer full ({} + {} > {}), dropping payload",
                self.data.len(),
                bytes.len(),
                self.capacity
            );
            return false;
        }
        self.data.extend_from_slice(bytes);
        true
    }

    /// Drains buffered bytes into the channel without blocking.
    ///
    /// Resumes from the last unsent offset; a full pipe pauses draining until
    /// the next call. Returns `true` once everything buffered has been
    /// delivered (also when there was nothing to deliver).
    pub fn flush(&mut self, channel: &mut FifoChannel) -> bool {
        while self.sent < self.data.len() {
            match channel.write(&self.data[self.sent..]) {
                WriteOutcome::Sent(n) => self.sent += n,
                WriteOutcome::Busy | WriteOutcome::Disconnected => return false,
            }
        }
        self.data.clear();
        self.sent = 0;
        true
    }
}

impl Default for OutBuffer {
    fn default() -> Self {
        Self::new(MAX_OUTBUF)
    }
}
