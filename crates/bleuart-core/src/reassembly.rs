//! Reassembly of multi-packet streamed payloads.
//!
//! A transfer is `START(len) CHUNK* END`. The announced length is advisory:
//! only END completes a transfer, whatever the byte count. The transport is
//! assumed to preserve frame order and frame boundaries, so there is no gap
//! detection.

use std::fmt;

use tracing::{debug, trace, warn};

/// Transfer state of a [`ReassemblyBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReassemblyState {
    /// No transfer started. Stray CHUNK/END frames are dropped here.
    #[default]
    Idle,
    /// START seen, accumulating chunks.
    Receiving,
    /// END seen. Left only by the next START.
    Complete,
}

impl fmt::Display for ReassemblyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReassemblyState::Idle => write!(f, "IDLE"),
            ReassemblyState::Receiving => write!(f, "RECEIVING"),
            ReassemblyState::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// Accumulator for one streamed transfer at a time.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    /// Length announced by START (0 until set).
    expected_length: u16,
    /// Chunk bytes in arrival order.
    received: Vec<u8>,
    /// Bytes accepted since the last START, kept after `finish` hands them out.
    received_len: usize,
    state: ReassemblyState,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transfer. Abandons any transfer already in progress.
    pub fn begin(&mut self, expected_length: u16) {
        if self.state == ReassemblyState::Receiving {
            warn!(
                discarded = self.received.len(),
                "New STREAM_START before STREAM_END, restarting transfer"
            );
        }
        self.expected_length = expected_length;
        self.received.clear();
        self.received.reserve(expected_length as usize);
        self.received_len = 0;
        self.state = ReassemblyState::Receiving;
        debug!(expected_length, "Stream started");
    }

    /// Append a chunk. Returns `false` (and drops the chunk) outside a transfer.
    pub fn append(&mut self, chunk: &[u8]) -> bool {
        if self.state != ReassemblyState::Receiving {
            return false;
        }
        self.received.extend_from_slice(chunk);
        self.received_len += chunk.len();
        trace!(
            chunk_len = chunk.len(),
            total = self.received_len,
            "Stream chunk appended"
        );
        true
    }

    /// Close the transfer and hand out the accumulated bytes.
    ///
    /// Returns `None` if no transfer is in progress.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.state != ReassemblyState::Receiving {
            return None;
        }
        self.state = ReassemblyState::Complete;
        if !self.length_matches() {
            debug!(
                expected = self.expected_length,
                received = self.received_len,
                "Stream length differs from announced length"
            );
        }
        Some(std::mem::take(&mut self.received))
    }

    /// Drop everything and return to `Idle`.
    pub fn reset(&mut self) {
        self.expected_length = 0;
        self.received.clear();
        self.received_len = 0;
        self.state = ReassemblyState::Idle;
    }

    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    pub fn expected_length(&self) -> u16 {
        self.expected_length
    }

    pub fn received_len(&self) -> usize {
        self.received_len
    }

    /// Whether the accepted byte count equals the announced length.
    pub fn length_matches(&self) -> bool {
        self.received_len == self.expected_length as usize
    }
}
