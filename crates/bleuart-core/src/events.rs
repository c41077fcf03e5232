//! Event system for link diagnostics.
//!
//! The session reports every frame it sends, receives, reassembles or drops
//! here, so front-ends can observe traffic without touching session state.

use std::fmt;

use crate::protocol::CommandTag;

/// Frame direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device (write request)
    Rx, // Device -> Host (notification)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Why an inbound frame was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Zero-length notification.
    EmptyFrame,
    /// STREAM_START too short to carry a length.
    MalformedStart,
    /// CHUNK or END with no transfer in progress.
    OutsideTransfer,
    /// A request is in flight but this frame does not answer it.
    Unsolicited,
    /// No request in flight.
    NoRequestInFlight,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::EmptyFrame => write!(f, "empty frame"),
            DropReason::MalformedStart => write!(f, "malformed stream start"),
            DropReason::OutsideTransfer => write!(f, "outside transfer"),
            DropReason::Unsolicited => write!(f, "unsolicited"),
            DropReason::NoRequestInFlight => write!(f, "no request in flight"),
        }
    }
}

/// Events emitted by a session.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Frame written or notified. `data` holds at most the first 32 bytes.
    Packet {
        direction: PacketDirection,
        tag: u8,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// STREAM_START accepted.
    StreamStarted { expected_length: u16 },
    /// STREAM_CHUNK appended.
    StreamProgress {
        chunk_length: usize,
        received: usize,
        expected: u16,
    },
    /// STREAM_END closed a transfer.
    StreamFinished { received: usize, expected: u16 },
    /// Inbound frame ignored.
    FrameDropped { tag: Option<u8>, reason: DropReason },
    /// The request in flight got its answer.
    RequestResolved { command: CommandTag, length: usize },
    /// The request in flight got no answer in time.
    CommandTimeout { command: CommandTag, timeout_ms: u64 },
}

/// Observer trait for receiving link events.
///
/// Called from whichever thread produced the event, including the
/// transport's notification thread, so implementations must not block.
pub trait LinkObserver: Send + Sync {
    fn on_event(&self, event: &LinkEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl LinkObserver for NullObserver {
    fn on_event(&self, _event: &LinkEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl LinkObserver for TracingObserver {
    fn on_event(&self, event: &LinkEvent) {
        match event {
            LinkEvent::Packet {
                direction,
                tag,
                length,
                ..
            } => {
                tracing::trace!(
                    dir = %direction,
                    tag = %format!("0x{:02X}", tag),
                    len = length,
                    "Frame"
                );
            }
            LinkEvent::StreamStarted { expected_length } => {
                tracing::info!(expected_length, "Starting large data reception");
            }
            LinkEvent::StreamProgress {
                chunk_length,
                received,
                expected,
            } => {
                let pct = if *expected > 0 {
                    (*received * 100) / *expected as usize
                } else {
                    0
                };
                tracing::debug!(
                    chunk = chunk_length,
                    total = received,
                    progress = %format!("{}%", pct),
                    "Received chunk"
                );
            }
            LinkEvent::StreamFinished { received, expected } => {
                if *received == *expected as usize {
                    tracing::info!(total = received, "Large data reception complete");
                } else {
                    tracing::warn!(
                        total = received,
                        expected,
                        "Large data reception complete with length mismatch"
                    );
                }
            }
            LinkEvent::FrameDropped { tag, reason } => {
                let tag = tag.map(|t| format!("0x{:02X}", t)).unwrap_or_default();
                tracing::debug!(tag = %tag, reason = %reason, "Frame dropped");
            }
            LinkEvent::RequestResolved { command, length } => {
                tracing::debug!(command = %command, len = length, "Request resolved");
            }
            LinkEvent::CommandTimeout {
                command,
                timeout_ms,
            } => {
                tracing::error!(command = %command, timeout_ms, "Command timeout");
            }
        }
    }
}
