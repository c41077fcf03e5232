//! Radio transport abstraction.
//!
//! Defines the `BleTransport` trait: a write primitive plus notification
//! delivery, allowing different implementations (simulator, mock, a real
//! GATT backend).

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::constants::DEFAULT_MTU;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device disconnected")]
    Disconnected,

    #[error("Notification subscription failed: {0}")]
    SubscribeFailed(String),

    #[error("Frame of {size} bytes exceeds MTU of {mtu}")]
    FrameTooLarge { size: usize, mtu: usize },
}

/// Callback invoked once per inbound notification, in arrival order.
pub type NotifyCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Abstract notification-based transport.
///
/// Implementations must deliver each inbound frame exactly as it was
/// notified: one callback per frame, never coalesced or split, in order.
/// Connection lifecycle is the implementation's business; the session only
/// requires a connected link when it writes.
pub trait BleTransport: Send + Sync {
    /// Write one outbound frame (GATT write request).
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Register the inbound frame callback, replacing any previous one.
    fn on_notify(&self, callback: NotifyCallback) -> Result<(), TransportError>;

    /// Check if the link is up.
    fn is_connected(&self) -> bool;

    /// Largest frame the link carries in one packet.
    fn mtu(&self) -> usize {
        DEFAULT_MTU
    }
}
