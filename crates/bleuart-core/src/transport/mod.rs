//! Transport layer module.

pub mod mock;
pub mod simulated;
pub mod traits;

pub use mock::MockTransport;
pub use simulated::SimulatedDevice;
pub use traits::{BleTransport, NotifyCallback, TransportError};
