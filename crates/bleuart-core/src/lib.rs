//! BleUart-Core: command/response protocol engine for a BLE UART link.
//!
//! The link is a GATT write/notify pair used as an MTU-limited byte pipe.
//! Commands go out as single frames; replies come back either as one
//! notification echoing the command tag, or as a streamed transfer
//! (`START`, `CHUNK`..., `END`) that is reassembled before it is handed out.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Tag constants and the wire codec
//! - **Reassembly**: Accumulation of streamed transfers
//! - **Pending**: Single-slot tracking of the request in flight
//! - **Session**: Send, wait for the matching reply or a timeout
//! - **Commands**: Typed LED / status / large-data / ADC / diagnosis operations
//! - **Transport**: Link abstraction (simulator, mock)
//! - **Events**: Observer pattern for link diagnostics
//!
//! # Example
//!
//! ```no_run
//! use bleuart_core::session::{Session, SessionConfig};
//! use bleuart_core::transport::SimulatedDevice;
//!
//! let device = SimulatedDevice::new().with_adc_value(300);
//! let session = Session::new(device, SessionConfig::default()).expect("subscribe failed");
//! let value = session.read_adc().expect("ADC read failed");
//! assert_eq!(value, 300);
//! ```

pub mod commands;
pub mod events;
pub mod pending;
pub mod protocol;
pub mod reassembly;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use commands::{parse_adc_reply, parse_led_reply, parse_status_reply};
pub use events::{
    DropReason, LinkEvent, LinkObserver, NullObserver, PacketDirection, TracingObserver,
};
pub use pending::{AwaitedReply, PendingTracker, Reply, WaitOutcome};
pub use protocol::{CodecError, CommandTag, FrameKind, StreamTag};
pub use reassembly::{ReassemblyBuffer, ReassemblyState};
pub use session::{FrameSink, Session, SessionConfig, SessionError, SessionPhase};
pub use transport::{BleTransport, MockTransport, SimulatedDevice, TransportError};
