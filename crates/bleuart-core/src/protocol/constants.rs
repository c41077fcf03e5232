//! Protocol constants for the BLE UART command link.
//!
//! Tag values are shared with the peripheral firmware and must stay bit-exact.

// ============================================================================
// Peripheral identity
// ============================================================================

/// Advertised name of the reference peripheral.
pub const DEVICE_NAME: &str = "HKNU EE RTOS";

// ============================================================================
// Command tags (Host -> Device, echoed back on single-packet replies)
// ============================================================================

pub const CMD_LED: u8 = 0x01;
pub const CMD_STATUS: u8 = 0x02;
pub const CMD_LARGE_DATA: u8 = 0x03;
pub const CMD_DIAGNOSIS: u8 = 0x04;
pub const CMD_ADC: u8 = 0x05;
/// Never sent. Labels inbound tags the client does not understand.
pub const CMD_UNKNOWN: u8 = 0xFF;

// ============================================================================
// Streaming-control tags (Device -> Host only)
// ============================================================================

pub const STREAM_START: u8 = 0x10;
pub const STREAM_CHUNK: u8 = 0x11;
pub const STREAM_END: u8 = 0x12;

/// Bytes of big-endian length carried by a STREAM_START frame.
pub const STREAM_START_LEN_SIZE: usize = 2;

// ============================================================================
// LED payloads
// ============================================================================

pub const LED_ON: u8 = 0x01;
pub const LED_OFF: u8 = 0x00;

// ============================================================================
// Link sizing
// ============================================================================

/// Default notification size used by the reference firmware (header included).
pub const DEFAULT_MTU: usize = 20;
/// Largest payload the reference firmware will stream in one transfer.
pub const MAX_STREAM_SIZE: usize = 2048;
/// Size of the large-data test pattern produced by the reference firmware.
pub const LARGE_DATA_TEST_SIZE: usize = 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// Reply timeout for ordinary single-packet commands.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5_000;
/// Reply timeout for the streamed large-data command.
pub const DEFAULT_LARGE_DATA_TIMEOUT_MS: u64 = 30_000;
