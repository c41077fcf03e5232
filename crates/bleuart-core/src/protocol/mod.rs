//! Protocol module - BLE UART framing definitions.

pub mod codec;
pub mod constants;

pub use codec::{
    CodecError, CommandTag, FrameKind, StreamTag, classify, encode, encode_raw,
    parse_stream_start,
};
pub use constants::*;
