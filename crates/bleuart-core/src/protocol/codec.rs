//! Wire codec: outbound command frames and inbound frame classification.
//!
//! Every frame is one transport packet. Byte 0 is the type tag, the rest is a
//! tag-dependent payload. Outbound frames carry no length prefix; the
//! transport write size delimits them.
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────────────┐
//! │ Tag (1B) │ Payload                                       │
//! │          │ START: u16 BE length | CHUNK: raw | END: none │
//! └──────────┴──────────────────────────────────────────────┘
//! ```

use std::fmt;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty frame")]
    EmptyFrame,

    #[error("Malformed STREAM_START: expected {expected} length bytes, got {actual}")]
    MalformedStart { expected: usize, actual: usize },

    #[error("Unsupported command tag 0x{0:02X}")]
    UnsupportedCommand(u8),
}

/// Commands the client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTag {
    Led,
    Status,
    LargeData,
    Diagnosis,
    Adc,
}

impl CommandTag {
    pub const ALL: [CommandTag; 5] = [
        CommandTag::Led,
        CommandTag::Status,
        CommandTag::LargeData,
        CommandTag::Diagnosis,
        CommandTag::Adc,
    ];

    /// Wire value of this tag.
    pub const fn as_u8(self) -> u8 {
        match self {
            CommandTag::Led => CMD_LED,
            CommandTag::Status => CMD_STATUS,
            CommandTag::LargeData => CMD_LARGE_DATA,
            CommandTag::Diagnosis => CMD_DIAGNOSIS,
            CommandTag::Adc => CMD_ADC,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            CMD_LED => Some(CommandTag::Led),
            CMD_STATUS => Some(CommandTag::Status),
            CMD_LARGE_DATA => Some(CommandTag::LargeData),
            CMD_DIAGNOSIS => Some(CommandTag::Diagnosis),
            CMD_ADC => Some(CommandTag::Adc),
            _ => None,
        }
    }
}

impl TryFrom<u8> for CommandTag {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(CodecError::UnsupportedCommand(value))
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTag::Led => write!(f, "LED"),
            CommandTag::Status => write!(f, "STATUS"),
            CommandTag::LargeData => write!(f, "LARGE_DATA"),
            CommandTag::Diagnosis => write!(f, "DIAGNOSIS"),
            CommandTag::Adc => write!(f, "ADC"),
        }
    }
}

/// Streaming-control tags framing a multi-packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTag {
    Start,
    Chunk,
    End,
}

impl StreamTag {
    pub const fn as_u8(self) -> u8 {
        match self {
            StreamTag::Start => STREAM_START,
            StreamTag::Chunk => STREAM_CHUNK,
            StreamTag::End => STREAM_END,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            STREAM_START => Some(StreamTag::Start),
            STREAM_CHUNK => Some(StreamTag::Chunk),
            STREAM_END => Some(StreamTag::End),
            _ => None,
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTag::Start => write!(f, "STREAM_START"),
            StreamTag::Chunk => write!(f, "STREAM_CHUNK"),
            StreamTag::End => write!(f, "STREAM_END"),
        }
    }
}

/// Classification of an inbound frame. Borrows the payload from the raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind<'a> {
    /// Part of a multi-packet transfer.
    StreamControl(StreamTag, &'a [u8]),
    /// Single-packet reply echoing a command tag.
    CommandReply(CommandTag, &'a [u8]),
    /// Tag outside both tag spaces. Carries the raw tag for diagnostics.
    Unrecognized(u8, &'a [u8]),
}

impl<'a> FrameKind<'a> {
    /// Logical tag of the frame. Unrecognized frames report `CMD_UNKNOWN`.
    pub fn tag(&self) -> u8 {
        match self {
            FrameKind::StreamControl(tag, _) => tag.as_u8(),
            FrameKind::CommandReply(tag, _) => tag.as_u8(),
            FrameKind::Unrecognized(_, _) => CMD_UNKNOWN,
        }
    }

    /// Tag byte exactly as it appeared on the wire.
    pub fn raw_tag(&self) -> u8 {
        match self {
            FrameKind::Unrecognized(raw, _) => *raw,
            other => other.tag(),
        }
    }

    /// Payload following the tag byte.
    pub fn rest(&self) -> &'a [u8] {
        match self {
            FrameKind::StreamControl(_, rest)
            | FrameKind::CommandReply(_, rest)
            | FrameKind::Unrecognized(_, rest) => *rest,
        }
    }
}

/// Build an outbound frame: `[tag] ++ payload`.
///
/// Payload shape is the caller's contract and is not validated here.
pub fn encode(tag: CommandTag, payload: Option<&[u8]>) -> Vec<u8> {
    let payload = payload.unwrap_or_default();
    let mut frame = Vec::with_capacity(1 + payload.len());
    frame.push(tag.as_u8());
    frame.extend_from_slice(payload);
    frame
}

/// Build an outbound frame from a raw tag byte, rejecting anything that is not
/// one of the five command tags.
pub fn encode_raw(tag: u8, payload: Option<&[u8]>) -> Result<Vec<u8>, CodecError> {
    let tag = CommandTag::try_from(tag)?;
    Ok(encode(tag, payload))
}

/// Classify an inbound frame by its leading tag byte.
///
/// Unknown tags are data, not errors: they come back as
/// [`FrameKind::Unrecognized`].
pub fn classify(frame: &[u8]) -> Result<FrameKind<'_>, CodecError> {
    let (&tag, rest) = frame.split_first().ok_or(CodecError::EmptyFrame)?;

    if let Some(stream) = StreamTag::from_u8(tag) {
        return Ok(FrameKind::StreamControl(stream, rest));
    }
    if let Some(command) = CommandTag::from_u8(tag) {
        return Ok(FrameKind::CommandReply(command, rest));
    }
    Ok(FrameKind::Unrecognized(tag, rest))
}

/// Read the advisory big-endian transfer length from a STREAM_START payload.
pub fn parse_stream_start(rest: &[u8]) -> Result<u16, CodecError> {
    if rest.len() < STREAM_START_LEN_SIZE {
        return Err(CodecError::MalformedStart {
            expected: STREAM_START_LEN_SIZE,
            actual: rest.len(),
        });
    }
    Ok(BigEndian::read_u16(&rest[..STREAM_START_LEN_SIZE]))
}

// ============================================================================
// Device-side framing (used by the simulator and in tests)
// ============================================================================

pub fn encode_stream_start(length: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + STREAM_START_LEN_SIZE);
    frame.push(STREAM_START);
    // Writing into a Vec cannot fail.
    let _ = frame.write_u16::<BigEndian>(length);
    frame
}

pub fn encode_stream_chunk(chunk: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + chunk.len());
    frame.push(STREAM_CHUNK);
    frame.extend_from_slice(chunk);
    frame
}

pub fn encode_stream_end() -> Vec<u8> {
    vec![STREAM_END]
}
