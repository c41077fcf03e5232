//! Command operations - typed wrappers around `Session::send_and_wait`.
//!
//! Each operation knows the payload it sends and the shape of the reply it
//! expects. Reply parsing is kept in plain functions so it can be checked
//! without a session.

use byteorder::{BigEndian, ByteOrder};
use tracing::{info, instrument};

use crate::events::LinkObserver;
use crate::protocol::CommandTag;
use crate::protocol::constants::*;
use crate::session::{Session, SessionError};
use crate::transport::BleTransport;

/// `[STATUS, status]` -> status byte.
pub fn parse_status_reply(reply: &[u8]) -> Option<u8> {
    match reply {
        [CMD_STATUS, status, ..] => Some(*status),
        _ => None,
    }
}

/// `[ADC, hi, lo]` -> `hi * 256 + lo`.
pub fn parse_adc_reply(reply: &[u8]) -> Option<u16> {
    match reply {
        [CMD_ADC, value @ ..] if value.len() >= 2 => Some(BigEndian::read_u16(value)),
        _ => None,
    }
}

/// `[LED, state]` -> whether the device reports the LED on.
pub fn parse_led_reply(reply: &[u8]) -> Option<bool> {
    match reply {
        [CMD_LED, state, ..] => Some(*state != LED_OFF),
        _ => None,
    }
}

impl<T: BleTransport, O: LinkObserver + 'static> Session<T, O> {
    /// Switch the LED and wait for the device's echo.
    #[instrument(skip(self))]
    pub fn set_led(&self, on: bool) -> Result<bool, SessionError> {
        let payload = [if on { LED_ON } else { LED_OFF }];
        let reply = self.send_and_wait(
            CommandTag::Led,
            Some(&payload),
            self.config().command_timeout(),
        )?;
        let reported = parse_led_reply(reply.as_bytes()).ok_or_else(|| {
            SessionError::UnexpectedReply {
                command: CommandTag::Led,
                reply: reply.as_bytes().to_vec(),
            }
        })?;
        info!(on = reported, "LED state");
        Ok(reported)
    }

    /// Switch the LED without waiting for the echo.
    pub fn send_led(&self, on: bool) -> Result<(), SessionError> {
        let payload = [if on { LED_ON } else { LED_OFF }];
        self.send_command(CommandTag::Led, Some(&payload))
    }

    /// Query the system status byte.
    #[instrument(skip(self))]
    pub fn system_status(&self) -> Result<u8, SessionError> {
        let reply = self.send_and_wait(CommandTag::Status, None, self.config().command_timeout())?;
        let status = parse_status_reply(reply.as_bytes()).ok_or_else(|| {
            SessionError::UnexpectedReply {
                command: CommandTag::Status,
                reply: reply.into_bytes(),
            }
        })?;
        info!(status, "System status");
        Ok(status)
    }

    /// Fetch the streamed test payload.
    #[instrument(skip(self))]
    pub fn large_data(&self) -> Result<Vec<u8>, SessionError> {
        let reply = self.send_and_wait(
            CommandTag::LargeData,
            None,
            self.config().large_data_timeout(),
        )?;
        let data = reply.into_bytes();
        info!(total = data.len(), "Received large data");
        Ok(data)
    }

    /// Read the ADC sample.
    #[instrument(skip(self))]
    pub fn read_adc(&self) -> Result<u16, SessionError> {
        let reply = self.send_and_wait(CommandTag::Adc, None, self.config().command_timeout())?;
        let value = parse_adc_reply(reply.as_bytes()).ok_or_else(|| {
            SessionError::UnexpectedReply {
                command: CommandTag::Adc,
                reply: reply.into_bytes(),
            }
        })?;
        info!(value, "ADC value");
        Ok(value)
    }

    /// Request diagnosis data. The reply frame is returned as-is.
    #[instrument(skip(self))]
    pub fn diagnosis(&self) -> Result<Vec<u8>, SessionError> {
        let reply = self.send_and_wait(
            CommandTag::Diagnosis,
            None,
            self.config().command_timeout(),
        )?;
        Ok(reply.into_bytes())
    }
}
