//! Simulated peripheral speaking the reference firmware's command set.
//!
//! Replies are pushed through a channel to a dedicated notification thread,
//! so they reach the session asynchronously and in order, the way a radio
//! stack delivers GATT notifications.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::traits::{BleTransport, NotifyCallback, TransportError};
use crate::protocol::codec::{encode_stream_chunk, encode_stream_end, encode_stream_start};
use crate::protocol::constants::*;

/// Reply to any command the firmware does not handle.
pub const UNKNOWN_COMMAND_REPLY: [u8; 2] = [CMD_UNKNOWN, 0x01];

/// Split `data` into the frames of one streamed transfer.
///
/// Returns `None` if `data` exceeds the firmware's transfer buffer or the MTU
/// leaves no room for chunk bytes.
pub fn stream_frames(data: &[u8], mtu: usize) -> Option<Vec<Vec<u8>>> {
    if data.len() > MAX_STREAM_SIZE || mtu < 2 {
        return None;
    }
    let chunk_size = mtu - 1;
    let mut frames = Vec::with_capacity(data.len().div_ceil(chunk_size) + 2);
    frames.push(encode_stream_start(data.len() as u16));
    frames.extend(data.chunks(chunk_size).map(encode_stream_chunk));
    frames.push(encode_stream_end());
    Some(frames)
}

/// Map the firmware's ASCII aliases (`'1'`..`'4'`, typed from a serial
/// terminal) onto command tags. `'4'` is ADC, not DIAGNOSIS.
fn resolve_alias(command: u8) -> u8 {
    match command {
        b'1' => CMD_LED,
        b'2' => CMD_STATUS,
        b'3' => CMD_LARGE_DATA,
        b'4' => CMD_ADC,
        other => other,
    }
}

/// Test pattern the firmware streams for LARGE_DATA: a big-endian u16 counter.
pub fn large_data_pattern(len: usize) -> Vec<u8> {
    (0..len.div_ceil(2) as u16)
        .flat_map(|value| value.to_be_bytes())
        .take(len)
        .collect()
}

#[derive(Debug)]
struct DeviceState {
    led_on: bool,
    status: u8,
    adc_value: u16,
    diagnosis: Option<Vec<u8>>,
    large_data: Vec<u8>,
}

/// In-process stand-in for the BLE UART peripheral.
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
    connected: Arc<Mutex<bool>>,
    outbox: Mutex<Option<Sender<Vec<u8>>>>,
    mtu: usize,
    notify_delay: Duration,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                led_on: false,
                status: 0x00,
                adc_value: 0,
                diagnosis: None,
                large_data: large_data_pattern(LARGE_DATA_TEST_SIZE),
            })),
            connected: Arc::new(Mutex::new(true)),
            outbox: Mutex::new(None),
            mtu: DEFAULT_MTU,
            notify_delay: Duration::from_millis(1),
        }
    }

    pub fn with_adc_value(self, value: u16) -> Self {
        self.lock_state().adc_value = value;
        self
    }

    pub fn with_status(self, status: u8) -> Self {
        self.lock_state().status = status;
        self
    }

    /// Answer DIAGNOSIS with `[0x04] ++ report` instead of the unknown-command reply.
    pub fn with_diagnosis(self, report: Vec<u8>) -> Self {
        self.lock_state().diagnosis = Some(report);
        self
    }

    pub fn with_large_data(self, data: Vec<u8>) -> Self {
        self.lock_state().large_data = data;
        self
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Pause between consecutive notifications.
    pub fn with_notify_delay(mut self, delay: Duration) -> Self {
        self.notify_delay = delay;
        self
    }

    /// Advertised name of the peripheral being simulated.
    pub fn name(&self) -> &'static str {
        DEVICE_NAME
    }

    pub fn led_on(&self) -> bool {
        self.lock_state().led_on
    }

    pub fn set_adc_value(&self, value: u16) {
        self.lock_state().adc_value = value;
    }

    /// Simulate link loss. Queued notifications are still delivered.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn reconnect(&self) {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Push data the way the firmware's `sendData` does: short buffers go out
    /// as one frame, longer ones as a streamed transfer.
    pub fn send_data(&self, data: &[u8]) {
        if !self.is_connected() {
            debug!("Not connected, dropping outbound data");
            return;
        }
        if data.len() > self.mtu {
            match stream_frames(data, self.mtu) {
                Some(frames) => frames.into_iter().for_each(|f| self.push(f)),
                None => warn!(len = data.len(), "Data too large for transfer buffer"),
            }
        } else {
            self.push(data.to_vec());
        }
    }

    fn respond(&self, frame: &[u8]) {
        let Some((&raw, args)) = frame.split_first() else {
            return;
        };
        let command = resolve_alias(raw);
        trace!(command = %format!("0x{:02X}", command), "Simulated device handling command");

        let reply = {
            let mut state = self.lock_state();
            match command {
                CMD_LED => {
                    let requested = args.first().copied().unwrap_or(LED_OFF);
                    state.led_on = requested != LED_OFF;
                    vec![CMD_LED, requested]
                }
                CMD_STATUS => vec![CMD_STATUS, state.status],
                CMD_LARGE_DATA => state.large_data.clone(),
                CMD_ADC => {
                    let [hi, lo] = state.adc_value.to_be_bytes();
                    vec![CMD_ADC, hi, lo]
                }
                CMD_DIAGNOSIS if state.diagnosis.is_some() => {
                    let mut reply = vec![CMD_DIAGNOSIS];
                    reply.extend_from_slice(state.diagnosis.as_deref().unwrap_or_default());
                    reply
                }
                _ => UNKNOWN_COMMAND_REPLY.to_vec(),
            }
        };

        if command == CMD_LARGE_DATA {
            // The firmware always streams this one, whatever its size.
            match stream_frames(&reply, self.mtu) {
                Some(frames) => frames.into_iter().for_each(|f| self.push(f)),
                None => warn!(len = reply.len(), "Large data exceeds transfer buffer"),
            }
        } else {
            self.send_data(&reply);
        }
    }

    fn push(&self, frame: Vec<u8>) {
        let outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
        match outbox.as_ref() {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    warn!("Notification thread gone, dropping frame");
                }
            }
            None => debug!("No notification subscriber, dropping frame"),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl BleTransport for SimulatedDevice {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if data.len() > self.mtu {
            return Err(TransportError::FrameTooLarge {
                size: data.len(),
                mtu: self.mtu,
            });
        }
        self.respond(data);
        Ok(data.len())
    }

    fn on_notify(&self, callback: NotifyCallback) -> Result<(), TransportError> {
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let delay = self.notify_delay;
        thread::Builder::new()
            .name("sim-notify".into())
            .spawn(move || {
                for frame in rx {
                    callback(&frame);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            })
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        // Replacing the sender ends the previous notification thread.
        *self.outbox.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Receiver;

    fn subscribe(device: &SimulatedDevice) -> Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        device
            .on_notify(Arc::new(move |frame: &[u8]| {
                let _ = tx.lock().unwrap().send(frame.to_vec());
            }))
            .unwrap();
        rx
    }

    fn next(rx: &Receiver<Vec<u8>>) -> Vec<u8> {
        rx.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_large_data_pattern() {
        let data = large_data_pattern(8);
        assert_eq!(data, vec![0, 0, 0, 1, 0, 2, 0, 3]);
        assert_eq!(large_data_pattern(LARGE_DATA_TEST_SIZE).len(), 1024);
        assert_eq!(large_data_pattern(3), vec![0, 0, 0]);
    }

    #[test]
    fn test_stream_frames_split_by_mtu() {
        let data: Vec<u8> = (0..40).collect();
        let frames = stream_frames(&data, 20).unwrap();
        // START + ceil(40 / 19) chunks + END
        assert_eq!(frames.len(), 1 + 3 + 1);
        assert_eq!(frames[0], vec![STREAM_START, 0x00, 40]);
        assert_eq!(frames[1].len(), 20);
        assert_eq!(frames[3], vec![STREAM_CHUNK, 38, 39]);
        assert_eq!(frames[4], vec![STREAM_END]);
    }

    #[test]
    fn test_stream_frames_refuses_oversized_payload() {
        assert!(stream_frames(&vec![0; MAX_STREAM_SIZE + 1], 20).is_none());
        assert!(stream_frames(&[1, 2, 3], 1).is_none());
    }

    #[test]
    fn test_device_replies() {
        let device = SimulatedDevice::new()
            .with_adc_value(300)
            .with_status(0x07)
            .with_notify_delay(Duration::ZERO);
        let rx = subscribe(&device);

        device.write(&[CMD_LED, LED_ON]).unwrap();
        assert_eq!(next(&rx), vec![CMD_LED, LED_ON]);
        assert!(device.led_on());

        device.write(&[CMD_STATUS]).unwrap();
        assert_eq!(next(&rx), vec![CMD_STATUS, 0x07]);

        device.write(&[CMD_ADC]).unwrap();
        assert_eq!(next(&rx), vec![CMD_ADC, 0x01, 0x2C]);

        device.write(&[CMD_DIAGNOSIS]).unwrap();
        assert_eq!(next(&rx), UNKNOWN_COMMAND_REPLY.to_vec());
    }

    #[test]
    fn test_device_streams_large_data() {
        let device = SimulatedDevice::new()
            .with_large_data(vec![1, 2, 3, 4])
            .with_notify_delay(Duration::ZERO);
        let rx = subscribe(&device);

        device.write(&[CMD_LARGE_DATA]).unwrap();
        assert_eq!(next(&rx), vec![STREAM_START, 0x00, 0x04]);
        assert_eq!(next(&rx), vec![STREAM_CHUNK, 1, 2, 3, 4]);
        assert_eq!(next(&rx), vec![STREAM_END]);
    }

    #[test]
    fn test_device_configured_diagnosis() {
        let device = SimulatedDevice::new()
            .with_diagnosis(vec![0xDE, 0xAD])
            .with_notify_delay(Duration::ZERO);
        let rx = subscribe(&device);

        device.write(&[CMD_DIAGNOSIS]).unwrap();
        assert_eq!(next(&rx), vec![CMD_DIAGNOSIS, 0xDE, 0xAD]);
    }

    #[test]
    fn test_device_accepts_ascii_aliases() {
        let device = SimulatedDevice::new()
            .with_adc_value(0x0102)
            .with_status(0x03)
            .with_large_data(vec![9, 8])
            .with_notify_delay(Duration::ZERO);
        let rx = subscribe(&device);

        device.write(&[b'1', LED_ON]).unwrap();
        assert_eq!(next(&rx), vec![CMD_LED, LED_ON]);
        assert!(device.led_on());

        device.write(b"2").unwrap();
        assert_eq!(next(&rx), vec![CMD_STATUS, 0x03]);

        device.write(b"3").unwrap();
        assert_eq!(next(&rx), vec![STREAM_START, 0x00, 0x02]);
        assert_eq!(next(&rx), vec![STREAM_CHUNK, 9, 8]);
        assert_eq!(next(&rx), vec![STREAM_END]);

        // '4' is ADC on the firmware, even though 0x04 is DIAGNOSIS.
        device.write(b"4").unwrap();
        assert_eq!(next(&rx), vec![CMD_ADC, 0x01, 0x02]);

        device.write(b"5").unwrap();
        assert_eq!(next(&rx), UNKNOWN_COMMAND_REPLY.to_vec());
    }

    #[test]
    fn test_adc_value_can_change_between_reads() {
        let device = SimulatedDevice::new().with_notify_delay(Duration::ZERO);
        let rx = subscribe(&device);

        device.write(&[CMD_ADC]).unwrap();
        assert_eq!(next(&rx), vec![CMD_ADC, 0x00, 0x00]);

        device.set_adc_value(4095);
        device.write(&[CMD_ADC]).unwrap();
        assert_eq!(next(&rx), vec![CMD_ADC, 0x0F, 0xFF]);
    }

    #[test]
    fn test_mtu_sets_chunk_size_and_write_limit() {
        let device = SimulatedDevice::new()
            .with_mtu(5)
            .with_large_data((0..10).collect())
            .with_notify_delay(Duration::ZERO);
        assert_eq!(device.mtu(), 5);
        let rx = subscribe(&device);

        device.write(&[CMD_LARGE_DATA]).unwrap();
        assert_eq!(next(&rx), vec![STREAM_START, 0x00, 10]);
        assert_eq!(next(&rx), vec![STREAM_CHUNK, 0, 1, 2, 3]);
        assert_eq!(next(&rx), vec![STREAM_CHUNK, 4, 5, 6, 7]);
        assert_eq!(next(&rx), vec![STREAM_CHUNK, 8, 9]);
        assert_eq!(next(&rx), vec![STREAM_END]);

        assert!(matches!(
            device.write(&[CMD_LED, LED_ON, 0, 0, 0, 0]),
            Err(TransportError::FrameTooLarge { size: 6, mtu: 5 })
        ));
    }

    #[test]
    fn test_reply_longer_than_mtu_is_streamed() {
        let report: Vec<u8> = (0..30).collect();
        let device = SimulatedDevice::new()
            .with_diagnosis(report.clone())
            .with_notify_delay(Duration::ZERO);
        let rx = subscribe(&device);

        // [DIAGNOSIS] ++ 30 bytes does not fit one 20-byte frame.
        device.write(&[CMD_DIAGNOSIS]).unwrap();
        assert_eq!(next(&rx), vec![STREAM_START, 0x00, 31]);
        let mut first = vec![STREAM_CHUNK, CMD_DIAGNOSIS];
        first.extend_from_slice(&report[..18]);
        assert_eq!(next(&rx), first);
        let mut second = vec![STREAM_CHUNK];
        second.extend_from_slice(&report[18..]);
        assert_eq!(next(&rx), second);
        assert_eq!(next(&rx), vec![STREAM_END]);
    }

    #[test]
    fn test_device_name() {
        assert_eq!(SimulatedDevice::new().name(), "HKNU EE RTOS");
    }

    #[test]
    fn test_device_disconnected_write_fails() {
        let device = SimulatedDevice::new();
        device.disconnect();
        assert!(matches!(
            device.write(&[CMD_STATUS]),
            Err(TransportError::Disconnected)
        ));
        device.reconnect();
        assert!(device.write(&[CMD_STATUS]).is_ok());
    }
}
