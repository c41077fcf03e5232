//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{BleTransport, NotifyCallback, TransportError};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// Mock transport for unit testing session logic.
///
/// Clones share state, so a test can keep a handle for injecting frames
/// after the session has taken ownership of the transport.
#[derive(Clone)]
pub struct MockTransport {
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Registered notification callback.
    callback: Arc<Mutex<Option<NotifyCallback>>>,
    /// Scripted replies, one batch consumed per write.
    reply_queue: Arc<Mutex<VecDeque<Vec<Vec<u8>>>>>,
    /// Optional responder consulted when the reply queue is empty.
    responder: Arc<Mutex<Option<Responder>>>,
    /// Whether the link is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            write_log: Arc::new(Mutex::new(Vec::new())),
            callback: Arc::new(Mutex::new(None)),
            reply_queue: Arc::new(Mutex::new(VecDeque::new())),
            responder: Arc::new(Mutex::new(None)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue frames to be notified, in order, right after the next write.
    pub fn queue_reply(&self, frames: &[&[u8]]) {
        let batch = frames.iter().map(|f| f.to_vec()).collect();
        self.reply_queue.lock().unwrap().push_back(batch);
    }

    /// Answer every write with whatever `responder` returns.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// Deliver an inbound frame through the registered callback.
    pub fn notify(&self, frame: &[u8]) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(frame);
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Simulate link loss.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate link recovery.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BleTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());

        let scripted = self.reply_queue.lock().unwrap().pop_front();
        let replies = match scripted {
            Some(batch) => batch,
            None => match self.responder.lock().unwrap().as_mut() {
                Some(responder) => responder(data),
                None => Vec::new(),
            },
        };
        for frame in replies {
            self.notify(&frame);
        }
        Ok(data.len())
    }

    fn on_notify(&self, callback: NotifyCallback) -> Result<(), TransportError> {
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}
