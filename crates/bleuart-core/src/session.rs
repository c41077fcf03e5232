//! Transport session - request/response orchestration over the link.
//!
//! A session sends one command at a time and blocks until the matching reply
//! arrives or the timeout elapses. Inbound frames arrive through
//! [`FrameSink::on_frame_received`], which the session registers as the
//! transport's notification callback; that is the only path that mutates the
//! reassembly buffer and pending request.
//!
//! Callers must not start a second `send_and_wait` before the first returns.
//! Nothing queues or rejects overlapping requests; the newer one supersedes
//! the older one.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::events::{DropReason, LinkEvent, LinkObserver, PacketDirection, TracingObserver};
use crate::pending::{self, AwaitedReply, PendingTracker, Reply, WaitOutcome};
use crate::protocol::constants::{DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_LARGE_DATA_TIMEOUT_MS};
use crate::protocol::{
    CodecError, CommandTag, FrameKind, StreamTag, classify, encode, parse_stream_start,
};
use crate::reassembly::{ReassemblyBuffer, ReassemblyState};
use crate::transport::{BleTransport, TransportError};

/// Bytes of each frame copied into packet events.
const PACKET_PREVIEW_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Command {command} timed out after {timeout_ms}ms")]
    CommandTimeout { command: CommandTag, timeout_ms: u64 },

    #[error("Transport send failed: {0}")]
    TransportSendFailed(#[from] TransportError),

    #[error("Failed to subscribe to notifications: {0}")]
    SubscribeFailed(#[source] TransportError),

    #[error("Unexpected reply to {command}: {reply:02X?}")]
    UnexpectedReply { command: CommandTag, reply: Vec<u8> },
}

/// Configuration for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reply timeout for single-packet commands, in milliseconds.
    pub command_timeout_ms: u64,
    /// Reply timeout for the streamed large-data command, in milliseconds.
    pub large_data_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            large_data_timeout_ms: DEFAULT_LARGE_DATA_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn large_data_timeout(&self) -> Duration {
        Duration::from_millis(self.large_data_timeout_ms)
    }

    /// Timeout appropriate for `command`.
    pub fn timeout_for(&self, command: CommandTag) -> Duration {
        match AwaitedReply::for_command(command) {
            AwaitedReply::Streaming => self.large_data_timeout(),
            AwaitedReply::SingleTag(_) => self.command_timeout(),
        }
    }
}

/// Whether a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Awaiting,
}

/// State shared between the waiting caller and the notification context.
#[derive(Debug, Default)]
struct Exchange {
    phase: SessionPhase,
    buffer: ReassemblyBuffer,
    tracker: PendingTracker,
}

impl AsMut<PendingTracker> for Exchange {
    fn as_mut(&mut self) -> &mut PendingTracker {
        &mut self.tracker
    }
}

impl Exchange {
    /// Apply one inbound frame. Returns `true` if it resolved the request.
    fn dispatch(&mut self, raw: &[u8], events: &mut Vec<LinkEvent>) -> bool {
        let kind = match classify(raw) {
            Ok(kind) => kind,
            Err(_) => {
                events.push(LinkEvent::FrameDropped {
                    tag: None,
                    reason: DropReason::EmptyFrame,
                });
                return false;
            }
        };
        events.push(packet_event(PacketDirection::Rx, kind.raw_tag(), raw));

        match kind {
            FrameKind::StreamControl(StreamTag::Start, rest) => match parse_stream_start(rest) {
                Ok(expected_length) => {
                    self.buffer.begin(expected_length);
                    events.push(LinkEvent::StreamStarted { expected_length });
                    false
                }
                Err(e) => {
                    events.push(LinkEvent::FrameDropped {
                        tag: Some(kind.raw_tag()),
                        reason: DropReason::MalformedStart,
                    });
                    // A broken transfer fails the request waiting on it.
                    self.tracker.awaited() == Some(AwaitedReply::Streaming)
                        && self.tracker.fail(e)
                }
            },
            FrameKind::StreamControl(StreamTag::Chunk, rest) => {
                if self.buffer.append(rest) {
                    events.push(LinkEvent::StreamProgress {
                        chunk_length: rest.len(),
                        received: self.buffer.received_len(),
                        expected: self.buffer.expected_length(),
                    });
                } else {
                    events.push(LinkEvent::FrameDropped {
                        tag: Some(kind.raw_tag()),
                        reason: DropReason::OutsideTransfer,
                    });
                }
                false
            }
            FrameKind::StreamControl(StreamTag::End, _) => {
                let Some(bytes) = self.buffer.finish() else {
                    events.push(LinkEvent::FrameDropped {
                        tag: Some(kind.raw_tag()),
                        reason: DropReason::OutsideTransfer,
                    });
                    return false;
                };
                events.push(LinkEvent::StreamFinished {
                    received: bytes.len(),
                    expected: self.buffer.expected_length(),
                });
                self.offer(&kind, Some(bytes), events)
            }
            FrameKind::CommandReply(..) | FrameKind::Unrecognized(..) => {
                self.offer(&kind, None, events)
            }
        }
    }

    fn offer(
        &mut self,
        kind: &FrameKind<'_>,
        finished_stream: Option<Vec<u8>>,
        events: &mut Vec<LinkEvent>,
    ) -> bool {
        let awaited = self.tracker.awaited();
        let length = finished_stream
            .as_ref()
            .map_or(1 + kind.rest().len(), Vec::len);

        if self.tracker.offer(kind, finished_stream) {
            let command = match awaited {
                Some(AwaitedReply::SingleTag(tag)) => tag,
                _ => CommandTag::LargeData,
            };
            events.push(LinkEvent::RequestResolved { command, length });
            return true;
        }

        let reason = if self.tracker.is_waiting() {
            DropReason::Unsolicited
        } else {
            DropReason::NoRequestInFlight
        };
        events.push(LinkEvent::FrameDropped {
            tag: Some(kind.raw_tag()),
            reason,
        });
        false
    }
}

fn packet_event(direction: PacketDirection, tag: u8, data: &[u8]) -> LinkEvent {
    LinkEvent::Packet {
        direction,
        tag,
        length: data.len(),
        data: Some(data.iter().take(PACKET_PREVIEW_LEN).copied().collect()),
    }
}

struct Shared<O: LinkObserver> {
    exchange: Mutex<Exchange>,
    signal: Condvar,
    observer: Arc<O>,
}

impl<O: LinkObserver> Shared<O> {
    fn lock(&self) -> MutexGuard<'_, Exchange> {
        self.exchange.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: &[LinkEvent]) {
        for event in events {
            self.observer.on_event(event);
        }
    }

    fn on_frame_received(&self, raw: &[u8]) {
        let mut events = Vec::with_capacity(3);
        let resolved = self.lock().dispatch(raw, &mut events);
        if resolved {
            self.signal.notify_all();
        }
        // Observers run outside the lock.
        self.emit(&events);
    }
}

/// Handle through which the transport delivers inbound frames.
pub struct FrameSink<O: LinkObserver> {
    shared: Arc<Shared<O>>,
}

impl<O: LinkObserver> Clone for FrameSink<O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<O: LinkObserver> FrameSink<O> {
    /// Feed one inbound frame. Never waits on anything but the state lock.
    pub fn on_frame_received(&self, raw: &[u8]) {
        self.shared.on_frame_received(raw);
    }
}

/// Command/response session over a notification transport.
pub struct Session<T: BleTransport, O: LinkObserver = TracingObserver> {
    transport: T,
    config: SessionConfig,
    shared: Arc<Shared<O>>,
}

impl<T: BleTransport> Session<T, TracingObserver> {
    /// Create a session with the default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Result<Self, SessionError> {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: BleTransport, O: LinkObserver + 'static> Session<T, O> {
    /// Create a session with a custom observer and subscribe to notifications.
    pub fn with_observer(
        transport: T,
        config: SessionConfig,
        observer: Arc<O>,
    ) -> Result<Self, SessionError> {
        let shared = Arc::new(Shared {
            exchange: Mutex::new(Exchange::default()),
            signal: Condvar::new(),
            observer,
        });

        let sink = FrameSink {
            shared: Arc::clone(&shared),
        };
        transport
            .on_notify(Arc::new(move |frame: &[u8]| sink.on_frame_received(frame)))
            .map_err(SessionError::SubscribeFailed)?;

        Ok(Self {
            transport,
            config,
            shared,
        })
    }

    /// Send `command` and block until its reply arrives or `timeout` elapses.
    ///
    /// Entering resets the reassembly buffer and pending request, so nothing
    /// from an earlier, timed-out request can leak into this one.
    #[instrument(skip(self, payload), fields(command = %command))]
    pub fn send_and_wait(
        &self,
        command: CommandTag,
        payload: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Reply, SessionError> {
        let frame = encode(command, payload);

        {
            let mut exchange = self.shared.lock();
            if exchange.phase == SessionPhase::Awaiting {
                warn!("Request already in flight, superseding it");
            }
            exchange.buffer.reset();
            exchange
                .tracker
                .begin_wait(AwaitedReply::for_command(command));
            exchange.phase = SessionPhase::Awaiting;
        }

        self.shared
            .emit(&[packet_event(PacketDirection::Tx, command.as_u8(), &frame)]);

        // Replies may be notified before `write` even returns; the tracker
        // keeps them until the wait below picks them up.
        if let Err(e) = self.transport.write(&frame) {
            let mut exchange = self.shared.lock();
            exchange.tracker.abandon();
            exchange.phase = SessionPhase::Idle;
            warn!(error = %e, "Send failed");
            return Err(SessionError::TransportSendFailed(e));
        }

        let guard = self.shared.lock();
        let (mut guard, outcome) = pending::wait(&self.shared.signal, guard, timeout);
        guard.phase = SessionPhase::Idle;
        drop(guard);

        match outcome {
            WaitOutcome::Resolved(Ok(reply)) => {
                debug!(len = reply.as_bytes().len(), "Reply received");
                Ok(reply)
            }
            WaitOutcome::Resolved(Err(e)) => Err(e.into()),
            WaitOutcome::TimedOut => {
                let timeout_ms = timeout.as_millis() as u64;
                self.shared
                    .emit(&[LinkEvent::CommandTimeout { command, timeout_ms }]);
                Err(SessionError::CommandTimeout {
                    command,
                    timeout_ms,
                })
            }
        }
    }

    /// Send `command` without waiting for, or registering interest in, a reply.
    #[instrument(skip(self, payload), fields(command = %command))]
    pub fn send_command(
        &self,
        command: CommandTag,
        payload: Option<&[u8]>,
    ) -> Result<(), SessionError> {
        let frame = encode(command, payload);
        self.shared
            .emit(&[packet_event(PacketDirection::Tx, command.as_u8(), &frame)]);
        self.transport.write(&frame)?;
        Ok(())
    }

    /// Feed one inbound frame, as the transport's notification callback does.
    pub fn on_frame_received(&self, raw: &[u8]) {
        self.shared.on_frame_received(raw);
    }

    /// Handle for delivering inbound frames from another context.
    pub fn frame_sink(&self) -> FrameSink<O> {
        FrameSink {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    pub fn reassembly_state(&self) -> ReassemblyState {
        self.shared.lock().buffer.state()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}
