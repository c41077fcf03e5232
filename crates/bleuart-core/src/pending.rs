//! Single-slot tracking of the one request in flight.
//!
//! The tracker is plain state. It lives behind the session's mutex together
//! with the reassembly buffer, and [`wait`] pairs that mutex with a condition
//! variable whose predicate is re-checked under the lock, so a resolution that
//! lands before the waiter blocks is never lost.

use std::sync::{Condvar, MutexGuard, PoisonError};
use std::time::Duration;

use crate::protocol::{CodecError, CommandTag, FrameKind, StreamTag};

/// What kind of inbound frame completes the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitedReply {
    /// A single-packet reply echoing this command tag.
    SingleTag(CommandTag),
    /// A STREAM_END closing a multi-packet transfer.
    Streaming,
}

impl AwaitedReply {
    /// Await kind for a command. Only LARGE_DATA replies with a stream.
    pub fn for_command(tag: CommandTag) -> Self {
        match tag {
            CommandTag::LargeData => AwaitedReply::Streaming,
            other => AwaitedReply::SingleTag(other),
        }
    }
}

/// Bytes that resolved a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Complete reply frame, tag byte included.
    Frame(Vec<u8>),
    /// Reassembled stream payload, without any framing.
    Stream(Vec<u8>),
}

impl Reply {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Reply::Frame(bytes) | Reply::Stream(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Reply::Frame(bytes) | Reply::Stream(bytes) => bytes,
        }
    }
}

/// Result of blocking on the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Resolved(Result<Reply, CodecError>),
    TimedOut,
}

/// Pending-request slot. At most one request is tracked at a time.
#[derive(Debug, Default)]
pub struct PendingTracker {
    awaited: Option<AwaitedReply>,
    result: Option<Result<Reply, CodecError>>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request, discarding whatever the previous one left.
    pub fn begin_wait(&mut self, awaited: AwaitedReply) {
        self.awaited = Some(awaited);
        self.result = None;
    }

    /// Offer an inbound frame. Returns `true` if it resolved the request.
    ///
    /// `finished_stream` carries the reassembled bytes when `kind` is a
    /// STREAM_END that closed a transfer.
    pub fn offer(&mut self, kind: &FrameKind<'_>, finished_stream: Option<Vec<u8>>) -> bool {
        if !self.is_waiting() {
            return false;
        }
        let reply = match (self.awaited, kind) {
            (Some(AwaitedReply::SingleTag(want)), FrameKind::CommandReply(got, rest))
                if want == *got =>
            {
                let mut frame = Vec::with_capacity(1 + rest.len());
                frame.push(got.as_u8());
                frame.extend_from_slice(rest);
                Reply::Frame(frame)
            }
            (Some(AwaitedReply::Streaming), FrameKind::StreamControl(StreamTag::End, _)) => {
                match finished_stream {
                    Some(bytes) => Reply::Stream(bytes),
                    None => return false,
                }
            }
            _ => return false,
        };
        self.result = Some(Ok(reply));
        true
    }

    /// Resolve the current request with a protocol error.
    pub fn fail(&mut self, error: CodecError) -> bool {
        if !self.is_waiting() {
            return false;
        }
        self.result = Some(Err(error));
        true
    }

    /// Forget the current request. Late frames for it are then dropped.
    pub fn abandon(&mut self) {
        self.awaited = None;
        self.result = None;
    }

    /// Take the resolution, ending the request.
    pub fn take_result(&mut self) -> Option<Result<Reply, CodecError>> {
        let result = self.result.take();
        if result.is_some() {
            self.awaited = None;
        }
        result
    }

    pub fn awaited(&self) -> Option<AwaitedReply> {
        self.awaited
    }

    /// A request is registered and still unresolved.
    pub fn is_waiting(&self) -> bool {
        self.awaited.is_some() && self.result.is_none()
    }

    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }
}

impl AsMut<PendingTracker> for PendingTracker {
    fn as_mut(&mut self) -> &mut PendingTracker {
        self
    }
}

/// Block until the tracker held in `guard` resolves or `timeout` elapses.
///
/// On timeout the request is abandoned before the lock is released, so a
/// resolution racing the deadline either wins outright or is discarded.
pub fn wait<'a, S: AsMut<PendingTracker>>(
    signal: &Condvar,
    guard: MutexGuard<'a, S>,
    timeout: Duration,
) -> (MutexGuard<'a, S>, WaitOutcome) {
    let (mut guard, _) = signal
        .wait_timeout_while(guard, timeout, |state| !state.as_mut().is_resolved())
        .unwrap_or_else(PoisonError::into_inner);

    let tracker = guard.as_mut();
    let outcome = match tracker.take_result() {
        Some(result) => WaitOutcome::Resolved(result),
        None => {
            tracker.abandon();
            WaitOutcome::TimedOut
        }
    };
    (guard, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::classify;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_awaited_reply_for_command() {
        assert_eq!(
            AwaitedReply::for_command(CommandTag::LargeData),
            AwaitedReply::Streaming
        );
        assert_eq!(
            AwaitedReply::for_command(CommandTag::Adc),
            AwaitedReply::SingleTag(CommandTag::Adc)
        );
    }

    #[test]
    fn test_single_tag_ignores_other_replies() {
        let mut tracker = PendingTracker::new();
        tracker.begin_wait(AwaitedReply::SingleTag(CommandTag::Status));

        let led = classify(&[0x01, 0x01]).unwrap();
        assert!(!tracker.offer(&led, None));
        assert!(tracker.is_waiting());

        let status = classify(&[0x02, 0x00]).unwrap();
        assert!(tracker.offer(&status, None));
        assert_eq!(
            tracker.take_result(),
            Some(Ok(Reply::Frame(vec![0x02, 0x00])))
        );
        assert_eq!(tracker.awaited(), None);
    }

    #[test]
    fn test_resolves_exactly_once() {
        let mut tracker = PendingTracker::new();
        tracker.begin_wait(AwaitedReply::SingleTag(CommandTag::Adc));

        assert!(tracker.offer(&classify(&[0x05, 0x00, 0x01]).unwrap(), None));
        assert!(!tracker.offer(&classify(&[0x05, 0x00, 0x02]).unwrap(), None));
        assert_eq!(
            tracker.take_result(),
            Some(Ok(Reply::Frame(vec![0x05, 0x00, 0x01])))
        );
    }

    #[test]
    fn test_streaming_resolves_only_on_end() {
        let mut tracker = PendingTracker::new();
        tracker.begin_wait(AwaitedReply::Streaming);

        assert!(!tracker.offer(&classify(&[0x10, 0x00, 0x02]).unwrap(), None));
        assert!(!tracker.offer(&classify(&[0x11, 0xAA]).unwrap(), None));
        // A single-packet reply with the LARGE_DATA tag does not complete a stream.
        assert!(!tracker.offer(&classify(&[0x03]).unwrap(), None));

        let end = classify(&[0x12]).unwrap();
        assert!(tracker.offer(&end, Some(vec![0xAA, 0xBB])));
        assert_eq!(
            tracker.take_result(),
            Some(Ok(Reply::Stream(vec![0xAA, 0xBB])))
        );
    }

    #[test]
    fn test_stream_end_without_transfer_does_not_resolve() {
        let mut tracker = PendingTracker::new();
        tracker.begin_wait(AwaitedReply::Streaming);
        assert!(!tracker.offer(&classify(&[0x12]).unwrap(), None));
        assert!(tracker.is_waiting());
    }

    #[test]
    fn test_nothing_resolves_without_request() {
        let mut tracker = PendingTracker::new();
        assert!(!tracker.offer(&classify(&[0x02, 0x00]).unwrap(), None));
        assert!(!tracker.fail(CodecError::EmptyFrame));
        assert_eq!(tracker.take_result(), None);
    }

    #[test]
    fn test_begin_wait_clears_previous_result() {
        let mut tracker = PendingTracker::new();
        tracker.begin_wait(AwaitedReply::SingleTag(CommandTag::Status));
        tracker.offer(&classify(&[0x02, 0x07]).unwrap(), None);

        tracker.begin_wait(AwaitedReply::SingleTag(CommandTag::Status));
        assert!(!tracker.is_resolved());
        assert!(tracker.is_waiting());
    }

    #[test]
    fn test_wait_sees_resolution_that_happened_first() {
        let slot = Mutex::new(PendingTracker::new());
        let signal = Condvar::new();

        let mut guard = slot.lock().unwrap();
        guard.begin_wait(AwaitedReply::SingleTag(CommandTag::Led));
        guard.offer(&classify(&[0x01, 0x01]).unwrap(), None);

        let (_guard, outcome) = wait(&signal, guard, Duration::ZERO);
        assert_eq!(
            outcome,
            WaitOutcome::Resolved(Ok(Reply::Frame(vec![0x01, 0x01])))
        );
    }

    #[test]
    fn test_wait_times_out_and_abandons() {
        let slot = Mutex::new(PendingTracker::new());
        let signal = Condvar::new();

        let mut guard = slot.lock().unwrap();
        guard.begin_wait(AwaitedReply::SingleTag(CommandTag::Status));
        let (mut guard, outcome) = wait(&signal, guard, Duration::from_millis(20));
        assert_eq!(outcome, WaitOutcome::TimedOut);

        // A late reply finds no request to resolve.
        assert!(!guard.offer(&classify(&[0x02, 0x00]).unwrap(), None));
        assert_eq!(guard.awaited(), None);
    }

    #[test]
    fn test_wait_woken_from_other_thread() {
        let shared = Arc::new((Mutex::new(PendingTracker::new()), Condvar::new()));

        let mut guard = shared.0.lock().unwrap();
        guard.begin_wait(AwaitedReply::SingleTag(CommandTag::Adc));

        let notifier = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            let (slot, signal) = &*notifier;
            let mut tracker = slot.lock().unwrap();
            tracker.offer(&classify(&[0x05, 0x01, 0x2C]).unwrap(), None);
            signal.notify_all();
        });

        let (_guard, outcome) = wait(&shared.1, guard, Duration::from_secs(5));
        assert_eq!(
            outcome,
            WaitOutcome::Resolved(Ok(Reply::Frame(vec![0x05, 0x01, 0x2C])))
        );
        handle.join().unwrap();
    }
}
