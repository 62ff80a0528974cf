//! Signal bus fanning output signals out to subscribers.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::events::{OutputSignal, SignalEvent};
use crate::types::{OutputId, OutputType};

/// Which events a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFilter {
    /// Every event on the bus.
    All,

    /// Events from one output.
    Output(OutputId),

    /// Events from every output of one family.
    OutputType(OutputType),
}

impl SignalFilter {
    fn matches(&self, event: &SignalEvent) -> bool {
        match self {
            Self::All => true,
            Self::Output(id) => event.output == *id,
            Self::OutputType(ty) => event.output_type == *ty,
        }
    }
}

struct Subscriber {
    filter: SignalFilter,
    tx: Sender<SignalEvent>,
    receiver: Weak<()>,
}

impl Subscriber {
    /// Send `event` if it matches. False once the receiver is gone.
    fn offer(&self, event: &SignalEvent) -> bool {
        if self.receiver.strong_count() == 0 {
            return false;
        }
        !self.filter.matches(event) || self.tx.send(event.clone()).is_ok()
    }
}

/// Process-wide, append-ordered signal channel.
///
/// Cloning yields another handle to the same bus. Publishing holds the
/// subscriber lock for the whole fan-out, so every subscriber observes events
/// in the same order.
#[derive(Clone, Default)]
pub struct SignalBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl SignalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> SignalReceiver {
        self.subscribe_filtered(SignalFilter::All)
    }

    /// Subscribe to the events selected by `filter`.
    pub fn subscribe_filtered(&self, filter: SignalFilter) -> SignalReceiver {
        let (tx, rx) = crate::signal_channel();
        let alive = Arc::new(());
        self.subscribers.lock().push(Subscriber {
            filter,
            tx,
            receiver: Arc::downgrade(&alive),
        });
        debug!(?filter, "Signal subscriber registered");
        SignalReceiver {
            rx,
            pending: VecDeque::new(),
            _alive: alive,
        }
    }

    /// Deliver `event` to every matching subscriber.
    ///
    /// Subscribers whose receiver has been dropped are pruned, whether or not
    /// they match.
    pub fn publish(&self, event: SignalEvent) {
        trace!(
            output = %event.output,
            output_type = %event.output_type,
            signal = %event.signal,
            code = event.code,
            "Publishing signal"
        );

        self.subscribers.lock().retain(|sub| sub.offer(&event));
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Errors returned while waiting for a signal.
#[derive(Debug, Error)]
pub enum WaitError {
    /// Nothing matching arrived within the wait budget.
    #[error("Timed out waiting for {expected} signal")]
    Timeout { expected: OutputSignal },

    /// The bus was dropped.
    #[error("Signal bus disconnected")]
    Disconnected,

    /// A different signal arrived first.
    #[error("Expected {expected} signal, received {} (code {})", .received.signal, .received.code)]
    UnexpectedSignal {
        expected: OutputSignal,
        received: Box<SignalEvent>,
    },
}

impl WaitError {
    /// The event that arrived in place of the expected one, if any.
    pub fn received(&self) -> Option<&SignalEvent> {
        match self {
            Self::UnexpectedSignal { received, .. } => Some(received),
            _ => None,
        }
    }
}

/// Receiving end of a bus subscription.
///
/// Events skipped by a filtered wait are kept and handed out by later waits,
/// so no event is lost between calls.
pub struct SignalReceiver {
    rx: Receiver<SignalEvent>,
    pending: VecDeque<SignalEvent>,
    _alive: Arc<()>,
}

impl SignalReceiver {
    /// Next event of any kind, waiting up to `timeout`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<SignalEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        self.rx.recv_timeout(timeout).ok()
    }

    /// Next event of any kind without blocking.
    pub fn try_recv(&mut self) -> Option<SignalEvent> {
        self.pending.pop_front().or_else(|| self.rx.try_recv().ok())
    }

    /// Everything currently queued.
    pub fn drain(&mut self) -> Vec<SignalEvent> {
        let mut events: Vec<_> = self.pending.drain(..).collect();
        events.extend(self.rx.try_iter());
        events
    }

    /// Wait for the next signal from an output of `output_type`.
    ///
    /// Returns the event when it is `expected`. When a different signal from
    /// that output type arrives first it is consumed and returned as
    /// [`WaitError::UnexpectedSignal`]; a `Stop` in place of `Start` is how a
    /// failed start is reported.
    pub fn wait_for_next(
        &mut self,
        output_type: OutputType,
        expected: OutputSignal,
        timeout: Duration,
    ) -> Result<SignalEvent, WaitError> {
        self.wait_matching(|event| event.output_type == output_type, expected, timeout)
    }

    /// Like [`wait_for_next`](Self::wait_for_next) but for a single output.
    pub fn wait_for_output(
        &mut self,
        output: OutputId,
        expected: OutputSignal,
        timeout: Duration,
    ) -> Result<SignalEvent, WaitError> {
        self.wait_matching(|event| event.output == output, expected, timeout)
    }

    fn wait_matching(
        &mut self,
        select: impl Fn(&SignalEvent) -> bool,
        expected: OutputSignal,
        timeout: Duration,
    ) -> Result<SignalEvent, WaitError> {
        let event = match self.pending.iter().position(&select) {
            Some(pos) => self.pending.remove(pos),
            None => None,
        };

        let event = match event {
            Some(event) => event,
            None => {
                let deadline = Instant::now() + timeout;
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.rx.recv_timeout(remaining) {
                        Ok(event) if select(&event) => break event,
                        Ok(event) => self.pending.push_back(event),
                        Err(RecvTimeoutError::Timeout) => {
                            return Err(WaitError::Timeout { expected })
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(WaitError::Disconnected)
                        }
                    }
                }
            }
        };

        if event.signal == expected {
            Ok(event)
        } else {
            Err(WaitError::UnexpectedSignal {
                expected,
                received: Box::new(event),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StatusCode;

    const WAIT: Duration = Duration::from_millis(200);

    fn event(index: u32, ty: OutputType, signal: OutputSignal) -> SignalEvent {
        SignalEvent::ok(OutputId::new(index, 0), ty, signal)
    }

    #[test]
    fn fan_out_reaches_every_subscriber_in_order() {
        let bus = SignalBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(event(0, OutputType::Recording, OutputSignal::Start));
        bus.publish(event(0, OutputType::Recording, OutputSignal::Stopping));

        for rx in [&mut a, &mut b] {
            let signals: Vec<_> = rx.drain().into_iter().map(|e| e.signal).collect();
            assert_eq!(signals, vec![OutputSignal::Start, OutputSignal::Stopping]);
        }
    }

    #[test]
    fn wait_skips_other_types_and_keeps_them() {
        let bus = SignalBus::new();
        let mut rx = bus.subscribe();

        bus.publish(event(1, OutputType::Streaming, OutputSignal::Starting));
        bus.publish(event(0, OutputType::Recording, OutputSignal::Start));

        let got = rx
            .wait_for_next(OutputType::Recording, OutputSignal::Start, WAIT)
            .unwrap();
        assert_eq!(got.output, OutputId::new(0, 0));

        let skipped = rx
            .wait_for_next(OutputType::Streaming, OutputSignal::Starting, WAIT)
            .unwrap();
        assert_eq!(skipped.output, OutputId::new(1, 0));
    }

    #[test]
    fn stop_in_place_of_start_is_reported() {
        let bus = SignalBus::new();
        let mut rx = bus.subscribe();

        bus.publish(SignalEvent::failed(
            OutputId::new(0, 0),
            OutputType::Recording,
            OutputSignal::Stop,
            StatusCode::BadPath,
            "no such directory",
        ));

        let err = rx
            .wait_for_next(OutputType::Recording, OutputSignal::Start, WAIT)
            .unwrap_err();
        let received = err.received().unwrap();
        assert_eq!(received.signal, OutputSignal::Stop);
        assert_eq!(received.code, -1);
    }

    #[test]
    fn wait_times_out_without_events() {
        let bus = SignalBus::new();
        let mut rx = bus.subscribe();
        let err = rx
            .wait_for_next(
                OutputType::ReplayBuffer,
                OutputSignal::Start,
                Duration::from_millis(20),
            )
            .unwrap_err();
        assert!(matches!(err, WaitError::Timeout { .. }));
    }

    #[test]
    fn filtered_subscriber_sees_only_its_output() {
        let bus = SignalBus::new();
        let target = OutputId::new(4, 2);
        let mut rx = bus.subscribe_filtered(SignalFilter::Output(target));

        bus.publish(event(1, OutputType::Recording, OutputSignal::Start));
        bus.publish(SignalEvent::ok(target, OutputType::Streaming, OutputSignal::Starting));

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].output, target);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = SignalBus::new();
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx);
        bus.publish(event(0, OutputType::Recording, OutputSignal::Start));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn dropped_filtered_subscribers_are_pruned_without_a_match() {
        let bus = SignalBus::new();
        let gone = bus.subscribe_filtered(SignalFilter::Output(OutputId::new(7, 0)));
        let replay = bus.subscribe_filtered(SignalFilter::OutputType(OutputType::ReplayBuffer));
        let mut keep = bus.subscribe_filtered(SignalFilter::Output(OutputId::new(7, 0)));
        assert_eq!(bus.subscriber_count(), 3);

        drop(gone);
        drop(replay);
        bus.publish(event(0, OutputType::Recording, OutputSignal::Start));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.drain().is_empty());
    }
}
