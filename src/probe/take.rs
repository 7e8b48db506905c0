//! `take(n)` consumer wrapper.
//!
//! Forwards at most `n` items to the wrapped subscriber, then cancels upstream
//! and completes downstream. Downstream requests are capped at what is still
//! missing, so an unbounded consumer never asks a bounded source for more
//! than `n` items.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StreamError;
use crate::protocol::{
    EmptySubscription, SubscriberRef, SubscriberSlot, Subscriber, Subscription, SubscriptionRef,
    Terminal, TerminalFlag,
};

struct TakeState<T> {
    limit: u64,
    downstream: SubscriberSlot<T>,
    upstream: Mutex<Option<SubscriptionRef>>,
    requested: AtomicU64,
    received: AtomicU64,
    terminal: TerminalFlag,
}

impl<T> TakeState<T> {
    fn upstream(&self) -> Option<SubscriptionRef> {
        self.upstream.lock().clone()
    }

    fn stop_upstream(&self) {
        let upstream = self.upstream.lock().take();
        if let Some(s) = upstream {
            s.cancel();
        }
    }
}

/// Subscriber limiting the wrapped consumer to the first `limit` items.
///
/// # Example
/// ```
/// use flowvisor::{BoundedPublisher, CollectProbe, Publisher, Take};
///
/// let probe = CollectProbe::new();
/// BoundedPublisher::range(10).subscribe(Take::new(2, probe.clone()));
/// assert_eq!(probe.items(), vec![1, 2]);
/// assert!(probe.is_completed());
/// ```
pub struct Take<T> {
    state: Arc<TakeState<T>>,
}

impl<T: Send + 'static> Take<T> {
    pub fn new(limit: u64, downstream: SubscriberRef<T>) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(TakeState {
                limit,
                downstream: SubscriberSlot::new(downstream),
                upstream: Mutex::new(None),
                requested: AtomicU64::new(0),
                received: AtomicU64::new(0),
                terminal: TerminalFlag::new(),
            }),
        })
    }
}

impl<T: Send + 'static> Subscriber<T> for Take<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        let Some(downstream) = self.state.downstream.get() else {
            subscription.cancel();
            return;
        };
        if self.state.limit == 0 {
            subscription.cancel();
            if self.state.terminal.set(Terminal::Completed) {
                downstream.on_subscribe(Arc::new(EmptySubscription));
                downstream.on_complete();
                self.state.downstream.release();
            }
            return;
        }
        *self.state.upstream.lock() = Some(subscription);
        downstream.on_subscribe(Arc::new(TakeSubscription {
            state: Arc::clone(&self.state),
        }));
    }

    fn on_next(&self, item: T) {
        if self.state.terminal.is_set() {
            return;
        }
        let count = self.state.received.fetch_add(1, Ordering::AcqRel) + 1;
        if count > self.state.limit {
            return;
        }
        let Some(downstream) = self.state.downstream.get() else {
            return;
        };
        downstream.on_next(item);
        if count == self.state.limit && self.state.terminal.set(Terminal::Completed) {
            debug!(limit = self.state.limit, "take limit reached");
            self.state.stop_upstream();
            downstream.on_complete();
            self.state.downstream.release();
        }
    }

    fn on_error(&self, error: StreamError) {
        if self.state.terminal.set(Terminal::Errored) {
            self.state.upstream.lock().take();
            if let Some(downstream) = self.state.downstream.get() {
                downstream.on_error(error);
            }
            self.state.downstream.release();
        }
    }

    fn on_complete(&self) {
        if self.state.terminal.set(Terminal::Completed) {
            self.state.upstream.lock().take();
            if let Some(downstream) = self.state.downstream.get() {
                downstream.on_complete();
            }
            self.state.downstream.release();
        }
    }

    fn name(&self) -> &str {
        "take"
    }
}

struct TakeSubscription<T> {
    state: Arc<TakeState<T>>,
}

impl<T: Send + 'static> Subscription for TakeSubscription<T> {
    fn request(&self, n: u64) {
        if self.state.terminal.is_set() {
            return;
        }
        let Some(upstream) = self.state.upstream() else {
            return;
        };
        if n == 0 {
            upstream.request(0);
            return;
        }
        let limit = self.state.limit;
        let granted = self
            .state
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                (r < limit).then(|| r + n.min(limit - r))
            });
        if let Ok(prev) = granted {
            upstream.request(n.min(limit - prev));
        }
    }

    fn cancel(&self) {
        if self.state.terminal.set(Terminal::Cancelled) {
            self.state.stop_upstream();
            self.state.downstream.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{CollectProbe, ManualProbe, Signal, SignalLog};
    use crate::protocol::Publisher;
    use crate::publisher::BoundedPublisher;
    use crate::sink::{EmitResult, Sink, SinkPolicy};

    #[test]
    fn test_caps_unbounded_demand() {
        let probe = CollectProbe::new();
        // the collector asks for everything; upstream only sees a request for 5
        BoundedPublisher::range(10).subscribe(Take::new(5, probe.clone()));
        assert_eq!(probe.items(), vec![1, 2, 3, 4, 5]);
        assert!(probe.is_completed());
    }

    #[test]
    fn test_cancels_upstream_at_limit() {
        let sink = Sink::new(SinkPolicy::multicast(8));
        let probe = CollectProbe::new();
        sink.subscribe(Take::new(2, probe.clone()));

        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(2), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(3), EmitResult::FailZeroSubscriber);
        assert_eq!(probe.items(), vec![1, 2]);
        assert!(probe.is_completed());
    }

    #[test]
    fn test_partial_requests() {
        let log = SignalLog::new();
        let probe = ManualProbe::new("m", log.clone());
        BoundedPublisher::range(10).subscribe(Take::new(3, probe.clone()));

        probe.request(2);
        assert_eq!(log.items_of("m"), vec![1, 2]);
        probe.request(5);
        assert_eq!(
            log.signals_of("m"),
            vec![
                Signal::Subscribed,
                Signal::Next(1),
                Signal::Next(2),
                Signal::Next(3),
                Signal::Complete
            ]
        );
    }

    #[test]
    fn test_zero_limit_completes_immediately() {
        let probe = CollectProbe::new();
        BoundedPublisher::range(10).subscribe(Take::new(0, probe.clone()));
        assert!(probe.items().is_empty());
        assert!(probe.is_completed());
    }
}
