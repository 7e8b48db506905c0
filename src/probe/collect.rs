//! List-collecting probe.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;
use crate::protocol::{Subscriber, SubscriptionRef, UNBOUNDED};

/// Requests everything and keeps received items in memory.
pub struct CollectProbe<T> {
    items: Mutex<Vec<T>>,
    outcome: Mutex<Option<Result<(), StreamError>>>,
    subscription: Mutex<Option<SubscriptionRef>>,
}

impl<T: Clone> CollectProbe<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Vec::new()),
            outcome: Mutex::new(None),
            subscription: Mutex::new(None),
        })
    }

    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_completed(&self) -> bool {
        matches!(*self.outcome.lock(), Some(Ok(())))
    }

    pub fn error(&self) -> Option<StreamError> {
        match &*self.outcome.lock() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.outcome.lock().is_some()
    }

    pub fn cancel(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(s) = subscription {
            s.cancel();
        }
    }
}

impl<T: Clone + Send + 'static> Subscriber<T> for CollectProbe<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        *self.subscription.lock() = Some(Arc::clone(&subscription));
        subscription.request(UNBOUNDED);
    }

    fn on_next(&self, item: T) {
        self.items.lock().push(item);
    }

    fn on_error(&self, error: StreamError) {
        self.subscription.lock().take();
        self.outcome.lock().get_or_insert(Err(error));
    }

    fn on_complete(&self) {
        self.subscription.lock().take();
        self.outcome.lock().get_or_insert(Ok(()));
    }

    fn name(&self) -> &str {
        "collect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Publisher;
    use crate::publisher::BoundedPublisher;

    #[test]
    fn test_collects_custom_feed() {
        let publisher = BoundedPublisher::new(10, || {
            let mut n = 0u64;
            move |_i: u64| {
                n += 2;
                Some(n)
            }
        });
        let probe = CollectProbe::new();
        publisher.subscribe(probe.clone());
        assert_eq!(probe.items(), vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]);
        assert!(probe.is_completed());
        assert_eq!(probe.error(), None);
    }

    #[test]
    fn test_cancel_stops_collection() {
        use crate::sink::{EmitResult, Sink, SinkPolicy};

        let sink = Sink::new(SinkPolicy::multicast(4));
        let probe = CollectProbe::new();
        sink.subscribe(probe.clone());
        sink.try_emit_next("a");
        probe.cancel();
        assert_eq!(sink.try_emit_next("b"), EmitResult::FailZeroSubscriber);
        assert_eq!(probe.items(), vec!["a"]);
        assert!(!probe.is_terminated());
    }
}
