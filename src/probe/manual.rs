//! Manual-control probe: demand and cancellation are driven by the test.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StreamError;
use crate::probe::signal::{Signal, SignalLog, probe_name};
use crate::protocol::{Subscriber, SubscriptionRef};

/// Probe that stores its subscription for external `request`/`cancel` calls.
///
/// Every signal is recorded into the shared [`SignalLog`] under the probe name.
pub struct ManualProbe<T> {
    name: Arc<str>,
    log: Arc<SignalLog<T>>,
    initial: u64,
    subscription: Mutex<Option<SubscriptionRef>>,
}

impl<T: Clone> ManualProbe<T> {
    /// Probe that requests nothing on its own.
    pub fn new(name: &str, log: Arc<SignalLog<T>>) -> Arc<Self> {
        Self::with_initial_request(name, log, 0)
    }

    /// Probe that requests `n` items from inside `on_subscribe` (`0` = nothing).
    pub fn with_initial_request(name: &str, log: Arc<SignalLog<T>>, n: u64) -> Arc<Self> {
        Arc::new(Self {
            name: probe_name(name),
            log,
            initial: n,
            subscription: Mutex::new(None),
        })
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Forwards `request(n)`; ignored before `on_subscribe`.
    pub fn request(&self, n: u64) {
        let subscription = self.subscription.lock().clone();
        match subscription {
            Some(s) => s.request(n),
            None => debug!(subscriber = %self.name, n, "request before subscribe ignored"),
        }
    }

    /// Forwards `cancel()`; the subscription is kept so repeated calls reach it too.
    pub fn cancel(&self) {
        let subscription = self.subscription.lock().clone();
        if let Some(s) = subscription {
            s.cancel();
        }
    }

    /// Items this probe received so far.
    pub fn items(&self) -> Vec<T> {
        self.log.items_of(&self.name)
    }
}

impl<T: Clone + Send + 'static> Subscriber<T> for ManualProbe<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.log.push(&self.name, Signal::Subscribed);
        *self.subscription.lock() = Some(Arc::clone(&subscription));
        if self.initial > 0 {
            subscription.request(self.initial);
        }
    }

    fn on_next(&self, item: T) {
        self.log.push(&self.name, Signal::Next(item));
    }

    fn on_error(&self, error: StreamError) {
        self.log.push(&self.name, Signal::Error(error));
    }

    fn on_complete(&self) {
        self.log.push(&self.name, Signal::Complete);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Publisher;
    use crate::publisher::BoundedPublisher;

    #[test]
    fn test_request_before_subscribe_is_ignored() {
        let log: Arc<SignalLog<u64>> = SignalLog::new();
        let probe = ManualProbe::new("early", log.clone());
        probe.request(3);
        probe.cancel();
        assert!(log.is_empty());
    }

    #[test]
    fn test_initial_request() {
        let log = SignalLog::new();
        let probe = ManualProbe::with_initial_request("p", log.clone(), 4);
        BoundedPublisher::range(10).subscribe(probe.clone());
        assert_eq!(probe.items(), vec![1, 2, 3, 4]);
        assert_eq!(log.signals_of("p")[0], Signal::Subscribed);
    }
}
