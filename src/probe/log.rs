//! # Logging probe.
//!
//! Requests everything on subscribe and logs each received signal at `info`
//! level via `tracing`, tagged with the probe name. Optionally records into a
//! shared [`SignalLog`].
//!
//! ## Output format
//! ```text
//! INFO subscriber="sam" subscribed
//! INFO subscriber="sam" item=1 received
//! INFO subscriber="sam" completed
//! INFO subscriber="sam" error="upstream error: boom" failed
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::StreamError;
use crate::probe::signal::{Signal, SignalLog, probe_name};
use crate::protocol::{Subscriber, SubscriptionRef, UNBOUNDED};

/// Unbounded-demand probe that logs every signal.
pub struct LogProbe<T> {
    name: Arc<str>,
    log: Option<Arc<SignalLog<T>>>,
    subscription: Mutex<Option<SubscriptionRef>>,
}

impl<T: Clone> LogProbe<T> {
    /// Creates a probe recording into `log`. Blank names become `"anonymous"`.
    pub fn new(name: &str, log: Arc<SignalLog<T>>) -> Arc<Self> {
        Arc::new(Self {
            name: probe_name(name),
            log: Some(log),
            subscription: Mutex::new(None),
        })
    }

    /// Creates a probe that only logs.
    pub fn standalone(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: probe_name(name),
            log: None,
            subscription: Mutex::new(None),
        })
    }

    /// Cancels the subscription, if any.
    pub fn cancel(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(s) = subscription {
            info!(subscriber = %self.name, "cancelling");
            s.cancel();
        }
    }

    fn record(&self, signal: Signal<T>) {
        if let Some(log) = &self.log {
            log.push(&self.name, signal);
        }
    }
}

impl<T> Subscriber<T> for LogProbe<T>
where
    T: Debug + Clone + Send + 'static,
{
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        info!(subscriber = %self.name, "subscribed");
        self.record(Signal::Subscribed);
        *self.subscription.lock() = Some(Arc::clone(&subscription));
        subscription.request(UNBOUNDED);
    }

    fn on_next(&self, item: T) {
        info!(subscriber = %self.name, item = ?item, "received");
        self.record(Signal::Next(item));
    }

    fn on_error(&self, error: StreamError) {
        info!(subscriber = %self.name, error = %error, "failed");
        self.subscription.lock().take();
        self.record(Signal::Error(error));
    }

    fn on_complete(&self) {
        info!(subscriber = %self.name, "completed");
        self.subscription.lock().take();
        self.record(Signal::Complete);
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
    fn test_requests_everything() {
        let log = SignalLog::new();
        let probe = LogProbe::new("sam", log.clone());
        BoundedPublisher::range(10).subscribe(probe.clone());

        let signals = log.signals_of("sam");
        assert_eq!(signals.first(), Some(&Signal::Subscribed));
        assert_eq!(signals.last(), Some(&Signal::Complete));
        assert_eq!(log.items_of("sam"), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_blank_name_is_anonymous() {
        let log: Arc<SignalLog<u64>> = SignalLog::new();
        let probe = LogProbe::new("", log.clone());
        assert_eq!(Subscriber::<u64>::name(probe.as_ref()), "anonymous");
        BoundedPublisher::range(1).subscribe(probe.clone());
        assert_eq!(log.items_of("anonymous"), vec![1]);
    }
}
