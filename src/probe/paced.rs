//! Slow-consumer wrapper.
//!
//! [`Paced`] drives upstream demand from a timer instead of from the wrapped
//! subscriber: one item is requested per `period` on a tokio task. The wrapped
//! subscriber's own requests are ignored; its `cancel` stops the timer and the
//! upstream subscription.
//!
//! Outside a tokio runtime pacing is impossible; the wrapper then logs a
//! warning and requests everything at once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::select;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::StreamError;
use crate::protocol::{
    SubscriberRef, SubscriberSlot, Subscriber, Subscription, SubscriptionRef, UNBOUNDED,
};

/// Subscriber requesting one item per period on behalf of the wrapped consumer.
pub struct Paced<T> {
    period: Duration,
    downstream: SubscriberSlot<T>,
    upstream: Arc<Mutex<Option<SubscriptionRef>>>,
    token: CancellationToken,
}

impl<T: Send + 'static> Paced<T> {
    pub fn new(period: Duration, downstream: SubscriberRef<T>) -> Arc<Self> {
        Arc::new(Self {
            period,
            downstream: SubscriberSlot::new(downstream),
            upstream: Arc::new(Mutex::new(None)),
            token: CancellationToken::new(),
        })
    }

    fn stop(&self) {
        self.token.cancel();
        self.upstream.lock().take();
        self.downstream.release();
    }
}

impl<T: Send + 'static> Subscriber<T> for Paced<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        let Some(downstream) = self.downstream.get() else {
            subscription.cancel();
            return;
        };
        *self.upstream.lock() = Some(Arc::clone(&subscription));
        downstream.on_subscribe(Arc::new(PacedSubscription {
            upstream: Arc::clone(&self.upstream),
            token: self.token.clone(),
        }));

        match Handle::try_current() {
            Ok(handle) => {
                let token = self.token.clone();
                let period = self.period;
                handle.spawn(async move {
                    let mut ticker = time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    // the first tick completes immediately
                    ticker.tick().await;
                    loop {
                        select! {
                            _ = token.cancelled() => break,
                            _ = ticker.tick() => subscription.request(1),
                        }
                    }
                });
            }
            Err(_) => {
                warn!(period = ?self.period, "no tokio runtime: pacing disabled");
                subscription.request(UNBOUNDED);
            }
        }
    }

    fn on_next(&self, item: T) {
        if let Some(downstream) = self.downstream.get() {
            downstream.on_next(item);
        }
    }

    fn on_error(&self, error: StreamError) {
        let downstream = self.downstream.get();
        self.stop();
        if let Some(downstream) = downstream {
            downstream.on_error(error);
        }
    }

    fn on_complete(&self) {
        let downstream = self.downstream.get();
        self.stop();
        if let Some(downstream) = downstream {
            downstream.on_complete();
        }
    }

    fn name(&self) -> &str {
        "paced"
    }
}

struct PacedSubscription {
    upstream: Arc<Mutex<Option<SubscriptionRef>>>,
    token: CancellationToken,
}

impl Subscription for PacedSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {
        self.token.cancel();
        let upstream = self.upstream.lock().take();
        if let Some(s) = upstream {
            s.cancel();
        }
    }
}
