//! # Bounded cold publisher.
//!
//! [`BoundedPublisher`] produces at most `max_items` items per subscription.
//! Every `subscribe` builds a fresh feed and a fresh demand-tracked
//! subscription, so each consumer observes the full sequence from the start.
//!
//! ## Request handling
//! ```text
//! request(n)
//!   ├─ terminal?            → no-op
//!   ├─ n == 0               → on_error(InvalidDemand), terminal
//!   ├─ n == UNBOUNDED       → everything that is left
//!   ├─ n > max_items        → on_error(ExcessDemand), terminal, nothing emitted
//!   └─ otherwise            → demand += n (saturating)
//!                             emit min(demand, remaining) items synchronously
//!                             emitted == max_items → on_complete, terminal
//! ```
//!
//! ## Rules
//! - Asking for less than is available is serviced; asking for a finite amount
//!   above what the source can ever produce is rejected, not truncated.
//!   `UNBOUNDED` means "everything" and is never excess.
//! - `cancel` is observed before every emission; idempotent.
//! - Reentrant `request` calls from inside `on_next` add demand to the running
//!   drain instead of recursing.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::StreamError;
use crate::protocol::{
    Demand, Publisher, SubscriberRef, SubscriberSlot, Subscription, Terminal, TerminalFlag,
    UNBOUNDED, Wip,
};
use crate::publisher::feed::{self, Feed};

type FeedFactory<T> = dyn Fn() -> Box<dyn Feed<T>> + Send + Sync;

/// Cold publisher producing up to `max_items` items per subscription.
///
/// # Example
/// ```rust
/// use flowvisor::{BoundedPublisher, ManualProbe, Publisher, SignalLog};
///
/// let publisher = BoundedPublisher::range(10);
/// let log = SignalLog::new();
/// let probe = ManualProbe::new("sam", log.clone());
/// publisher.subscribe(probe.clone());
///
/// probe.request(3);
/// assert_eq!(log.items_of("sam"), vec![1, 2, 3]);
///
/// probe.request(11); // more than the source can ever produce
/// assert_eq!(log.errors_of("sam").len(), 1);
/// ```
pub struct BoundedPublisher<T> {
    max_items: u64,
    make_feed: Arc<FeedFactory<T>>,
}

impl BoundedPublisher<u64> {
    /// Publishes `1..=max_items`.
    pub fn range(max_items: u64) -> Self {
        Self::new(max_items, feed::counter)
    }
}

impl<T: Send + 'static> BoundedPublisher<T> {
    /// Creates a publisher whose runs are produced by feeds from `make_feed`.
    ///
    /// `make_feed` is called once per `subscribe`.
    pub fn new<F, M>(max_items: u64, make_feed: M) -> Self
    where
        F: Feed<T>,
        M: Fn() -> F + Send + Sync + 'static,
    {
        Self {
            max_items,
            make_feed: Arc::new(move || Box::new(make_feed()) as Box<dyn Feed<T>>),
        }
    }

    /// Creates a publisher bounded by [`Config::max_items`].
    pub fn from_config<F, M>(cfg: &Config, make_feed: M) -> Self
    where
        F: Feed<T>,
        M: Fn() -> F + Send + Sync + 'static,
    {
        Self::new(cfg.max_items, make_feed)
    }

    /// The hard upper bound per subscription.
    pub fn max_items(&self) -> u64 {
        self.max_items
    }
}

impl<T> Clone for BoundedPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            max_items: self.max_items,
            make_feed: Arc::clone(&self.make_feed),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for BoundedPublisher<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let subscription = Arc::new(BoundedSubscription {
            name: subscriber.name().to_string(),
            subscriber: SubscriberSlot::new(Arc::clone(&subscriber)),
            max_items: self.max_items,
            demand: Demand::new(),
            wip: Wip::new(),
            terminal: TerminalFlag::new(),
            rejection: Mutex::new(None),
            progress: Mutex::new(Progress {
                feed: (self.make_feed)(),
                emitted: 0,
            }),
        });
        subscriber.on_subscribe(subscription);
    }
}

/// Producer state touched only by the drainer.
struct Progress<T> {
    feed: Box<dyn Feed<T>>,
    emitted: u64,
}

enum Step<T> {
    Emit(T),
    Complete,
    Idle,
}

/// Demand-tracked link between one consumer and its private run.
struct BoundedSubscription<T> {
    name: String,
    subscriber: SubscriberSlot<T>,
    max_items: u64,
    demand: Demand,
    wip: Wip,
    terminal: TerminalFlag,
    rejection: Mutex<Option<StreamError>>,
    progress: Mutex<Progress<T>>,
}

impl<T: Send + 'static> Subscription for BoundedSubscription<T> {
    fn request(&self, n: u64) {
        debug!(subscriber = %self.name, n, "subscriber requested items");
        if self.terminal.is_set() {
            return;
        }

        if n == 0 || (n != UNBOUNDED && n > self.max_items) {
            let err = if n == 0 {
                StreamError::InvalidDemand
            } else {
                StreamError::ExcessDemand {
                    requested: n,
                    max: self.max_items,
                }
            };
            warn!(subscriber = %self.name, error = err.as_label(), "rejecting request");
            self.rejection.lock().get_or_insert(err);
        } else {
            self.demand.add(n);
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.terminal.set(Terminal::Cancelled) {
            debug!(subscriber = %self.name, "subscriber has cancelled");
            self.subscriber.release();
        }
    }
}

impl<T: Send + 'static> BoundedSubscription<T> {
    fn drain(&self) {
        if !self.wip.enter() {
            return;
        }
        let mut missed = 1;
        loop {
            self.drain_once();
            missed = self.wip.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn drain_once(&self) {
        let Some(subscriber) = self.subscriber.get() else {
            return;
        };

        loop {
            if self.terminal.is_set() {
                return;
            }

            let rejection = self.rejection.lock().take();
            if let Some(err) = rejection {
                if self.terminal.set(Terminal::Errored) {
                    subscriber.on_error(err);
                    self.subscriber.release();
                }
                return;
            }

            match self.next_step() {
                Step::Emit(item) => subscriber.on_next(item),
                Step::Complete => {
                    if self.terminal.set(Terminal::Completed) {
                        debug!(subscriber = %self.name, "no more data to produce");
                        subscriber.on_complete();
                        self.subscriber.release();
                    }
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    fn next_step(&self) -> Step<T> {
        let mut progress = self.progress.lock();
        if progress.emitted >= self.max_items {
            return Step::Complete;
        }
        if !self.demand.try_take() {
            return Step::Idle;
        }
        let index = progress.emitted;
        match progress.feed.next(index) {
            Some(item) => {
                progress.emitted += 1;
                Step::Emit(item)
            }
            None => Step::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ManualProbe, Signal, SignalLog};

    fn setup(max: u64) -> (Arc<SignalLog<u64>>, Arc<ManualProbe<u64>>) {
        let publisher = BoundedPublisher::range(max);
        let log = SignalLog::new();
        let probe = ManualProbe::new("sub", log.clone());
        publisher.subscribe(probe.clone());
        (log, probe)
    }

    #[test]
    fn test_nothing_flows_without_request() {
        let (log, probe) = setup(10);
        assert!(probe.is_subscribed());
        assert_eq!(log.signals_of("sub"), vec![Signal::Subscribed]);
    }

    #[test]
    fn test_demand_conservation() {
        let (log, probe) = setup(10);
        probe.request(3);
        assert_eq!(log.items_of("sub"), vec![1, 2, 3]);
        probe.request(3);
        probe.request(3);
        assert_eq!(log.items_of("sub").len(), 9);
        assert!(!log.completed("sub"));

        probe.request(3);
        assert_eq!(log.items_of("sub"), (1..=10).collect::<Vec<_>>());
        assert!(log.completed("sub"));
        assert_eq!(log.terminal_count("sub"), 1);

        // terminal: further requests are no-ops
        probe.request(3);
        assert_eq!(log.items_of("sub").len(), 10);
        assert_eq!(log.terminal_count("sub"), 1);
    }

    #[test]
    fn test_exact_request_completes() {
        let (log, probe) = setup(10);
        probe.request(10);
        let signals = log.signals_of("sub");
        assert_eq!(signals.len(), 12);
        assert_eq!(signals.last(), Some(&Signal::Complete));
    }

    #[test]
    fn test_excess_demand_rejected() {
        let (log, probe) = setup(10);
        probe.request(11);
        assert!(log.items_of("sub").is_empty());
        assert_eq!(
            log.errors_of("sub"),
            vec![StreamError::ExcessDemand {
                requested: 11,
                max: 10
            }]
        );

        probe.request(2);
        assert!(log.items_of("sub").is_empty());
        assert_eq!(log.terminal_count("sub"), 1);
    }

    #[test]
    fn test_unbounded_request_takes_everything() {
        let (log, probe) = setup(10);
        probe.request(UNBOUNDED);
        assert_eq!(log.items_of("sub"), (1..=10).collect::<Vec<_>>());
        assert!(log.completed("sub"));
        assert!(log.errors_of("sub").is_empty());

        let (log, probe) = setup(10);
        probe.request(UNBOUNDED - 1);
        assert!(log.items_of("sub").is_empty());
        assert_eq!(
            log.errors_of("sub"),
            vec![StreamError::ExcessDemand {
                requested: UNBOUNDED - 1,
                max: 10
            }]
        );
    }

    #[test]
    fn test_zero_request_is_a_violation() {
        let (log, probe) = setup(10);
        probe.request(0);
        assert_eq!(log.errors_of("sub"), vec![StreamError::InvalidDemand]);
    }

    #[test]
    fn test_cancel_stops_emission() {
        let (log, probe) = setup(10);
        probe.request(3);
        probe.cancel();
        probe.cancel();
        probe.request(3);
        assert_eq!(log.items_of("sub"), vec![1, 2, 3]);
        assert_eq!(log.terminal_count("sub"), 0);
    }

    #[test]
    fn test_cold_independence() {
        let publisher = BoundedPublisher::range(10);
        let log = SignalLog::new();
        let sam = ManualProbe::new("sam", log.clone());
        let mike = ManualProbe::new("mike", log.clone());
        publisher.subscribe(sam.clone());
        publisher.subscribe(mike.clone());

        sam.request(10);
        mike.request(4);
        mike.request(6);

        let expected: Vec<u64> = (1..=10).collect();
        assert_eq!(log.items_of("sam"), expected);
        assert_eq!(log.items_of("mike"), expected);
        assert!(log.completed("sam"));
        assert!(log.completed("mike"));
    }

    #[test]
    fn test_feed_can_end_early() {
        let publisher = BoundedPublisher::new(10, || feed::from_iter(vec!["a", "b"]));
        let log = SignalLog::new();
        let probe = ManualProbe::new("sub", log.clone());
        publisher.subscribe(probe.clone());
        probe.request(5);
        assert_eq!(log.items_of("sub"), vec!["a", "b"]);
        assert!(log.completed("sub"));
    }

    #[test]
    fn test_request_from_on_next_does_not_recurse() {
        use crate::protocol::{Subscriber, SubscriptionRef};

        // requests one more item per received item
        struct OneByOne {
            sub: Mutex<Option<SubscriptionRef>>,
            seen: Mutex<Vec<u64>>,
        }
        impl Subscriber<u64> for OneByOne {
            fn on_subscribe(&self, s: SubscriptionRef) {
                *self.sub.lock() = Some(s.clone());
                s.request(1);
            }
            fn on_next(&self, item: u64) {
                self.seen.lock().push(item);
                let s = self.sub.lock().clone();
                if let Some(s) = s {
                    s.request(1);
                }
            }
            fn on_error(&self, _e: StreamError) {}
            fn on_complete(&self) {}
        }

        let sub = Arc::new(OneByOne {
            sub: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        });
        BoundedPublisher::range(10).subscribe(sub.clone());
        assert_eq!(*sub.seen.lock(), (1..=10).collect::<Vec<_>>());
    }
}
