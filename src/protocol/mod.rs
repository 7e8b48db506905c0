//! # Publish/subscribe protocol.
//!
//! The demand-driven contract shared by every producer and consumer in the crate:
//!
//! - [`Publisher`] hands each consumer a [`Subscription`] through `on_subscribe`;
//! - [`Subscription`] carries demand upstream (`request`) and cancellation (`cancel`);
//! - [`Subscriber`] receives `on_next* (on_complete | on_error)?` downstream.
//!
//! ## Signal flow
//! ```text
//! Publisher::subscribe(sub)
//!     └─► sub.on_subscribe(subscription)
//!               │
//!               ▼
//!         subscription.request(n) ──► producer emits up to n items
//!                                        ├─► sub.on_next(item)   (0..n times)
//!                                        └─► sub.on_complete() | sub.on_error(e)  (at most once)
//!         subscription.cancel()   ──► no signal after the flag is observed
//! ```
//!
//! ## Rules
//! - `on_subscribe` precedes any other signal.
//! - Signals to one subscriber are serialized (never concurrent).
//! - After a terminal signal or `cancel`, nothing else is delivered.
//! - Demand is additive and saturates at [`UNBOUNDED`], which disables accounting.

mod demand;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;

pub(crate) use demand::{Demand, Terminal, TerminalFlag, Wip};

/// Demand value meaning "give me everything you have".
///
/// Once a subscription's outstanding demand reaches this value it is never
/// decremented again.
pub const UNBOUNDED: u64 = u64::MAX;

/// Link between one producer and one consumer.
///
/// Implementations must tolerate calls from any thread, including reentrant
/// calls made from inside `on_next`.
pub trait Subscription: Send + Sync {
    /// Adds `n` to the outstanding demand.
    ///
    /// `n == 0` is a protocol violation reported through `on_error`.
    /// Calls after a terminal signal or `cancel` are no-ops.
    fn request(&self, n: u64);

    /// Stops the flow of signals. Idempotent.
    fn cancel(&self);
}

/// Shared handle to a subscription.
pub type SubscriptionRef = Arc<dyn Subscription>;

/// Consumer-side callback contract.
///
/// Callbacks take `&self`; implementations keep their state behind interior
/// mutability and must not panic.
pub trait Subscriber<T>: Send + Sync + 'static {
    /// First signal of every subscription.
    ///
    /// The subscriber may call `request` or `cancel` from inside this callback.
    fn on_subscribe(&self, subscription: SubscriptionRef);

    /// Next item of the sequence.
    fn on_next(&self, item: T);

    /// Terminal failure.
    fn on_error(&self, error: StreamError);

    /// Terminal success.
    fn on_complete(&self);

    /// Returns the consumer name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to a subscriber.
pub type SubscriberRef<T> = Arc<dyn Subscriber<T>>;

/// Producer side of the protocol.
pub trait Publisher<T>: Send + Sync {
    /// Attaches a consumer.
    ///
    /// Implementations call `on_subscribe` synchronously; no items flow before
    /// the consumer requests them.
    fn subscribe(&self, subscriber: SubscriberRef<T>);
}

impl<T, P> Publisher<T> for Arc<P>
where
    P: Publisher<T> + ?Sized,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        (**self).subscribe(subscriber)
    }
}

/// Subscription that ignores every call.
///
/// Handed to consumers that are rejected at attach time, right before their
/// `on_error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

/// Delivers `on_subscribe(EmptySubscription)` followed by `on_error(error)`.
pub(crate) fn reject<T: 'static>(subscriber: &dyn Subscriber<T>, error: StreamError) {
    subscriber.on_subscribe(Arc::new(EmptySubscription));
    subscriber.on_error(error);
}

/// Releasable reference from a producer-side link to its consumer.
///
/// Subscribers usually keep their subscription alive; dropping the
/// subscriber reference once the link is terminal breaks that cycle.
pub(crate) struct SubscriberSlot<T> {
    inner: Mutex<Option<SubscriberRef<T>>>,
}

impl<T> SubscriberSlot<T> {
    pub(crate) fn empty() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub(crate) fn new(subscriber: SubscriberRef<T>) -> Self {
        Self {
            inner: Mutex::new(Some(subscriber)),
        }
    }

    pub(crate) fn bind(&self, subscriber: SubscriberRef<T>) {
        *self.inner.lock() = Some(subscriber);
    }

    /// Clones the subscriber out; the lock is not held by the caller afterwards.
    pub(crate) fn get(&self) -> Option<SubscriberRef<T>> {
        self.inner.lock().clone()
    }

    pub(crate) fn release(&self) {
        self.inner.lock().take();
    }
}
