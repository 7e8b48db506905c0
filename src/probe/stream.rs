//! Bridge from the push protocol to a pull-based [`futures::Stream`].
//!
//! ```text
//! publisher ──on_next──► Bridge ──mpsc──► SubscriberStream::poll_next ──► caller
//!     ▲                                        │
//!     └────────── request(batch) ──────────────┘  every `batch` items consumed
//! ```
//!
//! Dropping the stream cancels the subscription.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::protocol::{Publisher, Subscriber, SubscriptionRef};

type SharedSubscription = Arc<Mutex<Option<SubscriptionRef>>>;

/// Subscribes to `publisher` and exposes its signals as a stream.
///
/// At most `batch` items (min 1) are requested ahead of consumption; keep it
/// at or below the bound of a bounded publisher.
///
/// # Example
/// ```
/// use futures::StreamExt;
/// use flowvisor::{BoundedPublisher, into_stream};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let items: Vec<u64> = into_stream(&BoundedPublisher::range(5), 2)
///     .map(|r| r.unwrap())
///     .collect()
///     .await;
/// assert_eq!(items, vec![1, 2, 3, 4, 5]);
/// # }
/// ```
pub fn into_stream<T, P>(publisher: &P, batch: u64) -> SubscriberStream<T>
where
    T: Send + 'static,
    P: Publisher<T> + ?Sized,
{
    let batch = batch.max(1);
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription: SharedSubscription = Arc::new(Mutex::new(None));
    publisher.subscribe(Arc::new(Bridge {
        tx: Mutex::new(Some(tx)),
        subscription: Arc::clone(&subscription),
        batch,
    }));
    SubscriberStream {
        rx,
        subscription,
        batch,
        consumed: 0,
    }
}

/// Stream of the items (and terminal error) of one subscription.
pub struct SubscriberStream<T> {
    rx: mpsc::UnboundedReceiver<Result<T, StreamError>>,
    subscription: SharedSubscription,
    batch: u64,
    consumed: u64,
}

impl<T> SubscriberStream<T> {
    fn replenish(&mut self) {
        self.consumed += 1;
        if self.consumed < self.batch {
            return;
        }
        self.consumed = 0;
        let subscription = self.subscription.lock().clone();
        if let Some(s) = subscription {
            s.request(self.batch);
        }
    }
}

impl<T> Stream for SubscriberStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(item))) => {
                this.replenish();
                Poll::Ready(Some(Ok(item)))
            }
            other => other,
        }
    }
}

impl<T> Drop for SubscriberStream<T> {
    fn drop(&mut self) {
        let subscription = self.subscription.lock().take();
        if let Some(s) = subscription {
            s.cancel();
        }
    }
}

struct Bridge<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<Result<T, StreamError>>>>,
    subscription: SharedSubscription,
    batch: u64,
}

impl<T> Bridge<T> {
    fn finish(&self, last: Option<StreamError>) {
        self.subscription.lock().take();
        let tx = self.tx.lock().take();
        if let (Some(tx), Some(error)) = (tx, last) {
            let _ = tx.send(Err(error));
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for Bridge<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        *self.subscription.lock() = Some(Arc::clone(&subscription));
        subscription.request(self.batch);
    }

    fn on_next(&self, item: T) {
        if let Some(tx) = &*self.tx.lock() {
            let _ = tx.send(Ok(item));
        }
    }

    fn on_error(&self, error: StreamError) {
        self.finish(Some(error));
    }

    fn on_complete(&self) {
        self.finish(None);
    }

    fn name(&self) -> &str {
        "stream"
    }
}
