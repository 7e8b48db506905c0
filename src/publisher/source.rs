//! # Timer-driven hot producers.
//!
//! A [`Source`] is an async producer that yields one value per call. [`spawn_pump`]
//! drives a source on a tokio interval and pushes every value into a [`Sink`],
//! turning any source into a hot stream that consumers attach to and detach from.
//!
//! ```text
//! interval.tick() ──► source.next().await
//!                         ├─ Some(Ok(v))  ─► sink.emit_next_async(v)
//!                         │                    ├─ Ok / FAIL_ZERO_SUBSCRIBER ─► next tick
//!                         │                    └─ terminated / cancelled   ─► PumpExit::SinkTerminated
//!                         ├─ Some(Err(e)) ─► sink.emit_error(e)            ─► PumpExit::Failed
//!                         └─ None         ─► sink.emit_complete()          ─► PumpExit::Exhausted
//! token.cancelled()   ──► PumpExit::Cancelled (sink left open)
//! ```
//!
//! Terminal signals are retried while other producers hold the sink; a sink
//! that was already terminated yields `PumpExit::SinkTerminated`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::publisher::feed::Feed;
use crate::sink::{EmitResult, RetryNonSerialized, Sink};

/// # Asynchronous producer.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use flowvisor::{Source, StreamError};
///
/// struct Countdown(u32);
///
/// #[async_trait]
/// impl Source<u32> for Countdown {
///     async fn next(&mut self) -> Option<Result<u32, StreamError>> {
///         if self.0 == 0 {
///             return None;
///         }
///         self.0 -= 1;
///         Some(Ok(self.0))
///     }
/// }
/// ```
#[async_trait]
pub trait Source<T>: Send + 'static {
    /// Produces the next value.
    ///
    /// `None` ends the stream successfully, `Some(Err(_))` ends it with an error.
    async fn next(&mut self) -> Option<Result<T, StreamError>>;
}

/// Adapts a synchronous [`Feed`] into a [`Source`].
pub struct FeedSource<F> {
    feed: F,
    index: u64,
}

impl<F> FeedSource<F> {
    pub fn new(feed: F) -> Self {
        Self { feed, index: 0 }
    }
}

#[async_trait]
impl<T, F> Source<T> for FeedSource<F>
where
    T: Send + 'static,
    F: Feed<T>,
{
    async fn next(&mut self) -> Option<Result<T, StreamError>> {
        let item = self.feed.next(self.index)?;
        self.index += 1;
        Some(Ok(item))
    }
}

/// Why a pump stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// The cancellation token fired; the sink was left open.
    Cancelled,
    /// The source ended; the sink was completed.
    Exhausted,
    /// The source failed; the error was forwarded to the sink.
    Failed,
    /// The sink no longer accepts values.
    SinkTerminated,
}

/// Spawns a task pushing one value from `source` into `sink` every `period`.
///
/// Values emitted while the sink has no consumers are dropped. Overflow and
/// concurrent emission are retried until the token fires.
pub fn spawn_pump<T, S>(
    mut source: S,
    sink: Arc<Sink<T>>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<PumpExit>
where
    T: Clone + Send + 'static,
    S: Source<T>,
{
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = ticker.tick() => {}
                _ = token.cancelled() => return PumpExit::Cancelled,
            }

            let next = select! {
                next = source.next() => next,
                _ = token.cancelled() => return PumpExit::Cancelled,
            };

            match next {
                Some(Ok(value)) => match sink.emit_next_async(value, &token).await {
                    Ok(()) => {}
                    Err(e) if e.result == EmitResult::FailZeroSubscriber => {
                        debug!("pump dropped a value: no subscribers");
                    }
                    Err(_) if token.is_cancelled() => return PumpExit::Cancelled,
                    Err(e) => {
                        debug!(result = e.as_label(), "pump stopped: sink rejected value");
                        return PumpExit::SinkTerminated;
                    }
                },
                Some(Err(err)) => {
                    debug!(error = err.as_label(), "pump source failed");
                    return match sink.emit_error(err, RetryNonSerialized) {
                        Ok(()) => PumpExit::Failed,
                        Err(e) => {
                            warn!(result = e.as_label(), "pump could not forward source error");
                            PumpExit::SinkTerminated
                        }
                    };
                }
                None => {
                    return match sink.emit_complete(RetryNonSerialized) {
                        Ok(()) => PumpExit::Exhausted,
                        Err(e) => {
                            warn!(result = e.as_label(), "pump could not complete sink");
                            PumpExit::SinkTerminated
                        }
                    };
                }
            }
        }
    })
}
