//! Upstream side of one connection.
//!
//! The relay is the single subscriber a shared publisher hands to its
//! upstream. It requests `prefetch` items, pushes everything it receives into
//! the connection's sink and replenishes demand as pushes succeed.
//!
//! ```text
//! upstream ──on_next──► pending ──offer──► Sink
//!                          ▲                 ├─ OK                    → consumed += 1, replenish
//!                          │                 ├─ FAIL_ZERO_SUBSCRIBER  → value dropped, replenish
//!                          └─ parked ◄───────├─ FAIL_OVERFLOW         → park until a consumer requests
//!                                            └─ terminated/cancelled  → cancel upstream
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::StreamError;
use crate::protocol::{Subscriber, SubscriptionRef, Terminal, TerminalFlag, Wip};
use crate::share::shared::Shared;
use crate::sink::{EmitResult, Sink};

struct Pending<T> {
    items: VecDeque<T>,
    terminal: Option<Option<StreamError>>,
    consumed: u64,
}

pub(crate) struct Relay<T> {
    generation: u64,
    sink: Arc<Sink<T>>,
    shared: Weak<Shared<T>>,
    prefetch: u64,
    /// Demand is replenished once this many items were consumed.
    limit: u64,
    upstream: Mutex<Option<SubscriptionRef>>,
    pending: Mutex<Pending<T>>,
    wip: Wip,
    terminal: TerminalFlag,
    dropped: AtomicU64,
}

enum Step<T> {
    Offer(T),
    Finish(Option<StreamError>),
    Idle,
}

impl<T: Clone + Send + 'static> Relay<T> {
    pub(crate) fn new(
        generation: u64,
        sink: Arc<Sink<T>>,
        shared: Weak<Shared<T>>,
        prefetch: u64,
    ) -> Self {
        let prefetch = prefetch.max(1);
        Self {
            generation,
            sink,
            shared,
            prefetch,
            limit: (prefetch - prefetch / 4).max(1),
            upstream: Mutex::new(None),
            pending: Mutex::new(Pending {
                items: VecDeque::new(),
                terminal: None,
                consumed: 0,
            }),
            wip: Wip::new(),
            terminal: TerminalFlag::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Values dropped because no consumer was attached.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Retries parked values; called whenever a downstream consumer requests more.
    pub(crate) fn resume(&self) {
        self.drain();
    }

    /// Cancels the upstream subscription and discards parked values.
    pub(crate) fn disconnect(&self) {
        if self.terminal.set(Terminal::Cancelled) {
            debug!(generation = self.generation, "relay disconnected from upstream");
            let upstream = self.upstream.lock().take();
            self.pending.lock().items.clear();
            if let Some(s) = upstream {
                s.cancel();
            }
        }
    }

    fn request_upstream(&self, n: u64) {
        let upstream = self.upstream.lock().clone();
        if let Some(s) = upstream {
            s.request(n);
        }
    }

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
        loop {
            if self.terminal.is_set() {
                return;
            }
            match self.next_step() {
                Step::Offer(item) => match self.sink.offer(item) {
                    Ok(()) => self.consumed(),
                    Err((EmitResult::FailZeroSubscriber, _)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(generation = self.generation, "relay dropped a value: no consumers");
                        self.consumed();
                    }
                    Err((EmitResult::FailOverflow | EmitResult::FailNonSerialized, item)) => {
                        trace!(generation = self.generation, "relay parked: consumers are saturated");
                        self.pending.lock().items.push_front(item);
                        return;
                    }
                    Err((result, _)) => {
                        debug!(
                            generation = self.generation,
                            result = result.as_label(),
                            "relay stopped: sink no longer accepts values"
                        );
                        self.disconnect();
                        return;
                    }
                },
                Step::Finish(error) => {
                    let kind = if error.is_some() {
                        Terminal::Errored
                    } else {
                        Terminal::Completed
                    };
                    if self.terminal.set(kind) {
                        self.upstream.lock().take();
                        if let Some(shared) = self.shared.upgrade() {
                            shared.upstream_terminated(self.generation);
                        }
                        match error {
                            Some(e) => self.sink.try_emit_error(e),
                            None => self.sink.try_emit_complete(),
                        };
                    }
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    fn next_step(&self) -> Step<T> {
        let mut pending = self.pending.lock();
        if let Some(item) = pending.items.pop_front() {
            return Step::Offer(item);
        }
        match pending.terminal.take() {
            Some(error) => Step::Finish(error),
            None => Step::Idle,
        }
    }

    fn consumed(&self) {
        let replenish = {
            let mut pending = self.pending.lock();
            pending.consumed += 1;
            if pending.consumed >= self.limit {
                pending.consumed = 0;
                true
            } else {
                false
            }
        };
        if replenish {
            self.request_upstream(self.limit);
        }
    }
}

impl<T: Clone + Send + 'static> Subscriber<T> for Relay<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if self.terminal.is_set() {
            subscription.cancel();
            return;
        }
        debug!(
            generation = self.generation,
            prefetch = self.prefetch,
            "relay connected to upstream"
        );
        *self.upstream.lock() = Some(Arc::clone(&subscription));
        subscription.request(self.prefetch);
    }

    fn on_next(&self, item: T) {
        if self.terminal.is_set() {
            return;
        }
        self.pending.lock().items.push_back(item);
        self.drain();
    }

    fn on_error(&self, error: StreamError) {
        debug!(generation = self.generation, error = error.as_label(), "upstream failed");
        self.pending.lock().terminal.get_or_insert(Some(error));
        self.drain();
    }

    fn on_complete(&self) {
        debug!(generation = self.generation, "upstream completed");
        self.pending.lock().terminal.get_or_insert(None);
        self.drain();
    }

    fn name(&self) -> &str {
        "relay"
    }
}
