//! Per-consumer view of a sink.
//!
//! Each attached consumer owns a [`ConsumerView`]: its own demand counter,
//! replay backlog, live queue and pending terminal signal. The sink only
//! enqueues; delivery happens in [`ConsumerView::drain`], serialized by a
//! [`Wip`] counter so that pushes, requests and terminal signals racing on
//! different threads never call the subscriber concurrently.
//!
//! ```text
//! backlog (replay history) ─┐
//! queue   (live values)    ─┼─► on_next while demand > 0
//! done    (sink terminal)  ─┘─► on_complete / on_error once both are empty
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::Capacity;
use crate::error::StreamError;
use crate::protocol::{
    Demand, SubscriberRef, SubscriberSlot, Subscription, SubscriptionRef, Terminal, TerminalFlag,
    Wip,
};

struct Buffer<T> {
    backlog: VecDeque<T>,
    queue: VecDeque<T>,
    done: Option<Option<StreamError>>,
    violation: Option<StreamError>,
}

impl<T> Buffer<T> {
    fn pending(&self) -> usize {
        self.backlog.len() + self.queue.len()
    }

    fn pop(&mut self) -> Option<T> {
        self.backlog.pop_front().or_else(|| self.queue.pop_front())
    }
}

enum Step<T> {
    Next(T),
    Done(Option<StreamError>),
    Violation(StreamError),
    Idle,
}

pub(crate) struct ConsumerView<T> {
    id: u64,
    subscriber: SubscriberSlot<T>,
    demand: Demand,
    wip: Wip,
    terminal: TerminalFlag,
    ready: AtomicBool,
    capacity: Capacity,
    buffer: Mutex<Buffer<T>>,
}

impl<T: Send + 'static> ConsumerView<T> {
    pub(crate) fn new(id: u64, capacity: Capacity) -> Self {
        Self::with_backlog(id, capacity, VecDeque::new())
    }

    /// Creates a view that delivers `backlog` before any live value.
    ///
    /// The backlog does not count against `capacity`.
    pub(crate) fn with_backlog(id: u64, capacity: Capacity, backlog: VecDeque<T>) -> Self {
        Self {
            id,
            subscriber: SubscriberSlot::empty(),
            demand: Demand::new(),
            wip: Wip::new(),
            terminal: TerminalFlag::new(),
            ready: AtomicBool::new(false),
            capacity,
            buffer: Mutex::new(Buffer {
                backlog,
                queue: VecDeque::new(),
                done: None,
                violation: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Binds the consumer, hands it this view as its subscription and starts delivery.
    ///
    /// Nothing is delivered before `on_subscribe` returns.
    pub(crate) fn attach(self: &Arc<Self>, subscriber: SubscriberRef<T>) {
        self.subscriber.bind(Arc::clone(&subscriber));
        let subscription: SubscriptionRef = Arc::clone(self) as SubscriptionRef;
        subscriber.on_subscribe(subscription);
        self.ready.store(true, Ordering::Release);
        self.drain();
    }

    /// `true` after cancel or after the terminal signal was delivered.
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminal.is_set()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.terminal.get() == Some(Terminal::Cancelled)
    }

    /// `true` if the live queue can take one more value.
    pub(crate) fn has_room(&self) -> bool {
        !self.is_terminated() && self.capacity.has_room(self.buffer.lock().queue.len())
    }

    /// `true` if the consumer has demand for one more value than is already pending.
    pub(crate) fn can_accept_now(&self) -> bool {
        if self.is_terminated() || !self.ready.load(Ordering::Acquire) {
            return false;
        }
        let pending = self.buffer.lock().pending() as u64;
        self.demand.get() > pending
    }

    /// Enqueues a live value. Delivery happens on the next [`drain`](Self::drain).
    pub(crate) fn push(&self, item: T) {
        if self.is_terminated() {
            return;
        }
        self.buffer.lock().queue.push_back(item);
    }

    /// Schedules the terminal signal after everything already enqueued.
    pub(crate) fn finish(&self, error: Option<StreamError>) {
        self.buffer.lock().done.get_or_insert(error);
    }

    pub(crate) fn drain(&self) {
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
        if !self.ready.load(Ordering::Acquire) {
            return;
        }
        let Some(subscriber) = self.subscriber.get() else {
            return;
        };

        loop {
            if self.terminal.is_set() {
                return;
            }
            match self.next_step() {
                Step::Next(item) => subscriber.on_next(item),
                Step::Done(error) => {
                    let kind = if error.is_some() {
                        Terminal::Errored
                    } else {
                        Terminal::Completed
                    };
                    if self.terminal.set(kind) {
                        match error {
                            Some(e) => subscriber.on_error(e),
                            None => subscriber.on_complete(),
                        }
                        self.subscriber.release();
                    }
                    return;
                }
                Step::Violation(error) => {
                    if self.terminal.set(Terminal::Errored) {
                        subscriber.on_error(error);
                        self.subscriber.release();
                    }
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    fn next_step(&self) -> Step<T> {
        let mut buffer = self.buffer.lock();
        if let Some(error) = buffer.violation.take() {
            return Step::Violation(error);
        }
        if buffer.pending() > 0 {
            if !self.demand.try_take() {
                return Step::Idle;
            }
            return match buffer.pop() {
                Some(item) => Step::Next(item),
                None => Step::Idle,
            };
        }
        match buffer.done.take() {
            Some(error) => Step::Done(error),
            None => Step::Idle,
        }
    }
}

impl<T: Send + 'static> Subscription for ConsumerView<T> {
    fn request(&self, n: u64) {
        if self.terminal.is_set() {
            return;
        }
        trace!(consumer = self.id, n, "sink consumer requested items");
        if n == 0 {
            self.buffer
                .lock()
                .violation
                .get_or_insert(StreamError::InvalidDemand);
        } else {
            self.demand.add(n);
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.terminal.set(Terminal::Cancelled) {
            debug!(consumer = self.id, "sink consumer cancelled");
            let mut buffer = self.buffer.lock();
            buffer.backlog.clear();
            buffer.queue.clear();
            drop(buffer);
            self.subscriber.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ManualProbe, Signal, SignalLog};

    fn attached(capacity: Capacity) -> (Arc<ConsumerView<u32>>, Arc<ManualProbe<u32>>, Arc<SignalLog<u32>>) {
        let view = Arc::new(ConsumerView::new(1, capacity));
        let log = SignalLog::new();
        let probe = ManualProbe::new("c", log.clone());
        view.attach(probe.clone());
        (view, probe, log)
    }

    #[test]
    fn test_delivers_only_on_demand() {
        let (view, probe, log) = attached(Capacity::Unbounded);
        view.push(1);
        view.push(2);
        view.drain();
        assert!(log.items_of("c").is_empty());

        probe.request(1);
        assert_eq!(log.items_of("c"), vec![1]);
        assert!(!view.can_accept_now());
        probe.request(5);
        assert_eq!(log.items_of("c"), vec![1, 2]);
        assert!(view.can_accept_now());
    }

    #[test]
    fn test_terminal_after_queue() {
        let (view, probe, log) = attached(Capacity::Unbounded);
        view.push(7);
        view.finish(None);
        view.drain();
        assert_eq!(log.signals_of("c"), vec![Signal::Subscribed]);

        probe.request(1);
        assert_eq!(
            log.signals_of("c"),
            vec![Signal::Subscribed, Signal::Next(7), Signal::Complete]
        );
        assert!(view.is_terminated());
    }

    #[test]
    fn test_backlog_ignores_capacity() {
        let view = Arc::new(ConsumerView::with_backlog(
            2,
            Capacity::bounded(1),
            VecDeque::from(vec![1, 2, 3]),
        ));
        assert!(view.has_room());
        view.push(4);
        assert!(!view.has_room());

        let log = SignalLog::new();
        let probe = ManualProbe::with_initial_request("c", log.clone(), 10);
        view.attach(probe.clone());
        assert_eq!(log.items_of("c"), vec![1, 2, 3, 4]);
        assert!(view.has_room());
    }

    #[test]
    fn test_cancel_drops_pending() {
        let (view, probe, log) = attached(Capacity::Unbounded);
        view.push(1);
        probe.cancel();
        probe.cancel();
        assert!(view.is_cancelled());
        assert!(!view.has_room());
        view.finish(None);
        view.drain();
        assert_eq!(log.signals_of("c"), vec![Signal::Subscribed]);
    }

    #[test]
    fn test_zero_request_errors() {
        let (view, probe, log) = attached(Capacity::Unbounded);
        probe.request(0);
        assert_eq!(log.errors_of("c"), vec![StreamError::InvalidDemand]);
        assert!(view.is_terminated());
        assert!(!view.is_cancelled());
    }
}
