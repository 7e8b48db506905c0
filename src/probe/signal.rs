//! Ordered, append-only record of the signals probes observe.
//!
//! Several probes can share one [`SignalLog`]; every record carries the name
//! of the probe that received it and a sequence number local to the log.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;

/// One observed protocol signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal<T> {
    Subscribed,
    Next(T),
    Error(StreamError),
    Complete,
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Signal::Error(_) | Signal::Complete)
    }
}

/// A signal together with who received it and when.
#[derive(Clone, Debug)]
pub struct Record<T> {
    /// Position in the log, starting at 0.
    pub seq: u64,
    pub subscriber: Arc<str>,
    pub signal: Signal<T>,
}

/// Shared signal log.
///
/// # Example
/// ```
/// use flowvisor::{BoundedPublisher, LogProbe, Publisher, SignalLog};
///
/// let log = SignalLog::new();
/// BoundedPublisher::range(3).subscribe(LogProbe::new("a", log.clone()));
/// BoundedPublisher::range(2).subscribe(LogProbe::new("b", log.clone()));
///
/// assert_eq!(log.items_of("a"), vec![1, 2, 3]);
/// assert_eq!(log.items_of("b"), vec![1, 2]);
/// assert!(log.completed("a") && log.completed("b"));
/// ```
#[derive(Debug)]
pub struct SignalLog<T> {
    records: Mutex<Vec<Record<T>>>,
}

impl<T: Clone> SignalLog<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, subscriber: &Arc<str>, signal: Signal<T>) {
        let mut records = self.records.lock();
        let seq = records.len() as u64;
        records.push(Record {
            seq,
            subscriber: Arc::clone(subscriber),
            signal,
        });
    }

    /// Snapshot of every record, in arrival order.
    pub fn records(&self) -> Vec<Record<T>> {
        self.records.lock().clone()
    }

    pub fn signals_of(&self, subscriber: &str) -> Vec<Signal<T>> {
        self.records
            .lock()
            .iter()
            .filter(|r| &*r.subscriber == subscriber)
            .map(|r| r.signal.clone())
            .collect()
    }

    pub fn items_of(&self, subscriber: &str) -> Vec<T> {
        self.filter_map(subscriber, |s| match s {
            Signal::Next(item) => Some(item.clone()),
            _ => None,
        })
    }

    pub fn errors_of(&self, subscriber: &str) -> Vec<StreamError> {
        self.filter_map(subscriber, |s| match s {
            Signal::Error(e) => Some(e.clone()),
            _ => None,
        })
    }

    pub fn completed(&self, subscriber: &str) -> bool {
        self.terminals_of(subscriber)
            .iter()
            .any(|s| matches!(s, Signal::Complete))
    }

    /// Number of `on_complete`/`on_error` signals `subscriber` received.
    pub fn terminal_count(&self, subscriber: &str) -> usize {
        self.terminals_of(subscriber).len()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn terminals_of(&self, subscriber: &str) -> Vec<Signal<T>> {
        self.filter_map(subscriber, |s| s.is_terminal().then(|| s.clone()))
    }

    fn filter_map<R>(&self, subscriber: &str, f: impl Fn(&Signal<T>) -> Option<R>) -> Vec<R> {
        self.records
            .lock()
            .iter()
            .filter(|r| &*r.subscriber == subscriber)
            .filter_map(|r| f(&r.signal))
            .collect()
    }
}

/// Maps blank probe names to `"anonymous"`.
pub(crate) fn probe_name(name: &str) -> Arc<str> {
    let name = name.trim();
    if name.is_empty() {
        Arc::from("anonymous")
    } else {
        Arc::from(name)
    }
}
