//! # Broadcast sink engine.
//!
//! A [`Sink`] is a shared push point: producers push values with non-blocking
//! `try_emit_*` calls and get an [`EmitResult`] back; consumers attach through
//! [`Publisher::subscribe`] and pull at their own pace. How the two sides are
//! reconciled is decided by the [`SinkPolicy`] chosen at construction.
//!
//! ## Architecture
//! ```text
//! producer A ──┐                         ┌──► ConsumerView #1 ──► subscriber 1
//! producer B ──┼─► try_emit_next(v) ─────┼──► ConsumerView #2 ──► subscriber 2
//! producer C ──┘    │                    └──► ConsumerView #N ──► subscriber N
//!                   │                         (demand, queue, backlog, wip)
//!                   ├─ emitting guard busy  → FAIL_NON_SERIALIZED
//!                   ├─ terminal received    → FAIL_TERMINATED
//!                   ├─ policy check         → FAIL_OVERFLOW / FAIL_ZERO_SUBSCRIBER / FAIL_CANCELLED
//!                   └─ enqueue, then drain each view outside every lock
//! ```
//!
//! ## Phases
//! ```text
//! Idle ──(first push or attach)──► Active ──(try_emit_complete / try_emit_error)──► Terminated
//! ```
//!
//! ## Rules
//! - Pushes are not serialized by the sink: a push racing another push fails
//!   with `FAIL_NON_SERIALIZED` instead of waiting. Every push either succeeds
//!   exactly once or returns a failure code.
//! - The retrying [`emit_next`](Sink::emit_next) family turns those codes into
//!   retries according to an [`EmitFailureHandler`].
//! - Per consumer, values arrive in push order, after `on_subscribe`, followed by
//!   at most one terminal signal.
//! - A rejected unicast attachment only affects the rejected consumer.
//! - A multicast sink that never had a consumer buffers pushes up to its
//!   bound and hands them to the first consumer; once somebody attached,
//!   pushes with nobody listening fail with `FAIL_ZERO_SUBSCRIBER`.

mod consumer;
mod emit;
mod policy;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Capacity;
use crate::error::{EmitError, StreamError};
use crate::protocol::{Publisher, SubscriberRef, reject};

use consumer::ConsumerView;

pub use emit::{
    EmitFailureHandler, EmitResult, FailFast, RetryNonSerialized, RetryUntil, SignalType,
};
pub use policy::SinkPolicy;

/// Lifecycle of a sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkPhase {
    /// Nothing pushed, nobody attached.
    Idle,
    /// Accepting values.
    Active,
    /// A terminal signal was accepted; nothing else will be.
    Terminated,
}

struct SinkState<T> {
    phase: SinkPhase,
    consumers: Vec<Arc<ConsumerView<T>>>,
    history: VecDeque<T>,
    /// Multicast pushes made before the first consumer attached.
    warm_up: VecDeque<T>,
    attached: bool,
    /// Pre-created view of a unicast sink, buffering until its consumer attaches.
    unicast: Option<Arc<ConsumerView<T>>>,
    unicast_claimed: bool,
    terminal: Option<Option<StreamError>>,
}

/// Releases the emitting flag on drop.
struct EmitGuard<'a>(&'a AtomicBool);

impl<'a> EmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| EmitGuard(flag))
    }
}

impl Drop for EmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared push point fanning values out to attached consumers.
///
/// # Example
/// ```
/// use flowvisor::{CollectProbe, EmitResult, Publisher, Sink, SinkPolicy};
///
/// let sink = Sink::new(SinkPolicy::replay_limit(2));
/// for v in 1..=5 {
///     assert_eq!(sink.try_emit_next(v), EmitResult::Ok);
/// }
///
/// let late = CollectProbe::new();
/// sink.subscribe(late.clone());
/// sink.try_emit_next(6);
/// assert_eq!(late.items(), vec![4, 5, 6]);
/// ```
pub struct Sink<T> {
    policy: SinkPolicy,
    warm_up: bool,
    emitting: AtomicBool,
    next_id: AtomicU64,
    state: Mutex<SinkState<T>>,
}

impl<T: Clone + Send + 'static> Sink<T> {
    pub fn new(policy: SinkPolicy) -> Self {
        let warm_up = matches!(policy, SinkPolicy::Multicast { .. });
        Self::build(policy, warm_up)
    }

    /// Sink that drops multicast pushes while nobody is attached, even before
    /// the first consumer.
    pub(crate) fn without_warm_up(policy: SinkPolicy) -> Self {
        Self::build(policy, false)
    }

    fn build(policy: SinkPolicy, warm_up: bool) -> Self {
        let unicast = match policy {
            SinkPolicy::Unicast { buffer } => Some(Arc::new(ConsumerView::new(0, buffer))),
            _ => None,
        };
        Self {
            policy,
            warm_up,
            emitting: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            state: Mutex::new(SinkState {
                phase: SinkPhase::Idle,
                consumers: Vec::new(),
                history: VecDeque::new(),
                warm_up: VecDeque::new(),
                attached: false,
                unicast,
                unicast_claimed: false,
                terminal: None,
            }),
        }
    }

    pub fn policy(&self) -> SinkPolicy {
        self.policy
    }

    pub fn phase(&self) -> SinkPhase {
        self.state.lock().phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase() == SinkPhase::Terminated
    }

    /// Number of attached consumers that have not cancelled or terminated.
    pub fn subscriber_count(&self) -> usize {
        let state = self.state.lock();
        match &state.unicast {
            Some(view) => usize::from(state.unicast_claimed && !view.is_terminated()),
            None => state
                .consumers
                .iter()
                .filter(|c| !c.is_terminated())
                .count(),
        }
    }

    /// Pushes one value without blocking.
    pub fn try_emit_next(&self, value: T) -> EmitResult {
        match self.offer(value) {
            Ok(()) => EmitResult::Ok,
            Err((result, _)) => result,
        }
    }

    /// Terminates the sink successfully.
    ///
    /// Consumers receive `on_complete` after the values already queued for them.
    pub fn try_emit_complete(&self) -> EmitResult {
        self.terminate(None)
    }

    /// Terminates the sink with `error`.
    pub fn try_emit_error(&self, error: StreamError) -> EmitResult {
        self.terminate(Some(error))
    }

    /// Pushes `value`, retrying while `handler` asks for it.
    ///
    /// The value is handed back by every failed attempt, so retries never clone.
    pub fn emit_next<H>(&self, value: T, mut handler: H) -> Result<(), EmitError>
    where
        H: EmitFailureHandler,
    {
        let mut value = value;
        loop {
            match self.offer(value) {
                Ok(()) => return Ok(()),
                Err((result, back)) => {
                    if !handler.on_emit_failure(SignalType::Next, result) {
                        return result.into_result(SignalType::Next);
                    }
                    value = back;
                    std::hint::spin_loop();
                }
            }
        }
    }

    pub fn emit_complete<H>(&self, handler: H) -> Result<(), EmitError>
    where
        H: EmitFailureHandler,
    {
        self.emit_terminal(None, handler)
    }

    pub fn emit_error<H>(&self, error: StreamError, handler: H) -> Result<(), EmitError>
    where
        H: EmitFailureHandler,
    {
        self.emit_terminal(Some(error), handler)
    }

    /// Pushes `value`, yielding to the runtime between retries.
    ///
    /// `FAIL_NON_SERIALIZED` is retried after a yield, `FAIL_OVERFLOW` after a
    /// short sleep; every other failure is returned at once. Cancelling `token`
    /// stops the retries with the last observed result.
    pub async fn emit_next_async(
        &self,
        value: T,
        token: &CancellationToken,
    ) -> Result<(), EmitError> {
        let mut value = value;
        loop {
            let (result, back) = match self.offer(value) {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };
            if token.is_cancelled() {
                return result.into_result(SignalType::Next);
            }
            match result {
                EmitResult::FailNonSerialized => {
                    select! {
                        biased;
                        _ = token.cancelled() => return result.into_result(SignalType::Next),
                        _ = tokio::task::yield_now() => {}
                    }
                }
                EmitResult::FailOverflow => {
                    select! {
                        biased;
                        _ = token.cancelled() => return result.into_result(SignalType::Next),
                        _ = tokio::time::sleep(OVERFLOW_RETRY_DELAY) => {}
                    }
                }
                other => return other.into_result(SignalType::Next),
            }
            value = back;
        }
    }

    fn emit_terminal<H>(&self, error: Option<StreamError>, mut handler: H) -> Result<(), EmitError>
    where
        H: EmitFailureHandler,
    {
        let signal = match error {
            Some(_) => SignalType::Error,
            None => SignalType::Complete,
        };
        loop {
            let result = self.terminate(error.clone());
            if result.is_success() || !handler.on_emit_failure(signal, result) {
                return result.into_result(signal);
            }
            std::hint::spin_loop();
        }
    }

    /// Single push attempt; on failure the value is handed back.
    pub(crate) fn offer(&self, value: T) -> Result<(), (EmitResult, T)> {
        let Some(guard) = EmitGuard::acquire(&self.emitting) else {
            return Err((EmitResult::FailNonSerialized, value));
        };

        let targets = {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return Err((EmitResult::FailTerminated, value));
            }
            state.consumers.retain(|c| !c.is_terminated());
            let targets = self.route(&mut state, value)?;
            state.phase = SinkPhase::Active;
            targets
        };
        drop(guard);

        for view in &targets {
            view.drain();
        }
        Ok(())
    }

    /// Applies the policy; returns the views that received the value.
    fn route(
        &self,
        state: &mut SinkState<T>,
        value: T,
    ) -> Result<Vec<Arc<ConsumerView<T>>>, (EmitResult, T)> {
        match self.policy {
            SinkPolicy::Unicast { .. } => {
                let Some(view) = state.unicast.clone() else {
                    return Err((EmitResult::FailTerminated, value));
                };
                if view.is_cancelled() {
                    return Err((EmitResult::FailCancelled, value));
                }
                if view.is_terminated() {
                    return Err((EmitResult::FailTerminated, value));
                }
                if !view.has_room() {
                    debug!(policy = self.policy.label(), "unicast queue full");
                    return Err((EmitResult::FailOverflow, value));
                }
                view.push(value);
                Ok(vec![view])
            }
            SinkPolicy::Multicast { buffer } => {
                if state.consumers.is_empty() {
                    if !self.warm_up || state.attached {
                        return Err((EmitResult::FailZeroSubscriber, value));
                    }
                    if !buffer.has_room(state.warm_up.len()) {
                        debug!("multicast warm-up buffer full");
                        return Err((EmitResult::FailOverflow, value));
                    }
                    state.warm_up.push_back(value);
                    return Ok(Vec::new());
                }
                if let Some(slow) = state.consumers.iter().find(|c| !c.has_room()) {
                    debug!(consumer = slow.id(), "multicast push rejected: slow consumer");
                    return Err((EmitResult::FailOverflow, value));
                }
                let targets = state.consumers.clone();
                fan_out(&targets, value);
                Ok(targets)
            }
            SinkPolicy::DirectBestEffort => {
                if state.consumers.is_empty() {
                    return Err((EmitResult::FailZeroSubscriber, value));
                }
                let targets: Vec<_> = state
                    .consumers
                    .iter()
                    .filter(|c| c.can_accept_now())
                    .cloned()
                    .collect();
                if targets.is_empty() {
                    debug!("best-effort push rejected: every consumer is saturated");
                    return Err((EmitResult::FailOverflow, value));
                }
                fan_out(&targets, value);
                Ok(targets)
            }
            SinkPolicy::DirectAllOrNothing => {
                if state.consumers.is_empty() {
                    return Err((EmitResult::FailZeroSubscriber, value));
                }
                if let Some(slow) = state.consumers.iter().find(|c| !c.can_accept_now()) {
                    debug!(consumer = slow.id(), "all-or-nothing push rejected");
                    return Err((EmitResult::FailOverflow, value));
                }
                let targets = state.consumers.clone();
                fan_out(&targets, value);
                Ok(targets)
            }
            SinkPolicy::Replay { history, .. } => {
                if let Some(slow) = state.consumers.iter().find(|c| !c.has_room()) {
                    debug!(consumer = slow.id(), "replay push rejected: slow consumer");
                    return Err((EmitResult::FailOverflow, value));
                }
                record(&mut state.history, history, value.clone());
                let targets = state.consumers.clone();
                fan_out(&targets, value);
                Ok(targets)
            }
        }
    }

    fn terminate(&self, error: Option<StreamError>) -> EmitResult {
        let Some(guard) = EmitGuard::acquire(&self.emitting) else {
            return EmitResult::FailNonSerialized;
        };

        let targets = {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return EmitResult::FailTerminated;
            }
            debug!(
                policy = self.policy.label(),
                error = error.as_ref().map(StreamError::as_label),
                "sink terminated"
            );
            state.terminal = Some(error.clone());
            state.phase = SinkPhase::Terminated;

            let mut targets = std::mem::take(&mut state.consumers);
            if let Some(view) = &state.unicast {
                targets.push(Arc::clone(view));
            }
            for view in &targets {
                view.finish(error.clone());
            }
            targets
        };
        drop(guard);

        for view in &targets {
            view.drain();
        }
        EmitResult::Ok
    }
}

const OVERFLOW_RETRY_DELAY: Duration = Duration::from_millis(1);

fn fan_out<T: Clone + Send + 'static>(targets: &[Arc<ConsumerView<T>>], value: T) {
    if let Some((last, rest)) = targets.split_last() {
        for view in rest {
            view.push(value.clone());
        }
        last.push(value);
    }
}

fn record<T>(history: &mut VecDeque<T>, bound: Capacity, value: T) {
    if let Some(limit) = bound.limit() {
        while history.len() >= limit {
            history.pop_front();
        }
    }
    history.push_back(value);
}

impl<T: Clone + Send + 'static> Publisher<T> for Sink<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let view = {
            let mut state = self.state.lock();
            let view = match state.unicast.clone() {
                Some(view) => {
                    if state.unicast_claimed {
                        drop(state);
                        warn!(
                            subscriber = subscriber.name(),
                            "unicast sink rejected a second subscriber"
                        );
                        reject(&*subscriber, StreamError::UnicastExhausted);
                        return;
                    }
                    state.unicast_claimed = true;
                    view
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    state.consumers.retain(|c| !c.is_terminated());
                    let backlog = match self.policy {
                        SinkPolicy::Replay { .. } => state.history.iter().cloned().collect(),
                        SinkPolicy::Multicast { .. } => std::mem::take(&mut state.warm_up),
                        _ => VecDeque::new(),
                    };
                    state.attached = true;
                    let view = Arc::new(ConsumerView::with_backlog(
                        id,
                        self.policy.buffer(),
                        backlog,
                    ));
                    match &state.terminal {
                        Some(terminal) => view.finish(terminal.clone()),
                        None => state.consumers.push(Arc::clone(&view)),
                    }
                    view
                }
            };
            if state.phase == SinkPhase::Idle {
                state.phase = SinkPhase::Active;
            }
            debug!(
                policy = self.policy.label(),
                consumer = view.id(),
                subscriber = subscriber.name(),
                "consumer attached"
            );
            view
        };
        view.attach(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{CollectProbe, ManualProbe, Signal, SignalLog};

    #[test]
    fn test_unicast_buffers_until_attach() {
        let sink = Sink::new(SinkPolicy::unicast());
        assert_eq!(sink.phase(), SinkPhase::Idle);
        for v in 1..=3 {
            assert_eq!(sink.try_emit_next(v), EmitResult::Ok);
        }
        assert_eq!(sink.phase(), SinkPhase::Active);

        let probe = CollectProbe::new();
        sink.subscribe(probe.clone());
        sink.try_emit_next(4);
        assert_eq!(probe.items(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unicast_exclusivity() {
        let sink = Sink::new(SinkPolicy::unicast());
        let log = SignalLog::new();
        let first = ManualProbe::with_initial_request("first", log.clone(), 10);
        let second = ManualProbe::with_initial_request("second", log.clone(), 10);
        sink.subscribe(first.clone());
        sink.subscribe(second.clone());

        sink.try_emit_next(1);
        sink.try_emit_next(2);

        assert!(log.items_of("second").is_empty());
        assert_eq!(log.errors_of("second"), vec![StreamError::UnicastExhausted]);
        assert_eq!(log.items_of("first"), vec![1, 2]);
        assert_eq!(log.terminal_count("first"), 0);
        assert_eq!(sink.subscriber_count(), 1);
    }

    #[test]
    fn test_unicast_after_cancel() {
        let sink = Sink::new(SinkPolicy::unicast());
        let log = SignalLog::new();
        let probe = ManualProbe::with_initial_request("only", log.clone(), 10);
        sink.subscribe(probe.clone());
        probe.cancel();
        assert_eq!(sink.try_emit_next(1), EmitResult::FailCancelled);
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[test]
    fn test_unicast_bounded_overflow() {
        let sink = Sink::new(SinkPolicy::unicast_bounded(2));
        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(2), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(3), EmitResult::FailOverflow);
    }

    #[test]
    fn test_multicast_warm_up_goes_to_first_consumer() {
        let sink = Sink::new(SinkPolicy::multicast(2));
        assert_eq!(sink.try_emit_next("hi"), EmitResult::Ok);
        assert_eq!(sink.try_emit_next("hola"), EmitResult::Ok);
        assert_eq!(sink.try_emit_next("salut"), EmitResult::FailOverflow);

        let first = CollectProbe::new();
        sink.subscribe(first.clone());
        assert_eq!(sink.try_emit_next("new"), EmitResult::Ok);
        let second = CollectProbe::new();
        sink.subscribe(second.clone());
        assert_eq!(sink.try_emit_next("later"), EmitResult::Ok);

        assert_eq!(first.items(), vec!["hi", "hola", "new", "later"]);
        assert_eq!(second.items(), vec!["later"]);
    }

    #[test]
    fn test_multicast_zero_subscriber_after_everyone_left() {
        let sink = Sink::new(SinkPolicy::multicast(4));
        let probe = CollectProbe::new();
        sink.subscribe(probe.clone());
        probe.cancel();
        assert_eq!(sink.try_emit_next(1), EmitResult::FailZeroSubscriber);
    }

    #[test]
    fn test_attach_cancel_churn_does_not_accumulate() {
        let sink: Sink<u32> = Sink::new(SinkPolicy::multicast(4));
        for _ in 0..1000 {
            let probe = CollectProbe::new();
            sink.subscribe(probe.clone());
            probe.cancel();
        }
        assert_eq!(sink.subscriber_count(), 0);
        assert!(sink.state.lock().consumers.len() <= 1);
    }

    #[test]
    fn test_relay_sink_drops_before_first_consumer() {
        let sink = Sink::without_warm_up(SinkPolicy::multicast(4));
        assert_eq!(sink.try_emit_next(1), EmitResult::FailZeroSubscriber);
    }

    #[test]
    fn test_multicast_slow_consumer_throttles_all() {
        let sink = Sink::new(SinkPolicy::multicast(2));
        let log = SignalLog::new();
        let fast = ManualProbe::with_initial_request("fast", log.clone(), u64::MAX);
        let slow = ManualProbe::new("slow", log.clone());
        sink.subscribe(fast.clone());
        sink.subscribe(slow.clone());

        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(2), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(3), EmitResult::FailOverflow);
        assert_eq!(sink.try_emit_next(4), EmitResult::FailOverflow);
        assert_eq!(log.items_of("fast"), vec![1, 2]);
        assert!(log.items_of("slow").is_empty());

        slow.request(1);
        assert_eq!(sink.try_emit_next(5), EmitResult::Ok);
        assert_eq!(log.items_of("fast"), vec![1, 2, 5]);
        assert_eq!(log.items_of("slow"), vec![1]);
    }

    #[test]
    fn test_best_effort_fast_consumer_gets_everything() {
        let sink = Sink::new(SinkPolicy::direct_best_effort());
        let log = SignalLog::new();
        let fast = ManualProbe::with_initial_request("fast", log.clone(), u64::MAX);
        let slow = ManualProbe::with_initial_request("slow", log.clone(), 2);
        sink.subscribe(fast.clone());
        sink.subscribe(slow.clone());

        for v in 1..=10 {
            assert_eq!(sink.try_emit_next(v), EmitResult::Ok);
            if v == 6 {
                slow.request(1);
            }
        }
        assert_eq!(log.items_of("fast"), (1..=10).collect::<Vec<_>>());
        assert_eq!(log.items_of("slow"), vec![1, 2, 7]);
    }

    #[test]
    fn test_best_effort_all_saturated() {
        let sink = Sink::new(SinkPolicy::direct_best_effort());
        let log = SignalLog::new();
        let slow = ManualProbe::new("slow", log.clone());
        sink.subscribe(slow.clone());
        assert_eq!(sink.try_emit_next(1), EmitResult::FailOverflow);
    }

    #[test]
    fn test_all_or_nothing() {
        let sink = Sink::new(SinkPolicy::direct_all_or_nothing());
        let log = SignalLog::new();
        let fast = ManualProbe::with_initial_request("fast", log.clone(), u64::MAX);
        let slow = ManualProbe::with_initial_request("slow", log.clone(), 1);
        sink.subscribe(fast.clone());
        sink.subscribe(slow.clone());

        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(2), EmitResult::FailOverflow);
        assert_eq!(log.items_of("fast"), vec![1]);
        assert_eq!(log.items_of("slow"), vec![1]);

        slow.cancel();
        assert_eq!(sink.try_emit_next(3), EmitResult::Ok);
        assert_eq!(log.items_of("fast"), vec![1, 3]);
    }

    #[test]
    fn test_replay_limit_late_joiner() {
        let sink = Sink::new(SinkPolicy::replay_limit(2));
        let log = SignalLog::new();
        for v in 1..=5 {
            assert_eq!(sink.try_emit_next(v), EmitResult::Ok);
        }
        let late = ManualProbe::with_initial_request("late", log.clone(), u64::MAX);
        sink.subscribe(late.clone());
        sink.try_emit_next(6);
        assert_eq!(log.items_of("late"), vec![4, 5, 6]);
    }

    #[test]
    fn test_replay_all() {
        let sink = Sink::new(SinkPolicy::replay_all());
        let early = CollectProbe::new();
        sink.subscribe(early.clone());
        for v in 1..=3 {
            sink.try_emit_next(v);
        }
        let late = CollectProbe::new();
        sink.subscribe(late.clone());
        assert_eq!(early.items(), vec![1, 2, 3]);
        assert_eq!(late.items(), vec![1, 2, 3]);
    }

    #[test]
    fn test_terminal_signals() {
        let sink = Sink::new(SinkPolicy::replay_all());
        let log = SignalLog::new();
        let slow = ManualProbe::new("slow", log.clone());
        sink.subscribe(slow.clone());
        sink.try_emit_next(1);

        assert_eq!(sink.try_emit_complete(), EmitResult::Ok);
        assert_eq!(sink.try_emit_complete(), EmitResult::FailTerminated);
        assert_eq!(sink.try_emit_next(2), EmitResult::FailTerminated);
        assert_eq!(
            sink.try_emit_error(StreamError::upstream("late")),
            EmitResult::FailTerminated
        );
        assert_eq!(sink.phase(), SinkPhase::Terminated);

        // queued value first, then completion
        assert_eq!(log.terminal_count("slow"), 0);
        slow.request(1);
        assert_eq!(
            log.signals_of("slow"),
            vec![Signal::Subscribed, Signal::Next(1), Signal::Complete]
        );

        // attaching after termination: history, then the terminal signal
        let late = CollectProbe::new();
        sink.subscribe(late.clone());
        assert_eq!(late.items(), vec![1]);
        assert!(late.is_completed());
    }

    #[test]
    fn test_error_reaches_every_consumer() {
        let sink: Sink<u32> = Sink::new(SinkPolicy::multicast(8));
        let a = CollectProbe::new();
        let b = CollectProbe::new();
        sink.subscribe(a.clone());
        sink.subscribe(b.clone());
        sink.try_emit_error(StreamError::upstream("boom"));
        assert_eq!(a.error(), Some(StreamError::upstream("boom")));
        assert_eq!(b.error(), Some(StreamError::upstream("boom")));
    }

    #[test]
    fn test_non_serialized_push_is_reported() {
        let sink = Sink::new(SinkPolicy::multicast(8));
        let probe = CollectProbe::new();
        sink.subscribe(probe.clone());

        sink.emitting.store(true, Ordering::Release);
        assert_eq!(sink.try_emit_next(1), EmitResult::FailNonSerialized);
        assert_eq!(sink.try_emit_complete(), EmitResult::FailNonSerialized);
        assert_eq!(
            sink.emit_next(1, FailFast),
            Err(EmitError {
                signal: SignalType::Next,
                result: EmitResult::FailNonSerialized
            })
        );

        let mut attempts = 0;
        let result = sink.emit_next(2, |_s: SignalType, r: EmitResult| {
            attempts += 1;
            if attempts == 3 {
                sink.emitting.store(false, Ordering::Release);
            }
            r == EmitResult::FailNonSerialized
        });
        assert_eq!(result, Ok(()));
        assert_eq!(attempts, 3);
        assert_eq!(probe.items(), vec![2]);
    }

    #[test]
    fn test_emit_complete_with_handler() {
        let sink: Sink<u32> = Sink::new(SinkPolicy::multicast(8));
        assert_eq!(sink.emit_complete(RetryNonSerialized), Ok(()));
        assert_eq!(
            sink.emit_error(StreamError::upstream("x"), RetryNonSerialized),
            Err(EmitError {
                signal: SignalType::Error,
                result: EmitResult::FailTerminated
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_emit_loses_nothing() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 250;

        let sink = Arc::new(Sink::new(SinkPolicy::multicast_from(&crate::Config {
            buffer_size: 0,
            ..crate::Config::default()
        })));
        let probe = CollectProbe::new();
        sink.subscribe(probe.clone());

        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                for i in 0..PER_PRODUCER {
                    sink.emit_next(p * PER_PRODUCER + i, RetryNonSerialized)
                        .expect("retrying emission must succeed");
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut items = probe.items();
        assert_eq!(items.len(), (PRODUCERS * PER_PRODUCER) as usize);
        items.sort_unstable();
        assert_eq!(items, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_async_emit_loses_nothing() {
        let sink = Arc::new(Sink::new(SinkPolicy::replay_all()));
        let probe = CollectProbe::new();
        sink.subscribe(probe.clone());
        let token = CancellationToken::new();

        let mut handles = Vec::new();
        for p in 0..4u32 {
            let sink = Arc::clone(&sink);
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    sink.emit_next_async(p * 250 + i, &token).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(probe.items().len(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_emit_waits_for_room() {
        let sink = Arc::new(Sink::new(SinkPolicy::multicast(1)));
        let log = SignalLog::new();
        let slow = ManualProbe::new("slow", log.clone());
        sink.subscribe(slow.clone());
        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);

        let token = CancellationToken::new();
        let pending = {
            let sink = Arc::clone(&sink);
            let token = token.clone();
            tokio::spawn(async move { sink.emit_next_async(2, &token).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!pending.is_finished());

        slow.request(2);
        assert_eq!(pending.await.unwrap(), Ok(()));
        assert_eq!(log.items_of("slow"), vec![1, 2]);

        // cancellation unblocks a retry loop that can never succeed
        sink.try_emit_next(3);
        let blocked = {
            let sink = Arc::clone(&sink);
            let token = token.clone();
            tokio::spawn(async move { sink.emit_next_async(4, &token).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();
        let err = blocked.await.unwrap().unwrap_err();
        assert_eq!(err.result, EmitResult::FailOverflow);
    }
}
