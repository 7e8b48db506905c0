//! # Push result codes and retry handlers.
//!
//! Every non-blocking push returns an [`EmitResult`]. The retrying `emit_*`
//! operations consult an [`EmitFailureHandler`] after each failed attempt:
//! returning `true` retries the same value, `false` gives up with an
//! [`EmitError`].
//!
//! ## Built-in handlers
//! - [`FailFast`] never retries.
//! - [`RetryNonSerialized`] retries only `FAIL_NON_SERIALIZED` (concurrent producers).
//! - [`RetryUntil`] retries races and overflow until a token fires or a deadline passes.
//!
//! Any `FnMut(SignalType, EmitResult) -> bool` closure is a handler too.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::EmitError;

/// Outcome of a single push attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmitResult {
    /// The signal was accepted.
    Ok,
    /// The sink already received a terminal signal.
    FailTerminated,
    /// A consumer buffer is full (or, for direct policies, a consumer cannot accept).
    FailOverflow,
    /// The single unicast consumer cancelled.
    FailCancelled,
    /// Another producer was pushing at the same time.
    FailNonSerialized,
    /// No consumer is attached and the policy keeps no history.
    FailZeroSubscriber,
}

impl EmitResult {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, EmitResult::Ok)
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EmitResult::Ok => "ok",
            EmitResult::FailTerminated => "fail_terminated",
            EmitResult::FailOverflow => "fail_overflow",
            EmitResult::FailCancelled => "fail_cancelled",
            EmitResult::FailNonSerialized => "fail_non_serialized",
            EmitResult::FailZeroSubscriber => "fail_zero_subscriber",
        }
    }

    /// Converts the code into a `Result`, tagging failures with `signal`.
    ///
    /// # Example
    /// ```
    /// use flowvisor::{EmitResult, SignalType};
    ///
    /// assert!(EmitResult::Ok.into_result(SignalType::Next).is_ok());
    /// let err = EmitResult::FailOverflow.into_result(SignalType::Next).unwrap_err();
    /// assert_eq!(err.as_label(), "fail_overflow");
    /// ```
    pub fn into_result(self, signal: SignalType) -> Result<(), EmitError> {
        match self {
            EmitResult::Ok => Ok(()),
            result => Err(EmitError { signal, result }),
        }
    }
}

/// Kind of signal a producer pushes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalType {
    Next,
    Complete,
    Error,
}

/// Decides whether a failed emission is retried.
pub trait EmitFailureHandler {
    /// Returns `true` to retry the same signal.
    fn on_emit_failure(&mut self, signal: SignalType, result: EmitResult) -> bool;
}

impl<F> EmitFailureHandler for F
where
    F: FnMut(SignalType, EmitResult) -> bool,
{
    fn on_emit_failure(&mut self, signal: SignalType, result: EmitResult) -> bool {
        self(signal, result)
    }
}

/// Never retries.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailFast;

impl EmitFailureHandler for FailFast {
    fn on_emit_failure(&mut self, _signal: SignalType, _result: EmitResult) -> bool {
        false
    }
}

/// Retries while another producer holds the sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryNonSerialized;

impl EmitFailureHandler for RetryNonSerialized {
    fn on_emit_failure(&mut self, _signal: SignalType, result: EmitResult) -> bool {
        result == EmitResult::FailNonSerialized
    }
}

/// Retries `FAIL_NON_SERIALIZED` and `FAIL_OVERFLOW` until cancelled.
///
/// Terminal results (`FAIL_TERMINATED`, `FAIL_CANCELLED`, `FAIL_ZERO_SUBSCRIBER`)
/// are never retried.
#[derive(Clone, Debug)]
pub struct RetryUntil {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RetryUntil {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Gives up once `timeout` elapsed from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }
}

impl EmitFailureHandler for RetryUntil {
    fn on_emit_failure(&mut self, _signal: SignalType, result: EmitResult) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return false;
        }
        matches!(
            result,
            EmitResult::FailNonSerialized | EmitResult::FailOverflow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(EmitResult::Ok.as_label(), "ok");
        assert_eq!(EmitResult::FailZeroSubscriber.as_label(), "fail_zero_subscriber");
        assert!(EmitResult::FailCancelled.is_failure());
    }

    #[test]
    fn test_builtin_handlers() {
        assert!(!FailFast.on_emit_failure(SignalType::Next, EmitResult::FailNonSerialized));

        let mut retry = RetryNonSerialized;
        assert!(retry.on_emit_failure(SignalType::Next, EmitResult::FailNonSerialized));
        assert!(!retry.on_emit_failure(SignalType::Next, EmitResult::FailOverflow));

        let mut attempts = 0;
        let mut bounded = |_s: SignalType, _r: EmitResult| {
            attempts += 1;
            attempts < 3
        };
        assert!(bounded.on_emit_failure(SignalType::Complete, EmitResult::FailOverflow));
        assert!(bounded.on_emit_failure(SignalType::Complete, EmitResult::FailOverflow));
        assert!(!bounded.on_emit_failure(SignalType::Complete, EmitResult::FailOverflow));
    }

    #[test]
    fn test_retry_until_stops() {
        let token = CancellationToken::new();
        let mut handler = RetryUntil::new(token.clone());
        assert!(handler.on_emit_failure(SignalType::Next, EmitResult::FailOverflow));
        assert!(!handler.on_emit_failure(SignalType::Next, EmitResult::FailTerminated));
        token.cancel();
        assert!(!handler.on_emit_failure(SignalType::Next, EmitResult::FailOverflow));

        let mut expired = RetryUntil::new(CancellationToken::new()).with_timeout(Duration::ZERO);
        assert!(!expired.on_emit_failure(SignalType::Next, EmitResult::FailNonSerialized));
    }
}
