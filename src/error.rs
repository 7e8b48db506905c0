//! Error types used by publishers, sinks and subscribers.
//!
//! This module defines two error types:
//!
//! - [`StreamError`]: errors delivered to a consumer through `on_error`.
//! - [`EmitError`]: returned to a producer when a retrying `emit_*` call gives up.
//!
//! Both provide helper methods (`as_label`, `as_message`) for logging/metrics.

use thiserror::Error;

use crate::sink::{EmitResult, SignalType};

/// # Errors delivered to consumers.
///
/// Every error that reaches a [`Subscriber`](crate::Subscriber) is terminal for
/// the subscription it arrives on: no further signals follow.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A single `request(n)` asked for more items than the source can ever produce.
    #[error("requested {requested} items but the source is bounded to {max}")]
    ExcessDemand {
        /// The amount asked for in the offending request.
        requested: u64,
        /// The hard upper bound of the source.
        max: u64,
    },

    /// `request(0)` was called; demand must be strictly positive.
    #[error("non-positive demand requested")]
    InvalidDemand,

    /// A unicast sink already has (or had) its single consumer.
    #[error("unicast sink only allows a single subscriber")]
    UnicastExhausted,

    /// Error pushed by a producer or raised by an upstream source.
    #[error("upstream error: {message}")]
    Upstream {
        /// The underlying error message.
        message: String,
    },

    /// The consuming side went away before the stream terminated.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    /// Shorthand for [`StreamError::Upstream`].
    ///
    /// # Example
    /// ```
    /// use flowvisor::StreamError;
    ///
    /// let err = StreamError::upstream("connection reset");
    /// assert_eq!(err.as_label(), "stream_upstream");
    /// assert_eq!(err.to_string(), "upstream error: connection reset");
    /// ```
    pub fn upstream(message: impl Into<String>) -> Self {
        StreamError::Upstream {
            message: message.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::ExcessDemand { .. } => "stream_excess_demand",
            StreamError::InvalidDemand => "stream_invalid_demand",
            StreamError::UnicastExhausted => "stream_unicast_exhausted",
            StreamError::Upstream { .. } => "stream_upstream",
            StreamError::Cancelled => "stream_cancelled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StreamError::ExcessDemand { requested, max } => {
                format!("max items reached: requested={requested} max={max}")
            }
            StreamError::InvalidDemand => "demand must be > 0".to_string(),
            StreamError::UnicastExhausted => "single subscriber only".to_string(),
            StreamError::Upstream { message } => format!("upstream: {message}"),
            StreamError::Cancelled => "cancelled".to_string(),
        }
    }

    /// Indicates whether the error is a protocol violation by the consumer
    /// (as opposed to a failure of the producing side).
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            StreamError::ExcessDemand { .. } | StreamError::InvalidDemand
        )
    }
}

/// # Failure of a retrying emission.
///
/// Produced by [`Sink::emit_next`](crate::Sink::emit_next) and friends when the
/// [`EmitFailureHandler`](crate::EmitFailureHandler) declines to retry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("emission of {signal:?} failed: {}", .result.as_label())]
pub struct EmitError {
    /// Which signal was being emitted.
    pub signal: SignalType,
    /// The last result code observed.
    pub result: EmitResult,
}

impl EmitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        self.result.as_label()
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        format!("signal={:?} result={}", self.signal, self.result.as_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(
            StreamError::ExcessDemand { requested: 11, max: 10 }.as_label(),
            "stream_excess_demand"
        );
        assert_eq!(StreamError::InvalidDemand.as_label(), "stream_invalid_demand");
        assert_eq!(
            StreamError::UnicastExhausted.as_label(),
            "stream_unicast_exhausted"
        );
        assert_eq!(StreamError::Cancelled.as_label(), "stream_cancelled");
    }

    #[test]
    fn test_protocol_violations() {
        assert!(StreamError::InvalidDemand.is_protocol_violation());
        assert!(StreamError::ExcessDemand { requested: 11, max: 10 }.is_protocol_violation());
        assert!(!StreamError::upstream("boom").is_protocol_violation());
        assert!(!StreamError::UnicastExhausted.is_protocol_violation());
    }

    #[test]
    fn test_emit_error_message() {
        let err = EmitError {
            signal: SignalType::Next,
            result: EmitResult::FailOverflow,
        };
        assert_eq!(err.as_label(), "fail_overflow");
        assert_eq!(err.to_string(), "emission of Next failed: fail_overflow");
    }
}
