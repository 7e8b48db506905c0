//! # Central configuration.
//!
//! Provides [`Config`] default tuning values and [`Capacity`] the bound type
//! used by sinks and shared publishers.
//!
//! Config is used in two ways:
//! 1. **Policy construction**: `SinkPolicy::multicast_from(&config)`, `SinkPolicy::replay_from(&config)`
//! 2. **Shared publishers**: `ShareConfig::from_config(policy, &config)`
//!
//! ## Sentinel values
//! - `buffer_size = 0` → unbounded per-consumer buffer
//! - `replay_limit = 0` → unbounded replay history
//!
//! Policies are copied out of the config at construction time; changing a
//! `Config` afterwards does not affect sinks that already exist.

/// Upper bound of a queue or history.
///
/// `Bounded(0)` is never produced by the constructors in this crate; use
/// [`Capacity::bounded`] which clamps to a minimum of 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Capacity {
    /// No upper bound.
    #[default]
    Unbounded,
    /// At most `n` entries.
    Bounded(usize),
}

impl Capacity {
    /// Creates a bounded capacity, clamped to a minimum of 1.
    #[inline]
    pub fn bounded(n: usize) -> Self {
        Capacity::Bounded(n.max(1))
    }

    /// Maps the `0 = unbounded` sentinel used by [`Config`].
    #[inline]
    pub fn from_sentinel(n: usize) -> Self {
        match n {
            0 => Capacity::Unbounded,
            n => Capacity::Bounded(n),
        }
    }

    /// Returns `true` if `len` entries leave room for one more.
    #[inline]
    pub fn has_room(&self, len: usize) -> bool {
        match self {
            Capacity::Unbounded => true,
            Capacity::Bounded(n) => len < *n,
        }
    }

    /// Returns the bound as an `Option` (`None` → unbounded).
    #[inline]
    pub fn limit(&self) -> Option<usize> {
        match self {
            Capacity::Unbounded => None,
            Capacity::Bounded(n) => Some(*n),
        }
    }
}

/// Default tuning values.
///
/// ## Field semantics
/// - `buffer_size`: per-consumer queue bound for buffered sinks (`0` = unbounded)
/// - `replay_limit`: history retained by replay sinks (`0` = everything)
/// - `prefetch`: upstream batch size requested by shared publishers (min 1)
/// - `max_items`: upper bound of a [`BoundedPublisher`](crate::BoundedPublisher)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to avoid sprinkling
/// sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Per-consumer queue bound used by buffered sink policies.
    ///
    /// Slow consumers whose queue reaches this bound make further pushes
    /// fail with `FAIL_OVERFLOW`.
    pub buffer_size: usize,

    /// Number of past values replayed to late joiners.
    ///
    /// - `0` = replay the whole history
    /// - `n > 0` = replay the last `n` values
    pub replay_limit: usize,

    /// Demand a shared publisher requests from its upstream per batch.
    ///
    /// The relay replenishes once three quarters of a batch were forwarded.
    /// Keep it at or below the bound of a [`BoundedPublisher`](crate::BoundedPublisher)
    /// upstream, which rejects larger requests.
    pub prefetch: usize,

    /// Maximum number of items a bounded publisher produces per subscription.
    pub max_items: u64,
}

impl Config {
    /// Returns the per-consumer bound as a [`Capacity`].
    #[inline]
    pub fn buffer_capacity(&self) -> Capacity {
        Capacity::from_sentinel(self.buffer_size)
    }

    /// Returns the replay history bound as a [`Capacity`].
    #[inline]
    pub fn replay_capacity(&self) -> Capacity {
        Capacity::from_sentinel(self.replay_limit)
    }

    /// Returns a prefetch clamped to a minimum of 1.
    #[inline]
    pub fn prefetch_clamped(&self) -> usize {
        self.prefetch.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `buffer_size = 256`
    /// - `replay_limit = 0` (unbounded history)
    /// - `prefetch = 1`
    /// - `max_items = 10`
    fn default() -> Self {
        Self {
            buffer_size: 256,
            replay_limit: 0,
            prefetch: 1,
            max_items: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        let cfg = Config {
            buffer_size: 0,
            replay_limit: 3,
            prefetch: 0,
            ..Config::default()
        };
        assert_eq!(cfg.buffer_capacity(), Capacity::Unbounded);
        assert_eq!(cfg.replay_capacity(), Capacity::Bounded(3));
        assert_eq!(cfg.prefetch_clamped(), 1);
    }

    #[test]
    fn test_bounded_is_clamped() {
        assert_eq!(Capacity::bounded(0), Capacity::Bounded(1));
        assert!(Capacity::bounded(2).has_room(1));
        assert!(!Capacity::bounded(2).has_room(2));
        assert!(Capacity::Unbounded.has_room(usize::MAX));
    }
}
