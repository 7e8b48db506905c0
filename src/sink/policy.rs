//! Sink policies.
//!
//! A policy is chosen when the sink is created and never changes afterwards.
//!
//! | Policy               | Consumers | Push fails with `FAIL_OVERFLOW` when       | Late joiners see     |
//! |----------------------|-----------|--------------------------------------------|----------------------|
//! | `Unicast`            | one, ever | its queue is full                          | -                    |
//! | `Multicast`          | many      | **any** queue is full                      | future values        |
//! | `DirectBestEffort`   | many      | **no** consumer can accept right now       | future values        |
//! | `DirectAllOrNothing` | many      | **any** consumer cannot accept right now   | future values        |
//! | `Replay`             | many      | **any** live queue is full                 | last `k` (or all)    |

use crate::config::{Capacity, Config};

/// Overflow and replay behavior of a [`Sink`](crate::Sink).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkPolicy {
    /// Single consumer; values pushed before it attaches are buffered.
    Unicast { buffer: Capacity },
    /// Independent bounded queue per consumer; the slowest consumer paces everyone.
    Multicast { buffer: Capacity },
    /// Values go only to consumers with outstanding demand; the rest miss them.
    DirectBestEffort,
    /// Values go to every consumer or to none.
    DirectAllOrNothing,
    /// Multicast plus a history replayed to every new consumer.
    Replay { history: Capacity, buffer: Capacity },
}

impl SinkPolicy {
    /// Unicast with an unbounded queue.
    pub fn unicast() -> Self {
        SinkPolicy::Unicast {
            buffer: Capacity::Unbounded,
        }
    }

    pub fn unicast_bounded(buffer: usize) -> Self {
        SinkPolicy::Unicast {
            buffer: Capacity::bounded(buffer),
        }
    }

    /// Multicast with `buffer` slots per consumer.
    pub fn multicast(buffer: usize) -> Self {
        SinkPolicy::Multicast {
            buffer: Capacity::bounded(buffer),
        }
    }

    /// Multicast with the per-consumer bound taken from [`Config::buffer_size`].
    pub fn multicast_from(cfg: &Config) -> Self {
        SinkPolicy::Multicast {
            buffer: cfg.buffer_capacity(),
        }
    }

    pub fn direct_best_effort() -> Self {
        SinkPolicy::DirectBestEffort
    }

    pub fn direct_all_or_nothing() -> Self {
        SinkPolicy::DirectAllOrNothing
    }

    /// Replays the whole history to late joiners.
    pub fn replay_all() -> Self {
        SinkPolicy::Replay {
            history: Capacity::Unbounded,
            buffer: Capacity::Unbounded,
        }
    }

    /// Replays the last `k` values to late joiners.
    ///
    /// `k == 0` keeps everything, matching [`Config::replay_limit`].
    pub fn replay_limit(k: usize) -> Self {
        SinkPolicy::Replay {
            history: Capacity::from_sentinel(k),
            buffer: Capacity::Unbounded,
        }
    }

    /// Replay with history and per-consumer bounds taken from `cfg`.
    pub fn replay_from(cfg: &Config) -> Self {
        SinkPolicy::Replay {
            history: cfg.replay_capacity(),
            buffer: cfg.buffer_capacity(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn label(&self) -> &'static str {
        match self {
            SinkPolicy::Unicast { .. } => "unicast",
            SinkPolicy::Multicast { .. } => "multicast",
            SinkPolicy::DirectBestEffort => "direct_best_effort",
            SinkPolicy::DirectAllOrNothing => "direct_all_or_nothing",
            SinkPolicy::Replay { .. } => "replay",
        }
    }

    /// Per-consumer queue bound.
    ///
    /// Direct policies only enqueue what a consumer already asked for, so their
    /// queues never need a bound of their own.
    pub(crate) fn buffer(&self) -> Capacity {
        match self {
            SinkPolicy::Unicast { buffer }
            | SinkPolicy::Multicast { buffer }
            | SinkPolicy::Replay { buffer, .. } => *buffer,
            SinkPolicy::DirectBestEffort | SinkPolicy::DirectAllOrNothing => Capacity::Unbounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_limit_zero_keeps_everything() {
        assert_eq!(SinkPolicy::replay_limit(0), SinkPolicy::replay_all());
        assert_eq!(
            SinkPolicy::replay_limit(3),
            SinkPolicy::Replay {
                history: Capacity::Bounded(3),
                buffer: Capacity::Unbounded
            }
        );
    }

    #[test]
    fn test_from_config() {
        let cfg = Config {
            buffer_size: 16,
            replay_limit: 0,
            ..Config::default()
        };
        assert_eq!(
            SinkPolicy::multicast_from(&cfg),
            SinkPolicy::Multicast {
                buffer: Capacity::Bounded(16)
            }
        );
        assert_eq!(
            SinkPolicy::replay_from(&cfg),
            SinkPolicy::Replay {
                history: Capacity::Unbounded,
                buffer: Capacity::Bounded(16)
            }
        );
    }

    #[test]
    fn test_direct_policies_have_no_bound() {
        assert_eq!(SinkPolicy::direct_best_effort().buffer(), Capacity::Unbounded);
        assert_eq!(SinkPolicy::direct_all_or_nothing().buffer(), Capacity::Unbounded);
        assert_eq!(SinkPolicy::replay_limit(2).label(), "replay");
    }
}
