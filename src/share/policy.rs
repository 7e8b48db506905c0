//! Connection policies and shared-publisher configuration.

use crate::config::{Capacity, Config};
use crate::sink::SinkPolicy;

/// When a shared publisher subscribes to its upstream.
///
/// | Policy            | Connects when                  | Disconnects when live count hits 0 |
/// |-------------------|--------------------------------|------------------------------------|
/// | `Cold`            | every subscribe (no sharing)   | -                                  |
/// | `RefCount(n)`     | `n` consumers are attached     | yes, re-arms for a fresh run       |
/// | `AutoConnect(0)`  | on construction                | never                              |
/// | `AutoConnect(n)`  | the `n`-th consumer attaches   | never                              |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectPolicy {
    Cold,
    RefCount(usize),
    AutoConnect(usize),
}

impl ConnectPolicy {
    /// `share()`: connect on the first consumer, disconnect after the last.
    pub fn share() -> Self {
        ConnectPolicy::RefCount(1)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectPolicy::Cold => "cold",
            ConnectPolicy::RefCount(_) => "ref_count",
            ConnectPolicy::AutoConnect(_) => "auto_connect",
        }
    }

    /// Number of live consumers that triggers the connection.
    pub(crate) fn threshold(&self) -> usize {
        match self {
            ConnectPolicy::Cold => 0,
            ConnectPolicy::RefCount(n) => (*n).max(1),
            ConnectPolicy::AutoConnect(n) => *n,
        }
    }
}

/// Configuration of a [`SharedPublisher`](crate::SharedPublisher).
///
/// ## Field semantics
/// - `policy`: when upstream is subscribed (and unsubscribed)
/// - `replay`: history handed to late joiners (`None` = only future values)
/// - `buffer`: per-consumer queue bound; the slowest consumer paces upstream once it fills
/// - `prefetch`: upstream demand requested per batch (min 1)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShareConfig {
    pub policy: ConnectPolicy,
    pub replay: Option<Capacity>,
    pub buffer: Capacity,
    pub prefetch: u64,
}

impl ShareConfig {
    /// Uses the buffer and prefetch defaults of [`Config::default`].
    pub fn new(policy: ConnectPolicy) -> Self {
        Self::from_config(policy, &Config::default())
    }

    pub fn from_config(policy: ConnectPolicy, cfg: &Config) -> Self {
        Self {
            policy,
            replay: None,
            buffer: cfg.buffer_capacity(),
            prefetch: cfg.prefetch_clamped() as u64,
        }
    }

    /// Hands the last `k` values to late joiners (`0` = the whole history).
    pub fn with_replay(mut self, k: usize) -> Self {
        self.replay = Some(Capacity::from_sentinel(k));
        self
    }

    /// Hands the whole history to late joiners.
    pub fn with_replay_all(mut self) -> Self {
        self.replay = Some(Capacity::Unbounded);
        self
    }

    pub fn with_buffer(mut self, buffer: Capacity) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_prefetch(mut self, prefetch: u64) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Policy of the internal sink each connection fans out through.
    pub(crate) fn sink_policy(&self) -> SinkPolicy {
        match self.replay {
            Some(history) => SinkPolicy::Replay {
                history,
                buffer: self.buffer,
            },
            None => SinkPolicy::Multicast {
                buffer: self.buffer,
            },
        }
    }
}
