//! # Hot publishers.
//!
//! [`SharedPublisher`] turns a (usually cold) upstream into a hot one: a single
//! upstream execution is shared by every downstream consumer, and
//! [`ConnectPolicy`] decides when that execution starts and stops.
//!
//! ```text
//!                      ┌────────────── SharedPublisher ───────────────┐
//! consumer 1 ──┐       │                                              │
//! consumer 2 ──┼──► Member ──► Sink (multicast | replay) ◄── Relay ◄──┼── upstream
//! consumer N ──┘       │          ▲                          │        │   (subscribed once
//!                      │          └── request → resume ──────┘        │    per connection)
//!                      └──────────────────────────────────────────────┘
//! ```
//!
//! ## Policies
//! - `Cold`: no sharing, every consumer gets its own upstream run.
//! - `RefCount(1)` (`share`): first consumer connects, last one leaving disconnects.
//! - `RefCount(n)`: nothing runs until `n` consumers are attached at once.
//! - `AutoConnect(0)`: runs from construction; consumers come and go.
//! - `AutoConnect(n)`: runs from the `n`-th consumer on and never stops early.
//!
//! Combined with [`ShareConfig::with_replay`], late joiners first receive the
//! last `k` values; `AutoConnect(0)` plus `with_replay(1)` broadcasts a
//! "current value".
//!
//! ## Backpressure
//! The relay requests `prefetch` items from upstream and replenishes as values
//! reach the sink. A full consumer queue parks the relay until some consumer
//! requests more; values arriving while nobody is attached are dropped.

mod policy;
mod relay;
mod shared;

pub use policy::{ConnectPolicy, ShareConfig};
pub use shared::SharedPublisher;
