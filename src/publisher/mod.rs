//! Producers.
//!
//! ## Contents
//! - [`Feed`] producer-side contract: supplies the value at a given index of a run
//! - [`feed`] ready-made feeds (`counter`, `from_iter`, `random_in`)
//! - [`BoundedPublisher`] cold publisher with a hard upper bound and excess-demand rejection
//! - [`Source`] async producer contract and [`spawn_pump`] driving a sink from a timer
//!
//! ## Quick wiring
//! ```text
//! BoundedPublisher ──subscribe──► fresh Feed + BoundedSubscription per consumer   (cold)
//! Source ──spawn_pump(period)──► Sink::emit_next_async ──► sink consumers         (hot)
//! ```

pub mod feed;

mod bounded;
mod source;

pub use bounded::BoundedPublisher;
pub use feed::Feed;
pub use source::{FeedSource, PumpExit, Source, spawn_pump};
