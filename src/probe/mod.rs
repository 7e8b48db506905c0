//! # Observation endpoints.
//!
//! Probes are consumers with no business logic; they exist to observe the
//! protocol deterministically.
//!
//! - [`LogProbe`] requests everything and logs each signal via `tracing`.
//! - [`CollectProbe`] requests everything and keeps items in memory.
//! - [`ManualProbe`] leaves demand and cancellation to the caller.
//!
//! Probes that share a [`SignalLog`] produce one ordered record of who saw what.
//!
//! Consumer wrappers:
//! - [`Take`] forwards the first `n` items, then cancels upstream.
//! - [`Paced`] requests one item per period on a tokio task (slow consumer).
//! - [`into_stream`] exposes a publisher as a `futures::Stream`.
//!
//! ```text
//! Publisher ──► Take(2) ──► LogProbe("sam") ──► SignalLog ◄── ManualProbe("mike")
//! ```

mod collect;
mod log;
mod manual;
mod paced;
mod signal;
mod stream;
mod take;

pub use collect::CollectProbe;
pub use log::LogProbe;
pub use manual::ManualProbe;
pub use paced::Paced;
pub use signal::{Record, Signal, SignalLog};
pub use stream::{SubscriberStream, into_stream};
pub use take::Take;
