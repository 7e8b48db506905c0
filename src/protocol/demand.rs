//! Demand accounting and drain serialization.
//!
//! - [`Demand`] saturating outstanding-demand counter; [`UNBOUNDED`] is sticky.
//! - [`Wip`] work-in-progress counter that elects a single drainer and makes
//!   reentrant or concurrent callers hand their work to it instead of delivering
//!   signals themselves.
//! - [`TerminalFlag`] set-once terminal state (cancelled / completed / errored).
//!
//! ## Drain loop
//! ```text
//! if !wip.enter() { return; }      // someone else is draining; they will see our work
//! let mut missed = 1;
//! loop {
//!     ... deliver what is deliverable ...
//!     missed = wip.leave(missed);
//!     if missed == 0 { break; }
//! }
//! ```

use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};

use super::UNBOUNDED;

/// Outstanding demand of one subscription.
#[derive(Debug, Default)]
pub(crate) struct Demand(AtomicU64);

impl Demand {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Adds `n`, saturating at [`UNBOUNDED`]. Returns the previous value.
    pub(crate) fn add(&self, n: u64) -> u64 {
        match self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
            if cur == UNBOUNDED {
                None
            } else {
                Some(cur.saturating_add(n))
            }
        }) {
            Ok(prev) | Err(prev) => prev,
        }
    }

    /// Current outstanding demand.
    pub(crate) fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Consumes one unit of demand; returns `false` when there is none.
    ///
    /// Unbounded demand is never decremented.
    pub(crate) fn try_take(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| match cur {
                0 => None,
                UNBOUNDED => Some(UNBOUNDED),
                c => Some(c - 1),
            })
            .is_ok()
    }
}

/// Work-in-progress counter electing a single drainer.
#[derive(Debug, Default)]
pub(crate) struct Wip(AtomicUsize);

impl Wip {
    pub(crate) fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Registers work; returns `true` if the caller became the drainer.
    pub(crate) fn enter(&self) -> bool {
        self.0.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Acknowledges `missed` units of work; returns what arrived meanwhile.
    ///
    /// The drainer must stop when this returns `0` and loop again otherwise.
    pub(crate) fn leave(&self, missed: usize) -> usize {
        self.0.fetch_sub(missed, Ordering::AcqRel) - missed
    }
}

/// Why a subscription stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Terminal {
    Cancelled = 1,
    Completed = 2,
    Errored = 3,
}

/// Set-once terminal state.
///
/// The three outcomes are mutually exclusive; the first `set` wins and the
/// flag is never cleared.
#[derive(Debug, Default)]
pub(crate) struct TerminalFlag(AtomicU8);

impl TerminalFlag {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Returns `true` if this call moved the flag out of the active state.
    pub(crate) fn set(&self, terminal: Terminal) -> bool {
        self.0
            .compare_exchange(0, terminal as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn get(&self) -> Option<Terminal> {
        match self.0.load(Ordering::Acquire) {
            1 => Some(Terminal::Cancelled),
            2 => Some(Terminal::Completed),
            3 => Some(Terminal::Errored),
            _ => None,
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demand_saturates_and_sticks() {
        let d = Demand::new();
        d.add(5);
        d.add(u64::MAX - 2);
        assert_eq!(d.get(), UNBOUNDED);
        assert!(d.try_take());
        assert_eq!(d.get(), UNBOUNDED);
        d.add(3);
        assert_eq!(d.get(), UNBOUNDED);
    }

    #[test]
    fn test_demand_take_until_empty() {
        let d = Demand::new();
        assert!(!d.try_take());
        d.add(2);
        assert!(d.try_take());
        assert!(d.try_take());
        assert!(!d.try_take());
        assert_eq!(d.get(), 0);
    }

    #[test]
    fn test_terminal_first_wins() {
        let flag = TerminalFlag::new();
        assert!(!flag.is_set());
        assert!(flag.set(Terminal::Cancelled));
        assert!(!flag.set(Terminal::Completed));
        assert!(!flag.set(Terminal::Cancelled));
        assert_eq!(flag.get(), Some(Terminal::Cancelled));
    }

    #[test]
    fn test_wip_single_drainer() {
        let wip = Wip::new();
        assert!(wip.enter());
        // reentrant / concurrent caller
        assert!(!wip.enter());
        let missed = wip.leave(1);
        assert_eq!(missed, 1);
        assert_eq!(wip.leave(missed), 0);
        assert!(wip.enter());
    }
}
