//! # Producer-side feed-in.
//!
//! A [`Feed`] supplies the value at a given position of one run. Publishers
//! call it only when the consumer has demand, so a feed never needs to know
//! about backpressure.
//!
//! Any `FnMut(u64) -> Option<T> + Send` closure is a feed.
//!
//! ## Example
//! ```rust
//! use flowvisor::feed::{self, Feed};
//!
//! let mut squares = |i: u64| Some(i * i);
//! assert_eq!(squares.next(3), Some(9));
//!
//! let mut letters = feed::from_iter(["a", "b"]);
//! assert_eq!(letters.next(0), Some("a"));
//! assert_eq!(letters.next(1), Some("b"));
//! assert_eq!(letters.next(2), None);
//! ```

use std::ops::Range;

use rand::Rng;

/// Supplies the items of one run.
pub trait Feed<T>: Send + 'static {
    /// Produces the item at `index` (0-based) of the current run.
    ///
    /// Returning `None` ends the run early; the publisher then completes.
    fn next(&mut self, index: u64) -> Option<T>;
}

impl<T, F> Feed<T> for F
where
    F: FnMut(u64) -> Option<T> + Send + 'static,
{
    fn next(&mut self, index: u64) -> Option<T> {
        self(index)
    }
}

/// `1, 2, 3, ...`
pub fn counter() -> impl Feed<u64> {
    |index: u64| Some(index + 1)
}

/// Yields the items of `iter` in order, then ends the run.
pub fn from_iter<I>(iter: I) -> impl Feed<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
{
    let mut iter = iter.into_iter();
    move |_index: u64| iter.next()
}

/// Uniformly random values in `range`; an empty range ends the run immediately.
pub fn random_in(range: Range<i64>) -> impl Feed<i64> {
    move |_index: u64| {
        if range.is_empty() {
            return None;
        }
        Some(rand::rng().random_range(range.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_one_based() {
        let mut c = counter();
        assert_eq!(c.next(0), Some(1));
        assert_eq!(c.next(9), Some(10));
    }

    #[test]
    fn test_random_stays_in_range() {
        let mut prices = random_in(10..100);
        for i in 0..200 {
            let v = prices.next(i).unwrap();
            assert!((10..100).contains(&v));
        }
    }

    #[test]
    fn test_random_empty_range_ends() {
        let mut empty = random_in(5..5);
        assert_eq!(empty.next(0), None);
    }
}
