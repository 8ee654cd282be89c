//! Fixed-capacity sample history kept per channel.
//!
//! Backed by a heap-allocated `ringbuf` buffer. Pushing into a full history
//! overwrites the oldest sample; iteration always runs oldest-first, which is the
//! order a plot consumer draws in.

use ringbuf::{HeapRb, Rb};
use std::fmt;

/// Circular buffer of the most recent samples of one channel.
pub struct SampleHistory {
    buffer: HeapRb<f64>,
}

impl SampleHistory {
    /// Create an empty history holding at most `capacity` samples.
    ///
    /// A zero capacity is raised to one so the channel always keeps its latest value.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: HeapRb::new(capacity.max(1)),
        }
    }

    /// Append a sample, overwriting the oldest one when full.
    pub fn push(&mut self, value: f64) {
        self.buffer.push_overwrite(value);
    }

    /// Samples oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.buffer.iter().copied()
    }

    /// Samples oldest-first, collected.
    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<f64> {
        self.iter().last()
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

impl fmt::Debug for SampleHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleHistory")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_fill_is_chronological() {
        let mut history = SampleHistory::new(5);
        for v in [1.0, 2.0, 3.0] {
            history.push(v);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(history.latest(), Some(3.0));
    }

    #[test]
    fn test_overwrite_keeps_last_capacity_values() {
        let capacity = 4;
        let mut history = SampleHistory::new(capacity);
        for n in 0..11 {
            history.push(f64::from(n));
        }
        assert_eq!(history.len(), capacity);
        assert_eq!(history.to_vec(), vec![7.0, 8.0, 9.0, 10.0]);
        assert_eq!(history.capacity(), capacity);
        assert_eq!(history.latest(), Some(10.0));
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut history = SampleHistory::new(0);
        assert!(history.is_empty());
        history.push(1.5);
        history.push(2.5);
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.to_vec(), vec![2.5]);
    }
}
