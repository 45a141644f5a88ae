//! Count-based sliding window over recorded call outcomes
//!
//! The window keeps the most recent N outcomes and running aggregates over
//! them, so rate checks are O(1) per recorded call. Recording the N+1th
//! outcome evicts the oldest one and its contribution to the aggregates.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct Slot {
    failed: bool,
    slow: bool,
}

/// Ring of the most recent call outcomes with running failure counts
#[derive(Debug)]
pub(crate) struct SlidingWindow {
    slots: VecDeque<Slot>,
    capacity: usize,
    failed: u32,
    slow: u32,
}

impl SlidingWindow {
    /// Create a window buffering up to `capacity` outcomes
    ///
    /// A zero capacity is treated as one.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { slots: VecDeque::with_capacity(capacity), capacity, failed: 0, slow: 0 }
    }

    /// Record one call outcome, evicting the oldest beyond capacity
    pub(crate) fn record(&mut self, failed: bool, slow: bool) {
        if self.slots.len() == self.capacity {
            if let Some(evicted) = self.slots.pop_front() {
                if evicted.failed {
                    self.failed -= 1;
                }
                if evicted.slow {
                    self.slow -= 1;
                }
            }
        }
        self.slots.push_back(Slot { failed, slow });
        if failed {
            self.failed += 1;
        }
        if slow {
            self.slow += 1;
        }
    }

    /// Number of outcomes currently buffered
    pub(crate) fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of buffered outcomes recorded as failures
    #[cfg(test)]
    fn failed(&self) -> u32 {
        self.failed
    }

    /// Number of buffered outcomes recorded as slow
    #[cfg(test)]
    fn slow(&self) -> u32 {
        self.slow
    }

    /// Failure rate over the buffered outcomes, as a percentage
    pub(crate) fn failure_rate(&self) -> f32 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.failed as f32 * 100.0 / self.slots.len() as f32
    }

    /// Slow-call rate over the buffered outcomes, as a percentage
    pub(crate) fn slow_rate(&self) -> f32 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.slow as f32 * 100.0 / self.slots.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `SlidingWindow::record` behavior for the aggregate tracking
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms buffered count, failure count and slow count follow the
    ///   recorded outcomes.
    /// - Confirms rates are percentages over the buffered outcomes.
    #[test]
    fn test_record_tracks_aggregates() {
        let mut window = SlidingWindow::new(10);

        window.record(false, false);
        window.record(true, false);
        window.record(true, true);
        window.record(false, true);

        assert_eq!(window.len(), 4);
        assert_eq!(window.failed(), 2);
        assert_eq!(window.slow(), 2);
        assert!((window.failure_rate() - 50.0).abs() < f32::EPSILON);
        assert!((window.slow_rate() - 50.0).abs() < f32::EPSILON);
    }

    /// Validates `SlidingWindow::record` behavior for the eviction scenario.
    ///
    /// Assertions:
    /// - Confirms the buffer never exceeds its capacity.
    /// - Confirms evicted outcomes stop contributing to the aggregates.
    #[test]
    fn test_eviction_removes_oldest_contribution() {
        let mut window = SlidingWindow::new(3);

        window.record(true, true);
        window.record(true, false);
        window.record(false, false);
        assert_eq!(window.failed(), 2);

        window.record(false, false);
        assert_eq!(window.len(), 3);
        assert_eq!(window.failed(), 1);
        assert_eq!(window.slow(), 0);

        window.record(false, false);
        window.record(false, false);
        assert_eq!(window.failed(), 0);
        assert!(window.failure_rate().abs() < f32::EPSILON);
    }

    /// Validates `SlidingWindow` behavior for the empty window edge case.
    ///
    /// Assertions:
    /// - Confirms rates over an empty window are zero rather than NaN.
    /// - Confirms a zero capacity is clamped to one.
    #[test]
    fn test_empty_and_zero_capacity() {
        let window = SlidingWindow::new(0);

        assert_eq!(window.len(), 0);
        assert!(window.failure_rate().abs() < f32::EPSILON);
        assert!(window.slow_rate().abs() < f32::EPSILON);

        let mut window = SlidingWindow::new(0);
        window.record(true, false);
        window.record(true, false);
        assert_eq!(window.len(), 1);
        assert_eq!(window.failed(), 1);
    }
}
