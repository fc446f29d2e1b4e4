//! Bounded in-memory history of recent readings.
//!
//! The window feeds the statistics engine. It holds at most
//! [`DEFAULT_HISTORY_CAPACITY`] readings; pushing into a full window evicts
//! the oldest one (FIFO).

use std::collections::VecDeque;

use streetlight_types::SensorReading;

/// Default number of readings kept in memory.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded FIFO of the most recent readings, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    readings: VecDeque<SensorReading>,
    capacity: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryWindow {
    /// Create a window holding at most `capacity` readings (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, returning the evicted one if the window was full.
    pub fn push(&mut self, reading: SensorReading) -> Option<SensorReading> {
        let evicted = if self.readings.len() == self.capacity {
            self.readings.pop_front()
        } else {
            None
        };
        self.readings.push_back(reading);
        evicted
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The most recent reading.
    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.back()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &SensorReading> + Clone + '_ {
        self.readings.iter()
    }

    pub fn to_vec(&self) -> Vec<SensorReading> {
        self.readings.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}
