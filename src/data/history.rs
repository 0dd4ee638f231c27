//! Bounded time series for live plots.
//!
//! Each polled numeric field keeps a fixed-capacity ring of samples backed by
//! `ringbuf`. Once full, every new sample evicts the oldest one.

use ringbuf::{ring_buffer::RbBase, HeapRb, Rb};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Default number of samples kept per field
pub const DEFAULT_HISTORY_CAPACITY: usize = 300;

/// One plotted point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Seconds since polling first started
    pub elapsed: f64,
    /// Value in the field's physical unit
    pub value: f64,
}

impl Sample {
    #[allow(missing_docs)]
    pub fn new(elapsed: f64, value: f64) -> Self {
        Self { elapsed, value }
    }
}

/// Fixed-capacity sample ring for one field
pub struct History {
    buffer: HeapRb<Sample>,
    capacity: usize,
}

impl History {
    /// Create a ring holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: HeapRb::new(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, sample: Sample) {
        self.buffer.push_overwrite(sample);
    }

    /// Samples in insertion order, oldest first
    pub fn samples(&self) -> Vec<Sample> {
        self.buffer.iter().copied().collect()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<Sample> {
        self.buffer.iter().last().copied()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[allow(missing_docs)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("latest", &self.latest())
            .finish()
    }
}

/// Histories of every plotted field, keyed by field name
#[derive(Debug)]
pub struct HistoryBook {
    capacity: usize,
    series: BTreeMap<String, History>,
}

impl HistoryBook {
    /// Empty book whose rings hold `capacity` samples each
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: BTreeMap::new(),
        }
    }

    /// Append a sample to `field`'s ring, creating it on first use
    pub fn record(&mut self, field: &str, sample: Sample) {
        let capacity = self.capacity;
        self.series
            .entry(field.to_string())
            .or_insert_with(|| History::new(capacity))
            .push(sample);
    }

    /// Ring of one field
    pub fn get(&self, field: &str) -> Option<&History> {
        self.series.get(field)
    }

    /// Number of samples held for `field`
    pub fn len_of(&self, field: &str) -> usize {
        self.series.get(field).map(History::len).unwrap_or(0)
    }

    /// Copy of every series
    pub fn series(&self) -> BTreeMap<String, Vec<Sample>> {
        self.series
            .iter()
            .map(|(name, history)| (name.clone(), history.samples()))
            .collect()
    }

    /// Per-field capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all samples of all fields
    pub fn clear(&mut self) {
        self.series.values_mut().for_each(History::clear);
    }
}

impl Default for HistoryBook {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
