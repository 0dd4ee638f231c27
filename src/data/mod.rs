//! Data buffering for polled measurements.

pub mod history;

pub use history::{History, HistoryBook, Sample, DEFAULT_HISTORY_CAPACITY};
