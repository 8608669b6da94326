//! Source and session statistics

pub mod metrics;

pub use metrics::{SessionStats, SourceCounters, SourceStats};
