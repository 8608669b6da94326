//! Statistics and metrics for upstream sources and viewer sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::source::frame::monotonic_millis;
use crate::source::ConnectionState;

/// Counters updated by an upstream reader
///
/// Lock-free so the reader never contends with viewers reading stats.
#[derive(Debug, Default)]
pub struct SourceCounters {
    frames_published: AtomicU64,
    frames_discarded: AtomicU64,
    bytes_received: AtomicU64,
    /// Monotonic millis of the last published frame, 0 if none
    last_frame_at: AtomicU64,
}

impl SourceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a published frame of `size` bytes
    pub fn record_frame(&self, size: usize) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
        self.last_frame_at
            .store(monotonic_millis().max(1), Ordering::Relaxed);
    }

    /// Record corrupt frames dropped by the parser
    pub fn record_discarded(&self, count: u64) {
        self.frames_discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }

    pub fn frames_discarded(&self) -> u64 {
        self.frames_discarded.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Time since the last published frame
    pub fn last_frame_age(&self) -> Option<Duration> {
        match self.last_frame_at.load(Ordering::Relaxed) {
            0 => None,
            at => Some(Duration::from_millis(monotonic_millis().saturating_sub(at))),
        }
    }
}

/// Snapshot of an upstream source
#[derive(Debug, Clone)]
pub struct SourceStats {
    /// Stream name
    pub name: String,
    /// Connection state
    pub state: ConnectionState,
    /// Whether the stream is administratively disabled
    pub disabled: bool,
    /// Registered consumers
    pub consumers: usize,
    /// Frames published since the source was created
    pub frames_published: u64,
    /// Corrupt frames dropped
    pub frames_discarded: u64,
    /// Payload bytes received
    pub bytes_received: u64,
    /// Reason of the last reader failure
    pub last_error: Option<String>,
    /// Time since the last frame
    pub last_frame_age: Option<Duration>,
}

/// Per-viewer session statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Frames written to the viewer
    pub frames_written: u64,
    /// Frames skipped by rate limiting or queue overflow
    pub frames_dropped: u64,
    /// Bytes written to the viewer
    pub bytes_sent: u64,
    /// Session start time
    pub started_at: Instant,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            frames_written: 0,
            frames_dropped: 0,
            bytes_sent: 0,
            started_at: Instant::now(),
        }
    }

    /// Record a written frame
    pub fn record_written(&mut self, bytes: usize) {
        self.frames_written += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record a dropped frame
    pub fn record_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    /// Session duration
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average output bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_counters() {
        let counters = SourceCounters::new();
        assert!(counters.last_frame_age().is_none());

        counters.record_frame(100);
        counters.record_frame(50);
        counters.record_discarded(2);

        assert_eq!(counters.frames_published(), 2);
        assert_eq!(counters.bytes_received(), 150);
        assert_eq!(counters.frames_discarded(), 2);
        assert!(counters.last_frame_age().is_some());
    }

    #[test]
    fn test_session_stats() {
        let mut stats = SessionStats::new();
        stats.record_written(1000);
        stats.record_written(500);
        stats.record_dropped();

        assert_eq!(stats.frames_written, 2);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.bytes_sent, 1500);
    }

    #[test]
    fn test_session_bitrate_zero_duration() {
        let mut stats = SessionStats::new();
        stats.record_written(1_000_000);

        // Less than a second elapsed
        assert_eq!(stats.bitrate(), 0);
    }
}
