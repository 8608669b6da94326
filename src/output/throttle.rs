//! Frame rate limiting for multipart sessions

use std::time::{Duration, Instant};

use crate::params::RequestParams;
use crate::source::Frame;

/// Drops frames arriving sooner than the session's minimum interval
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_sent: Option<Instant>,
    send_sequence: bool,
    sequence_offset: Option<u64>,
}

impl Throttle {
    /// Limit to `frame_rate` frames per second (0 = unlimited)
    pub fn new(frame_rate: u32, send_sequence: bool) -> Self {
        let interval = if frame_rate > 0 {
            Duration::from_millis(1000 / frame_rate as u64)
        } else {
            Duration::ZERO
        };

        Self {
            interval,
            last_sent: None,
            send_sequence,
            sequence_offset: None,
        }
    }

    /// No rate limit and no sequence header
    pub fn unlimited() -> Self {
        Self::new(0, false)
    }

    /// Configure from `frame_rate`/`fr` and `sequence`/`seq`
    pub fn from_params(params: &RequestParams) -> Self {
        let frame_rate = params.parse_any(&["frame_rate", "fr"]).unwrap_or(0);
        let send_sequence = params.get_any(&["sequence", "seq"]).is_some();
        Self::new(frame_rate, send_sequence)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide whether to emit `frame` now
    pub fn will_write(&mut self, frame: &Frame) -> bool {
        self.will_write_at(frame, Instant::now())
    }

    /// Decide whether to emit `frame` at `now`
    ///
    /// The first frame is always accepted and fixes the sequence offset.
    pub fn will_write_at(&mut self, frame: &Frame, now: Instant) -> bool {
        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }

        if self.sequence_offset.is_none() {
            self.sequence_offset = Some(frame.sequence);
        }
        self.last_sent = Some(now);
        true
    }

    /// `frame-sequence` header value, if requested
    pub fn sequence_header(&self, frame: &Frame) -> Option<u64> {
        if !self.send_sequence {
            return None;
        }
        let offset = self.sequence_offset.unwrap_or(frame.sequence);
        Some(frame.sequence.saturating_sub(offset))
    }
}
