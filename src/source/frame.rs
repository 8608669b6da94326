//! Frame type shared between the upstream reader and viewers
//!
//! A frame is built once by the parser and never mutated afterwards. It is
//! cheap to clone: the payload is a reference-counted `Bytes`, so every viewer
//! shares the same allocation.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use bytes::Bytes;

/// JPEG start-of-image marker
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// An encoded image frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// MIME type as declared by the upstream part header
    pub mime: Arc<str>,
    /// Encoded image bytes (zero-copy via reference counting)
    pub data: Bytes,
    /// Capture time in monotonic milliseconds
    pub timestamp: u64,
    /// Position in the current upstream connection, starting at 0
    pub sequence: u64,
}

impl Frame {
    /// Create a frame captured now
    pub fn new(mime: impl Into<Arc<str>>, data: Bytes, sequence: u64) -> Self {
        Self {
            mime: mime.into(),
            data,
            timestamp: monotonic_millis(),
            sequence,
        }
    }

    /// Create a frame derived from `source`, keeping its timestamp and sequence
    pub fn derived(source: &Frame, mime: impl Into<Arc<str>>, data: Bytes) -> Self {
        Self {
            mime: mime.into(),
            data,
            timestamp: source.timestamp,
            sequence: source.sequence,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the MIME type names a JPEG image (`jpeg` or `image/jpeg`)
    pub fn is_jpeg_mime(mime: &str) -> bool {
        let mime = mime.trim();
        mime.eq_ignore_ascii_case("jpeg") || mime.eq_ignore_ascii_case("image/jpeg")
    }

    /// Check the SOI and EOI markers of a JPEG payload
    pub fn has_jpeg_markers(data: &[u8]) -> bool {
        data.len() >= 4 && data[..2] == JPEG_SOI && data[data.len() - 2..] == JPEG_EOI
    }
}

/// Milliseconds elapsed on a process-wide monotonic clock
pub fn monotonic_millis() -> u64 {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    ANCHOR.get_or_init(Instant::now).elapsed().as_millis() as u64
}
