//! MJPEG multipart parser
//!
//! Upstream cameras send `multipart/x-mixed-replace` bodies:
//!
//! ```text
//! --<boundary>\r\n
//! content-type: image/jpeg\r\n
//! content-length: <n>\r\n
//! \r\n
//! <n bytes: FF D8 ... FF D9>
//! --<boundary>\r\n
//! ...
//! ```
//!
//! Anything between the end of a payload and the next boundary line is
//! skipped. JPEG payloads whose SOI/EOI markers are wrong are dropped without
//! consuming a sequence number; every other deviation is fatal.

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use super::frame::Frame;
use crate::error::{ParseError, Result};

/// Largest `content-length` accepted for one part
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

/// Extract the multipart boundary from a `Content-Type` header value
///
/// Returns the delimiter line as it appears in the body, i.e. prefixed
/// with `--`.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    const TAG: &str = "boundary=";

    let pos = content_type.to_ascii_lowercase().find(TAG)?;
    let rest = &content_type[pos + TAG.len()..];
    let value = match rest.find(';') {
        Some(end) => &rest[..end],
        None => rest,
    };
    let value = value.trim().trim_matches('"');

    if value.is_empty() {
        None
    } else {
        Some(format!("--{}", value))
    }
}

/// Incremental parser turning an upstream body into frames
pub struct FrameParser<R> {
    reader: BufReader<R>,
    boundary: String,
    sequence: u64,
    discarded: u64,
}

impl<R: AsyncRead + Unpin> FrameParser<R> {
    /// Create a parser for a body delimited by `boundary` (including `--`)
    pub fn new(reader: R, boundary: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            boundary: boundary.into(),
            sequence: 0,
            discarded: 0,
        }
    }

    /// Boundary line this parser looks for
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Number of corrupt frames dropped so far
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Read the next valid frame
    pub async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            self.skip_to_boundary().await?;

            let mime = self.read_content_type().await?;
            let size = self.read_content_length().await?;

            // Blank separator line
            self.read_line().await?.ok_or(ParseError::UnexpectedEof)?;

            let data = self.read_payload(size).await?;

            if Frame::is_jpeg_mime(&mime) && !Frame::has_jpeg_markers(&data) {
                self.discarded += 1;
                tracing::debug!(
                    size = size,
                    discarded = self.discarded,
                    "JPEG frame has incorrect SOI/EOI markers, discarding"
                );
                continue;
            }

            let frame = Frame::new(mime, data, self.sequence);
            self.sequence += 1;
            return Ok(frame);
        }
    }

    async fn skip_to_boundary(&mut self) -> Result<()> {
        loop {
            match self.read_line().await? {
                Some(line) if line == self.boundary => return Ok(()),
                Some(_) => continue,
                None => return Err(ParseError::UnexpectedEof.into()),
            }
        }
    }

    async fn read_content_type(&mut self) -> Result<String> {
        let line = self.read_line().await?.ok_or(ParseError::UnexpectedEof)?;
        match header_value(&line, "content-type:") {
            Some(mime) => Ok(mime.to_string()),
            None => Err(ParseError::MissingContentType(line).into()),
        }
    }

    async fn read_content_length(&mut self) -> Result<usize> {
        let line = self.read_line().await?.ok_or(ParseError::UnexpectedEof)?;
        let value = header_value(&line, "content-length:")
            .ok_or_else(|| ParseError::MissingContentLength(line.clone()))?;

        match value.parse::<usize>() {
            Ok(size) if size <= MAX_FRAME_SIZE => Ok(size),
            _ => Err(ParseError::InvalidContentLength(value.to_string()).into()),
        }
    }

    async fn read_payload(&mut self, size: usize) -> Result<Bytes> {
        // Grows with what actually arrives
        let mut buf = Vec::with_capacity(size.min(64 * 1024));
        let read = (&mut self.reader)
            .take(size as u64)
            .read_to_end(&mut buf)
            .await?;

        if read != size {
            return Err(ParseError::ShortRead {
                expected: size,
                read,
            }
            .into());
        }

        Ok(Bytes::from(buf))
    }

    /// Read one line, trimmed. `None` at end of stream.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        let n = self.reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Ok(None);
        }

        Ok(Some(String::from_utf8_lossy(&line).trim().to_string()))
    }
}

/// Value of a `name: value` line when the name matches case-insensitively
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let prefix = line.get(..name.len())?;
    if prefix.eq_ignore_ascii_case(name) {
        Some(line[name.len()..].trim())
    } else {
        None
    }
}
