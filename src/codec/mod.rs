//! JPEG encode/decode abstraction
//!
//! Transform pipelines decode a frame to RGB pixels, apply their
//! operations and re-encode. The concrete codec is chosen per server with
//! [`CodecKind`]; each pipeline owns its own codec instance, released on
//! drop.

pub mod buffered;
pub mod portable;
pub mod quality;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use image::RgbImage;

pub use buffered::BufferedCodec;
pub use portable::PortableCodec;
pub use quality::{estimate_quality, DEFAULT_QUALITY};

use crate::error::CodecError;

/// A JPEG codec
pub trait Codec: Send {
    /// Decode JPEG bytes to RGB pixels
    fn decode(&mut self, data: &[u8]) -> Result<RgbImage, CodecError>;

    /// Encode RGB pixels at `quality` (1-100)
    fn encode(&mut self, image: &RgbImage, quality: u8) -> Result<Bytes, CodecError>;
}

/// Available codec implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    /// Generic image decode through `DynamicImage`
    Portable,
    /// Direct RGB decode with reused encode buffers
    #[default]
    Buffered,
}

impl CodecKind {
    /// Create a codec instance
    pub fn create(&self) -> Box<dyn Codec> {
        match self {
            CodecKind::Portable => Box::new(PortableCodec::new()),
            CodecKind::Buffered => Box::new(BufferedCodec::new()),
        }
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portable" => Ok(CodecKind::Portable),
            "buffered" => Ok(CodecKind::Buffered),
            other => Err(format!("unknown codec {}", other)),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecKind::Portable => write!(f, "portable"),
            CodecKind::Buffered => write!(f, "buffered"),
        }
    }
}
