//! Frame transform operations
//!
//! A closed set: each request key maps to one variant of [`TransformOp`].

pub mod barrel;
pub mod color;
pub mod crop;
pub mod font;
pub mod overlay;
pub mod perspective;
pub mod quality;
pub mod resize;
pub mod rotate;

use image::RgbImage;

pub use barrel::Barrel;
pub use crop::Crop;
pub use overlay::{SequenceOverlay, TimestampOverlay};
pub use perspective::Perspective;
pub use quality::Quality;
pub use resize::Resize;
pub use rotate::Rotate;

use crate::error::TransformError;
use crate::source::Frame;

/// Largest width or height an operation may produce
pub const MAX_DIMENSION: u32 = 16384;

/// Canonical request keys that select an operation
pub const OP_KEYS: [&str; 8] = [
    "size",
    "rotate",
    "crop",
    "barrel",
    "perspective",
    "quality",
    "timestamp",
    "sequence",
];

/// One configured transform operation
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    Resize(Resize),
    Rotate(Rotate),
    Crop(Crop),
    Barrel(Barrel),
    Perspective(Perspective),
    Quality(Quality),
    Timestamp(TimestampOverlay),
    Sequence(SequenceOverlay),
}

impl TransformOp {
    /// Build the operation for a canonical key
    ///
    /// Returns `None` for keys that do not name an operation.
    pub fn parse(key: &str, value: &str) -> Option<Result<Self, TransformError>> {
        let op = match key {
            "size" => value.parse().map(TransformOp::Resize),
            "rotate" => value.parse().map(TransformOp::Rotate),
            "crop" => value.parse().map(TransformOp::Crop),
            "barrel" => value.parse().map(TransformOp::Barrel),
            "perspective" => value.parse().map(TransformOp::Perspective),
            "quality" => value.parse().map(TransformOp::Quality),
            "timestamp" => value.parse().map(TransformOp::Timestamp),
            "sequence" => value.parse().map(TransformOp::Sequence),
            _ => return None,
        };
        Some(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::Resize(_) => "size",
            TransformOp::Rotate(_) => "rotate",
            TransformOp::Crop(_) => "crop",
            TransformOp::Barrel(_) => "barrel",
            TransformOp::Perspective(_) => "perspective",
            TransformOp::Quality(_) => "quality",
            TransformOp::Timestamp(_) => "timestamp",
            TransformOp::Sequence(_) => "sequence",
        }
    }

    /// Text overlays are drawn after every geometric operation
    pub fn is_overlay(&self) -> bool {
        matches!(self, TransformOp::Timestamp(_) | TransformOp::Sequence(_))
    }

    /// Encoder quality requested by this operation
    pub fn encoder_quality(&self) -> Option<u8> {
        match self {
            TransformOp::Quality(q) => Some(q.encoder_quality()),
            _ => None,
        }
    }

    pub fn apply(&self, image: RgbImage, frame: &Frame) -> RgbImage {
        match self {
            TransformOp::Resize(op) => op.apply(image),
            TransformOp::Rotate(op) => op.apply(image),
            TransformOp::Crop(op) => op.apply(image),
            TransformOp::Barrel(op) => op.apply(image),
            TransformOp::Perspective(op) => op.apply(image),
            TransformOp::Quality(_) => image,
            TransformOp::Timestamp(op) => op.apply(image),
            TransformOp::Sequence(op) => op.apply(image, frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dispatch() {
        for key in OP_KEYS {
            let value = match key {
                "size" => "10x10",
                "rotate" => "90",
                "crop" => "0,0,1,1",
                "barrel" => "1",
                "perspective" => "1,0,0,0,1,0,0,0,1",
                "quality" => "50",
                _ => "",
            };
            let op = TransformOp::parse(key, value).unwrap().unwrap();
            assert_eq!(op.name(), key);
        }

        assert!(TransformOp::parse("fr", "5").is_none());
        assert!(TransformOp::parse("size", "big").unwrap().is_err());
    }

    #[test]
    fn test_overlay_and_quality() {
        let ts = TransformOp::parse("timestamp", "").unwrap().unwrap();
        let q = TransformOp::parse("quality", "30").unwrap().unwrap();

        assert!(ts.is_overlay());
        assert!(!q.is_overlay());
        assert_eq!(q.encoder_quality(), Some(30));
        assert_eq!(ts.encoder_quality(), None);
    }
}
