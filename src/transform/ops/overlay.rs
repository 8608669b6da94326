//! Text overlays

use std::str::FromStr;

use image::{Rgba, RgbImage};

use super::color::{parse_color, BLACK, WHITE};
use super::font::draw_text;
use crate::error::TransformError;
use crate::params::flag_enabled;
use crate::source::Frame;

/// Wall-clock format drawn by [`TimestampOverlay`]
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

const TIMESTAMP_ORIGIN: (u32, u32) = (10, 10);
const TIMESTAMP_SCALE: u32 = 2;

const SEQUENCE_ORIGIN: (u32, u32) = (40, 40);
const SEQUENCE_SCALE: u32 = 3;

/// Draw the current local time in the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampOverlay;

impl TimestampOverlay {
    pub fn apply(&self, mut image: RgbImage) -> RgbImage {
        let text = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let (x, y) = TIMESTAMP_ORIGIN;
        draw_text(&mut image, &text, x, y, TIMESTAMP_SCALE, BLACK);
        image
    }
}

impl FromStr for TimestampOverlay {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if flag_enabled(s) {
            Ok(TimestampOverlay)
        } else {
            Err(TransformError::invalid("timestamp", s))
        }
    }
}

/// Draw the frame sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceOverlay {
    pub color: Rgba<u8>,
}

impl SequenceOverlay {
    pub fn apply(&self, mut image: RgbImage, frame: &Frame) -> RgbImage {
        let (x, y) = SEQUENCE_ORIGIN;
        draw_text(
            &mut image,
            &frame.sequence.to_string(),
            x,
            y,
            SEQUENCE_SCALE,
            self.color,
        );
        image
    }
}

impl Default for SequenceOverlay {
    fn default() -> Self {
        Self { color: WHITE }
    }
}

impl FromStr for SequenceOverlay {
    type Err = TransformError;

    /// The value is an overlay colour; plain flag values (`true`, `1`) mean white
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_color(s) {
            Ok(color) => Ok(SequenceOverlay { color }),
            Err(_) if flag_enabled(s) => Ok(SequenceOverlay::default()),
            Err(e) => Err(e),
        }
    }
}
