//! Rotate operation

use std::f64::consts::TAU;
use std::str::FromStr;

use image::{Rgb, RgbImage};

use super::MAX_DIMENSION;
use crate::error::TransformError;

/// Rotate clockwise by `<angle>[rad][,clip]`
///
/// The angle is in degrees unless suffixed with `rad`. Without `clip` the
/// canvas grows to the rotated bounding box; uncovered pixels are black.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotate {
    pub radians: f64,
    pub clip: bool,
}

impl Rotate {
    /// Canvas size for a source of `w` x `h`, at most [`MAX_DIMENSION`] a side
    pub fn canvas_size(&self, w: u32, h: u32) -> (u32, u32) {
        if self.clip {
            return (w, h);
        }

        let (sin, cos) = self.radians.sin_cos();
        let (w, h) = (w as f64, h as f64);
        let cw = (w * cos).abs() + (h * sin).abs();
        let ch = (w * sin).abs() + (h * cos).abs();

        let side = |v: f64| (v.round() as u32).clamp(1, MAX_DIMENSION);
        (side(cw), side(ch))
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        let turn = self.radians.rem_euclid(TAU);
        if turn < 1e-9 || TAU - turn < 1e-9 {
            return image;
        }

        let (w, h) = image.dimensions();
        let (cw, ch) = self.canvas_size(w, h);
        let (sin, cos) = self.radians.sin_cos();

        let (src_cx, src_cy) = (w as f64 / 2.0, h as f64 / 2.0);
        let (dst_cx, dst_cy) = (cw as f64 / 2.0, ch as f64 / 2.0);

        RgbImage::from_fn(cw, ch, |x, y| {
            let dx = x as f64 + 0.5 - dst_cx;
            let dy = y as f64 + 0.5 - dst_cy;

            // Inverse rotation back into the source
            let sx = dx * cos + dy * sin + src_cx;
            let sy = -dx * sin + dy * cos + src_cy;

            if sx >= 0.0 && sy >= 0.0 && sx < w as f64 && sy < h as f64 {
                *image.get_pixel(sx as u32, sy as u32)
            } else {
                Rgb([0, 0, 0])
            }
        })
    }
}

impl FromStr for Rotate {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransformError::invalid("rotate", s);

        let mut parts = s.split(',');
        let angle = parts.next().unwrap_or_default().trim();
        let clip = match parts.next().map(str::trim) {
            None => false,
            Some(flag) if flag.eq_ignore_ascii_case("clip") => true,
            Some(_) => return Err(invalid()),
        };

        let lower = angle.to_ascii_lowercase();
        let (value, is_rad) = match lower.strip_suffix("rad") {
            Some(v) => (v.trim(), true),
            None => (lower.as_str(), false),
        };

        let value: f64 = value.parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }

        Ok(Rotate {
            radians: if is_rad { value } else { value.to_radians() },
            clip,
        })
    }
}
