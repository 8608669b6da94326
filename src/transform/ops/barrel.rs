//! Barrel distortion correction

use std::str::FromStr;

use image::RgbImage;

use crate::error::TransformError;

/// Lens correction `<strength>[,<zoom>]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Barrel {
    pub strength: f64,
    pub zoom: f64,
}

impl Barrel {
    pub fn apply(&self, image: RgbImage) -> RgbImage {
        if self.strength == 0.0 && self.zoom == 1.0 {
            return image;
        }

        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return image;
        }

        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
        let correction_radius = ((w as f64).powi(2) + (h as f64).powi(2)).sqrt() / self.strength;
        let (max_x, max_y) = ((w - 1) as f64, (h - 1) as f64);

        RgbImage::from_fn(w, h, |x, y| {
            let nx = x as f64 - cx;
            let ny = y as f64 - cy;

            let r = (nx * nx + ny * ny).sqrt() / correction_radius;
            let theta = if r == 0.0 { 1.0 } else { r.atan() / r };

            let sx = (cx + theta * nx * self.zoom).clamp(0.0, max_x);
            let sy = (cy + theta * ny * self.zoom).clamp(0.0, max_y);

            *image.get_pixel(sx as u32, sy as u32)
        })
    }
}

impl FromStr for Barrel {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransformError::invalid("barrel", s);

        let mut parts = s.split(',').map(|v| v.trim().parse::<f64>());
        let strength = parts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
        let zoom = match parts.next() {
            Some(zoom) => zoom.map_err(|_| invalid())?,
            None => 1.0,
        };

        if parts.next().is_some() || !strength.is_finite() || !zoom.is_finite() || zoom <= 0.0 {
            return Err(invalid());
        }

        Ok(Barrel { strength, zoom })
    }
}
