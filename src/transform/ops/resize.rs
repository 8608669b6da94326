//! Resize operation

use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::MAX_DIMENSION;
use crate::error::TransformError;

/// Scale to `<width>x<height>[,keepRatio]`
///
/// Either dimension may be left empty (`320x`), in which case it follows
/// the source aspect ratio. With `keepRatio` the image is scaled uniformly
/// to fit inside the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub keep_ratio: bool,
}

impl Resize {
    /// Output dimensions for a source of `src_w` x `src_h`
    pub fn target_size(&self, src_w: u32, src_h: u32) -> (u32, u32) {
        let (sw, sh) = (src_w as f64, src_h as f64);

        let (w, h) = match (self.width, self.height) {
            (Some(w), Some(h)) if self.keep_ratio => {
                let scale = (w as f64 / sw).min(h as f64 / sh);
                ((sw * scale).floor() as u32, (sh * scale).floor() as u32)
            }
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, (sh * w as f64 / sw).round() as u32),
            (None, Some(h)) => ((sw * h as f64 / sh).round() as u32, h),
            (None, None) => (src_w, src_h),
        };

        (w.clamp(1, MAX_DIMENSION), h.clamp(1, MAX_DIMENSION))
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        let (src_w, src_h) = image.dimensions();
        let (w, h) = self.target_size(src_w, src_h);

        if (w, h) == (src_w, src_h) {
            return image;
        }
        imageops::resize(&image, w, h, FilterType::Triangle)
    }
}

impl FromStr for Resize {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransformError::invalid("size", s);

        let mut parts = s.split(',');
        let dims = parts.next().unwrap_or_default().trim();
        let keep_ratio = match parts.next().map(str::trim) {
            None => false,
            Some(flag) if flag.eq_ignore_ascii_case("keepRatio") => true,
            Some(_) => return Err(invalid()),
        };

        let (w, h) = dims
            .split_once(|c| c == 'x' || c == 'X')
            .ok_or_else(invalid)?;

        let dimension = |v: &str| -> Result<Option<u32>, TransformError> {
            let v = v.trim();
            if v.is_empty() {
                return Ok(None);
            }
            match v.parse::<u32>() {
                Ok(n) if n > 0 && n <= MAX_DIMENSION => Ok(Some(n)),
                _ => Err(invalid()),
            }
        };

        let resize = Resize {
            width: dimension(w)?,
            height: dimension(h)?,
            keep_ratio,
        };
        if resize.width.is_none() && resize.height.is_none() {
            return Err(invalid());
        }

        Ok(resize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let op: Resize = "320x240".parse().unwrap();
        assert_eq!((op.width, op.height, op.keep_ratio), (Some(320), Some(240), false));

        let op: Resize = "200x100,keepRatio".parse().unwrap();
        assert!(op.keep_ratio);

        let op: Resize = "320x".parse().unwrap();
        assert_eq!((op.width, op.height), (Some(320), None));

        assert!("x".parse::<Resize>().is_err());
        assert!("320".parse::<Resize>().is_err());
        assert!("0x10".parse::<Resize>().is_err());
        assert!("10x10,stretch".parse::<Resize>().is_err());
    }

    #[test]
    fn test_dimension_limit() {
        assert!("16384x16384".parse::<Resize>().is_ok());
        assert!("16385x10".parse::<Resize>().is_err());
        assert!("10x4000000000".parse::<Resize>().is_err());

        // A derived dimension is clamped too
        let op: Resize = "16384x".parse().unwrap();
        assert_eq!(op.target_size(1, 1000), (16384, MAX_DIMENSION));
    }

    #[test]
    fn test_keep_ratio_fits_box() {
        let op: Resize = "200x100,keepRatio".parse().unwrap();
        let out = op.apply(RgbImage::new(400, 100));
        assert_eq!(out.dimensions(), (200, 50));
    }

    #[test]
    fn test_exact_and_single_dimension() {
        let op: Resize = "100x100".parse().unwrap();
        assert_eq!(op.target_size(400, 100), (100, 100));

        let op: Resize = "x50".parse().unwrap();
        assert_eq!(op.target_size(400, 100), (200, 50));
    }

    #[test]
    fn test_same_size_is_identity() {
        let op: Resize = "64x48".parse().unwrap();
        let mut image = RgbImage::new(64, 48);
        image.put_pixel(3, 3, image::Rgb([1, 2, 3]));

        let out = op.apply(image.clone());
        assert_eq!(out, image);
    }
}
