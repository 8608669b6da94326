//! Crop operation

use std::str::FromStr;

use image::{imageops, RgbImage};

use crate::error::TransformError;

/// Crop to `<x>,<y>,<width>,<height>`
///
/// The region is clamped to the image; the result is at least 1x1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Crop {
    /// Region actually cut from a `w` x `h` image
    pub fn region(&self, w: u32, h: u32) -> (u32, u32, u32, u32) {
        let x = self.x.min(w.saturating_sub(1));
        let y = self.y.min(h.saturating_sub(1));
        let width = self.width.min(w - x).max(1);
        let height = self.height.min(h - y).max(1);
        (x, y, width, height)
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return image;
        }

        let (x, y, width, height) = self.region(w, h);
        if (x, y, width, height) == (0, 0, w, h) {
            return image;
        }
        imageops::crop_imm(&image, x, y, width, height).to_image()
    }
}

impl FromStr for Crop {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<u32> = s
            .split(',')
            .map(|v| v.trim().parse())
            .collect::<Result<_, _>>()
            .map_err(|_| TransformError::invalid("crop", s))?;

        match values[..] {
            [x, y, width, height] if width > 0 && height > 0 => Ok(Crop {
                x,
                y,
                width,
                height,
            }),
            _ => Err(TransformError::invalid("crop", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_parse() {
        let op: Crop = "10, 20, 30, 40".parse().unwrap();
        assert_eq!(
            op,
            Crop {
                x: 10,
                y: 20,
                width: 30,
                height: 40
            }
        );

        assert!("1,2,3".parse::<Crop>().is_err());
        assert!("1,2,0,4".parse::<Crop>().is_err());
        assert!("a,b,c,d".parse::<Crop>().is_err());
    }

    #[test]
    fn test_crop_region() {
        let mut image = RgbImage::new(100, 50);
        image.put_pixel(10, 20, Rgb([7, 7, 7]));

        let out = "10,20,30,10".parse::<Crop>().unwrap().apply(image);
        assert_eq!(out.dimensions(), (30, 10));
        assert_eq!(out.get_pixel(0, 0), &Rgb([7, 7, 7]));
    }

    #[test]
    fn test_crop_clamped() {
        let op: Crop = "90,40,50,50".parse().unwrap();
        assert_eq!(op.region(100, 50), (90, 40, 10, 10));

        let op: Crop = "500,500,10,10".parse().unwrap();
        assert_eq!(op.region(100, 50), (99, 49, 1, 1));
    }
}
