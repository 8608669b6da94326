//! Perspective warp

use std::str::FromStr;

use image::{Rgb, RgbImage};

use crate::error::TransformError;

/// Compass directions walked when filling holes
const DIRECTIONS: [(i64, i64); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Warp by a row-major 3x3 homogeneous matrix of nine comma separated values
///
/// Each source pixel is projected into the output. Output pixels that
/// receive nothing are filled with the average of the nearest projected
/// pixel in each of the eight compass directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perspective {
    pub matrix: [f64; 9],
}

impl Perspective {
    /// Project a point, `None` where the homogeneous weight is zero
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let m = &self.matrix;
        let w = m[6] * x + m[7] * y + m[8];
        if w == 0.0 || !w.is_finite() {
            return None;
        }
        Some((
            (m[0] * x + m[1] * y + m[2]) / w,
            (m[3] * x + m[4] * y + m[5]) / w,
        ))
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return image;
        }

        let mut out = RgbImage::new(w, h);
        let mut written = vec![false; (w * h) as usize];
        let (max_x, max_y) = ((w - 1) as f64, (h - 1) as f64);

        for (x, y, pixel) in image.enumerate_pixels() {
            let Some((px, py)) = self.project(x as f64, y as f64) else {
                continue;
            };
            if !px.is_finite() || !py.is_finite() {
                continue;
            }

            let tx = px.floor().clamp(0.0, max_x) as u32;
            let ty = py.floor().clamp(0.0, max_y) as u32;
            out.put_pixel(tx, ty, *pixel);
            written[(ty * w + tx) as usize] = true;
        }

        fill_holes(&mut out, &written);
        out
    }
}

fn fill_holes(image: &mut RgbImage, written: &[bool]) {
    let (w, h) = image.dimensions();
    let source = image.clone();

    for y in 0..h {
        for x in 0..w {
            if written[(y * w + x) as usize] {
                continue;
            }

            let mut sum = [0u32; 3];
            let mut found = 0;

            for (dx, dy) in DIRECTIONS {
                let (mut cx, mut cy) = (x as i64 + dx, y as i64 + dy);
                while cx >= 0 && cy >= 0 && cx < w as i64 && cy < h as i64 {
                    if written[(cy as u32 * w + cx as u32) as usize] {
                        let p = source.get_pixel(cx as u32, cy as u32);
                        for (s, v) in sum.iter_mut().zip(p.0) {
                            *s += v as u32;
                        }
                        found += 1;
                        break;
                    }
                    cx += dx;
                    cy += dy;
                }
            }

            if found > 0 {
                image.put_pixel(
                    x,
                    y,
                    Rgb([
                        (sum[0] / found) as u8,
                        (sum[1] / found) as u8,
                        (sum[2] / found) as u8,
                    ]),
                );
            }
        }
    }
}

impl FromStr for Perspective {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransformError::invalid("perspective", s);

        let values: Vec<f64> = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;

        let matrix: [f64; 9] = values.try_into().map_err(|_| invalid())?;
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(invalid());
        }

        Ok(Perspective { matrix })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: &str = "1,0,0,0,1,0,0,0,1";

    #[test]
    fn test_parse() {
        let op: Perspective = IDENTITY.parse().unwrap();
        assert_eq!(op.matrix[0], 1.0);
        assert_eq!(op.matrix[8], 1.0);

        assert!("1,0,0,0,1,0,0,0".parse::<Perspective>().is_err());
        assert!("1,0,0,0,1,0,0,0,x".parse::<Perspective>().is_err());
    }

    #[test]
    fn test_identity_keeps_pixels() {
        let image = RgbImage::from_fn(8, 6, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 0]));
        let out = IDENTITY.parse::<Perspective>().unwrap().apply(image.clone());
        assert_eq!(out, image);
    }

    #[test]
    fn test_black_pixels_not_holes() {
        // A genuinely black source must stay black after an identity warp
        let image = RgbImage::new(4, 4);
        let out = IDENTITY.parse::<Perspective>().unwrap().apply(image.clone());
        assert_eq!(out, image);
    }

    #[test]
    fn test_scale_up_fills_holes() {
        let image = RgbImage::from_pixel(4, 4, Rgb([200, 100, 50]));
        let out = "2,0,0,0,2,0,0,0,1".parse::<Perspective>().unwrap().apply(image);

        // Every second pixel is projected, the rest are filled
        for pixel in out.pixels() {
            assert_eq!(pixel, &Rgb([200, 100, 50]));
        }
    }
}
