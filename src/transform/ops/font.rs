//! Built-in 5x7 bitmap font for overlay text
//!
//! Covers digits and the separators used by timestamps. Other characters
//! render as blanks.

use image::{Rgba, RgbImage};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: usize = 7;

/// Rows top to bottom, bit 4 is the leftmost column
fn glyph(c: char) -> [u8; GLYPH_HEIGHT] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0; 7],
    }
}

/// Width in pixels of `text` rendered at `scale`
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        0
    } else {
        (n * (GLYPH_WIDTH + 1) - 1) * scale
    }
}

/// Draw `text` with its top-left corner at (`x`, `y`), alpha-blending `color`
///
/// Pixels falling outside the image are clipped.
pub fn draw_text(image: &mut RgbImage, text: &str, x: u32, y: u32, scale: u32, color: Rgba<u8>) {
    let scale = scale.max(1);
    let (width, height) = image.dimensions();
    let alpha = color[3] as u32;

    for (i, c) in text.chars().enumerate() {
        let origin_x = x + i as u32 * (GLYPH_WIDTH + 1) * scale;
        if origin_x >= width {
            break;
        }

        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }

                let px = origin_x + col * scale;
                let py = y + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        let (tx, ty) = (px + dx, py + dy);
                        if tx >= width || ty >= height {
                            continue;
                        }

                        let pixel = image.get_pixel_mut(tx, ty);
                        for ch in 0..3 {
                            let blended = (color[ch] as u32 * alpha
                                + pixel[ch] as u32 * (255 - alpha)
                                + 127)
                                / 255;
                            pixel[ch] = blended as u8;
                        }
                    }
                }
            }
        }
    }
}
