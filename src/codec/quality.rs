//! Source JPEG quality estimation
//!
//! Re-encoding at a fixed quality would bloat low-quality camera frames, so
//! pipelines without an explicit quality reuse the source's. The quality is
//! recovered from the luminance quantisation table by inverting the libjpeg
//! scaling rule.

/// Quality used when the source quality cannot be determined
pub const DEFAULT_QUALITY: u8 = 85;

/// libjpeg base luminance table (order does not matter for the sum)
const STD_LUMINANCE: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69,
    56, 14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104,
    113, 92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;

/// Estimate the encode quality (1-100) of a JPEG
pub fn estimate_quality(data: &[u8]) -> Option<u8> {
    let table = luminance_table(data)?;

    let sum: u32 = table.iter().map(|&v| v as u32).sum();
    let std_sum: u32 = STD_LUMINANCE.iter().map(|&v| v as u32).sum();
    let scale = sum as f64 * 100.0 / std_sum as f64;

    let quality = if scale <= 100.0 {
        (200.0 - scale) / 2.0
    } else {
        5000.0 / scale
    };

    Some(quality.round().clamp(1.0, 100.0) as u8)
}

/// Find quantisation table 0 in the marker segments before the scan
fn luminance_table(data: &[u8]) -> Option<Vec<u16>> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            // Fill byte
            pos += 1;
            continue;
        }
        if marker == SOS {
            return None;
        }

        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > data.len() {
            return None;
        }

        if marker == DQT {
            if let Some(table) = table_zero(&data[pos + 4..end]) {
                return Some(table);
            }
        }

        pos = end;
    }

    None
}

/// A DQT segment may hold several tables
fn table_zero(mut segment: &[u8]) -> Option<Vec<u16>> {
    while let Some((&info, rest)) = segment.split_first() {
        let precision = info >> 4;
        let id = info & 0x0F;
        let size = if precision == 0 { 64 } else { 128 };
        if rest.len() < size {
            return None;
        }

        if id == 0 {
            let values = if precision == 0 {
                rest[..64].iter().map(|&v| v as u16).collect()
            } else {
                rest[..128]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect()
            };
            return Some(values);
        }

        segment = &rest[size..];
    }

    None
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::codec::{Codec, PortableCodec};

    fn encoded(quality: u8) -> bytes::Bytes {
        let image = RgbImage::from_pixel(16, 16, Rgb([90, 120, 200]));
        PortableCodec::new().encode(&image, quality).unwrap()
    }

    #[test]
    fn test_estimate_matches_encoder() {
        for quality in [30u8, 50, 75, 90] {
            let estimate = estimate_quality(&encoded(quality)).unwrap();
            assert!(
                (estimate as i32 - quality as i32).abs() <= 3,
                "quality {} estimated as {}",
                quality,
                estimate
            );
        }
    }

    #[test]
    fn test_not_a_jpeg() {
        assert_eq!(estimate_quality(b"\x89PNG\r\n"), None);
        assert_eq!(estimate_quality(&[]), None);
        // SOI then straight to scan
        assert_eq!(estimate_quality(&[0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02]), None);
    }
}
