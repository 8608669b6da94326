//! Overlay colour parsing

use image::Rgba;

use crate::error::TransformError;

/// Opaque white, used when no colour is given
pub const WHITE: Rgba<u8> = Rgba([0xFF, 0xFF, 0xFF, 0xFF]);

/// Opaque black
pub const BLACK: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0xFF]);

/// Parse `rgb(r,g,b)`, `rgba(r,g,b,a)` or `rrggbb` (optionally `#`-prefixed)
///
/// Components are 0-255. An empty string is white.
pub fn parse_color(value: &str) -> Result<Rgba<u8>, TransformError> {
    let value = value.trim();
    let invalid = || TransformError::invalid("color", value);

    if value.is_empty() {
        return Ok(WHITE);
    }

    let lower = value.to_ascii_lowercase();
    if let Some(body) = lower.strip_prefix("rgba(") {
        let [r, g, b, a] = components::<4>(body).ok_or_else(invalid)?;
        return Ok(Rgba([r, g, b, a]));
    }
    if let Some(body) = lower.strip_prefix("rgb(") {
        let [r, g, b] = components::<3>(body).ok_or_else(invalid)?;
        return Ok(Rgba([r, g, b, 0xFF]));
    }

    let hex = lower.strip_prefix('#').unwrap_or(&lower);
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 0xFF]))
}

fn components<const N: usize>(body: &str) -> Option<[u8; N]> {
    let body = body.strip_suffix(')')?;
    let mut out = [0u8; N];
    let mut parts = body.split(',');

    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_formats() {
        assert_eq!(parse_color("").unwrap(), WHITE);
        assert_eq!(parse_color("rgb(255, 0, 10)").unwrap(), Rgba([255, 0, 10, 255]));
        assert_eq!(parse_color("rgba(1,2,3,128)").unwrap(), Rgba([1, 2, 3, 128]));
        assert_eq!(parse_color("00ff7f").unwrap(), Rgba([0, 255, 127, 255]));
        assert_eq!(parse_color("#FF0000").unwrap(), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_invalid_colors() {
        assert!(parse_color("rgb(300,0,0)").is_err());
        assert!(parse_color("rgb(1,2)").is_err());
        assert!(parse_color("rgba(1,2,3,4,5)").is_err());
        assert!(parse_color("red").is_err());
        assert!(parse_color("12345").is_err());
        assert!(parse_color("zzzzzz").is_err());
    }
}
