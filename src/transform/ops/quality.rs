//! Output quality

use std::str::FromStr;

use crate::error::TransformError;

/// Re-encode quality `<0-100>`, kept normalised to 0.0-1.0
///
/// Leaves pixels alone; the pipeline reads it when encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality {
    pub value: f32,
}

impl Quality {
    /// Quality handed to the encoder (1-100)
    pub fn encoder_quality(&self) -> u8 {
        (self.value * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl FromStr for Quality {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u8>() {
            Ok(q) if q <= 100 => Ok(Quality {
                value: q as f32 / 100.0,
            }),
            _ => Err(TransformError::invalid("quality", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_encode() {
        let op: Quality = "40".parse().unwrap();
        assert!((op.value - 0.4).abs() < f32::EPSILON);
        assert_eq!(op.encoder_quality(), 40);

        // Zero still encodes at the lowest valid setting
        assert_eq!("0".parse::<Quality>().unwrap().encoder_quality(), 1);
        assert_eq!("100".parse::<Quality>().unwrap().encoder_quality(), 100);

        assert!("101".parse::<Quality>().is_err());
        assert!("-1".parse::<Quality>().is_err());
        assert!("high".parse::<Quality>().is_err());
    }
}
