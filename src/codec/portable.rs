//! Codec built on the generic `image` decode path

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use super::Codec;
use crate::error::CodecError;

/// Decodes through `DynamicImage`, so any JPEG colour type works
#[derive(Debug, Default)]
pub struct PortableCodec;

impl PortableCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for PortableCodec {
    fn decode(&mut self, data: &[u8]) -> Result<RgbImage, CodecError> {
        image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map(|image| image.into_rgb8())
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(&mut self, image: &RgbImage, quality: u8) -> Result<Bytes, CodecError> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode_image(image)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Bytes::from(out))
    }
}
