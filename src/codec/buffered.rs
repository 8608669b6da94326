//! Codec decoding straight to RGB and reusing its encode buffer

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{ColorType, DynamicImage, ImageDecoder, RgbImage};

use super::Codec;
use crate::error::CodecError;

/// Decodes RGB JPEGs without an intermediate `DynamicImage`
///
/// The encode buffer keeps its capacity between frames, so a pipeline
/// producing similar-sized output allocates once.
#[derive(Debug, Default)]
pub struct BufferedCodec {
    out: Vec<u8>,
}

impl BufferedCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for BufferedCodec {
    fn decode(&mut self, data: &[u8]) -> Result<RgbImage, CodecError> {
        let decode_err = |e: image::ImageError| CodecError::Decode(e.to_string());

        let decoder = JpegDecoder::new(Cursor::new(data)).map_err(decode_err)?;
        let (width, height) = decoder.dimensions();

        if decoder.color_type() != ColorType::Rgb8 {
            // Greyscale and CMYK go through the generic conversion
            return DynamicImage::from_decoder(decoder)
                .map(|image| image.into_rgb8())
                .map_err(decode_err);
        }

        let mut pixels = vec![0u8; decoder.total_bytes() as usize];
        decoder.read_image(&mut pixels).map_err(decode_err)?;

        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| CodecError::Decode("pixel buffer size mismatch".into()))
    }

    fn encode(&mut self, image: &RgbImage, quality: u8) -> Result<Bytes, CodecError> {
        self.out.clear();
        JpegEncoder::new_with_quality(&mut self.out, quality.clamp(1, 100))
            .encode_image(image)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&self.out))
    }
}
