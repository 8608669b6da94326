//! Transform pipeline
//!
//! Decodes a frame, applies its operations in request order (overlays
//! last), and re-encodes. The last result is cached per source frame so
//! viewers sharing the pipeline only pay for the first transform.

use std::sync::{Arc, Mutex, PoisonError};

use crate::codec::{estimate_quality, Codec, CodecKind, DEFAULT_QUALITY};
use crate::error::CodecError;
use crate::source::Frame;

use super::ops::TransformOp;

const OUTPUT_MIME: &str = "image/jpeg";

struct CachedFrame {
    timestamp: u64,
    sequence: u64,
    frame: Frame,
}

/// State touched by `transform`, serialized by one lock
struct PipelineCache {
    codec: Option<Box<dyn Codec>>,
    cached: Option<CachedFrame>,
}

/// A shared, configured chain of transform operations
pub struct TransformPipeline {
    source: String,
    signature: Vec<(String, String)>,
    ops: Vec<TransformOp>,
    quality: Option<u8>,
    codec_kind: CodecKind,
    cache: Mutex<PipelineCache>,
}

impl TransformPipeline {
    /// Build a pipeline from a canonical signature
    ///
    /// Operations whose parameter does not parse are left out.
    pub fn new(
        source: impl Into<String>,
        signature: Vec<(String, String)>,
        codec_kind: CodecKind,
    ) -> Self {
        let source = source.into();

        let mut ops: Vec<TransformOp> = Vec::with_capacity(signature.len());
        for (key, value) in &signature {
            match TransformOp::parse(key, value) {
                Some(Ok(op)) => ops.push(op),
                Some(Err(e)) => {
                    tracing::debug!(stream = %source, error = %e, "Transform operation omitted");
                }
                None => {}
            }
        }

        // Overlays go last; relative order is otherwise kept
        let (mut ordered, overlays): (Vec<_>, Vec<_>) =
            ops.into_iter().partition(|op| !op.is_overlay());
        ordered.extend(overlays);

        let quality = ordered.iter().rev().find_map(TransformOp::encoder_quality);

        Self {
            source,
            signature,
            ops: ordered,
            quality,
            codec_kind,
            cache: Mutex::new(PipelineCache {
                codec: None,
                cached: None,
            }),
        }
    }

    /// Name of the source stream
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Canonical parameters this pipeline was built from
    pub fn signature(&self) -> &[(String, String)] {
        &self.signature
    }

    /// Operations in application order
    pub fn ops(&self) -> &[TransformOp] {
        &self.ops
    }

    pub fn is_transforming(&self) -> bool {
        !self.ops.is_empty()
    }

    /// Transform a frame
    ///
    /// Frames that are not JPEG pass through unchanged. Safe to call from
    /// several threads; calls are serialized.
    pub fn transform(&self, frame: &Frame) -> Result<Frame, CodecError> {
        if !self.is_transforming() || !Frame::is_jpeg_mime(&frame.mime) {
            return Ok(frame.clone());
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = &cache.cached {
            if cached.timestamp == frame.timestamp && cached.sequence == frame.sequence {
                return Ok(cached.frame.clone());
            }
        }

        let kind = self.codec_kind;
        let codec = cache.codec.get_or_insert_with(|| kind.create());

        let mut image = codec.decode(&frame.data)?;
        for op in &self.ops {
            image = op.apply(image, frame);
        }

        let quality = self
            .quality
            .or_else(|| estimate_quality(&frame.data))
            .unwrap_or(DEFAULT_QUALITY);
        let data = codec.encode(&image, quality)?;

        let output = Frame::derived(frame, OUTPUT_MIME, data);
        cache.cached = Some(CachedFrame {
            timestamp: frame.timestamp,
            sequence: frame.sequence,
            frame: output.clone(),
        });

        Ok(output)
    }

    /// Run [`transform`](Self::transform) on the blocking pool
    pub async fn transform_blocking(self: &Arc<Self>, frame: Frame) -> Result<Frame, CodecError> {
        if !self.is_transforming() {
            return Ok(frame);
        }

        let pipeline = Arc::clone(self);
        tokio::task::spawn_blocking(move || pipeline.transform(&frame))
            .await
            .unwrap_or_else(|e| Err(CodecError::Encode(e.to_string())))
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("source", &self.source)
            .field("signature", &self.signature)
            .field("ops", &self.ops)
            .finish()
    }
}
