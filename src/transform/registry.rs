//! Shared pipeline registry
//!
//! Pipelines are reference counted by signature. Creation, lookup and
//! release happen under one lock, so two viewers connecting at once with
//! the same parameters always end up on the same instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::codec::CodecKind;
use crate::params::RequestParams;

use super::pipeline::TransformPipeline;
use super::signature;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    source: String,
    signature: Vec<(String, String)>,
}

struct Entry {
    pipeline: Arc<TransformPipeline>,
    refs: usize,
}

/// Registry of live transform pipelines
pub struct PipelineRegistry {
    codec: CodecKind,
    pipelines: Mutex<HashMap<PipelineKey, Entry>>,
}

impl PipelineRegistry {
    /// Create a registry whose pipelines use `codec`
    pub fn new(codec: CodecKind) -> Self {
        Self {
            codec,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the pipeline for `source` and the request's transform parameters
    ///
    /// Every call must be paired with one [`unget`](Self::unget).
    pub fn get(&self, source: &str, params: &RequestParams) -> Arc<TransformPipeline> {
        let key = PipelineKey {
            source: source.to_string(),
            signature: signature(params),
        };

        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = pipelines.get_mut(&key) {
            entry.refs += 1;
            tracing::debug!(stream = %source, refs = entry.refs, "Transform pipeline shared");
            return Arc::clone(&entry.pipeline);
        }

        let pipeline = Arc::new(TransformPipeline::new(
            source,
            key.signature.clone(),
            self.codec,
        ));

        if pipeline.is_transforming() {
            tracing::info!(
                stream = %source,
                ops = pipeline.ops().len(),
                "Transform pipeline created"
            );
        }

        pipelines.insert(
            key,
            Entry {
                pipeline: Arc::clone(&pipeline),
                refs: 1,
            },
        );
        pipeline
    }

    /// Release a pipeline obtained from [`get`](Self::get)
    pub fn unget(&self, pipeline: &Arc<TransformPipeline>) {
        let key = PipelineKey {
            source: pipeline.source().to_string(),
            signature: pipeline.signature().to_vec(),
        };

        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(entry) = pipelines.get_mut(&key) else {
            tracing::warn!(stream = %key.source, "Released unknown transform pipeline");
            return;
        };
        if !Arc::ptr_eq(&entry.pipeline, pipeline) {
            tracing::warn!(stream = %key.source, "Released stale transform pipeline");
            return;
        }

        entry.refs -= 1;
        if entry.refs == 0 {
            pipelines.remove(&key);
            if pipeline.is_transforming() {
                tracing::info!(stream = %key.source, "Transform pipeline released");
            }
        }
    }

    /// Current reference count of a pipeline, 0 if not registered
    pub fn ref_count(&self, pipeline: &Arc<TransformPipeline>) -> usize {
        let key = PipelineKey {
            source: pipeline.source().to_string(),
            signature: pipeline.signature().to_vec(),
        };

        self.pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .filter(|entry| Arc::ptr_eq(&entry.pipeline, pipeline))
            .map_or(0, |entry| entry.refs)
    }

    /// Number of registered pipelines
    pub fn len(&self) -> usize {
        self.pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new(CodecKind::default())
    }
}
