//! Session resources released on every exit path

use std::sync::Arc;

use crate::params::RequestParams;
use crate::source::{Frame, Subscription, UpstreamSource};
use crate::transform::{PipelineRegistry, TransformPipeline};

/// A session's pipeline and, once registered, its subscription
///
/// [`finish`](SessionRelease::finish) unregisters in line. If the session
/// is dropped instead (panic, cancelled future, aborted task) the
/// unregistration is spawned on the current runtime. The pipeline goes back
/// to the registry on drop either way.
pub(crate) struct SessionRelease {
    source: Arc<UpstreamSource>,
    pipelines: Arc<PipelineRegistry>,
    pipeline: Arc<TransformPipeline>,
    subscription: Option<Subscription>,
}

impl SessionRelease {
    /// Acquire the pipeline for `params` on `source`
    pub fn acquire(
        source: Arc<UpstreamSource>,
        pipelines: Arc<PipelineRegistry>,
        params: &RequestParams,
    ) -> Self {
        let pipeline = pipelines.get(source.name(), params);
        Self {
            source,
            pipelines,
            pipeline,
            subscription: None,
        }
    }

    pub fn source(&self) -> &Arc<UpstreamSource> {
        &self.source
    }

    pub fn pipeline(&self) -> &Arc<TransformPipeline> {
        &self.pipeline
    }

    /// Register with the source; `false` if it refused
    pub async fn register(&mut self) -> bool {
        self.subscription = self.source.register().await;
        self.subscription.is_some()
    }

    /// Next new frame; `None` when unregistered or the source stopped
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.subscription.as_mut()?.next_frame().await
    }

    /// Unregister now and return the pipeline
    pub async fn finish(mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.source.unregister(subscription).await;
        }
    }
}

impl Drop for SessionRelease {
    fn drop(&mut self) {
        self.pipelines.unget(&self.pipeline);

        let Some(subscription) = self.subscription.take() else {
            return;
        };
        let source = Arc::clone(&self.source);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(stream = %source.name(), "Session dropped while registered");
                handle.spawn(async move { source.unregister(subscription).await });
            }
            Err(_) => {
                tracing::warn!(stream = %source.name(), "No runtime to unregister a dropped session");
            }
        }
    }
}
