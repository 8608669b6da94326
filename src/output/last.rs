//! Last known frame output
//!
//! Answers with the most recent frame without registering, so it never
//! starts an on-demand reader.

use std::sync::Arc;

use axum::http::StatusCode;

use super::release::SessionRelease;
use super::response::HttpResponse;
use crate::error::Result;
use crate::params::RequestParams;
use crate::source::UpstreamSource;
use crate::stats::SessionStats;
use crate::transform::PipelineRegistry;

/// Write the source's last frame, or `204 No Content` if there is none
pub async fn write_last_frame(
    source: Arc<UpstreamSource>,
    pipelines: Arc<PipelineRegistry>,
    params: &RequestParams,
    mut response: HttpResponse,
) -> Result<SessionStats> {
    let mut stats = SessionStats::new();

    let Some(frame) = source.last_frame() else {
        response.write_status(StatusCode::NO_CONTENT)?;
        return Ok(stats);
    };

    let release = SessionRelease::acquire(Arc::clone(&source), pipelines, params);
    let transformed = release.pipeline().transform_blocking(frame.clone()).await;
    drop(release);

    let frame = match transformed {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(stream = %source.name(), error = %e, "Transform failed, sending original frame");
            frame
        }
    };

    let n = response.write_single(&frame).await?;
    stats.record_written(n);
    Ok(stats)
}
