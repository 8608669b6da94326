//! Registered viewer sessions
//!
//! A [`StreamOutput`] registers with its source, pulls frames, filters them
//! through the session [`Throttle`] and transform pipeline, and writes them
//! in one of three shapes:
//!
//! - `Single`: one image, then the response ends
//! - `Throttled`: multipart, written inline as frames arrive
//! - `Buffered`: multipart, handed to a sender task through a drop-oldest
//!   [`FrameQueue`] so a slow client never holds up acquisition
//!
//! Whatever the exit path, the session unregisters from the source and
//! releases its pipeline exactly once.

use std::io;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use super::queue::{FrameQueue, DEFAULT_CAPACITY, MAX_CAPACITY};
use super::release::SessionRelease;
use super::response::HttpResponse;
use super::throttle::Throttle;
use crate::error::{Error, RegistryError, Result};
use crate::params::RequestParams;
use crate::source::{Frame, UpstreamSource};
use crate::stats::SessionStats;
use crate::transform::PipelineRegistry;

/// Output shape of a registered session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Single,
    Throttled,
    Buffered { capacity: usize },
}

impl OutputMode {
    /// Mode for a request format suffix (`jpeg`, `mjpg`, `bjpg`)
    ///
    /// A buffered capacity from `wait` is limited to [`MAX_CAPACITY`].
    pub fn from_format(format: &str, params: &RequestParams) -> Option<Self> {
        match format {
            "jpeg" | "jpg" => Some(OutputMode::Single),
            "mjpg" | "mjpeg" => Some(OutputMode::Throttled),
            "bjpg" => {
                let capacity = params
                    .parse_any::<usize>(&["wait"])
                    .unwrap_or(DEFAULT_CAPACITY)
                    .min(MAX_CAPACITY);
                Some(OutputMode::Buffered { capacity })
            }
            _ => None,
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        OutputMode::from_format(s, &RequestParams::new())
            .ok_or_else(|| format!("unknown output format {}", s))
    }
}

/// Frames accepted by the throttle, transformed
struct AcceptedFrames {
    release: SessionRelease,
    throttle: Throttle,
    session_id: u64,
    dropped: u64,
}

impl AcceptedFrames {
    async fn next(&mut self) -> Option<(Frame, Option<u64>)> {
        loop {
            let frame = self.release.next_frame().await?;

            if !self.throttle.will_write(&frame) {
                self.dropped += 1;
                continue;
            }

            match self.release.pipeline().transform_blocking(frame).await {
                Ok(frame) => {
                    let sequence = self.throttle.sequence_header(&frame);
                    return Some((frame, sequence));
                }
                Err(e) => {
                    tracing::debug!(
                        session_id = self.session_id,
                        error = %e,
                        "Frame transform failed, skipping"
                    );
                    self.dropped += 1;
                }
            }
        }
    }
}

/// A viewer session bound to one upstream source
pub struct StreamOutput {
    mode: OutputMode,
    release: SessionRelease,
    throttle: Throttle,
    response: HttpResponse,
    session_id: u64,
}

impl StreamOutput {
    /// Create a session; acquires the pipeline for the request's transforms
    pub fn new(
        mode: OutputMode,
        source: Arc<UpstreamSource>,
        pipelines: Arc<PipelineRegistry>,
        params: &RequestParams,
        response: HttpResponse,
        session_id: u64,
    ) -> Self {
        let throttle = match mode {
            OutputMode::Single => Throttle::unlimited(),
            _ => Throttle::from_params(params),
        };

        Self {
            mode,
            release: SessionRelease::acquire(source, pipelines, params),
            throttle,
            response,
            session_id,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Run the session to completion
    ///
    /// A refused registration answers `503` and returns
    /// [`RegistryError::StreamDisabled`]. Client disconnects end the session
    /// normally.
    pub async fn handle(self) -> Result<SessionStats> {
        let StreamOutput {
            mode,
            mut release,
            throttle,
            mut response,
            session_id,
        } = self;
        let source = Arc::clone(release.source());

        if !release.register().await {
            drop(release);
            response.write_status(StatusCode::SERVICE_UNAVAILABLE).ok();
            return Err(RegistryError::StreamDisabled(source.name().to_string()).into());
        }

        tracing::debug!(
            session_id = session_id,
            stream = %source.name(),
            mode = ?mode,
            "Viewer session started"
        );

        let mut stats = SessionStats::new();
        let mut frames = AcceptedFrames {
            release,
            throttle,
            session_id,
            dropped: 0,
        };

        let result = match mode {
            OutputMode::Single => write_single(&mut frames, &mut response, &mut stats).await,
            OutputMode::Throttled => write_stream(&mut frames, &mut response, &mut stats).await,
            OutputMode::Buffered { capacity } => {
                write_buffered(&mut frames, response, capacity, &mut stats).await
            }
        };
        stats.frames_dropped += frames.dropped;

        frames.release.finish().await;

        tracing::debug!(
            session_id = session_id,
            stream = %source.name(),
            frames_written = stats.frames_written,
            frames_dropped = stats.frames_dropped,
            bytes_sent = stats.bytes_sent,
            "Viewer session ended"
        );

        match result {
            Ok(()) => Ok(stats),
            Err(e) if e.is_disconnect() => {
                tracing::debug!(session_id = session_id, "Viewer disconnected");
                Ok(stats)
            }
            Err(e) => Err(e),
        }
    }
}

async fn write_single(
    frames: &mut AcceptedFrames,
    response: &mut HttpResponse,
    stats: &mut SessionStats,
) -> Result<()> {
    match frames.next().await {
        Some((frame, _)) => {
            let n = response.write_single(&frame).await?;
            stats.record_written(n);
        }
        None => response.write_status(StatusCode::SERVICE_UNAVAILABLE)?,
    }
    Ok(())
}

async fn write_stream(
    frames: &mut AcceptedFrames,
    response: &mut HttpResponse,
    stats: &mut SessionStats,
) -> Result<()> {
    response.write_multipart_headers()?;

    while let Some((frame, sequence)) = frames.next().await {
        let n = response.write_part(&frame, sequence).await?;
        stats.record_written(n);
    }
    Ok(())
}

async fn write_buffered(
    frames: &mut AcceptedFrames,
    mut response: HttpResponse,
    capacity: usize,
    stats: &mut SessionStats,
) -> Result<()> {
    response.write_multipart_headers()?;

    let queue: Arc<FrameQueue<(Frame, Option<u64>)>> = Arc::new(FrameQueue::new(capacity));
    let cancel = CancellationToken::new();
    // Stops the sender if this future is dropped mid-session
    let _guard = cancel.clone().drop_guard();

    let sender = {
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut sent = SessionStats::new();
            let result = send_queued(&queue, &mut response, &cancel, &mut sent).await;
            // Ends acquisition on write failure
            cancel.cancel();
            (result, sent)
        })
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => match next {
                Some(item) => {
                    if queue.push(item) {
                        frames.dropped += 1;
                        tracing::debug!(session_id = frames.session_id, "Send queue full, dropped oldest frame");
                    }
                }
                None => break,
            },
        }
    }
    queue.close();

    let (result, sent) = sender
        .await
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;
    stats.frames_written += sent.frames_written;
    stats.bytes_sent += sent.bytes_sent;
    result
}

async fn send_queued(
    queue: &FrameQueue<(Frame, Option<u64>)>,
    response: &mut HttpResponse,
    cancel: &CancellationToken,
    sent: &mut SessionStats,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = queue.pop() => next,
        };
        let Some((frame, sequence)) = next else {
            return Ok(());
        };

        let n = response.write_part(&frame, sequence).await?;
        sent.record_written(n);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::output::response::response_channel;
    use crate::source::StreamConfig;

    fn on_demand(url: &str) -> Arc<UpstreamSource> {
        let config = StreamConfig::builder("cam", url)
            .on_demand(true)
            .build()
            .unwrap();
        Arc::new(UpstreamSource::new(config))
    }

    #[test]
    fn test_mode_from_format() {
        let params = RequestParams::from_query("wait=3");
        assert_eq!(OutputMode::from_format("jpeg", &params), Some(OutputMode::Single));
        assert_eq!(OutputMode::from_format("mjpg", &params), Some(OutputMode::Throttled));
        assert_eq!(
            OutputMode::from_format("bjpg", &params),
            Some(OutputMode::Buffered { capacity: 3 })
        );
        assert_eq!(
            "bjpg".parse::<OutputMode>().unwrap(),
            OutputMode::Buffered {
                capacity: DEFAULT_CAPACITY
            }
        );
        assert!(OutputMode::from_format("png", &params).is_none());
    }

    #[test]
    fn test_wait_capacity_limited() {
        let params = RequestParams::from_query("wait=18446744073709551615");
        assert_eq!(
            OutputMode::from_format("bjpg", &params),
            Some(OutputMode::Buffered {
                capacity: MAX_CAPACITY
            })
        );
    }

    #[tokio::test]
    async fn test_huge_wait_releases_session() {
        let source = on_demand("http://127.0.0.1:1/");
        let pipelines = Arc::new(PipelineRegistry::default());
        let params = RequestParams::from_query("wait=18446744073709551615&size=10x10");
        let mode = OutputMode::from_format("bjpg", &params).unwrap();

        let (response, _pending) = response_channel();
        let output = StreamOutput::new(
            mode,
            Arc::clone(&source),
            Arc::clone(&pipelines),
            &params,
            response,
            1,
        );

        let stats = output.handle().await.unwrap();
        assert_eq!(stats.frames_written, 0);
        assert_eq!(source.consumer_count(), 0);
        assert!(pipelines.is_empty());
    }

    #[tokio::test]
    async fn test_refused_registration_releases_pipeline() {
        let source = on_demand("http://127.0.0.1:1/");
        source.disable().await;

        let pipelines = Arc::new(PipelineRegistry::default());
        let params = RequestParams::from_query("size=10x10");
        let (response, pending) = response_channel();
        let output = StreamOutput::new(
            OutputMode::Throttled,
            Arc::clone(&source),
            Arc::clone(&pipelines),
            &params,
            response,
            1,
        );
        assert_eq!(pipelines.len(), 1);

        let result = output.handle().await;
        assert!(matches!(
            result,
            Err(Error::Registry(RegistryError::StreamDisabled(_)))
        ));
        assert!(pipelines.is_empty());

        let answer = pending.into_response(Duration::from_secs(1)).await;
        assert_eq!(answer.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_source_failure_ends_session() {
        let source = on_demand("http://127.0.0.1:1/");
        let pipelines = Arc::new(PipelineRegistry::default());

        for mode in [
            OutputMode::Single,
            OutputMode::Throttled,
            OutputMode::Buffered { capacity: 2 },
        ] {
            let (response, _pending) = response_channel();
            let output = StreamOutput::new(
                mode,
                Arc::clone(&source),
                Arc::clone(&pipelines),
                &RequestParams::new(),
                response,
                1,
            );

            let stats = output.handle().await.unwrap();
            assert_eq!(stats.frames_written, 0);
            assert_eq!(source.consumer_count(), 0);
            assert!(pipelines.is_empty());
        }
    }

    #[tokio::test]
    async fn test_aborted_session_releases() {
        // Accepts connections but never answers, so the session waits
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let source = on_demand(&format!("http://{}/", silent.local_addr().unwrap()));
        let pipelines = Arc::new(PipelineRegistry::default());

        let (response, _pending) = response_channel();
        let output = StreamOutput::new(
            OutputMode::Throttled,
            Arc::clone(&source),
            Arc::clone(&pipelines),
            &RequestParams::from_query("size=10x10"),
            response,
            1,
        );
        let session = tokio::spawn(output.handle());

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.consumer_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        session.abort();
        assert!(session.await.unwrap_err().is_cancelled());

        tokio::time::timeout(Duration::from_secs(5), async {
            while source.consumer_count() > 0 || !pipelines.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
