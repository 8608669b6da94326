//! Pull-based frame delivery over a message transport
//!
//! The client sends `p` to ask for the next frame. Frames are answered as
//! binary messages, or as `data:<mime>;base64,<payload>` text when the
//! session was opened without the `bin` flag.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use super::release::SessionRelease;
use crate::error::{RegistryError, Result};
use crate::params::RequestParams;
use crate::source::{Frame, UpstreamSource};
use crate::stats::SessionStats;
use crate::transform::PipelineRegistry;

/// Request message asking for the next frame
pub const PULL_REQUEST: &str = "p";

/// A bidirectional message channel to one client
#[async_trait]
pub trait PullTransport: Send {
    /// Next text message from the client, `None` once closed
    async fn recv(&mut self) -> Option<String>;

    async fn send_binary(&mut self, data: Bytes) -> io::Result<()>;

    async fn send_text(&mut self, text: String) -> io::Result<()>;
}

/// Encode a frame as a `data:` URI
pub fn data_uri(frame: &Frame) -> String {
    format!("data:{};base64,{}", frame.mime, STANDARD.encode(&frame.data))
}

/// A pull session bound to one upstream source
pub struct PullOutput<T> {
    release: SessionRelease,
    binary: bool,
    transport: T,
    session_id: u64,
}

impl<T: PullTransport> PullOutput<T> {
    pub fn new(
        source: Arc<UpstreamSource>,
        pipelines: Arc<PipelineRegistry>,
        params: &RequestParams,
        transport: T,
        session_id: u64,
    ) -> Self {
        Self {
            release: SessionRelease::acquire(source, pipelines, params),
            binary: params.flag(&["bin"]),
            transport,
            session_id,
        }
    }

    /// Serve pull requests until the client or the source goes away
    pub async fn handle(mut self) -> Result<SessionStats> {
        let source = Arc::clone(self.release.source());
        if !self.release.register().await {
            return Err(RegistryError::StreamDisabled(source.name().to_string()).into());
        }

        let mut stats = SessionStats::new();
        let result = self.serve(&mut stats).await;

        let PullOutput {
            release,
            session_id,
            ..
        } = self;
        release.finish().await;

        tracing::debug!(
            session_id = session_id,
            stream = %source.name(),
            frames_written = stats.frames_written,
            "Pull session ended"
        );

        match result {
            Err(e) if e.is_disconnect() => Ok(stats),
            Err(e) => Err(e),
            Ok(()) => Ok(stats),
        }
    }

    async fn serve(&mut self, stats: &mut SessionStats) -> Result<()> {
        while let Some(message) = self.transport.recv().await {
            if message.trim() != PULL_REQUEST {
                continue;
            }

            let Some(frame) = self.release.next_frame().await else {
                break;
            };

            // Every request gets a reply, untransformed if need be
            let frame = match self.release.pipeline().transform_blocking(frame.clone()).await {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(session_id = self.session_id, error = %e, "Frame transform failed, sending original frame");
                    frame
                }
            };

            let size = frame.size();
            if self.binary {
                self.transport.send_binary(frame.data).await?;
            } else {
                self.transport.send_text(data_uri(&frame)).await?;
            }
            stats.record_written(size);
        }

        Ok(())
    }
}
