//! Viewer responses
//!
//! A session answers through an [`HttpResponse`]: status and headers once,
//! then either a single body or an endless `multipart/x-mixed-replace`
//! sequence of parts. The HTTP handler holds the matching
//! [`PendingResponse`], waits for the head and streams the body chunks to
//! the client as they are written.

use std::convert::Infallible;
use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::source::Frame;

/// Boundary used for every multipart response
pub const MULTIPART_BOUNDARY: &str = "ffserver";

/// Value of the `Server` header
pub const SERVER_NAME: &str = concat!("mjpeg-relay/", env!("CARGO_PKG_VERSION"));

/// Body chunks buffered between a session and its connection
const BODY_BUFFER: usize = 8;

/// Status line and headers chosen by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_length: Option<usize>,
}

/// Create a connected session writer and handler-side response
pub fn response_channel() -> (HttpResponse, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER);

    (
        HttpResponse {
            head: Some(head_tx),
            body: body_tx,
        },
        PendingResponse {
            head: head_rx,
            body: body_rx,
        },
    )
}

/// Session side of one viewer response
///
/// Every write fails with [`io::ErrorKind::BrokenPipe`] once the viewer has
/// gone away.
#[derive(Debug)]
pub struct HttpResponse {
    head: Option<oneshot::Sender<ResponseHead>>,
    body: mpsc::Sender<Bytes>,
}

impl HttpResponse {
    /// Whether the status has been sent
    pub fn headers_sent(&self) -> bool {
        self.head.is_none()
    }

    /// Answer with an empty response
    pub fn write_status(&mut self, status: StatusCode) -> io::Result<()> {
        self.send_head(ResponseHead {
            status,
            content_type: None,
            content_length: None,
        })
    }

    /// Answer `200 OK`; the body follows through the write methods
    pub fn write_headers(
        &mut self,
        content_type: &str,
        content_length: Option<usize>,
    ) -> io::Result<()> {
        self.send_head(ResponseHead {
            status: StatusCode::OK,
            content_type: Some(content_type.to_string()),
            content_length,
        })
    }

    /// Answer `200 OK` announcing a multipart stream
    pub fn write_multipart_headers(&mut self) -> io::Result<()> {
        let content_type = format!("multipart/x-mixed-replace;boundary={}", MULTIPART_BOUNDARY);
        self.write_headers(&content_type, None)
    }

    /// Write a complete single-image response, returning the body size
    pub async fn write_single(&mut self, frame: &Frame) -> io::Result<usize> {
        self.write_headers(&frame.mime, Some(frame.size()))?;
        self.send(frame.data.clone()).await?;
        Ok(frame.size())
    }

    /// Write one multipart part, returning the bytes written
    pub async fn write_part(&mut self, frame: &Frame, sequence: Option<u64>) -> io::Result<usize> {
        let mut head = format!(
            "--{}\r\nContent-type: {}\r\nContent-length: {}\r\n",
            MULTIPART_BOUNDARY,
            frame.mime,
            frame.size()
        );
        if let Some(sequence) = sequence {
            head.push_str(&format!("frame-sequence: {}\r\n", sequence));
        }
        head.push_str("\r\n");
        let head_len = head.len();

        self.send(Bytes::from(head)).await?;
        self.send(frame.data.clone()).await?;
        self.send(Bytes::from_static(b"\r\n")).await?;

        Ok(head_len + frame.size() + 2)
    }

    fn send_head(&mut self, head: ResponseHead) -> io::Result<()> {
        let sender = self.head.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "response head already sent")
        })?;
        sender.send(head).map_err(|_| disconnected())
    }

    async fn send(&self, chunk: Bytes) -> io::Result<()> {
        self.body.send(chunk).await.map_err(|_| disconnected())
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "viewer disconnected")
}

/// Handler side of one viewer response
#[derive(Debug)]
pub struct PendingResponse {
    head: oneshot::Receiver<ResponseHead>,
    body: mpsc::Receiver<Bytes>,
}

impl PendingResponse {
    /// Wait for the session's head and stream the rest of the body
    ///
    /// A session that ends without answering, or does not answer within
    /// `limit`, gets `503 Service Unavailable`.
    pub async fn into_response(self, limit: Duration) -> Response {
        let head = match tokio::time::timeout(limit, self.head).await {
            Ok(Ok(head)) => head,
            Ok(Err(_)) => return status_response(StatusCode::SERVICE_UNAVAILABLE),
            Err(_) => {
                tracing::debug!("Session did not answer in time");
                return status_response(StatusCode::SERVICE_UNAVAILABLE);
            }
        };

        if head.status != StatusCode::OK {
            return status_response(head.status);
        }

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::SERVER, SERVER_NAME)
            .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(header::PRAGMA, "no-cache");
        if let Some(content_type) = head.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(length) = head.content_length {
            builder = builder.header(header::CONTENT_LENGTH, length);
        }

        let body = Body::from_stream(ReceiverStream::new(self.body).map(Ok::<_, Infallible>));
        match builder.body(body) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid response head");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// An empty response with `status`
pub fn status_response(status: StatusCode) -> Response {
    (status, [(header::SERVER, SERVER_NAME)]).into_response()
}
