//! Upstream HTTP connection

use std::io;

use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use super::config::{AuthType, StreamConfig};
use super::parser::boundary_from_content_type;
use crate::error::{ConnectionError, Result};

/// An open upstream response ready for parsing
pub struct UpstreamConnection {
    /// Boundary line including the `--` prefix
    pub boundary: String,
    /// Response body
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

/// Issue the GET request for a stream and validate the response
pub async fn connect(config: &StreamConfig) -> Result<UpstreamConnection> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| ConnectionError::Request(e.to_string()))?;

    let mut request = client.get(config.source.clone());
    if config.auth_type == AuthType::Basic {
        let (user, pass) = config
            .basic_credentials()
            .ok_or(ConnectionError::MissingCredentials)?;
        request = request.basic_auth(user, Some(pass));
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ConnectionError::Timeout
        } else {
            ConnectionError::Request(e.to_string())
        }
    })?;

    if response.status() != StatusCode::OK {
        return Err(ConnectionError::Status(response.status().as_u16()).into());
    }

    let boundary = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(boundary_from_content_type)
        .or_else(|| config.boundary())
        .ok_or(ConnectionError::MissingBoundary)?;

    tracing::debug!(
        stream = %config.name,
        boundary = %boundary,
        "Upstream response accepted"
    );

    let stream = response
        .bytes_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e));

    Ok(UpstreamConnection {
        boundary,
        body: Box::new(StreamReader::new(Box::pin(stream))),
    })
}
