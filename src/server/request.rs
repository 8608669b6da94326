//! Viewer request parsing
//!
//! The router matches `<prefix><resource>` and hands over the decoded
//! resource segment and the raw query. The resource is `<name>.<format>`.

use std::fmt;

use axum::http::StatusCode;

use crate::params::RequestParams;

/// A parsed stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Stream name
    pub name: String,
    /// Lowercased format suffix (`jpeg`, `mjpg`, `bjpg`, `last`, `ws`)
    pub format: String,
    pub params: RequestParams,
}

impl StreamRequest {
    /// Parse a decoded `<name>.<format>` path segment and its query string
    pub fn parse(resource: &str, query: &str) -> Result<Self, RequestError> {
        // At least one character of name before the format
        let dot = match resource.find('.') {
            Some(dot) if dot >= 1 => dot,
            _ => return Err(RequestError::MissingFormat(resource.to_string())),
        };

        Ok(StreamRequest {
            name: resource[..dot].to_string(),
            format: resource[dot + 1..].to_ascii_lowercase(),
            params: RequestParams::from_query(query),
        })
    }

    /// Viewer password (`pw`)
    pub fn password(&self) -> Option<&str> {
        self.params.get("pw")
    }
}

/// Why a request was rejected before routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No `<name>.<format>` in the path
    MissingFormat(String),
}

impl RequestError {
    /// HTTP status answered for this rejection
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::MissingFormat(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::MissingFormat(resource) => {
                write!(f, "no <name>.<format> in {}", resource)
            }
        }
    }
}

impl std::error::Error for RequestError {}
