//! Error types
//!
//! Each area of the relay has its own error enum; [`Error`] wraps them all so
//! that `?` works across module boundaries.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error on an upstream or downstream socket
    Io(io::Error),
    /// Upstream connection could not be established
    Connection(ConnectionError),
    /// Upstream multipart stream was malformed
    Parse(ParseError),
    /// Stream configuration is invalid
    Config(ConfigError),
    /// JPEG encode or decode failed
    Codec(CodecError),
    /// Transform parameter could not be parsed
    Transform(TransformError),
    /// Stream lookup or registration failed
    Registry(RegistryError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Parse(e) => write!(f, "Parse error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
            Error::Transform(e) => write!(f, "Transform error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::Connection(e)
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<TransformError> for Error {
    fn from(e: TransformError) -> Self {
        Error::Transform(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl Error {
    /// Whether this error is the expected result of a viewer going away
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::WriteZero
            ),
            _ => false,
        }
    }
}

/// Upstream connection errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Connect did not complete within the configured timeout
    Timeout,
    /// HTTP request failed before a response was received
    Request(String),
    /// Camera answered with a non-200 status
    Status(u16),
    /// Basic authentication configured without username or password
    MissingCredentials,
    /// No boundary in the response and none configured
    MissingBoundary,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Timeout => write!(f, "connect timed out"),
            ConnectionError::Request(msg) => write!(f, "request failed: {}", msg),
            ConnectionError::Status(code) => write!(f, "HTTP response code is {}", code),
            ConnectionError::MissingCredentials => {
                write!(f, "basic authentication requires a username and password")
            }
            ConnectionError::MissingBoundary => write!(f, "no multipart boundary available"),
        }
    }
}

impl std::error::Error for ConnectionError {}

/// MJPEG multipart parse errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Stream ended while looking for the next boundary or header line
    UnexpectedEof,
    /// Line after the boundary was not a content-type header
    MissingContentType(String),
    /// Line after content-type was not a content-length header
    MissingContentLength(String),
    /// Content-length value was not a non-negative integer
    InvalidContentLength(String),
    /// Stream ended before the declared payload was read
    ShortRead { expected: usize, read: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedEof => write!(f, "reached end of stream unexpectedly"),
            ParseError::MissingContentType(line) => {
                write!(f, "expected content-type, got {:?}", line)
            }
            ParseError::MissingContentLength(line) => {
                write!(f, "expected content-length, got {:?}", line)
            }
            ParseError::InvalidContentLength(value) => {
                write!(f, "invalid content-length {:?}", value)
            }
            ParseError::ShortRead { expected, read } => {
                write!(f, "read {} of {} frame bytes", read, expected)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Stream configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Stream has no name
    MissingName,
    /// Source URL does not parse
    InvalidUrl(String),
    /// Source URL is not http or https
    UnsupportedScheme(String),
    /// Unknown authentication type
    InvalidAuthType(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingName => write!(f, "stream name not set"),
            ConfigError::InvalidUrl(url) => write!(f, "source URL {} is not valid", url),
            ConfigError::UnsupportedScheme(scheme) => {
                write!(f, "unsupported source URL scheme {}", scheme)
            }
            ConfigError::InvalidAuthType(t) => write!(f, "invalid authentication type {}", t),
        }
    }
}

impl std::error::Error for ConfigError {}

/// JPEG codec errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Decode(String),
    Encode(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Decode(msg) => write!(f, "decode failed: {}", msg),
            CodecError::Encode(msg) => write!(f, "encode failed: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// Transform parameter errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    InvalidParam { op: &'static str, value: String },
}

impl TransformError {
    pub(crate) fn invalid(op: &'static str, value: &str) -> Self {
        TransformError::InvalidParam {
            op,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::InvalidParam { op, value } => {
                write!(f, "invalid {} parameter {:?}", op, value)
            }
        }
    }
}

impl std::error::Error for TransformError {}

/// Source registry errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No stream configured with this name
    StreamNotFound(String),
    /// Stream is administratively disabled
    StreamDisabled(String),
    /// A stream with this name already exists
    DuplicateStream(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::StreamNotFound(name) => write!(f, "Stream not found: {}", name),
            RegistryError::StreamDisabled(name) => write!(f, "Stream disabled: {}", name),
            RegistryError::DuplicateStream(name) => write!(f, "Stream already exists: {}", name),
        }
    }
}

impl std::error::Error for RegistryError {}
