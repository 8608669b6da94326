//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::codec::CodecKind;
use crate::output::queue::{DEFAULT_CAPACITY, MAX_CAPACITY};

/// Relay server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent viewer requests (0 = unlimited)
    pub max_connections: usize,

    /// Path prefix in front of `<name>.<format>`
    pub path_prefix: String,

    /// JPEG codec used by transform pipelines
    pub codec: CodecKind,

    /// Queue capacity for buffered output when the request has no `wait`
    pub default_queue_capacity: usize,

    /// Upper bound on a requested `wait` queue capacity
    pub max_queue_capacity: usize,

    /// A session must answer with its status within this time
    pub request_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            path_prefix: "/streams/".to_string(),
            codec: CodecKind::default(),
            default_queue_capacity: DEFAULT_CAPACITY,
            max_queue_capacity: MAX_CAPACITY,
            request_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the path prefix; a missing leading or trailing `/` is added
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.path_prefix = prefix;
        self
    }

    /// Set the codec
    pub fn codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Set the default buffered-output queue capacity
    pub fn default_queue_capacity(mut self, capacity: usize) -> Self {
        self.default_queue_capacity = capacity.max(1);
        self
    }

    /// Set the largest queue capacity a viewer may request
    pub fn max_queue_capacity(mut self, capacity: usize) -> Self {
        self.max_queue_capacity = capacity.max(1);
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.path_prefix, "/streams/");
        assert_eq!(config.codec, CodecKind::Buffered);
        assert_eq!(config.default_queue_capacity, 20);
        assert_eq!(config.max_queue_capacity, 1000);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 8081);
    }

    #[test]
    fn test_builder_path_prefix_normalized() {
        let config = ServerConfig::default().path_prefix("cams");
        assert_eq!(config.path_prefix, "/cams/");

        let config = ServerConfig::default().path_prefix("/");
        assert_eq!(config.path_prefix, "/");
    }

    #[test]
    fn test_builder_queue_capacity_minimum() {
        let config = ServerConfig::default()
            .default_queue_capacity(0)
            .max_queue_capacity(0);

        assert_eq!(config.default_queue_capacity, 1);
        assert_eq!(config.max_queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .codec(CodecKind::Portable)
            .request_timeout(Duration::from_secs(5));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.codec, CodecKind::Portable);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
