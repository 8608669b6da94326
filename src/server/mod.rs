//! HTTP relay server
//!
//! Routes `<prefix><name>.<format>` requests on axum, checks stream
//! passwords and hands the response body to the matching output.

pub mod auth;
pub mod config;
pub mod listener;
pub mod request;
pub mod ws;

pub use auth::StreamAuthenticator;
pub use config::ServerConfig;
pub use listener::RelayServer;
pub use request::{RequestError, StreamRequest};
pub use ws::WebSocketTransport;
