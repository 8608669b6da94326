//! Upstream MJPEG acquisition
//!
//! # Architecture
//!
//! ```text
//!   camera ──HTTP──► connect() ──► FrameParser ──► Publisher (watch::Sender)
//!                                                      │
//!                       ┌──────────────────────────────┼─────────────────┐
//!                       ▼                              ▼                 ▼
//!                 Subscription                   Subscription      last_frame()
//!                 next_frame()                   next_frame()
//! ```
//!
//! One reader task per active [`UpstreamSource`]. Frames are published by
//! replacing the watch value; every waiting subscription wakes at once and
//! clones the same `Bytes` payload.

pub mod config;
pub mod connect;
pub mod frame;
pub mod parser;
pub mod state;
pub mod upstream;

pub use config::{AuthType, StreamConfig, StreamConfigBuilder};
pub use frame::Frame;
pub use parser::FrameParser;
pub use state::{ConnectionState, Subscription};
pub use upstream::UpstreamSource;
