//! MJPEG camera stream relay
//!
//! Relays upstream `multipart/x-mixed-replace` camera feeds to any number of
//! viewers. Each upstream is read by one task however many viewers watch it;
//! viewers choose their output shape and optional per-request transforms.
//!
//! # Example
//!
//! ```no_run
//! use mjpeg_relay::{RelayServer, ServerConfig, StreamConfig};
//!
//! # async fn run() -> mjpeg_relay::Result<()> {
//! let cam = StreamConfig::builder("front", "http://192.168.1.20/video.mjpg")
//!     .on_demand(true)
//!     .build()?;
//!
//! let server = RelayServer::from_streams(ServerConfig::default(), vec![cam]).await?;
//! server.run().await
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod output;
pub mod params;
pub mod registry;
pub mod server;
pub mod source;
pub mod stats;
pub mod transform;

pub use codec::{Codec, CodecKind};
pub use error::{Error, Result};
pub use output::{OutputMode, PullOutput, PullTransport, StreamOutput};
pub use params::RequestParams;
pub use registry::SourceRegistry;
pub use server::{RelayServer, ServerConfig, StreamAuthenticator, WebSocketTransport};
pub use source::{ConnectionState, Frame, StreamConfig, Subscription, UpstreamSource};
pub use stats::{SessionStats, SourceStats};
pub use transform::{PipelineRegistry, TransformPipeline};
