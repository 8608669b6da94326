//! Source registry for name-based routing
//!
//! The registry owns every configured upstream source and hands out shared
//! references to viewer sessions.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SourceRegistry>
//!                  ┌──────────────────────────────┐
//!                  │ sources: HashMap<name,       │
//!                  │   Arc<UpstreamSource>>       │
//!                  └──────────────┬───────────────┘
//!                                 │ get(name)
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!   [StreamOutput]          [StreamOutput]           [PullOutput]
//!   register()              register()               register()
//!   next_frame() ──► TCP    next_frame() ──► TCP     next_frame() ──► socket
//! ```

pub mod store;

pub use crate::error::RegistryError;
pub use store::SourceRegistry;
