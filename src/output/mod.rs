//! Downstream output formats
//!
//! Every viewer session is one of:
//!
//! - [`StreamOutput`]: registered HTTP session (single image, throttled or
//!   buffered multipart) writing through an [`HttpResponse`]
//! - [`write_last_frame`]: the most recent frame, without registering
//! - [`PullOutput`]: frame-on-request over a message transport

pub mod last;
pub mod pull;
pub mod queue;
mod release;
pub mod response;
pub mod stream;
pub mod throttle;

pub use last::write_last_frame;
pub use pull::{data_uri, PullOutput, PullTransport, PULL_REQUEST};
pub use queue::FrameQueue;
pub use response::{
    response_channel, status_response, HttpResponse, PendingResponse, ResponseHead,
    MULTIPART_BOUNDARY,
};
pub use stream::{OutputMode, StreamOutput};
pub use throttle::Throttle;
