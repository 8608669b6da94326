//! Connection state and frame publication
//!
//! The reader publishes through a `tokio::sync::watch` channel holding the
//! latest [`Published`] snapshot. Every publish wakes all waiting
//! subscriptions at once, and a subscription only ever observes values
//! published after it was created. Slow viewers skip frames instead of
//! queueing them.

use tokio::sync::watch;

use super::frame::Frame;
use crate::stats::SourceCounters;

/// Upstream connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Idle,
    /// Reader started, waiting for the camera response
    Connecting,
    /// Reader is parsing frames
    Streaming,
    /// Last reader attempt failed
    Error,
    /// Reader was stopped
    Stopped,
}

impl ConnectionState {
    /// Whether a reader is running
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Streaming)
    }

    /// Whether waiting viewers should give up
    pub fn is_terminated(&self) -> bool {
        matches!(self, ConnectionState::Error | ConnectionState::Stopped)
    }
}

/// Snapshot published by the reader
#[derive(Debug, Clone)]
pub(crate) struct Published {
    /// Incremented on every new frame
    pub generation: u64,
    /// Most recent frame, kept across reconnects
    pub frame: Option<Frame>,
    pub state: ConnectionState,
    pub error: Option<String>,
}

/// Publishing side shared by an upstream source and its reader task
pub(crate) struct Publisher {
    tx: watch::Sender<Published>,
    counters: SourceCounters,
}

impl Publisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Published {
            generation: 0,
            frame: None,
            state: ConnectionState::Idle,
            error: None,
        });

        Self {
            tx,
            counters: SourceCounters::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Published> {
        self.tx.subscribe()
    }

    /// Enter a new state; entering `Connecting` clears the last error
    pub fn set_state(&self, state: ConnectionState) {
        self.tx.send_modify(|p| {
            p.state = state;
            if state == ConnectionState::Connecting {
                p.error = None;
            }
        });
    }

    /// Publish a frame and wake every waiting subscription
    pub fn publish(&self, frame: Frame) {
        self.counters.record_frame(frame.size());
        self.tx.send_modify(|p| {
            p.generation += 1;
            p.frame = Some(frame);
        });
    }

    /// Record the end of a reader run and wake waiting subscriptions
    pub fn finish(&self, state: ConnectionState, error: Option<String>) {
        self.tx.send_modify(|p| {
            p.state = state;
            p.error = error;
        });
    }

    pub fn state(&self) -> ConnectionState {
        self.tx.borrow().state
    }

    pub fn error(&self) -> Option<String> {
        self.tx.borrow().error.clone()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.tx.borrow().frame.clone()
    }

    pub fn counters(&self) -> &SourceCounters {
        &self.counters
    }
}

/// A registered consumer's view of an upstream source
///
/// Obtained from [`UpstreamSource::register`](super::UpstreamSource::register)
/// and handed back to `unregister` when the consumer is done.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: watch::Receiver<Published>,
    seen: u64,
}

impl Subscription {
    pub(crate) fn new(id: u64, rx: watch::Receiver<Published>) -> Self {
        let seen = rx.borrow().generation;
        Self { id, rx, seen }
    }

    /// Consumer ID within the source
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next published frame
    ///
    /// Returns `None` once the source enters `Error` or `Stopped`.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }

            let snapshot = self.rx.borrow_and_update();
            if snapshot.state.is_terminated() {
                return None;
            }

            if snapshot.generation != self.seen {
                self.seen = snapshot.generation;
                return snapshot.frame.clone();
            }
        }
    }
}
