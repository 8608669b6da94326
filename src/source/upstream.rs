//! Upstream source lifecycle
//!
//! An [`UpstreamSource`] owns at most one reader task for its camera. The
//! reader is started by the first registration (or at open time for
//! continuous streams) and stopped when the last consumer of an on-demand
//! stream unregisters, when the stream is disabled, or at shutdown.
//!
//! Registration changes and reader start/stop are serialized through one
//! async mutex, so "last unregister stops the reader" can never race with
//! "new register starts it".

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::StreamConfig;
use super::connect::connect;
use super::frame::Frame;
use super::parser::FrameParser;
use super::state::{ConnectionState, Publisher, Subscription};
use crate::error::Result;
use crate::stats::SourceStats;

struct ReaderHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Registrations {
    consumers: HashSet<u64>,
    reader: Option<ReaderHandle>,
}

/// A shared upstream camera feed
pub struct UpstreamSource {
    config: StreamConfig,
    publisher: Arc<Publisher>,
    registrations: Mutex<Registrations>,
    next_consumer_id: AtomicU64,
    disabled: AtomicBool,
    /// Mirror of the registered set size for lock-free stats
    consumer_count: AtomicUsize,
}

impl UpstreamSource {
    /// Create an idle source
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            publisher: Arc::new(Publisher::new()),
            registrations: Mutex::new(Registrations::default()),
            next_consumer_id: AtomicU64::new(1),
            disabled: AtomicBool::new(false),
            consumer_count: AtomicUsize::new(0),
        }
    }

    /// Create a source, connecting immediately unless it is on-demand
    pub async fn open(config: StreamConfig) -> Self {
        let source = Self::new(config);
        if !source.config.on_demand {
            let mut regs = source.registrations.lock().await;
            source.start_reader(&mut regs);
        }
        source
    }

    /// Stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Stream name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Register a consumer, starting the reader if it is not running
    ///
    /// Returns `None` if the source is disabled.
    pub async fn register(&self) -> Option<Subscription> {
        let mut regs = self.registrations.lock().await;

        if self.disabled.load(Ordering::Acquire) {
            tracing::debug!(stream = %self.config.name, "Registration refused, stream disabled");
            return None;
        }

        let id = self.next_consumer_id.fetch_add(1, Ordering::Relaxed);
        regs.consumers.insert(id);
        self.consumer_count
            .store(regs.consumers.len(), Ordering::Relaxed);

        // Subscribe before the reader can publish anything
        let subscription = Subscription::new(id, self.publisher.subscribe());

        if !self.is_reading(&regs) {
            self.stop_reader(&mut regs).await;
            self.start_reader(&mut regs);
        }

        tracing::info!(
            stream = %self.config.name,
            consumer_id = id,
            consumers = regs.consumers.len(),
            "Consumer registered"
        );

        Some(subscription)
    }

    /// Remove a consumer; stops an on-demand reader when none remain
    pub async fn unregister(&self, subscription: Subscription) {
        let mut regs = self.registrations.lock().await;

        let id = subscription.id();
        drop(subscription);

        if !regs.consumers.remove(&id) {
            // Already cleared by disable()
            return;
        }
        self.consumer_count
            .store(regs.consumers.len(), Ordering::Relaxed);

        tracing::info!(
            stream = %self.config.name,
            consumer_id = id,
            consumers = regs.consumers.len(),
            "Consumer unregistered"
        );

        if regs.consumers.is_empty() && self.config.on_demand {
            self.stop_reader(&mut regs).await;
        }
    }

    /// Refuse registrations, drop all consumers and stop the reader
    pub async fn disable(&self) {
        let mut regs = self.registrations.lock().await;

        self.disabled.store(true, Ordering::Release);
        regs.consumers.clear();
        self.consumer_count.store(0, Ordering::Relaxed);
        self.stop_reader(&mut regs).await;

        tracing::info!(stream = %self.config.name, "Stream disabled");
    }

    /// Permit registrations again; continuous streams reconnect immediately
    pub async fn enable(&self) {
        let mut regs = self.registrations.lock().await;

        self.disabled.store(false, Ordering::Release);
        if !self.config.on_demand && !self.is_reading(&regs) {
            self.stop_reader(&mut regs).await;
            self.start_reader(&mut regs);
        }

        tracing::info!(stream = %self.config.name, "Stream enabled");
    }

    /// Stop the reader, waiting up to the configured stop timeout
    ///
    /// Returns whether the reader exited in time.
    pub async fn stop(&self) -> bool {
        let mut regs = self.registrations.lock().await;
        self.stop_reader(&mut regs).await
    }

    /// Most recently published frame
    pub fn last_frame(&self) -> Option<Frame> {
        self.publisher.last_frame()
    }

    pub fn state(&self) -> ConnectionState {
        self.publisher.state()
    }

    /// Reason of the last reader failure
    pub fn error_reason(&self) -> Option<String> {
        self.publisher.error()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn consumer_count(&self) -> usize {
        self.consumer_count.load(Ordering::Relaxed)
    }

    /// Snapshot of the source statistics
    pub fn stats(&self) -> SourceStats {
        let counters = self.publisher.counters();
        SourceStats {
            name: self.config.name.clone(),
            state: self.state(),
            disabled: self.is_disabled(),
            consumers: self.consumer_count(),
            frames_published: counters.frames_published(),
            frames_discarded: counters.frames_discarded(),
            bytes_received: counters.bytes_received(),
            last_error: self.error_reason(),
            last_frame_age: counters.last_frame_age(),
        }
    }

    fn is_reading(&self, regs: &Registrations) -> bool {
        let alive = regs
            .reader
            .as_ref()
            .map_or(false, |reader| !reader.task.is_finished());
        alive && self.publisher.state().is_active()
    }

    fn start_reader(&self, regs: &mut Registrations) {
        let cancel = CancellationToken::new();
        self.publisher.set_state(ConnectionState::Connecting);

        let task = tokio::spawn(run_reader(
            self.config.clone(),
            Arc::clone(&self.publisher),
            cancel.clone(),
        ));

        regs.reader = Some(ReaderHandle { cancel, task });
    }

    async fn stop_reader(&self, regs: &mut Registrations) -> bool {
        let Some(reader) = regs.reader.take() else {
            return true;
        };

        reader.cancel.cancel();
        let mut task = reader.task;

        match tokio::time::timeout(self.config.stop_timeout, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(
                    stream = %self.config.name,
                    timeout_secs = self.config.stop_timeout.as_secs(),
                    "Reader did not stop in time, aborting"
                );
                task.abort();
                self.publisher.finish(ConnectionState::Stopped, None);
                false
            }
        }
    }
}

impl Drop for UpstreamSource {
    fn drop(&mut self) {
        if let Some(reader) = self.registrations.get_mut().reader.take() {
            reader.cancel.cancel();
        }
    }
}

/// Reader task body
///
/// Cancellation drops the in-flight read, which closes the upstream
/// connection.
async fn run_reader(config: StreamConfig, publisher: Arc<Publisher>, cancel: CancellationToken) {
    tracing::info!(stream = %config.name, url = %config.source, "Upstream reader started");

    let result = tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = read_upstream(&config, &publisher) => result,
    };

    match result {
        Ok(()) => {
            tracing::info!(stream = %config.name, "Upstream reader stopped");
            publisher.finish(ConnectionState::Stopped, None);
        }
        Err(e) => {
            tracing::warn!(stream = %config.name, error = %e, "Upstream reader failed");
            publisher.finish(ConnectionState::Error, Some(e.to_string()));
        }
    }
}

async fn read_upstream(config: &StreamConfig, publisher: &Publisher) -> Result<()> {
    let connection = connect(config).await?;
    publisher.set_state(ConnectionState::Streaming);

    tracing::info!(stream = %config.name, "Upstream streaming");

    let mut parser = FrameParser::new(connection.body, connection.boundary);
    let mut discarded = 0;

    loop {
        let frame = parser.next_frame().await?;

        if parser.discarded() != discarded {
            publisher
                .counters()
                .record_discarded(parser.discarded() - discarded);
            discarded = parser.discarded();
        }

        publisher.publish(frame);
    }
}
