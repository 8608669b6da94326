//! Relay server listener
//!
//! Serves viewer requests over axum and routes each one to an output. A
//! session runs in its own task and streams into the response body.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{Error, RegistryError, Result};
use crate::output::{
    response_channel, status_response, write_last_frame, OutputMode, PullOutput, StreamOutput,
};
use crate::registry::SourceRegistry;
use crate::server::auth::StreamAuthenticator;
use crate::server::config::ServerConfig;
use crate::server::request::StreamRequest;
use crate::server::ws::WebSocketTransport;
use crate::source::StreamConfig;
use crate::transform::PipelineRegistry;

/// Held by a session until it ends; `None` when connections are unlimited
type ConnectionPermit = Option<OwnedSemaphorePermit>;

/// State shared by every request handler
struct Shared {
    config: ServerConfig,
    registry: Arc<SourceRegistry>,
    pipelines: Arc<PipelineRegistry>,
    authenticator: Arc<StreamAuthenticator>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl Shared {
    fn admit(&self) -> std::result::Result<ConnectionPermit, TryAcquireError> {
        match &self.connection_semaphore {
            Some(sem) => Arc::clone(sem).try_acquire_owned().map(Some),
            None => Ok(None),
        }
    }
}

/// MJPEG relay server
pub struct RelayServer {
    shared: Arc<Shared>,
}

impl RelayServer {
    /// Create a server over an existing source registry
    pub fn new(
        config: ServerConfig,
        registry: Arc<SourceRegistry>,
        authenticator: StreamAuthenticator,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let pipelines = Arc::new(PipelineRegistry::new(config.codec));

        Self {
            shared: Arc::new(Shared {
                config,
                registry,
                pipelines,
                authenticator: Arc::new(authenticator),
                next_session_id: AtomicU64::new(1),
                connection_semaphore,
            }),
        }
    }

    /// Create the sources and authenticator for `streams`, then the server
    ///
    /// Continuous sources start connecting immediately.
    pub async fn from_streams(config: ServerConfig, streams: Vec<StreamConfig>) -> Result<Self> {
        let authenticator = StreamAuthenticator::new(&streams);
        let registry = SourceRegistry::from_configs(streams).await?;
        Ok(Self::new(config, Arc::new(registry), authenticator))
    }

    /// Get a reference to the source registry
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.shared.registry
    }

    /// Get a reference to the transform pipeline registry
    pub fn pipelines(&self) -> &Arc<PipelineRegistry> {
        &self.shared.pipelines
    }

    /// Get a reference to the stream authenticator
    pub fn authenticator(&self) -> &Arc<StreamAuthenticator> {
        &self.shared.authenticator
    }

    /// Router answering `GET`/`POST <prefix><name>.<format>`
    ///
    /// Other paths get `404`, other methods `405`.
    pub fn router(&self) -> Router {
        let path = format!("{}:resource", self.shared.config.path_prefix);
        Router::new()
            .route(&path, get(serve_stream).post(serve_stream))
            .with_state(Arc::clone(&self.shared))
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.shared.config.bind_addr).await?;
        tracing::info!(addr = %self.shared.config.bind_addr, "MJPEG relay listening");

        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// All upstream readers are stopped before returning, which ends every
    /// open viewer session.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let serve = axum::serve(listener, self.router())
            .tcp_nodelay(self.shared.config.tcp_nodelay);

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = serve.into_future() => result.map_err(Error::from),
        };

        let stuck = self.shared.registry.shutdown().await;
        if stuck > 0 {
            tracing::warn!(stuck = stuck, "Some upstream readers did not stop in time");
        }

        result
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.shared.config.bind_addr
    }
}

async fn serve_stream(
    State(shared): State<Arc<Shared>>,
    Path(resource): Path<String>,
    RawQuery(query): RawQuery,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    let permit = match shared.admit() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(resource = %resource, "Request rejected: limit reached");
            return status_response(StatusCode::SERVICE_UNAVAILABLE);
        }
    };

    let session_id = shared.next_session_id.fetch_add(1, Ordering::Relaxed);

    let request = match StreamRequest::parse(&resource, query.as_deref().unwrap_or_default()) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(session_id = session_id, error = %e, "Rejected request");
            return status_response(e.status());
        }
    };

    route(shared, request, upgrade, permit, session_id).await
}

async fn route(
    shared: Arc<Shared>,
    request: StreamRequest,
    upgrade: Option<WebSocketUpgrade>,
    permit: ConnectionPermit,
    session_id: u64,
) -> Response {
    let source = match shared.registry.get(&request.name).await {
        Ok(source) => source,
        Err(_) => return status_response(StatusCode::NOT_FOUND),
    };

    if !shared
        .authenticator
        .authenticate(source.config(), request.password())
    {
        tracing::debug!(session_id = session_id, stream = %request.name, "Authentication failed");
        return status_response(StatusCode::FORBIDDEN);
    }

    if source.is_disabled() {
        return status_response(StatusCode::NO_CONTENT);
    }

    tracing::debug!(
        session_id = session_id,
        stream = %request.name,
        format = %request.format,
        "Routing viewer"
    );

    let StreamRequest { format, params, .. } = request;
    let pipelines = Arc::clone(&shared.pipelines);

    if format == "ws" {
        let Some(upgrade) = upgrade else {
            return status_response(StatusCode::BAD_REQUEST);
        };
        return upgrade.on_upgrade(move |socket| async move {
            let _permit = permit;
            let transport = WebSocketTransport::new(socket);
            let output = PullOutput::new(source, pipelines, &params, transport, session_id);
            if let Err(e) = output.handle().await {
                tracing::debug!(session_id = session_id, error = %e, "Pull session failed");
            }
        });
    }

    let (response, pending) = response_channel();

    if format == "last" {
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = write_last_frame(source, pipelines, &params, response).await {
                tracing::debug!(session_id = session_id, error = %e, "Last frame output failed");
            }
        });
        return pending.into_response(shared.config.request_timeout).await;
    }

    let mode = match OutputMode::from_format(&format, &params) {
        Some(OutputMode::Buffered { capacity }) => OutputMode::Buffered {
            capacity: if params.contains("wait") {
                capacity.min(shared.config.max_queue_capacity)
            } else {
                shared.config.default_queue_capacity
            },
        },
        Some(mode) => mode,
        None => return status_response(StatusCode::NOT_FOUND),
    };

    let output = StreamOutput::new(mode, source, pipelines, &params, response, session_id);
    tokio::spawn(async move {
        let _permit = permit;
        match output.handle().await {
            // 503 already answered
            Ok(_) | Err(Error::Registry(RegistryError::StreamDisabled(_))) => {}
            Err(e) => {
                tracing::debug!(session_id = session_id, error = %e, "Viewer session failed");
            }
        }
    });

    pending.into_response(shared.config.request_timeout).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn start(config: ServerConfig, streams: Vec<StreamConfig>) -> (Arc<RelayServer>, String) {
        let server = Arc::new(RelayServer::from_streams(config, streams).await.unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let running = Arc::clone(&server);
        tokio::spawn(async move {
            running
                .serve_until(listener, std::future::pending())
                .await
                .ok();
        });

        (server, base)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    async fn status(base: &str, path: &str) -> u16 {
        client()
            .get(format!("{}{}", base, path))
            .send()
            .await
            .unwrap()
            .status()
            .as_u16()
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn on_demand(name: &str) -> crate::source::StreamConfigBuilder {
        StreamConfig::builder(name, "http://127.0.0.1:1/").on_demand(true)
    }

    #[tokio::test]
    async fn test_status_routing() {
        let (server, base) = start(
            ServerConfig::default(),
            vec![
                on_demand("open").build().unwrap(),
                on_demand("locked")
                    .protect(Some("secret".into()))
                    .build()
                    .unwrap(),
            ],
        )
        .await;

        assert_eq!(status(&base, "/streams/open").await, 400);
        assert_eq!(status(&base, "/streams/nope.jpeg").await, 404);
        assert_eq!(status(&base, "/streams/open.png").await, 404);
        assert_eq!(status(&base, "/other/open.jpeg").await, 404);
        assert_eq!(status(&base, "/streams/locked.jpeg").await, 403);
        assert_eq!(status(&base, "/streams/locked.last?pw=secret").await, 204);
        assert_eq!(status(&base, "/streams/open.last").await, 204);
        // Pull sessions need a WebSocket upgrade
        assert_eq!(status(&base, "/streams/open.ws").await, 400);

        let deleted = client()
            .delete(format!("{}/streams/open.jpeg", base))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status().as_u16(), 405);

        server.registry().disable("open").await.unwrap();
        assert_eq!(status(&base, "/streams/open.jpeg").await, 204);
    }

    #[tokio::test]
    async fn test_dead_camera_single_frame() {
        let (server, base) = start(ServerConfig::default(), vec![on_demand("cam").build().unwrap()]).await;

        // Authenticated, but the upstream cannot connect
        assert_eq!(status(&base, "/streams/cam.jpeg?size=10x10").await, 503);
        wait_for(|| server.pipelines().is_empty()).await;
    }

    #[tokio::test]
    async fn test_huge_wait_over_http() {
        let (server, base) = start(ServerConfig::default(), vec![on_demand("cam").build().unwrap()]).await;

        let response = client()
            .get(format!(
                "{}/streams/cam.bjpg?wait=18446744073709551615&size=10x10",
                base
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        // The session ends with the failed upstream
        assert!(response.bytes().await.unwrap().is_empty());

        let source = server.registry().get("cam").await.unwrap();
        wait_for(|| source.consumer_count() == 0).await;
        wait_for(|| server.pipelines().is_empty()).await;
    }

    #[tokio::test]
    async fn test_request_limit() {
        // Accepts connections but never answers, so the first viewer stays
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let camera = StreamConfig::builder("cam", format!("http://{}/", silent.local_addr().unwrap()))
            .on_demand(true)
            .build()
            .unwrap();
        let (_server, base) = start(ServerConfig::default().max_connections(1), vec![camera]).await;

        let first = client()
            .get(format!("{}/streams/cam.mjpg", base))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status().as_u16(), 200);

        assert_eq!(status(&base, "/streams/cam.mjpg").await, 503);
        drop(first);
    }
}
