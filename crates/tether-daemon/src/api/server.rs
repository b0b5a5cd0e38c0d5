use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tether_types::{TetherError, TetherResult};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers;
use super::middleware::{require_auth, track_requests};
use super::state::ApiState;
use crate::config::ApiConfig;

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn create_router(state: ApiState, config: &ApiConfig) -> Router {
    let router = Router::new()
        .route("/v1/health", get(handlers::health_summary))
        .route("/v1/health/external", get(handlers::external_summary))
        .route("/v1/health/external/:slug", get(handlers::external_target))
        .route("/v1/health/:slug", get(handlers::health_target))
        .route("/v1/logs/stream/:slug", get(handlers::stream_logs))
        .route("/v1/processes", get(handlers::list_processes))
        .route("/v1/processes/:slug", get(handlers::get_process))
        .route("/v1/processes/:slug/start", post(handlers::start_process))
        .route("/v1/processes/:slug/stop", post(handlers::stop_process))
        .route("/v1/processes/:slug/restart", post(handlers::restart_process))
        .route("/v1/metrics", get(handlers::prometheus_metrics))
        .route("/v1/version", get(handlers::version))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .layer(from_fn_with_state(state.clone(), track_requests))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs.max(1))))
        .with_state(state);

    let router = if config.cors_enabled {
        router.layer(cors_layer(config))
    } else {
        router
    };
    router.layer(TraceLayer::new_for_http())
}

pub struct ApiServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Binds immediately so a port conflict surfaces before the daemon reports ready.
    pub async fn start(addr: SocketAddr, router: Router) -> TetherResult<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TetherError::Network(format!("Failed to bind API server on {}: {}", addr, e)))?;
        let addr = listener.local_addr()?;
        info!("API server listening on http://{}", addr);

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(e) = served {
                warn!("API server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting requests. Open log streams are cut off once `timeout` passes.
    pub async fn shutdown(&mut self, timeout: Duration) {
        self.cancel.cancel();
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            warn!("API connections still open after {:?}, closing", timeout);
            handle.abort();
        }
        info!("API server stopped");
    }
}
