//! HTTP/WebSocket server assembly: shared state, routing, and the accept
//! loop with graceful shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use parley_store::ChatStore;

use crate::api;
use crate::calls::CallManager;
use crate::config::ServerConfig;
use crate::health;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session;

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Persistence.
    pub store: Arc<ChatStore>,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Event fan-out.
    pub broadcaster: Arc<Broadcaster>,
    /// Call lifecycle.
    pub calls: Arc<CallManager>,
    /// Shutdown coordination.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server start time, for uptime reporting.
    pub start_time: Instant,
    /// Prometheus render handle; `None` when no recorder is installed
    /// (tests).
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire up the full state graph from config and an opened store.
    pub fn new(
        config: ServerConfig,
        store: Arc<ChatStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            registry.clone(),
            store.clone(),
            config.max_send_drops,
        ));
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let calls = Arc::new(CallManager::new(
            store.clone(),
            broadcaster.clone(),
            Duration::from_secs(config.ring_timeout_secs),
            shutdown.token(),
        ));
        Self {
            config: Arc::new(config),
            store,
            registry,
            broadcaster,
            calls,
            shutdown,
            start_time: Instant::now(),
            metrics,
        }
    }
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let resp = health::health_check(
        state.start_time,
        state.registry.connection_count().await,
        state.registry.online_user_count().await,
    );
    Json(resp).into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.registry.connection_count().await >= state.config.max_connections {
        warn!(
            max_connections = state.config.max_connections,
            "connection rejected, server at capacity"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "server at capacity").into_response();
    }

    let conn_id = format!("conn_{}", Uuid::now_v7());
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| session::run_ws_session(socket, conn_id, state))
}

/// Bind and serve until shutdown (Ctrl-C or a coordinator cancel).
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "listening");

    let shutdown = state.shutdown.clone();
    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;

    info!("server stopped");
    Ok(())
}

async fn wait_for_shutdown(shutdown: Arc<ShutdownCoordinator>) {
    let token = shutdown.token();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
            shutdown.shutdown();
        }
        () = token.cancelled() => {}
    }
}
