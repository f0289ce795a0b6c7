//! HTTP/WebSocket front-end for the runner.
#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use futures::SinkExt;
use futures::StreamExt;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use runbox_core::BoxPool;
use runbox_core::IsolateDriver;
use runbox_core::SandboxDriver;
use runbox_protocol::Frame;
use runbox_protocol::HealthStatus;

mod cli;
mod session;

pub use cli::Cli;

/// How long an upgraded connection may wait for a box before it is turned
/// away. The pre-upgrade fast path already rejected plainly overloaded
/// clients; this deadline only covers the window in which other sessions
/// drained the pool between the check and the acquire.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BoxPool>,
    pub driver: Arc<dyn SandboxDriver>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    // Users can control the log level with `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let driver: Arc<dyn SandboxDriver> = Arc::new(IsolateDriver);
    let pool = Arc::new(BoxPool::initialize(cli.max_boxes, Arc::clone(&driver)).await?);
    let state = AppState { pool, driver };

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "websocket server listening on {addr} with {} boxes",
        state.pool.size()
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    let available = state.pool.available();
    Json(HealthStatus {
        status: "healthy".to_string(),
        max_boxes: state.pool.size(),
        available,
        in_use: state.pool.size() - available,
    })
}

/// Admission: reject before the upgrade when the pool is plainly empty, then
/// re-check with a bounded acquire after the upgrade. The second check is
/// not redundant: other sessions may have drained the pool in between.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.pool.available() == 0 {
        warn!("no available boxes, rejecting connection");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Server is busy. No available boxes. Please try again later.",
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| admit(socket, state))
}

async fn admit(socket: WebSocket, state: AppState) {
    match state.pool.acquire(ACQUIRE_TIMEOUT).await {
        Ok(box_id) => {
            info!("box {box_id} allocated");
            session::run(socket, box_id, state).await;
        }
        Err(err) => {
            warn!("failed to allocate box within timeout: {err}");
            send_final_error(socket, "Failed to allocate box. Please try again.").await;
        }
    }
}

/// Send one `error` frame and close the socket.
async fn send_final_error(socket: WebSocket, message: &str) {
    let (mut sink, _stream) = socket.split();
    if let Ok(json) = serde_json::to_string(&Frame::error(message)) {
        let _ = sink.send(Message::Text(json.into())).await;
    }
    let _ = sink.close().await;
}
