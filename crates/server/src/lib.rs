//! Downstream fan-out over WebSocket.
//!
//! `GET /` admits a partial client that only receives events emitted after
//! it connected. `GET /full` additionally receives the whole record store as
//! a single snapshot message first. Both are refused with
//! `503 Service Unavailable` until the feed has finished backfilling.

mod error;
mod session;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use feedy_ingestion::Feed;
use feedy_telemetry::Metrics;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use error::ServerError;

#[derive(Clone)]
struct AppState {
    feed: Feed,
    metrics: Metrics,
}

/// Routes for the fan-out server.
pub fn router(feed: Feed, metrics: Metrics) -> Router {
    Router::new()
        .route("/", get(partial_client))
        .route("/full", get(full_client))
        .with_state(AppState { feed, metrics })
}

/// Bind the client-facing listener.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
    info!("Fan-out server listening on ws://{}", addr);
    Ok(listener)
}

/// Serve clients until the listener fails.
pub async fn serve(listener: TcpListener, feed: Feed, metrics: Metrics) -> Result<(), ServerError> {
    axum::serve(listener, router(feed, metrics))
        .await
        .map_err(ServerError::Serve)
}

async fn partial_client(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    admit(state, ws, false)
}

async fn full_client(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    admit(state, ws, true)
}

/// Refuse early while backfilling. Registration happens once the socket is
/// open, so an upgrade that never completes leaves nothing behind.
fn admit(state: AppState, ws: WebSocketUpgrade, wants_snapshot: bool) -> Response {
    if !state.feed.is_live() {
        warn!(full = wants_snapshot, "Refusing client, backfill in progress");
        state.metrics.inc_clients_refused();
        return (StatusCode::SERVICE_UNAVAILABLE, "backfill in progress").into_response();
    }

    ws.on_upgrade(move |socket| session::run(socket, state.feed, state.metrics, wants_snapshot))
}
