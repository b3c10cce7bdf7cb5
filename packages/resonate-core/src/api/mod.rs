//! HTTP/WebSocket API layer: the server's only transport-facing module.
//!
//! Everything below this layer (`client_proxy`, `session`, `group`,
//! `server`) is transport-agnostic; this module's job is to speak axum and
//! WebSocket framing and translate that into calls on [`crate::server::Server`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use thiserror::Error;

use crate::events::BroadcastEventBridge;
use crate::server::Server;

pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// A thin wrapper over the domain objects; all protocol logic lives in
/// [`crate::server::Server`] and its collaborators.
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    /// Per-client outbound backlog bound (§7 Capacity errors): a client
    /// whose outbound queue exceeds this is evicted.
    pub max_client_backlog: usize,
}

impl AppState {
    pub fn new(server: Arc<Server>, event_bridge: Arc<BroadcastEventBridge>, max_client_backlog: usize) -> Self {
        Self {
            server,
            event_bridge,
            ws_manager: Arc::new(WsConnectionManager::new()),
            max_client_backlog,
        }
    }
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves the `/ws` upgrade route until the process exits.
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    log::info!("[Server] listening on ws://{}/ws", addr);
    let app = create_router(state);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
