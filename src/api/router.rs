//! API router configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health, send_invoice, wa_qr, wa_reset, wa_send, wa_status, AppState};
use super::websocket::ws_handler;
use crate::error::GatewayError;

/// Room left in a request body for multipart framing and text fields.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the API router with the given state.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.uploads.max_file_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health))
        .route("/wa-status", get(wa_status))
        .route("/wa-qr", get(wa_qr))
        .route("/wa-send", post(wa_send))
        .route("/send-invoice", post(send_invoice))
        .route("/wa-reset", post(wa_reset))
        .route("/wa-events", any(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Finish in-flight requests on Ctrl-C instead of dropping them.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            graceful_shutdown: true,
        }
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000)
    }
}

/// Start the API server and run until shut down.
pub async fn serve(config: ServerConfig, state: AppState) -> crate::Result<()> {
    let addr = config.bind_address();
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(GatewayError::Io)?;
    tracing::info!("Server running on http://{}", addr);

    let server = axum::serve(listener, router);
    let result = if config.graceful_shutdown {
        server.with_graceful_shutdown(shutdown_signal()).await
    } else {
        server.await
    };

    result.map_err(|e| GatewayError::Io(std::io::Error::other(e.to_string())))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}
