//! HTTP and WebSocket surface of the gateway.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /wa-status` - Readiness and the paired account
//! - `GET /wa-qr` - Pending pairing challenge
//! - `POST /wa-send` - Send a text message or document (multipart)
//! - `POST /send-invoice` - Deliver an invoice document (multipart)
//! - `POST /wa-reset` - Clear the session and pair again
//! - `WS /wa-events` - Live lifecycle events
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wa_gateway::api::{serve, AppState, ServerConfig, UploadConfig};
//! use wa_gateway::dispatch::Dispatcher;
//! use wa_gateway::events::EventBroadcaster;
//! use wa_gateway::session::{CredentialStore, RecoveryPolicy, SessionManager};
//! use wa_gateway::transport::{BridgeConfig, BridgeConnector};
//!
//! #[tokio::main]
//! async fn main() -> wa_gateway::Result<()> {
//!     let session = SessionManager::start(
//!         Arc::new(BridgeConnector::new(BridgeConfig::default())),
//!         CredentialStore::new(".wwebjs_auth/session-inventory-wa"),
//!         Arc::new(EventBroadcaster::new()),
//!         RecoveryPolicy::default(),
//!     );
//!     session.initialize().await?;
//!
//!     let dispatcher = Dispatcher::new(Arc::clone(&session));
//!     let state = AppState::new(session, dispatcher, UploadConfig::new("uploads"));
//!     serve(ServerConfig::default(), state).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;
pub mod upload;
pub mod websocket;

pub use handlers::{ApiError, AppState};
pub use router::{create_router, serve, ServerConfig};
pub use types::{ErrorResponse, WsMessage};
pub use upload::{UploadConfig, UploadError, DEFAULT_MAX_FILE_BYTES};
