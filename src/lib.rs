//! # wa-gateway
//!
//! HTTP gateway that delivers text messages and documents to WhatsApp
//! recipients through a single QR-paired device session.
//!
//! ## Features
//!
//! - **Address normalization**: loosely formatted local numbers become
//!   canonical international addresses
//! - **Session supervision**: pairing, readiness, and automatic recovery
//!   after auth failures, disconnects, and manual resets
//! - **Live events**: lifecycle changes pushed to WebSocket observers
//! - **Pluggable transport**: a child-process bridge in production, a
//!   scripted stand-in for tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wa_gateway::{
//!     normalize, CredentialStore, Dispatcher, EventBroadcaster, RecoveryPolicy, ScriptedConnector,
//!     SendRequest, SessionManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> wa_gateway::Result<()> {
//!     wa_gateway::logging::try_init().ok();
//!
//!     let address = normalize("077 123 4567").expect("valid number");
//!     assert_eq!(address.as_str(), "94771234567");
//!
//!     let session = SessionManager::start(
//!         Arc::new(ScriptedConnector::new()),
//!         CredentialStore::new("/tmp/wa-creds"),
//!         Arc::new(EventBroadcaster::new()),
//!         RecoveryPolicy::default(),
//!     );
//!     session.initialize().await?;
//!
//!     let dispatcher = Dispatcher::new(Arc::clone(&session));
//!     if let Err(e) = dispatcher.send(SendRequest::text("0771234567", "hello")).await {
//!         println!("not sent: {}", e);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod api;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use address::{normalize, normalize_with, CanonicalAddress, ChatId, NumberingPlan};
pub use dispatch::{Attachment, Dispatcher, InvoiceRequest, SendRequest};
pub use error::{DispatchError, GatewayError, Result};
pub use events::{EventBroadcaster, LifecycleEvent, Subscription};
pub use session::{CredentialStore, RecoveryPolicy, SessionManager, SessionState, SessionStatus};
pub use transport::{Connector, ScriptedConnector, Transport, TransportEvent};
