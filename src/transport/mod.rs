//! Messaging transport contract.
//!
//! The messaging network client is an external collaborator. The gateway
//! only sees two seams:
//!
//! - [`Connector`] builds a fresh transport session and reports lifecycle
//!   changes as [`TransportEvent`]s on a channel, in order.
//! - [`Transport`] sends text and documents on that session.
//!
//! [`BridgeConnector`] drives an external bridge process over JSON lines;
//! [`ScriptedConnector`] is an in-memory double for tests and local runs.

pub mod bridge;
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use tokio::sync::mpsc;

use crate::address::ChatId;
use crate::session::{Identity, PairingChallenge};

pub use bridge::{BridgeConfig, BridgeConnector, DEFAULT_BRIDGE_PROGRAM, SESSION_DIR_ENV};
pub use scripted::{ScriptedConnector, SentMessage};

/// Lifecycle notification from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A new pairing challenge is waiting to be scanned.
    PairingChallenge(PairingChallenge),
    /// Device-level authentication succeeded.
    Authenticated,
    /// The session is fully usable.
    Ready { identity: Option<Identity> },
    /// Stored or scanned credentials were rejected.
    AuthFailure(String),
    /// The link to the network was lost.
    Disconnected(String),
}

/// A document ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mime_type: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

impl MediaPayload {
    pub fn new(mime_type: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            file_name: file_name.into(),
            data,
        }
    }

    /// Payload bytes as standard base64.
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Send operations on a live transport session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, to: &ChatId, body: &str) -> crate::Result<()>;

    /// Send a document with an optional caption.
    async fn send_document(
        &self,
        to: &ChatId,
        media: MediaPayload,
        caption: Option<&str>,
    ) -> crate::Result<()>;

    /// Release every resource held by this session.
    async fn shutdown(&self);
}

/// Builds transport sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Start a new transport session reporting to `events`.
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> crate::Result<Arc<dyn Transport>>;
}
