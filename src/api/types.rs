//! API request and response types.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchKind};
use crate::events::{EventPayload, LifecycleEvent};
use crate::session::{Identity, PairingChallenge, SessionState, SessionStatus};

const INVALID_NUMBER: &str = "Invalid phone number format. Please enter a valid Sri Lankan number (e.g., 0771234567 or 771234567).";

/// Response for `GET /wa-status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// `Connected` or `waiting`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
}

impl StatusResponse {
    pub fn from_status(status: SessionStatus) -> Self {
        if status.ready {
            Self {
                status: "Connected",
                user: status.identity,
            }
        } else {
            Self {
                status: "waiting",
                user: None,
            }
        }
    }
}

/// Response for `GET /wa-qr`.
#[derive(Debug, Clone, Serialize)]
pub struct QrResponse {
    pub qr: PairingChallenge,
}

/// Response for a successful `POST /wa-send`.
#[derive(Debug, Clone, Serialize)]
pub struct SendResponse {
    pub status: &'static str,
    #[serde(rename = "normalizedTo")]
    pub normalized_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl SendResponse {
    pub fn sent(normalized_to: impl Into<String>, file: Option<String>) -> Self {
        Self {
            status: "sent",
            normalized_to: normalized_to.into(),
            file,
        }
    }
}

/// Generic message response.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for `POST /wa-reset`.
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
    pub message: &'static str,
}

impl Default for ResetResponse {
    fn default() -> Self {
        Self {
            status: "reset",
            message: "WhatsApp session cleared. Please reload and scan new QR.",
        }
    }
}

/// Generic API error response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Underlying failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Destination as supplied, echoed on address errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Normalized value at the point of an address error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<String>,
    /// Resolved address, echoed on dispatch failures.
    #[serde(rename = "normalizedTo", skip_serializing_if = "Option::is_none")]
    pub normalized_to: Option<String>,
    /// Pending pairing challenge, when re-pairing would help.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<PairingChallenge>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_normalized_to(mut self, normalized: impl Into<String>) -> Self {
        self.normalized_to = Some(normalized.into());
        self
    }

    pub fn with_qr(mut self, qr: PairingChallenge) -> Self {
        self.qr = Some(qr);
        self
    }

    /// Status and body for a `/wa-send` failure.
    pub fn for_send(err: DispatchError) -> (StatusCode, Self) {
        match err {
            DispatchError::InvalidAddressFormat { input, normalized } => (
                StatusCode::BAD_REQUEST,
                Self {
                    input: Some(input),
                    normalized: Some(normalized),
                    ..Self::new(INVALID_NUMBER)
                },
            ),
            DispatchError::MissingDestination => (
                StatusCode::BAD_REQUEST,
                Self::new("Recipient phone number is required."),
            ),
            DispatchError::MissingFile => {
                (StatusCode::BAD_REQUEST, Self::new("File is required."))
            }
            DispatchError::SessionNotReady {
                challenge: Some(qr),
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                Self::new("WhatsApp not connected. Scan QR to reconnect.").with_qr(qr),
            ),
            DispatchError::SessionNotReady { challenge: None } => (
                StatusCode::SERVICE_UNAVAILABLE,
                Self::new("WhatsApp not connected and no QR available."),
            ),
            DispatchError::DispatchFailed {
                kind,
                detail,
                normalized,
            } => {
                let error = match kind {
                    DispatchKind::Attachment => "Failed to send attachment.",
                    DispatchKind::Message => "Failed to send message.",
                    DispatchKind::Invoice => "Failed to send invoice.",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Self::new(error)
                        .with_details(detail)
                        .with_normalized_to(normalized),
                )
            }
        }
    }

    /// Status and body for a `/send-invoice` failure.
    pub fn for_invoice(err: DispatchError) -> (StatusCode, Self) {
        match err {
            DispatchError::MissingDestination
            | DispatchError::MissingFile
            | DispatchError::InvalidAddressFormat { .. } => (
                StatusCode::BAD_REQUEST,
                Self::new("Mobile number and invoice file are required."),
            ),
            DispatchError::SessionNotReady { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                Self::new("WhatsApp client not ready. Please wait for connection or scan QR code."),
            ),
            DispatchError::DispatchFailed { detail, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Self::new("Failed to send invoice.").with_details(detail),
            ),
        }
    }
}

/// WebSocket message types on `/wa-events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Server sends a pairing challenge.
    Qr { qr: String },
    /// Server sends a status change.
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
    /// Error message.
    Error { code: String, message: String },
    /// Ping/pong for connection health.
    Ping,
    Pong,
}

impl WsMessage {
    /// Frames announcing a lifecycle event.
    pub fn from_event(event: &LifecycleEvent) -> Vec<WsMessage> {
        let status = |reason: Option<String>, user: Option<String>| WsMessage::Status {
            status: event.state.label().to_string(),
            reason,
            user,
        };

        match (&event.state, &event.payload) {
            (SessionState::Pairing, EventPayload::Challenge(challenge)) => vec![
                WsMessage::Qr {
                    qr: challenge.to_string(),
                },
                status(None, None),
            ],
            (_, EventPayload::Reason(reason)) => vec![status(Some(reason.clone()), None)],
            (_, EventPayload::Identity(identity)) => vec![status(None, Some(identity.to_string()))],
            _ => vec![status(None, None)],
        }
    }
}
