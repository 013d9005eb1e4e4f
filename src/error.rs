//! Error types for wa-gateway.

use thiserror::Error;

use crate::session::{PairingChallenge, SessionState};

/// Main error type for gateway internals.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: SessionState,
        to: SessionState,
    },

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// Control channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

/// Convenience Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Which dispatch operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Plain text message.
    Message,
    /// Document sent from `/wa-send`.
    Attachment,
    /// Document sent from `/send-invoice`.
    Invoice,
}

/// Caller-facing failures of the dispatch pipeline.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Destination could not be mapped to a routable address.
    #[error("invalid phone number format: {input:?}")]
    InvalidAddressFormat {
        /// Raw destination as supplied.
        input: String,
        /// Normalized value at the point of failure (always empty).
        normalized: String,
    },

    /// No destination supplied.
    #[error("destination is required")]
    MissingDestination,

    /// No file supplied where one is mandatory.
    #[error("file is required")]
    MissingFile,

    /// Session cannot send right now.
    #[error("session not ready")]
    SessionNotReady {
        /// Pairing challenge to show the user, if one is pending.
        challenge: Option<PairingChallenge>,
    },

    /// Transport rejected or failed the send.
    #[error("dispatch failed: {detail}")]
    DispatchFailed {
        kind: DispatchKind,
        detail: String,
        /// Resolved address, echoed for diagnostics.
        normalized: String,
    },
}
