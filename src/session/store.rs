//! The process-wide session record.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::SessionState;
use crate::transport::Transport;

/// Opaque device-linking code shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PairingChallenge(String);

impl PairingChallenge {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the paired account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The transport session as seen by the rest of the process.
#[derive(Debug, Clone)]
pub struct Session {
    /// Current state.
    pub state: SessionState,
    /// Pending challenge; only present while pairing.
    pub challenge: Option<PairingChallenge>,
    /// Paired account; only present once ready.
    pub identity: Option<Identity>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            challenge: None,
            identity: None,
        }
    }

    /// Move to `target`, enforcing the state machine.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        self.state.transition_to(target)
    }

    /// Drop everything tied to the current transport session.
    pub fn clear(&mut self) {
        self.challenge = None;
        self.identity = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Readiness snapshot returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub ready: bool,
    pub identity: Option<Identity>,
}

/// Session record plus the transport currently bound to it.
///
/// Both live under one lock so the readiness gate and the transport handle
/// are always read together.
#[derive(Default)]
pub(crate) struct SessionSlot {
    pub session: Session,
    pub transport: Option<Arc<dyn Transport>>,
}

impl SessionSlot {
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            ready: self.session.state.is_ready(),
            identity: self.session.identity.clone(),
        }
    }

    /// The transport, if and only if the session is ready.
    pub fn ready_transport(&self) -> Option<Arc<dyn Transport>> {
        if self.session.state.is_ready() {
            self.transport.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = Session::new();
        assert_eq!(session.state, SessionState::Uninitialized);
        assert!(session.challenge.is_none());
        assert!(session.identity.is_none());
    }

    #[test]
    fn test_transition_rejected_keeps_state() {
        let mut session = Session::new();
        session.transition_to(SessionState::Ready).unwrap();
        assert!(session.transition_to(SessionState::Pairing).is_err());
        assert_eq!(session.state, SessionState::Ready);
    }

    #[test]
    fn test_clear() {
        let mut session = Session::new();
        session.challenge = Some(PairingChallenge::new("2@abc"));
        session.identity = Some(Identity::new("94771234567@c.us"));
        session.clear();
        assert!(session.challenge.is_none());
        assert!(session.identity.is_none());
    }

    #[test]
    fn test_slot_gates_transport_on_readiness() {
        let slot = SessionSlot::default();
        assert!(slot.ready_transport().is_none());
        assert!(!slot.status().ready);
    }

    #[test]
    fn test_challenge_serializes_as_string() {
        let json = serde_json::to_string(&PairingChallenge::new("2@xyz")).unwrap();
        assert_eq!(json, "\"2@xyz\"");
    }
}
