//! Session state machine.

/// Lifecycle state of the transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport session, or one that has not reported anything yet.
    #[default]
    Uninitialized,
    /// Waiting for the user to scan a pairing challenge.
    Pairing,
    /// Device linked, account not yet usable.
    Authenticated,
    /// Fully usable for sending.
    Ready,
    /// Credentials were rejected; re-initialization pending.
    AuthFailed,
    /// Link lost; re-initialization pending.
    Disconnected,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Uninitialized | Pairing -> Pairing
    /// - Uninitialized | Pairing -> Authenticated
    /// - Uninitialized | Pairing | Authenticated -> Ready
    /// - any -> AuthFailed | Disconnected
    /// - any -> Uninitialized
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Uninitialized | Pairing, Pairing)
                | (Uninitialized | Pairing, Authenticated)
                | (Uninitialized | Pairing | Authenticated, Ready)
                | (_, AuthFailed)
                | (_, Disconnected)
                | (_, Uninitialized)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::GatewayError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if the session can send messages.
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    /// Human-readable status string sent to observers.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "Reset",
            SessionState::Pairing => "Please scan QR code",
            SessionState::Authenticated => "Authenticated",
            SessionState::Ready => "Connected",
            SessionState::AuthFailed => "Auth Failure",
            SessionState::Disconnected => "Disconnected",
        }
    }
}
