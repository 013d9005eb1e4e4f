//! Session lifecycle fan-out.

mod broadcaster;

pub use broadcaster::{EventBroadcaster, ObserverId, Subscription, DEFAULT_OBSERVER_CAPACITY};

use crate::session::{Identity, PairingChallenge, SessionState};

/// Extra data carried by a lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    None,
    /// Challenge to scan (pairing).
    Challenge(PairingChallenge),
    /// Failure or disconnect reason.
    Reason(String),
    /// Paired account (ready).
    Identity(Identity),
}

/// A session state change, as published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub state: SessionState,
    pub payload: EventPayload,
}

impl LifecycleEvent {
    pub fn new(state: SessionState, payload: EventPayload) -> Self {
        Self { state, payload }
    }

    pub fn pairing(challenge: PairingChallenge) -> Self {
        Self::new(SessionState::Pairing, EventPayload::Challenge(challenge))
    }

    /// The pairing challenge carried by this event, if any.
    pub fn challenge(&self) -> Option<&PairingChallenge> {
        match &self.payload {
            EventPayload::Challenge(c) => Some(c),
            _ => None,
        }
    }
}
