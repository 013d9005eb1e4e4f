//! Session management module.
//!
//! This module owns the single transport session: its state machine, the
//! stored credentials and the supervisor that drives recovery.

mod credentials;
mod manager;
mod state;
mod store;

pub use credentials::{CredentialStore, DEFAULT_CREDENTIALS_DIR};
pub use manager::{RecoveryPolicy, SessionManager};
pub use state::SessionState;
pub use store::{Identity, PairingChallenge, Session, SessionStatus};
