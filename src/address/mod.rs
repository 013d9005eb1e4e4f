//! Phone number normalization.
//!
//! Turns user-typed phone numbers into the canonical routing address used
//! by the transport.

mod normalize;

pub use normalize::{normalize, normalize_with, CanonicalAddress, ChatId, NumberingPlan};
