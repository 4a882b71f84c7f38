//! Pairwise double-ratchet sessions.
//!
//! [`PairwiseEngine`] runs the X3DH handshake and the per-message double
//! ratchet between the local account and one remote device. Session state is
//! loaded from the [`SessionStore`](crate::store::SessionStore) at the start
//! of every operation and persisted only after the operation succeeds, all
//! under the store's per-key lock.

mod engine;
mod state;

pub use engine::PairwiseEngine;
pub use state::SessionPhase;

pub(crate) use state::PairwiseState;
