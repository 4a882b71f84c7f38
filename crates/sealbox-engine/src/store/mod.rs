//! Session store abstraction.
//!
//! Durable mapping from session key to serialized ratchet state. The store
//! owns opaque bytes and nothing else: the engine owns the serialize/
//! deserialize pair (versioned blobs in `sealbox-proto`), so any backend
//! that can persist `(key, bytes)` works.
//!
//! # Locking Contract
//!
//! `with_lock` serializes all mutating access to a given session key. Two
//! concurrent operations must never read-modify-write the same session; that
//! would corrupt the ratchet (two threads advancing the same sending chain
//! would produce two messages claiming the same index). The granularity is
//! per key, never global: unrelated sessions proceed fully in parallel.

mod error;
mod memory;

use std::fmt;

pub use error::StoreError;
pub use memory::MemoryStore;
use sealbox_proto::SessionId;
use serde::{Deserialize, Serialize};

use crate::ids::{DeviceId, RoomId};

/// Key addressing one session's persisted state.
///
/// Pairwise, group-outbound, and group-inbound sessions have different state
/// machines and key-rotation rules, so the key is a tagged variant rather
/// than a flattened string the engines would have to parse back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKey {
    /// Pairwise double-ratchet session with a remote device
    Pairwise {
        /// Remote device
        device: DeviceId,
        /// Session id assigned at handshake
        session: SessionId,
    },
    /// Outbound group session owned by the local account
    GroupOutbound {
        /// Room the session encrypts for
        room: RoomId,
        /// Session id assigned at creation
        session: SessionId,
    },
    /// Inbound group session received from a room member
    GroupInbound {
        /// Room the session decrypts for
        room: RoomId,
        /// Sending device
        sender: DeviceId,
        /// Session id carried in the distribution message
        session: SessionId,
    },
    /// The local account's identity and prekey pool
    Identity,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pairwise { device, session } => write!(f, "pairwise/{device}/{session}"),
            Self::GroupOutbound { room, session } => write!(f, "group-out/{room}/{session}"),
            Self::GroupInbound { room, sender, session } => {
                write!(f, "group-in/{room}/{sender}/{session}")
            }
            Self::Identity => f.write_str("identity"),
        }
    }
}

/// Session store abstraction
///
/// This trait must be:
/// - Clone: clones share the same underlying storage (typically via `Arc`)
/// - Send + Sync: thread-safe for concurrent access
/// - Synchronous: no async methods; blocking is confined to lock acquisition
///   and the backend's own I/O
pub trait SessionStore: Clone + Send + Sync + 'static {
    /// Load the blob stored under `key`.
    ///
    /// Returns `None` if no session exists under this key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if underlying storage access fails.
    fn load(&self, key: &SessionKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `blob` under `key`, overwriting any existing value.
    fn save(&self, key: &SessionKey, blob: Vec<u8>) -> Result<(), StoreError>;

    /// Remove the blob stored under `key`. Removing a missing key is a no-op.
    fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;

    /// Run `f` while holding the exclusive lock for `key`.
    ///
    /// # Invariants
    ///
    /// - All mutating access to one key is serialized: no two closures for
    ///   the same key run concurrently
    /// - Closures for distinct keys may run in parallel
    /// - The closure's load-compute-save sequence is atomic with respect to
    ///   other `with_lock` callers on the same key
    fn with_lock<T, E, F>(&self, key: &SessionKey, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<StoreError>;
}
