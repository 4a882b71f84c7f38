//! Group session engine.

use rand::{CryptoRng, RngCore};
use sealbox_proto::{BlobKind, GroupDistributionMessage, GroupMessage, SessionBlob, SessionId};

use crate::{
    config::EngineConfig,
    error::EngineError,
    group::{InboundGroupState, OutboundGroupState},
    ids::{DeviceId, RoomId},
    store::{SessionKey, SessionStore},
    trust::{TrustLedger, TrustState},
};

/// Engine for group sender-key sessions.
///
/// Same transaction discipline as the pairwise engine: load under the
/// per-key lock, step, persist only on success.
#[derive(Clone)]
pub struct GroupEngine<S: SessionStore> {
    store: S,
    trust: TrustLedger,
    config: EngineConfig,
}

impl<S: SessionStore> GroupEngine<S> {
    /// Create an engine over `store`, sharing `trust` with the host.
    pub fn new(store: S, trust: TrustLedger, config: EngineConfig) -> Self {
        Self { store, trust, config }
    }

    /// Create a fresh outbound session for `room`.
    ///
    /// The host calls this on room creation and again whenever membership
    /// changes or compromise is suspected; rotating the session is the only
    /// break-in recovery the group direction has.
    pub fn create_outbound<R: RngCore + CryptoRng>(
        &self,
        room: &RoomId,
        rng: &mut R,
    ) -> Result<SessionId, EngineError> {
        let mut id_bytes = [0u8; 16];
        rng.fill_bytes(&mut id_bytes);
        let session_id = SessionId::from_bytes(id_bytes);

        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let state = OutboundGroupState::new(seed);

        let key = SessionKey::GroupOutbound { room: room.clone(), session: session_id };
        self.store.with_lock(&key, || {
            if self.store.load(&key)?.is_some() {
                return Err(EngineError::AlreadyExists { resource: key.to_string() });
            }
            self.store.save(&key, SessionBlob::seal(BlobKind::GroupOutbound, &state)?)?;
            Ok(())
        })?;

        tracing::info!(%room, session = %session_id, "created outbound group session");
        Ok(session_id)
    }

    /// Export the outbound session's chain at its current position.
    ///
    /// The result carries live key material and must only travel to each
    /// recipient inside an established pairwise ciphertext. A recipient can
    /// decrypt from the exported index forward, never earlier.
    pub fn share(
        &self,
        room: &RoomId,
        session_id: SessionId,
    ) -> Result<GroupDistributionMessage, EngineError> {
        let key = SessionKey::GroupOutbound { room: room.clone(), session: session_id };
        self.store.with_lock(&key, || {
            let state: OutboundGroupState = self.load_state(&key, BlobKind::GroupOutbound)?;
            Ok(state.distribution(session_id))
        })
    }

    /// Encrypt `plaintext` for `room` on the outbound session.
    pub fn encrypt(
        &self,
        room: &RoomId,
        session_id: SessionId,
        plaintext: &[u8],
    ) -> Result<GroupMessage, EngineError> {
        let key = SessionKey::GroupOutbound { room: room.clone(), session: session_id };
        self.store.with_lock(&key, || {
            let mut state: OutboundGroupState = self.load_state(&key, BlobKind::GroupOutbound)?;
            let message = state.encrypt(session_id, plaintext)?;
            self.store.save(&key, SessionBlob::seal(BlobKind::GroupOutbound, &state)?)?;
            Ok(message)
        })
    }

    /// Install (or refresh) the inbound session described by `distribution`.
    ///
    /// Idempotent against redelivery: if a session with this id from this
    /// sender already exists at an equal or earlier install point, the
    /// existing state wins so replay tracking is never reset.
    pub fn import_inbound(
        &self,
        room: &RoomId,
        sender: &DeviceId,
        distribution: &GroupDistributionMessage,
    ) -> Result<SessionId, EngineError> {
        self.ensure_not_blocked(sender)?;

        let session_id = distribution.session_id;
        let key = SessionKey::GroupInbound {
            room: room.clone(),
            sender: sender.clone(),
            session: session_id,
        };
        self.store.with_lock::<(), EngineError, _>(&key, || {
            if let Some(bytes) = self.store.load(&key)? {
                let existing: InboundGroupState = SessionBlob::open(&bytes, BlobKind::GroupInbound)?;
                if existing.first_index() <= distribution.index {
                    return Ok(());
                }
            }
            let state = InboundGroupState::install(distribution.chain_key, distribution.index);
            self.store.save(&key, SessionBlob::seal(BlobKind::GroupInbound, &state)?)?;
            Ok(())
        })?;

        tracing::info!(%room, device = %sender, session = %session_id, "imported inbound group session");
        Ok(session_id)
    }

    /// Decrypt a group message from `sender`.
    ///
    /// # Errors
    ///
    /// - `PeerBlocked` if the ledger blocks `sender`
    /// - `NotFound` if no inbound session matches
    /// - `KeyTooOld`, `ReplayedMessage`, `SkippedKeyLimitExceeded`,
    ///   `AuthenticationFailed` per the chain rules
    pub fn decrypt(
        &self,
        room: &RoomId,
        sender: &DeviceId,
        message: &GroupMessage,
    ) -> Result<Vec<u8>, EngineError> {
        self.ensure_not_blocked(sender)?;

        let key = SessionKey::GroupInbound {
            room: room.clone(),
            sender: sender.clone(),
            session: message.session_id,
        };
        self.store.with_lock(&key, || {
            let mut state: InboundGroupState = self.load_state(&key, BlobKind::GroupInbound)?;
            let plaintext = state.decrypt(message, &self.config)?;
            self.store.save(&key, SessionBlob::seal(BlobKind::GroupInbound, &state)?)?;
            Ok(plaintext)
        })
    }

    /// Permanently delete the outbound session for `room`.
    ///
    /// Called when a room is abandoned; recipients simply stop receiving.
    pub fn revoke_outbound(
        &self,
        room: &RoomId,
        session_id: SessionId,
    ) -> Result<(), EngineError> {
        let key = SessionKey::GroupOutbound { room: room.clone(), session: session_id };
        self.store.with_lock(&key, || {
            if self.store.load(&key)?.is_none() {
                return Err(EngineError::NotFound { resource: key.to_string() });
            }
            self.store.delete(&key)?;
            Ok(())
        })?;

        tracing::info!(%room, session = %session_id, "revoked outbound group session");
        Ok(())
    }

    fn load_state<T: serde::de::DeserializeOwned>(
        &self,
        key: &SessionKey,
        kind: BlobKind,
    ) -> Result<T, EngineError> {
        let Some(bytes) = self.store.load(key)? else {
            return Err(EngineError::NotFound { resource: key.to_string() });
        };
        Ok(SessionBlob::open(&bytes, kind)?)
    }

    fn ensure_not_blocked(&self, device: &DeviceId) -> Result<(), EngineError> {
        match self.trust.get_trust(device) {
            TrustState::Blocked => Err(EngineError::PeerBlocked { device: device.clone() }),
            TrustState::Unverified => {
                tracing::warn!(%device, "group traffic from unverified device");
                Ok(())
            }
            TrustState::Verified => Ok(()),
        }
    }
}
