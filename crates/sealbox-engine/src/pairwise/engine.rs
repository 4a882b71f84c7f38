//! Pairwise session engine.

use rand::{CryptoRng, RngCore};
use sealbox_crypto::{DhKeyPair, verify, x3dh_initiator, x3dh_responder};
use sealbox_proto::{BlobKind, HandshakeMessage, KeyBundle, RatchetMessage, SessionBlob, SessionId};

use crate::{
    config::EngineConfig,
    error::EngineError,
    identity::{Identity, IdentityStore},
    ids::DeviceId,
    pairwise::PairwiseState,
    store::{SessionKey, SessionStore},
    trust::{TrustLedger, TrustState},
};

/// Engine for pairwise double-ratchet sessions.
///
/// Every operation is a load-step-save transaction under the store's per-key
/// lock; state is persisted only when the operation succeeds, so a failed
/// decrypt leaves the ratchet exactly where it was.
#[derive(Clone)]
pub struct PairwiseEngine<S: SessionStore> {
    store: S,
    trust: TrustLedger,
    config: EngineConfig,
}

impl<S: SessionStore> PairwiseEngine<S> {
    /// Create an engine over `store`, sharing `trust` with the host.
    pub fn new(store: S, trust: TrustLedger, config: EngineConfig) -> Self {
        Self { store, trust, config }
    }

    /// Open a session toward `remote_device` from its published bundle.
    ///
    /// Verifies the signed-prekey signature, runs the initiator side of the
    /// handshake (consuming the bundle's first one-time prekey if present),
    /// and seals `first_plaintext` into the returned handshake message so the
    /// very first payload is already ratchet-protected.
    ///
    /// # Errors
    ///
    /// - `PeerBlocked` if the ledger blocks `remote_device`
    /// - `InvalidRemoteKey` if the signed-prekey signature does not verify
    /// - `AlreadyExists` if the generated session id collides
    pub fn initiate<R: RngCore + CryptoRng>(
        &self,
        identity: &Identity,
        remote_device: &DeviceId,
        bundle: &KeyBundle,
        first_plaintext: &[u8],
        rng: &mut R,
    ) -> Result<(SessionId, HandshakeMessage), EngineError> {
        self.ensure_not_blocked(remote_device)?;

        verify(
            &bundle.identity_signing_key,
            &bundle.signed_prekey,
            &bundle.signed_prekey_signature,
        )?;

        let ephemeral = DhKeyPair::generate(rng);
        let one_time = bundle.one_time_prekeys.first();
        let shared_secret = x3dh_initiator(
            identity.dh(),
            &ephemeral,
            &bundle.identity_dh_key,
            &bundle.signed_prekey,
            one_time.map(|prekey| &prekey.key),
        );

        let mut state = PairwiseState::new_initiator(shared_secret, &bundle.signed_prekey, rng);
        let message = state.encrypt(first_plaintext)?;

        let mut id_bytes = [0u8; 16];
        rng.fill_bytes(&mut id_bytes);
        let session_id = SessionId::from_bytes(id_bytes);

        let handshake = HandshakeMessage {
            session_id,
            identity_signing_key: identity.signing_public(),
            identity_dh_key: identity.dh_public(),
            ephemeral_key: ephemeral.public_bytes(),
            signed_prekey_id: bundle.signed_prekey_id,
            one_time_prekey_id: one_time.map(|prekey| prekey.id),
            message,
        };

        let key = SessionKey::Pairwise { device: remote_device.clone(), session: session_id };
        self.store.with_lock(&key, || {
            if self.store.load(&key)?.is_some() {
                return Err(EngineError::AlreadyExists { resource: key.to_string() });
            }
            self.store.save(&key, SessionBlob::seal(BlobKind::Pairwise, &state)?)?;
            Ok(())
        })?;

        tracing::info!(device = %remote_device, session = %session_id, "initiated session");
        Ok((session_id, handshake))
    }

    /// Accept an inbound handshake from `remote_device`.
    ///
    /// Resolves the referenced prekeys, runs the responder side of the
    /// handshake, and decrypts the embedded first message. The one-time
    /// prekey is consumed even when the embedded message fails to decrypt;
    /// the session itself is only persisted on success.
    ///
    /// # Errors
    ///
    /// - `PeerBlocked` if the ledger blocks `remote_device`
    /// - `UnknownPrekey` if a referenced prekey is missing or already used
    /// - `AlreadyExists` if a session with this id is already stored
    pub fn accept<R: RngCore + CryptoRng>(
        &self,
        identity_store: &IdentityStore,
        remote_device: &DeviceId,
        handshake: &HandshakeMessage,
        rng: &mut R,
    ) -> Result<(SessionId, Vec<u8>), EngineError> {
        self.ensure_not_blocked(remote_device)?;

        let identity = identity_store.identity()?;
        let signed_prekey = identity_store.signed_prekey(handshake.signed_prekey_id)?;
        let one_time = match handshake.one_time_prekey_id {
            Some(id) => match identity_store.consume_one_time_prekey(id) {
                Ok(pair) => Some(pair),
                Err(EngineError::NotFound { .. }) => {
                    return Err(EngineError::UnknownPrekey { id });
                }
                Err(other) => return Err(other),
            },
            None => None,
        };

        let shared_secret = x3dh_responder(
            identity.dh(),
            &signed_prekey,
            one_time.as_ref(),
            &handshake.identity_dh_key,
            &handshake.ephemeral_key,
        );

        let mut state = PairwiseState::new_responder(shared_secret, &signed_prekey);
        let plaintext = state.decrypt(&handshake.message, &self.config, rng)?;

        let key =
            SessionKey::Pairwise { device: remote_device.clone(), session: handshake.session_id };
        self.store.with_lock(&key, || {
            if self.store.load(&key)?.is_some() {
                return Err(EngineError::AlreadyExists { resource: key.to_string() });
            }
            self.store.save(&key, SessionBlob::seal(BlobKind::Pairwise, &state)?)?;
            Ok(())
        })?;

        tracing::info!(device = %remote_device, session = %handshake.session_id, "accepted session");
        Ok((handshake.session_id, plaintext))
    }

    /// Encrypt `plaintext` on the session with `remote_device`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session exists under this id (including a
    /// revoked one).
    pub fn encrypt(
        &self,
        remote_device: &DeviceId,
        session_id: SessionId,
        plaintext: &[u8],
    ) -> Result<RatchetMessage, EngineError> {
        let key = SessionKey::Pairwise { device: remote_device.clone(), session: session_id };
        self.store.with_lock(&key, || {
            let mut state = self.load_state(&key)?;
            let message = state.encrypt(plaintext)?;
            self.store.save(&key, SessionBlob::seal(BlobKind::Pairwise, &state)?)?;
            Ok(message)
        })
    }

    /// Decrypt `message` on the session with `remote_device`.
    ///
    /// State advances (and skipped keys are consumed) only when decryption
    /// succeeds; replays and forgeries leave the persisted ratchet untouched.
    ///
    /// # Errors
    ///
    /// - `PeerBlocked` if the ledger blocks `remote_device`
    /// - `NotFound` if no session exists under this id
    /// - `ReplayedMessage`, `SkippedKeyLimitExceeded`, `AuthenticationFailed`
    ///   per the ratchet rules
    pub fn decrypt<R: RngCore + CryptoRng>(
        &self,
        remote_device: &DeviceId,
        session_id: SessionId,
        message: &RatchetMessage,
        rng: &mut R,
    ) -> Result<Vec<u8>, EngineError> {
        self.ensure_not_blocked(remote_device)?;

        let key = SessionKey::Pairwise { device: remote_device.clone(), session: session_id };
        self.store.with_lock(&key, || {
            let mut state = self.load_state(&key)?;
            let plaintext = state.decrypt(message, &self.config, rng)?;
            self.store.save(&key, SessionBlob::seal(BlobKind::Pairwise, &state)?)?;
            Ok(plaintext)
        })
    }

    /// Permanently revoke the session with `remote_device`.
    ///
    /// Deletes the persisted state; every later operation on this session id
    /// fails with `NotFound`. Irreversible.
    pub fn revoke(
        &self,
        remote_device: &DeviceId,
        session_id: SessionId,
    ) -> Result<(), EngineError> {
        let key = SessionKey::Pairwise { device: remote_device.clone(), session: session_id };
        self.store.with_lock(&key, || {
            if self.store.load(&key)?.is_none() {
                return Err(EngineError::NotFound { resource: key.to_string() });
            }
            self.store.delete(&key)?;
            Ok(())
        })?;

        tracing::info!(device = %remote_device, session = %session_id, "revoked session");
        Ok(())
    }

    fn load_state(&self, key: &SessionKey) -> Result<PairwiseState, EngineError> {
        let Some(bytes) = self.store.load(key)? else {
            return Err(EngineError::NotFound { resource: key.to_string() });
        };
        Ok(SessionBlob::open(&bytes, BlobKind::Pairwise)?)
    }

    fn ensure_not_blocked(&self, device: &DeviceId) -> Result<(), EngineError> {
        match self.trust.get_trust(device) {
            TrustState::Blocked => Err(EngineError::PeerBlocked { device: device.clone() }),
            TrustState::Unverified => {
                tracing::warn!(%device, "communicating with unverified device");
                Ok(())
            }
            TrustState::Verified => Ok(()),
        }
    }
}
