//! Identity store: long-term keys and the prekey pool.
//!
//! Owns the local account's Ed25519 signing pair, X25519 Diffie-Hellman
//! pair, the rotating signed prekey, and a bounded pool of one-time prekeys.
//! Deleting the identity invalidates every session derived from it.
//!
//! All state mutations complete before any public material is returned to
//! the caller, so a crash between generation and publication can never leak
//! a bundle whose private halves were lost. The engine owns the
//! serialization format ([`IdentityStore::to_blob`]); the host persists the
//! opaque bytes wherever it likes.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use rand::{CryptoRng, RngCore};
use sealbox_crypto::{DhKeyPair, SigningKeyPair};
use sealbox_proto::{BlobKind, KeyBundle, OneTimePrekeyPublic, SessionBlob};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{config::EngineConfig, error::EngineError};

/// The local account's long-term key material.
///
/// Passed explicitly into engine calls that need it; there is no process-wide
/// singleton holding secret state.
#[derive(Clone)]
pub struct Identity {
    signing: SigningKeyPair,
    dh: DhKeyPair,
}

impl Identity {
    /// Long-term Ed25519 public key.
    pub fn signing_public(&self) -> [u8; 32] {
        self.signing.public_bytes()
    }

    /// Long-term X25519 public key.
    pub fn dh_public(&self) -> [u8; 32] {
        self.dh.public_bytes()
    }

    pub(crate) fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    pub(crate) fn dh(&self) -> &DhKeyPair {
        &self.dh
    }
}

/// A signed prekey held by the store (private half included).
struct SignedPrekey {
    id: u32,
    pair: DhKeyPair,
    signature: Vec<u8>,
}

/// A one-time prekey held by the store (private half included).
struct OneTimePrekey {
    id: u32,
    pair: DhKeyPair,
}

#[derive(Default)]
struct IdentityInner {
    identity: Option<Identity>,
    signed: Option<SignedPrekey>,
    /// Previous signed prekey, retained one rotation so in-flight handshakes
    /// that referenced it still resolve.
    previous_signed: Option<SignedPrekey>,
    one_time: VecDeque<OneTimePrekey>,
    next_prekey_id: u32,
}

/// Store for the local account's identity and prekeys.
///
/// Clones share the same underlying state via `Arc`; all mutation is
/// serialized by an internal mutex.
#[derive(Clone)]
pub struct IdentityStore {
    inner: Arc<Mutex<IdentityInner>>,
    config: EngineConfig,
}

impl IdentityStore {
    /// Create an empty store with the given policy bounds.
    pub fn new(config: EngineConfig) -> Self {
        Self { inner: Arc::new(Mutex::new(IdentityInner::default())), config }
    }

    /// Generate and install the long-term identity key pairs.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if an identity is already present;
    /// re-creation is never silent because it would invalidate all sessions.
    pub fn create_identity<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<Identity, EngineError> {
        let mut inner = self.lock();

        if inner.identity.is_some() {
            return Err(EngineError::AlreadyExists { resource: "identity".to_string() });
        }

        let identity =
            Identity { signing: SigningKeyPair::generate(rng), dh: DhKeyPair::generate(rng) };
        inner.identity = Some(identity.clone());

        tracing::debug!("created long-term identity");
        Ok(identity)
    }

    /// The installed identity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `create_identity` was never called.
    pub fn identity(&self) -> Result<Identity, EngineError> {
        self.lock()
            .identity
            .clone()
            .ok_or_else(|| EngineError::NotFound { resource: "identity".to_string() })
    }

    /// Generate `count` fresh one-time prekeys and rotate the signed prekey.
    ///
    /// All private halves are committed to the store before the public
    /// bundle is returned. The one-time pool is bounded; oldest unconsumed
    /// prekeys are evicted when the cap is exceeded.
    pub fn generate_prekeys<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        count: usize,
    ) -> Result<KeyBundle, EngineError> {
        let mut inner = self.lock();

        let Some(identity) = inner.identity.clone() else {
            return Err(EngineError::NotFound { resource: "identity".to_string() });
        };

        // Rotate the signed prekey, keeping the previous one generation.
        let signed_id = inner.next_prekey_id;
        inner.next_prekey_id = inner.next_prekey_id.wrapping_add(1);
        let signed_pair = DhKeyPair::generate(rng);
        let signature = identity.signing().sign(&signed_pair.public_bytes()).to_vec();
        inner.previous_signed = inner.signed.take();
        inner.signed = Some(SignedPrekey { id: signed_id, pair: signed_pair, signature });

        for _ in 0..count {
            let id = inner.next_prekey_id;
            inner.next_prekey_id = inner.next_prekey_id.wrapping_add(1);
            inner.one_time.push_back(OneTimePrekey { id, pair: DhKeyPair::generate(rng) });
        }
        while inner.one_time.len() > self.config.max_one_time_prekeys {
            inner.one_time.pop_front();
        }

        tracing::debug!(count, signed_prekey = signed_id, "rotated prekeys");
        Self::bundle_from(&inner)
    }

    /// The current publication bundle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` until both an identity and a signed prekey exist.
    pub fn key_bundle(&self) -> Result<KeyBundle, EngineError> {
        Self::bundle_from(&self.lock())
    }

    /// Return and atomically delete the one-time prekey with `id`.
    ///
    /// This is the mechanism enforcing single use: a second call with the
    /// same id fails with `NotFound`.
    pub fn consume_one_time_prekey(&self, id: u32) -> Result<DhKeyPair, EngineError> {
        let mut inner = self.lock();

        let position = inner.one_time.iter().position(|prekey| prekey.id == id);
        match position.and_then(|at| inner.one_time.remove(at)) {
            Some(prekey) => Ok(prekey.pair),
            None => Err(EngineError::NotFound { resource: format!("one-time prekey {id}") }),
        }
    }

    /// Look up the signed prekey with `id` (current or previous rotation).
    pub(crate) fn signed_prekey(&self, id: u32) -> Result<DhKeyPair, EngineError> {
        let inner = self.lock();
        [&inner.signed, &inner.previous_signed]
            .into_iter()
            .flatten()
            .find(|prekey| prekey.id == id)
            .map(|prekey| prekey.pair.clone())
            .ok_or(EngineError::UnknownPrekey { id })
    }

    /// Serialize the whole store into a versioned blob for host persistence.
    pub fn to_blob(&self) -> Result<Vec<u8>, EngineError> {
        let inner = self.lock();

        let Some(identity) = &inner.identity else {
            return Err(EngineError::NotFound { resource: "identity".to_string() });
        };

        let snapshot = IdentitySnapshot {
            signing_secret: identity.signing().secret_bytes(),
            dh_secret: identity.dh().secret_bytes(),
            signed: inner.signed.as_ref().map(SignedPrekeySnapshot::from),
            previous_signed: inner.previous_signed.as_ref().map(SignedPrekeySnapshot::from),
            one_time: inner
                .one_time
                .iter()
                .map(|prekey| OneTimeSnapshot { id: prekey.id, secret: prekey.pair.secret_bytes() })
                .collect(),
            next_prekey_id: inner.next_prekey_id,
        };

        Ok(SessionBlob::seal(BlobKind::Identity, &snapshot)?)
    }

    /// Restore a store from a blob produced by [`Self::to_blob`].
    pub fn from_blob(config: EngineConfig, bytes: &[u8]) -> Result<Self, EngineError> {
        let snapshot: IdentitySnapshot = SessionBlob::open(bytes, BlobKind::Identity)?;

        let inner = IdentityInner {
            identity: Some(Identity {
                signing: SigningKeyPair::from_secret_bytes(snapshot.signing_secret),
                dh: DhKeyPair::from_secret_bytes(snapshot.dh_secret),
            }),
            signed: snapshot.signed.as_ref().map(SignedPrekey::from),
            previous_signed: snapshot.previous_signed.as_ref().map(SignedPrekey::from),
            one_time: snapshot
                .one_time
                .iter()
                .map(|prekey| OneTimePrekey {
                    id: prekey.id,
                    pair: DhKeyPair::from_secret_bytes(prekey.secret),
                })
                .collect(),
            next_prekey_id: snapshot.next_prekey_id,
        };

        Ok(Self { inner: Arc::new(Mutex::new(inner)), config })
    }

    fn bundle_from(inner: &IdentityInner) -> Result<KeyBundle, EngineError> {
        let Some(identity) = &inner.identity else {
            return Err(EngineError::NotFound { resource: "identity".to_string() });
        };
        let Some(signed) = &inner.signed else {
            return Err(EngineError::NotFound { resource: "signed prekey".to_string() });
        };

        Ok(KeyBundle {
            identity_signing_key: identity.signing_public(),
            identity_dh_key: identity.dh_public(),
            signed_prekey_id: signed.id,
            signed_prekey: signed.pair.public_bytes(),
            signed_prekey_signature: signed.signature.clone(),
            one_time_prekeys: inner
                .one_time
                .iter()
                .map(|prekey| OneTimePrekeyPublic { id: prekey.id, key: prekey.pair.public_bytes() })
                .collect(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IdentityInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<&SignedPrekeySnapshot> for SignedPrekey {
    fn from(snapshot: &SignedPrekeySnapshot) -> Self {
        Self {
            id: snapshot.id,
            pair: DhKeyPair::from_secret_bytes(snapshot.secret),
            signature: snapshot.signature.clone(),
        }
    }
}

impl From<&SignedPrekey> for SignedPrekeySnapshot {
    fn from(prekey: &SignedPrekey) -> Self {
        Self { id: prekey.id, secret: prekey.pair.secret_bytes(), signature: prekey.signature.clone() }
    }
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SignedPrekeySnapshot {
    #[zeroize(skip)]
    id: u32,
    secret: [u8; 32],
    #[zeroize(skip)]
    signature: Vec<u8>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct OneTimeSnapshot {
    #[zeroize(skip)]
    id: u32,
    secret: [u8; 32],
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct IdentitySnapshot {
    signing_secret: [u8; 32],
    dh_secret: [u8; 32],
    #[zeroize(skip)]
    signed: Option<SignedPrekeySnapshot>,
    #[zeroize(skip)]
    previous_signed: Option<SignedPrekeySnapshot>,
    #[zeroize(skip)]
    one_time: Vec<OneTimeSnapshot>,
    #[zeroize(skip)]
    next_prekey_id: u32,
}
