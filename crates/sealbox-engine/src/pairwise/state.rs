//! Double-ratchet session state.
//!
//! Holds the root key, the Diffie-Hellman ratchet key pair, both symmetric
//! chains, and the bounded skipped-message-key cache. All mutation happens
//! through [`PairwiseState::encrypt`] and [`PairwiseState::decrypt`]; the
//! engine persists the state only after an operation succeeds, so a failed
//! decrypt never advances the persisted ratchet.
//!
//! # Ratchet Layout
//!
//! ```text
//! Root Key ──DH(local, remote)──▶ (Root Key', Receiving Chain)
//!          ──DH(fresh, remote)──▶ (Root Key'', Sending Chain)
//! ```
//!
//! Every time a new remote ratchet key is observed, both chains and the root
//! key are replaced (break-in recovery); within a chain, every message
//! advances a one-way HMAC ratchet (forward secrecy).

use std::collections::VecDeque;

use rand::{CryptoRng, RngCore};
use sealbox_crypto::{DhKeyPair, MessageChain, MessageSecret, aead, ratchet_root};
use sealbox_proto::RatchetMessage;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{config::EngineConfig, error::EngineError};

/// Lifecycle phase of a pairwise session.
///
/// Revocation is not a phase: a revoked session is deleted from the store,
/// which makes every later operation fail with `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Initiator has sent the handshake but not yet decrypted a reply
    PendingInitiator,
    /// Both sides have contributed ratchet keys
    Established,
}

/// Persistable snapshot of a symmetric chain.
#[derive(Clone, Serialize, Deserialize, Zeroize)]
pub(crate) struct ChainSnapshot {
    key: [u8; 32],
    #[zeroize(skip)]
    next_index: u32,
}

impl ChainSnapshot {
    fn fresh(seed: [u8; 32]) -> Self {
        Self { key: seed, next_index: 0 }
    }

    fn from_chain(chain: &MessageChain) -> Self {
        Self { key: *chain.key_bytes(), next_index: chain.next_index() }
    }

    fn to_chain(&self) -> MessageChain {
        MessageChain::from_parts(self.key, self.next_index)
    }

    pub(crate) fn next_index(&self) -> u32 {
        self.next_index
    }
}

/// A message secret retained for an out-of-order message.
#[derive(Serialize, Deserialize)]
struct SkippedKey {
    /// Remote ratchet key of the chain the secret came from
    ratchet_key: [u8; 32],
    index: u32,
    secret: [u8; 32],
}

/// Full state of one pairwise session.
#[derive(Serialize, Deserialize)]
pub(crate) struct PairwiseState {
    pub(crate) phase: SessionPhase,
    root_key: [u8; 32],
    /// Secret half of the local ratchet key pair
    dh_local: [u8; 32],
    /// Remote ratchet public key most recently ratcheted against
    dh_remote: Option<[u8; 32]>,
    sending: Option<ChainSnapshot>,
    receiving: Option<ChainSnapshot>,
    /// Length of the previous sending chain, carried in message headers
    prev_sending_len: u32,
    /// Bounded FIFO cache of skipped message secrets
    skipped: VecDeque<SkippedKey>,
}

impl PairwiseState {
    /// Build the initiator's state from the X3DH shared secret.
    ///
    /// Performs the first half-ratchet immediately: a fresh ratchet key pair
    /// against the remote signed prekey yields the initial sending chain.
    pub(crate) fn new_initiator<R: RngCore + CryptoRng>(
        shared_secret: [u8; 32],
        remote_signed_prekey: &[u8; 32],
        rng: &mut R,
    ) -> Self {
        let ratchet = DhKeyPair::generate(rng);
        let dh_output = ratchet.diffie_hellman(remote_signed_prekey);
        let (root_key, send_seed) = ratchet_root(&shared_secret, &dh_output);

        Self {
            phase: SessionPhase::PendingInitiator,
            root_key,
            dh_local: ratchet.secret_bytes(),
            dh_remote: Some(*remote_signed_prekey),
            sending: Some(ChainSnapshot::fresh(send_seed)),
            receiving: None,
            prev_sending_len: 0,
            skipped: VecDeque::new(),
        }
    }

    /// Build the responder's state from the X3DH shared secret.
    ///
    /// The signed prekey doubles as the responder's first ratchet key pair;
    /// decrypting the embedded first message performs the full ratchet step.
    pub(crate) fn new_responder(shared_secret: [u8; 32], signed_prekey: &DhKeyPair) -> Self {
        Self {
            phase: SessionPhase::Established,
            root_key: shared_secret,
            dh_local: signed_prekey.secret_bytes(),
            dh_remote: None,
            sending: None,
            receiving: None,
            prev_sending_len: 0,
            skipped: VecDeque::new(),
        }
    }

    /// Index of the next receiving-chain slot, for replay diagnostics.
    #[cfg(test)]
    pub(crate) fn receiving_index(&self) -> Option<u32> {
        self.receiving.as_ref().map(ChainSnapshot::next_index)
    }

    /// Advance the sending chain one step and seal `plaintext`.
    ///
    /// The message secret is derived, used once, and dropped; only the
    /// advanced chain key survives in the state.
    pub(crate) fn encrypt(&mut self, plaintext: &[u8]) -> Result<RatchetMessage, EngineError> {
        let Some(snapshot) = &self.sending else {
            return Err(EngineError::InvalidSessionState {
                reason: "session has no sending chain".to_string(),
            });
        };

        let mut chain = snapshot.to_chain();
        let secret = chain.advance()?;

        let mut message = RatchetMessage {
            ratchet_key: DhKeyPair::from_secret_bytes(self.dh_local).public_bytes(),
            index: secret.index(),
            prev_index: self.prev_sending_len,
            ciphertext: Vec::new(),
        };
        let associated_data = message.associated_data();
        message.ciphertext = aead::seal(&secret, &associated_data, plaintext);

        self.sending = Some(ChainSnapshot::from_chain(&chain));
        Ok(message)
    }

    /// Open a ratchet message, stepping the receiving side as needed.
    ///
    /// Order of resolution:
    /// 1. Retained skipped key for (ratchet key, index) — consume exactly once
    /// 2. New remote ratchet key — cache the tail of the old chain, then
    ///    perform a full DH ratchet step
    /// 3. Current receiving chain — replay check, bounded skip, derive, open
    pub(crate) fn decrypt<R: RngCore + CryptoRng>(
        &mut self,
        message: &RatchetMessage,
        config: &EngineConfig,
        rng: &mut R,
    ) -> Result<Vec<u8>, EngineError> {
        let associated_data = message.associated_data();

        if let Some(at) = self
            .skipped
            .iter()
            .position(|s| s.ratchet_key == message.ratchet_key && s.index == message.index)
        {
            let secret = MessageSecret::from_parts(self.skipped[at].secret, self.skipped[at].index);
            let plaintext = aead::open(&secret, &associated_data, &message.ciphertext)?;
            if let Some(mut consumed) = self.skipped.remove(at) {
                consumed.secret.zeroize();
            }
            self.phase = SessionPhase::Established;
            return Ok(plaintext);
        }

        if self.dh_remote.as_ref() != Some(&message.ratchet_key) {
            self.cache_retired_chain(message.prev_index, config)?;
            self.dh_ratchet(&message.ratchet_key, rng);
        }

        let Some(snapshot) = &self.receiving else {
            return Err(EngineError::InvalidSessionState {
                reason: "session has no receiving chain".to_string(),
            });
        };
        let mut chain = snapshot.to_chain();

        if message.index < chain.next_index() {
            return Err(EngineError::ReplayedMessage { index: message.index });
        }
        if message.index - chain.next_index() > config.max_skip {
            return Err(EngineError::SkippedKeyLimitExceeded {
                current: chain.next_index(),
                requested: message.index,
            });
        }

        while chain.next_index() < message.index {
            let secret = chain.advance()?;
            self.push_skipped(message.ratchet_key, &secret, config);
        }
        let secret = chain.advance()?;
        let plaintext = aead::open(&secret, &associated_data, &message.ciphertext)?;

        self.receiving = Some(ChainSnapshot::from_chain(&chain));
        self.phase = SessionPhase::Established;
        Ok(plaintext)
    }

    /// Cache the remaining secrets of the current receiving chain before a
    /// ratchet step retires it.
    ///
    /// `declared_len` is the sender's claim of how many messages the retired
    /// chain carried; the gap from our position to that length is bounded by
    /// the same skip limit as in-chain gaps.
    fn cache_retired_chain(
        &mut self,
        declared_len: u32,
        config: &EngineConfig,
    ) -> Result<(), EngineError> {
        let (Some(snapshot), Some(remote)) = (&self.receiving, self.dh_remote) else {
            return Ok(());
        };
        let mut chain = snapshot.to_chain();

        if declared_len < chain.next_index() {
            // Header claims fewer messages than we already consumed.
            return Err(EngineError::ReplayedMessage { index: declared_len });
        }
        if declared_len - chain.next_index() > config.max_skip {
            return Err(EngineError::SkippedKeyLimitExceeded {
                current: chain.next_index(),
                requested: declared_len,
            });
        }

        while chain.next_index() < declared_len {
            let secret = chain.advance()?;
            self.push_skipped(remote, &secret, config);
        }
        Ok(())
    }

    /// Full Diffie-Hellman ratchet step: replace the root key, both chains,
    /// and the local ratchet key pair.
    fn dh_ratchet<R: RngCore + CryptoRng>(&mut self, remote: &[u8; 32], rng: &mut R) {
        self.prev_sending_len = self.sending.as_ref().map_or(0, ChainSnapshot::next_index);

        let local = DhKeyPair::from_secret_bytes(self.dh_local);
        let (root_key, recv_seed) = ratchet_root(&self.root_key, &local.diffie_hellman(remote));

        let fresh = DhKeyPair::generate(rng);
        let (root_key, send_seed) = ratchet_root(&root_key, &fresh.diffie_hellman(remote));

        self.root_key.zeroize();
        self.root_key = root_key;
        self.receiving = Some(ChainSnapshot::fresh(recv_seed));
        self.sending = Some(ChainSnapshot::fresh(send_seed));
        self.dh_local.zeroize();
        self.dh_local = fresh.secret_bytes();
        self.dh_remote = Some(*remote);
    }

    /// Retain a derived-but-unconsumed secret, evicting the oldest past the
    /// cache bound.
    fn push_skipped(&mut self, ratchet_key: [u8; 32], secret: &MessageSecret, config: &EngineConfig) {
        self.skipped.push_back(SkippedKey {
            ratchet_key,
            index: secret.index(),
            secret: *secret.bytes(),
        });
        while self.skipped.len() > config.max_skipped_keys {
            if let Some(mut evicted) = self.skipped.pop_front() {
                evicted.secret.zeroize();
            }
        }
    }
}

impl Zeroize for PairwiseState {
    fn zeroize(&mut self) {
        self.root_key.zeroize();
        self.dh_local.zeroize();
        self.dh_remote = None;
        if let Some(chain) = &mut self.sending {
            chain.zeroize();
        }
        if let Some(chain) = &mut self.receiving {
            chain.zeroize();
        }
        for skipped in &mut self.skipped {
            skipped.secret.zeroize();
        }
        self.skipped.clear();
        self.prev_sending_len = 0;
    }
}

impl Drop for PairwiseState {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for PairwiseState {}
