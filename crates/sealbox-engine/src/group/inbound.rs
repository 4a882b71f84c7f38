//! Inbound group session state.
//!
//! A received sender-key chain plus the bookkeeping that makes it safe to
//! consume: a bounded cache of derived-but-unconsumed secrets for
//! out-of-order delivery, a consumed-index set for replay detection, and a
//! sliding acceptance window that bounds how much of either we retain.

use std::collections::{BTreeSet, VecDeque};

use sealbox_crypto::{MessageChain, MessageSecret, aead};
use sealbox_proto::GroupMessage;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{config::EngineConfig, error::EngineError};

/// A derived secret waiting for its message to arrive.
#[derive(Serialize, Deserialize)]
struct CachedSecret {
    index: u32,
    secret: [u8; 32],
}

/// Receiving side of a sender-key session.
#[derive(Serialize, Deserialize)]
pub(crate) struct InboundGroupState {
    chain_key: [u8; 32],
    next_index: u32,
    /// Index the chain was installed at; nothing earlier is ever readable
    first_index: u32,
    /// Derived secrets for not-yet-seen indexes, oldest first
    cached: VecDeque<CachedSecret>,
    /// Indexes already decrypted, pruned to the acceptance window
    consumed: BTreeSet<u32>,
}

impl InboundGroupState {
    pub(crate) fn install(chain_key: [u8; 32], index: u32) -> Self {
        Self {
            chain_key,
            next_index: index,
            first_index: index,
            cached: VecDeque::new(),
            consumed: BTreeSet::new(),
        }
    }

    pub(crate) fn first_index(&self) -> u32 {
        self.first_index
    }

    /// Oldest index still accepted: the window trails the chain head but
    /// never reaches before the install point.
    fn horizon(&self, config: &EngineConfig) -> u32 {
        self.first_index.max(self.next_index.saturating_sub(config.group_window))
    }

    /// Open a group message against this chain.
    ///
    /// Resolution order: window check, replay check, cached secret, then
    /// bounded forward derivation. Replay tracking is exact within the
    /// window; everything older is rejected wholesale as `KeyTooOld`.
    pub(crate) fn decrypt(
        &mut self,
        message: &GroupMessage,
        config: &EngineConfig,
    ) -> Result<Vec<u8>, EngineError> {
        let associated_data = message.associated_data();

        let horizon = self.horizon(config);
        if message.index < horizon {
            return Err(EngineError::KeyTooOld { horizon, requested: message.index });
        }
        if self.consumed.contains(&message.index) {
            return Err(EngineError::ReplayedMessage { index: message.index });
        }

        if let Some(at) = self.cached.iter().position(|c| c.index == message.index) {
            let secret = MessageSecret::from_parts(self.cached[at].secret, self.cached[at].index);
            let plaintext = aead::open(&secret, &associated_data, &message.ciphertext)?;
            if let Some(mut hit) = self.cached.remove(at) {
                hit.secret.zeroize();
            }
            self.consumed.insert(message.index);
            return Ok(plaintext);
        }

        if message.index < self.next_index {
            // Within the window but neither cached nor consumed: its secret
            // was evicted from the bounded cache.
            return Err(EngineError::ReplayedMessage { index: message.index });
        }
        if message.index - self.next_index > config.max_skip {
            return Err(EngineError::SkippedKeyLimitExceeded {
                current: self.next_index,
                requested: message.index,
            });
        }

        let mut chain = MessageChain::from_parts(self.chain_key, self.next_index);
        while chain.next_index() < message.index {
            let secret = chain.advance()?;
            self.cached.push_back(CachedSecret { index: secret.index(), secret: *secret.bytes() });
            while self.cached.len() > config.max_skipped_keys {
                if let Some(mut evicted) = self.cached.pop_front() {
                    evicted.secret.zeroize();
                }
            }
        }
        let secret = chain.advance()?;
        let plaintext = aead::open(&secret, &associated_data, &message.ciphertext)?;

        self.chain_key = *chain.key_bytes();
        self.next_index = chain.next_index();
        self.consumed.insert(message.index);
        self.prune(config);
        Ok(plaintext)
    }

    /// Drop replay records and cached secrets that fell behind the window.
    fn prune(&mut self, config: &EngineConfig) {
        let horizon = self.horizon(config);
        self.consumed = self.consumed.split_off(&horizon);
        for cached in &mut self.cached {
            if cached.index < horizon {
                cached.secret.zeroize();
            }
        }
        self.cached.retain(|cached| cached.index >= horizon);
    }
}

impl Zeroize for InboundGroupState {
    fn zeroize(&mut self) {
        self.chain_key.zeroize();
        for cached in &mut self.cached {
            cached.secret.zeroize();
        }
        self.cached.clear();
        self.consumed.clear();
        self.next_index = 0;
        self.first_index = 0;
    }
}

impl Drop for InboundGroupState {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for InboundGroupState {}

#[cfg(test)]
mod tests {
    use sealbox_proto::SessionId;

    use super::*;
    use crate::group::OutboundGroupState;

    fn session_id() -> SessionId {
        SessionId::from_bytes([6u8; 16])
    }

    /// Outbound chain plus an inbound installed at its current position.
    fn chain_pair(seed: u8) -> (OutboundGroupState, InboundGroupState) {
        let outbound = OutboundGroupState::new([seed; 32]);
        let dist = outbound.distribution(session_id());
        let inbound = InboundGroupState::install(dist.chain_key, dist.index);
        (outbound, inbound)
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn sequential_messages_roundtrip() {
        let (mut outbound, mut inbound) = chain_pair(1);

        for round in 0..50u32 {
            let body = format!("update {round}");
            let message = outbound.encrypt(session_id(), body.as_bytes()).unwrap();
            assert_eq!(inbound.decrypt(&message, &config()).unwrap(), body.as_bytes());
        }
    }

    #[test]
    fn replay_is_rejected() {
        let (mut outbound, mut inbound) = chain_pair(2);

        let message = outbound.encrypt(session_id(), b"once").unwrap();
        inbound.decrypt(&message, &config()).unwrap();

        assert!(matches!(
            inbound.decrypt(&message, &config()),
            Err(EngineError::ReplayedMessage { index: 0 })
        ));
    }

    #[test]
    fn out_of_order_within_window() {
        let (mut outbound, mut inbound) = chain_pair(3);

        let messages: Vec<_> =
            (0..5).map(|i| outbound.encrypt(session_id(), format!("m{i}").as_bytes()).unwrap())
                .collect();

        for (delivered, expected) in [(1, "m1"), (0, "m0"), (4, "m4"), (2, "m2"), (3, "m3")] {
            assert_eq!(
                inbound.decrypt(&messages[delivered], &config()).unwrap(),
                expected.as_bytes()
            );
        }

        for message in &messages {
            assert!(matches!(
                inbound.decrypt(message, &config()),
                Err(EngineError::ReplayedMessage { .. })
            ));
        }
    }

    #[test]
    fn messages_before_install_point_are_unreadable() {
        let mut outbound = OutboundGroupState::new([4u8; 32]);
        let early = outbound.encrypt(session_id(), b"history").unwrap();

        // Install after the first message was sent.
        let dist = outbound.distribution(session_id());
        let mut inbound = InboundGroupState::install(dist.chain_key, dist.index);

        let result = inbound.decrypt(&early, &config());
        assert!(matches!(result, Err(EngineError::KeyTooOld { horizon: 1, requested: 0 })));

        // Later traffic is fine.
        let next = outbound.encrypt(session_id(), b"current").unwrap();
        assert_eq!(inbound.decrypt(&next, &config()).unwrap(), b"current");
    }

    #[test]
    fn window_slides_past_old_indexes() {
        let (mut outbound, mut inbound) = chain_pair(5);
        let narrow = EngineConfig { group_window: 2, ..EngineConfig::default() };

        let stale = outbound.encrypt(session_id(), b"m0").unwrap();
        for i in 1..=4u32 {
            let message = outbound.encrypt(session_id(), format!("m{i}").as_bytes()).unwrap();
            inbound.decrypt(&message, &narrow).unwrap();
        }

        // Chain head is at 5; indexes below 3 fell out of the window.
        let result = inbound.decrypt(&stale, &narrow);
        assert!(matches!(result, Err(EngineError::KeyTooOld { horizon: 3, requested: 0 })));
    }

    #[test]
    fn gap_beyond_max_skip_is_rejected() {
        let (mut outbound, mut inbound) = chain_pair(6);
        let tight = EngineConfig { max_skip: 2, ..EngineConfig::default() };

        for _ in 0..4 {
            outbound.encrypt(session_id(), b"lost").unwrap();
        }
        let message = outbound.encrypt(session_id(), b"far ahead").unwrap();

        assert!(matches!(
            inbound.decrypt(&message, &tight),
            Err(EngineError::SkippedKeyLimitExceeded { current: 0, requested: 4 })
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_without_consuming_index() {
        let (mut outbound, mut inbound) = chain_pair(7);

        let clean = outbound.encrypt(session_id(), b"payload").unwrap();
        let mut tampered = clean.clone();
        tampered.ciphertext[0] ^= 0x80;

        assert!(matches!(
            inbound.decrypt(&tampered, &config()),
            Err(EngineError::AuthenticationFailed)
        ));
        // The genuine message still decrypts afterward.
        assert_eq!(inbound.decrypt(&clean, &config()).unwrap(), b"payload");
    }

    #[test]
    fn mismatched_session_id_fails_authentication() {
        let (mut outbound, mut inbound) = chain_pair(8);

        let mut message = outbound.encrypt(session_id(), b"payload").unwrap();
        message.session_id = SessionId::from_bytes([0xFF; 16]);

        assert!(matches!(
            inbound.decrypt(&message, &config()),
            Err(EngineError::AuthenticationFailed)
        ));
    }
}
