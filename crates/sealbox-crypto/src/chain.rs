//! Symmetric message chain for forward-secure key derivation
//!
//! # Security Properties
//!
//! - Forward Secrecy: Old chain keys are overwritten when advancing
//! - Key Uniqueness: Each index produces a unique message secret
//! - Determinism: Same seed always produces the same secret sequence

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Label for deriving the next chain key
const CHAIN_LABEL: &[u8] = b"chain";

/// Label for deriving a message secret
const MESSAGE_LABEL: &[u8] = b"message";

/// A message secret derived from the chain.
///
/// Feeds a single AEAD seal or open operation via [`crate::aead`]. It should
/// be used immediately and then discarded.
#[derive(Clone)]
pub struct MessageSecret {
    /// 32 bytes of keying material; AEAD key and nonce are expanded from it
    secret: [u8; 32],
    /// The chain index this secret was derived at
    index: u32,
}

impl MessageSecret {
    /// Reconstruct a secret from its raw parts.
    ///
    /// Used when restoring a cached skipped-message secret from persisted
    /// session state.
    pub fn from_parts(secret: [u8; 32], index: u32) -> Self {
        Self { secret, index }
    }

    /// 32 bytes of keying material.
    pub fn bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Chain index this secret was derived at.
    pub fn index(&self) -> u32 {
        self.index
    }
}

// Implement Drop to zeroize key material
impl Drop for MessageSecret {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Forward-secure symmetric chain.
///
/// Derives a sequence of message secrets from an initial seed. Each
/// [`advance()`](Self::advance) call:
/// 1. Derives a message secret from the current chain key
/// 2. Derives the next chain key
/// 3. Overwrites the old chain key (forward secrecy)
///
/// # Security
///
/// - Chain keys are overwritten immediately after use
/// - Compromise of current state doesn't reveal past secrets
/// - Deterministic: same seed produces same sequence
pub struct MessageChain {
    /// Current chain key (32 bytes)
    chain_key: [u8; 32],
    /// Index of the next secret to derive
    next_index: u32,
}

impl MessageChain {
    /// Create a new chain from a 32-byte seed.
    ///
    /// The seed becomes the initial chain key (index 0).
    pub fn new(seed: &[u8; 32]) -> Self {
        Self { chain_key: *seed, next_index: 0 }
    }

    /// Restore a chain from persisted parts.
    pub fn from_parts(chain_key: [u8; 32], next_index: u32) -> Self {
        Self { chain_key, next_index }
    }

    /// Index of the next secret this chain will derive.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Current chain key, for persistence.
    pub fn key_bytes(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Advance the chain and derive the next message secret.
    ///
    /// Returns the secret for the current index.
    ///
    /// This operation:
    /// 1. Derives a message secret from the current chain key
    /// 2. Derives the next chain key
    /// 3. Overwrites the old chain key
    /// 4. Increments the index
    pub fn advance(&mut self) -> Result<MessageSecret, CryptoError> {
        if self.next_index == u32::MAX {
            return Err(CryptoError::IndexOverflow { current: self.next_index });
        }

        let secret = self.derive_message_secret();
        let next_chain_key = self.derive_next_chain_key();

        // Zeroize and replace the old chain key for forward secrecy
        self.chain_key.zeroize();
        self.chain_key = next_chain_key;

        let current = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);

        Ok(MessageSecret { secret, index: current })
    }

    /// Derive the message secret from the current chain key.
    fn derive_message_secret(&self) -> [u8; 32] {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.chain_key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(MESSAGE_LABEL);
        let result = mac.finalize().into_bytes();

        let mut key = [0u8; 32];
        key.copy_from_slice(&result);
        key
    }

    /// Derive the next chain key from the current chain key.
    fn derive_next_chain_key(&self) -> [u8; 32] {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.chain_key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(CHAIN_LABEL);
        let result = mac.finalize().into_bytes();

        let mut key = [0u8; 32];
        key.copy_from_slice(&result);
        key
    }
}

impl Drop for MessageChain {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_seed() -> [u8; 32] {
        let mut seed = [0u8; 32];
        for (i, byte) in seed.iter_mut().enumerate() {
            *byte = i as u8;
        }
        seed
    }

    #[test]
    fn new_chain_starts_at_index_zero() {
        let chain = MessageChain::new(&test_seed());
        assert_eq!(chain.next_index(), 0);
    }

    #[test]
    fn advance_increments_index() {
        let mut chain = MessageChain::new(&test_seed());

        let s0 = chain.advance().unwrap();
        assert_eq!(s0.index(), 0);
        assert_eq!(chain.next_index(), 1);

        let s1 = chain.advance().unwrap();
        assert_eq!(s1.index(), 1);
        assert_eq!(chain.next_index(), 2);
    }

    #[test]
    fn advance_produces_unique_secrets() {
        let mut chain = MessageChain::new(&test_seed());

        let s0 = chain.advance().unwrap();
        let s1 = chain.advance().unwrap();
        let s2 = chain.advance().unwrap();

        assert_ne!(s0.bytes(), s1.bytes(), "secrets must be unique");
        assert_ne!(s1.bytes(), s2.bytes(), "secrets must be unique");
        assert_ne!(s0.bytes(), s2.bytes(), "secrets must be unique");
    }

    #[test]
    fn chain_is_deterministic() {
        let seed = test_seed();

        let mut chain1 = MessageChain::new(&seed);
        let mut chain2 = MessageChain::new(&seed);

        for _ in 0..10 {
            let s1 = chain1.advance().unwrap();
            let s2 = chain2.advance().unwrap();
            assert_eq!(s1.bytes(), s2.bytes(), "same seed must produce same secrets");
            assert_eq!(s1.index(), s2.index());
        }
    }

    #[test]
    fn different_seeds_produce_different_secrets() {
        let mut seed1 = [0u8; 32];
        let mut seed2 = [0u8; 32];
        seed1[0] = 1;
        seed2[0] = 2;

        let mut chain1 = MessageChain::new(&seed1);
        let mut chain2 = MessageChain::new(&seed2);

        let s1 = chain1.advance().unwrap();
        let s2 = chain2.advance().unwrap();

        assert_ne!(s1.bytes(), s2.bytes(), "different seeds must produce different secrets");
    }

    #[test]
    fn restored_chain_continues_sequence() {
        let seed = test_seed();

        let mut original = MessageChain::new(&seed);
        original.advance().unwrap();
        original.advance().unwrap();

        let mut restored = MessageChain::from_parts(*original.key_bytes(), original.next_index());

        let expected = original.advance().unwrap();
        let actual = restored.advance().unwrap();

        assert_eq!(expected.bytes(), actual.bytes());
        assert_eq!(expected.index(), actual.index());
        assert_eq!(actual.index(), 2);
    }

    #[test]
    fn advance_at_max_index_fails() {
        let mut chain = MessageChain::from_parts(test_seed(), u32::MAX);
        let result = chain.advance();

        assert!(matches!(result, Err(CryptoError::IndexOverflow { current: u32::MAX })));
    }
}
