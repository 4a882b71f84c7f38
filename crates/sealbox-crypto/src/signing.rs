//! Ed25519 signing for prekey authentication
//!
//! Signed prekeys bind published X25519 material to a device's long-term
//! identity. This module wraps key generation, signing, and verification;
//! it performs no hashing or encoding of its own.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{CryptoRng, RngCore};

use crate::error::CryptoError;

/// An Ed25519 signing key pair (the long-term identity signing key).
#[derive(Clone)]
pub struct SigningKeyPair {
    key: SigningKey,
}

impl SigningKeyPair {
    /// Generate a fresh signing key pair from the supplied RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self { key: SigningKey::generate(rng) }
    }

    /// Restore a signing key pair from a persisted secret.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self { key: SigningKey::from_bytes(&bytes) }
    }

    /// Public (verifying) half as raw bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Secret half as raw bytes, for persistence.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Sign a message, returning the 64-byte detached signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message).to_bytes()
    }
}

/// Verify a detached Ed25519 signature.
///
/// # Errors
///
/// - [`CryptoError::InvalidKey`] if `public` is not a valid Ed25519 point
/// - [`CryptoError::InvalidSignature`] if the signature is malformed or does
///   not verify against the message
pub fn verify(public: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public)
        .map_err(|_| CryptoError::InvalidKey { reason: "not a valid Ed25519 point".to_string() })?;

    let signature =
        Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;

    verifying_key.verify(message, &signature).map_err(|_| CryptoError::InvalidSignature)
}
