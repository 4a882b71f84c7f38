//! Message sealing using `XChaCha20-Poly1305`
//!
//! The AEAD key and nonce are both expanded from a single-use
//! [`MessageSecret`], so a deterministic nonce is safe: no two seal
//! operations ever share a secret, because the chain zeroizes each secret's
//! predecessor when advancing.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{chain::MessageSecret, error::CryptoError};

/// HKDF info label for expanding a message secret into key material
const AEAD_LABEL: &[u8] = b"sealbox-aead-v1";

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Seal a plaintext under a single-use message secret.
///
/// The associated data is authenticated but not encrypted; both sides must
/// supply identical bytes (typically the message header).
pub fn seal(secret: &MessageSecret, associated_data: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let (key, nonce) = expand_secret(secret);
    let cipher = XChaCha20Poly1305::new((&key).into());

    let payload = Payload { msg: plaintext, aad: associated_data };
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), payload) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    ciphertext
}

/// Open a ciphertext sealed under the same message secret.
///
/// # Errors
///
/// Returns [`CryptoError::AuthenticationFailed`] if the authentication tag
/// does not verify (wrong secret, wrong associated data, or tampering).
pub fn open(
    secret: &MessageSecret,
    associated_data: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let (key, nonce) = expand_secret(secret);
    let cipher = XChaCha20Poly1305::new((&key).into());

    let payload = Payload { msg: ciphertext, aad: associated_data };
    cipher
        .decrypt(XNonce::from_slice(&nonce), payload)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Plaintext length of a sealed message (ciphertext minus tag).
pub fn plaintext_len(ciphertext: &[u8]) -> usize {
    ciphertext.len().saturating_sub(POLY1305_TAG_SIZE)
}

/// Expand a message secret into an AEAD key and 24-byte nonce.
fn expand_secret(secret: &MessageSecret) -> ([u8; 32], [u8; 24]) {
    let hkdf = Hkdf::<Sha256>::new(None, secret.bytes());

    let mut okm = [0u8; 56];
    let Ok(()) = hkdf.expand(AEAD_LABEL, &mut okm) else {
        unreachable!("56 bytes is a valid HKDF-SHA256 output length");
    };

    let mut key = [0u8; 32];
    let mut nonce = [0u8; 24];
    key.copy_from_slice(&okm[..32]);
    nonce.copy_from_slice(&okm[32..]);
    okm.zeroize();

    (key, nonce)
}
