//! Sealbox Cryptographic Building Blocks
//!
//! Primitive-adjacent operations for the Sealbox session engine. Pure
//! functions with deterministic outputs. Callers provide RNGs so key
//! generation is reproducible in tests.
//!
//! # Key Lifecycle
//!
//! This section describes the key hierarchy from an X3DH key agreement to
//! per-message encryption keys. A handshake produces a shared root key, from
//! which Diffie-Hellman ratchet steps derive chain seeds. Each chain is a
//! symmetric ratchet producing one-time message secrets. Advancing a chain on
//! every message provides forward secrecy within the chain.
//!
//! ```text
//! X3DH Agreement
//!        │
//!        ▼
//! Root Key ──HKDF──▶ Chain Seed (per DH ratchet step)
//!        │
//!        ▼
//! Message Chain ──HMAC──▶ Message Secrets
//!        │
//!        ▼
//! AEAD Sealing ──▶ Ciphertext
//! ```
//!
//! Message secrets are used for exactly one seal or open operation and are
//! zeroized immediately after use, so past messages remain secure even if
//! later chain state is compromised.
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain advancement: Old chain keys are zeroized after deriving the next
//! - Message secret disposal: Secrets are zeroized after their single use
//!
//! Break-in Recovery:
//! - DH ratchet steps replace the root key and both chains, so compromise of
//!   one chain does not expose unrelated future messages
//!
//! Authenticity:
//! - XChaCha20-Poly1305 AEAD provides tamper-proof encryption
//! - Signed prekeys bind published DH material to a long-term Ed25519 key
//! - Failed authentication tag -> reject message

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod agreement;
pub mod chain;
pub mod error;
pub mod signing;

pub use aead::{open, seal};
pub use agreement::{DhKeyPair, ratchet_root, x3dh_initiator, x3dh_responder};
pub use chain::{MessageChain, MessageSecret};
pub use error::CryptoError;
pub use signing::{SigningKeyPair, verify};
