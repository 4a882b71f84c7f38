//! X25519 key agreement: X3DH handshake legs and root-key ratcheting
//!
//! Implements the asynchronous triple/quadruple Diffie-Hellman combination
//! used to establish a pairwise session, and the root-key KDF used for each
//! Diffie-Hellman ratchet step afterwards.
//!
//! ```text
//! Initiator                                Responder
//! SK = KDF( DH(IK_i, SPK_r) ||            SK = KDF( DH(SPK_r, IK_i) ||
//!           DH(EK_i, IK_r)  ||                      DH(IK_r, EK_i)  ||
//!           DH(EK_i, SPK_r) ||                      DH(SPK_r, EK_i) ||
//!           DH(EK_i, OPK_r) )  // if any            DH(OPK_r, EK_i) )
//! ```
//!
//! The shared secret becomes the initial root key; both sides then run the
//! same [`ratchet_root`] KDF whenever a new ratchet public key is exchanged.

use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// HKDF info label for the X3DH shared secret
const X3DH_LABEL: &[u8] = b"sealbox-x3dh-v1";

/// HKDF info label for root-key ratchet steps
const ROOT_LABEL: &[u8] = b"sealbox-root-v1";

/// An X25519 key pair used for identities, prekeys, and ratchet keys.
#[derive(Clone)]
pub struct DhKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl DhKeyPair {
    /// Generate a fresh key pair from the supplied RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = StaticSecret::random_from_rng(&mut *rng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a key pair from a persisted secret.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public half as raw bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Secret half as raw bytes, for persistence.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Raw Diffie-Hellman against a peer public key.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let peer = PublicKey::from(*peer_public);
        *self.secret.diffie_hellman(&peer).as_bytes()
    }
}

/// Compute the X3DH shared secret from the initiator's side.
///
/// `remote_one_time` extends the combination to four legs when the responder
/// published a one-time prekey.
pub fn x3dh_initiator(
    identity: &DhKeyPair,
    ephemeral: &DhKeyPair,
    remote_identity: &[u8; 32],
    remote_signed_prekey: &[u8; 32],
    remote_one_time: Option<&[u8; 32]>,
) -> [u8; 32] {
    let mut transcript = Vec::with_capacity(128);
    transcript.extend_from_slice(&identity.diffie_hellman(remote_signed_prekey));
    transcript.extend_from_slice(&ephemeral.diffie_hellman(remote_identity));
    transcript.extend_from_slice(&ephemeral.diffie_hellman(remote_signed_prekey));
    if let Some(one_time) = remote_one_time {
        transcript.extend_from_slice(&ephemeral.diffie_hellman(one_time));
    }

    derive_shared(&mut transcript)
}

/// Compute the X3DH shared secret from the responder's side.
///
/// Must mirror [`x3dh_initiator`] leg for leg: `one_time` is the consumed
/// one-time prekey, present exactly when the initiator used one.
pub fn x3dh_responder(
    identity: &DhKeyPair,
    signed_prekey: &DhKeyPair,
    one_time: Option<&DhKeyPair>,
    remote_identity: &[u8; 32],
    remote_ephemeral: &[u8; 32],
) -> [u8; 32] {
    let mut transcript = Vec::with_capacity(128);
    transcript.extend_from_slice(&signed_prekey.diffie_hellman(remote_identity));
    transcript.extend_from_slice(&identity.diffie_hellman(remote_ephemeral));
    transcript.extend_from_slice(&signed_prekey.diffie_hellman(remote_ephemeral));
    if let Some(one_time) = one_time {
        transcript.extend_from_slice(&one_time.diffie_hellman(remote_ephemeral));
    }

    derive_shared(&mut transcript)
}

/// Advance the root key with a Diffie-Hellman output.
///
/// Returns `(new_root_key, chain_seed)`. Both sides of a session run this
/// with the same inputs on every ratchet step, deriving the same chain seed
/// for one side's sending chain and the other's receiving chain.
pub fn ratchet_root(root_key: &[u8; 32], dh_output: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let hkdf = Hkdf::<Sha256>::new(Some(root_key), dh_output);

    let mut okm = [0u8; 64];
    let Ok(()) = hkdf.expand(ROOT_LABEL, &mut okm) else {
        unreachable!("64 bytes is a valid HKDF-SHA256 output length");
    };

    let mut new_root = [0u8; 32];
    let mut chain_seed = [0u8; 32];
    new_root.copy_from_slice(&okm[..32]);
    chain_seed.copy_from_slice(&okm[32..]);
    okm.zeroize();

    (new_root, chain_seed)
}

/// Derive the 32-byte shared secret from concatenated DH outputs.
fn derive_shared(transcript: &mut Vec<u8>) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, transcript);

    let mut shared = [0u8; 32];
    let Ok(()) = hkdf.expand(X3DH_LABEL, &mut shared) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    transcript.zeroize();
    shared
}
