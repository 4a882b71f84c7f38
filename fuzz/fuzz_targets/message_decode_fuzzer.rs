//! Fuzz target for wire message and session blob decoding
//!
//! Tests CBOR deserialization of every structure that crosses the engine
//! boundary with:
//! - Malformed CBOR data
//! - Kind confusion (bytes of one structure fed to another's decoder)
//! - Truncated and oversized inputs
//! - Blob version/kind header corruption
//!
//! # Invariants
//!
//! - Decoding NEVER panics; invalid input returns an error
//! - A successful decode re-encodes without error
//! - Blob opening with the wrong expected kind returns an error, never a
//!   misinterpreted state

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealbox_proto::{
    BlobKind, GroupDistributionMessage, GroupMessage, HandshakeMessage, KeyBundle, RatchetMessage,
    SessionBlob,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = RatchetMessage::decode(data) {
        let _ = message.encode();
        let _ = message.associated_data();
    }
    if let Ok(message) = HandshakeMessage::decode(data) {
        let _ = message.encode();
    }
    if let Ok(message) = GroupMessage::decode(data) {
        let _ = message.encode();
        let _ = message.associated_data();
    }
    if let Ok(message) = GroupDistributionMessage::decode(data) {
        let _ = message.encode();
    }
    if let Ok(bundle) = KeyBundle::decode(data) {
        let _ = bundle.encode();
    }

    // Blob opening must reject arbitrary bytes under every expected kind.
    for kind in [
        BlobKind::Identity,
        BlobKind::Pairwise,
        BlobKind::GroupOutbound,
        BlobKind::GroupInbound,
    ] {
        let _ = SessionBlob::open::<KeyBundle>(data, kind);
    }
});
