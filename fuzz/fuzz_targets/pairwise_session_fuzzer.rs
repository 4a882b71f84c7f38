//! Fuzz target for the pairwise double ratchet
//!
//! Drives an established two-party session through arbitrary operation
//! sequences: interleaved sends from both sides, delayed and reordered
//! delivery, replays, and ciphertext corruption.
//!
//! # Invariants
//!
//! - The engine never panics, whatever the delivery schedule
//! - Every honestly delivered message decrypts to its original plaintext
//! - A message never decrypts twice
//! - Corrupted ciphertext is rejected and does not poison later delivery

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sealbox_engine::{
    DeviceId, EngineConfig, EngineError, IdentityStore, MemoryStore, PairwiseEngine,
    RatchetMessage, TrustLedger,
};

#[derive(Debug, Arbitrary)]
struct SessionScenario {
    seed: [u8; 32],
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    /// Alice encrypts; the message joins her in-flight queue
    AliceSend { payload: Vec<u8> },
    /// Bob encrypts; the message joins his in-flight queue
    BobSend { payload: Vec<u8> },
    /// Deliver the in-flight message at `at` (mod queue length) to Bob
    DeliverToBob { at: u8 },
    /// Deliver the in-flight message at `at` (mod queue length) to Alice
    DeliverToAlice { at: u8 },
    /// Re-deliver an already consumed message to Bob
    ReplayToBob { at: u8 },
    /// Flip one ciphertext bit before delivering to Bob
    CorruptToBob { at: u8, bit: u8 },
}

struct Queue {
    in_flight: Vec<(RatchetMessage, Vec<u8>)>,
    consumed: Vec<RatchetMessage>,
}

impl Queue {
    fn new() -> Self {
        Self { in_flight: Vec::new(), consumed: Vec::new() }
    }

    fn take(&mut self, at: u8) -> Option<(RatchetMessage, Vec<u8>)> {
        if self.in_flight.is_empty() {
            return None;
        }
        Some(self.in_flight.remove(usize::from(at) % self.in_flight.len()))
    }
}

fuzz_target!(|scenario: SessionScenario| {
    let mut rng = StdRng::from_seed(scenario.seed);
    let config = EngineConfig::default();

    let alice_identity_store = IdentityStore::new(config);
    let alice_identity = alice_identity_store.create_identity(&mut rng).unwrap();
    let bob_identity_store = IdentityStore::new(config);
    bob_identity_store.create_identity(&mut rng).unwrap();

    let alice = PairwiseEngine::new(MemoryStore::new(), TrustLedger::new(), config);
    let bob = PairwiseEngine::new(MemoryStore::new(), TrustLedger::new(), config);
    let alice_device = DeviceId::from("alice");
    let bob_device = DeviceId::from("bob");

    let bundle = bob_identity_store.generate_prekeys(&mut rng, 1).unwrap();
    let (session, handshake) = alice
        .initiate(&alice_identity, &bob_device, &bundle, b"hello", &mut rng)
        .unwrap();
    let (_, first) = bob
        .accept(&bob_identity_store, &alice_device, &handshake, &mut rng)
        .unwrap();
    assert_eq!(first, b"hello");

    let mut to_bob = Queue::new();
    let mut to_alice = Queue::new();

    for operation in scenario.operations {
        match operation {
            Operation::AliceSend { payload } => {
                let message = alice.encrypt(&bob_device, session, &payload).unwrap();
                to_bob.in_flight.push((message, payload));
            }
            Operation::BobSend { payload } => {
                let message = bob.encrypt(&alice_device, session, &payload).unwrap();
                to_alice.in_flight.push((message, payload));
            }
            Operation::DeliverToBob { at } => {
                if let Some((message, payload)) = to_bob.take(at) {
                    match bob.decrypt(&alice_device, session, &message, &mut rng) {
                        Ok(plaintext) => {
                            assert_eq!(plaintext, payload, "delivered plaintext must match");
                            to_bob.consumed.push(message);
                        }
                        // Reordering can push a message past the retention
                        // bounds; rejection is legal, success is mandatory
                        // otherwise.
                        Err(
                            EngineError::ReplayedMessage { .. }
                            | EngineError::SkippedKeyLimitExceeded { .. }
                            | EngineError::AuthenticationFailed,
                        ) => {}
                        Err(other) => panic!("unexpected decrypt error: {other}"),
                    }
                }
            }
            Operation::DeliverToAlice { at } => {
                if let Some((message, payload)) = to_alice.take(at) {
                    match alice.decrypt(&bob_device, session, &message, &mut rng) {
                        Ok(plaintext) => {
                            assert_eq!(plaintext, payload, "delivered plaintext must match");
                        }
                        Err(
                            EngineError::ReplayedMessage { .. }
                            | EngineError::SkippedKeyLimitExceeded { .. }
                            | EngineError::AuthenticationFailed,
                        ) => {}
                        Err(other) => panic!("unexpected decrypt error: {other}"),
                    }
                }
            }
            Operation::ReplayToBob { at } => {
                if !to_bob.consumed.is_empty() {
                    let message =
                        &to_bob.consumed[usize::from(at) % to_bob.consumed.len()];
                    // A consumed message must never decrypt again.
                    assert!(bob.decrypt(&alice_device, session, message, &mut rng).is_err());
                }
            }
            Operation::CorruptToBob { at, bit } => {
                if let Some((message, _)) = to_bob.take(at) {
                    let mut corrupted = message;
                    if !corrupted.ciphertext.is_empty() {
                        let byte = usize::from(at) % corrupted.ciphertext.len();
                        corrupted.ciphertext[byte] ^= 1 << (bit % 8);
                        assert!(matches!(
                            bob.decrypt(&alice_device, session, &corrupted, &mut rng),
                            Err(EngineError::AuthenticationFailed)
                        ));
                    }
                }
            }
        }
    }
});
