//! Fuzz target for the group sender-key chain
//!
//! Drives one outbound chain and one imported inbound chain through
//! arbitrary schedules of sends, reordered delivery, replays, corruption,
//! and re-imported distributions.
//!
//! # Invariants
//!
//! - The engine never panics
//! - Delivery within the acceptance window decrypts to the original payload
//! - Indexes never decrypt twice
//! - Re-importing the original distribution never resets replay tracking
//! - Corrupted ciphertext is rejected

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sealbox_engine::{
    DeviceId, EngineConfig, EngineError, GroupEngine, GroupMessage, MemoryStore, RoomId,
    TrustLedger,
};

#[derive(Debug, Arbitrary)]
struct GroupScenario {
    seed: [u8; 32],
    /// Acceptance window, kept small so the fuzzer actually crosses it
    window: u8,
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    Send { payload: Vec<u8> },
    Deliver { at: u8 },
    Replay { at: u8 },
    Corrupt { at: u8, bit: u8 },
    Reimport,
}

fuzz_target!(|scenario: GroupScenario| {
    let mut rng = StdRng::from_seed(scenario.seed);
    let config = EngineConfig {
        group_window: u32::from(scenario.window.max(1)),
        ..EngineConfig::default()
    };

    let sender = GroupEngine::new(MemoryStore::new(), TrustLedger::new(), config);
    let receiver = GroupEngine::new(MemoryStore::new(), TrustLedger::new(), config);
    let room = RoomId::from("!fuzz:example.org");
    let device = DeviceId::from("sender");

    let session = sender.create_outbound(&room, &mut rng).unwrap();
    let distribution = sender.share(&room, session).unwrap();
    receiver.import_inbound(&room, &device, &distribution).unwrap();

    let mut in_flight: Vec<(GroupMessage, Vec<u8>)> = Vec::new();
    let mut consumed: Vec<GroupMessage> = Vec::new();

    for operation in scenario.operations {
        match operation {
            Operation::Send { payload } => {
                let message = sender.encrypt(&room, session, &payload).unwrap();
                in_flight.push((message, payload));
            }
            Operation::Deliver { at } => {
                if in_flight.is_empty() {
                    continue;
                }
                let (message, payload) =
                    in_flight.remove(usize::from(at) % in_flight.len());
                match receiver.decrypt(&room, &device, &message) {
                    Ok(plaintext) => {
                        assert_eq!(plaintext, payload, "delivered plaintext must match");
                        consumed.push(message);
                    }
                    // Narrow windows legitimately expire or evict entries;
                    // every other failure is a bug.
                    Err(
                        EngineError::KeyTooOld { .. }
                        | EngineError::ReplayedMessage { .. }
                        | EngineError::SkippedKeyLimitExceeded { .. },
                    ) => {}
                    Err(other) => panic!("unexpected decrypt error: {other}"),
                }
            }
            Operation::Replay { at } => {
                if !consumed.is_empty() {
                    let message = &consumed[usize::from(at) % consumed.len()];
                    assert!(receiver.decrypt(&room, &device, message).is_err());
                }
            }
            Operation::Corrupt { at, bit } => {
                if in_flight.is_empty() {
                    continue;
                }
                let (message, _) = in_flight.remove(usize::from(at) % in_flight.len());
                let mut corrupted = message;
                if !corrupted.ciphertext.is_empty() {
                    let byte = usize::from(at) % corrupted.ciphertext.len();
                    corrupted.ciphertext[byte] ^= 1 << (bit % 8);
                    match receiver.decrypt(&room, &device, &corrupted) {
                        Ok(_) => panic!("corrupted ciphertext decrypted"),
                        Err(_) => {}
                    }
                }
            }
            Operation::Reimport => {
                receiver.import_inbound(&room, &device, &distribution).unwrap();
            }
        }
    }

    // Replay tracking survives everything above: nothing consumed decrypts
    // again.
    for message in &consumed {
        assert!(receiver.decrypt(&room, &device, message).is_err());
    }
});
