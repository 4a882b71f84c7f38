//! Property-based checks over full engine round-trips.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use sealbox_engine::{
    DeviceId, EngineConfig, Identity, IdentityStore, MemoryStore, PairwiseEngine, RoomId,
    SessionId, TrustLedger,
};

struct Pair {
    alice: PairwiseEngine<MemoryStore>,
    alice_identity: Identity,
    bob: PairwiseEngine<MemoryStore>,
    bob_identity_store: IdentityStore,
}

fn pair(rng: &mut StdRng) -> Pair {
    let config = EngineConfig::default();
    let alice_identity_store = IdentityStore::new(config);
    let alice_identity = alice_identity_store.create_identity(rng).unwrap();
    let bob_identity_store = IdentityStore::new(config);
    bob_identity_store.create_identity(rng).unwrap();

    Pair {
        alice: PairwiseEngine::new(MemoryStore::new(), TrustLedger::new(), config),
        alice_identity,
        bob: PairwiseEngine::new(MemoryStore::new(), TrustLedger::new(), config),
        bob_identity_store,
    }
}

fn devices() -> (DeviceId, DeviceId) {
    (DeviceId::from("alice-phone"), DeviceId::from("bob-desktop"))
}

fn establish(pair: &Pair, rng: &mut StdRng) -> SessionId {
    let (alice_device, bob_device) = devices();
    let bundle = pair.bob_identity_store.generate_prekeys(rng, 1).unwrap();
    let (session, handshake) = pair
        .alice
        .initiate(&pair.alice_identity, &bob_device, &bundle, b"hello", rng)
        .unwrap();
    pair.bob.accept(&pair.bob_identity_store, &alice_device, &handshake, rng).unwrap();
    session
}

proptest! {
    /// Any payload, including empty and binary, survives a full round trip.
    #[test]
    fn arbitrary_payloads_roundtrip(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..512), 1..20),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let pair = pair(&mut rng);
        let session = establish(&pair, &mut rng);
        let (alice_device, bob_device) = devices();

        for payload in &payloads {
            let message = pair.alice.encrypt(&bob_device, session, payload).unwrap();
            let plaintext = pair.bob.decrypt(&alice_device, session, &message, &mut rng).unwrap();
            prop_assert_eq!(&plaintext, payload);
        }
    }

    /// Any delivery permutation within the skip window decrypts every
    /// message exactly once.
    #[test]
    fn any_delivery_order_within_window_succeeds(
        order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle(),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let pair = pair(&mut rng);
        let session = establish(&pair, &mut rng);
        let (alice_device, bob_device) = devices();

        let messages: Vec<_> = (0..order.len())
            .map(|i| {
                pair.alice.encrypt(&bob_device, session, format!("m{i}").as_bytes()).unwrap()
            })
            .collect();

        for &at in &order {
            let plaintext =
                pair.bob.decrypt(&alice_device, session, &messages[at], &mut rng).unwrap();
            prop_assert_eq!(plaintext, format!("m{at}").into_bytes());
        }

        // Every index is now consumed.
        for message in &messages {
            prop_assert!(pair.bob.decrypt(&alice_device, session, message, &mut rng).is_err());
        }
    }

    /// Ciphertext never equals plaintext and never repeats across messages,
    /// even for identical payloads.
    #[test]
    fn identical_payloads_produce_distinct_ciphertexts(
        payload in proptest::collection::vec(any::<u8>(), 1..256),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let pair = pair(&mut rng);
        let session = establish(&pair, &mut rng);
        let (_, bob_device) = devices();

        let first = pair.alice.encrypt(&bob_device, session, &payload).unwrap();
        let second = pair.alice.encrypt(&bob_device, session, &payload).unwrap();

        prop_assert_ne!(&first.ciphertext, &payload);
        prop_assert_ne!(&first.ciphertext, &second.ciphertext);
    }

    /// Group messages round-trip for any payload batch and are refused on
    /// replay.
    #[test]
    fn group_roundtrip_consumes_each_index_once(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..256), 1..10),
        seed in any::<u64>(),
    ) {
        use sealbox_engine::GroupEngine;

        let mut rng = StdRng::seed_from_u64(seed);
        let config = EngineConfig::default();
        let sender = GroupEngine::new(MemoryStore::new(), TrustLedger::new(), config);
        let receiver = GroupEngine::new(MemoryStore::new(), TrustLedger::new(), config);
        let room = RoomId::from("!prop:example.org");
        let (alice_device, _) = devices();

        let session = sender.create_outbound(&room, &mut rng).unwrap();
        let distribution = sender.share(&room, session).unwrap();
        receiver.import_inbound(&room, &alice_device, &distribution).unwrap();

        let mut delivered = Vec::new();
        for payload in &payloads {
            let message = sender.encrypt(&room, session, payload).unwrap();
            let plaintext = receiver.decrypt(&room, &alice_device, &message).unwrap();
            prop_assert_eq!(&plaintext, payload);
            delivered.push(message);
        }

        for message in &delivered {
            prop_assert!(receiver.decrypt(&room, &alice_device, message).is_err());
        }
    }
}
