//! End-to-end group session flows over the in-memory store.

use rand::SeedableRng;
use rand::rngs::StdRng;
use sealbox_engine::{
    DeviceId, EngineConfig, EngineError, GroupDistributionMessage, GroupEngine, Identity,
    IdentityStore, MemoryStore, PairwiseEngine, RoomId, TrustLedger, TrustState,
};

struct Account {
    identity_store: IdentityStore,
    identity: Identity,
    trust: TrustLedger,
    pairwise: PairwiseEngine<MemoryStore>,
    group: GroupEngine<MemoryStore>,
}

impl Account {
    fn new(rng: &mut StdRng) -> Self {
        Self::with_config(rng, EngineConfig::default())
    }

    fn with_config(rng: &mut StdRng, config: EngineConfig) -> Self {
        let identity_store = IdentityStore::new(config);
        let identity = identity_store.create_identity(rng).unwrap();
        let trust = TrustLedger::new();
        let store = MemoryStore::new();
        let pairwise = PairwiseEngine::new(store.clone(), trust.clone(), config);
        let group = GroupEngine::new(store, trust.clone(), config);
        Self { identity_store, identity, trust, pairwise, group }
    }
}

fn room() -> RoomId {
    RoomId::from("!ops:example.org")
}

fn alice_device() -> DeviceId {
    DeviceId::from("alice-phone")
}

fn bob_device() -> DeviceId {
    DeviceId::from("bob-desktop")
}

/// Carry a distribution message from `sender` to `receiver` the way a host
/// would: sealed inside an established pairwise session.
fn distribute(
    sender: &Account,
    receiver: &Account,
    distribution: &GroupDistributionMessage,
    rng: &mut StdRng,
) {
    let bundle = receiver.identity_store.generate_prekeys(rng, 1).unwrap();
    let payload = distribution.encode().unwrap();
    let (session, handshake) = sender
        .pairwise
        .initiate(&sender.identity, &bob_device(), &bundle, &payload, rng)
        .unwrap();
    let (_, plaintext) = receiver
        .pairwise
        .accept(&receiver.identity_store, &alice_device(), &handshake, rng)
        .unwrap();
    // Session stays open for future rotations; this test only needs the one
    // delivery.
    let _ = session;

    let received = GroupDistributionMessage::decode(&plaintext).unwrap();
    receiver.group.import_inbound(&room(), &alice_device(), &received).unwrap();
}

#[test]
fn distribution_travels_inside_pairwise_and_decrypts_room_traffic() {
    let mut rng = StdRng::seed_from_u64(200);
    let alice = Account::new(&mut rng);
    let bob = Account::new(&mut rng);

    let session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    let distribution = alice.group.share(&room(), session).unwrap();
    distribute(&alice, &bob, &distribution, &mut rng);

    for round in 0..50u32 {
        let body = format!("room update {round}");
        let message = alice.group.encrypt(&room(), session, body.as_bytes()).unwrap();
        let plaintext = bob.group.decrypt(&room(), &alice_device(), &message).unwrap();
        assert_eq!(plaintext, body.as_bytes());
    }
}

#[test]
fn late_joiner_cannot_read_history() {
    let mut rng = StdRng::seed_from_u64(201);
    let alice = Account::new(&mut rng);
    let bob = Account::new(&mut rng);

    let session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    let early = alice.group.encrypt(&room(), session, b"before bob joined").unwrap();

    // Bob joins after the first message; the share point is the current index.
    let distribution = alice.group.share(&room(), session).unwrap();
    assert_eq!(distribution.index, 1);
    bob.group.import_inbound(&room(), &alice_device(), &distribution).unwrap();

    let result = bob.group.decrypt(&room(), &alice_device(), &early);
    assert!(matches!(result, Err(EngineError::KeyTooOld { horizon: 1, requested: 0 })));

    let current = alice.group.encrypt(&room(), session, b"after bob joined").unwrap();
    assert_eq!(
        bob.group.decrypt(&room(), &alice_device(), &current).unwrap(),
        b"after bob joined"
    );
}

#[test]
fn replay_and_out_of_order_through_the_engine() {
    let mut rng = StdRng::seed_from_u64(202);
    let alice = Account::new(&mut rng);
    let bob = Account::new(&mut rng);

    let session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    let distribution = alice.group.share(&room(), session).unwrap();
    bob.group.import_inbound(&room(), &alice_device(), &distribution).unwrap();

    let messages: Vec<_> = (0..4)
        .map(|i| alice.group.encrypt(&room(), session, format!("m{i}").as_bytes()).unwrap())
        .collect();

    for (delivered, expected) in [(2, "m2"), (0, "m0"), (3, "m3"), (1, "m1")] {
        let plaintext = bob.group.decrypt(&room(), &alice_device(), &messages[delivered]).unwrap();
        assert_eq!(plaintext, expected.as_bytes());
    }

    for message in &messages {
        assert!(matches!(
            bob.group.decrypt(&room(), &alice_device(), message),
            Err(EngineError::ReplayedMessage { .. })
        ));
    }
}

#[test]
fn redelivered_distribution_does_not_reset_replay_tracking() {
    let mut rng = StdRng::seed_from_u64(203);
    let alice = Account::new(&mut rng);
    let bob = Account::new(&mut rng);

    let session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    let distribution = alice.group.share(&room(), session).unwrap();
    bob.group.import_inbound(&room(), &alice_device(), &distribution).unwrap();

    let message = alice.group.encrypt(&room(), session, b"once").unwrap();
    bob.group.decrypt(&room(), &alice_device(), &message).unwrap();

    // The transport redelivers the original distribution.
    bob.group.import_inbound(&room(), &alice_device(), &distribution).unwrap();

    let result = bob.group.decrypt(&room(), &alice_device(), &message);
    assert!(matches!(result, Err(EngineError::ReplayedMessage { index: 0 })));
}

#[test]
fn session_rotation_cuts_off_old_recipients() {
    let mut rng = StdRng::seed_from_u64(204);
    let alice = Account::new(&mut rng);
    let bob = Account::new(&mut rng);

    let old_session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    let distribution = alice.group.share(&room(), old_session).unwrap();
    bob.group.import_inbound(&room(), &alice_device(), &distribution).unwrap();

    // Membership change: rotate, share only to remaining members (nobody).
    let new_session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    assert_ne!(new_session, old_session);
    let message = alice.group.encrypt(&room(), new_session, b"post-rotation").unwrap();

    // Bob has no inbound session matching the new id.
    let result = bob.group.decrypt(&room(), &alice_device(), &message);
    assert!(matches!(result, Err(EngineError::NotFound { .. })));
}

#[test]
fn revoked_outbound_session_stops_encrypting() {
    let mut rng = StdRng::seed_from_u64(205);
    let alice = Account::new(&mut rng);

    let session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    alice.group.encrypt(&room(), session, b"works").unwrap();

    alice.group.revoke_outbound(&room(), session).unwrap();

    assert!(matches!(
        alice.group.encrypt(&room(), session, b"x"),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        alice.group.share(&room(), session),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn blocked_sender_is_refused() {
    let mut rng = StdRng::seed_from_u64(206);
    let alice = Account::new(&mut rng);
    let bob = Account::new(&mut rng);

    let session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    let distribution = alice.group.share(&room(), session).unwrap();
    bob.group.import_inbound(&room(), &alice_device(), &distribution).unwrap();

    bob.trust.set_trust(alice_device(), TrustState::Blocked);

    let message = alice.group.encrypt(&room(), session, b"unwanted").unwrap();
    assert!(matches!(
        bob.group.decrypt(&room(), &alice_device(), &message),
        Err(EngineError::PeerBlocked { .. })
    ));
    assert!(matches!(
        bob.group.import_inbound(&room(), &alice_device(), &distribution),
        Err(EngineError::PeerBlocked { .. })
    ));
}

#[test]
fn same_sender_in_two_rooms_keeps_sessions_apart() {
    let mut rng = StdRng::seed_from_u64(207);
    let alice = Account::new(&mut rng);
    let bob = Account::new(&mut rng);
    let other_room = RoomId::from("!offtopic:example.org");

    let ops = alice.group.create_outbound(&room(), &mut rng).unwrap();
    let offtopic = alice.group.create_outbound(&other_room, &mut rng).unwrap();

    let ops_dist = alice.group.share(&room(), ops).unwrap();
    let offtopic_dist = alice.group.share(&other_room, offtopic).unwrap();
    bob.group.import_inbound(&room(), &alice_device(), &ops_dist).unwrap();
    bob.group.import_inbound(&other_room, &alice_device(), &offtopic_dist).unwrap();

    let ops_msg = alice.group.encrypt(&room(), ops, b"ops only").unwrap();
    let offtopic_msg = alice.group.encrypt(&other_room, offtopic, b"offtopic").unwrap();

    assert_eq!(bob.group.decrypt(&room(), &alice_device(), &ops_msg).unwrap(), b"ops only");
    assert_eq!(
        bob.group.decrypt(&other_room, &alice_device(), &offtopic_msg).unwrap(),
        b"offtopic"
    );

    // Cross-room delivery finds no session.
    let result = bob.group.decrypt(&other_room, &alice_device(), &ops_msg);
    assert!(matches!(result, Err(EngineError::NotFound { .. })));
}

#[test]
fn narrow_window_prunes_old_indexes() {
    let mut rng = StdRng::seed_from_u64(208);
    let config = EngineConfig { group_window: 3, ..EngineConfig::default() };
    let alice = Account::with_config(&mut rng, config);
    let bob = Account::with_config(&mut rng, config);

    let session = alice.group.create_outbound(&room(), &mut rng).unwrap();
    let distribution = alice.group.share(&room(), session).unwrap();
    bob.group.import_inbound(&room(), &alice_device(), &distribution).unwrap();

    let stale = alice.group.encrypt(&room(), session, b"m0").unwrap();
    for i in 1..=6u32 {
        let message = alice.group.encrypt(&room(), session, format!("m{i}").as_bytes()).unwrap();
        bob.group.decrypt(&room(), &alice_device(), &message).unwrap();
    }

    // Chain head is at 7; the window ends at 4.
    let result = bob.group.decrypt(&room(), &alice_device(), &stale);
    assert!(matches!(result, Err(EngineError::KeyTooOld { horizon: 4, requested: 0 })));
}
