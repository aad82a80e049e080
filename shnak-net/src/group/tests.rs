// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_matches::assert_matches;
use shnak_core::{Filter, Hash, Identity, Payload, PublicKey};
use shnak_encryption::crypto::xchacha20;
use shnak_encryption::group_info_keys;

use crate::channel::Delivery;
use crate::connection::ConnectionHandler;
use crate::endpoint::Endpoint;
use crate::group::{Capability, Group, GroupError, GroupInfo, GroupMember, Published};
use crate::message::MessageError;
use crate::test_utils::{MemoryBus, MemoryConnection, setup_logging};

/// Group root and participants sharing one bus.
struct TestNetwork {
    bus: MemoryBus,
    root: Endpoint<MemoryConnection>,
    participants: Vec<Group<MemoryConnection>>,
}

impl TestNetwork {
    fn new(participants: u8) -> Self {
        setup_logging();

        let bus = MemoryBus::new();
        let root = bus.endpoint(1);
        let participants = (0..participants)
            .map(|index| Group::new(bus.endpoint(10 + index), root.public_key()).unwrap())
            .collect();

        let mut network = Self {
            bus,
            root,
            participants,
        };
        network.open();
        network
    }

    fn open(&mut self) {
        let mut peers: Vec<&mut dyn ConnectionHandler> = Vec::new();
        peers.push(&mut self.root);
        for participant in self.participants.iter_mut() {
            peers.push(participant);
        }
        self.bus.open(&mut peers);
        self.process();
    }

    fn process(&mut self) -> usize {
        let mut peers: Vec<&mut dyn ConnectionHandler> = Vec::new();
        peers.push(&mut self.root);
        for participant in self.participants.iter_mut() {
            peers.push(participant);
        }
        self.bus.process(&mut peers)
    }

    fn public_key(&self, participant: usize) -> PublicKey {
        self.participants[participant].endpoint().public_key()
    }

    /// Grants `(participant, write, read)` capabilities at the given iteration.
    fn init_group(&mut self, grants: &[(usize, bool, bool)], iteration: u32) {
        let members: Vec<GroupMember> = grants
            .iter()
            .map(|(participant, write, read)| {
                GroupMember::new(self.public_key(*participant), *write, *read)
            })
            .collect();
        self.root.init_group(&members, iteration).unwrap();
    }
}

#[test]
fn publish_before_write_access() {
    // Scenario:
    //
    // - Root creates a group with ant, bat and cat, all of them may read and write
    // - Ant subscribes to messages of kind 20
    // - Bat publishes before it received its group info
    //
    // Assert: Bat's publication is deferred until it can write
    // Assert: Ant receives bat's message exactly once
    let mut network = TestNetwork::new(3);
    let (ant, bat, cat) = (0, 1, 2);

    let mut subscription = network.participants[ant].subscribe(vec![Filter::equals("K", 20)]);
    let published = network.participants[bat]
        .publish(Payload::with_kind(20))
        .unwrap();
    assert_eq!(published, Published::Deferred);

    network.init_group(&[(ant, true, true), (bat, true, true), (cat, true, true)], 1);
    network.process();

    for participant in &network.participants {
        assert_eq!(participant.capability(), Capability::ReadWrite);
        assert_eq!(participant.iteration(), Some(1));
        assert_eq!(participant.members().len(), 3);
    }

    let deliveries = subscription.drain();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].payload, Payload::with_kind(20));
    assert_eq!(deliveries[0].sender, network.public_key(bat));
    assert_eq!(deliveries[0].routing, Some(network.root.public_key()));
}

#[test]
fn readers_derive_writer_keys() {
    let mut network = TestNetwork::new(3);
    network.init_group(&[(0, true, true), (1, true, true), (2, true, true)], 1);
    network.process();

    for writer in 0..3 {
        let writer_keys = network.participants[writer].write_keys().unwrap();
        for reader in 0..3 {
            let reader_keys = network.participants[reader]
                .member_keys(&network.public_key(writer))
                .unwrap();
            assert_eq!(writer_keys, reader_keys);
            assert_eq!(writer_keys.routing_key(), reader_keys.routing_key());
        }
    }
}

#[test]
fn broadcasts_reach_every_reader() {
    let mut network = TestNetwork::new(3);
    network.init_group(&[(0, true, true), (1, true, true), (2, true, true)], 1);
    network.process();

    let mut subscriptions: Vec<_> = network
        .participants
        .iter_mut()
        .map(|participant| participant.subscribe(vec![]))
        .collect();

    let published = network.participants[2]
        .publish(Payload::with_kind(20).with("text", "hello"))
        .unwrap();
    assert_matches!(published, Published::Sent(_));
    network.process();

    for subscription in subscriptions.iter_mut() {
        let deliveries = subscription.drain();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].payload,
            Payload::with_kind(20).with("text", "hello")
        );
    }
}

#[test]
fn read_only_and_write_only() {
    let mut network = TestNetwork::new(2);
    let (reader, writer) = (0, 1);
    let mut subscription = network.participants[reader].subscribe(vec![]);

    network.init_group(&[(reader, false, true), (writer, true, false)], 1);
    network.process();

    assert_eq!(
        network.participants[reader].capability(),
        Capability::ReadOnly
    );
    assert_eq!(
        network.participants[writer].capability(),
        Capability::WriteOnly
    );

    // Without a broadcast channel the iteration is never recorded.
    assert_eq!(network.participants[reader].iteration(), Some(1));
    assert_eq!(network.participants[writer].iteration(), None);

    network.participants[writer]
        .publish(Payload::with_kind(20))
        .unwrap();
    let published = network.participants[reader]
        .publish(Payload::with_kind(21))
        .unwrap();
    assert_eq!(published, Published::Deferred);
    network.process();

    let deliveries = subscription.drain();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].payload, Payload::with_kind(20));
}

#[test]
fn deferred_publications_fire_once() {
    let mut network = TestNetwork::new(2);
    let mut subscription = network.participants[0].subscribe(vec![]);

    network.participants[1]
        .publish(Payload::with_kind(20))
        .unwrap();
    network.participants[1]
        .publish(Payload::with_kind(21))
        .unwrap();

    network.init_group(&[(0, true, true), (1, true, true)], 1);
    network.process();
    network.init_group(&[(0, true, true), (1, true, true)], 2);
    network.process();

    let kinds: Vec<Option<i64>> = subscription
        .drain()
        .into_iter()
        .map(|delivery| delivery.payload.kind())
        .collect();
    assert_eq!(kinds, vec![Some(20), Some(21)]);
}

#[test]
fn duplicate_iteration_is_ignored() {
    let mut network = TestNetwork::new(2);
    let mut subscription = network.participants[0].subscribe(vec![]);

    network.init_group(&[(0, true, true), (1, true, true)], 1);
    network.process();
    let member_keys = network.participants[0]
        .member_keys(&network.public_key(1))
        .cloned()
        .unwrap();
    let write_keys = network.participants[1].write_keys().cloned().unwrap();

    // Same iteration again, with a fresh inner identity.
    network.init_group(&[(0, true, true), (1, true, true)], 1);
    network.process();

    assert_eq!(network.participants[0].iteration(), Some(1));
    assert_eq!(
        network.participants[0].member_keys(&network.public_key(1)),
        Some(&member_keys)
    );
    assert_eq!(network.participants[1].write_keys(), Some(&write_keys));

    // Exactly one broadcast channel is active.
    network.participants[1]
        .publish(Payload::with_kind(20))
        .unwrap();
    network.process();
    assert_eq!(subscription.drain().len(), 1);
}

#[test]
fn newer_iteration_rotates_keys() {
    let mut network = TestNetwork::new(3);
    let (ant, bat, cat) = (0, 1, 2);
    let mut subscription = network.participants[ant].subscribe(vec![]);

    network.init_group(&[(ant, true, true), (bat, true, true), (cat, true, true)], 1);
    network.process();
    let old_keys = network.participants[ant]
        .member_keys(&network.public_key(cat))
        .cloned()
        .unwrap();

    // Bat is removed from the group.
    network.init_group(&[(ant, true, true), (cat, true, true)], 2);
    network.process();

    assert_eq!(network.participants[ant].iteration(), Some(2));
    assert_eq!(network.participants[ant].members().len(), 2);
    assert!(
        network.participants[ant]
            .member_keys(&network.public_key(bat))
            .is_none()
    );
    assert_ne!(
        network.participants[ant].member_keys(&network.public_key(cat)),
        Some(&old_keys)
    );

    // Bat still holds the keys of the previous iteration which nobody accepts anymore.
    assert_eq!(network.participants[bat].iteration(), Some(1));
    network.participants[bat]
        .publish(Payload::with_kind(20))
        .unwrap();
    network.participants[cat]
        .publish(Payload::with_kind(21))
        .unwrap();
    network.process();

    let deliveries = subscription.drain();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].sender, network.public_key(cat));

    // Older group info can not roll back the rotation.
    network.init_group(&[(ant, true, true), (bat, true, true), (cat, true, true)], 1);
    network.process();
    assert!(
        network.participants[ant]
            .member_keys(&network.public_key(bat))
            .is_none()
    );
}

#[test]
fn outsiders_can_not_forge_group_info() {
    // Scenario:
    //
    // - Eve joins the group without being a member
    // - Eve publishes a group info granting read and write access to her own inner key, once
    //   signed with her own identity and once with the identity she shares with the root
    // - Root grants access to ant only
    // - Eve broadcasts with the write keys of her forged group info
    //
    // Assert: Ant ignores both forged group infos, it keeps waiting for the real one
    // Assert: Ant ignores eve's broadcast
    let mut network = TestNetwork::new(2);
    let (ant, eve) = (0, 1);
    let root = network.root.public_key();
    let mut subscription = network.participants[ant].subscribe(vec![]);

    let eve_identity = network.participants[eve].endpoint().identity().clone();
    let eve_inner = Identity::from_seed([66; 32]);
    let eve_keys = group_info_keys(&eve_identity.private_key(), &root).unwrap();
    let forged = GroupInfo {
        iteration: 7,
        private_key: Some(eve_inner.private_key()),
        public_key: Some(eve_inner.public_key()),
        members: vec![network.public_key(ant), network.public_key(eve)],
    };
    let ciphertext = xchacha20::encrypt(
        eve_keys.encryption_key(),
        &forged.to_bytes().unwrap(),
        network.participants[eve].endpoint().rng(),
    )
    .unwrap();
    let payload = Payload::with_kind(2).with("d", ciphertext);

    let endpoint = network.participants[eve].endpoint_mut();
    endpoint.publish(&payload).unwrap();
    endpoint
        .publish_as(&payload, &eve_keys.sender_identity())
        .unwrap();
    network.process();

    assert_eq!(
        network.participants[ant].capability(),
        Capability::AwaitingInfo
    );
    assert_eq!(network.participants[ant].iteration(), None);

    // Eve can only fool her own group instance, the channel with the root is hers.
    assert!(network.participants[eve].can_write());

    network.init_group(&[(ant, true, true)], 1);
    network.process();
    assert_eq!(
        network.participants[ant].capability(),
        Capability::ReadWrite
    );

    network.participants[eve]
        .publish(Payload::with_kind(20))
        .unwrap();
    network.process();
    assert!(subscription.try_recv().is_none());

    // Real members still hear each other.
    network.participants[ant]
        .publish(Payload::with_kind(20))
        .unwrap();
    network.process();
    assert_eq!(subscription.drain().len(), 1);
}

#[test]
fn undecryptable_broadcast_is_dropped() {
    let mut network = TestNetwork::new(2);
    let mut subscription = network.participants[0].subscribe(vec![]);

    network.init_group(&[(0, true, true), (1, true, true)], 1);
    network.process();

    // Correct routing key, garbage ciphertext.
    let routing = network.participants[1].write_keys().unwrap().routing_key();
    network.participants[1]
        .endpoint_mut()
        .publish(
            &Payload::with_kind(2)
                .with("R", routing)
                .with("d", vec![0u8; 64]),
        )
        .unwrap();
    network.process();
    assert!(subscription.try_recv().is_none());

    // Group keeps working.
    network.participants[1]
        .publish(Payload::with_kind(20))
        .unwrap();
    network.process();
    assert_eq!(subscription.drain().len(), 1);
}

#[tokio::test]
async fn receive_group_messages() {
    let mut network = TestNetwork::new(2);
    let mut subscription = network.participants[0].subscribe(vec![Filter::equals("K", 20)]);

    network.participants[1]
        .publish(Payload::with_kind(20).with("n", 1))
        .unwrap();
    network.init_group(&[(0, true, true), (1, true, true)], 1);
    network.process();

    let delivery = subscription.recv().await.unwrap();
    assert_eq!(delivery.payload.integer("n"), Some(1));
    assert_eq!(delivery.sender, network.public_key(1));
}

#[test]
fn invalid_group_info_from_root_is_dropped() {
    // Scenario:
    //
    // - Root publishes three broken group infos on ant's pairwise channel, signed with the
    //   expected sender identity: one with garbage ciphertext, one encrypting a payload of the
    //   wrong kind and one without ciphertext
    // - Root then grants read and write access
    //
    // Assert: Ant stays without capabilities until the valid group info arrives
    let mut network = TestNetwork::new(2);
    let ant = 0;
    let mut subscription = network.participants[ant].subscribe(vec![]);

    let keys = group_info_keys(
        &network.root.identity().private_key(),
        &network.public_key(ant),
    )
    .unwrap();
    let sender = keys.sender_identity();

    let garbage = Payload::with_kind(2).with("d", vec![7u8; 64]);
    let wrong_kind = {
        let plaintext = Payload::with_kind(20).with("I", 1).to_bytes().unwrap();
        let ciphertext =
            xchacha20::encrypt(keys.encryption_key(), &plaintext, network.root.rng()).unwrap();
        Payload::with_kind(2).with("d", ciphertext)
    };
    let missing_ciphertext = Payload::with_kind(2);

    for payload in [&garbage, &wrong_kind, &missing_ciphertext] {
        network.root.publish_as(payload, &sender).unwrap();
    }
    network.process();

    let group = &mut network.participants[ant];
    assert_eq!(group.capability(), Capability::AwaitingInfo);
    assert_eq!(group.iteration(), None);
    assert!(group.members().is_empty());

    // Each one is rejected for its own reason.
    let delivery = |payload: &Payload| Delivery {
        payload: payload.clone(),
        sender: sender.public_key(),
        hash: Hash::new(payload.to_bytes().unwrap()),
        routing: None,
    };
    assert_matches!(
        group.handle_group_info(&delivery(&garbage)),
        Err(GroupError::DecryptionFailure(_))
    );
    assert_matches!(
        group.handle_group_info(&delivery(&wrong_kind)),
        Err(GroupError::Malformed(MessageError::UnexpectedKind(20)))
    );
    assert_matches!(
        group.handle_group_info(&delivery(&missing_ciphertext)),
        Err(GroupError::Malformed(MessageError::MissingField("d")))
    );

    // The pairwise channel keeps working.
    network.init_group(&[(ant, true, true), (1, true, true)], 1);
    network.process();
    assert_eq!(
        network.participants[ant].capability(),
        Capability::ReadWrite
    );
    assert_eq!(network.participants[ant].iteration(), Some(1));

    network.participants[1]
        .publish(Payload::with_kind(20))
        .unwrap();
    network.process();
    assert_eq!(subscription.drain().len(), 1);
}
