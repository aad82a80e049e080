// SPDX-License-Identifier: MIT OR Apache-2.0

use shnak_core::{Filter, Payload};
use shnak_net::test_utils::{MemoryBus, setup_logging};
use shnak_net::{Capability, ConnectionState, Group, GroupMember, Published};
use tokio_stream::StreamExt;

#[tokio::test]
async fn group_over_shared_bus() {
    setup_logging();

    let bus = MemoryBus::new();
    let mut root = bus.endpoint(1);
    let mut ant = Group::new(bus.endpoint(2), root.public_key()).unwrap();
    let mut bat = Group::new(bus.endpoint(3), root.public_key()).unwrap();
    let mut cat = Group::new(bus.endpoint(4), root.public_key()).unwrap();

    bus.open(&mut [&mut root, &mut ant, &mut bat, &mut cat]);
    assert_eq!(root.state(), ConnectionState::Open);
    assert_eq!(ant.capability(), Capability::AwaitingInfo);

    let subscription = ant.subscribe(vec![Filter::equals("K", 20)]);
    assert_eq!(
        bat.publish(Payload::with_kind(20)).unwrap(),
        Published::Deferred
    );

    root.init_group(
        &[
            GroupMember::new(ant.endpoint().public_key(), true, true),
            GroupMember::new(bat.endpoint().public_key(), true, true),
            GroupMember::new(cat.endpoint().public_key(), true, true),
        ],
        1,
    )
    .unwrap();
    bus.process(&mut [&mut root, &mut ant, &mut bat, &mut cat]);

    for group in [&ant, &bat, &cat] {
        assert_eq!(group.capability(), Capability::ReadWrite);
    }

    // Payloads of other kinds do not reach ant's channel.
    cat.publish(Payload::with_kind(21)).unwrap();
    bus.process(&mut [&mut root, &mut ant, &mut bat, &mut cat]);

    let bat_key = bat.endpoint().public_key();
    drop(ant);
    let deliveries: Vec<_> = subscription.into_stream().collect().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].payload, Payload::with_kind(20));
    assert_eq!(deliveries[0].sender, bat_key);
    assert_eq!(deliveries[0].routing, Some(root.public_key()));
}

#[test]
fn endpoint_survives_garbage() {
    setup_logging();

    let bus = MemoryBus::new();
    let mut ant = bus.endpoint(1);
    let mut bat = bus.endpoint(2);
    let mut subscription = bat.subscribe(vec![]).unwrap();
    bus.open(&mut [&mut ant, &mut bat]);

    // Publication without signature.
    bus.inject(
        Payload::with_kind(-4)
            .with("m", Payload::with_kind(20).to_bytes().unwrap())
            .with("p", ant.public_key())
            .to_bytes()
            .unwrap(),
    );
    bus.inject(b"definitely not cbor".to_vec());
    bus.process(&mut [&mut ant, &mut bat]);
    assert!(subscription.try_recv().is_none());
    assert_eq!(bat.state(), ConnectionState::Open);

    ant.publish(&Payload::with_kind(20)).unwrap();
    bus.process(&mut [&mut ant, &mut bat]);
    assert_eq!(subscription.drain().len(), 1);
}
