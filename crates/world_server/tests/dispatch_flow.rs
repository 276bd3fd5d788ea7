mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use replica_codec::frame::REPLICA_SERIALIZE;
use replica_codec::{schema, BitReader, Direction, ObjectId, WireValue};
use world_server::messages::connection::{Handshake, PROTOCOL_VERSION};
use world_server::messages::{encode_client_game_message, encode_packet, Message, MessageKind};
use world_server::objects::components::StatsState;
use world_server::objects::StatsComponent;
use world_server::{
    DispatchOutcome, ErrorKind, HandlerContext, HandlerGroup, RegistryBuilder, ServerError,
};

use common::{endpoint, harness, CRATE_HEALTH, CRATE_ID, HUB};

const APPLY_DAMAGE: u16 = 0x1234;
const BROKEN: u16 = 0x1235;
const PANICKING: u16 = 0x1236;
const BACKGROUND_FAULT: u16 = 0x1237;
const ASYNC_FAULT: u16 = 0x1238;
const EAGER_PANIC: u16 = 0x1239;
const PING: u32 = 0x77;

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct ApplyDamage {
        pub amount: u32,
    }
}

impl Message for ApplyDamage {
    const ROUTE: MessageKind = MessageKind::Game {
        message_id: APPLY_DAMAGE,
    };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Broken {}
}

impl Message for Broken {
    const ROUTE: MessageKind = MessageKind::Game { message_id: BROKEN };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Panicking {}
}

impl Message for Panicking {
    const ROUTE: MessageKind = MessageKind::Game { message_id: PANICKING };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct BackgroundFault {
        pub panic: bool,
    }
}

impl Message for BackgroundFault {
    const ROUTE: MessageKind = MessageKind::Game {
        message_id: BACKGROUND_FAULT,
    };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct AsyncFault {
        pub panic: bool,
    }
}

impl Message for AsyncFault {
    const ROUTE: MessageKind = MessageKind::Game {
        message_id: ASYNC_FAULT,
    };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct EagerPanic {
        pub armed: bool,
    }
}

impl Message for EagerPanic {
    const ROUTE: MessageKind = MessageKind::Game {
        message_id: EAGER_PANIC,
    };
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Ping {
        pub amount: u32,
    }
}

impl Message for Ping {
    const ROUTE: MessageKind = MessageKind::Packet {
        direction: Direction::General,
        packet_id: PING,
    };
}

/// Damages the addressed object and counts its invocations.
struct DamageGroup {
    calls: Arc<AtomicUsize>,
}

impl DamageGroup {
    fn new() -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Arc::new(Self { calls: calls.clone() }), calls)
    }
}

impl HandlerGroup for DamageGroup {
    fn name(&self) -> &'static str {
        "damage"
    }

    fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
        let calls = self.calls.clone();
        builder.on::<ApplyDamage, _>(move |message: ApplyDamage, ctx: HandlerContext| -> anyhow::Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            let target = ctx.associate()?;
            target
                .with_mut::<StatsComponent, _>(|stats| stats.damage(message.amount))
                .context("target has no stats")?;
            Ok(())
        });
    }
}

struct FaultyGroup;

impl HandlerGroup for FaultyGroup {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
        builder
            .on::<Broken, _>(|_message: Broken, _ctx: HandlerContext| -> anyhow::Result<()> {
                anyhow::bail!("handler refused the message")
            })
            .on::<Panicking, _>(|_message: Panicking, _ctx: HandlerContext| -> anyhow::Result<()> {
                panic!("handler blew up")
            });
    }
}

/// Fails or panics from the blocking pool and from spawned tasks.
struct OffloadedFaults;

impl HandlerGroup for OffloadedFaults {
    fn name(&self) -> &'static str {
        "offloaded-faults"
    }

    fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
        builder
            .on_background::<BackgroundFault, _>(
                |message: BackgroundFault, _ctx: HandlerContext| -> anyhow::Result<()> {
                    if message.panic {
                        panic!("background handler blew up");
                    }
                    anyhow::bail!("background handler refused the message")
                },
            )
            .on_async::<AsyncFault, _, _>(|message: AsyncFault, _ctx: HandlerContext| async move {
                if message.panic {
                    panic!("async handler blew up");
                }
                Err::<(), _>(anyhow::anyhow!("async handler refused the message"))
            })
            .on_async::<EagerPanic, _, _>(|message: EagerPanic, _ctx: HandlerContext| {
                if message.armed {
                    panic!("handler blew up before returning its future");
                }
                async { Ok::<(), anyhow::Error>(()) }
            });
    }
}

fn dropped_kind(outcome: &DispatchOutcome) -> Option<ErrorKind> {
    match outcome {
        DispatchOutcome::Dropped(e) => Some(e.kind()),
        DispatchOutcome::Handled { .. } => None,
    }
}

#[tokio::test]
async fn game_message_mutates_object_and_next_serialize_reflects_it() {
    let (group, calls) = DamageGroup::new();
    let h = harness(vec![group]);
    let ctx = h.server.context();
    let client = endpoint(40001);

    let zone = ctx.zones.get_or_create_zone(HUB).await.unwrap();
    h.server.dispatcher().accept(client).unwrap();
    assert_eq!(zone.add_observer(client), 1);
    h.sink.take();

    let frame = encode_client_game_message(CRATE_ID, &ApplyDamage { amount: 3 });
    let outcome = h.server.dispatcher().dispatch(client, &frame);
    assert!(outcome.is_handled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(zone.replicate_tick(), 1);
    let sent = h.sink.take();
    assert_eq!(sent.len(), 1);
    let (to, bytes) = &sent[0];
    assert_eq!(*to, client);

    let mut reader = BitReader::new(bytes);
    assert_eq!(reader.read_u8().unwrap(), REPLICA_SERIALIZE);
    assert_eq!(Some(reader.read_u16().unwrap()), zone.network_id(CRATE_ID));
    assert!(reader.read_bit().unwrap(), "stats marked dirty");
    let stats = StatsState::read_from(&mut reader).unwrap();
    assert_eq!(stats.health, CRATE_HEALTH - 3);
    assert_eq!(stats.max_health, CRATE_HEALTH);

    // Nothing changed since, so the next tick is silent.
    assert_eq!(zone.replicate_tick(), 0);
}

#[tokio::test]
async fn later_registration_replaces_earlier_one() {
    let (first, first_calls) = DamageGroup::new();
    let (second, second_calls) = DamageGroup::new();
    let h = harness(vec![first, second]);
    let client = endpoint(40002);

    h.server.context().zones.get_or_create_zone(HUB).await.unwrap();
    h.server.dispatcher().accept(client).unwrap();

    let frame = encode_client_game_message(CRATE_ID, &ApplyDamage { amount: 1 });
    assert!(h.server.dispatcher().dispatch(client, &frame).is_handled());

    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn frame_for_absent_object_is_dropped_before_the_handler() {
    let (group, calls) = DamageGroup::new();
    let h = harness(vec![group]);
    let client = endpoint(40003);

    h.server.context().zones.get_or_create_zone(HUB).await.unwrap();
    h.server.dispatcher().accept(client).unwrap();

    let frame = encode_client_game_message(ObjectId(999), &ApplyDamage { amount: 1 });
    let outcome = h.server.dispatcher().dispatch(client, &frame);
    assert_eq!(dropped_kind(&outcome), Some(ErrorKind::Routing));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let stats = h.server.context().stats.snapshot();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.dropped_routing, 1);
    assert_eq!(stats.handled, 0);
}

#[tokio::test]
async fn game_message_before_zone_is_live_is_a_routing_drop() {
    let (group, calls) = DamageGroup::new();
    let h = harness(vec![group]);
    let client = endpoint(40004);
    h.server.dispatcher().accept(client).unwrap();

    let frame = encode_client_game_message(CRATE_ID, &ApplyDamage { amount: 1 });
    let outcome = h.server.dispatcher().dispatch(client, &frame);
    assert_eq!(dropped_kind(&outcome), Some(ErrorKind::Routing));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_ids_and_garbage_are_protocol_drops() {
    let h = harness(Vec::new());
    let client = endpoint(40005);
    h.server.context().zones.get_or_create_zone(HUB).await.unwrap();
    h.server.dispatcher().accept(client).unwrap();

    // No group binds this message id.
    let frame = encode_client_game_message(CRATE_ID, &ApplyDamage { amount: 1 });
    let outcome = h.server.dispatcher().dispatch(client, &frame);
    assert_eq!(dropped_kind(&outcome), Some(ErrorKind::Protocol));

    let unknown_packet = replica_codec::frame::packet(Direction::Auth, 77).into_bytes();
    let outcome = h.server.dispatcher().dispatch(client, &unknown_packet);
    assert_eq!(dropped_kind(&outcome), Some(ErrorKind::Protocol));

    let truncated = [0x53, 0x04];
    let outcome = h.server.dispatcher().dispatch(client, &truncated);
    assert_eq!(dropped_kind(&outcome), Some(ErrorKind::Protocol));

    let oversized = vec![0x53; h.server.config().max_frame_size + 1];
    let outcome = h.server.dispatcher().dispatch(client, &oversized);
    assert_eq!(dropped_kind(&outcome), Some(ErrorKind::Protocol));

    assert_eq!(h.server.context().stats.snapshot().dropped_protocol, 4);
}

#[tokio::test]
async fn handler_errors_and_panics_are_contained() {
    let h = harness(vec![Arc::new(FaultyGroup)]);
    let client = endpoint(40006);
    h.server.context().zones.get_or_create_zone(HUB).await.unwrap();
    h.server.dispatcher().accept(client).unwrap();

    let outcome = h
        .server
        .dispatcher()
        .dispatch(client, &encode_client_game_message(CRATE_ID, &Broken {}));
    assert!(outcome.is_handled());
    let outcome = h
        .server
        .dispatcher()
        .dispatch(client, &encode_client_game_message(CRATE_ID, &Panicking {}));
    assert!(outcome.is_handled());

    let stats = h.server.context().stats.snapshot();
    assert_eq!(stats.handled, 2);
    assert_eq!(stats.faults, 2);
    assert!(h.server.context().sessions.get(&client).is_some());
}

#[tokio::test]
async fn disconnection_notification_closes_the_session() {
    let h = harness(Vec::new());
    let client = endpoint(40007);
    h.server.dispatcher().accept(client).unwrap();
    assert_eq!(h.server.context().sessions.len(), 1);

    let outcome = h.server.dispatcher().dispatch(client, &[0x13]);
    assert!(outcome.is_handled());
    assert!(h.server.context().sessions.get(&client).is_none());
}

#[tokio::test]
async fn unconfigured_zone_is_refused() {
    let h = harness(Vec::new());
    let zones = &h.server.context().zones;

    let err = zones.get_or_create_zone(4242).await.unwrap_err();
    assert!(matches!(err, ServerError::Configuration(_)));
    assert!(zones.zone(4242).is_none());

    let first = zones.get_or_create_zone(HUB).await.unwrap();
    let second = zones.get_or_create_zone(HUB).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(zones.len(), 1);
}

#[tokio::test]
async fn destroying_a_live_object_announces_it_once() {
    let h = harness(Vec::new());
    let client = endpoint(40008);
    let zone = h
        .server
        .context()
        .zones
        .get_or_create_zone(HUB)
        .await
        .unwrap();
    zone.add_observer(client);
    h.sink.take();

    let crate_object = zone.find(CRATE_ID).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    crate_object.on_destroy(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(zone.destroy(CRATE_ID));
    assert!(!crate_object.destroy());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(zone.find(CRATE_ID).is_none());

    let sent = h.sink.take();
    assert_eq!(sent.len(), 1, "one destruction frame");
    assert_eq!(sent[0].1[0], replica_codec::frame::REPLICA_DESTRUCTION);
}

#[tokio::test]
async fn packet_route_can_be_overridden_at_binding_time() {
    struct Rerouted(Arc<AtomicUsize>);

    impl HandlerGroup for Rerouted {
        fn name(&self) -> &'static str {
            "rerouted"
        }

        fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
            let calls = self.0.clone();
            builder
                .bind::<Ping>()
                .route(Direction::Chat, 99)
                .inline(move |message: Ping, _ctx: HandlerContext| -> anyhow::Result<()> {
                    calls.fetch_add(message.amount as usize, Ordering::SeqCst);
                    Ok(())
                });
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(vec![Arc::new(Rerouted(calls.clone()))]);
    let client = endpoint(40009);

    let mut writer = replica_codec::frame::packet(Direction::Chat, 99);
    replica_codec::codec::encode_into(&Ping { amount: 4 }, &mut writer);
    let outcome = h.server.dispatcher().dispatch(client, &writer.into_bytes());
    assert!(outcome.is_handled());
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    // The declared route is no longer bound.
    let outcome = h.server.dispatcher().dispatch(client, &encode_packet(&Ping { amount: 1 }));
    assert_eq!(dropped_kind(&outcome), Some(ErrorKind::Protocol));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn background_handler_errors_and_panics_are_contained() {
    let h = harness(vec![Arc::new(OffloadedFaults)]);
    let client = endpoint(40010);
    h.server.context().zones.get_or_create_zone(HUB).await.unwrap();
    h.server.dispatcher().accept(client).unwrap();

    for panic in [false, true] {
        let frame = encode_client_game_message(CRATE_ID, &BackgroundFault { panic });
        let outcome = h.server.dispatcher().dispatch(client, &frame);
        assert!(outcome.is_handled());
        outcome.finish().await;
    }

    let stats = h.server.context().stats.snapshot();
    assert_eq!(stats.handled, 2);
    assert_eq!(stats.faults, 2);
    assert!(h.server.context().sessions.get(&client).is_some());
}

#[tokio::test]
async fn async_handler_errors_and_panics_are_contained() {
    let h = harness(vec![Arc::new(OffloadedFaults)]);
    let client = endpoint(40011);
    h.server.context().zones.get_or_create_zone(HUB).await.unwrap();
    h.server.dispatcher().accept(client).unwrap();

    for panic in [false, true] {
        let frame = encode_client_game_message(CRATE_ID, &AsyncFault { panic });
        let outcome = h.server.dispatcher().dispatch(client, &frame);
        assert!(outcome.is_handled());
        outcome.finish().await;
    }

    let stats = h.server.context().stats.snapshot();
    assert_eq!(stats.handled, 2);
    assert_eq!(stats.faults, 2);
    assert!(h.server.context().sessions.get(&client).is_some());
}

#[tokio::test]
async fn async_handler_panicking_before_its_future_is_contained() {
    let h = harness(vec![Arc::new(OffloadedFaults)]);
    let client = endpoint(40012);
    h.server.context().zones.get_or_create_zone(HUB).await.unwrap();
    h.server.dispatcher().accept(client).unwrap();

    let frame = encode_client_game_message(CRATE_ID, &EagerPanic { armed: true });
    let outcome = h.server.dispatcher().dispatch(client, &frame);
    assert!(outcome.is_handled());
    outcome.finish().await;

    let frame = encode_client_game_message(CRATE_ID, &EagerPanic { armed: false });
    h.server.dispatcher().dispatch(client, &frame).finish().await;

    let stats = h.server.context().stats.snapshot();
    assert_eq!(stats.handled, 2);
    assert_eq!(stats.faults, 1);
    assert!(h.server.context().sessions.get(&client).is_some());
}

#[tokio::test]
async fn game_message_without_a_session_is_a_routing_drop() {
    let (group, calls) = DamageGroup::new();
    let h = harness(vec![group]);
    let stranger = endpoint(40013);
    h.server.context().zones.get_or_create_zone(HUB).await.unwrap();

    let frame = encode_client_game_message(CRATE_ID, &ApplyDamage { amount: 1 });
    let outcome = h.server.dispatcher().dispatch(stranger, &frame);
    assert_eq!(dropped_kind(&outcome), Some(ErrorKind::Routing));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.server.context().stats.snapshot().dropped_routing, 1);
}

#[tokio::test]
async fn rejected_datagrams_never_open_a_session() {
    let h = harness(Vec::new());
    let dispatcher = h.server.dispatcher();
    let stranger = endpoint(40014);

    let oversized = vec![0x53; h.server.config().max_frame_size + 1];
    assert_eq!(dropped_kind(&dispatcher.receive(stranger, &oversized)), Some(ErrorKind::Protocol));
    assert_eq!(dropped_kind(&dispatcher.receive(stranger, &[0x53, 0x04])), Some(ErrorKind::Protocol));
    assert_eq!(dropped_kind(&dispatcher.receive(stranger, &[])), Some(ErrorKind::Protocol));
    assert!(dispatcher.receive(stranger, &[0x13]).is_handled());
    assert!(h.server.context().sessions.is_empty());

    let hello = Handshake {
        version: PROTOCOL_VERSION,
        reserved: 0,
        service: 5,
        process_id: 1,
        port: 1001,
    };
    assert!(dispatcher.receive(stranger, &encode_packet(&hello)).is_handled());
    assert_eq!(h.server.context().sessions.len(), 1);

    let stats = h.server.context().stats.snapshot();
    assert_eq!(stats.received, 5);
    assert_eq!(stats.dropped_protocol, 3);
}
