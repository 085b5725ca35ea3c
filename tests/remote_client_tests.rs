#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for [`RemoteClient`].
//!
//! Most tests use the scriptable `MockTransport` from `tests/common`; the
//! last section runs a full round trip over the in-process loopback pair.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use card_room_sync::{
    loopback_pair, Action, ClientEnvelope, ConnectOptions, ConnectionStatus, CurrentUser, Phase,
    PlayerRecord, RemoteClient, RoomIntents, RoomState, SyncConfig, SyncError, TransportAdapter,
};
use tokio_test::{assert_err, assert_ok};

use common::{ann, engine, single_use_factory, wait_until, MockProbe, MockTransport, ENGINE_ID};

fn remote_with(transport: MockTransport) -> RemoteClient {
    let config = SyncConfig::new()
        .with_automation(false)
        .with_transport_factory(single_use_factory(transport));
    RemoteClient::new(engine(), config)
}

fn options() -> ConnectOptions {
    ConnectOptions::new()
        .with_engine_id(ENGINE_ID)
        .with_room_id("r1")
        .with_user(ann())
}

async fn connected() -> (RemoteClient, Arc<MockProbe>) {
    let (transport, probe) = MockTransport::new();
    let client = remote_with(transport);
    assert_ok!(client.connect(options()).await);
    (client, probe)
}

// ════════════════════════════════════════════════════════════════════
// Connect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_reaches_connected_with_placeholder_state() {
    let (transport, probe) = MockTransport::new();
    let client = remote_with(transport);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = client.subscribe_status(move |s| sink.lock().unwrap().push(s.status));

    client.connect(options()).await.unwrap();

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[
            ConnectionStatus::Idle,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
        ]
    );
    assert_eq!(probe.connects.load(Ordering::SeqCst), 1);
    assert_eq!(probe.registry.len(), 4);
    assert!(client.has_transport().await);

    let state = client.state();
    assert_eq!(state.user_id.as_deref(), Some("u-ann"));
    assert_eq!(state.phase, Phase::RoomLobby);
}

#[tokio::test]
async fn missing_factory_is_a_configuration_error() {
    let client = RemoteClient::new(engine(), SyncConfig::new());
    let err = assert_err!(client.connect(options()).await);
    assert_eq!(err, SyncError::MissingTransportFactory);
    assert_eq!(client.status().status, ConnectionStatus::Error);
    assert_eq!(client.status().error, Some(err));
}

#[tokio::test]
async fn factory_failure_is_propagated() {
    let config = SyncConfig::new().with_transport_factory(|_req| {
        Err(SyncError::TransportUnavailable("no route to table".into()))
    });
    let client = RemoteClient::new(engine(), config);
    let err = client.connect(options()).await.unwrap_err();
    assert_eq!(err, SyncError::TransportUnavailable("no route to table".into()));
    assert_eq!(client.status().error, Some(err));
}

#[tokio::test]
async fn engine_mismatch_fails_before_building_transport() {
    let (transport, probe) = MockTransport::new();
    let client = remote_with(transport);
    let err = client
        .connect(ConnectOptions::new().with_engine_id("poker"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::EngineMismatch { .. }));
    assert_eq!(probe.connects.load(Ordering::SeqCst), 0);
    assert_eq!(client.status().status, ConnectionStatus::Error);
}

#[tokio::test]
async fn failed_handshake_leaves_no_listeners() {
    let (mut transport, probe) = MockTransport::new();
    transport.fail_connect = Some(SyncError::TransportConnect("refused".into()));
    let client = remote_with(transport);

    let err = assert_err!(client.connect(options()).await);
    assert_eq!(err, SyncError::TransportConnect("refused".into()));
    assert!(probe.registry.is_empty());
    assert_eq!(probe.cleanups.load(Ordering::SeqCst), 4);
    assert!(!client.has_transport().await);
    assert_eq!(client.status().error, Some(err));
}

#[tokio::test]
async fn reconnect_tears_down_previous_transport() {
    let probes: Arc<Mutex<Vec<Arc<MockProbe>>>> = Arc::new(Mutex::new(Vec::new()));
    let made = Arc::clone(&probes);
    let config = SyncConfig::new()
        .with_automation(false)
        .with_transport_factory(move |_req| {
            let (transport, probe) = MockTransport::new();
            made.lock().unwrap().push(probe);
            Ok(Box::new(transport) as Box<dyn TransportAdapter>)
        });
    let client = RemoteClient::new(engine(), config);

    client.connect(options()).await.unwrap();
    client.connect(options()).await.unwrap();

    let probes = probes.lock().unwrap();
    assert_eq!(probes.len(), 2);
    assert_eq!(probes[0].disconnects.load(Ordering::SeqCst), 1);
    assert!(probes[0].registry.is_empty());
    assert_eq!(probes[1].registry.len(), 4);
    assert_eq!(client.status().status, ConnectionStatus::Connected);
}

// ════════════════════════════════════════════════════════════════════
// Pushed data and faults
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pushed_snapshot_replaces_state_wholesale() {
    let (client, probe) = connected().await;
    let pushed = RoomState {
        room_id: Some("r1".into()),
        phase: Phase::Playing,
        current_turn: Some("u-bob".into()),
        players: vec![PlayerRecord::human("u-bob", "Bob")],
        ..RoomState::default()
    };
    probe.registry.emit_snapshot(pushed.clone());

    // Adopted as-is: the local user is not merged in.
    assert_eq!(*client.state(), pushed);
}

#[tokio::test]
async fn pushed_event_runs_through_reducer() {
    let (client, probe) = connected().await;
    probe.registry.emit_event(Action::add_bot(Some("Remote Bot")));
    let state = client.state();
    assert_eq!(state.players.len(), 2);
    assert_eq!(state.players[1].name, "Remote Bot");
}

#[tokio::test]
async fn transport_faults_become_status_transitions() {
    let (client, probe) = connected().await;

    probe
        .registry
        .emit_error(SyncError::Remote("table crashed".into()));
    assert_eq!(client.status().status, ConnectionStatus::Error);
    assert_eq!(
        client.status().error,
        Some(SyncError::Remote("table crashed".into()))
    );

    probe.registry.emit_disconnected(None);
    assert_eq!(client.status().status, ConnectionStatus::Disconnected);
    assert_eq!(client.status().error, None);
}

// ════════════════════════════════════════════════════════════════════
// Sending
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn intents_go_to_transport_not_reducer() {
    let (client, probe) = connected().await;
    let before = client.export_room_snapshot();

    client.add_bot(None).await.unwrap();
    client.toggle_ready().await.unwrap();
    client.play_card("c-qs", Some("spades")).await.unwrap();

    assert_eq!(
        probe.sent_kinds(),
        vec!["ADD_BOT", "TOGGLE_READY", "PLAY_CARD"]
    );
    let sent = probe.sent.lock().unwrap();
    assert_eq!(sent[2].payload_str("playerId"), Some("u-ann"));
    assert_eq!(sent[2].payload_str("chosenSuit"), Some("spades"));
    assert!(client.export_room_snapshot().ptr_eq(&before));
}

#[tokio::test]
async fn send_without_transport_is_not_connected() {
    let (transport, _probe) = MockTransport::new();
    let client = remote_with(transport);
    assert_eq!(
        client.send_action(Action::start_game()).await,
        Err(SyncError::NotConnected)
    );
}

// ════════════════════════════════════════════════════════════════════
// Disconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn disconnect_cleans_up_even_when_transport_fails() {
    let (mut transport, probe) = MockTransport::new();
    transport.fail_disconnect = Some(SyncError::TransportSend("broken pipe".into()));
    transport.failing_cleanup = true;
    let client = remote_with(transport);
    client.connect(options()).await.unwrap();

    client.disconnect().await;

    assert_eq!(probe.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(probe.cleanups.load(Ordering::SeqCst), 4);
    assert!(probe.registry.is_empty());
    assert!(!client.has_transport().await);
    assert_eq!(client.status().status, ConnectionStatus::Disconnected);
    assert_eq!(
        client.send_action(Action::start_game()).await,
        Err(SyncError::NotConnected)
    );
}

/// A transport whose disconnect never completes.
struct Stuck;

#[async_trait]
impl TransportAdapter for Stuck {
    async fn disconnect(&mut self) -> card_room_sync::Result<()> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_bounded_by_shutdown_timeout() {
    let config = SyncConfig::new()
        .with_shutdown_timeout(Duration::from_millis(200))
        .with_transport_factory(single_use_factory(Stuck));
    let client = RemoteClient::new(engine(), config);
    client.connect(options()).await.unwrap();

    let started = tokio::time::Instant::now();
    client.disconnect().await;
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(client.status().status, ConnectionStatus::Disconnected);
}

/// A transport whose sends never complete.
struct StalledSend;

#[async_trait]
impl TransportAdapter for StalledSend {
    async fn send_action(&mut self, _action: Action) -> card_room_sync::Result<()> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_send_does_not_block_disconnect() {
    let config = SyncConfig::new()
        .with_automation(false)
        .with_shutdown_timeout(Duration::from_millis(100))
        .with_transport_factory(single_use_factory(StalledSend));
    let client = Arc::new(RemoteClient::new(engine(), config));
    client.connect(options()).await.unwrap();

    let sender = Arc::clone(&client);
    let in_flight = tokio::spawn(async move { sender.send_action(Action::start_game()).await });
    tokio::task::yield_now().await;
    assert!(!in_flight.is_finished());

    let finished = tokio::time::timeout(Duration::from_secs(2), client.disconnect()).await;
    assert!(finished.is_ok());
    assert_eq!(client.status().status, ConnectionStatus::Disconnected);
    assert!(!client.has_transport().await);
    assert_eq!(
        client.send_action(Action::start_game()).await,
        Err(SyncError::NotConnected)
    );
    in_flight.abort();
}

// ════════════════════════════════════════════════════════════════════
// Loopback round trip
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn loopback_round_trip() {
    let (transport, mut server) = loopback_pair();
    let config = SyncConfig::new()
        .with_automation(false)
        .with_transport_factory(single_use_factory(transport));
    let client = RemoteClient::new(engine(), config);
    client.connect(options()).await.unwrap();

    let join = server.next_envelope().await.unwrap().unwrap();
    assert!(matches!(join, ClientEnvelope::Join { room_id: Some(ref r), .. } if r == "r1"));

    client.start_game().await.unwrap();
    let ClientEnvelope::Action { action } = server.next_envelope().await.unwrap().unwrap() else {
        panic!("expected action envelope");
    };
    assert_eq!(action.kind, "START_GAME");

    let authoritative = RoomState {
        room_id: Some("r1".into()),
        user_id: Some("u-ann".into()),
        phase: Phase::Playing,
        current_turn: Some("u-ann".into()),
        players: vec![PlayerRecord::human("u-ann", "Ann"), PlayerRecord::bot("bot-1", "Bot 1")],
        ..RoomState::default()
    };
    server.push_snapshot(authoritative).unwrap();
    wait_until(|| client.state().phase == Phase::Playing).await;

    server
        .push_event(Action::play_card(Some("u-ann"), "c-3c", None))
        .unwrap();
    wait_until(|| client.state().current_turn.as_deref() == Some("bot-1")).await;

    drop(server);
    wait_until(|| client.status().status == ConnectionStatus::Disconnected).await;
}

#[tokio::test]
async fn guest_identity_is_announced_on_join() {
    let (transport, mut server) = loopback_pair();
    let config = SyncConfig::new()
        .with_automation(false)
        .with_transport_factory(single_use_factory(transport));
    let client = RemoteClient::new(engine(), config);
    let guest = CurrentUser::guest("Walk-in");

    client
        .connect(ConnectOptions::new().with_user(guest.clone()))
        .await
        .unwrap();

    let ClientEnvelope::Join { user, .. } = server.next_envelope().await.unwrap().unwrap() else {
        panic!("expected join envelope");
    };
    assert_eq!(user, Some(guest.clone()));
    assert_eq!(client.state().user_id, guest.id);
}
