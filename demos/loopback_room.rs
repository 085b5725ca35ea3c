//! # Loopback Room Example
//!
//! Hosts an authoritative room and a remote guest in one process:
//!
//! - The **host** is a [`LocalClient`] bound to Hana. It owns the rules,
//!   runs the bots, and pushes a tailored snapshot after every change.
//! - The **guest** is a [`RemoteClient`] bound to Ann. Its intents travel
//!   over the loopback transport; it only ever adopts pushed snapshots.
//!
//! Swap [`loopback_pair`] for a `WebSocketTransport` to talk to a real host.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_room
//! ```

mod shared;

use std::sync::Arc;

use card_room_sync::{
    loopback_pair, Action, ClientEnvelope, ConnectOptions, CurrentUser, LocalClient,
    LoopbackServer, Phase, RemoteClient, RoomIntents, RoomState, SyncConfig, TransportAdapter,
};
use serde_json::json;
use tokio::sync::{watch, Mutex};

use shared::{GoAround, ENGINE_ID, SEAT_GUEST};

const HOST: &str = "hana";

/// Serve one guest until it goes away or the round ends.
async fn host_loop(host: LocalClient, mut server: LoopbackServer) -> card_room_sync::Result<()> {
    let (tx, mut states) = watch::channel(host.state());
    let _sub = host.subscribe(move |state| {
        let _ = tx.send(Arc::clone(state));
    });
    let mut guest: Option<CurrentUser> = None;

    loop {
        tokio::select! {
            envelope = server.next_envelope() => match envelope {
                Some(Ok(ClientEnvelope::Join { user: Some(user), .. })) => {
                    tracing::info!(guest = ?user.name, "guest joined");
                    host.dispatch(Action::new(SEAT_GUEST).with_payload(json!(user)));
                    guest = Some(user);
                    // Always answer a join with the current table.
                    states.mark_changed();
                }
                Some(Ok(ClientEnvelope::Join { user: None, .. })) => {
                    tracing::warn!("anonymous join ignored");
                }
                Some(Ok(ClientEnvelope::Action { action })) => {
                    tracing::info!(action = %action.kind, "guest intent");
                    host.dispatch(action);
                }
                Some(Err(err)) => tracing::warn!("bad envelope: {err}"),
                None => {
                    tracing::info!("guest left");
                    return Ok(());
                }
            },
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = Arc::clone(&states.borrow_and_update());
                if let Some(user) = &guest {
                    let mut view = RoomState::clone(&state);
                    view.user_id = user.id.clone();
                    view.user_name = user.name.clone();
                    server.push_snapshot(view)?;
                }
                if state.phase == Phase::Playing && state.current_turn.as_deref() == Some(HOST) {
                    host.play_card("hana-card", None).await?;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Host ────────────────────────────────────────────────────────
    let host = LocalClient::new(Arc::new(GoAround::new(10)), SyncConfig::new());
    host.connect(
        &ConnectOptions::new()
            .with_engine_id(ENGINE_ID)
            .with_user(CurrentUser::new(HOST, "Hana")),
    )?;
    host.add_bot(Some("Ada")).await?;
    host.add_bot(Some("Bo")).await?;

    let (transport, server) = loopback_pair();
    let host_task = tokio::spawn(host_loop(host.clone(), server));

    // ── Guest ───────────────────────────────────────────────────────
    let slot = Mutex::new(Some(transport));
    let config = SyncConfig::new()
        .with_automation(false)
        .with_transport_factory(move |_req| {
            slot.try_lock()
                .ok()
                .and_then(|mut t| t.take())
                .map(|t| Box::new(t) as Box<dyn TransportAdapter>)
                .ok_or_else(|| {
                    card_room_sync::SyncError::TransportUnavailable("loopback already used".into())
                })
        });
    let guest = RemoteClient::new(Arc::new(GoAround::new(10)), config);
    let ann = CurrentUser::guest("Ann");
    let ann_id = ann.id.clone().unwrap_or_default();

    let (tx, mut states) = watch::channel(guest.state());
    let _sub = guest.subscribe(move |state| {
        let _ = tx.send(Arc::clone(state));
    });
    guest
        .connect(
            ConnectOptions::new()
                .with_engine_id(ENGINE_ID)
                .with_room_id("demo")
                .with_user(ann),
        )
        .await?;

    // ── Play ────────────────────────────────────────────────────────
    let mut readied = false;
    let mut started = false;
    loop {
        states.changed().await?;
        let state = Arc::clone(&states.borrow_and_update());
        match state.phase {
            Phase::RoomLobby => {
                let seated = state.player(&ann_id).is_some();
                if seated && !readied {
                    guest.toggle_ready().await?;
                    readied = true;
                }
                // The host readies last; its bots follow automatically.
                if readied && !started && state.player(&ann_id).is_some_and(|p| p.is_ready) {
                    host.toggle_ready().await?;
                    host.start_game().await?;
                    started = true;
                }
            }
            Phase::Playing if state.current_turn.as_deref() == Some(ann_id.as_str()) => {
                tracing::info!(plays = ?state.extra.get("plays"), "Ann plays a card");
                guest.play_card("ann-card", None).await?;
            }
            Phase::Playing => {}
            Phase::Finished => {
                tracing::info!("round over");
                break;
            }
        }
    }

    guest.disconnect().await;
    host_task.await??;
    host.disconnect();
    Ok(())
}
