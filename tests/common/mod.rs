#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for card-room-sync integration tests.
//!
//! Provides a small turn-based [`TestEngine`], a scriptable
//! [`MockTransport`], and helpers for waiting on asynchronous callbacks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use card_room_sync::action::types;
use card_room_sync::transport::{
    DisconnectedCallback, ErrorCallback, EventCallback, SnapshotCallback,
};
use card_room_sync::{
    Action, CallbackRegistry, ConnectOptions, CurrentUser, Phase, PlayerRecord, RoomSettings,
    RoomState, RulesEngine, SyncError, TransportAdapter, Unregister,
};

pub const ENGINE_ID: &str = "test-cards";
pub const BOT_THINK_MS: u64 = 500;

// ── TestEngine ──────────────────────────────────────────────────────

/// Lobby of four seats; every play passes the turn to the next seat and
/// bumps the `plays` counter.
pub struct TestEngine;

impl RulesEngine for TestEngine {
    fn id(&self) -> &str {
        ENGINE_ID
    }

    fn create_initial_state(&self, user: Option<&CurrentUser>) -> RoomState {
        let mut state = RoomState {
            user_id: user.and_then(|u| u.id.clone()),
            user_name: user.and_then(|u| u.name.clone()),
            room_settings: RoomSettings::with_max_players(4),
            ..RoomState::default()
        };
        if let Some(id) = state.user_id.clone() {
            let mut host = PlayerRecord::human(
                id.clone(),
                state.user_name.clone().unwrap_or_else(|| "Player".into()),
            );
            host.is_host = true;
            state.players.push(host);
            state.host_id = Some(id);
        }
        state
    }

    fn reduce(&self, state: &Arc<RoomState>, action: &Action) -> Arc<RoomState> {
        match action.kind.as_str() {
            types::TOGGLE_READY => {
                let Some(id) = action.payload_str("playerId") else {
                    return Arc::clone(state);
                };
                let mut next = RoomState::clone(state);
                match next.players.iter_mut().find(|p| p.id == id) {
                    Some(player) => {
                        let ready = !player.is_ready;
                        player.set_ready(ready);
                    }
                    None => return Arc::clone(state),
                }
                Arc::new(next)
            }
            types::ADD_BOT => {
                if !state.has_free_seat() {
                    return Arc::clone(state);
                }
                let mut next = RoomState::clone(state);
                let n = next.players.iter().filter(|p| p.is_bot).count() + 1;
                let name = action
                    .payload_str("name")
                    .map_or_else(|| format!("Bot {n}"), str::to_owned);
                next.players.push(PlayerRecord::bot(format!("bot-{n}"), name));
                Arc::new(next)
            }
            types::START_GAME => {
                if state.phase != Phase::RoomLobby || state.players.is_empty() {
                    return Arc::clone(state);
                }
                let mut next = RoomState::clone(state);
                next.phase = Phase::Playing;
                next.current_turn = next.players.first().map(|p| p.id.clone());
                Arc::new(next)
            }
            types::PLAY_CARD => {
                let (Some(player), Some(turn)) =
                    (action.payload_str("playerId"), state.current_turn.as_deref())
                else {
                    return Arc::clone(state);
                };
                if state.phase != Phase::Playing || player != turn {
                    return Arc::clone(state);
                }
                let mut next = RoomState::clone(state);
                let seat = next.players.iter().position(|p| p.id == player).unwrap_or(0);
                let following = (seat + 1) % next.players.len();
                next.current_turn = next.players.get(following).map(|p| p.id.clone());
                let plays = next.extra.get("plays").and_then(|v| v.as_u64()).unwrap_or(0);
                next.extra.insert("plays".into(), (plays + 1).into());
                Arc::new(next)
            }
            types::RETURN_TO_LOBBY => {
                if state.phase == Phase::RoomLobby {
                    return Arc::clone(state);
                }
                let mut next = RoomState::clone(state);
                next.phase = Phase::RoomLobby;
                next.current_turn = None;
                Arc::new(next)
            }
            _ => Arc::clone(state),
        }
    }

    fn bot_action(&self, _state: &RoomState, player: &PlayerRecord) -> Option<Action> {
        Some(Action::play_card(Some(&player.id), "bot-card", None))
    }

    fn bot_think_delay_ms(&self) -> f64 {
        BOT_THINK_MS as f64
    }
}

pub fn engine() -> Arc<dyn RulesEngine> {
    Arc::new(TestEngine)
}

pub fn ann() -> CurrentUser {
    CurrentUser::new("u-ann", "Ann")
}

/// Number of `PLAY_CARD` actions the engine accepted.
pub fn plays(state: &RoomState) -> u64 {
    state.extra.get("plays").and_then(|v| v.as_u64()).unwrap_or(0)
}

pub fn bot_delay() -> Duration {
    Duration::from_millis(BOT_THINK_MS)
}

// ── MockTransport ───────────────────────────────────────────────────

/// Observations shared between a [`MockTransport`] and the test body.
#[derive(Default)]
pub struct MockProbe {
    pub registry: CallbackRegistry,
    pub sent: StdMutex<Vec<Action>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub cleanups: AtomicUsize,
}

impl MockProbe {
    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.kind.clone())
            .collect()
    }
}

/// A scriptable transport. Pushes go through `probe.registry`.
pub struct MockTransport {
    pub probe: Arc<MockProbe>,
    pub fail_connect: Option<SyncError>,
    pub fail_disconnect: Option<SyncError>,
    /// Every unregister handle this transport returns reports a failure.
    pub failing_cleanup: bool,
    connected: bool,
}

impl MockTransport {
    pub fn new() -> (Self, Arc<MockProbe>) {
        let probe = Arc::new(MockProbe::default());
        let transport = Self {
            probe: Arc::clone(&probe),
            fail_connect: None,
            fail_disconnect: None,
            failing_cleanup: false,
            connected: false,
        };
        (transport, probe)
    }

    fn track(&self, handle: Unregister) -> Option<Unregister> {
        let probe = Arc::clone(&self.probe);
        let failing = self.failing_cleanup;
        Some(Unregister::new(move || {
            probe.cleanups.fetch_add(1, Ordering::SeqCst);
            handle.run()?;
            if failing {
                Err(SyncError::ListenerCleanup("scripted failure".into()))
            } else {
                Ok(())
            }
        }))
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    async fn connect(&mut self, _options: &ConnectOptions) -> Result<(), SyncError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_connect.take() {
            return Err(err);
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SyncError> {
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        match self.fail_disconnect.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn send_action(&mut self, action: Action) -> Result<(), SyncError> {
        if !self.connected {
            return Err(SyncError::NotConnected);
        }
        self.probe.sent.lock().unwrap().push(action);
        Ok(())
    }

    fn on_snapshot(&mut self, callback: SnapshotCallback) -> Option<Unregister> {
        let handle = self.probe.registry.on_snapshot(callback);
        self.track(handle)
    }

    fn on_event(&mut self, callback: EventCallback) -> Option<Unregister> {
        let handle = self.probe.registry.on_event(callback);
        self.track(handle)
    }

    fn on_disconnected(&mut self, callback: DisconnectedCallback) -> Option<Unregister> {
        let handle = self.probe.registry.on_disconnected(callback);
        self.track(handle)
    }

    fn on_error(&mut self, callback: ErrorCallback) -> Option<Unregister> {
        let handle = self.probe.registry.on_error(callback);
        self.track(handle)
    }
}

/// Hands out a prepared transport once; later calls fail.
pub fn single_use_factory<T: TransportAdapter>(
    transport: T,
) -> impl Fn(card_room_sync::TransportRequest) -> card_room_sync::Result<Box<dyn TransportAdapter>>
       + Send
       + Sync
       + 'static {
    let slot = StdMutex::new(Some(transport));
    move |_req| {
        slot.lock()
            .unwrap()
            .take()
            .map(|t| Box::new(t) as Box<dyn TransportAdapter>)
            .ok_or_else(|| SyncError::TransportUnavailable("transport already handed out".into()))
    }
}

/// Yield to spawned tasks until `check` holds.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
