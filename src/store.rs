//! The room state container.
//!
//! [`RoomStore`] owns the live [`RoomState`] and [`StatusState`] and is the
//! single path through which either changes. It is a cheap clonable handle;
//! all clones share one container.
//!
//! # Dispatch
//!
//! [`dispatch`](RoomStore::dispatch) runs the reducer under the container's
//! lock and commits the result only if the reducer returned a different
//! `Arc`. Listeners are called after the lock is released, in registration
//! order, each with the state produced by exactly one completed dispatch.
//! Automation then runs against the new state.
//!
//! # Bot turns
//!
//! When a bot owns the turn, automation arms a single-slot timer on the
//! ambient tokio runtime. Any later automation pass, [`load_room`](RoomStore::load_room),
//! [`disconnect`](RoomStore::disconnect) or [`replace_engine`](RoomStore::replace_engine)
//! cancels it. When it fires it re-resolves the bot turn against the state at
//! that moment before asking the engine for a move.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::action::Action;
use crate::automation::{
    bot_think_delay, resolve_bot_turn_player, select_bot_action, should_auto_ready_bots,
};
use crate::config::SyncConfig;
use crate::engine::{self, RulesEngine};
use crate::error::SyncError;
use crate::hydrate::{hydrate, HydrateContext};
use crate::snapshot::{clone_state, freeze_snapshot, RoomSnapshot};
use crate::state::{CurrentUser, RoomState};
use crate::status::{ConnectionStatus, StatusState};
use crate::timer::BotTimer;

type StateListener = Arc<dyn Fn(&Arc<RoomState>) + Send + Sync>;
type StatusListener = Arc<dyn Fn(&StatusState) + Send + Sync>;

// ── Shared state ────────────────────────────────────────────────────

struct Inner {
    engine: Arc<dyn RulesEngine>,
    state: Arc<RoomState>,
    status: StatusState,
    snapshot: Option<RoomSnapshot>,
    state_listeners: Vec<(u64, StateListener)>,
    status_listeners: Vec<(u64, StatusListener)>,
    next_listener_id: u64,
    bot_timer: BotTimer,
}

impl Inner {
    fn next_listener_id(&mut self) -> u64 {
        self.next_listener_id += 1;
        self.next_listener_id
    }

    /// Swap in `next`, drop the cached snapshot, and hand back the listeners
    /// to notify once the lock is released.
    fn commit(&mut self, next: Arc<RoomState>) -> Vec<StateListener> {
        self.state = next;
        self.snapshot = None;
        self.state_listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }
}

struct Shared {
    automation: bool,
    inner: Mutex<Inner>,
}

// ── Subscription ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    State,
    Status,
}

/// Handle returned by [`RoomStore::subscribe`] and
/// [`RoomStore::subscribe_status`].
///
/// Dropping the handle leaves the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
    kind: ListenerKind,
}

impl Subscription {
    /// Remove the listener. Deliveries already in flight still complete.
    pub fn unsubscribe(self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match self.kind {
            ListenerKind::State => inner.state_listeners.retain(|(id, _)| *id != self.id),
            ListenerKind::Status => inner.status_listeners.retain(|(id, _)| *id != self.id),
        }
    }
}

// ── RoomStore ───────────────────────────────────────────────────────

/// Observable container for one room's state and connection status.
#[derive(Clone)]
pub struct RoomStore {
    shared: Arc<Shared>,
}

impl RoomStore {
    /// A store seeded from `engine.create_initial_state(None)`, status `idle`.
    pub fn new(engine: Arc<dyn RulesEngine>, config: &SyncConfig) -> Self {
        let state = Arc::new(clone_state(&engine.create_initial_state(None)));
        debug!(engine = engine.id(), "room store created");
        Self {
            shared: Arc::new(Shared {
                automation: config.automation,
                inner: Mutex::new(Inner {
                    engine,
                    state,
                    status: StatusState::default(),
                    snapshot: None,
                    state_listeners: Vec::new(),
                    status_listeners: Vec::new(),
                    next_listener_id: 0,
                    bot_timer: BotTimer::default(),
                }),
            }),
        }
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// The current state. Read-only: changes go through [`dispatch`](Self::dispatch).
    pub fn state(&self) -> Arc<RoomState> {
        Arc::clone(&self.lock().state)
    }

    pub fn status(&self) -> StatusState {
        self.lock().status.clone()
    }

    /// The engine the store is bound to.
    pub fn engine(&self) -> Arc<dyn RulesEngine> {
        Arc::clone(&self.lock().engine)
    }

    /// Returns `true` while a bot turn is scheduled.
    pub fn has_pending_bot_turn(&self) -> bool {
        self.lock().bot_timer.is_armed()
    }

    /// Number of registered state and status listeners.
    pub fn listener_count(&self) -> usize {
        let inner = self.lock();
        inner.state_listeners.len() + inner.status_listeners.len()
    }

    /// A read-only deep copy of the current state.
    ///
    /// The copy is cached: repeated calls return the same allocation
    /// ([`RoomSnapshot::ptr_eq`]) until the next committed change.
    pub fn export_room_snapshot(&self) -> RoomSnapshot {
        let mut inner = self.lock();
        if let Some(snapshot) = &inner.snapshot {
            return snapshot.clone();
        }
        let snapshot = freeze_snapshot(clone_state(&inner.state));
        inner.snapshot = Some(snapshot.clone());
        snapshot
    }

    // ── Listeners ───────────────────────────────────────────────────

    /// Register a state listener. It is called once immediately with the
    /// current state, then after every committed change.
    ///
    /// The first delivery runs outside the lock, so a dispatch committed on
    /// another thread in between can reach the listener ahead of it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<RoomState>) + Send + Sync + 'static,
    {
        let listener: StateListener = Arc::new(listener);
        let (id, current) = {
            let mut inner = self.lock();
            let id = inner.next_listener_id();
            inner.state_listeners.push((id, Arc::clone(&listener)));
            (id, Arc::clone(&inner.state))
        };
        listener(&current);
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
            kind: ListenerKind::State,
        }
    }

    /// Register a status listener. It is called once immediately with the
    /// current status, then after every status change.
    pub fn subscribe_status<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StatusState) + Send + Sync + 'static,
    {
        let listener: StatusListener = Arc::new(listener);
        let (id, current) = {
            let mut inner = self.lock();
            let id = inner.next_listener_id();
            inner.status_listeners.push((id, Arc::clone(&listener)));
            (id, inner.status.clone())
        };
        listener(&current);
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
            kind: ListenerKind::Status,
        }
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Run `action` through the reducer and commit the result if it changed.
    pub fn dispatch(&self, action: Action) {
        let (next, listeners) = {
            let mut inner = self.lock();
            let next = engine::reduce(inner.engine.as_ref(), &inner.state, &action);
            if Arc::ptr_eq(&next, &inner.state) {
                debug!(action = %action.kind, "reducer made no change");
                return;
            }
            let listeners = inner.commit(Arc::clone(&next));
            (next, listeners)
        };
        debug!(action = %action.kind, phase = next.phase.as_str(), "state committed");
        notify(&listeners, &next);
        self.run_automation();
    }

    /// Replace the status. No-op if neither status nor error changed.
    pub fn set_status(&self, status: ConnectionStatus, error: Option<SyncError>) {
        let (current, listeners) = {
            let mut inner = self.lock();
            if inner.status.status == status && inner.status.error == error {
                return;
            }
            inner.status = StatusState::new(status, error);
            let listeners: Vec<StatusListener> = inner
                .status_listeners
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect();
            (inner.status.clone(), listeners)
        };
        debug!(status = ?current.status, error = ?current.error, "status changed");
        for listener in &listeners {
            listener(&current);
        }
    }

    /// Adopt an existing room, reconciled with `current_user`, and mark the
    /// store connected.
    pub fn load_room(&self, snapshot: &RoomState, current_user: Option<&CurrentUser>) {
        let (next, listeners) = {
            let mut inner = self.lock();
            inner.bot_timer.cancel();
            let ctx = HydrateContext::new(Some(inner.state.as_ref()), current_user);
            let next = Arc::new(hydrate(snapshot, &ctx));
            let listeners = inner.commit(Arc::clone(&next));
            (next, listeners)
        };
        debug!(room = ?next.room_id, "room loaded");
        notify(&listeners, &next);
        self.run_automation();
        self.set_status(ConnectionStatus::Connected, None);
    }

    /// Replace the state wholesale, bypassing the reducer.
    pub fn adopt_snapshot(&self, state: RoomState) {
        let next = Arc::new(state);
        let listeners = self.lock().commit(Arc::clone(&next));
        debug!(phase = next.phase.as_str(), "adopted pushed snapshot");
        notify(&listeners, &next);
        self.run_automation();
    }

    /// Rebuild the room from the engine, bound to `identity`.
    pub fn reinitialize(&self, identity: Option<&CurrentUser>) {
        let (next, listeners) = {
            let mut inner = self.lock();
            inner.bot_timer.cancel();
            let next = Arc::new(clone_state(&inner.engine.create_initial_state(identity)));
            let listeners = inner.commit(Arc::clone(&next));
            (next, listeners)
        };
        notify(&listeners, &next);
        self.run_automation();
    }

    /// Bind a different engine and rebuild the room for the same identity.
    pub fn replace_engine(&self, engine: Arc<dyn RulesEngine>) {
        let identity = {
            let mut inner = self.lock();
            inner.bot_timer.cancel();
            debug!(from = inner.engine.id(), to = engine.id(), "replacing engine");
            inner.engine = engine;
            inner.state.identity()
        };
        self.reinitialize(Some(&identity));
    }

    /// Fresh lobby for the same identity; status back to `idle`.
    pub fn reset_session(&self) {
        self.dispatch(Action::reset_session());
        self.set_status(ConnectionStatus::Idle, None);
    }

    /// Cancel the bot timer, mark the store disconnected, and drop every
    /// listener.
    pub fn disconnect(&self) {
        self.lock().bot_timer.cancel();
        self.set_status(ConnectionStatus::Disconnected, None);
        let mut inner = self.lock();
        inner.state_listeners.clear();
        inner.status_listeners.clear();
        debug!("room store disconnected");
    }

    // ── Automation ──────────────────────────────────────────────────

    /// Auto-ready bots if the humans are ready, then (re)schedule the bot
    /// turn for the current state.
    pub fn run_automation(&self) {
        if !self.shared.automation {
            return;
        }
        if should_auto_ready_bots(&self.state()) {
            debug!("all humans ready, readying bots");
            self.dispatch(Action::auto_ready_bots());
        }
        self.schedule_bot_turn();
    }

    fn schedule_bot_turn(&self) {
        let mut inner = self.lock();
        inner.bot_timer.cancel();

        let Some(bot) = resolve_bot_turn_player(&inner.state) else {
            return;
        };
        let bot_id = bot.id.clone();
        let delay = bot_think_delay(inner.engine.as_ref());

        let Ok(runtime) = Handle::try_current() else {
            warn!(bot = %bot_id, "no tokio runtime available, bot turn not scheduled");
            return;
        };

        let generation = inner.bot_timer.next_generation();
        let weak = Arc::downgrade(&self.shared);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                RoomStore { shared }.fire_bot_turn(generation);
            }
        });
        inner.bot_timer.arm(generation, task);
        debug!(bot = %bot_id, ?delay, "bot turn scheduled");
    }

    fn fire_bot_turn(&self, generation: u64) {
        let action = {
            let mut inner = self.lock();
            if !inner.bot_timer.settle(generation) {
                debug!(generation, "superseded bot turn skipped");
                return;
            }
            let Some(bot) = resolve_bot_turn_player(&inner.state) else {
                debug!("turn no longer belongs to a bot");
                return;
            };
            let action = select_bot_action(inner.engine.as_ref(), &inner.state, bot);
            if action.is_none() {
                debug!(bot = %bot.id, "engine has no move for bot");
            }
            action
        };
        if let Some(action) = action {
            self.dispatch(action);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RoomStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("RoomStore")
            .field("engine", &inner.engine.id())
            .field("status", &inner.status.status)
            .field("phase", &inner.state.phase)
            .field("listeners", &(inner.state_listeners.len() + inner.status_listeners.len()))
            .field("bot_turn_pending", &inner.bot_timer.is_armed())
            .finish()
    }
}

fn notify(listeners: &[StateListener], state: &Arc<RoomState>) {
    for listener in listeners {
        listener(state);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::state::{Phase, PlayerRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts reducer calls and only reacts to `BUMP`.
    struct Counter;

    impl RulesEngine for Counter {
        fn id(&self) -> &str {
            "counter"
        }

        fn create_initial_state(&self, identity: Option<&CurrentUser>) -> RoomState {
            RoomState {
                user_id: identity.and_then(|u| u.id.clone()),
                user_name: identity.and_then(|u| u.name.clone()),
                ..RoomState::default()
            }
        }

        fn reduce(&self, state: &Arc<RoomState>, action: &Action) -> Arc<RoomState> {
            if action.kind != "BUMP" {
                return Arc::clone(state);
            }
            let mut next = RoomState::clone(state);
            let count = next.extra.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
            next.extra.insert("count".into(), (count + 1).into());
            Arc::new(next)
        }
    }

    fn store() -> RoomStore {
        RoomStore::new(Arc::new(Counter), &SyncConfig::new())
    }

    #[test]
    fn subscribe_delivers_current_state_immediately() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let _sub = store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.dispatch(Action::new("BUMP"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_op_reducer_result_is_not_committed() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let _sub = store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let before = store.export_room_snapshot();
        let state_before = store.state();

        store.dispatch(Action::new("IGNORED"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.export_room_snapshot().ptr_eq(&before));
        assert!(Arc::ptr_eq(&store.state(), &state_before));
    }

    #[test]
    fn snapshot_is_cached_until_next_change() {
        let store = store();
        let first = store.export_room_snapshot();
        let second = store.export_room_snapshot();
        assert!(first.ptr_eq(&second));

        store.dispatch(Action::new("BUMP"));
        let third = store.export_room_snapshot();
        assert!(!third.ptr_eq(&first));
        assert_eq!(third.extra.get("count"), Some(&serde_json::Value::from(1)));
        assert_eq!(first.extra.get("count"), None);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let sub = store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        store.dispatch(Action::new("BUMP"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn unsubscribing_during_notification_keeps_in_flight_delivery() {
        let store = store();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let victim = Arc::clone(&slot);
        let _first = store.subscribe(move |state| {
            if state.extra.contains_key("count") {
                if let Some(sub) = victim.lock().unwrap().take() {
                    sub.unsubscribe();
                }
            }
        });
        let seen = Arc::clone(&second_calls);
        let second = store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        *slot.lock().unwrap() = Some(second);

        store.dispatch(Action::new("BUMP"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 2);

        store.dispatch(Action::new("BUMP"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_status_skips_identical_updates() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe_status(move |s| sink.lock().unwrap().push(s.status));

        store.set_status(ConnectionStatus::Connecting, None);
        store.set_status(ConnectionStatus::Connecting, None);
        store.set_status(ConnectionStatus::Error, Some(SyncError::Timeout));
        store.set_status(ConnectionStatus::Error, Some(SyncError::Timeout));
        store.set_status(ConnectionStatus::Error, Some(SyncError::NotConnected));

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[
                ConnectionStatus::Idle,
                ConnectionStatus::Connecting,
                ConnectionStatus::Error,
                ConnectionStatus::Error,
            ]
        );
        assert_eq!(store.status().error, Some(SyncError::NotConnected));
    }

    #[test]
    fn load_room_hydrates_and_connects() {
        let store = store();
        let room = RoomState {
            room_id: Some("r1".into()),
            players: vec![PlayerRecord::human("a", "A")],
            ..RoomState::default()
        };
        store.load_room(&room, Some(&CurrentUser::new("me", "Me")));

        let state = store.state();
        assert_eq!(state.room_id.as_deref(), Some("r1"));
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.user_id.as_deref(), Some("me"));
        assert_eq!(store.status().status, ConnectionStatus::Connected);
    }

    #[test]
    fn reset_session_returns_to_idle_lobby() {
        let store = store();
        store.load_room(
            &RoomState {
                phase: Phase::Finished,
                ..RoomState::default()
            },
            Some(&CurrentUser::new("me", "Me")),
        );
        store.reset_session();

        let state = store.state();
        assert_eq!(state.phase, Phase::RoomLobby);
        assert_eq!(state.user_id.as_deref(), Some("me"));
        assert_eq!(store.status().status, ConnectionStatus::Idle);
    }

    #[test]
    fn disconnect_clears_listeners() {
        let store = store();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&statuses);
        let _a = store.subscribe(|_| {});
        let _b = store.subscribe_status(move |s| sink.lock().unwrap().push(s.status));

        store.disconnect();
        assert_eq!(store.listener_count(), 0);
        assert_eq!(store.status().status, ConnectionStatus::Disconnected);
        assert_eq!(
            statuses.lock().unwrap().last(),
            Some(&ConnectionStatus::Disconnected)
        );
    }

    #[test]
    fn bot_turn_without_runtime_is_not_scheduled() {
        let store = store();
        store.adopt_snapshot(RoomState {
            phase: Phase::Playing,
            current_turn: Some("b".into()),
            players: vec![PlayerRecord::bot("b", "Bot")],
            ..RoomState::default()
        });
        assert!(!store.has_pending_bot_turn());
    }
}
