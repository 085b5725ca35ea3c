//! Local and remote room clients.
//!
//! Both variants wrap a [`RoomStore`] and share the intent surface in
//! [`RoomIntents`]. They differ in where an intent goes:
//!
//! - [`LocalClient`] runs every intent through the bound rules engine.
//! - [`RemoteClient`] sends every intent through a [`TransportAdapter`] and
//!   applies whatever the authoritative side pushes back.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = LocalClient::new(Arc::new(CrazyEights::default()), SyncConfig::new());
//! client.connect(&ConnectOptions::new().with_user(CurrentUser::new("u1", "Ann")))?;
//!
//! let _sub = client.store().subscribe(|state| println!("phase: {}", state.phase.as_str()));
//! client.add_bot(None).await?;
//! client.toggle_ready().await?;
//! client.start_game().await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::action::Action;
use crate::config::{ConnectOptions, SyncConfig};
use crate::engine::RulesEngine;
use crate::error::{Result, SyncError};
use crate::snapshot::RoomSnapshot;
use crate::state::{CurrentUser, PlayerStatus, RoomSettings, RoomState};
use crate::status::{ConnectionStatus, StatusState};
use crate::store::{RoomStore, Subscription};
use crate::transport::{unregister_all, TransportAdapter, TransportRequest, Unregister};

// ── Intents ─────────────────────────────────────────────────────────

/// Convenience methods that turn caller intent into [`Action`]s.
///
/// Implementors supply [`store`](Self::store) and [`submit`](Self::submit);
/// every other method builds an action and submits it. Intents that act on
/// behalf of a player use the store's current `user_id`.
#[async_trait]
pub trait RoomIntents: Send + Sync {
    /// The container backing this client.
    fn store(&self) -> &RoomStore;

    /// Route `action` to wherever this client applies actions.
    ///
    /// # Errors
    ///
    /// Local submission never fails. Remote submission fails with
    /// [`SyncError::NotConnected`] when no transport is established, or with
    /// whatever the transport reports.
    async fn submit(&self, action: Action) -> Result<()>;

    /// The player intents act for.
    fn acting_player(&self) -> Option<String> {
        self.store().state().user_id.clone()
    }

    async fn create_room(&self, room_name: &str, settings: RoomSettings) -> Result<()> {
        self.submit(Action::create_room(room_name, &settings)).await
    }

    async fn toggle_ready(&self) -> Result<()> {
        let player = self.acting_player();
        self.submit(Action::toggle_ready(player.as_deref())).await
    }

    async fn set_player_status(&self, status: PlayerStatus) -> Result<()> {
        let player = self.acting_player();
        self.submit(Action::set_player_status(player.as_deref(), status))
            .await
    }

    async fn update_seat_layout(&self, seat_order: Vec<String>) -> Result<()> {
        self.submit(Action::update_seat_layout(&seat_order)).await
    }

    async fn add_bot(&self, name: Option<&str>) -> Result<()> {
        self.submit(Action::add_bot(name)).await
    }

    async fn remove_bot(&self, bot_id: &str) -> Result<()> {
        self.submit(Action::remove_bot(bot_id)).await
    }

    async fn start_game(&self) -> Result<()> {
        self.submit(Action::start_game()).await
    }

    async fn play_card(&self, card_id: &str, chosen_suit: Option<&str>) -> Result<()> {
        let player = self.acting_player();
        self.submit(Action::play_card(player.as_deref(), card_id, chosen_suit))
            .await
    }

    async fn draw_card(&self) -> Result<()> {
        let player = self.acting_player();
        self.submit(Action::draw_card(player.as_deref())).await
    }

    async fn return_to_lobby(&self) -> Result<()> {
        self.submit(Action::return_to_lobby()).await
    }

    async fn set_display_name(&self, name: &str) -> Result<()> {
        let player = self.acting_player();
        self.submit(Action::set_display_name(player.as_deref(), name))
            .await
    }
}

fn check_engine(store: &RoomStore, options: &ConnectOptions) -> Result<()> {
    let engine = store.engine();
    match options.engine_id.as_deref() {
        Some(requested) if requested != engine.id() => Err(SyncError::EngineMismatch {
            bound: engine.id().to_owned(),
            requested: requested.to_owned(),
        }),
        _ => Ok(()),
    }
}

// ── LocalClient ─────────────────────────────────────────────────────

/// A client whose rules engine is the authority.
#[derive(Debug, Clone)]
pub struct LocalClient {
    store: RoomStore,
}

impl LocalClient {
    pub fn new(engine: Arc<dyn RulesEngine>, config: SyncConfig) -> Self {
        Self {
            store: RoomStore::new(engine, &config),
        }
    }

    /// Start a fresh room bound to `options.user`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EngineMismatch`] if `options.engine_id` names a
    /// different engine. The status is then `error` with the same error.
    pub fn connect(&self, options: &ConnectOptions) -> Result<()> {
        self.store.set_status(ConnectionStatus::Connecting, None);
        if let Err(err) = check_engine(&self.store, options) {
            error!("local connect failed: {err}");
            self.store
                .set_status(ConnectionStatus::Error, Some(err.clone()));
            return Err(err);
        }
        self.store.reinitialize(options.user.as_ref());
        self.store.set_status(ConnectionStatus::Connected, None);
        debug!(engine = self.store.engine().id(), "local client connected");
        Ok(())
    }

    /// Tear down. The client is terminal afterwards; listeners are gone.
    pub fn disconnect(&self) {
        self.store.disconnect();
    }

    pub fn state(&self) -> Arc<RoomState> {
        self.store.state()
    }

    pub fn status(&self) -> StatusState {
        self.store.status()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<RoomState>) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn subscribe_status<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StatusState) + Send + Sync + 'static,
    {
        self.store.subscribe_status(listener)
    }

    pub fn dispatch(&self, action: Action) {
        self.store.dispatch(action);
    }

    pub fn load_room(&self, snapshot: &RoomState, current_user: Option<&CurrentUser>) {
        self.store.load_room(snapshot, current_user);
    }

    pub fn export_room_snapshot(&self) -> RoomSnapshot {
        self.store.export_room_snapshot()
    }

    pub fn reset_session(&self) {
        self.store.reset_session();
    }
}

#[async_trait]
impl RoomIntents for LocalClient {
    fn store(&self) -> &RoomStore {
        &self.store
    }

    async fn submit(&self, action: Action) -> Result<()> {
        self.store.dispatch(action);
        Ok(())
    }
}

// ── RemoteClient ────────────────────────────────────────────────────

/// An established transport. Sends lock only the adapter, never the link.
type SharedAdapter = Arc<Mutex<Box<dyn TransportAdapter>>>;

#[derive(Default)]
struct TransportLink {
    adapter: Option<SharedAdapter>,
    cleanup: Vec<Unregister>,
}

/// A client that mirrors an authoritative room host through a transport.
///
/// The transport comes from [`SyncConfig::transport_factory`] on every
/// [`connect`](Self::connect). Pushed snapshots replace local state, pushed
/// events run through the local reducer, and transport faults become status
/// transitions.
pub struct RemoteClient {
    store: RoomStore,
    config: SyncConfig,
    link: Arc<Mutex<TransportLink>>,
}

impl RemoteClient {
    pub fn new(engine: Arc<dyn RulesEngine>, config: SyncConfig) -> Self {
        Self {
            store: RoomStore::new(engine, &config),
            config,
            link: Arc::new(Mutex::new(TransportLink::default())),
        }
    }

    /// Tear down any previous transport, build a new one and complete its
    /// handshake.
    ///
    /// # Errors
    ///
    /// Any failure along the way is returned and also stored in the status,
    /// which becomes `error`:
    ///
    /// - [`SyncError::EngineMismatch`] for a mismatched `options.engine_id`.
    /// - [`SyncError::MissingTransportFactory`] when the config has none.
    /// - Whatever the factory or the transport handshake reports.
    pub async fn connect(&self, options: ConnectOptions) -> Result<()> {
        self.store.set_status(ConnectionStatus::Connecting, None);
        let mut link = self.link.lock().await;
        match self.try_connect(&mut link, &options).await {
            Ok(()) => {
                self.store.set_status(ConnectionStatus::Connected, None);
                debug!(room = ?options.room_id, "remote client connected");
                Ok(())
            }
            Err(err) => {
                error!("remote connect failed: {err}");
                self.store
                    .set_status(ConnectionStatus::Error, Some(err.clone()));
                Err(err)
            }
        }
    }

    async fn try_connect(&self, link: &mut TransportLink, options: &ConnectOptions) -> Result<()> {
        self.teardown(link).await;
        check_engine(&self.store, options)?;

        // Placeholder until the first pushed snapshot arrives.
        self.store.reinitialize(options.user.as_ref());

        let factory = self
            .config
            .transport_factory
            .as_ref()
            .ok_or(SyncError::MissingTransportFactory)?;
        let mut adapter = factory(TransportRequest {
            engine: self.store.engine(),
            options: options.clone(),
        })?;

        link.cleanup = wire_callbacks(adapter.as_mut(), &self.store);
        if let Err(err) = adapter.connect(options).await {
            unregister_all(std::mem::take(&mut link.cleanup));
            return Err(err);
        }
        link.adapter = Some(Arc::new(Mutex::new(adapter)));
        Ok(())
    }

    /// Best-effort transport disconnect, then unconditional listener cleanup
    /// and container teardown.
    ///
    /// Waiting on the transport, including on a send still in flight, is
    /// bounded by [`SyncConfig::shutdown_timeout`].
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        self.teardown(&mut link).await;
        self.store.disconnect();
    }

    /// Send a locally originated action to the authoritative side.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if no transport is established.
    pub async fn send_action(&self, action: Action) -> Result<()> {
        let adapter = self
            .link
            .lock()
            .await
            .adapter
            .clone()
            .ok_or(SyncError::NotConnected)?;
        debug!(action = %action.kind, "sending action");
        let mut adapter = adapter.lock().await;
        adapter.send_action(action).await
    }

    /// Returns `true` while a transport is established.
    pub async fn has_transport(&self) -> bool {
        self.link.lock().await.adapter.is_some()
    }

    pub fn state(&self) -> Arc<RoomState> {
        self.store.state()
    }

    pub fn status(&self) -> StatusState {
        self.store.status()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<RoomState>) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn subscribe_status<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StatusState) + Send + Sync + 'static,
    {
        self.store.subscribe_status(listener)
    }

    pub fn load_room(&self, snapshot: &RoomState, current_user: Option<&CurrentUser>) {
        self.store.load_room(snapshot, current_user);
    }

    pub fn export_room_snapshot(&self) -> RoomSnapshot {
        self.store.export_room_snapshot()
    }

    pub fn reset_session(&self) {
        self.store.reset_session();
    }

    async fn teardown(&self, link: &mut TransportLink) {
        if let Some(adapter) = link.adapter.take() {
            let shutdown = async move {
                let mut adapter = adapter.lock().await;
                adapter.disconnect().await
            };
            match tokio::time::timeout(self.config.shutdown_timeout, shutdown).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("transport disconnect failed: {err}"),
                Err(_) => warn!("transport disconnect did not finish within timeout"),
            }
        }
        if !link.cleanup.is_empty() {
            unregister_all(std::mem::take(&mut link.cleanup));
        }
    }
}

#[async_trait]
impl RoomIntents for RemoteClient {
    fn store(&self) -> &RoomStore {
        &self.store
    }

    async fn submit(&self, action: Action) -> Result<()> {
        self.send_action(action).await
    }
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Register the store's reactions on every capability the transport offers.
fn wire_callbacks(adapter: &mut dyn TransportAdapter, store: &RoomStore) -> Vec<Unregister> {
    let mut cleanup = Vec::new();

    let target = store.clone();
    cleanup.extend(adapter.on_snapshot(Arc::new(move |state: RoomState| target.adopt_snapshot(state))));

    let target = store.clone();
    cleanup.extend(adapter.on_event(Arc::new(move |action: Action| target.dispatch(action))));

    let target = store.clone();
    cleanup.extend(adapter.on_disconnected(Arc::new(move |err: Option<SyncError>| {
        debug!(error = ?err, "transport reported disconnect");
        target.set_status(ConnectionStatus::Disconnected, err);
    })));

    let target = store.clone();
    cleanup.extend(adapter.on_error(Arc::new(move |err: SyncError| {
        warn!("transport error: {err}");
        target.set_status(ConnectionStatus::Error, Some(err));
    })));

    debug!(registered = cleanup.len(), "transport callbacks wired");
    cleanup
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

    struct Solo;

    impl RulesEngine for Solo {
        fn id(&self) -> &str {
            "solo"
        }

        fn create_initial_state(&self, identity: Option<&CurrentUser>) -> RoomState {
            RoomState {
                user_id: identity.and_then(|u| u.id.clone()),
                user_name: identity.and_then(|u| u.name.clone()),
                ..RoomState::default()
            }
        }

        fn reduce(&self, state: &Arc<RoomState>, action: &Action) -> Arc<RoomState> {
            let mut next = RoomState::clone(state);
            next.extra
                .insert("last".into(), serde_json::Value::String(action.kind.clone()));
            Arc::new(next)
        }
    }

    #[test]
    fn local_connect_rejects_other_engine() {
        let client = LocalClient::new(Arc::new(Solo), SyncConfig::new());
        let err = client
            .connect(&ConnectOptions::new().with_engine_id("other"))
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::EngineMismatch {
                bound: "solo".into(),
                requested: "other".into(),
            }
        );
        let status = client.status();
        assert_eq!(status.status, ConnectionStatus::Error);
        assert_eq!(status.error, Some(err));
    }

    #[test]
    fn local_connect_binds_identity() {
        let client = LocalClient::new(Arc::new(Solo), SyncConfig::new());
        client
            .connect(
                &ConnectOptions::new()
                    .with_engine_id("solo")
                    .with_user(CurrentUser::new("u1", "Ann")),
            )
            .unwrap();
        assert_eq!(client.status().status, ConnectionStatus::Connected);
        assert_eq!(client.state().user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn local_intents_reach_reducer() {
        let client = LocalClient::new(Arc::new(Solo), SyncConfig::new());
        client.draw_card().await.unwrap();
        assert_eq!(
            client.state().extra.get("last"),
            Some(&serde_json::Value::String("DRAW_CARD".into()))
        );
    }

    #[tokio::test]
    async fn remote_without_factory_fails() {
        let client = RemoteClient::new(Arc::new(Solo), SyncConfig::new());
        let err = client.connect(ConnectOptions::new()).await.unwrap_err();
        assert_eq!(err, SyncError::MissingTransportFactory);
        assert_eq!(client.status().error, Some(SyncError::MissingTransportFactory));
    }

    #[tokio::test]
    async fn remote_send_before_connect_is_not_connected() {
        let client = RemoteClient::new(Arc::new(Solo), SyncConfig::new());
        assert_eq!(
            client.start_game().await,
            Err(SyncError::NotConnected)
        );
        assert!(!client.has_transport().await);
    }
}
