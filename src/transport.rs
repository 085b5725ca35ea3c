//! Transport adapter protocol.
//!
//! A [`RemoteClient`](crate::client::RemoteClient) bridges actions to an
//! authoritative peer through a [`TransportAdapter`]. Every capability is
//! optional: the default method bodies describe a transport that lacks it,
//! and the client wires only what the adapter provides.
//!
//! Pushed data flows back through callbacks. Each `on_*` registration returns
//! an [`Unregister`] handle; the client aggregates them and runs every one on
//! teardown, logging failures instead of propagating them.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use card_room_sync::transport::{CallbackRegistry, EventCallback, TransportAdapter, Unregister};
//! use card_room_sync::{Action, ConnectOptions, SyncError};
//!
//! #[derive(Default)]
//! struct MyTransport {
//!     callbacks: CallbackRegistry,
//!     connected: bool,
//! }
//!
//! #[async_trait]
//! impl TransportAdapter for MyTransport {
//!     async fn connect(&mut self, _options: &ConnectOptions) -> Result<(), SyncError> {
//!         // Dial the server, then feed incoming frames to `self.callbacks.route_text`.
//!         self.connected = true;
//!         Ok(())
//!     }
//!
//!     async fn send_action(&mut self, _action: Action) -> Result<(), SyncError> {
//!         if !self.connected {
//!             return Err(SyncError::NotConnected);
//!         }
//!         // Serialize and transmit the action.
//!         Ok(())
//!     }
//!
//!     fn on_event(&mut self, callback: EventCallback) -> Option<Unregister> {
//!         Some(self.callbacks.on_event(callback))
//!     }
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::action::Action;
use crate::config::ConnectOptions;
use crate::engine::RulesEngine;
use crate::error::{Result, SyncError};
use crate::protocol::ServerPush;
use crate::state::RoomState;

/// Receives an authoritative full room state.
pub type SnapshotCallback = Arc<dyn Fn(RoomState) + Send + Sync>;
/// Receives an action to run through the local reducer.
pub type EventCallback = Arc<dyn Fn(Action) + Send + Sync>;
/// Receives a connection loss, with its cause when known.
pub type DisconnectedCallback = Arc<dyn Fn(Option<SyncError>) + Send + Sync>;
/// Receives an asynchronous transport fault.
pub type ErrorCallback = Arc<dyn Fn(SyncError) + Send + Sync>;

/// What a transport factory is given to build a transport.
#[derive(Clone)]
pub struct TransportRequest {
    /// The engine the client is bound to.
    pub engine: Arc<dyn RulesEngine>,
    /// Options passed to `connect`.
    pub options: ConnectOptions,
}

impl std::fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRequest")
            .field("engine", &self.engine.id())
            .field("options", &self.options)
            .finish()
    }
}

/// Builds a transport for a connect attempt. `Err` means none can be produced.
pub type TransportFactory =
    Arc<dyn Fn(TransportRequest) -> Result<Box<dyn TransportAdapter>> + Send + Sync>;

// ── Unregister ──────────────────────────────────────────────────────

/// De-registers one transport callback.
pub struct Unregister(Box<dyn FnOnce() -> Result<()> + Send>);

impl Unregister {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Run the de-registration.
    ///
    /// # Errors
    ///
    /// Returns whatever the de-registration closure reports.
    pub fn run(self) -> Result<()> {
        (self.0)()
    }
}

impl std::fmt::Debug for Unregister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unregister")
    }
}

/// Run every handle, logging (not propagating) individual failures.
pub fn unregister_all(handles: Vec<Unregister>) {
    let total = handles.len();
    let mut failed = 0usize;
    for handle in handles {
        if let Err(err) = handle.run() {
            failed += 1;
            warn!("failed to unregister transport listener: {err}");
        }
    }
    debug!(total, failed, "transport listeners unregistered");
}

// ── TransportAdapter ────────────────────────────────────────────────

/// A connection to an authoritative room host.
///
/// # Object Safety
///
/// This trait is object-safe; the client stores `Box<dyn TransportAdapter>`.
#[async_trait]
pub trait TransportAdapter: Send + 'static {
    /// Perform the connection handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TransportConnect`] (or any other variant) if the
    /// handshake fails; the client then moves to the `error` status.
    async fn connect(&mut self, _options: &ConnectOptions) -> Result<()> {
        Ok(())
    }

    /// Tear the connection down.
    ///
    /// # Errors
    ///
    /// Failures are logged by the client; teardown continues regardless.
    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transmit a locally originated action.
    ///
    /// # Errors
    ///
    /// Must return [`SyncError::NotConnected`] before the handshake
    /// completed. Transports without this capability return
    /// [`SyncError::Unsupported`].
    async fn send_action(&mut self, _action: Action) -> Result<()> {
        Err(SyncError::Unsupported("send_action"))
    }

    /// Register for pushed full-state snapshots.
    fn on_snapshot(&mut self, _callback: SnapshotCallback) -> Option<Unregister> {
        None
    }

    /// Register for pushed actions.
    fn on_event(&mut self, _callback: EventCallback) -> Option<Unregister> {
        None
    }

    /// Register for connection loss.
    fn on_disconnected(&mut self, _callback: DisconnectedCallback) -> Option<Unregister> {
        None
    }

    /// Register for asynchronous faults.
    fn on_error(&mut self, _callback: ErrorCallback) -> Option<Unregister> {
        None
    }
}

// ── CallbackRegistry ────────────────────────────────────────────────

#[derive(Clone)]
enum Callback {
    Snapshot(SnapshotCallback),
    Event(EventCallback),
    Disconnected(DisconnectedCallback),
    Error(ErrorCallback),
}

#[derive(Default)]
struct Slots {
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

/// Callback storage for transport implementations.
///
/// Cloning yields a handle to the same registry, so a reader task can route
/// pushes while the adapter keeps registering and unregistering.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    slots: Arc<Mutex<Slots>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_snapshot(&self, callback: SnapshotCallback) -> Unregister {
        self.register(Callback::Snapshot(callback))
    }

    pub fn on_event(&self, callback: EventCallback) -> Unregister {
        self.register(Callback::Event(callback))
    }

    pub fn on_disconnected(&self, callback: DisconnectedCallback) -> Unregister {
        self.register(Callback::Disconnected(callback))
    }

    pub fn on_error(&self, callback: ErrorCallback) -> Unregister {
        self.register(Callback::Error(callback))
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit_snapshot(&self, state: RoomState) {
        for callback in self.matching(|c| matches!(c, Callback::Snapshot(_))) {
            if let Callback::Snapshot(f) = callback {
                f(state.clone());
            }
        }
    }

    pub fn emit_event(&self, action: Action) {
        for callback in self.matching(|c| matches!(c, Callback::Event(_))) {
            if let Callback::Event(f) = callback {
                f(action.clone());
            }
        }
    }

    pub fn emit_disconnected(&self, error: Option<SyncError>) {
        for callback in self.matching(|c| matches!(c, Callback::Disconnected(_))) {
            if let Callback::Disconnected(f) = callback {
                f(error.clone());
            }
        }
    }

    pub fn emit_error(&self, error: SyncError) {
        for callback in self.matching(|c| matches!(c, Callback::Error(_))) {
            if let Callback::Error(f) = callback {
                f(error.clone());
            }
        }
    }

    /// Deliver a decoded server push to the matching callbacks.
    pub fn route(&self, push: ServerPush) {
        match push {
            ServerPush::Snapshot { state } => self.emit_snapshot(state),
            ServerPush::Event { action } => self.emit_event(action),
            ServerPush::Disconnected { reason } => {
                self.emit_disconnected(reason.map(SyncError::Remote));
            }
            ServerPush::Error { message } => self.emit_error(SyncError::Remote(message)),
        }
    }

    /// Decode a JSON server push and [`route`](Self::route) it. Undecodable
    /// text is logged and skipped.
    pub fn route_text(&self, text: &str) {
        match serde_json::from_str::<ServerPush>(text) {
            Ok(push) => self.route(push),
            Err(e) => warn!("failed to deserialize server push: {e}; raw: {text}"),
        }
    }

    fn register(&self, callback: Callback) -> Unregister {
        let id = {
            let mut slots = self.lock();
            slots.next_id += 1;
            let id = slots.next_id;
            slots.callbacks.push((id, callback));
            id
        };
        let slots = Arc::clone(&self.slots);
        Unregister::new(move || {
            slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .callbacks
                .retain(|(cid, _)| *cid != id);
            Ok(())
        })
    }

    /// Copy matching callbacks out so none runs under the lock.
    fn matching(&self, keep: impl Fn(&Callback) -> bool) -> Vec<Callback> {
        self.lock()
            .callbacks
            .iter()
            .filter(|(_, c)| keep(c))
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}
