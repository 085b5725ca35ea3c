//! # Card Room Sync
//!
//! Client-side state synchronization for multiplayer card-game rooms.
//!
//! The crate keeps a local, observable copy of a room's state consistent with
//! either a purely local simulation or a remote authoritative host, and drives
//! bot participants while it does so. Game rules stay outside: they are
//! supplied through the [`RulesEngine`] trait.
//!
//! ## Features
//!
//! - **Observable state**: [`RoomStore`] with `subscribe`, `dispatch` and a
//!   memoized read-only [`RoomSnapshot`]
//! - **Local or remote**: [`LocalClient`] reduces actions itself;
//!   [`RemoteClient`] bridges them through any [`TransportAdapter`]
//! - **Room reconciliation**: [`hydrate`] merges a joining user into an
//!   existing room while keeping seat and host invariants
//! - **Bot automation**: auto-ready and delayed bot turns on a cancellable
//!   single-slot timer
//! - **WebSocket built-in**: default `transport-websocket` feature provides
//!   `WebSocketTransport`
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use card_room_sync::{
//!     Action, ConnectOptions, ConnectionStatus, CurrentUser, LocalClient, RoomState,
//!     RulesEngine, SyncConfig,
//! };
//!
//! struct Lobby;
//!
//! impl RulesEngine for Lobby {
//!     fn id(&self) -> &str {
//!         "lobby"
//!     }
//!
//!     fn create_initial_state(&self, user: Option<&CurrentUser>) -> RoomState {
//!         RoomState {
//!             user_id: user.and_then(|u| u.id.clone()),
//!             ..RoomState::default()
//!         }
//!     }
//!
//!     fn reduce(&self, state: &Arc<RoomState>, _action: &Action) -> Arc<RoomState> {
//!         Arc::clone(state)
//!     }
//! }
//!
//! let client = LocalClient::new(Arc::new(Lobby), SyncConfig::new());
//! client
//!     .connect(&ConnectOptions::new().with_user(CurrentUser::new("u1", "Ann")))
//!     .unwrap();
//! assert_eq!(client.status().status, ConnectionStatus::Connected);
//! assert_eq!(client.state().user_id.as_deref(), Some("u1"));
//! ```

pub mod action;
pub mod automation;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod hydrate;
pub mod protocol;
pub mod snapshot;
pub mod state;
pub mod status;
pub mod store;
pub mod transport;
pub mod transports;

mod timer;

// Re-export primary types for ergonomic imports.
pub use action::Action;
pub use client::{LocalClient, RemoteClient, RoomIntents};
pub use config::{ConnectOptions, SyncConfig};
pub use engine::RulesEngine;
pub use error::{Result, SyncError};
pub use hydrate::{hydrate, HydrateContext};
pub use protocol::{ClientEnvelope, ServerPush};
pub use snapshot::RoomSnapshot;
pub use state::{CurrentUser, Phase, PlayerRecord, PlayerStatus, RoomSettings, RoomState};
pub use status::{ConnectionStatus, StatusState};
pub use store::{RoomStore, Subscription};
pub use transport::{CallbackRegistry, TransportAdapter, TransportFactory, TransportRequest, Unregister};
pub use transports::{loopback_pair, LoopbackServer, LoopbackTransport};

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
