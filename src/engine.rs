//! Rules-engine contract.
//!
//! The synchronization layer knows nothing about card games. A [`RulesEngine`]
//! supplies the initial room, the reducer, and optionally bot decisions.
//!
//! # Change detection
//!
//! [`RulesEngine::reduce`] signals "nothing changed" by returning the very
//! same `Arc` it was given. The container compares with [`Arc::ptr_eq`], so a
//! reducer that rebuilds an equal state still counts as a change.
//!
//! ```
//! use std::sync::Arc;
//! use card_room_sync::{Action, CurrentUser, RoomState, RulesEngine};
//!
//! struct Solitaire;
//!
//! impl RulesEngine for Solitaire {
//!     fn id(&self) -> &str {
//!         "solitaire"
//!     }
//!
//!     fn create_initial_state(&self, identity: Option<&CurrentUser>) -> RoomState {
//!         RoomState {
//!             user_id: identity.and_then(|u| u.id.clone()),
//!             ..RoomState::default()
//!         }
//!     }
//!
//!     fn reduce(&self, state: &Arc<RoomState>, action: &Action) -> Arc<RoomState> {
//!         match action.kind.as_str() {
//!             "RENAME" => {
//!                 let mut next = RoomState::clone(state);
//!                 next.room_name = action.payload_str("name").map(str::to_string);
//!                 Arc::new(next)
//!             }
//!             _ => Arc::clone(state),
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::action::{Action, AUTO_READY_BOTS, RESET_SESSION};
use crate::snapshot::clone_state;
use crate::state::{CurrentUser, PlayerRecord, RoomState};

/// A card-game rules engine.
pub trait RulesEngine: Send + Sync + 'static {
    /// Stable identifier, checked against
    /// [`ConnectOptions::engine_id`](crate::config::ConnectOptions::engine_id).
    fn id(&self) -> &str;

    /// A fresh lobby, optionally bound to an identity.
    fn create_initial_state(&self, identity: Option<&CurrentUser>) -> RoomState;

    /// Pure reducer. Return `Arc::clone(state)` when `action` changes nothing.
    fn reduce(&self, state: &Arc<RoomState>, action: &Action) -> Arc<RoomState>;

    /// Decide what `player` (a bot owning the turn) does next.
    fn bot_action(&self, _state: &RoomState, _player: &PlayerRecord) -> Option<Action> {
        None
    }

    /// How long a bot "thinks" before acting, in milliseconds.
    fn bot_think_delay_ms(&self) -> f64 {
        0.0
    }
}

/// The container's reducer: reserved actions first, then the engine.
pub fn reduce(engine: &dyn RulesEngine, state: &Arc<RoomState>, action: &Action) -> Arc<RoomState> {
    match action.kind.as_str() {
        AUTO_READY_BOTS => ready_all_bots(state),
        RESET_SESSION => {
            debug!(engine = engine.id(), "resetting session to a fresh lobby");
            let identity = state.identity();
            Arc::new(clone_state(&engine.create_initial_state(Some(&identity))))
        }
        _ => engine.reduce(state, action),
    }
}

fn ready_all_bots(state: &Arc<RoomState>) -> Arc<RoomState> {
    if !state.players.iter().any(|p| p.is_bot && !p.is_ready) {
        return Arc::clone(state);
    }
    let mut next = clone_state(state);
    for bot in next.players.iter_mut().filter(|p| p.is_bot) {
        bot.set_ready(true);
    }
    Arc::new(next)
}
