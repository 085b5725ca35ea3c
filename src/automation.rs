//! Pure automation policies for bot participants.

use std::time::Duration;

use crate::action::Action;
use crate::engine::RulesEngine;
use crate::state::{Phase, PlayerRecord, RoomState};

/// Returns `true` when every human in the lobby is ready and some bot is not.
pub fn should_auto_ready_bots(state: &RoomState) -> bool {
    if state.phase != Phase::RoomLobby {
        return false;
    }
    let mut humans = state.players.iter().filter(|p| !p.is_bot).peekable();
    if humans.peek().is_none() {
        return false;
    }
    humans.all(|p| p.is_ready) && state.players.iter().any(|p| p.is_bot && !p.is_ready)
}

/// The bot whose turn it is, if a round is running and the turn owner is a bot.
pub fn resolve_bot_turn_player(state: &RoomState) -> Option<&PlayerRecord> {
    if state.phase != Phase::Playing {
        return None;
    }
    let turn = state.current_turn.as_deref()?;
    state.player(turn).filter(|p| p.is_bot)
}

/// Ask the engine what `player` does next.
pub fn select_bot_action(
    engine: &dyn RulesEngine,
    state: &RoomState,
    player: &PlayerRecord,
) -> Option<Action> {
    engine.bot_action(state, player)
}

/// The engine's think delay, clamped to zero when negative or not finite
/// and saturating at [`Duration::MAX`].
pub fn bot_think_delay(engine: &dyn RulesEngine) -> Duration {
    let millis = engine.bot_think_delay_ms();
    if millis.is_finite() && millis > 0.0 {
        Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
