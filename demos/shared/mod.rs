//! A tiny rules engine shared by the demos.
//!
//! Everyone holds an endless hand; on your turn you play one card and the
//! turn passes to the next seat. The round ends after `limit` plays.

use std::sync::Arc;

use card_room_sync::action::types;
use card_room_sync::{Action, CurrentUser, Phase, PlayerRecord, RoomSettings, RoomState, RulesEngine};

pub const ENGINE_ID: &str = "go-around";

/// Engine-defined action the demo host uses to seat a remote guest.
pub const SEAT_GUEST: &str = "SEAT_GUEST";

pub struct GoAround {
    limit: u64,
}

impl GoAround {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

fn plays(state: &RoomState) -> u64 {
    state.extra.get("plays").and_then(|v| v.as_u64()).unwrap_or(0)
}

impl RulesEngine for GoAround {
    fn id(&self) -> &str {
        ENGINE_ID
    }

    fn create_initial_state(&self, user: Option<&CurrentUser>) -> RoomState {
        let mut state = RoomState {
            user_id: user.and_then(|u| u.id.clone()),
            user_name: user.and_then(|u| u.name.clone()),
            room_name: Some("Demo table".into()),
            room_settings: RoomSettings::with_max_players(4),
            ..RoomState::default()
        };
        if let (Some(id), Some(name)) = (state.user_id.clone(), state.user_name.clone()) {
            let mut host = PlayerRecord::human(id.clone(), name);
            host.is_host = true;
            state.players.push(host);
            state.host_id = Some(id);
        }
        state
    }

    fn reduce(&self, state: &Arc<RoomState>, action: &Action) -> Arc<RoomState> {
        let mut next = RoomState::clone(state);
        match action.kind.as_str() {
            SEAT_GUEST => {
                let (Some(id), Some(name)) = (action.payload_str("id"), action.payload_str("name"))
                else {
                    return Arc::clone(state);
                };
                if !state.has_free_seat() || state.participant(id).is_some() {
                    return Arc::clone(state);
                }
                next.players.push(PlayerRecord::human(id, name));
            }
            types::ADD_BOT => {
                if !state.has_free_seat() {
                    return Arc::clone(state);
                }
                let n = state.players.iter().filter(|p| p.is_bot).count() + 1;
                let name = action.payload_str("name").unwrap_or("Bot");
                next.players.push(PlayerRecord::bot(format!("bot-{n}"), name));
            }
            types::TOGGLE_READY => {
                let Some(player) = action
                    .payload_str("playerId")
                    .and_then(|id| next.players.iter_mut().find(|p| p.id == id))
                else {
                    return Arc::clone(state);
                };
                let ready = !player.is_ready;
                player.set_ready(ready);
            }
            types::START_GAME => {
                if state.phase != Phase::RoomLobby || !state.players.iter().all(|p| p.is_ready) {
                    return Arc::clone(state);
                }
                next.phase = Phase::Playing;
                next.current_turn = state.players.first().map(|p| p.id.clone());
                next.extra.insert("plays".into(), 0.into());
            }
            types::PLAY_CARD => {
                let turn = state.current_turn.as_deref();
                if state.phase != Phase::Playing || action.payload_str("playerId") != turn {
                    return Arc::clone(state);
                }
                let played = plays(state) + 1;
                next.extra.insert("plays".into(), played.into());
                if played >= self.limit {
                    next.phase = Phase::Finished;
                    next.current_turn = None;
                } else {
                    let seat = state
                        .players
                        .iter()
                        .position(|p| Some(p.id.as_str()) == turn)
                        .unwrap_or(0);
                    let following = (seat + 1) % state.players.len().max(1);
                    next.current_turn = state.players.get(following).map(|p| p.id.clone());
                }
            }
            _ => return Arc::clone(state),
        }
        Arc::new(next)
    }

    fn bot_action(&self, _state: &RoomState, player: &PlayerRecord) -> Option<Action> {
        Some(Action::play_card(Some(&player.id), "any", None))
    }

    fn bot_think_delay_ms(&self) -> f64 {
        300.0
    }
}
