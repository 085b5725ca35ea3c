//! Actions: the only wire contract the synchronization layer assumes.
//!
//! An [`Action`] serializes as `{ "type": string, "payload"?: object }`. The
//! payload is opaque here except for the two reserved internal actions,
//! [`AUTO_READY_BOTS`] and [`RESET_SESSION`], which the container interprets
//! itself (see [`engine::reduce`](crate::engine::reduce)).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::state::{PlayerStatus, RoomSettings};

/// Reserved: mark every not-ready bot ready.
pub const AUTO_READY_BOTS: &str = "@@sync/AUTO_READY_BOTS";

/// Reserved: rebuild a fresh lobby bound to the same identity.
pub const RESET_SESSION: &str = "@@sync/RESET_SESSION";

/// Action types produced by the intent helpers.
pub mod types {
    pub const CREATE_ROOM: &str = "CREATE_ROOM";
    pub const TOGGLE_READY: &str = "TOGGLE_READY";
    pub const SET_PLAYER_STATUS: &str = "SET_PLAYER_STATUS";
    pub const UPDATE_SEAT_LAYOUT: &str = "UPDATE_SEAT_LAYOUT";
    pub const ADD_BOT: &str = "ADD_BOT";
    pub const REMOVE_BOT: &str = "REMOVE_BOT";
    pub const START_GAME: &str = "START_GAME";
    pub const PLAY_CARD: &str = "PLAY_CARD";
    pub const DRAW_CARD: &str = "DRAW_CARD";
    pub const RETURN_TO_LOBBY: &str = "RETURN_TO_LOBBY";
    pub const SET_DISPLAY_NAME: &str = "SET_DISPLAY_NAME";
}

/// A request to change room state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Action arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Action {
    /// An action without payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Returns `true` if this action is one the container handles itself.
    pub fn is_reserved(&self) -> bool {
        self.kind == AUTO_READY_BOTS || self.kind == RESET_SESSION
    }

    /// Read a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.as_ref()?.get(key)?.as_str()
    }

    pub(crate) fn auto_ready_bots() -> Self {
        Self::new(AUTO_READY_BOTS)
    }

    pub(crate) fn reset_session() -> Self {
        Self::new(RESET_SESSION)
    }

    // ── Intent constructors ─────────────────────────────────────────

    pub fn create_room(room_name: &str, settings: &RoomSettings) -> Self {
        let mut payload = Map::new();
        payload.insert("roomName".into(), json!(room_name));
        if let Ok(settings) = serde_json::to_value(settings) {
            payload.insert("roomSettings".into(), settings);
        }
        Self::new(types::CREATE_ROOM).with_payload(Value::Object(payload))
    }

    pub fn toggle_ready(player_id: Option<&str>) -> Self {
        Self::new(types::TOGGLE_READY).with_payload(json!({ "playerId": player_id }))
    }

    pub fn set_player_status(player_id: Option<&str>, status: PlayerStatus) -> Self {
        Self::new(types::SET_PLAYER_STATUS)
            .with_payload(json!({ "playerId": player_id, "status": status }))
    }

    /// Reorder seats. `seat_order` lists player ids front to back.
    pub fn update_seat_layout(seat_order: &[String]) -> Self {
        Self::new(types::UPDATE_SEAT_LAYOUT).with_payload(json!({ "seatOrder": seat_order }))
    }

    pub fn add_bot(name: Option<&str>) -> Self {
        match name {
            Some(name) => Self::new(types::ADD_BOT).with_payload(json!({ "name": name })),
            None => Self::new(types::ADD_BOT),
        }
    }

    pub fn remove_bot(bot_id: &str) -> Self {
        Self::new(types::REMOVE_BOT).with_payload(json!({ "botId": bot_id }))
    }

    pub fn start_game() -> Self {
        Self::new(types::START_GAME)
    }

    /// Play a card; `chosen_suit` applies to wild cards.
    pub fn play_card(player_id: Option<&str>, card_id: &str, chosen_suit: Option<&str>) -> Self {
        let mut payload = json!({ "playerId": player_id, "cardId": card_id });
        if let (Some(suit), Some(map)) = (chosen_suit, payload.as_object_mut()) {
            map.insert("chosenSuit".into(), json!(suit));
        }
        Self::new(types::PLAY_CARD).with_payload(payload)
    }

    pub fn draw_card(player_id: Option<&str>) -> Self {
        Self::new(types::DRAW_CARD).with_payload(json!({ "playerId": player_id }))
    }

    pub fn return_to_lobby() -> Self {
        Self::new(types::RETURN_TO_LOBBY)
    }

    pub fn set_display_name(player_id: Option<&str>, name: &str) -> Self {
        Self::new(types::SET_DISPLAY_NAME)
            .with_payload(json!({ "playerId": player_id, "name": name }))
    }
}
