//! JSON envelopes used by the bundled transports.
//!
//! The core itself only assumes the [`Action`] shape. These envelopes frame
//! actions and pushes on a text channel:
//!
//! ```text
//! client → server   {"type":"join","roomId":"r1","user":{"id":"u1","name":"Ann"}}
//!                   {"type":"action","action":{"type":"PLAY_CARD","payload":{...}}}
//! server → client   {"type":"snapshot","state":{...}}
//!                   {"type":"event","action":{...}}
//!                   {"type":"disconnected","reason":"host left"}
//!                   {"type":"error","message":"..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::state::{CurrentUser, RoomState};

/// Messages sent from a client to the room host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEnvelope {
    /// Sent once after the connection opens.
    Join {
        #[serde(rename = "roomId", default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<CurrentUser>,
    },
    /// A locally originated action.
    Action { action: Action },
}

/// Messages pushed from the room host to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPush {
    /// Authoritative full state; replaces the local copy.
    Snapshot { state: RoomState },
    /// An action to run through the local reducer.
    Event { action: Action },
    /// The host closed the session.
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
    /// The host reported a fault.
    Error { message: String },
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::state::Phase;
    use serde_json::json;

    #[test]
    fn join_envelope_wire_shape() {
        let join = ClientEnvelope::Join {
            room_id: Some("r1".into()),
            user: Some(CurrentUser::new("u1", "Ann")),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({ "type": "join", "roomId": "r1", "user": { "id": "u1", "name": "Ann" } })
        );
    }

    #[test]
    fn action_envelope_nests_action_type() {
        let envelope = ClientEnvelope::Action {
            action: Action::draw_card(Some("u1")),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], json!("action"));
        assert_eq!(value["action"]["type"], json!("DRAW_CARD"));
        let back: ClientEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn snapshot_push_normalizes_state() {
        let push: ServerPush = serde_json::from_value(json!({
            "type": "snapshot",
            "state": { "phase": "bogus", "players": [{ "id": "a", "name": "A" }], "hands": {} }
        }))
        .unwrap();
        let ServerPush::Snapshot { state } = push else {
            panic!("expected snapshot");
        };
        assert_eq!(state.phase, Phase::RoomLobby);
        assert_eq!(state.players.len(), 1);
        assert!(state.extra.contains_key("hands"));
    }

    #[test]
    fn disconnected_reason_is_optional() {
        let push: ServerPush = serde_json::from_str(r#"{"type":"disconnected"}"#).unwrap();
        assert_eq!(push, ServerPush::Disconnected { reason: None });
    }
}
