//! Room state data model.
//!
//! [`RoomState`] carries the handful of fields the synchronization layer
//! reasons about (phase, seats, host, identity, turn). Everything else the
//! rules engine keeps in the room (hands, piles, history, banners, ...) lives
//! in [`RoomState::extra`] and round-trips untouched.
//!
//! Deserialization is lenient where the wire can disagree with the model:
//!
//! - an unknown or non-string `phase` becomes [`Phase::RoomLobby`]
//! - an unknown `status` on a participant is derived from `isReady`
//! - a `maxPlayers` that is not a non-negative whole number means unlimited

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Display name used when no identity source provides one.
pub const DEFAULT_USER_NAME: &str = "Player";

// ── Enums ───────────────────────────────────────────────────────────

/// Coarse lifecycle stage of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Pre-game lobby: seats, readiness, bots.
    #[default]
    RoomLobby,
    /// A round is in progress.
    Playing,
    /// The round ended; the room waits to return to the lobby.
    Finished,
}

impl Phase {
    /// Parse a wire value, normalizing anything unrecognized to the lobby.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "playing" => Self::Playing,
            "finished" => Self::Finished,
            _ => Self::RoomLobby,
        }
    }

    /// Wire representation of this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoomLobby => "roomLobby",
            Self::Playing => "playing",
            Self::Finished => "finished",
        }
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(Phase::parse).unwrap_or_default())
    }
}

/// Readiness of a participant in the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    #[default]
    NotReady,
    Ready,
    /// Present but asked the table to wait.
    NeedsTime,
}

impl PlayerStatus {
    /// Parse a wire value, returning `None` for anything outside the domain.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "notReady" => Some(Self::NotReady),
            "ready" => Some(Self::Ready),
            "needsTime" => Some(Self::NeedsTime),
            _ => None,
        }
    }
}

// ── Participants ────────────────────────────────────────────────────

/// A seated player or a spectator.
///
/// `status` is authoritative and `is_ready` mirrors it: after any
/// normalization `is_ready == (status == PlayerStatus::Ready)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPlayerRecord")]
pub struct PlayerRecord {
    /// Unique participant identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the participant is driven by automation.
    pub is_bot: bool,
    /// Whether the participant hosts the room.
    pub is_host: bool,
    /// Lobby readiness flag, kept consistent with `status`.
    pub is_ready: bool,
    /// Lobby readiness status.
    pub status: PlayerStatus,
    /// `true` for records stored in [`RoomState::spectators`].
    pub is_spectator: bool,
    /// Engine-owned per-participant fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wire shape of a participant before normalization.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayerRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    is_host: bool,
    #[serde(default)]
    is_ready: bool,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    is_spectator: bool,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawPlayerRecord> for PlayerRecord {
    fn from(raw: RawPlayerRecord) -> Self {
        let status = raw
            .status
            .as_ref()
            .and_then(Value::as_str)
            .and_then(PlayerStatus::parse)
            .unwrap_or(if raw.is_ready {
                PlayerStatus::Ready
            } else {
                PlayerStatus::NotReady
            });
        Self {
            id: raw.id,
            name: raw.name,
            is_bot: raw.is_bot,
            is_host: raw.is_host,
            is_ready: status == PlayerStatus::Ready,
            status,
            is_spectator: raw.is_spectator,
            extra: raw.extra,
        }
    }
}

impl PlayerRecord {
    /// A not-ready human participant.
    pub fn human(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_bot: false,
            is_host: false,
            is_ready: false,
            status: PlayerStatus::NotReady,
            is_spectator: false,
            extra: Map::new(),
        }
    }

    /// A not-ready bot participant.
    pub fn bot(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_bot: true,
            ..Self::human(id, name)
        }
    }

    /// Set the readiness status, keeping `is_ready` in step.
    pub fn set_status(&mut self, status: PlayerStatus) {
        self.status = status;
        self.is_ready = status == PlayerStatus::Ready;
    }

    /// Set the readiness flag, keeping `status` in step.
    pub fn set_ready(&mut self, ready: bool) {
        self.set_status(if ready {
            PlayerStatus::Ready
        } else {
            PlayerStatus::NotReady
        });
    }

    /// Normalize this record for storage in [`RoomState::players`].
    pub fn normalize_as_player(&mut self) {
        self.is_spectator = false;
        self.is_ready = self.status == PlayerStatus::Ready;
    }

    /// Normalize this record for storage in [`RoomState::spectators`].
    pub fn normalize_as_spectator(&mut self) {
        self.is_spectator = true;
        self.set_status(PlayerStatus::NotReady);
    }
}

// ── Room ────────────────────────────────────────────────────────────

/// Room-level settings. Only `max_players` is interpreted here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// Seat capacity. `None` means unlimited.
    #[serde(
        default,
        deserialize_with = "lenient_capacity",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_players: Option<usize>,
    /// Engine-owned settings.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoomSettings {
    /// Settings with the given seat capacity.
    pub fn with_max_players(max_players: usize) -> Self {
        Self {
            max_players: Some(max_players),
            extra: Map::new(),
        }
    }
}

fn lenient_capacity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(capacity_from_value))
}

fn capacity_from_value(raw: &Value) -> Option<usize> {
    let seats = match raw {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    usize::try_from(seats).ok()
}

/// The synchronized state of one room, as seen by one client.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomState {
    /// Identity of the local user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Display name of the local user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// Seated participants, in seat order.
    pub players: Vec<PlayerRecord>,
    /// Unseated participants.
    pub spectators: Vec<PlayerRecord>,
    pub room_settings: RoomSettings,
    /// Id of the player whose turn it is while `phase == Playing`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<String>,
    /// Engine-owned fields (`hands`, `drawPile`, `discardPile`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoomState {
    /// Look up a seated player by id.
    pub fn player(&self, id: &str) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Look up a participant by id in either list.
    pub fn participant(&self, id: &str) -> Option<&PlayerRecord> {
        self.player(id)
            .or_else(|| self.spectators.iter().find(|s| s.id == id))
    }

    /// Returns `true` if one more participant can be seated.
    pub fn has_free_seat(&self) -> bool {
        self.room_settings
            .max_players
            .is_none_or(|max| self.players.len() < max)
    }

    /// The local user's identity as recorded in this state.
    pub fn identity(&self) -> CurrentUser {
        CurrentUser {
            id: self.user_id.clone(),
            name: self.user_name.clone(),
        }
    }
}

// ── Identity ────────────────────────────────────────────────────────

/// Identity of the user driving a client.
///
/// Either half may be missing; [`hydrate`](crate::hydrate::hydrate) resolves
/// each field independently against other identity sources.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CurrentUser {
    /// A fully specified identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
        }
    }

    /// A fresh identity with a random id.
    pub fn guest(name: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_phase_normalizes_to_lobby() {
        let state: RoomState = serde_json::from_value(json!({ "phase": "intermission" })).unwrap();
        assert_eq!(state.phase, Phase::RoomLobby);

        let state: RoomState = serde_json::from_value(json!({ "phase": 7 })).unwrap();
        assert_eq!(state.phase, Phase::RoomLobby);

        let state: RoomState = serde_json::from_value(json!({ "phase": "finished" })).unwrap();
        assert_eq!(state.phase, Phase::Finished);
    }

    #[test]
    fn valid_status_is_authoritative() {
        let record: PlayerRecord = serde_json::from_value(json!({
            "id": "p1", "name": "Ann", "isReady": false, "status": "ready"
        }))
        .unwrap();
        assert_eq!(record.status, PlayerStatus::Ready);
        assert!(record.is_ready);

        let record: PlayerRecord = serde_json::from_value(json!({
            "id": "p1", "name": "Ann", "isReady": true, "status": "needsTime"
        }))
        .unwrap();
        assert_eq!(record.status, PlayerStatus::NeedsTime);
        assert!(!record.is_ready);
    }

    #[test]
    fn invalid_status_is_derived_from_ready_flag() {
        let record: PlayerRecord = serde_json::from_value(json!({
            "id": "p1", "name": "Ann", "isReady": true, "status": "sleepy"
        }))
        .unwrap();
        assert_eq!(record.status, PlayerStatus::Ready);

        let record: PlayerRecord =
            serde_json::from_value(json!({ "id": "p2", "name": "Bo" })).unwrap();
        assert_eq!(record.status, PlayerStatus::NotReady);
        assert!(!record.is_ready);
    }

    #[test]
    fn engine_fields_round_trip() {
        let raw = json!({
            "phase": "playing",
            "players": [{ "id": "p1", "name": "Ann", "seat": 3 }],
            "drawPile": ["7H", "QS"],
            "activeSuit": "hearts",
            "roomSettings": { "maxPlayers": 4, "deck": "standard" }
        });
        let state: RoomState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.extra["activeSuit"], json!("hearts"));
        assert_eq!(state.players[0].extra["seat"], json!(3));
        assert_eq!(state.room_settings.max_players, Some(4));

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["drawPile"], json!(["7H", "QS"]));
        assert_eq!(back["roomSettings"]["deck"], json!("standard"));
        assert_eq!(back["phase"], json!("playing"));
    }

    #[test]
    fn unusable_capacity_means_unlimited() {
        let capacity = |raw: Value| {
            serde_json::from_value::<RoomState>(json!({ "roomSettings": { "maxPlayers": raw } }))
                .unwrap()
                .room_settings
                .max_players
        };
        assert_eq!(capacity(json!(4)), Some(4));
        assert_eq!(capacity(json!(4.0)), Some(4));
        assert_eq!(capacity(json!("4")), Some(4));
        assert_eq!(capacity(json!(-1)), None);
        assert_eq!(capacity(json!(2.5)), None);
        assert_eq!(capacity(json!("four")), None);
        assert_eq!(capacity(Value::Null), None);
    }

    #[test]
    fn spectator_normalization_forces_not_ready() {
        let mut record = PlayerRecord::human("p1", "Ann");
        record.set_ready(true);
        record.normalize_as_spectator();
        assert!(record.is_spectator);
        assert!(!record.is_ready);
        assert_eq!(record.status, PlayerStatus::NotReady);
    }

    #[test]
    fn guests_get_distinct_uuid_ids() {
        let first = CurrentUser::guest("Ann");
        let second = CurrentUser::guest("Ann");
        assert_eq!(first.name.as_deref(), Some("Ann"));
        assert_ne!(first.id, second.id);
        assert!(Uuid::parse_str(first.id.as_deref().unwrap()).is_ok());
    }

    #[test]
    fn free_seat_respects_capacity() {
        let mut state = RoomState {
            room_settings: RoomSettings::with_max_players(1),
            ..RoomState::default()
        };
        assert!(state.has_free_seat());
        state.players.push(PlayerRecord::human("p1", "Ann"));
        assert!(!state.has_free_seat());

        state.room_settings.max_players = None;
        assert!(state.has_free_seat());
    }
}
