//! Snapshot reconciliation for clients joining or migrating into a room.
//!
//! [`hydrate`] merges an externally sourced room state with the identity of
//! the joining user. The result upholds three invariants:
//!
//! - every participant id appears once across players and spectators
//! - a newly seated participant never pushes `players` past `maxPlayers`
//! - the host is seated whenever a seat is available for them
//!
//! Hydrating an already hydrated state with the same context changes nothing.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::snapshot::{clone_state, state_from_value};
use crate::state::{CurrentUser, PlayerRecord, RoomState, DEFAULT_USER_NAME};

/// Identity sources consulted while hydrating, in priority order after the
/// explicit user.
#[derive(Debug, Clone, Copy, Default)]
pub struct HydrateContext<'a> {
    /// State the client held before adopting the snapshot.
    pub current_state: Option<&'a RoomState>,
    /// The user joining the room.
    pub current_user: Option<&'a CurrentUser>,
}

impl<'a> HydrateContext<'a> {
    /// Context with both identity sources.
    pub fn new(current_state: Option<&'a RoomState>, current_user: Option<&'a CurrentUser>) -> Self {
        Self {
            current_state,
            current_user,
        }
    }
}

/// Merge `snapshot` with the joining identity. `snapshot` is not modified.
pub fn hydrate(snapshot: &RoomState, ctx: &HydrateContext<'_>) -> RoomState {
    let mut next = clone_state(snapshot);
    dedupe_participants(&mut next);

    let (user_id, user_name) = resolve_identity(snapshot, ctx);
    if let Some(id) = user_id.as_deref() {
        seat_user(&mut next, id, &user_name);
    }
    next.user_id = user_id;
    next.user_name = Some(user_name);

    promote_host(&mut next);
    sync_host_flags(&mut next);

    debug!(
        players = next.players.len(),
        spectators = next.spectators.len(),
        phase = next.phase.as_str(),
        "hydrated room snapshot"
    );
    next
}

/// Decode a raw JSON snapshot and [`hydrate`] it.
///
/// # Errors
///
/// Returns [`SyncError::Serialization`](crate::SyncError::Serialization) if
/// `value` is not shaped like a room.
pub fn hydrate_value(value: Value, ctx: &HydrateContext<'_>) -> Result<RoomState> {
    let snapshot = state_from_value(value)?;
    Ok(hydrate(&snapshot, ctx))
}

/// Drop repeated ids (first occurrence wins, players before spectators) and
/// normalize each surviving record for the list it lives in.
fn dedupe_participants(state: &mut RoomState) {
    let mut seen = HashSet::new();

    let players = std::mem::take(&mut state.players);
    state.players = players
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .map(|mut p| {
            p.normalize_as_player();
            p
        })
        .collect();

    let spectators = std::mem::take(&mut state.spectators);
    state.spectators = spectators
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .map(|mut s| {
            s.normalize_as_spectator();
            s
        })
        .collect();
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

fn resolve_identity(snapshot: &RoomState, ctx: &HydrateContext<'_>) -> (Option<String>, String) {
    let user = ctx.current_user;
    let state = ctx.current_state;

    let id = non_empty(user.and_then(|u| u.id.as_ref()))
        .or_else(|| non_empty(state.and_then(|s| s.user_id.as_ref())))
        .or_else(|| non_empty(snapshot.user_id.as_ref()));
    let name = non_empty(user.and_then(|u| u.name.as_ref()))
        .or_else(|| non_empty(state.and_then(|s| s.user_name.as_ref())))
        .or_else(|| non_empty(snapshot.user_name.as_ref()))
        .unwrap_or_else(|| DEFAULT_USER_NAME.to_string());
    (id, name)
}

/// Update the user's record in place, or seat them (spectating when full).
fn seat_user(state: &mut RoomState, id: &str, name: &str) {
    if let Some(existing) = state
        .players
        .iter_mut()
        .chain(state.spectators.iter_mut())
        .find(|p| p.id == id)
    {
        existing.name = name.to_string();
        existing.is_bot = false;
        return;
    }

    let mut record = PlayerRecord::human(id, name);
    if state.has_free_seat() {
        state.players.push(record);
    } else {
        debug!(user = id, "room full, joining as spectator");
        record.normalize_as_spectator();
        state.spectators.push(record);
    }
}

/// Move a spectating host to the front of `players`, or to the back of
/// `spectators` when no seat is free.
///
/// A host never displaces a seated player; at capacity they keep watching.
fn promote_host(state: &mut RoomState) {
    let Some(host_id) = state.host_id.clone() else {
        return;
    };
    if state.player(&host_id).is_some() {
        return;
    }
    let Some(pos) = state.spectators.iter().position(|s| s.id == host_id) else {
        return;
    };

    let mut host = state.spectators.remove(pos);
    if state.has_free_seat() {
        host.normalize_as_player();
        state.players.insert(0, host);
    } else {
        state.spectators.push(host);
    }
}

fn sync_host_flags(state: &mut RoomState) {
    let host_id = state.host_id.as_deref();
    for record in state.players.iter_mut().chain(state.spectators.iter_mut()) {
        record.is_host = host_id == Some(record.id.as_str());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::state::{Phase, PlayerStatus, RoomSettings};
    use serde_json::json;

    fn ids(records: &[PlayerRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn ready(id: &str) -> PlayerRecord {
        let mut record = PlayerRecord::human(id, id.to_uppercase());
        record.set_ready(true);
        record
    }

    fn full_room() -> RoomState {
        RoomState {
            room_settings: RoomSettings::with_max_players(2),
            players: vec![ready("a"), ready("b")],
            ..RoomState::default()
        }
    }

    #[test]
    fn new_user_spectates_when_room_is_full() {
        let user = CurrentUser::new("c", "Cy");
        let next = hydrate(&full_room(), &HydrateContext::new(None, Some(&user)));

        assert_eq!(ids(&next.players), vec!["a", "b"]);
        assert_eq!(ids(&next.spectators), vec!["c"]);
        assert!(next.spectators[0].is_spectator);
        assert!(!next.spectators[0].is_ready);
    }

    #[test]
    fn new_user_takes_free_seat() {
        let mut room = full_room();
        room.room_settings.max_players = Some(3);
        let user = CurrentUser::new("c", "Cy");
        let next = hydrate(&room, &HydrateContext::new(None, Some(&user)));

        assert_eq!(ids(&next.players), vec!["a", "b", "c"]);
        assert!(next.spectators.is_empty());
        assert_eq!(next.user_id.as_deref(), Some("c"));
        assert_eq!(next.user_name.as_deref(), Some("Cy"));
    }

    #[test]
    fn unlimited_capacity_always_seats() {
        let mut room = full_room();
        room.room_settings.max_players = None;
        let user = CurrentUser::new("c", "Cy");
        let next = hydrate(&room, &HydrateContext::new(None, Some(&user)));
        assert_eq!(next.players.len(), 3);
    }

    #[test]
    fn spectating_host_is_promoted_to_first_seat() {
        let mut host = PlayerRecord::human("host-1", "Hana");
        host.normalize_as_spectator();
        let room = RoomState {
            host_id: Some("host-1".into()),
            room_settings: RoomSettings::with_max_players(4),
            players: vec![ready("a")],
            spectators: vec![host],
            ..RoomState::default()
        };
        let user = CurrentUser::new("a", "A");
        let next = hydrate(&room, &HydrateContext::new(None, Some(&user)));

        assert_eq!(next.players[0].id, "host-1");
        assert!(next.players[0].is_host);
        assert!(!next.players[0].is_spectator);
        assert!(next.spectators.iter().all(|s| s.id != "host-1"));
    }

    #[test]
    fn host_stays_spectator_at_capacity() {
        let mut host = PlayerRecord::human("host-1", "Hana");
        host.normalize_as_spectator();
        let mut room = full_room();
        room.host_id = Some("host-1".into());
        room.spectators = vec![host, PlayerRecord::human("z", "Zed")];
        let next = hydrate(&room, &HydrateContext::default());

        assert_eq!(ids(&next.players), vec!["a", "b"]);
        assert_eq!(ids(&next.spectators), vec!["z", "host-1"]);
        assert!(next.spectators[1].is_host);
    }

    #[test]
    fn existing_user_is_updated_not_relocated() {
        let mut watcher = PlayerRecord::bot("c", "old name");
        watcher.normalize_as_spectator();
        let mut room = full_room();
        room.spectators.push(watcher);
        let user = CurrentUser::new("c", "Cy");
        let next = hydrate(&room, &HydrateContext::new(None, Some(&user)));

        assert_eq!(ids(&next.spectators), vec!["c"]);
        assert_eq!(next.spectators[0].name, "Cy");
        assert!(!next.spectators[0].is_bot);
        assert_eq!(next.players.len(), 2);
    }

    #[test]
    fn duplicates_are_dropped_first_occurrence_wins() {
        let mut room = full_room();
        room.room_settings.max_players = None;
        room.players.push(PlayerRecord::human("a", "Impostor"));
        room.spectators.push(PlayerRecord::human("b", "Echo"));
        room.spectators.push(PlayerRecord::human("s", "Sam"));
        room.spectators.push(PlayerRecord::human("s", "Sam again"));
        let next = hydrate(&room, &HydrateContext::default());

        assert_eq!(ids(&next.players), vec!["a", "b"]);
        assert_eq!(next.players[0].name, "A");
        assert_eq!(ids(&next.spectators), vec!["s"]);
        assert_eq!(next.spectators[0].name, "Sam");
    }

    #[test]
    fn identity_falls_back_per_field() {
        let room = RoomState {
            user_id: Some("snap-id".into()),
            user_name: Some("Snap".into()),
            ..RoomState::default()
        };
        let current = RoomState {
            user_name: Some("Current".into()),
            ..RoomState::default()
        };
        let user = CurrentUser {
            id: None,
            name: None,
        };
        let next = hydrate(&room, &HydrateContext::new(Some(&current), Some(&user)));
        assert_eq!(next.user_id.as_deref(), Some("snap-id"));
        assert_eq!(next.user_name.as_deref(), Some("Current"));
        assert_eq!(ids(&next.players), vec!["snap-id"]);
    }

    #[test]
    fn missing_name_defaults_to_player() {
        let user = CurrentUser {
            id: Some("u".into()),
            name: Some(String::new()),
        };
        let next = hydrate(&RoomState::default(), &HydrateContext::new(None, Some(&user)));
        assert_eq!(next.user_name.as_deref(), Some(DEFAULT_USER_NAME));
        assert_eq!(next.players[0].name, DEFAULT_USER_NAME);
    }

    #[test]
    fn without_identity_nobody_is_seated() {
        let next = hydrate(&RoomState::default(), &HydrateContext::default());
        assert!(next.players.is_empty());
        assert!(next.user_id.is_none());
    }

    #[test]
    fn hydrate_is_idempotent() {
        let mut host = PlayerRecord::human("host-1", "Hana");
        host.normalize_as_spectator();
        let mut room = full_room();
        room.host_id = Some("host-1".into());
        room.spectators = vec![host, PlayerRecord::human("z", "Zed")];
        let user = CurrentUser::new("c", "Cy");
        let ctx = HydrateContext::new(None, Some(&user));

        let once = hydrate(&room, &ctx);
        let twice = hydrate(&once, &ctx);
        assert_eq!(ids(&once.players), ids(&twice.players));
        assert_eq!(ids(&once.spectators), ids(&twice.spectators));
        assert_eq!(once, twice);
    }

    #[test]
    fn caller_snapshot_is_untouched() {
        let room = full_room();
        let before = room.clone();
        let user = CurrentUser::new("c", "Cy");
        let _ = hydrate(&room, &HydrateContext::new(None, Some(&user)));
        assert_eq!(room, before);
    }

    #[test]
    fn raw_snapshot_is_normalized() {
        let raw = json!({
            "phase": "halftime",
            "roomSettings": { "maxPlayers": 2 },
            "players": [
                { "id": "a", "name": "A", "status": "ready" },
                { "id": "a", "name": "dup" }
            ],
            "spectators": [{ "id": "s", "name": "S", "isReady": true, "status": "ready" }]
        });
        let user = CurrentUser::new("u", "U");
        let next = hydrate_value(raw, &HydrateContext::new(None, Some(&user))).unwrap();

        assert_eq!(next.phase, Phase::RoomLobby);
        assert_eq!(ids(&next.players), vec!["a", "u"]);
        assert!(next.players[0].is_ready);
        assert_eq!(next.spectators[0].status, PlayerStatus::NotReady);
        assert!(next.spectators[0].is_spectator);
    }
}
