//! Copy and read-only snapshot primitives.
//!
//! State leaves the container in two forms: a shared read-only
//! `Arc<RoomState>` handed to listeners, and a [`RoomSnapshot`] produced by
//! [`RoomStore::export_room_snapshot`](crate::store::RoomStore::export_room_snapshot).
//! Neither exposes interior mutability, so code that did not author a change
//! can never observe or cause one.

use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::state::RoomState;

/// Structural copy of a room state. Shares nothing with `state`.
pub fn clone_state(state: &RoomState) -> RoomState {
    state.clone()
}

/// Copy any serde value through its JSON form.
///
/// # Errors
///
/// Returns [`SyncError::Serialization`](crate::SyncError::Serialization) if the
/// value cannot be encoded or the encoding cannot be decoded back into `T`.
pub fn clone_json<T: Serialize + DeserializeOwned>(value: &T) -> Result<T> {
    let encoded = serde_json::to_value(value)?;
    Ok(serde_json::from_value(encoded)?)
}

/// Decode a raw JSON room state, applying the model's normalizations.
///
/// # Errors
///
/// Returns [`SyncError::Serialization`](crate::SyncError::Serialization) if
/// `value` is not shaped like a room.
pub fn state_from_value(value: Value) -> Result<RoomState> {
    Ok(serde_json::from_value(value)?)
}

/// Encode a room state as JSON.
///
/// # Errors
///
/// Returns [`SyncError::Serialization`](crate::SyncError::Serialization) if an
/// engine-owned field cannot be encoded.
pub fn state_to_value(state: &RoomState) -> Result<Value> {
    Ok(serde_json::to_value(state)?)
}

/// Wrap a state in a read-only snapshot.
pub fn freeze_snapshot(state: RoomState) -> RoomSnapshot {
    RoomSnapshot(Arc::new(state))
}

/// An immutable point-in-time copy of room state.
///
/// Cloning a snapshot is cheap and yields the same underlying allocation;
/// [`ptr_eq`](Self::ptr_eq) tells two exports of the same state apart from
/// exports taken across a change.
#[derive(Debug, Clone)]
pub struct RoomSnapshot(Arc<RoomState>);

impl RoomSnapshot {
    /// Already frozen: returns `self` unchanged.
    #[must_use]
    pub fn freeze(self) -> Self {
        self
    }

    /// Returns `true` if both snapshots share the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A mutable copy detached from this snapshot.
    pub fn to_state(&self) -> RoomState {
        clone_state(&self.0)
    }
}

impl Deref for RoomSnapshot {
    type Target = RoomState;

    fn deref(&self) -> &RoomState {
        &self.0
    }
}

impl Serialize for RoomSnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}
