//! Connection status state machine.
//!
//! ```text
//! idle ──connect──▶ connecting ──▶ connected ──disconnect──▶ disconnected
//!                        │
//!                        └──failure──▶ error
//! any ──reset_session──▶ idle
//! ```

use serde::Serialize;

use crate::error::SyncError;

/// Coarse connection status of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    /// Returns `true` once a connect attempt has succeeded and not ended.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Connection status plus the error that caused it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusState {
    pub status: ConnectionStatus,
    pub error: Option<SyncError>,
}

impl StatusState {
    pub fn new(status: ConnectionStatus, error: Option<SyncError>) -> Self {
        Self { status, error }
    }
}
