//! Error types for the room synchronization client.

use thiserror::Error;

/// Errors that can occur when using the room synchronization client.
///
/// Every variant is cheap to clone so the same error can be stored in the
/// client's [`StatusState`](crate::status::StatusState) and returned to the
/// caller that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// `connect` was asked for a rules engine other than the one the client is bound to.
    #[error("engine mismatch: client is bound to `{bound}`, connect requested `{requested}`")]
    EngineMismatch {
        /// Identifier of the engine the client was constructed with.
        bound: String,
        /// Identifier supplied in the connect options.
        requested: String,
    },

    /// A remote connect was attempted without a transport factory in the config.
    #[error("no transport factory configured")]
    MissingTransportFactory,

    /// The transport factory could not produce a transport.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The transport handshake failed.
    #[error("transport connect error: {0}")]
    TransportConnect(String),

    /// Failed to send an action through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// The authoritative side reported a fault.
    #[error("remote error: {0}")]
    Remote(String),

    /// Attempted an operation that requires an established transport.
    #[error("not connected")]
    NotConnected,

    /// The transport does not implement the requested capability.
    #[error("transport does not support `{0}`")]
    Unsupported(&'static str),

    /// Failed to serialize or deserialize room state or a wire envelope.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unregistering a transport callback failed.
    #[error("listener cleanup failed: {0}")]
    ListenerCleanup(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A specialized [`Result`] type for room synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
