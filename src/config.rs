//! Client configuration and connect options.

use std::sync::Arc;
use std::time::Duration;

use crate::state::CurrentUser;
use crate::transport::{TransportAdapter, TransportFactory, TransportRequest};

/// Default timeout for awaiting a transport's disconnect.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── SyncConfig ──────────────────────────────────────────────────────

/// Configuration shared by [`LocalClient`](crate::client::LocalClient) and
/// [`RemoteClient`](crate::client::RemoteClient).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use card_room_sync::SyncConfig;
///
/// let config = SyncConfig::new()
///     .with_automation(false)
///     .with_shutdown_timeout(Duration::from_millis(250));
/// assert!(!config.automation);
/// assert!(config.transport_factory.is_none());
/// ```
#[derive(Clone)]
pub struct SyncConfig {
    /// Whether bots are auto-readied and driven after each state change.
    ///
    /// Defaults to **true**. Turn it off for remote clients whose
    /// authoritative side runs the bots.
    pub automation: bool,
    /// Produces the transport used by [`RemoteClient::connect`](crate::client::RemoteClient::connect).
    pub transport_factory: Option<TransportFactory>,
    /// Upper bound on awaiting a transport's disconnect.
    ///
    /// Defaults to **1 second**. Listener cleanup and local teardown run
    /// regardless of whether the transport finished in time.
    pub shutdown_timeout: Duration,
}

impl SyncConfig {
    /// Configuration with default values and no transport factory.
    pub fn new() -> Self {
        Self {
            automation: true,
            transport_factory: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Enable or disable bot automation.
    #[must_use]
    pub fn with_automation(mut self, automation: bool) -> Self {
        self.automation = automation;
        self
    }

    /// Set the transport factory used by remote clients.
    #[must_use]
    pub fn with_transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(TransportRequest) -> crate::Result<Box<dyn TransportAdapter>> + Send + Sync + 'static,
    {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    /// Set the timeout for awaiting a transport's disconnect.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("automation", &self.automation)
            .field("has_transport_factory", &self.transport_factory.is_some())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

// ── ConnectOptions ──────────────────────────────────────────────────

/// Arguments to `connect`.
///
/// # Example
///
/// ```
/// use card_room_sync::{ConnectOptions, CurrentUser};
///
/// let options = ConnectOptions::new()
///     .with_engine_id("crazy-eights")
///     .with_user(CurrentUser::new("u1", "Ann"))
///     .with_endpoint("ws://localhost:4000/rooms");
/// assert_eq!(options.engine_id.as_deref(), Some("crazy-eights"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Expected rules-engine id. A mismatch fails the connect.
    pub engine_id: Option<String>,
    /// Identity to bind the fresh room to.
    pub user: Option<CurrentUser>,
    /// Room to join, for transports that address rooms.
    pub room_id: Option<String>,
    /// Transport endpoint (e.g. a WebSocket URL).
    pub endpoint: Option<String>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_engine_id(mut self, engine_id: impl Into<String>) -> Self {
        self.engine_id = Some(engine_id.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: CurrentUser) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn with_room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}
