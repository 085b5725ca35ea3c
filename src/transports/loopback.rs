//! In-process transport over a pair of unbounded channels.
//!
//! [`loopback_pair`] returns a [`LoopbackTransport`] for the client side and a
//! [`LoopbackServer`] for whatever plays the authoritative host (a test, or a
//! host task running in the same process). Both ends exchange the same JSON
//! text a network transport would carry.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::action::Action;
use crate::config::ConnectOptions;
use crate::error::{Result, SyncError};
use crate::protocol::{ClientEnvelope, ServerPush};
use crate::state::RoomState;
use crate::transport::{
    CallbackRegistry, DisconnectedCallback, ErrorCallback, EventCallback, SnapshotCallback,
    TransportAdapter, Unregister,
};

/// Create a connected client/server pair.
pub fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (to_server, from_client) = mpsc::unbounded_channel::<String>();
    let (to_client, from_server) = mpsc::unbounded_channel::<String>();
    let transport = LoopbackTransport {
        outgoing: to_server,
        incoming: Some(from_server),
        registry: CallbackRegistry::new(),
        pump: None,
        connected: false,
    };
    let server = LoopbackServer {
        incoming: from_client,
        outgoing: to_client,
    };
    (transport, server)
}

// ── Client side ─────────────────────────────────────────────────────

/// Client half of [`loopback_pair`]. Single use: it can connect once.
pub struct LoopbackTransport {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: Option<mpsc::UnboundedReceiver<String>>,
    registry: CallbackRegistry,
    pump: Option<JoinHandle<()>>,
    connected: bool,
}

impl LoopbackTransport {
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_envelope(&self, envelope: &ClientEnvelope) -> Result<()> {
        let text = serde_json::to_string(envelope)?;
        self.outgoing
            .send(text)
            .map_err(|_| SyncError::TransportClosed)
    }
}

#[async_trait]
impl TransportAdapter for LoopbackTransport {
    async fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        let mut incoming = self
            .incoming
            .take()
            .ok_or_else(|| SyncError::TransportConnect("loopback transport already used".into()))?;

        self.send_envelope(&ClientEnvelope::Join {
            room_id: options.room_id.clone(),
            user: options.user.clone(),
        })
        .map_err(|_| SyncError::TransportConnect("loopback server dropped".into()))?;

        let registry = self.registry.clone();
        self.pump = Some(tokio::spawn(async move {
            while let Some(text) = incoming.recv().await {
                registry.route_text(&text);
            }
            debug!("loopback server closed");
            registry.emit_disconnected(None);
        }));
        self.connected = true;
        debug!(room = ?options.room_id, "loopback transport connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.connected = false;
        Ok(())
    }

    async fn send_action(&mut self, action: Action) -> Result<()> {
        if !self.connected {
            return Err(SyncError::NotConnected);
        }
        self.send_envelope(&ClientEnvelope::Action { action })
    }

    fn on_snapshot(&mut self, callback: SnapshotCallback) -> Option<Unregister> {
        Some(self.registry.on_snapshot(callback))
    }

    fn on_event(&mut self, callback: EventCallback) -> Option<Unregister> {
        Some(self.registry.on_event(callback))
    }

    fn on_disconnected(&mut self, callback: DisconnectedCallback) -> Option<Unregister> {
        Some(self.registry.on_disconnected(callback))
    }

    fn on_error(&mut self, callback: ErrorCallback) -> Option<Unregister> {
        Some(self.registry.on_error(callback))
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("connected", &self.connected)
            .field("registry", &self.registry)
            .finish()
    }
}

// ── Server side ─────────────────────────────────────────────────────

/// Host half of [`loopback_pair`].
#[derive(Debug)]
pub struct LoopbackServer {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

impl LoopbackServer {
    /// Push raw text to the client.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TransportClosed`] if the client half is gone.
    pub fn push_text(&self, text: impl Into<String>) -> Result<()> {
        self.outgoing
            .send(text.into())
            .map_err(|_| SyncError::TransportClosed)
    }

    /// # Errors
    ///
    /// See [`push_text`](Self::push_text).
    pub fn push(&self, push: &ServerPush) -> Result<()> {
        self.push_text(serde_json::to_string(push)?)
    }

    /// # Errors
    ///
    /// See [`push_text`](Self::push_text).
    pub fn push_snapshot(&self, state: RoomState) -> Result<()> {
        self.push(&ServerPush::Snapshot { state })
    }

    /// # Errors
    ///
    /// See [`push_text`](Self::push_text).
    pub fn push_event(&self, action: Action) -> Result<()> {
        self.push(&ServerPush::Event { action })
    }

    /// Wait for the next envelope from the client. `None` once the client
    /// half is dropped.
    pub async fn next_envelope(&mut self) -> Option<Result<ClientEnvelope>> {
        let text = self.incoming.recv().await?;
        Some(serde_json::from_str(&text).map_err(SyncError::from))
    }
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
    use crate::state::CurrentUser;
    use std::sync::Arc;

    #[tokio::test]
    async fn connect_sends_join_first() {
        let (mut transport, mut server) = loopback_pair();
        transport
            .connect(
                &ConnectOptions::new()
                    .with_room_id("r1")
                    .with_user(CurrentUser::new("u1", "Ann")),
            )
            .await
            .unwrap();

        let join = server.next_envelope().await.unwrap().unwrap();
        assert_eq!(
            join,
            ClientEnvelope::Join {
                room_id: Some("r1".into()),
                user: Some(CurrentUser::new("u1", "Ann")),
            }
        );
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let (mut transport, _server) = loopback_pair();
        assert_eq!(
            transport.send_action(Action::start_game()).await,
            Err(SyncError::NotConnected)
        );
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let (mut transport, _server) = loopback_pair();
        transport.connect(&ConnectOptions::new()).await.unwrap();
        let err = transport.connect(&ConnectOptions::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::TransportConnect(_)));
    }

    #[tokio::test]
    async fn pushes_reach_callbacks_and_drop_reports_disconnect() {
        let (mut transport, server) = loopback_pair();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let events = tx.clone();
        let _e = transport.on_event(Arc::new(move |action: Action| {
            events.send(format!("event:{}", action.kind)).unwrap();
        }));
        let _d = transport.on_disconnected(Arc::new(move |err: Option<SyncError>| {
            tx.send(format!("disconnected:{}", err.is_some())).unwrap();
        }));
        transport.connect(&ConnectOptions::new()).await.unwrap();

        server.push_event(Action::draw_card(Some("u1"))).unwrap();
        assert_eq!(rx.recv().await.unwrap(), "event:DRAW_CARD");

        drop(server);
        assert_eq!(rx.recv().await.unwrap(), "disconnected:false");
    }
}
