//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] dials the endpoint on
//! [`connect`](crate::TransportAdapter::connect), sends a join envelope, then
//! pumps incoming text frames through its [`CallbackRegistry`] on a reader
//! task. Both `ws://` and `wss://` URLs are supported.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::action::Action;
use crate::config::ConnectOptions;
use crate::error::{Result, SyncError};
use crate::protocol::ClientEnvelope;
use crate::transport::{
    CallbackRegistry, DisconnectedCallback, ErrorCallback, EventCallback, SnapshotCallback,
    TransportAdapter, Unregister,
};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`TransportAdapter`] backed by a WebSocket connection.
///
/// The URL comes from [`ConnectOptions::endpoint`] or, when that is absent,
/// from [`with_url`](Self::with_url).
///
/// ```rust,no_run
/// # async fn example() -> card_room_sync::Result<()> {
/// use std::time::Duration;
/// use card_room_sync::{ConnectOptions, TransportAdapter, WebSocketTransport};
///
/// let mut transport = WebSocketTransport::new()
///     .with_url("ws://localhost:4000/rooms")
///     .with_connect_timeout(Duration::from_secs(5));
/// transport.connect(&ConnectOptions::new().with_room_id("r1")).await?;
/// # Ok(())
/// # }
/// ```
pub struct WebSocketTransport {
    url: Option<String>,
    connect_timeout: Option<Duration>,
    sink: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
    registry: CallbackRegistry,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            url: None,
            connect_timeout: None,
            sink: None,
            reader: None,
            registry: CallbackRegistry::new(),
        }
    }

    /// Fallback URL used when the connect options carry no endpoint.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Fail the handshake with [`SyncError::Timeout`] after `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    async fn dial(&self, url: &str) -> Result<WsStream> {
        tracing::debug!(url = %url, "connecting to WebSocket server");
        let handshake = tokio_tungstenite::connect_async(url);
        let result = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, handshake)
                .await
                .map_err(|_| SyncError::Timeout)?,
            None => handshake.await,
        };
        let (stream, _response) =
            result.map_err(|e| SyncError::TransportConnect(e.to_string()))?;
        tracing::info!(url = %url, "WebSocket connection established");
        Ok(stream)
    }

    async fn send_envelope(&mut self, envelope: &ClientEnvelope) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(SyncError::NotConnected)?;
        let text = serde_json::to_string(envelope)?;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| SyncError::TransportSend(e.to_string()))
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("connect_timeout", &self.connect_timeout)
            .field("connected", &self.sink.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}

#[async_trait]
impl TransportAdapter for WebSocketTransport {
    async fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        if self.sink.is_some() {
            return Err(SyncError::TransportConnect("already connected".into()));
        }
        let url = options
            .endpoint
            .clone()
            .or_else(|| self.url.clone())
            .ok_or_else(|| SyncError::TransportConnect("no endpoint configured".into()))?;

        let stream = self.dial(&url).await?;
        let (sink, stream) = stream.split();
        self.sink = Some(sink);

        if let Err(err) = self
            .send_envelope(&ClientEnvelope::Join {
                room_id: options.room_id.clone(),
                user: options.user.clone(),
            })
            .await
        {
            self.sink = None;
            return Err(err);
        }

        self.reader = Some(tokio::spawn(read_loop(stream, self.registry.clone())));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        match self.sink.take() {
            Some(mut sink) => sink
                .close()
                .await
                .map_err(|e| SyncError::TransportSend(e.to_string())),
            None => Ok(()),
        }
    }

    async fn send_action(&mut self, action: Action) -> Result<()> {
        self.send_envelope(&ClientEnvelope::Action { action }).await
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

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Route text frames until the server closes or the stream fails.
async fn read_loop(mut stream: SplitStream<WsStream>, registry: CallbackRegistry) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => registry.route_text(text.as_str()),
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(?frame, "received WebSocket close frame");
                registry.emit_disconnected(None);
                break;
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::warn!("received unexpected binary WebSocket frame, skipping");
            }
            // Ping/pong are answered by tungstenite; raw frames never reach the read half.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!("WebSocket receive error: {e}");
                registry.emit_disconnected(Some(SyncError::TransportReceive(e.to_string())));
                break;
            }
            None => {
                tracing::debug!("WebSocket stream ended");
                registry.emit_disconnected(None);
                break;
            }
        }
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
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
    use crate::state::{CurrentUser, Phase, RoomState};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_without_endpoint_fails() {
        let mut transport = WebSocketTransport::new();
        let err = transport.connect(&ConnectOptions::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::TransportConnect(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let mut transport = WebSocketTransport::new().with_url("ws://127.0.0.1:1");
        let err = transport.connect(&ConnectOptions::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::TransportConnect(_)));
    }

    #[tokio::test]
    async fn connect_times_out() {
        // Non-routable address.
        let mut transport = WebSocketTransport::new()
            .with_url("ws://192.0.2.1:1")
            .with_connect_timeout(Duration::from_millis(50));
        let err = transport.connect(&ConnectOptions::new()).await.unwrap_err();
        assert_eq!(err, SyncError::Timeout);
    }

    #[tokio::test]
    async fn send_before_connect_is_not_connected() {
        let mut transport = WebSocketTransport::new();
        assert_eq!(
            transport.send_action(Action::start_game()).await,
            Err(SyncError::NotConnected)
        );
    }

    // ── Mock-server helpers ──────────────────────────────────────────

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn join_then_snapshot_then_close() {
        let (joined_tx, mut joined_rx) = mpsc::unbounded_channel::<String>();
        let url = start_mock_server(move |mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                joined_tx.send(text.to_string()).unwrap();
            }
            let push = r#"{"type":"snapshot","state":{"phase":"playing","roomId":"r1"}}"#;
            ws.send(Message::Text(push.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut transport = WebSocketTransport::new();
        let snapshots = tx.clone();
        let _s = transport.on_snapshot(Arc::new(move |state: RoomState| {
            assert_eq!(state.phase, Phase::Playing);
            snapshots
                .send(format!("snapshot:{}", state.room_id.unwrap_or_default()))
                .unwrap();
        }));
        let _d = transport.on_disconnected(Arc::new(move |err: Option<SyncError>| {
            tx.send(format!("disconnected:{}", err.is_some())).unwrap();
        }));

        transport
            .connect(
                &ConnectOptions::new()
                    .with_endpoint(url)
                    .with_room_id("r1")
                    .with_user(CurrentUser::new("u1", "Ann")),
            )
            .await
            .unwrap();

        let join: ClientEnvelope = serde_json::from_str(&joined_rx.recv().await.unwrap()).unwrap();
        assert!(matches!(join, ClientEnvelope::Join { room_id: Some(ref r), .. } if r == "r1"));
        assert_eq!(rx.recv().await.unwrap(), "snapshot:r1");
        assert_eq!(rx.recv().await.unwrap(), "disconnected:false");
    }

    #[tokio::test]
    async fn actions_are_sent_as_envelopes() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<ClientEnvelope>();
        let url = start_mock_server(move |mut ws| async move {
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                seen_tx.send(serde_json::from_str(text.as_str()).unwrap()).unwrap();
            }
        })
        .await;

        let mut transport = WebSocketTransport::new().with_url(url);
        transport.connect(&ConnectOptions::new()).await.unwrap();
        transport
            .send_action(Action::draw_card(Some("u1")))
            .await
            .unwrap();

        assert!(matches!(
            seen_rx.recv().await.unwrap(),
            ClientEnvelope::Join { .. }
        ));
        let ClientEnvelope::Action { action } = seen_rx.recv().await.unwrap() else {
            panic!("expected action envelope");
        };
        assert_eq!(action.kind, "DRAW_CARD");

        transport.disconnect().await.unwrap();
        assert_eq!(
            transport.send_action(Action::start_game()).await,
            Err(SyncError::NotConnected)
        );
    }
}
