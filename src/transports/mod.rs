//! Bundled [`TransportAdapter`](crate::TransportAdapter) implementations.
//!
//! | Transport               | Feature               | Use                          |
//! |-------------------------|-----------------------|------------------------------|
//! | [`LoopbackTransport`]   | always                | in-process hosts and tests   |
//! | [`WebSocketTransport`]  | `transport-websocket` | remote room hosts            |
//!
//! Both speak the JSON envelopes in [`protocol`](crate::protocol) and route
//! pushes through a [`CallbackRegistry`](crate::CallbackRegistry).
//!
//! # Example
//!
//! ```rust,ignore
//! let config = SyncConfig::new().with_transport_factory(|req| {
//!     Ok(Box::new(WebSocketTransport::new()) as Box<dyn TransportAdapter>)
//! });
//! let client = RemoteClient::new(engine, config);
//! client
//!     .connect(ConnectOptions::new().with_endpoint("ws://localhost:4000/rooms"))
//!     .await?;
//! ```

pub mod loopback;

#[cfg(feature = "transport-websocket")]
pub mod websocket;

pub use loopback::{loopback_pair, LoopbackServer, LoopbackTransport};

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
