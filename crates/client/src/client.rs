use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use wire::{StreamTransport, Transport, WebSocketTransport, WireCodec};

use crate::config::{BinaryRole, ClientConfig, Protocol};
use crate::connection::Connection;
use crate::error::ClientError;
use crate::events::EventReceiver;

enum State {
    /// Never connected.
    Idle,
    Connected(Arc<Connection>),
    /// Disconnected by the caller. The connection is kept so a concurrent
    /// `disconnect` can wait for the same shutdown.
    Closed(Arc<Connection>),
}

struct Inner {
    config: ClientConfig,
    state: Mutex<State>,
}

/// Client for a running Godot instance.
///
/// Cheap to clone; clones share one connection. Any number of tasks may
/// issue calls concurrently. Responses may arrive in any order and each is
/// handed to the call that made the matching request. Nothing orders the
/// effects of concurrent calls on the remote side; await a call before
/// issuing one that depends on it.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::Idle),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The address this client connects to, e.g. `ws://localhost:9999`.
    pub fn url(&self) -> String {
        self.inner.config.url()
    }

    /// Whether a live connection is established.
    pub fn is_connected(&self) -> bool {
        match &*self.state() {
            State::Connected(connection) => connection.is_open(),
            State::Idle | State::Closed(_) => false,
        }
    }

    /// Number of calls awaiting a response.
    pub fn pending_requests(&self) -> usize {
        match &*self.state() {
            State::Connected(connection) => connection.pending_requests(),
            State::Idle | State::Closed(_) => 0,
        }
    }

    /// Open the transport described by the configuration and start the
    /// connection.
    ///
    /// Calling this while a live connection exists does nothing. After a
    /// disconnect, or after the remote side went away, it opens a fresh
    /// connection.
    #[tracing::instrument(skip(self), fields(url = %self.url()))]
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            tracing::debug!("already connected");
            return Ok(());
        }

        let config = &self.inner.config;
        let url = config.url();
        let addr = format!("{}:{}", config.host, config.port());

        match (config.protocol, config.binary_role) {
            (Protocol::Text, _) => {
                let transport = WebSocketTransport::connect(&url, config.connect_timeout)
                    .await
                    .map_err(|e| ClientError::connect_failed(&url, e))?;
                self.connect_with(transport);
            }
            (Protocol::Binary, BinaryRole::Connect) => {
                let transport = StreamTransport::connect(addr, config.connect_timeout)
                    .await
                    .map_err(|e| ClientError::connect_failed(&url, e))?
                    .with_max_frame_size(config.max_frame_size);
                self.connect_with(transport);
            }
            (Protocol::Binary, BinaryRole::Listen) => {
                tracing::info!(%addr, "waiting for Godot to connect");
                let transport = StreamTransport::listen(addr, config.connect_timeout)
                    .await
                    .map_err(|e| ClientError::connect_failed(&url, e))?
                    .with_max_frame_size(config.max_frame_size);
                self.connect_with(transport);
            }
        }

        tracing::info!("connected");
        Ok(())
    }

    /// Start a connection over an already established transport.
    ///
    /// The payload codec is chosen by the configured protocol. Any previous
    /// connection is dropped, which stops its tasks.
    pub fn connect_with(&self, transport: impl Transport) {
        let codec = match self.inner.config.protocol {
            Protocol::Text => WireCodec::json_rpc(),
            Protocol::Binary => WireCodec::variant(),
        };
        let connection = Arc::new(Connection::start(transport, codec));
        *self.state() = State::Connected(connection);
    }

    /// Close the connection.
    ///
    /// Every pending call fails with a connection-closed error. Returns once
    /// the background tasks have stopped, so no response can be delivered
    /// afterwards. Calling it again, or without ever connecting, is fine.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self) {
        let connection = {
            let mut state = self.state();
            match &*state {
                State::Idle => return,
                State::Connected(connection) => {
                    let connection = Arc::clone(connection);
                    *state = State::Closed(Arc::clone(&connection));
                    connection
                }
                State::Closed(connection) => Arc::clone(connection),
            }
        };

        connection.shutdown().await;
        tracing::info!("disconnected");
    }

    fn connection(&self) -> Result<Arc<Connection>, ClientError> {
        match &*self.state() {
            State::Connected(connection) => Ok(Arc::clone(connection)),
            State::Closed(_) => Err(ClientError::ConnectionClosed {
                reason: "client disconnected".to_string(),
            }),
            State::Idle => Err(ClientError::NotConnected),
        }
    }

    /// Call `method` and wait up to `timeout` for its result.
    #[tracing::instrument(skip(self, params), level = "debug")]
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let connection = self.connection()?;
        connection.send(method, params, timeout).await
    }

    /// Call `method` with the configured request timeout.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        self.send(method, params, self.inner.config.request_timeout)
            .await
    }

    /// Subscribe to notifications called `name`.
    ///
    /// The subscription ends when the current connection closes.
    pub fn subscribe(&self, name: &str) -> Result<EventReceiver, ClientError> {
        Ok(self.connection()?.subscribe(name))
    }

    /// Subscribe to every notification.
    pub fn subscribe_all(&self) -> Result<EventReceiver, ClientError> {
        Ok(self.connection()?.subscribe_all())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url())
            .field("connected", &self.is_connected())
            .finish()
    }
}
