//! MCP connection pool for configured servers.
//!
//! Holds at most one connection per server name. A connection is created on first
//! use; callers that arrive while it is being established wait on the same shared
//! attempt instead of starting their own. Records move through
//! `Connecting -> Connected -> Closed -> Reconnecting -> Connected | Closed`, and
//! only pool methods change them.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{
    future::{join_all, BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    client::{Connector, ProviderClient, RmcpConnector},
    config::{McpHubConfig, McpServerConfig},
    metrics::McpMetrics,
    reconnect::ReconnectionPolicy,
};
use crate::error::{McpError, McpResult};

/// Shared handle to a live downstream client.
pub type ClientHandle = Arc<dyn ProviderClient>;

type PendingAttempt = Shared<BoxFuture<'static, McpResult<ClientHandle>>>;

/// Client replaced by a reconnect. Whoever takes it out closes it.
type Retiring = Arc<Mutex<Option<ClientHandle>>>;

/// A connect attempt that has not settled yet.
struct InFlight {
    attempt: PendingAttempt,
    cancel: CancellationToken,
    retiring: Option<Retiring>,
}

enum ConnectionState {
    Connecting(InFlight),
    Connected(ClientHandle),
    Reconnecting(InFlight),
    Closed,
}

/// Lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    fn status(&self) -> ConnectionStatus {
        match self {
            ConnectionState::Connecting(_) => ConnectionStatus::Connecting,
            ConnectionState::Connected(_) => ConnectionStatus::Connected,
            ConnectionState::Reconnecting(_) => ConnectionStatus::Reconnecting,
            ConnectionState::Closed => ConnectionStatus::Closed,
        }
    }
}

struct Connection {
    // Identifies the attempt allowed to settle this record.
    generation: u64,
    state: ConnectionState,
    reconnect_attempts: u32,
}

impl Connection {
    fn holds(&self, client: &ClientHandle) -> bool {
        matches!(&self.state, ConnectionState::Connected(c) if Arc::ptr_eq(c, client))
    }
}

#[derive(Default)]
struct PoolState {
    connections: HashMap<String, Connection>,
    closing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    Initial,
    Reconnect,
}

enum AcquireAction {
    Ready(ClientHandle),
    Wait(PendingAttempt),
}

struct PoolInner {
    servers: BTreeMap<String, McpServerConfig>,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    policy: ReconnectionPolicy,
    connect_timeout: Option<Duration>,
    next_generation: AtomicU64,
    metrics: Arc<McpMetrics>,
}

/// Thread-safe pool of one connection per configured MCP server.
#[derive(Clone)]
pub struct McpConnectionPool {
    inner: Arc<PoolInner>,
}

impl McpConnectionPool {
    /// Pool that connects through rmcp.
    pub fn new(config: &McpHubConfig) -> Self {
        Self::with_connector(config, Arc::new(RmcpConnector))
    }

    pub fn with_connector(config: &McpHubConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                servers: config.servers.clone(),
                connector,
                state: Mutex::new(PoolState::default()),
                policy: ReconnectionPolicy::from_config(&config.pool),
                connect_timeout: config.pool.connect_timeout(),
                next_generation: AtomicU64::new(1),
                metrics: Arc::new(McpMetrics::new()),
            }),
        }
    }

    /// Get the live client for `server_name`, connecting if needed.
    pub async fn acquire(&self, server_name: &str) -> McpResult<ClientHandle> {
        let config = self.inner.server_config(server_name)?;

        let action = {
            let mut state = self.inner.state.lock();
            match state.connections.get(server_name).map(|c| &c.state) {
                Some(ConnectionState::Connected(client)) => {
                    AcquireAction::Ready(Arc::clone(client))
                }
                Some(ConnectionState::Connecting(in_flight))
                | Some(ConnectionState::Reconnecting(in_flight)) => {
                    AcquireAction::Wait(in_flight.attempt.clone())
                }
                Some(ConnectionState::Closed) | None => {
                    if state.closing {
                        return Err(McpError::PoolClosing(server_name.to_string()));
                    }
                    // Publish the attempt before the lock is released so concurrent
                    // callers join it rather than racing a second connect.
                    let generation = self.inner.next_generation();
                    let in_flight = self.inner.start_attempt(
                        config,
                        generation,
                        AttemptKind::Initial,
                        None,
                        Duration::ZERO,
                    );
                    let attempt = in_flight.attempt.clone();
                    state.connections.insert(
                        server_name.to_string(),
                        Connection {
                            generation,
                            state: ConnectionState::Connecting(in_flight),
                            reconnect_attempts: 0,
                        },
                    );
                    debug!(server = %server_name, "Started MCP connection attempt");
                    AcquireAction::Wait(attempt)
                }
            }
        };

        match action {
            AcquireAction::Ready(client) => Ok(client),
            AcquireAction::Wait(attempt) => attempt.await,
        }
    }

    /// Replace the connection for `server_name` after a backoff delay.
    ///
    /// No-op when the server has no record, which includes every server once
    /// [`close_all`](Self::close_all) has drained the pool. A record that survives
    /// into shutdown fails with [`McpError::PoolClosing`]. Fails with
    /// [`McpError::MaxReconnectAttemptsReached`] once the attempt budget is spent,
    /// without touching the network. A failed attempt leaves the record closed.
    pub async fn reconnect(&self, server_name: &str) -> McpResult<()> {
        let Some(config) = self.inner.servers.get(server_name).cloned() else {
            return Ok(());
        };

        let attempt = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let Some(conn) = state.connections.get_mut(server_name) else {
                return Ok(());
            };
            if state.closing {
                return Err(McpError::PoolClosing(server_name.to_string()));
            }

            let in_flight = match &conn.state {
                ConnectionState::Connecting(in_flight)
                | ConnectionState::Reconnecting(in_flight) => Some(in_flight.attempt.clone()),
                ConnectionState::Connected(_) | ConnectionState::Closed => None,
            };

            match in_flight {
                Some(attempt) => {
                    debug!(server = %server_name, "Reconnect joined in-flight attempt");
                    attempt
                }
                None => {
                    if self.inner.policy.is_exhausted(conn.reconnect_attempts) {
                        warn!(
                            server = %server_name,
                            attempts = conn.reconnect_attempts,
                            "Reconnect budget exhausted"
                        );
                        return Err(McpError::MaxReconnectAttemptsReached {
                            server: server_name.to_string(),
                            attempts: conn.reconnect_attempts,
                        });
                    }

                    conn.reconnect_attempts += 1;
                    let attempt_number = conn.reconnect_attempts;
                    let delay = self.inner.policy.calculate_backoff(attempt_number);
                    let retiring = match std::mem::replace(&mut conn.state, ConnectionState::Closed)
                    {
                        ConnectionState::Connected(client) => {
                            Some(Arc::new(Mutex::new(Some(client))))
                        }
                        _ => None,
                    };

                    let generation = self.inner.next_generation();
                    let in_flight = self.inner.start_attempt(
                        config,
                        generation,
                        AttemptKind::Reconnect,
                        retiring,
                        delay,
                    );
                    let attempt = in_flight.attempt.clone();
                    conn.generation = generation;
                    conn.state = ConnectionState::Reconnecting(in_flight);

                    self.inner.metrics.record_reconnect_attempt();
                    info!(
                        server = %server_name,
                        attempt = attempt_number,
                        max_attempts = self.inner.policy.max_attempts,
                        delay = ?delay,
                        "Reconnecting to MCP server"
                    );
                    attempt
                }
            }
        };

        attempt.await.map(|_| ())
    }

    /// Close and forget the connection for `server_name`. Idempotent.
    ///
    /// An attempt still in flight is cancelled, and this returns only after any
    /// client it produced has been closed.
    pub async fn close(&self, server_name: &str) {
        let removed = self.inner.state.lock().connections.remove(server_name);
        if let Some(conn) = removed {
            self.inner.close_connection(server_name, conn).await;
        }
    }

    /// Refuse new connections and close every existing one. Idempotent.
    ///
    /// On return every client the pool ever handed out or was still connecting
    /// has been closed.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Connection)> = {
            let mut state = self.inner.state.lock();
            state.closing = true;
            state.connections.drain().collect()
        };

        if drained.is_empty() {
            return;
        }

        info!(count = drained.len(), "Closing all MCP connections");
        join_all(
            drained
                .into_iter()
                .map(|(name, conn)| async move { self.inner.close_connection(&name, conn).await }),
        )
        .await;
    }

    /// Report that `client` lost its transport.
    ///
    /// The record moves to `Closed` only if it still holds that same client, so a
    /// late report cannot retire a newer connection.
    pub async fn mark_closed(&self, server_name: &str, client: &ClientHandle) {
        let retired = {
            let mut state = self.inner.state.lock();
            match state.connections.get_mut(server_name) {
                Some(conn) if conn.holds(client) => {
                    conn.state = ConnectionState::Closed;
                    true
                }
                _ => false,
            }
        };

        if retired {
            warn!(server = %server_name, "MCP connection lost, marked closed");
            client.close().await;
            self.inner.metrics.record_connection_closed();
        }
    }

    pub fn status(&self, server_name: &str) -> Option<ConnectionStatus> {
        self.inner
            .state
            .lock()
            .connections
            .get(server_name)
            .map(|c| c.state.status())
    }

    pub fn reconnect_attempts(&self, server_name: &str) -> Option<u32> {
        self.inner
            .state
            .lock()
            .connections
            .get(server_name)
            .map(|c| c.reconnect_attempts)
    }

    /// Configured server names, sorted.
    pub fn server_names(&self) -> Vec<String> {
        self.inner.servers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().connections.is_empty()
    }

    pub fn is_closing(&self) -> bool {
        self.inner.state.lock().closing
    }

    pub fn metrics(&self) -> Arc<McpMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            configured_servers: self.inner.servers.len(),
            connections: state.connections.len(),
            connected: state
                .connections
                .values()
                .filter(|c| matches!(c.state, ConnectionState::Connected(_)))
                .count(),
        }
    }
}

impl PoolInner {
    fn server_config(&self, server_name: &str) -> McpResult<McpServerConfig> {
        self.servers
            .get(server_name)
            .cloned()
            .ok_or_else(|| McpError::server_not_found(server_name, self.servers.keys()))
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawn a connect attempt and return the shared handle waiters await.
    ///
    /// The attempt runs as its own task so it settles the record even if every
    /// waiter goes away. Cancelling stops the backoff or the connect itself, but
    /// never interrupts settling.
    fn start_attempt(
        self: &Arc<Self>,
        config: McpServerConfig,
        generation: u64,
        kind: AttemptKind,
        retiring: Option<Retiring>,
        delay: Duration,
    ) -> InFlight {
        let server_name = config.name.clone();
        let cancel = CancellationToken::new();
        let inner = Arc::clone(self);
        let task = tokio::spawn({
            let cancel = cancel.clone();
            let retiring = retiring.clone();
            async move {
                let run = async {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if let Some(retiring) = &retiring {
                        inner.retire(&config.name, retiring).await;
                    }
                    inner.connect(&config).await
                };
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(McpError::ConnectionClosed(config.name.clone())),
                    result = run => result,
                };
                inner.settle(&config.name, generation, kind, result).await
            }
        });

        let inner = Arc::clone(self);
        let attempt = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let err = McpError::ConnectionFailed(format!(
                        "connect task for '{}' aborted: {}",
                        server_name, e
                    ));
                    inner.settle(&server_name, generation, kind, Err(err)).await
                }
            }
        }
        .boxed()
        .shared();

        InFlight {
            attempt,
            cancel,
            retiring,
        }
    }

    /// Close the client a reconnect replaced, unless someone already did.
    async fn retire(&self, server_name: &str, retiring: &Retiring) {
        let client = retiring.lock().take();
        if let Some(client) = client {
            client.close().await;
            self.metrics.record_connection_closed();
            debug!(server = %server_name, "Closed replaced MCP connection");
        }
    }

    async fn connect(&self, config: &McpServerConfig) -> McpResult<ClientHandle> {
        self.metrics.record_connect_attempt();

        let connecting = self.connector.connect(config);
        let result = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connecting)
                .await
                .unwrap_or_else(|_| {
                    Err(McpError::ConnectTimeout {
                        server: config.name.clone(),
                        timeout,
                    })
                }),
            None => connecting.await,
        };

        if result.is_err() {
            self.metrics.record_connect_failure();
        }
        result
    }

    /// Apply the outcome of an attempt to its record, if the record still exists.
    async fn settle(
        &self,
        server_name: &str,
        generation: u64,
        kind: AttemptKind,
        result: McpResult<ClientHandle>,
    ) -> McpResult<ClientHandle> {
        let is_current = {
            let mut state = self.state.lock();
            let is_current = state
                .connections
                .get(server_name)
                .is_some_and(|c| c.generation == generation);

            if is_current {
                match (&result, kind) {
                    (Ok(client), _) => {
                        if let Some(conn) = state.connections.get_mut(server_name) {
                            conn.state = ConnectionState::Connected(Arc::clone(client));
                            conn.reconnect_attempts = 0;
                        }
                    }
                    (Err(_), AttemptKind::Initial) => {
                        state.connections.remove(server_name);
                    }
                    (Err(_), AttemptKind::Reconnect) => {
                        if let Some(conn) = state.connections.get_mut(server_name) {
                            conn.state = ConnectionState::Closed;
                        }
                    }
                }
            }
            is_current
        };

        match result {
            Ok(client) if is_current => {
                self.metrics.record_connection_opened();
                info!(
                    server = %server_name,
                    reconnect = (kind == AttemptKind::Reconnect),
                    "MCP connection ready"
                );
                Ok(client)
            }
            Ok(client) => {
                debug!(
                    server = %server_name,
                    "Connection closed while connecting, discarding client"
                );
                client.close().await;
                Err(McpError::ConnectionClosed(server_name.to_string()))
            }
            Err(e) if !is_current => {
                debug!(server = %server_name, error = %e, "Discarded MCP connection attempt");
                Err(e)
            }
            Err(e) => {
                warn!(
                    server = %server_name,
                    error = %e,
                    kind = ?kind,
                    "MCP connection attempt failed"
                );
                Err(e)
            }
        }
    }

    async fn close_connection(&self, server_name: &str, conn: Connection) {
        match conn.state {
            ConnectionState::Connected(client) => {
                client.close().await;
                self.metrics.record_connection_closed();
                info!(server = %server_name, "Closed MCP connection");
            }
            ConnectionState::Connecting(in_flight) | ConnectionState::Reconnecting(in_flight) => {
                in_flight.cancel.cancel();
                if let Some(retiring) = &in_flight.retiring {
                    self.retire(server_name, retiring).await;
                }
                // The record is gone, so a client the attempt already produced is
                // closed by `settle` before the attempt resolves.
                let _ = in_flight.attempt.await;
                debug!(server = %server_name, "Closed MCP connection while connecting");
            }
            ConnectionState::Closed => {}
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub configured_servers: usize,
    pub connections: usize,
    pub connected: usize,
}
