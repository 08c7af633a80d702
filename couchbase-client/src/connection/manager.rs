//! Transport session: connection pool management and lifecycle handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::{interval, timeout};

use couchbase_core::{CouchbaseError, KvRequest, KvResponse, Result};

use super::connection::{Connection, ConnectionId};
use crate::config::ClusterOptions;
use crate::transport::{Connector, Endpoint};

/// Events emitted during connection lifecycle.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Successfully connected to a cluster node.
    Connected {
        /// The connection identifier.
        id: ConnectionId,
        /// The node address.
        endpoint: Endpoint,
    },
    /// Lost a connection to a cluster node.
    Disconnected {
        /// The connection identifier.
        id: ConnectionId,
        /// The node address.
        endpoint: Endpoint,
        /// The error that caused disconnection, if any.
        error: Option<String>,
    },
    /// Closed a connection that sat idle beyond the configured interval.
    IdleClosed {
        /// The connection identifier.
        id: ConnectionId,
        /// The node address.
        endpoint: Endpoint,
        /// How long the connection was idle.
        idle_for: Duration,
    },
    /// Attempting to reconnect to a cluster node.
    ReconnectAttempt {
        /// The node address.
        endpoint: Endpoint,
        /// The current attempt number.
        attempt: u32,
        /// The delay before the next attempt.
        next_delay: Duration,
    },
    /// Gave up reconnecting after exhausting the retry budget.
    ReconnectFailed {
        /// The node address.
        endpoint: Endpoint,
        /// The error from the last attempt.
        error: String,
    },
}

/// Calculates the next backoff duration with jitter applied.
fn backoff_with_jitter(
    current_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
    jitter: f64,
) -> Duration {
    let base_backoff = current_backoff.as_secs_f64() * multiplier;

    let jitter_factor = if jitter > 0.0 {
        let mut rng = rand::thread_rng();
        1.0 + rng.gen_range(-jitter..=jitter)
    } else {
        1.0
    };

    std::cmp::min(
        Duration::from_secs_f64(base_backoff * jitter_factor),
        max_backoff,
    )
}

/// Owns the pool of connections to cluster nodes and multiplexes many
/// concurrent logical operations over it.
///
/// Responses from every connection are funneled into a single channel the
/// dispatcher drains; the session itself never interprets them.
#[derive(Debug)]
pub struct TransportSession {
    options: Arc<ClusterOptions>,
    connector: Arc<dyn Connector>,
    endpoints: Vec<Endpoint>,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    response_tx: mpsc::UnboundedSender<(ConnectionId, KvResponse)>,
    response_rx: StdMutex<Option<mpsc::UnboundedReceiver<(ConnectionId, KvResponse)>>>,
    event_sender: broadcast::Sender<ConnectionEvent>,
    shutdown: watch::Sender<bool>,
    next_endpoint: AtomicUsize,
    me: Weak<TransportSession>,
}

impl TransportSession {
    /// Creates a session for the given endpoints. No connections are opened
    /// until [`start`](Self::start).
    pub fn new(
        options: Arc<ClusterOptions>,
        connector: Arc<dyn Connector>,
        endpoints: Vec<Endpoint>,
    ) -> Arc<Self> {
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (event_sender, _) = broadcast::channel(64);
        let (shutdown, _) = watch::channel(false);

        Arc::new_cyclic(|me| Self {
            options,
            connector,
            endpoints,
            connections: RwLock::new(HashMap::new()),
            response_tx,
            response_rx: StdMutex::new(Some(response_rx)),
            event_sender,
            shutdown,
            next_endpoint: AtomicUsize::new(0),
            me: me.clone(),
        })
    }

    /// Subscribes to connection lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_sender.subscribe()
    }

    /// Hands the response channel to the dispatcher. Can only be taken once.
    pub fn take_responses(&self) -> Option<mpsc::UnboundedReceiver<(ConnectionId, KvResponse)>> {
        self.response_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Returns a receiver that observes session shutdown.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Establishes initial connections and starts the idle sweep.
    pub async fn start(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(CouchbaseError::InvalidConfiguration(
                "no endpoints configured".to_string(),
            ));
        }

        let mut last_error = None;
        for endpoint in self.endpoints.clone() {
            if let Err(e) = self.connect_to(&endpoint).await {
                tracing::warn!(endpoint = %endpoint, error = %e, "failed initial connection");
                last_error = Some(e);
            }
        }

        if self.connections.read().await.is_empty() {
            tracing::error!("failed to establish any connections to cluster");
            // Surface the most specific failure (auth rejection over a
            // generic connect error) rather than flattening it.
            return Err(last_error.unwrap_or_else(|| {
                CouchbaseError::Network("failed to establish any connections".to_string())
            }));
        }

        self.spawn_idle_sweep();
        Ok(())
    }

    /// Establishes a connection to the specified endpoint.
    pub async fn connect_to(&self, endpoint: &Endpoint) -> Result<ConnectionId> {
        let connect_timeout = self.options.timeouts().connect();
        tracing::debug!(endpoint = %endpoint, timeout = ?connect_timeout, "attempting connection");

        let transport = timeout(
            connect_timeout,
            self.connector
                .connect(endpoint, self.options.credentials()),
        )
        .await
        .map_err(|_| {
            CouchbaseError::Timeout(format!(
                "connection to {endpoint} timed out after {connect_timeout:?}"
            ))
        })??;

        let connection = Arc::new(Connection::new(endpoint.clone(), transport));
        let id = connection.id();

        self.connections
            .write()
            .await
            .insert(id, Arc::clone(&connection));
        self.spawn_receive_loop(connection);

        let _ = self.event_sender.send(ConnectionEvent::Connected {
            id,
            endpoint: endpoint.clone(),
        });
        tracing::info!(id = %id, endpoint = %endpoint, "connected to cluster node");

        Ok(id)
    }

    /// Reconnects to an endpoint with exponential backoff and jitter.
    pub async fn reconnect(&self, endpoint: &Endpoint) -> Result<ConnectionId> {
        let retry = self.options.retry();
        let mut current_backoff = retry.initial_backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if attempt > retry.max_reconnects() {
                let error = format!(
                    "gave up reconnecting to {endpoint} after {} attempts",
                    retry.max_reconnects()
                );
                let _ = self.event_sender.send(ConnectionEvent::ReconnectFailed {
                    endpoint: endpoint.clone(),
                    error: error.clone(),
                });
                return Err(CouchbaseError::Network(error));
            }

            match self.connect_to(endpoint).await {
                Ok(id) => return Ok(id),
                Err(e) => {
                    if *self.shutdown.borrow() {
                        return Err(e);
                    }
                    let next_delay = backoff_with_jitter(
                        current_backoff,
                        retry.multiplier(),
                        retry.max_backoff(),
                        retry.jitter(),
                    );
                    let _ = self.event_sender.send(ConnectionEvent::ReconnectAttempt {
                        endpoint: endpoint.clone(),
                        attempt,
                        next_delay,
                    });
                    tracing::debug!(
                        endpoint = %endpoint,
                        attempt,
                        delay = ?next_delay,
                        error = %e,
                        "reconnect attempt failed"
                    );
                    tokio::time::sleep(next_delay).await;
                    current_backoff = next_delay;
                }
            }
        }
    }

    /// Submits a request on one of the pooled connections.
    ///
    /// Reopens a connection first when the idle sweep emptied the pool.
    pub async fn send(&self, request: KvRequest) -> Result<ConnectionId> {
        let connection = match self.pick_connection().await {
            Some(connection) => connection,
            None => {
                self.ensure_connected().await?;
                self.pick_connection().await.ok_or_else(|| {
                    CouchbaseError::Network("no connections available".to_string())
                })?
            }
        };

        let id = connection.id();
        connection.send(request).await?;
        Ok(id)
    }

    async fn pick_connection(&self) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        if connections.is_empty() {
            return None;
        }
        let index = self.next_endpoint.fetch_add(1, Ordering::Relaxed) % connections.len();
        connections.values().nth(index).cloned()
    }

    async fn ensure_connected(&self) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(CouchbaseError::Network("session is shut down".to_string()));
        }
        let mut last_error = None;
        for endpoint in self.endpoints.clone() {
            match self.connect_to(&endpoint).await {
                Ok(_) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| CouchbaseError::Network("no endpoints configured".to_string())))
    }

    /// Returns the number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns a snapshot of the pooled connections for diagnostics.
    pub async fn connections_snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    fn spawn_receive_loop(&self, connection: Arc<Connection>) {
        let Some(session) = self.me.upgrade() else {
            return;
        };
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let disconnect_error = loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break None;
                        }
                    }
                    received = connection.recv() => match received {
                        Ok(Some(response)) => {
                            let _ = session
                                .response_tx
                                .send((connection.id(), response));
                        }
                        Ok(None) => break None,
                        Err(e) => break Some(e.to_string()),
                    }
                }
            };

            if connection.is_closing() || *session.shutdown.borrow() {
                return;
            }

            let endpoint = connection.endpoint().clone();
            session
                .connections
                .write()
                .await
                .remove(&connection.id());
            let _ = session.event_sender.send(ConnectionEvent::Disconnected {
                id: connection.id(),
                endpoint: endpoint.clone(),
                error: disconnect_error.clone(),
            });
            tracing::warn!(
                id = %connection.id(),
                endpoint = %endpoint,
                error = ?disconnect_error,
                "connection lost"
            );

            let _ = session.reconnect(&endpoint).await;
        });
    }

    fn spawn_idle_sweep(&self) {
        let Some(session) = self.me.upgrade() else {
            return;
        };
        let mut shutdown_rx = self.shutdown.subscribe();
        let max_idle = self.options.pool().max_idle_time();
        let sweep_interval = self.options.pool().idle_sweep_interval();

        tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        session.sweep_idle(max_idle).await;
                    }
                }
            }
        });
    }

    /// Closes connections idle beyond `max_idle`, sparing any connection
    /// with requests still awaiting responses.
    pub async fn sweep_idle(&self, max_idle: Duration) {
        let expired: Vec<Arc<Connection>> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .filter(|c| c.in_flight() == 0 && c.idle_for() >= max_idle)
                .cloned()
                .collect()
        };

        if expired.is_empty() {
            return;
        }

        let mut connections = self.connections.write().await;
        for connection in &expired {
            // Re-check under the write lock; a request may have landed since.
            if connection.in_flight() != 0 || connection.idle_for() < max_idle {
                continue;
            }
            connection.mark_closing();
            connections.remove(&connection.id());
        }
        drop(connections);

        for connection in expired {
            if !connection.is_closing() {
                continue;
            }
            let idle_for = connection.idle_for();
            let _ = connection.close().await;
            let _ = self.event_sender.send(ConnectionEvent::IdleClosed {
                id: connection.id(),
                endpoint: connection.endpoint().clone(),
                idle_for,
            });
            tracing::debug!(
                id = %connection.id(),
                endpoint = %connection.endpoint(),
                idle = ?idle_for,
                "closed idle connection"
            );
        }
    }

    /// Shuts down the session and closes all connections.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown.send(true);

        let connections: Vec<Arc<Connection>> = {
            let mut map = self.connections.write().await;
            map.drain().map(|(_, c)| c).collect()
        };
        for connection in connections {
            let _ = connection.close().await;
        }

        tracing::info!("transport session shut down");
        Ok(())
    }
}
