//! A single pooled connection to a cluster node.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use couchbase_core::{KvRequest, KvResponse, Result};

use crate::transport::{Endpoint, Transport};

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A pooled connection wrapping one transport channel.
///
/// Tracks the bookkeeping the pool needs: when the connection last carried
/// traffic, and how many requests are currently outstanding on it. The idle
/// sweep relies on both.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    transport: Box<dyn Transport>,
    created_at: Instant,
    last_activity: Mutex<Instant>,
    in_flight: AtomicUsize,
    closing: AtomicBool,
}

impl Connection {
    /// Wraps an established transport channel.
    pub fn new(endpoint: Endpoint, transport: Box<dyn Transport>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            endpoint,
            transport,
            created_at: now,
            last_activity: Mutex::new(now),
            in_flight: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
        }
    }

    /// Returns the connection's unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the node this connection reaches.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns when this connection was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns how long the connection has carried no traffic.
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or_default()
    }

    /// Returns the number of requests awaiting a response on this connection.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            *at = Instant::now();
        }
    }

    /// Sends a request, counting it as in-flight until a response arrives.
    pub async fn send(&self, request: KvRequest) -> Result<()> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.touch();
        match self.transport.send(request).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    /// Receives the next response, retiring one in-flight request.
    ///
    /// Returns `None` when the transport closes cleanly.
    pub async fn recv(&self) -> Result<Option<KvResponse>> {
        let response = self.transport.recv().await?;
        if response.is_some() {
            self.touch();
            // Responses the client never asked for (unsolicited server
            // traffic) must not underflow the counter.
            let _ = self
                .in_flight
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
        Ok(response)
    }

    /// Marks this connection as deliberately closing, so its receive loop
    /// exits without triggering a reconnect.
    pub fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    /// Returns true if the connection is being closed deliberately.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Closes the underlying transport.
    pub async fn close(&self) -> Result<()> {
        self.mark_closing();
        let result = self.transport.close().await;
        tracing::debug!(id = %self.id, endpoint = %self.endpoint, "connection closed");
        result
    }
}
