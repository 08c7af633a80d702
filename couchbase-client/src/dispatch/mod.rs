//! Operation dispatch: pending-request tracking, deadlines, and the
//! durability gate.

pub mod mapper;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::time::timeout;

use couchbase_core::{CouchbaseError, KvRequest, KvResponse, OpCode, Result};

use crate::config::ClusterOptions;
use crate::connection::{ConnectionId, TransportSession};

/// How long a timed-out correlation id is remembered so that a late
/// response is discarded instead of resurrecting a resolved caller.
const EXPIRED_RETENTION: Duration = Duration::from_secs(10);

/// Converts high-level operations into transport requests and resolves
/// callers when the matching response arrives or the deadline passes.
///
/// Safe for concurrent invocation from any number of tasks. The response
/// loop only moves completed responses into waiting oneshot channels and
/// never blocks on caller work.
#[derive(Debug)]
pub struct Dispatcher {
    session: Arc<TransportSession>,
    options: Arc<ClusterOptions>,
    pending: StdMutex<HashMap<u64, oneshot::Sender<KvResponse>>>,
    expired: StdMutex<HashMap<u64, Instant>>,
    durability_gates: StdMutex<HashMap<String, Weak<AsyncMutex<()>>>>,
    me: Weak<Dispatcher>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given session.
    pub fn new(session: Arc<TransportSession>, options: Arc<ClusterOptions>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            session,
            options,
            pending: StdMutex::new(HashMap::new()),
            expired: StdMutex::new(HashMap::new()),
            durability_gates: StdMutex::new(HashMap::new()),
            me: me.clone(),
        })
    }

    /// Starts the response-processing loop.
    ///
    /// # Errors
    ///
    /// Returns a bindings error if called twice; the session's response
    /// channel can only be drained by one loop.
    pub fn start(&self) -> Result<()> {
        let receiver = self.session.take_responses().ok_or_else(|| {
            CouchbaseError::Bindings("dispatcher already started".to_string())
        })?;
        self.spawn_response_loop(receiver);
        Ok(())
    }

    /// Executes one operation: submits it to the session and suspends the
    /// caller until the response arrives or the deadline elapses.
    pub async fn execute(&self, request: KvRequest) -> Result<KvResponse> {
        let deadline = request
            .timeout
            .unwrap_or_else(|| self.default_deadline(request.opcode));

        // At most one outstanding durability wait per mutation id.
        let _durability_guard = match request.mutation_id() {
            Some(mutation_id) if request.durability.is_durable() => {
                Some(self.durability_gate(mutation_id).lock_owned().await)
            }
            _ => None,
        };

        let correlation_id = request.correlation_id;
        let opcode = request.opcode;
        let (tx, rx) = oneshot::channel();

        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(correlation_id, tx);

        if let Err(e) = self.session.send(request).await {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&correlation_id);
            return Err(e);
        }

        match timeout(deadline, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CouchbaseError::Network(
                "connection closed before a response arrived".to_string(),
            )),
            Err(_) => {
                let removed = self
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&correlation_id);
                if removed.is_some() {
                    self.expired
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(correlation_id, Instant::now());
                }
                tracing::debug!(
                    correlation_id,
                    opcode = ?opcode,
                    deadline = ?deadline,
                    "operation deadline elapsed"
                );
                Err(CouchbaseError::Timeout(format!(
                    "{opcode:?} did not complete within {deadline:?}"
                )))
            }
        }
    }

    fn default_deadline(&self, opcode: OpCode) -> Duration {
        let timeouts = self.options.timeouts();
        match opcode {
            OpCode::Query | OpCode::AnalyticsQuery | OpCode::SearchQuery => timeouts.query(),
            OpCode::Admin => timeouts.management(),
            _ => timeouts.key_value(),
        }
    }

    fn durability_gate(&self, mutation_id: String) -> Arc<AsyncMutex<()>> {
        let mut gates = self
            .durability_gates
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if gates.len() > 64 {
            gates.retain(|_, weak| weak.strong_count() > 0);
        }
        if let Some(gate) = gates.get(&mutation_id).and_then(Weak::upgrade) {
            return gate;
        }
        let gate = Arc::new(AsyncMutex::new(()));
        gates.insert(mutation_id, Arc::downgrade(&gate));
        gate
    }

    fn spawn_response_loop(
        &self,
        mut receiver: mpsc::UnboundedReceiver<(ConnectionId, KvResponse)>,
    ) {
        let dispatcher = self.me.clone();
        let mut shutdown_rx = self.session.shutdown_receiver();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    received = receiver.recv() => {
                        let (connection, response) = match received {
                            Some(pair) => pair,
                            None => break,
                        };
                        let Some(dispatcher) = dispatcher.upgrade() else {
                            break;
                        };
                        dispatcher.handle_response(connection, response);
                    }
                }
            }
        });
    }

    fn handle_response(&self, connection: ConnectionId, response: KvResponse) {
        let correlation_id = response.correlation_id;

        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&correlation_id);

        match sender {
            Some(tx) => {
                // A caller that stopped listening (dropped future) is fine.
                let _ = tx.send(response);
            }
            None => {
                let mut expired = self.expired.lock().unwrap_or_else(|e| e.into_inner());
                if expired.remove(&correlation_id).is_some() {
                    tracing::debug!(
                        correlation_id,
                        connection = %connection,
                        "discarded late response for timed-out operation"
                    );
                } else {
                    tracing::warn!(
                        correlation_id,
                        connection = %connection,
                        "response for unknown correlation id"
                    );
                }
                expired.retain(|_, seen| seen.elapsed() < EXPIRED_RETENTION);
            }
        }
    }

    /// Returns the number of requests currently awaiting responses.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}
