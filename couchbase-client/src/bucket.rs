//! Buckets: named keyspace roots under a cluster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use serde_json::json;
use uuid::Uuid;

use couchbase_core::{CouchbaseError, KvRequest, OpCode, Result, Transcoder, DEFAULT_NAME};

use crate::cluster::ClientCore;
use crate::collection::Collection;
use crate::diagnostics::{
    DiagnosticsReport, EndpointDiagnostics, EndpointPingReport, PingReport, PingState,
};
use crate::management::collections::CollectionManager;
use crate::scope::Scope;

pub(crate) struct BucketInner {
    name: String,
    core: Arc<ClientCore>,
    transcoder: StdMutex<Option<Transcoder>>,
    scopes: StdMutex<HashMap<String, Scope>>,
}

impl BucketInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn core(&self) -> &Arc<ClientCore> {
        &self.core
    }

    /// Resolves the bucket-level transcoder, falling back to the process
    /// default.
    pub(crate) fn transcoder(&self) -> Transcoder {
        if let Ok(slot) = self.transcoder.lock() {
            if let Some(transcoder) = slot.as_ref() {
                return transcoder.clone();
            }
        }
        self.core.transcoder.clone()
    }
}

/// A named bucket. Looked up lazily through
/// [`Cluster::bucket`](crate::Cluster::bucket) and cached for the life of
/// the process.
#[derive(Clone)]
pub struct Bucket {
    inner: Arc<BucketInner>,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl Bucket {
    pub(crate) fn new(name: String, core: Arc<ClientCore>) -> Self {
        Self {
            inner: Arc::new(BucketInner {
                name,
                core,
                transcoder: StdMutex::new(None),
                scopes: StdMutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the bucket name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns a scope handle, memoized per name.
    pub fn scope(&self, name: &str) -> Scope {
        if let Ok(scopes) = self.inner.scopes.lock() {
            if let Some(existing) = scopes.get(name) {
                return existing.clone();
            }
        }

        let scope = Scope::new(name.to_string(), Arc::clone(&self.inner));

        if let Ok(mut scopes) = self.inner.scopes.lock() {
            return scopes.entry(name.to_string()).or_insert(scope).clone();
        }
        scope
    }

    /// Returns the default scope.
    pub fn default_scope(&self) -> Scope {
        self.scope(DEFAULT_NAME)
    }

    /// Returns the default collection (`_default._default`).
    pub fn default_collection(&self) -> Collection {
        self.default_scope().collection(DEFAULT_NAME)
    }

    /// Installs a transcoder capability pair for every collection in this
    /// bucket that has no override of its own.
    pub fn set_transcoder(&self, transcoder: Transcoder) {
        if let Ok(mut slot) = self.inner.transcoder.lock() {
            *slot = Some(transcoder);
        }
    }

    /// Returns the collection management interface for this bucket.
    pub fn collections(&self) -> CollectionManager {
        CollectionManager::new(Arc::clone(&self.inner.core), self.inner.name.clone())
    }

    /// Actively probes the cluster, one round trip per pooled connection.
    pub async fn ping(&self, report_id: Option<String>) -> Result<PingReport> {
        let connections = self.inner.core.session.connections_snapshot().await;
        let mut endpoints = Vec::with_capacity(connections.len().max(1));

        let probes = connections.len().max(1);
        for index in 0..probes {
            let endpoint = connections
                .get(index)
                .map(|c| c.endpoint().to_string())
                .unwrap_or_else(|| "unknown".to_string());

            let request = KvRequest::cluster_level(OpCode::Ping, json!({}));
            let started = Instant::now();
            let report = match self.inner.core.dispatcher.execute(request).await {
                Ok(_) => EndpointPingReport {
                    endpoint,
                    latency: Some(started.elapsed()),
                    state: PingState::Ok,
                },
                Err(CouchbaseError::Timeout(_)) => EndpointPingReport {
                    endpoint,
                    latency: None,
                    state: PingState::Timeout,
                },
                Err(_) => EndpointPingReport {
                    endpoint,
                    latency: None,
                    state: PingState::Error,
                },
            };
            endpoints.push(report);
        }

        Ok(PingReport {
            id: report_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            endpoints,
        })
    }

    /// Returns a passive snapshot of the connection pool.
    pub async fn diagnostics(&self, report_id: Option<String>) -> Result<DiagnosticsReport> {
        let connections = self.inner.core.session.connections_snapshot().await;
        Ok(DiagnosticsReport {
            id: report_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            connections: connections
                .iter()
                .map(|c| EndpointDiagnostics {
                    connection_id: c.id().to_string(),
                    endpoint: c.endpoint().to_string(),
                    last_activity: c.idle_for(),
                    in_flight: c.in_flight(),
                })
                .collect(),
        })
    }
}
