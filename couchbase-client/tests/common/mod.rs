//! Common test utilities: an in-memory cluster node implementing the
//! transport seam, with fault injection for timeout and overload scenarios.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use couchbase_client::config::Credentials;
use couchbase_client::transport::{Connector, Endpoint, Transport};
use couchbase_client::{Cluster, ClusterOptions};
use couchbase_core::protocol::{Status, SubdocField, SubdocOp, SubdocSpec};
use couchbase_core::transcoder::{
    decode_document, make_flags, COMPRESSION_NONE, FORMAT_JSON,
};
use couchbase_core::{
    Cas, CouchbaseError, DecoderConfig, ErrorContext, KvRequest, KvResponse, MutationToken,
    OpCode, Result, StoreSemantics,
};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Returns a process-unique name with the given prefix.
pub fn unique_key(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

/// Fault injection knobs shared with the node.
#[derive(Debug, Default)]
pub struct Behavior {
    drop_responses: AtomicUsize,
    delay_ms: AtomicU64,
    fail_status: Mutex<Option<Status>>,
}

impl Behavior {
    /// Swallows the next `n` responses entirely (requests still apply).
    pub fn drop_next_responses(&self, n: usize) {
        self.drop_responses.store(n, Ordering::SeqCst);
    }

    /// Delays every response by `delay` until cleared.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Clears the response delay.
    pub fn clear_delay(&self) {
        self.delay_ms.store(0, Ordering::SeqCst);
    }

    /// Fails the next request with the given status.
    pub fn fail_next(&self, status: Status) {
        if let Ok(mut slot) = self.fail_status.lock() {
            *slot = Some(status);
        }
    }

    fn take_drop(&self) -> bool {
        self.drop_responses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn delay(&self) -> Option<Duration> {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    fn take_fail(&self) -> Option<Status> {
        self.fail_status.lock().ok().and_then(|mut slot| slot.take())
    }
}

struct StoredDoc {
    value: Vec<u8>,
    flags: u32,
    cas: u64,
    expiry: Option<u32>,
    locked_until: Option<Instant>,
    lock_cas: u64,
}

impl StoredDoc {
    fn is_locked(&self) -> bool {
        self.locked_until.map(|t| t > Instant::now()).unwrap_or(false)
    }
}

#[derive(Clone, Debug)]
struct IndexRecord {
    name: String,
    is_primary: bool,
    fields: Vec<String>,
    condition: Option<String>,
    state: String,
}

struct BucketState {
    scopes: HashMap<String, HashSet<String>>,
    docs: HashMap<(String, String, String), StoredDoc>,
}

impl BucketState {
    fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(
            "_default".to_string(),
            HashSet::from(["_default".to_string()]),
        );
        Self {
            scopes,
            docs: HashMap::new(),
        }
    }
}

/// The shared node brain. Every transport created by the connector talks to
/// the same state, like connections to one cluster.
pub struct NodeState {
    username: String,
    password: String,
    buckets: Mutex<HashMap<String, BucketState>>,
    cas_counter: AtomicU64,
    partition_seqnos: Mutex<HashMap<(String, u16), u64>>,
    query_indexes: Mutex<HashMap<(String, String), IndexRecord>>,
    search_indexes: Mutex<HashMap<String, Value>>,
    users: Mutex<HashMap<String, Value>>,
    groups: Mutex<HashMap<String, Value>>,
    last_query_body: Mutex<Option<Value>>,
    durable_active: Mutex<HashMap<String, usize>>,
    durable_max: Mutex<HashMap<String, usize>>,
    request_counter: AtomicU64,
    /// The fault injection knobs.
    pub behavior: Behavior,
}

impl fmt::Debug for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeState").finish_non_exhaustive()
    }
}

/// An in-memory cluster of one node.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    state: Arc<NodeState>,
}

impl MemoryCluster {
    /// Creates a node with the `travel` and `default` buckets.
    pub fn new() -> Self {
        Self::with_buckets(&["travel", "default"])
    }

    /// Creates a node with the given buckets.
    pub fn with_buckets(names: &[&str]) -> Self {
        let mut buckets = HashMap::new();
        for name in names {
            buckets.insert((*name).to_string(), BucketState::new());
        }
        Self {
            state: Arc::new(NodeState {
                username: "Administrator".to_string(),
                password: "password".to_string(),
                buckets: Mutex::new(buckets),
                cas_counter: AtomicU64::new(1),
                partition_seqnos: Mutex::new(HashMap::new()),
                query_indexes: Mutex::new(HashMap::new()),
                search_indexes: Mutex::new(HashMap::new()),
                users: Mutex::new(HashMap::new()),
                groups: Mutex::new(HashMap::new()),
                last_query_body: Mutex::new(None),
                durable_active: Mutex::new(HashMap::new()),
                durable_max: Mutex::new(HashMap::new()),
                request_counter: AtomicU64::new(1),
                behavior: Behavior::default(),
            }),
        }
    }

    /// Returns a connector wired to this node.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            state: Arc::clone(&self.state),
        })
    }

    /// Returns the fault injection knobs.
    pub fn behavior(&self) -> &Behavior {
        &self.state.behavior
    }

    /// Returns the stored bytes and flags of a document in a bucket's
    /// default collection, exactly as the node holds them.
    pub fn raw_value(&self, bucket: &str, key: &str) -> Option<(Vec<u8>, u32)> {
        let buckets = self.state.buckets.lock().ok()?;
        let doc = buckets.get(bucket)?.docs.get(&(
            "_default".to_string(),
            "_default".to_string(),
            key.to_string(),
        ))?;
        Some((doc.value.clone(), doc.flags))
    }

    /// Returns the highest number of concurrently processed durable
    /// mutations observed for a mutation id (`keyspace/key`).
    pub fn max_concurrent_durable(&self, mutation_id: &str) -> usize {
        self.state
            .durable_max
            .lock()
            .ok()
            .and_then(|m| m.get(mutation_id).copied())
            .unwrap_or(0)
    }

    /// Returns the body of the last query request the node served.
    pub fn last_query_body(&self) -> Option<Value> {
        self.state.last_query_body.lock().ok().and_then(|b| b.clone())
    }
}

/// Builds cluster options wired to the node with default credentials.
pub fn default_options(node: &MemoryCluster) -> ClusterOptions {
    ClusterOptions::builder()
        .credentials("Administrator", "password")
        .connector(node.connector())
        .build()
        .expect("default test options")
}

/// Connects a client to the node.
pub async fn connect(node: &MemoryCluster) -> Cluster {
    Cluster::connect("couchbase://node1", default_options(node))
        .await
        .expect("connect to in-memory node")
}

#[derive(Debug)]
struct MemoryConnector {
    state: Arc<NodeState>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        _endpoint: &Endpoint,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Transport>> {
        if let Some(credentials) = credentials {
            if credentials.username() != self.state.username
                || credentials.password() != self.state.password
            {
                return Err(CouchbaseError::Authentication(format!(
                    "invalid credentials for user {:?}",
                    credentials.username()
                )));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        Ok(Box::new(MemoryTransport {
            state: Arc::clone(&self.state),
            tx,
            rx: AsyncMutex::new(rx),
            closed_tx,
            closed_rx,
        }))
    }
}

struct MemoryTransport {
    state: Arc<NodeState>,
    tx: mpsc::UnboundedSender<KvResponse>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<KvResponse>>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: KvRequest) -> Result<()> {
        if *self.closed_rx.borrow() {
            return Err(CouchbaseError::Network("transport closed".to_string()));
        }

        let durable_id = match request.mutation_id() {
            Some(id) if request.durability.is_durable() => {
                self.state.durable_begin(&id);
                Some(id)
            }
            _ => None,
        };

        let state = Arc::clone(&self.state);
        let tx = self.tx.clone();
        let delay = state.behavior.delay();
        let dropped = state.behavior.take_drop();

        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let response = state.handle(request);
            if let Some(id) = durable_id {
                state.durable_end(&id);
            }
            if !dropped {
                let _ = tx.send(response);
            }
        });

        Ok(())
    }

    async fn recv(&self) -> Result<Option<KvResponse>> {
        let mut closed_rx = self.closed_rx.clone();
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = closed_rx.changed() => Ok(None),
            message = rx.recv() => Ok(message),
        }
    }

    async fn close(&self) -> Result<()> {
        let _ = self.closed_tx.send(true);
        Ok(())
    }
}

fn failure(correlation_id: u64, status: Status, message: &str, detail: Value) -> KvResponse {
    let mut response = KvResponse::with_status(correlation_id, status);
    let mut merged = match detail {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    merged.insert("message".to_string(), json!(message));
    response.context = Some(ErrorContext {
        reference: Some(format!("ref-{correlation_id}")),
        detail: Some(Value::Object(merged)),
    });
    response
}

fn partition_of(key: &str) -> u16 {
    // Stand-in for the real vBucket hash; stable across the process.
    let mut hash: u32 = 2166136261;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(16777619);
    }
    (hash % 1024) as u16
}

impl NodeState {
    fn durable_begin(&self, id: &str) {
        let current = {
            let mut active = self.durable_active.lock().unwrap_or_else(|e| e.into_inner());
            let entry = active.entry(id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let mut max = self.durable_max.lock().unwrap_or_else(|e| e.into_inner());
        let entry = max.entry(id.to_string()).or_insert(0);
        if current > *entry {
            *entry = current;
        }
    }

    fn durable_end(&self, id: &str) {
        let mut active = self.durable_active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = active.get_mut(id) {
            *entry = entry.saturating_sub(1);
        }
    }

    fn next_cas(&self) -> u64 {
        self.cas_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn next_token(&self, bucket: &str, key: &str) -> MutationToken {
        let partition = partition_of(key);
        let mut seqnos = self
            .partition_seqnos
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let seqno = seqnos
            .entry((bucket.to_string(), partition))
            .and_modify(|s| *s += 1)
            .or_insert(1);
        MutationToken {
            bucket: bucket.to_string(),
            partition_id: partition,
            partition_uuid: 0x5eed_0000 + u64::from(partition),
            seqno: *seqno,
        }
    }

    fn handle(&self, request: KvRequest) -> KvResponse {
        if let Some(status) = self.behavior.take_fail() {
            return failure(
                request.correlation_id,
                status,
                "injected failure",
                json!({}),
            );
        }

        match request.opcode {
            OpCode::Ping => KvResponse::ok(request.correlation_id),
            OpCode::Admin => self.handle_admin(request),
            OpCode::Query => self.handle_query(request),
            OpCode::AnalyticsQuery => self.handle_analytics(request),
            OpCode::SearchQuery => self.handle_search(request),
            _ => self.handle_kv(request),
        }
    }

    fn handle_kv(&self, request: KvRequest) -> KvResponse {
        let id = request.correlation_id;
        let Some(keyspace) = request.keyspace.clone() else {
            return failure(id, Status::ServerError, "kv request without keyspace", json!({}));
        };

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let Some(bucket) = buckets.get_mut(&keyspace.bucket) else {
            return failure(
                id,
                Status::BucketMissing,
                "bucket not found",
                json!({"bucket": keyspace.bucket}),
            );
        };
        let Some(collections) = bucket.scopes.get(&keyspace.scope) else {
            return failure(
                id,
                Status::ScopeMissing,
                "scope not found",
                json!({"scope": keyspace.scope}),
            );
        };
        if !collections.contains(&keyspace.collection) {
            return failure(
                id,
                Status::CollectionMissing,
                "collection not found",
                json!({"collection": keyspace.collection}),
            );
        }

        let doc_key = (
            keyspace.scope.clone(),
            keyspace.collection.clone(),
            request.key.clone(),
        );
        let bucket_name = keyspace.bucket.clone();

        match request.opcode {
            OpCode::Get => match bucket.docs.get(&doc_key) {
                Some(doc) => {
                    let mut response = KvResponse::ok(id);
                    response.cas = Cas(doc.cas);
                    response.value = Some(Bytes::from(doc.value.clone()));
                    response.flags = doc.flags;
                    if request.with_expiry {
                        response.expiry = doc.expiry;
                    }
                    response
                }
                None => failure(id, Status::NotFound, "document not found", json!({})),
            },
            OpCode::Exists => match bucket.docs.get(&doc_key) {
                Some(doc) => {
                    let mut response = KvResponse::ok(id);
                    response.cas = Cas(doc.cas);
                    response
                }
                None => KvResponse::with_status(id, Status::NotFound),
            },
            OpCode::GetAndLock => match bucket.docs.get_mut(&doc_key) {
                Some(doc) => {
                    if doc.is_locked() {
                        return failure(id, Status::Locked, "document is locked", json!({}));
                    }
                    let lock_secs = request.lock_time.unwrap_or(15);
                    let lock_cas = self.cas_counter.fetch_add(1, Ordering::SeqCst);
                    doc.locked_until =
                        Some(Instant::now() + Duration::from_secs(u64::from(lock_secs)));
                    doc.lock_cas = lock_cas;
                    doc.cas = lock_cas;

                    let mut response = KvResponse::ok(id);
                    response.cas = Cas(lock_cas);
                    response.value = Some(Bytes::from(doc.value.clone()));
                    response.flags = doc.flags;
                    response
                }
                None => failure(id, Status::NotFound, "document not found", json!({})),
            },
            OpCode::GetAndTouch => match bucket.docs.get_mut(&doc_key) {
                Some(doc) => {
                    doc.expiry = request.expiry;
                    doc.cas = self.cas_counter.fetch_add(1, Ordering::SeqCst);
                    let mut response = KvResponse::ok(id);
                    response.cas = Cas(doc.cas);
                    response.value = Some(Bytes::from(doc.value.clone()));
                    response.flags = doc.flags;
                    response
                }
                None => failure(id, Status::NotFound, "document not found", json!({})),
            },
            OpCode::Unlock => match bucket.docs.get_mut(&doc_key) {
                Some(doc) => {
                    if doc.is_locked() {
                        if request.cas.0 != doc.lock_cas {
                            return failure(
                                id,
                                Status::Locked,
                                "unlock with wrong cas",
                                json!({}),
                            );
                        }
                        doc.locked_until = None;
                    }
                    KvResponse::ok(id)
                }
                None => failure(id, Status::NotFound, "document not found", json!({})),
            },
            OpCode::Insert => {
                if bucket.docs.contains_key(&doc_key) {
                    return failure(id, Status::Exists, "document already exists", json!({}));
                }
                let cas = self.next_cas();
                bucket.docs.insert(
                    doc_key,
                    StoredDoc {
                        value: request.value.clone().unwrap_or_default().to_vec(),
                        flags: request.flags,
                        cas,
                        expiry: request.expiry,
                        locked_until: None,
                        lock_cas: 0,
                    },
                );
                let mut response = KvResponse::ok(id);
                response.cas = Cas(cas);
                response.mutation_token = Some(self.next_token(&bucket_name, &request.key));
                response
            }
            OpCode::Upsert | OpCode::Replace => {
                let exists = bucket.docs.contains_key(&doc_key);
                if request.opcode == OpCode::Replace && !exists {
                    return failure(id, Status::NotFound, "document not found", json!({}));
                }
                if !request.cas.is_zero() && !exists {
                    return failure(id, Status::NotFound, "document not found", json!({}));
                }
                if let Some(doc) = bucket.docs.get(&doc_key) {
                    if doc.is_locked() && request.cas.0 != doc.lock_cas {
                        return failure(id, Status::Locked, "document is locked", json!({}));
                    }
                    if !request.cas.is_zero() && request.cas.0 != doc.cas {
                        return failure(id, Status::CasMismatch, "cas mismatch", json!({}));
                    }
                }
                let cas = self.next_cas();
                let expiry = request.expiry;
                let entry = bucket.docs.entry(doc_key).or_insert(StoredDoc {
                    value: Vec::new(),
                    flags: 0,
                    cas: 0,
                    expiry: None,
                    locked_until: None,
                    lock_cas: 0,
                });
                entry.value = request.value.clone().unwrap_or_default().to_vec();
                entry.flags = request.flags;
                entry.cas = cas;
                entry.expiry = expiry.or(entry.expiry);
                entry.locked_until = None;

                let mut response = KvResponse::ok(id);
                response.cas = Cas(cas);
                response.mutation_token = Some(self.next_token(&bucket_name, &request.key));
                response
            }
            OpCode::Remove => match bucket.docs.get(&doc_key) {
                Some(doc) => {
                    if doc.is_locked() && request.cas.0 != doc.lock_cas {
                        return failure(id, Status::Locked, "document is locked", json!({}));
                    }
                    if !request.cas.is_zero() && request.cas.0 != doc.cas {
                        return failure(id, Status::CasMismatch, "cas mismatch", json!({}));
                    }
                    bucket.docs.remove(&doc_key);
                    let mut response = KvResponse::ok(id);
                    response.cas = Cas(self.next_cas());
                    response.mutation_token = Some(self.next_token(&bucket_name, &request.key));
                    response
                }
                None => failure(id, Status::NotFound, "document not found", json!({})),
            },
            OpCode::Touch => match bucket.docs.get_mut(&doc_key) {
                Some(doc) => {
                    doc.expiry = request.expiry;
                    doc.cas = self.cas_counter.fetch_add(1, Ordering::SeqCst);
                    let mut response = KvResponse::ok(id);
                    response.cas = Cas(doc.cas);
                    response.mutation_token = Some(self.next_token(&bucket_name, &request.key));
                    response
                }
                None => failure(id, Status::NotFound, "document not found", json!({})),
            },
            OpCode::Append | OpCode::Prepend => match bucket.docs.get_mut(&doc_key) {
                Some(doc) => {
                    if doc.is_locked() {
                        return failure(id, Status::Locked, "document is locked", json!({}));
                    }
                    let extra = request.value.clone().unwrap_or_default();
                    if request.opcode == OpCode::Append {
                        doc.value.extend_from_slice(&extra);
                    } else {
                        let mut combined = extra.to_vec();
                        combined.extend_from_slice(&doc.value);
                        doc.value = combined;
                    }
                    doc.cas = self.cas_counter.fetch_add(1, Ordering::SeqCst);
                    let mut response = KvResponse::ok(id);
                    response.cas = Cas(doc.cas);
                    response.mutation_token = Some(self.next_token(&bucket_name, &request.key));
                    response
                }
                None => failure(id, Status::NotFound, "document not found", json!({})),
            },
            OpCode::Increment | OpCode::Decrement => {
                let delta = request.delta.unwrap_or(1);
                let current = match bucket.docs.get(&doc_key) {
                    Some(doc) => {
                        match std::str::from_utf8(&doc.value)
                            .ok()
                            .and_then(|s| s.trim().parse::<u64>().ok())
                        {
                            Some(n) => Some(n),
                            None => {
                                return failure(
                                    id,
                                    Status::SubdocInvalidRange,
                                    "document is not a counter",
                                    json!({"path": request.key}),
                                )
                            }
                        }
                    }
                    None => None,
                };

                let new_value = match (current, request.initial) {
                    (Some(n), _) => {
                        if request.opcode == OpCode::Increment {
                            n.saturating_add(delta)
                        } else {
                            n.saturating_sub(delta)
                        }
                    }
                    (None, Some(initial)) => initial,
                    (None, None) => {
                        return failure(id, Status::NotFound, "counter not found", json!({}))
                    }
                };

                let cas = self.next_cas();
                let entry = bucket.docs.entry(doc_key).or_insert(StoredDoc {
                    value: Vec::new(),
                    flags: make_flags(couchbase_core::transcoder::FORMAT_BINARY, COMPRESSION_NONE),
                    cas: 0,
                    expiry: request.expiry,
                    locked_until: None,
                    lock_cas: 0,
                });
                entry.value = new_value.to_string().into_bytes();
                entry.cas = cas;

                let mut response = KvResponse::ok(id);
                response.cas = Cas(cas);
                response.value = Some(Bytes::from(new_value.to_string().into_bytes()));
                response.mutation_token = Some(self.next_token(&bucket_name, &request.key));
                response
            }
            OpCode::LookupIn => match bucket.docs.get(&doc_key) {
                Some(doc) => {
                    let content =
                        match decode_document(&doc.value, doc.flags, &DecoderConfig::default()) {
                            Ok(content) => content,
                            Err(_) => {
                                return failure(
                                    id,
                                    Status::ServerError,
                                    "document is not JSON",
                                    json!({}),
                                )
                            }
                        };
                    let fields = doc_lookup(&content, &request.specs);
                    let mut response = KvResponse::ok(id);
                    response.cas = Cas(doc.cas);
                    response.fields = fields;
                    if request.with_expiry {
                        response.expiry = doc.expiry;
                    }
                    response
                }
                None => failure(id, Status::NotFound, "document not found", json!({})),
            },
            OpCode::MutateIn => {
                let existing = bucket.docs.get(&doc_key);
                match (request.store_semantics, existing.is_some()) {
                    (StoreSemantics::Insert, true) => {
                        return failure(id, Status::Exists, "document already exists", json!({}))
                    }
                    (StoreSemantics::Replace, false) => {
                        return failure(id, Status::NotFound, "document not found", json!({}))
                    }
                    _ => {}
                }
                if let Some(doc) = existing {
                    if doc.is_locked() {
                        return failure(id, Status::Locked, "document is locked", json!({}));
                    }
                    if !request.cas.is_zero() && request.cas.0 != doc.cas {
                        return failure(id, Status::CasMismatch, "cas mismatch", json!({}));
                    }
                }

                let mut content = match existing {
                    Some(doc) => {
                        match decode_document(&doc.value, doc.flags, &DecoderConfig::default()) {
                            Ok(content) => content,
                            Err(_) => {
                                return failure(
                                    id,
                                    Status::ServerError,
                                    "document is not JSON",
                                    json!({}),
                                )
                            }
                        }
                    }
                    None => json!({}),
                };

                let mut fields = Vec::with_capacity(request.specs.len());
                for spec in &request.specs {
                    match apply_mutation_spec(&mut content, spec) {
                        Ok(field) => fields.push(field),
                        Err(status) => {
                            let mut response = failure(
                                id,
                                status,
                                "sub-document mutation failed",
                                json!({"path": spec.path}),
                            );
                            response.fields = vec![SubdocField::failed(status)];
                            return response;
                        }
                    }
                }

                let encoded = match serde_json::to_vec(&content) {
                    Ok(encoded) => encoded,
                    Err(_) => {
                        return failure(id, Status::ServerError, "encode failed", json!({}))
                    }
                };
                let cas = self.next_cas();
                let expiry = request.expiry;
                let entry = bucket.docs.entry(doc_key).or_insert(StoredDoc {
                    value: Vec::new(),
                    flags: make_flags(FORMAT_JSON, COMPRESSION_NONE),
                    cas: 0,
                    expiry: None,
                    locked_until: None,
                    lock_cas: 0,
                });
                entry.value = encoded;
                entry.flags = make_flags(FORMAT_JSON, COMPRESSION_NONE);
                entry.cas = cas;
                entry.expiry = expiry.or(entry.expiry);

                let mut response = KvResponse::ok(id);
                response.cas = Cas(cas);
                response.mutation_token = Some(self.next_token(&bucket_name, &request.key));
                response.fields = fields;
                response
            }
            _ => failure(id, Status::ServerError, "unsupported kv opcode", json!({})),
        }
    }

    fn handle_query(&self, request: KvRequest) -> KvResponse {
        let id = request.correlation_id;
        let body = request.body.clone().unwrap_or(Value::Null);
        if let Ok(mut slot) = self.last_query_body.lock() {
            *slot = Some(body.clone());
        }

        let statement = body
            .get("statement")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if statement.trim_start().to_uppercase().starts_with("SYNTAX") {
            let mut response = failure(
                id,
                Status::QueryError,
                "syntax error - invalid statement",
                json!({"errors": [{"code": 3000, "msg": "syntax error"}]}),
            );
            response.body = Some(json!({"errors": [{"code": 3000, "msg": "syntax error"}]}));
            return response;
        }

        let request_id = format!("q-{}", self.request_counter.fetch_add(1, Ordering::SeqCst));
        let mut results = Vec::new();

        if statement.trim().eq_ignore_ascii_case("SELECT RAW 1") {
            results.push(json!(1));
        } else if let Some(bucket_name) = statement
            .trim()
            .strip_prefix("SELECT * FROM ")
            .map(|rest| rest.trim_matches('`').split_whitespace().next().unwrap_or(""))
        {
            let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(bucket) = buckets.get(bucket_name) {
                let mut rows: Vec<(String, Value)> = bucket
                    .docs
                    .iter()
                    .filter(|((scope, collection, _), _)| {
                        scope == "_default" && collection == "_default"
                    })
                    .filter_map(|((_, _, key), doc)| {
                        decode_document(&doc.value, doc.flags, &DecoderConfig::default())
                            .ok()
                            .map(|content| (key.clone(), content))
                    })
                    .collect();
                rows.sort_by(|a, b| a.0.cmp(&b.0));
                results.extend(rows.into_iter().map(|(_, content)| {
                    let mut row = Map::new();
                    row.insert(bucket_name.to_string(), content);
                    Value::Object(row)
                }));
            }
        }

        let mut response_body = json!({
            "request_id": request_id,
            "status": "success",
            "results": results,
            "warnings": [],
        });
        if let Some(context_id) = body.get("client_context_id") {
            response_body["client_context_id"] = context_id.clone();
        }
        if body.get("metrics").and_then(Value::as_bool).unwrap_or(false) {
            response_body["metrics"] = json!({
                "resultCount": response_body["results"].as_array().map(Vec::len).unwrap_or(0),
                "elapsedTime": "1ms",
            });
        }

        let mut response = KvResponse::ok(id);
        response.body = Some(response_body);
        response
    }

    fn handle_analytics(&self, request: KvRequest) -> KvResponse {
        let id = request.correlation_id;
        let body = request.body.clone().unwrap_or(Value::Null);
        let statement = body
            .get("statement")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if statement.trim_start().to_uppercase().starts_with("SYNTAX") {
            return failure(
                id,
                Status::QueryError,
                "analytics syntax error",
                json!({"errors": [{"code": 24000, "msg": "syntax error"}]}),
            );
        }

        let results = if statement.trim().eq_ignore_ascii_case("SELECT VALUE 1") {
            vec![json!(1)]
        } else {
            Vec::new()
        };

        let mut response = KvResponse::ok(id);
        response.body = Some(json!({
            "request_id": format!("a-{}", self.request_counter.fetch_add(1, Ordering::SeqCst)),
            "status": "success",
            "results": results,
        }));
        response
    }

    fn handle_search(&self, request: KvRequest) -> KvResponse {
        let id = request.correlation_id;
        let body = request.body.clone().unwrap_or(Value::Null);
        let index = body.get("index").and_then(Value::as_str).unwrap_or_default();

        let indexes = self.search_indexes.lock().unwrap_or_else(|e| e.into_inner());
        let Some(definition) = indexes.get(index) else {
            return failure(
                id,
                Status::QueryError,
                "search index not found",
                json!({"index": index}),
            );
        };
        let source = definition
            .get("source_name")
            .and_then(Value::as_str)
            .unwrap_or("travel")
            .to_string();
        drop(indexes);

        let needle = body
            .get("query")
            .and_then(|q| {
                q.get("match")
                    .or_else(|| q.get("query"))
                    .or_else(|| q.get("term"))
            })
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let mut hits = Vec::new();
        if let Some(bucket) = buckets.get(&source) {
            let mut keys: Vec<_> = bucket
                .docs
                .iter()
                .filter(|((scope, collection, _), _)| {
                    scope == "_default" && collection == "_default"
                })
                .collect();
            keys.sort_by(|a, b| a.0 .2.cmp(&b.0 .2));
            for ((_, _, key), doc) in keys {
                let Ok(content) =
                    decode_document(&doc.value, doc.flags, &DecoderConfig::default())
                else {
                    continue;
                };
                let haystack = content.to_string().to_lowercase();
                if needle.is_empty() || haystack.contains(&needle) {
                    hits.push(json!({
                        "index": format!("{index}_1"),
                        "id": key,
                        "score": 1.0,
                    }));
                }
            }
        }

        let total = hits.len();
        let mut response = KvResponse::ok(id);
        response.body = Some(json!({
            "status": {"successful": 1, "failed": 0},
            "hits": hits,
            "total_hits": total,
            "max_score": if total > 0 { 1.0 } else { 0.0 },
            "took": 1000,
        }));
        response
    }

    fn handle_admin(&self, request: KvRequest) -> KvResponse {
        let id = request.correlation_id;
        let body = request.body.clone().unwrap_or(Value::Null);
        let action = body.get("action").and_then(Value::as_str).unwrap_or("");

        match action {
            "query-index.create" => {
                let bucket = body["bucket"].as_str().unwrap_or("").to_string();
                if !self.bucket_exists(&bucket) {
                    return failure(id, Status::BucketMissing, "bucket not found", json!({"bucket": bucket}));
                }
                let name = body["name"].as_str().unwrap_or("").to_string();
                let mut indexes = self.query_indexes.lock().unwrap_or_else(|e| e.into_inner());
                if indexes.contains_key(&(bucket.clone(), name.clone())) {
                    return failure(id, Status::Exists, "index already exists", json!({}));
                }
                let deferred = body["deferred"].as_bool().unwrap_or(false);
                indexes.insert(
                    (bucket, name.clone()),
                    IndexRecord {
                        name,
                        is_primary: body["is_primary"].as_bool().unwrap_or(false),
                        fields: body["fields"]
                            .as_array()
                            .map(|f| {
                                f.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default(),
                        condition: body["condition"].as_str().map(str::to_string),
                        state: if deferred { "deferred" } else { "online" }.to_string(),
                    },
                );
                KvResponse::ok(id)
            }
            "query-index.get-all" => {
                let bucket = body["bucket"].as_str().unwrap_or("");
                let indexes = self.query_indexes.lock().unwrap_or_else(|e| e.into_inner());
                let mut listed: Vec<&IndexRecord> = indexes
                    .iter()
                    .filter(|((b, _), _)| b == bucket)
                    .map(|(_, record)| record)
                    .collect();
                listed.sort_by(|a, b| a.name.cmp(&b.name));
                let listed: Vec<Value> = listed
                    .into_iter()
                    .map(|record| {
                        json!({
                            "name": record.name,
                            "is_primary": record.is_primary,
                            "using": "gsi",
                            "state": record.state,
                            "keyspace": bucket,
                            "index_key": record.fields,
                            "condition": record.condition,
                        })
                    })
                    .collect();
                let mut response = KvResponse::ok(id);
                response.body = Some(json!({"indexes": listed}));
                response
            }
            "query-index.drop" => {
                let bucket = body["bucket"].as_str().unwrap_or("").to_string();
                let name = body["name"].as_str().unwrap_or("").to_string();
                let mut indexes = self.query_indexes.lock().unwrap_or_else(|e| e.into_inner());
                if indexes.remove(&(bucket, name)).is_none() {
                    return failure(id, Status::NotFound, "index not found", json!({}));
                }
                KvResponse::ok(id)
            }
            "query-index.build-deferred" => {
                let bucket = body["bucket"].as_str().unwrap_or("");
                let mut indexes = self.query_indexes.lock().unwrap_or_else(|e| e.into_inner());
                let mut built = Vec::new();
                for ((b, _), record) in indexes.iter_mut() {
                    if b == bucket && record.state == "deferred" {
                        record.state = "online".to_string();
                        built.push(record.name.clone());
                    }
                }
                built.sort();
                let mut response = KvResponse::ok(id);
                response.body = Some(json!({"names": built}));
                response
            }
            "search-index.upsert" => {
                let index = body["index"].clone();
                let name = index["name"].as_str().unwrap_or("").to_string();
                let mut indexes = self.search_indexes.lock().unwrap_or_else(|e| e.into_inner());
                let mut stored = index;
                stored["uuid"] = json!(format!("uuid-{}", name));
                indexes.insert(name, stored);
                KvResponse::ok(id)
            }
            "search-index.get" => {
                let name = body["name"].as_str().unwrap_or("");
                let indexes = self.search_indexes.lock().unwrap_or_else(|e| e.into_inner());
                match indexes.get(name) {
                    Some(index) => {
                        let mut response = KvResponse::ok(id);
                        response.body = Some(json!({"index": index}));
                        response
                    }
                    None => failure(id, Status::NotFound, "search index not found", json!({})),
                }
            }
            "search-index.get-all" => {
                let indexes = self.search_indexes.lock().unwrap_or_else(|e| e.into_inner());
                let mut listed: Vec<(&String, &Value)> = indexes.iter().collect();
                listed.sort_by(|a, b| a.0.cmp(b.0));
                let listed: Vec<Value> = listed.into_iter().map(|(_, v)| v.clone()).collect();
                let mut response = KvResponse::ok(id);
                response.body = Some(json!({"indexes": listed}));
                response
            }
            "search-index.drop" => {
                let name = body["name"].as_str().unwrap_or("");
                let mut indexes = self.search_indexes.lock().unwrap_or_else(|e| e.into_inner());
                if indexes.remove(name).is_none() {
                    return failure(id, Status::NotFound, "search index not found", json!({}));
                }
                KvResponse::ok(id)
            }
            "search-index.doc-count" => {
                let name = body["name"].as_str().unwrap_or("");
                let indexes = self.search_indexes.lock().unwrap_or_else(|e| e.into_inner());
                let Some(definition) = indexes.get(name) else {
                    return failure(id, Status::NotFound, "search index not found", json!({}));
                };
                let source = definition["source_name"].as_str().unwrap_or("").to_string();
                drop(indexes);
                let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
                let count = buckets
                    .get(&source)
                    .map(|bucket| bucket.docs.len())
                    .unwrap_or(0);
                let mut response = KvResponse::ok(id);
                response.body = Some(json!({"count": count}));
                response
            }
            "user.upsert" => {
                let user = body["user"].clone();
                let username = user["username"].as_str().unwrap_or("").to_string();
                let mut stored = user;
                // Passwords are accepted but never reported back.
                if let Some(map) = stored.as_object_mut() {
                    map.remove("password");
                }
                self.users
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(username, stored);
                KvResponse::ok(id)
            }
            "user.get" => {
                let username = body["username"].as_str().unwrap_or("");
                let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
                match users.get(username) {
                    Some(user) => {
                        let mut response = KvResponse::ok(id);
                        response.body = Some(json!({"user": user}));
                        response
                    }
                    None => failure(id, Status::NotFound, "user not found", json!({})),
                }
            }
            "user.get-all" => {
                let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
                let mut listed: Vec<(&String, &Value)> = users.iter().collect();
                listed.sort_by(|a, b| a.0.cmp(b.0));
                let listed: Vec<Value> = listed.into_iter().map(|(_, v)| v.clone()).collect();
                let mut response = KvResponse::ok(id);
                response.body = Some(json!({"users": listed}));
                response
            }
            "user.drop" => {
                let username = body["username"].as_str().unwrap_or("");
                let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
                if users.remove(username).is_none() {
                    return failure(id, Status::NotFound, "user not found", json!({}));
                }
                KvResponse::ok(id)
            }
            "user.roles" => {
                let mut response = KvResponse::ok(id);
                response.body = Some(json!({"roles": [
                    {"role": {"name": "admin"}, "display_name": "Full Admin", "description": "All cluster operations"},
                    {"role": {"name": "data_reader", "bucket": "*"}, "display_name": "Data Reader", "description": "Read documents"},
                    {"role": {"name": "data_writer", "bucket": "*"}, "display_name": "Data Writer", "description": "Write documents"},
                ]}));
                response
            }
            "group.upsert" => {
                let group = body["group"].clone();
                let name = group["name"].as_str().unwrap_or("").to_string();
                self.groups
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(name, group);
                KvResponse::ok(id)
            }
            "group.get" => {
                let name = body["name"].as_str().unwrap_or("");
                let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
                match groups.get(name) {
                    Some(group) => {
                        let mut response = KvResponse::ok(id);
                        response.body = Some(json!({"group": group}));
                        response
                    }
                    None => failure(id, Status::NotFound, "group not found", json!({})),
                }
            }
            "group.get-all" => {
                let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
                let mut listed: Vec<(&String, &Value)> = groups.iter().collect();
                listed.sort_by(|a, b| a.0.cmp(b.0));
                let listed: Vec<Value> = listed.into_iter().map(|(_, v)| v.clone()).collect();
                let mut response = KvResponse::ok(id);
                response.body = Some(json!({"groups": listed}));
                response
            }
            "group.drop" => {
                let name = body["name"].as_str().unwrap_or("");
                let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
                if groups.remove(name).is_none() {
                    return failure(id, Status::NotFound, "group not found", json!({}));
                }
                KvResponse::ok(id)
            }
            "collection.get-all-scopes" => {
                let bucket_name = body["bucket"].as_str().unwrap_or("");
                let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
                let Some(bucket) = buckets.get(bucket_name) else {
                    return failure(id, Status::BucketMissing, "bucket not found", json!({"bucket": bucket_name}));
                };
                let mut scopes: Vec<(&String, &HashSet<String>)> = bucket.scopes.iter().collect();
                scopes.sort_by(|a, b| a.0.cmp(b.0));
                let listed: Vec<Value> = scopes
                    .into_iter()
                    .map(|(scope, collections)| {
                        let mut names: Vec<&String> = collections.iter().collect();
                        names.sort();
                        json!({
                            "name": scope,
                            "collections": names
                                .into_iter()
                                .map(|name| json!({"name": name, "scope_name": scope}))
                                .collect::<Vec<Value>>(),
                        })
                    })
                    .collect();
                let mut response = KvResponse::ok(id);
                response.body = Some(json!({"scopes": listed}));
                response
            }
            "collection.create-scope" => {
                let bucket_name = body["bucket"].as_str().unwrap_or("").to_string();
                let scope = body["scope"].as_str().unwrap_or("").to_string();
                let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
                let Some(bucket) = buckets.get_mut(&bucket_name) else {
                    return failure(id, Status::BucketMissing, "bucket not found", json!({"bucket": bucket_name}));
                };
                if bucket.scopes.contains_key(&scope) {
                    return failure(id, Status::Exists, "scope already exists", json!({}));
                }
                bucket.scopes.insert(scope, HashSet::new());
                KvResponse::ok(id)
            }
            "collection.drop-scope" => {
                let bucket_name = body["bucket"].as_str().unwrap_or("").to_string();
                let scope = body["scope"].as_str().unwrap_or("").to_string();
                let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
                let Some(bucket) = buckets.get_mut(&bucket_name) else {
                    return failure(id, Status::BucketMissing, "bucket not found", json!({"bucket": bucket_name}));
                };
                if bucket.scopes.remove(&scope).is_none() {
                    return failure(id, Status::NotFound, "scope not found", json!({"scope": scope}));
                }
                KvResponse::ok(id)
            }
            "collection.create" => {
                let bucket_name = body["bucket"].as_str().unwrap_or("").to_string();
                let scope = body["scope"].as_str().unwrap_or("").to_string();
                let name = body["name"].as_str().unwrap_or("").to_string();
                let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
                let Some(bucket) = buckets.get_mut(&bucket_name) else {
                    return failure(id, Status::BucketMissing, "bucket not found", json!({"bucket": bucket_name}));
                };
                let Some(collections) = bucket.scopes.get_mut(&scope) else {
                    return failure(id, Status::ScopeMissing, "scope not found", json!({"scope": scope}));
                };
                if !collections.insert(name) {
                    return failure(id, Status::Exists, "collection already exists", json!({}));
                }
                KvResponse::ok(id)
            }
            "collection.drop" => {
                let bucket_name = body["bucket"].as_str().unwrap_or("").to_string();
                let scope = body["scope"].as_str().unwrap_or("").to_string();
                let name = body["name"].as_str().unwrap_or("").to_string();
                let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
                let Some(bucket) = buckets.get_mut(&bucket_name) else {
                    return failure(id, Status::BucketMissing, "bucket not found", json!({"bucket": bucket_name}));
                };
                let Some(collections) = bucket.scopes.get_mut(&scope) else {
                    return failure(id, Status::ScopeMissing, "scope not found", json!({"scope": scope}));
                };
                if !collections.remove(&name) {
                    return failure(id, Status::NotFound, "collection not found", json!({"collection": name}));
                }
                KvResponse::ok(id)
            }
            other => failure(
                id,
                Status::ServerError,
                &format!("unknown admin action {other:?}"),
                json!({}),
            ),
        }
    }

    fn bucket_exists(&self, name: &str) -> bool {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }
}

/// One parsed path segment: a key and optional array indexes.
fn parse_path(path: &str) -> Vec<(String, Vec<usize>)> {
    path.split('.')
        .map(|segment| {
            let mut key = segment.to_string();
            let mut indexes = Vec::new();
            while let (Some(open), true) = (key.find('['), key.ends_with(']')) {
                let inner = key[open + 1..key.len() - 1].to_string();
                if let Some((first, rest)) = inner.split_once("][") {
                    // Multi-dimensional: peel one index and keep the rest.
                    if let Ok(index) = first.parse() {
                        indexes.push(index);
                    }
                    key = format!("{}[{}]", &key[..open], rest);
                } else {
                    if let Ok(index) = inner.parse() {
                        indexes.push(index);
                    }
                    key.truncate(open);
                    break;
                }
            }
            (key, indexes)
        })
        .collect()
}

fn lookup_path<'a>(content: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = content;
    for (key, indexes) in parse_path(path) {
        if !key.is_empty() {
            current = current.as_object()?.get(&key)?;
        }
        for index in indexes {
            current = current.as_array()?.get(index)?;
        }
    }
    Some(current)
}

fn doc_lookup(content: &Value, specs: &[SubdocSpec]) -> Vec<SubdocField> {
    specs
        .iter()
        .map(|spec| match spec.op {
            SubdocOp::Get => match lookup_path(content, &spec.path) {
                Some(value) => SubdocField::ok(value.clone()),
                None => SubdocField::failed(Status::SubdocPathNotFound),
            },
            SubdocOp::Exists => match lookup_path(content, &spec.path) {
                Some(_) => SubdocField::ok(json!(true)),
                None => SubdocField::failed(Status::SubdocPathNotFound),
            },
            SubdocOp::Count => match lookup_path(content, &spec.path) {
                Some(Value::Array(items)) => SubdocField::ok(json!(items.len())),
                Some(Value::Object(map)) => SubdocField::ok(json!(map.len())),
                Some(_) => SubdocField::failed(Status::SubdocInvalidRange),
                None => SubdocField::failed(Status::SubdocPathNotFound),
            },
            SubdocOp::GetDoc => SubdocField::ok(content.clone()),
            _ => SubdocField::failed(Status::SubdocInvalidRange),
        })
        .collect()
}

/// Navigates to the parent object of `path`'s final segment, creating
/// intermediate objects when `create_path` allows it.
fn navigate_parent<'a>(
    content: &'a mut Value,
    segments: &[(String, Vec<usize>)],
    create_path: bool,
) -> Option<&'a mut Value> {
    let mut current = content;
    for (key, indexes) in &segments[..segments.len().saturating_sub(1)] {
        if !key.is_empty() {
            let object = current.as_object_mut()?;
            if !object.contains_key(key) {
                if !create_path {
                    return None;
                }
                object.insert(key.clone(), json!({}));
            }
            current = object.get_mut(key)?;
        }
        for index in indexes {
            current = current.as_array_mut()?.get_mut(*index)?;
        }
    }
    Some(current)
}

fn apply_mutation_spec(content: &mut Value, spec: &SubdocSpec) -> std::result::Result<SubdocField, Status> {
    let segments = parse_path(&spec.path);
    if segments.is_empty() {
        return Err(Status::SubdocPathNotFound);
    }
    let (final_key, final_indexes) = segments[segments.len() - 1].clone();
    let parent = navigate_parent(content, &segments, spec.create_path)
        .ok_or(Status::SubdocPathNotFound)?;

    match spec.op {
        SubdocOp::DictAdd | SubdocOp::DictUpsert => {
            let object = parent.as_object_mut().ok_or(Status::SubdocPathNotFound)?;
            if spec.op == SubdocOp::DictAdd && object.contains_key(&final_key) {
                return Err(Status::SubdocPathExists);
            }
            object.insert(
                final_key,
                spec.value.clone().ok_or(Status::SubdocInvalidRange)?,
            );
            Ok(SubdocField {
                status: Status::Ok,
                value: None,
            })
        }
        SubdocOp::Replace => {
            let object = parent.as_object_mut().ok_or(Status::SubdocPathNotFound)?;
            if !object.contains_key(&final_key) {
                return Err(Status::SubdocPathNotFound);
            }
            object.insert(
                final_key,
                spec.value.clone().ok_or(Status::SubdocInvalidRange)?,
            );
            Ok(SubdocField {
                status: Status::Ok,
                value: None,
            })
        }
        SubdocOp::Delete => {
            let object = parent.as_object_mut().ok_or(Status::SubdocPathNotFound)?;
            object
                .remove(&final_key)
                .ok_or(Status::SubdocPathNotFound)?;
            Ok(SubdocField {
                status: Status::Ok,
                value: None,
            })
        }
        SubdocOp::ArrayPushLast | SubdocOp::ArrayPushFirst | SubdocOp::ArrayAddUnique => {
            let object = parent.as_object_mut().ok_or(Status::SubdocPathNotFound)?;
            if !object.contains_key(&final_key) {
                if !spec.create_path {
                    return Err(Status::SubdocPathNotFound);
                }
                object.insert(final_key.clone(), json!([]));
            }
            let array = object
                .get_mut(&final_key)
                .and_then(Value::as_array_mut)
                .ok_or(Status::SubdocInvalidRange)?;
            let value = spec.value.clone().ok_or(Status::SubdocInvalidRange)?;
            match spec.op {
                SubdocOp::ArrayPushLast => array.push(value),
                SubdocOp::ArrayPushFirst => array.insert(0, value),
                SubdocOp::ArrayAddUnique => {
                    if array.contains(&value) {
                        return Err(Status::SubdocPathExists);
                    }
                    array.push(value);
                }
                _ => unreachable!(),
            }
            Ok(SubdocField {
                status: Status::Ok,
                value: None,
            })
        }
        SubdocOp::ArrayInsert => {
            let index = *final_indexes.last().ok_or(Status::SubdocInvalidRange)?;
            let object = parent.as_object_mut().ok_or(Status::SubdocPathNotFound)?;
            let array = object
                .get_mut(&final_key)
                .and_then(Value::as_array_mut)
                .ok_or(Status::SubdocPathNotFound)?;
            if index > array.len() {
                return Err(Status::SubdocInvalidRange);
            }
            array.insert(index, spec.value.clone().ok_or(Status::SubdocInvalidRange)?);
            Ok(SubdocField {
                status: Status::Ok,
                value: None,
            })
        }
        SubdocOp::Counter => {
            let delta = spec
                .value
                .as_ref()
                .and_then(Value::as_i64)
                .ok_or(Status::SubdocInvalidRange)?;
            let object = parent.as_object_mut().ok_or(Status::SubdocPathNotFound)?;
            let current = match object.get(&final_key) {
                Some(value) => value.as_i64().ok_or(Status::SubdocInvalidRange)?,
                None => 0,
            };
            let updated = current.checked_add(delta).ok_or(Status::SubdocInvalidRange)?;
            object.insert(final_key, json!(updated));
            Ok(SubdocField::ok(json!(updated)))
        }
        SubdocOp::Get | SubdocOp::Exists | SubdocOp::Count | SubdocOp::GetDoc => {
            Err(Status::SubdocInvalidRange)
        }
    }
}
