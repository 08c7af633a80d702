//! Request and response value types exchanged with the transport layer.
//!
//! The transport treats both sides as opaque: it frames a [`KvRequest`] onto
//! the wire and turns whatever comes back into a [`KvResponse`], matching the
//! two by correlation id. Everything protocol-specific (binary framing,
//! topology, TLS) lives behind that boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::error::ErrorContext;
use crate::types::{Cas, DurabilityLevel, Keyspace, MutationToken, StoreSemantics};

use super::status::Status;
use super::subdoc::{SubdocField, SubdocSpec};

/// Global correlation id counter.
static CORRELATION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique correlation id for a request.
pub fn next_correlation_id() -> u64 {
    CORRELATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The operation kind a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Fetch a document.
    Get,
    /// Fetch a document and lock it for a period.
    GetAndLock,
    /// Fetch a document and update its expiry.
    GetAndTouch,
    /// Check whether a document exists.
    Exists,
    /// Store a document that must not exist yet.
    Insert,
    /// Store a document regardless of prior existence.
    Upsert,
    /// Store a document that must already exist.
    Replace,
    /// Delete a document.
    Remove,
    /// Update a document's expiry without touching its value.
    Touch,
    /// Release a lock taken by `GetAndLock`.
    Unlock,
    /// Append raw bytes to a binary document.
    Append,
    /// Prepend raw bytes to a binary document.
    Prepend,
    /// Atomically increment a counter document.
    Increment,
    /// Atomically decrement a counter document.
    Decrement,
    /// Batched sub-document lookup.
    LookupIn,
    /// Batched sub-document mutation.
    MutateIn,
    /// N1QL query.
    Query,
    /// Analytics query.
    AnalyticsQuery,
    /// Full-text search query.
    SearchQuery,
    /// Management request; the JSON body describes the administrative action.
    Admin,
    /// Liveness probe used by ping/diagnostics.
    Ping,
}

impl OpCode {
    /// Returns true if the operation writes document data.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            OpCode::Insert
                | OpCode::Upsert
                | OpCode::Replace
                | OpCode::Remove
                | OpCode::Touch
                | OpCode::Append
                | OpCode::Prepend
                | OpCode::Increment
                | OpCode::Decrement
                | OpCode::MutateIn
        )
    }
}

/// A single operation submitted to the transport session.
///
/// Requests are ephemeral: created per call, consumed by the dispatcher, and
/// discarded once the matching response (or timeout) resolves the caller.
#[derive(Debug, Clone)]
pub struct KvRequest {
    /// Correlation id matching this request to its response.
    pub correlation_id: u64,
    /// Operation kind.
    pub opcode: OpCode,
    /// Target keyspace; `None` for cluster-level requests (query, admin).
    pub keyspace: Option<Keyspace>,
    /// Document id; empty for cluster-level requests.
    pub key: String,
    /// Encoded document value for value-bearing operations.
    pub value: Option<Bytes>,
    /// Transcoder flags describing the encoding of `value`.
    pub flags: u32,
    /// CAS precondition; [`Cas::ZERO`] means unconstrained.
    pub cas: Cas,
    /// Expiry in seconds from now; `None` leaves expiry untouched.
    pub expiry: Option<u32>,
    /// Ask the server to report the document's remaining expiry.
    pub with_expiry: bool,
    /// Lock duration in seconds for `GetAndLock`.
    pub lock_time: Option<u32>,
    /// Counter delta for `Increment`/`Decrement`.
    pub delta: Option<u64>,
    /// Counter seed when the document does not exist yet.
    pub initial: Option<u64>,
    /// Required durability acknowledgment.
    pub durability: DurabilityLevel,
    /// Document-level semantics for `MutateIn`.
    pub store_semantics: StoreSemantics,
    /// Sub-document path specs for `LookupIn`/`MutateIn`.
    pub specs: Vec<SubdocSpec>,
    /// JSON body for query and management requests.
    pub body: Option<Value>,
    /// Per-request deadline overriding the configured default.
    pub timeout: Option<Duration>,
}

impl KvRequest {
    /// Creates a request with a fresh correlation id targeting a keyspace.
    pub fn new(opcode: OpCode, keyspace: Keyspace, key: impl Into<String>) -> Self {
        Self {
            correlation_id: next_correlation_id(),
            opcode,
            keyspace: Some(keyspace),
            key: key.into(),
            value: None,
            flags: 0,
            cas: Cas::ZERO,
            expiry: None,
            with_expiry: false,
            lock_time: None,
            delta: None,
            initial: None,
            durability: DurabilityLevel::None,
            store_semantics: StoreSemantics::default(),
            specs: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a cluster-level request (query, search, analytics, admin).
    pub fn cluster_level(opcode: OpCode, body: Value) -> Self {
        Self {
            correlation_id: next_correlation_id(),
            opcode,
            keyspace: None,
            key: String::new(),
            value: None,
            flags: 0,
            cas: Cas::ZERO,
            expiry: None,
            with_expiry: false,
            lock_time: None,
            delta: None,
            initial: None,
            durability: DurabilityLevel::None,
            store_semantics: StoreSemantics::default(),
            specs: Vec::new(),
            body: Some(body),
            timeout: None,
        }
    }

    /// Returns the identity the durability gate serializes on: keyspace plus
    /// document id.
    pub fn mutation_id(&self) -> Option<String> {
        if self.opcode.is_mutation() {
            self.keyspace
                .as_ref()
                .map(|ks| format!("{}/{}", ks, self.key))
        } else {
            None
        }
    }
}

/// A raw transport response before result mapping.
#[derive(Debug, Clone)]
pub struct KvResponse {
    /// Correlation id of the request this response answers.
    pub correlation_id: u64,
    /// Outcome status.
    pub status: Status,
    /// CAS of the document after the operation, when applicable.
    pub cas: Cas,
    /// Mutation token for successful mutations.
    pub mutation_token: Option<MutationToken>,
    /// Encoded document value for value-returning operations.
    pub value: Option<Bytes>,
    /// Transcoder flags describing the encoding of `value`.
    pub flags: u32,
    /// Document expiry, when the request asked for it.
    pub expiry: Option<u32>,
    /// Per-spec results for sub-document operations.
    pub fields: Vec<SubdocField>,
    /// JSON body for query and management responses.
    pub body: Option<Value>,
    /// Server-provided error diagnostics accompanying a failure status.
    pub context: Option<ErrorContext>,
}

impl KvResponse {
    /// Creates a bare success response for the given correlation id.
    pub fn ok(correlation_id: u64) -> Self {
        Self::with_status(correlation_id, Status::Ok)
    }

    /// Creates a response with the given status and no payload.
    pub fn with_status(correlation_id: u64, status: Status) -> Self {
        Self {
            correlation_id,
            status,
            cas: Cas::ZERO,
            mutation_token: None,
            value: None,
            flags: 0,
            expiry: None,
            fields: Vec::new(),
            body: None,
            context: None,
        }
    }
}
