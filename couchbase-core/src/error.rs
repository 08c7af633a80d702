//! Error types for Couchbase operations.

use std::io;
use thiserror::Error;

/// Server-provided diagnostic detail attached to an error.
///
/// The reference is an opaque id that can be quoted to operators when
/// searching server logs; the detail is whatever structured payload the
/// server returned alongside the failure. Neither participates in error
/// classification; callers match on the [`CouchbaseError`] variant, never
/// on message text or context contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Opaque server-side reference id for this failure, if any.
    pub reference: Option<String>,
    /// Structured diagnostic payload returned by the server, if any.
    pub detail: Option<serde_json::Value>,
}

impl ErrorContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context carrying only a reference id.
    pub fn with_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            detail: None,
        }
    }

    /// Returns true if the context carries neither a reference nor detail.
    pub fn is_empty(&self) -> bool {
        self.reference.is_none() && self.detail.is_none()
    }
}

/// The main error type for Couchbase operations.
///
/// This is a closed taxonomy: every failure the client core can surface maps
/// to exactly one variant, and variants that originate on the server carry an
/// [`ErrorContext`] with the server's diagnostic detail.
#[derive(Debug, Error)]
pub enum CouchbaseError {
    /// The requested document does not exist.
    #[error("document not found: {key}")]
    KeyNotFound {
        /// The document id that was requested.
        key: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// A document with this id already exists (insert, or add-style sub-document op).
    #[error("document already exists: {key}")]
    KeyExists {
        /// The document id that collided.
        key: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// The encoded value exceeds the server's size limit.
    #[error("value too large for document {key}")]
    ValueTooBig {
        /// The document id that was being written.
        key: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// The document is locked by another holder.
    #[error("document locked: {key}")]
    KeyLocked {
        /// The locked document id.
        key: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// The server is temporarily unable to service the request. Retryable by
    /// the caller; the core never retries on its own.
    #[error("temporary failure: {message}")]
    TempFail {
        /// Human-readable description of the transient condition.
        message: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// The provided CAS no longer matches the stored document. Never resolved
    /// silently; callers implement their own optimistic-concurrency retry.
    #[error("CAS mismatch for document {key}")]
    CasMismatch {
        /// The document id that was being written.
        key: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// A sub-document path does not exist in the target document.
    #[error("sub-document path not found: {path}")]
    PathNotFound {
        /// The path that failed to resolve.
        path: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// A sub-document path already exists and the operation required it absent.
    #[error("sub-document path already exists: {path}")]
    PathExists {
        /// The colliding path.
        path: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// A sub-document counter or array index is out of the representable range.
    #[error("sub-document value out of range at {path}")]
    InvalidRange {
        /// The offending path.
        path: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// The requested durability level cannot currently be satisfied.
    #[error("durability requirement cannot be met: {message}")]
    DurabilityImpossible {
        /// Description of the unsatisfiable requirement.
        message: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// Network-level failure (connect, read, write). Retryable by the caller.
    #[error("network error: {0}")]
    Network(String),

    /// The per-request deadline elapsed before a response arrived.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The cluster rejected the client's credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The addressed bucket does not exist.
    #[error("bucket not found: {0}")]
    BucketMissing(String),

    /// The addressed scope does not exist.
    #[error("scope not found: {0}")]
    ScopeMissing(String),

    /// The addressed collection does not exist.
    #[error("collection not found: {0}")]
    CollectionMissing(String),

    /// The requested service is not available on any cluster node.
    #[error("service not available: {0}")]
    ServiceMissing(String),

    /// The query statement failed (parse error, semantic error, execution error).
    #[error("query error: {message}")]
    QueryError {
        /// First error message reported by the query service.
        message: String,
        /// Full errors array and diagnostics from the service.
        context: ErrorContext,
    },

    /// The query service itself failed (unreachable, internal error).
    #[error("query service error: {message}")]
    QueryService {
        /// Description of the service-level failure.
        message: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// A full-text search request failed.
    #[error("search error: {message}")]
    Search {
        /// Description of the search failure.
        message: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// An analytics request failed.
    #[error("analytics error: {message}")]
    Analytics {
        /// Description of the analytics failure.
        message: String,
        /// Server-provided diagnostics.
        context: ErrorContext,
    },

    /// Invalid client configuration. Indicates a caller defect; not retryable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An argument combination the API cannot express was requested.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal contract violation between client layers.
    #[error("binding error: {0}")]
    Bindings(String),

    /// Document encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CouchbaseError {
    /// Returns true if retrying the operation may succeed.
    ///
    /// Only transient transport and overload conditions qualify. The core
    /// does not retry automatically because retry safety depends on operation
    /// idempotence that it cannot universally assume.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CouchbaseError::TempFail { .. } | CouchbaseError::Network(_)
        )
    }

    /// Returns the server-provided context, when this kind carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            CouchbaseError::KeyNotFound { context, .. }
            | CouchbaseError::KeyExists { context, .. }
            | CouchbaseError::ValueTooBig { context, .. }
            | CouchbaseError::KeyLocked { context, .. }
            | CouchbaseError::TempFail { context, .. }
            | CouchbaseError::CasMismatch { context, .. }
            | CouchbaseError::PathNotFound { context, .. }
            | CouchbaseError::PathExists { context, .. }
            | CouchbaseError::InvalidRange { context, .. }
            | CouchbaseError::DurabilityImpossible { context, .. }
            | CouchbaseError::QueryError { context, .. }
            | CouchbaseError::QueryService { context, .. }
            | CouchbaseError::Search { context, .. }
            | CouchbaseError::Analytics { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Returns the server reference id, when present.
    pub fn reference(&self) -> Option<&str> {
        self.context().and_then(|c| c.reference.as_deref())
    }
}

/// A specialized `Result` type for Couchbase operations.
pub type Result<T> = std::result::Result<T, CouchbaseError>;
