//! Result types returned by collection operations.
//!
//! Results are immutable values. Every result carries the document's CAS
//! (existence checks excepted, where the server may not return one), and
//! mutations additionally carry the [`MutationToken`] used for
//! read-your-writes query consistency.

use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use couchbase_core::protocol::{Status, SubdocField};
use couchbase_core::{Cas, CouchbaseError, MutationToken, Result};

/// Result of a `get`-style operation.
#[derive(Debug, Clone)]
pub struct GetResult {
    content: Option<Value>,
    raw: Bytes,
    flags: u32,
    cas: Cas,
    expiry: Option<Duration>,
}

impl GetResult {
    pub(crate) fn new(
        content: Option<Value>,
        raw: Bytes,
        flags: u32,
        cas: Cas,
        expiry: Option<Duration>,
    ) -> Self {
        Self {
            content,
            raw,
            flags,
            cas,
            expiry,
        }
    }

    /// Returns the decoded document content.
    ///
    /// `None` when the stored value is a raw binary document (written through
    /// the binary collection API); use [`raw`](Self::raw) for those.
    pub fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// Deserializes the document content into a caller type.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        let content = self.content.clone().ok_or_else(|| {
            CouchbaseError::Serialization(
                "binary document has no structured content".to_string(),
            )
        })?;
        serde_json::from_value(content)
            .map_err(|e| CouchbaseError::Serialization(format!("content_as: {e}")))
    }

    /// Returns the stored bytes exactly as the server holds them.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Returns the transcoder flags the value was stored with.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Returns the document's CAS.
    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Returns the document's remaining expiry, when requested via
    /// `with_expiry`.
    pub fn expiry(&self) -> Option<Duration> {
        self.expiry
    }
}

/// Result of an existence check.
#[derive(Debug, Clone, Copy)]
pub struct ExistsResult {
    exists: bool,
    cas: Option<Cas>,
}

impl ExistsResult {
    pub(crate) fn new(exists: bool, cas: Option<Cas>) -> Self {
        Self { exists, cas }
    }

    /// Returns true if the document exists.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Returns the document's CAS, when the server reported one.
    pub fn cas(&self) -> Option<Cas> {
        self.cas
    }
}

/// Result of a successful mutation.
#[derive(Debug, Clone)]
pub struct MutationResult {
    cas: Cas,
    mutation_token: Option<MutationToken>,
}

impl MutationResult {
    pub(crate) fn new(cas: Cas, mutation_token: Option<MutationToken>) -> Self {
        Self {
            cas,
            mutation_token,
        }
    }

    /// Returns the document's CAS after the mutation.
    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Returns the mutation token, for read-your-writes query consistency.
    pub fn mutation_token(&self) -> Option<&MutationToken> {
        self.mutation_token.as_ref()
    }
}

/// Result of a counter increment or decrement.
#[derive(Debug, Clone)]
pub struct CounterResult {
    content: u64,
    cas: Cas,
    mutation_token: Option<MutationToken>,
}

impl CounterResult {
    pub(crate) fn new(content: u64, cas: Cas, mutation_token: Option<MutationToken>) -> Self {
        Self {
            content,
            cas,
            mutation_token,
        }
    }

    /// Returns the counter value after the operation.
    pub fn content(&self) -> u64 {
        self.content
    }

    /// Returns the document's CAS after the operation.
    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Returns the mutation token.
    pub fn mutation_token(&self) -> Option<&MutationToken> {
        self.mutation_token.as_ref()
    }
}

/// Result of a batched sub-document lookup.
///
/// Individual specs succeed or fail independently; inspect them by index in
/// the order the specs were given. Partial failure is the normal case, not
/// an error.
#[derive(Debug, Clone)]
pub struct LookupInResult {
    cas: Cas,
    fields: Vec<SubdocField>,
    expiry: Option<Duration>,
}

impl LookupInResult {
    pub(crate) fn new(cas: Cas, fields: Vec<SubdocField>, expiry: Option<Duration>) -> Self {
        Self {
            cas,
            fields,
            expiry,
        }
    }

    /// Returns the document's CAS.
    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Returns true if the spec at `index` found its path.
    pub fn exists(&self, index: usize) -> bool {
        self.fields.get(index).map(|f| f.exists()).unwrap_or(false)
    }

    /// Returns the status of the spec at `index`.
    pub fn status(&self, index: usize) -> Option<Status> {
        self.fields.get(index).map(|f| f.status)
    }

    /// Returns the content produced by the spec at `index`.
    ///
    /// # Errors
    ///
    /// Fails with the spec's own error kind when that spec did not succeed,
    /// or with `InvalidArgument` when the index is out of range.
    pub fn content_at(&self, index: usize) -> Result<Value> {
        let field = self.fields.get(index).ok_or_else(|| {
            CouchbaseError::InvalidArgument(format!(
                "lookup_in has {} specs, index {index} is out of range",
                self.fields.len()
            ))
        })?;
        match field.status {
            Status::Ok => Ok(field.value.clone().unwrap_or(Value::Null)),
            Status::SubdocPathNotFound => Err(CouchbaseError::PathNotFound {
                path: format!("spec {index}"),
                context: Default::default(),
            }),
            other => Err(CouchbaseError::Bindings(format!(
                "spec {index} failed with status {other:?}"
            ))),
        }
    }

    /// Returns the number of spec results.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the lookup carried no specs.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the document's remaining expiry, when requested.
    pub fn expiry(&self) -> Option<Duration> {
        self.expiry
    }
}

/// Result of a batched sub-document mutation.
#[derive(Debug, Clone)]
pub struct MutateInResult {
    cas: Cas,
    mutation_token: Option<MutationToken>,
    fields: Vec<SubdocField>,
}

impl MutateInResult {
    pub(crate) fn new(
        cas: Cas,
        mutation_token: Option<MutationToken>,
        fields: Vec<SubdocField>,
    ) -> Self {
        Self {
            cas,
            mutation_token,
            fields,
        }
    }

    /// Returns the document's CAS after the mutation.
    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Returns the mutation token.
    pub fn mutation_token(&self) -> Option<&MutationToken> {
        self.mutation_token.as_ref()
    }

    /// Returns the content produced by the spec at `index`, when the
    /// operation yields one (counter specs return the new value).
    pub fn content_at(&self, index: usize) -> Option<Value> {
        self.fields.get(index).and_then(|f| f.value.clone())
    }
}
