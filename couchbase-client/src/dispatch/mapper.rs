//! Result mapping: raw transport responses into typed results or
//! classified errors.

use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use couchbase_core::protocol::Status;
use couchbase_core::transcoder::{format_tag, FORMAT_BINARY};
use couchbase_core::{
    CouchbaseError, ErrorContext, Keyspace, KvResponse, Result, Transcoder,
};

use crate::results::{
    CounterResult, ExistsResult, GetResult, LookupInResult, MutateInResult, MutationResult,
};

/// Idempotency filter applied before generic error classification.
///
/// Management operations expose `ignore_if_exists`/`ignore_if_not_exists`
/// variants; when set, a would-be already-exists or not-found failure is
/// converted into a successful no-op here, before [`classify`] ever sees it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorFilter {
    /// Treat an already-exists failure as success.
    pub ignore_existing: bool,
    /// Treat a not-found failure as success.
    pub ignore_missing: bool,
}

impl ErrorFilter {
    /// Returns true if this filter converts the given status into a no-op.
    pub fn ignores(&self, status: Status) -> bool {
        match status {
            Status::Exists | Status::SubdocPathExists => self.ignore_existing,
            Status::NotFound | Status::SubdocPathNotFound => self.ignore_missing,
            _ => false,
        }
    }
}

fn context_of(response: &KvResponse) -> ErrorContext {
    response.context.clone().unwrap_or_default()
}

fn context_string(context: &ErrorContext, field: &str) -> Option<String> {
    context
        .detail
        .as_ref()
        .and_then(|d| d.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Maps a non-OK status onto its error kind.
///
/// `key` names the document the operation targeted; topology errors prefer
/// the names the server reported in its context detail and fall back to the
/// addressed keyspace.
pub fn classify(
    response: &KvResponse,
    key: &str,
    keyspace: Option<&Keyspace>,
) -> Option<CouchbaseError> {
    let status = response.status;
    if status.is_ok() {
        return None;
    }

    let context = context_of(response);
    let key = key.to_string();
    let path = context_string(&context, "path").unwrap_or_else(|| key.clone());
    let message = context_string(&context, "message")
        .unwrap_or_else(|| format!("server reported {status:?}"));

    Some(match status {
        Status::Ok => unreachable!("handled above"),
        Status::NotFound => CouchbaseError::KeyNotFound { key, context },
        Status::Exists => CouchbaseError::KeyExists { key, context },
        Status::TooBig => CouchbaseError::ValueTooBig { key, context },
        Status::Locked => CouchbaseError::KeyLocked { key, context },
        Status::TempFail => CouchbaseError::TempFail { message, context },
        Status::CasMismatch => CouchbaseError::CasMismatch { key, context },
        Status::AuthError => CouchbaseError::Authentication(message),
        Status::BucketMissing => CouchbaseError::BucketMissing(
            context_string(&context, "bucket")
                .or_else(|| keyspace.map(|ks| ks.bucket.clone()))
                .unwrap_or(key),
        ),
        Status::ScopeMissing => CouchbaseError::ScopeMissing(
            context_string(&context, "scope")
                .or_else(|| keyspace.map(|ks| ks.scope.clone()))
                .unwrap_or(key),
        ),
        Status::CollectionMissing => CouchbaseError::CollectionMissing(
            context_string(&context, "collection")
                .or_else(|| keyspace.map(|ks| ks.collection.clone()))
                .unwrap_or(key),
        ),
        Status::ServiceMissing => CouchbaseError::ServiceMissing(message),
        Status::DurabilityImpossible => CouchbaseError::DurabilityImpossible { message, context },
        Status::SubdocPathNotFound => CouchbaseError::PathNotFound { path, context },
        Status::SubdocPathExists => CouchbaseError::PathExists { path, context },
        Status::SubdocInvalidRange => CouchbaseError::InvalidRange { path, context },
        Status::SubdocMultiFailure => classify_multi_failure(response, path, context),
        Status::QueryError => CouchbaseError::QueryError { message, context },
        Status::QueryServiceError => CouchbaseError::QueryService { message, context },
        Status::ServerError => CouchbaseError::Bindings(message),
        Status::NetworkError => CouchbaseError::Network(message),
    })
}

/// A whole-request sub-document failure reports the first failing spec.
fn classify_multi_failure(
    response: &KvResponse,
    fallback_path: String,
    context: ErrorContext,
) -> CouchbaseError {
    let failed = response.fields.iter().find(|f| !f.exists());
    match failed.map(|f| f.status) {
        Some(Status::SubdocPathNotFound) => CouchbaseError::PathNotFound {
            path: fallback_path,
            context,
        },
        Some(Status::SubdocPathExists) => CouchbaseError::PathExists {
            path: fallback_path,
            context,
        },
        Some(Status::SubdocInvalidRange) => CouchbaseError::InvalidRange {
            path: fallback_path,
            context,
        },
        _ => CouchbaseError::Bindings(format!(
            "sub-document request failed without a failing spec: {:?}",
            response.status
        )),
    }
}

/// Fails with the classified error unless the response is OK.
pub fn check(response: &KvResponse, key: &str, keyspace: Option<&Keyspace>) -> Result<()> {
    match classify(response, key, keyspace) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Like [`check`], but applies an idempotency filter first.
///
/// Returns `Ok(true)` on real success and `Ok(false)` when the filter
/// converted a would-be failure into a no-op.
pub fn check_filtered(
    response: &KvResponse,
    key: &str,
    keyspace: Option<&Keyspace>,
    filter: ErrorFilter,
) -> Result<bool> {
    if filter.ignores(response.status) {
        return Ok(false);
    }
    check(response, key, keyspace).map(|()| true)
}

/// Maps a get-style response into a [`GetResult`], decoding the value with
/// the resolved transcoder.
pub fn map_get(
    response: KvResponse,
    key: &str,
    keyspace: &Keyspace,
    transcoder: &Transcoder,
) -> Result<GetResult> {
    check(&response, key, Some(keyspace))?;
    let raw = response.value.unwrap_or_else(Bytes::new);
    let content = if format_tag(response.flags) == FORMAT_BINARY {
        None
    } else {
        Some(transcoder.decode(&raw, response.flags)?)
    };
    Ok(GetResult::new(
        content,
        raw,
        response.flags,
        response.cas,
        response.expiry.map(|s| Duration::from_secs(u64::from(s))),
    ))
}

/// Maps an exists-style response. A not-found status is a successful
/// "does not exist", never an error.
pub fn map_exists(response: KvResponse, key: &str, keyspace: &Keyspace) -> Result<ExistsResult> {
    match response.status {
        Status::Ok => Ok(ExistsResult::new(
            true,
            (!response.cas.is_zero()).then_some(response.cas),
        )),
        Status::NotFound => Ok(ExistsResult::new(false, None)),
        _ => Err(classify(&response, key, Some(keyspace))
            .unwrap_or_else(|| CouchbaseError::Bindings("unmapped exists response".to_string()))),
    }
}

/// Maps a mutation response into a [`MutationResult`].
pub fn map_mutation(
    response: KvResponse,
    key: &str,
    keyspace: &Keyspace,
) -> Result<MutationResult> {
    check(&response, key, Some(keyspace))?;
    Ok(MutationResult::new(response.cas, response.mutation_token))
}

/// Maps a counter response, parsing the decimal value the server returns.
pub fn map_counter(response: KvResponse, key: &str, keyspace: &Keyspace) -> Result<CounterResult> {
    check(&response, key, Some(keyspace))?;
    let raw = response.value.unwrap_or_else(Bytes::new);
    let text = std::str::from_utf8(&raw)
        .map_err(|_| CouchbaseError::Serialization("counter value is not UTF-8".to_string()))?;
    let content: u64 = text.trim().parse().map_err(|_| {
        CouchbaseError::Serialization(format!("counter value {text:?} is not a number"))
    })?;
    Ok(CounterResult::new(
        content,
        response.cas,
        response.mutation_token,
    ))
}

/// Maps a `lookup_in` response. Per-spec failures stay in the fields; only a
/// whole-document failure becomes an error.
pub fn map_lookup_in(
    response: KvResponse,
    key: &str,
    keyspace: &Keyspace,
) -> Result<LookupInResult> {
    match response.status {
        Status::Ok | Status::SubdocMultiFailure => Ok(LookupInResult::new(
            response.cas,
            response.fields,
            response.expiry.map(|s| Duration::from_secs(u64::from(s))),
        )),
        _ => Err(classify(&response, key, Some(keyspace)).unwrap_or_else(|| {
            CouchbaseError::Bindings("unmapped lookup_in response".to_string())
        })),
    }
}

/// Maps a `mutate_in` response. Unlike lookups, sub-document mutations are
/// atomic: any failing spec fails the whole request.
pub fn map_mutate_in(
    response: KvResponse,
    key: &str,
    keyspace: &Keyspace,
) -> Result<MutateInResult> {
    check(&response, key, Some(keyspace))?;
    Ok(MutateInResult::new(
        response.cas,
        response.mutation_token,
        response.fields,
    ))
}
