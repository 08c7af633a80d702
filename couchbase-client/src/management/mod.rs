//! Management subsystems: thin request/response wrappers over the
//! dispatcher's administrative path.
//!
//! Every subsystem exposes idempotent variants (`ignore_if_exists`,
//! `ignore_if_not_exists`). The flag is honored at the mapper boundary,
//! before generic error classification, converting a would-be
//! already-exists/not-found failure into a successful no-op.

pub mod collections;
pub mod query_index;
pub mod search_index;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use couchbase_core::{KvRequest, OpCode, Result};

use crate::cluster::ClientCore;
use crate::dispatch::mapper::{self, ErrorFilter};

/// Executes one administrative action.
///
/// Returns `Some(body)` on success and `None` when the idempotency filter
/// converted an already-exists/not-found failure into a no-op.
pub(crate) async fn admin(
    core: &Arc<ClientCore>,
    action: &str,
    mut payload: Map<String, Value>,
    timeout: Option<Duration>,
    filter: ErrorFilter,
    entity: &str,
) -> Result<Option<Value>> {
    payload.insert("action".to_string(), Value::String(action.to_string()));

    let mut request = KvRequest::cluster_level(OpCode::Admin, Value::Object(payload));
    request.timeout = timeout;

    let response = core.dispatcher.execute(request).await?;
    if !mapper::check_filtered(&response, entity, None, filter)? {
        tracing::debug!(action, entity, "management no-op (idempotent flag)");
        return Ok(None);
    }
    Ok(Some(response.body.unwrap_or(Value::Null)))
}
