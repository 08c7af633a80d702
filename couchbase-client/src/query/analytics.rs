//! Analytics query execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use couchbase_core::{CouchbaseError, KvRequest, OpCode, Result};

use super::QueryMetaData;
use crate::cluster::ClientCore;
use crate::dispatch::mapper;

/// Consistency requirement for an analytics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsScanConsistency {
    /// Use whatever dataset state is available (the default).
    NotBounded,
    /// Wait for the dataset to catch up with prior mutations.
    RequestPlus,
}

/// Options for an analytics query.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsOptions {
    /// Per-call deadline; defaults to the configured query timeout.
    pub timeout: Option<Duration>,
    /// Named statement parameters.
    pub named_parameters: HashMap<String, Value>,
    /// Positional statement parameters.
    pub positional_parameters: Vec<Value>,
    /// Declare the statement read-only.
    pub read_only: bool,
    /// Run ahead of queued non-priority statements.
    pub priority: bool,
    /// Dataset consistency requirement.
    pub scan_consistency: Option<AnalyticsScanConsistency>,
    /// Caller-chosen id propagated through the service for tracing.
    pub client_context_id: Option<String>,
    /// Escape hatch: extra body entries passed through verbatim.
    pub raw: HashMap<String, Value>,
}

impl AnalyticsOptions {
    fn build_body(&self, statement: &str) -> Value {
        let mut body = Map::new();
        body.insert("statement".to_string(), json!(statement));
        if !self.positional_parameters.is_empty() {
            body.insert("args".to_string(), json!(self.positional_parameters));
        }
        for (name, value) in &self.named_parameters {
            body.insert(format!("${name}"), value.clone());
        }
        if self.read_only {
            body.insert("readonly".to_string(), json!(true));
        }
        if self.priority {
            body.insert("priority".to_string(), json!(-1));
        }
        if let Some(consistency) = self.scan_consistency {
            let name = match consistency {
                AnalyticsScanConsistency::NotBounded => "not_bounded",
                AnalyticsScanConsistency::RequestPlus => "request_plus",
            };
            body.insert("scan_consistency".to_string(), json!(name));
        }
        if let Some(id) = &self.client_context_id {
            body.insert("client_context_id".to_string(), json!(id));
        }
        for (key, value) in &self.raw {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

/// Result of an analytics query.
#[derive(Debug, Clone)]
pub struct AnalyticsResult {
    rows: Vec<Value>,
    meta_data: QueryMetaData,
}

impl AnalyticsResult {
    /// Returns the result rows.
    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    /// Returns the result metadata.
    pub fn meta_data(&self) -> &QueryMetaData {
        &self.meta_data
    }
}

pub(crate) async fn execute(
    core: &Arc<ClientCore>,
    statement: &str,
    options: AnalyticsOptions,
) -> Result<AnalyticsResult> {
    let mut request =
        KvRequest::cluster_level(OpCode::AnalyticsQuery, options.build_body(statement));
    request.timeout = options.timeout;

    let response = core.dispatcher.execute(request).await?;
    mapper::check(&response, statement, None).map_err(|e| match e {
        // The analytics service reports statement failures through the same
        // status; re-tag them with the analytics kind.
        CouchbaseError::QueryError { message, context } => {
            CouchbaseError::Analytics { message, context }
        }
        other => other,
    })?;

    let body = response.body.unwrap_or(Value::Null);
    let rows = body
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok(AnalyticsResult {
        rows,
        meta_data: QueryMetaData::from_body(&body),
    })
}
