//! Query execution over the N1QL service.

pub mod analytics;
pub mod search;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use couchbase_core::{CouchbaseError, KvRequest, MutationState, OpCode, Result};

use crate::cluster::ClientCore;
use crate::dispatch::mapper;

/// Consistency requirement for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScanConsistency {
    /// Use whatever index state is available (the default).
    NotBounded,
    /// Wait for the index to catch up with all mutations issued before the
    /// query.
    RequestPlus,
}

impl QueryScanConsistency {
    fn wire_name(&self) -> &'static str {
        match self {
            QueryScanConsistency::NotBounded => "not_bounded",
            QueryScanConsistency::RequestPlus => "request_plus",
        }
    }
}

/// Profiling detail requested from the query service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryProfile {
    /// No profile (the default).
    #[default]
    Off,
    /// Phase timings.
    Phases,
    /// Full operator timings.
    Timings,
}

impl QueryProfile {
    fn wire_name(&self) -> &'static str {
        match self {
            QueryProfile::Off => "off",
            QueryProfile::Phases => "phases",
            QueryProfile::Timings => "timings",
        }
    }
}

/// Options for a N1QL query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Per-call deadline; defaults to the configured query timeout.
    pub timeout: Option<Duration>,
    /// Index consistency requirement. Mutually exclusive with
    /// `consistent_with`.
    pub scan_consistency: Option<QueryScanConsistency>,
    /// Read-your-writes consistency: results must be at least as new as
    /// these mutations. Mutually exclusive with `scan_consistency`.
    pub consistent_with: Option<MutationState>,
    /// Named statement parameters (referenced as `$name`).
    pub named_parameters: HashMap<String, Value>,
    /// Positional statement parameters (referenced as `?` / `$1`).
    pub positional_parameters: Vec<Value>,
    /// Declare the statement read-only, letting the service reject writes.
    pub read_only: bool,
    /// Ad-hoc execution (`true`, the default) versus prepared.
    pub adhoc: Option<bool>,
    /// Request execution metrics in the result metadata.
    pub metrics: bool,
    /// Profiling detail to include in the result metadata.
    pub profile: QueryProfile,
    /// Caller-chosen id propagated through the service for tracing.
    pub client_context_id: Option<String>,
    /// Maximum buffered items per index scan.
    pub scan_cap: Option<u32>,
    /// Operator batch size.
    pub pipeline_batch: Option<u32>,
    /// Maximum buffered items per operator.
    pub pipeline_cap: Option<u32>,
    /// Maximum index-scan parallelism.
    pub max_parallelism: Option<u32>,
    /// Escape hatch: extra body entries passed through verbatim.
    pub raw: HashMap<String, Value>,
}

impl QueryOptions {
    pub(crate) fn build_body(&self, statement: &str) -> Result<Value> {
        if self.scan_consistency.is_some() && self.consistent_with.is_some() {
            return Err(CouchbaseError::InvalidArgument(
                "scan_consistency and consistent_with are mutually exclusive".to_string(),
            ));
        }

        let mut body = Map::new();
        body.insert("statement".to_string(), json!(statement));

        if let Some(consistency) = self.scan_consistency {
            body.insert("scan_consistency".to_string(), json!(consistency.wire_name()));
        }
        if let Some(state) = &self.consistent_with {
            body.insert("scan_consistency".to_string(), json!("at_plus"));
            body.insert("scan_vectors".to_string(), state.to_consistency_payload());
        }
        if !self.positional_parameters.is_empty() {
            body.insert("args".to_string(), json!(self.positional_parameters));
        }
        for (name, value) in &self.named_parameters {
            body.insert(format!("${name}"), value.clone());
        }
        if self.read_only {
            body.insert("readonly".to_string(), json!(true));
        }
        if let Some(adhoc) = self.adhoc {
            body.insert("adhoc".to_string(), json!(adhoc));
        }
        if self.metrics {
            body.insert("metrics".to_string(), json!(true));
        }
        if self.profile != QueryProfile::Off {
            body.insert("profile".to_string(), json!(self.profile.wire_name()));
        }
        if let Some(id) = &self.client_context_id {
            body.insert("client_context_id".to_string(), json!(id));
        }
        if let Some(cap) = self.scan_cap {
            body.insert("scan_cap".to_string(), json!(cap));
        }
        if let Some(batch) = self.pipeline_batch {
            body.insert("pipeline_batch".to_string(), json!(batch));
        }
        if let Some(cap) = self.pipeline_cap {
            body.insert("pipeline_cap".to_string(), json!(cap));
        }
        if let Some(parallelism) = self.max_parallelism {
            body.insert("max_parallelism".to_string(), json!(parallelism));
        }
        for (key, value) in &self.raw {
            body.insert(key.clone(), value.clone());
        }

        Ok(Value::Object(body))
    }
}

/// Metadata accompanying a query result.
#[derive(Debug, Clone, Default)]
pub struct QueryMetaData {
    /// Service-assigned request id.
    pub request_id: Option<String>,
    /// The caller's client context id, echoed back.
    pub client_context_id: Option<String>,
    /// Final statement status (`success`, `errors`, ...).
    pub status: Option<String>,
    /// Result-shape signature.
    pub signature: Option<Value>,
    /// Non-fatal warnings.
    pub warnings: Vec<Value>,
    /// Execution metrics, when requested.
    pub metrics: Option<Value>,
    /// Profile payload, when requested.
    pub profile: Option<Value>,
}

impl QueryMetaData {
    pub(crate) fn from_body(body: &Value) -> Self {
        Self {
            request_id: body
                .get("request_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            client_context_id: body
                .get("client_context_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            status: body
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
            signature: body.get("signature").cloned(),
            warnings: body
                .get("warnings")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            metrics: body.get("metrics").cloned(),
            profile: body.get("profile").cloned(),
        }
    }
}

/// Result of a N1QL query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    rows: Vec<Value>,
    meta_data: QueryMetaData,
}

impl QueryResult {
    pub(crate) fn new(rows: Vec<Value>, meta_data: QueryMetaData) -> Self {
        Self { rows, meta_data }
    }

    /// Returns the result rows.
    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    /// Deserializes every row into a caller type.
    pub fn rows_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.rows
            .iter()
            .map(|row| {
                serde_json::from_value(row.clone())
                    .map_err(|e| CouchbaseError::Serialization(format!("rows_as: {e}")))
            })
            .collect()
    }

    /// Returns the result metadata.
    pub fn meta_data(&self) -> &QueryMetaData {
        &self.meta_data
    }
}

/// Executes query-shaped requests over the dispatcher.
#[derive(Debug)]
pub struct QueryService {
    core: Arc<ClientCore>,
}

impl QueryService {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    /// Executes a N1QL statement.
    pub async fn query(&self, statement: &str, options: QueryOptions) -> Result<QueryResult> {
        let mut request = KvRequest::cluster_level(OpCode::Query, options.build_body(statement)?);
        request.timeout = options.timeout;

        let response = self.core.dispatcher.execute(request).await?;
        mapper::check(&response, statement, None)?;

        let body = response.body.unwrap_or(Value::Null);
        let rows = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(QueryResult::new(rows, QueryMetaData::from_body(&body)))
    }

    /// Executes an analytics statement.
    pub async fn analytics_query(
        &self,
        statement: &str,
        options: analytics::AnalyticsOptions,
    ) -> Result<analytics::AnalyticsResult> {
        analytics::execute(&self.core, statement, options).await
    }

    /// Executes a full-text search.
    pub async fn search_query(
        &self,
        index_name: &str,
        query: search::SearchQuery,
        options: search::SearchOptions,
    ) -> Result<search::SearchResult> {
        search::execute(&self.core, index_name, query, options).await
    }
}
