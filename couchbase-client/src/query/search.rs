//! Full-text search execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use couchbase_core::{CouchbaseError, KvRequest, OpCode, Result};

use crate::cluster::ClientCore;
use crate::dispatch::mapper;

/// A search query expression.
///
/// The expression tree is opaque to the client core; it travels as JSON to
/// the search service, which owns the query language.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    body: Value,
}

impl SearchQuery {
    /// A query-string query (`+field:value -other`).
    pub fn query_string(query: impl Into<String>) -> Self {
        Self {
            body: json!({"query": query.into()}),
        }
    }

    /// A match query against analyzed text.
    pub fn match_query(term: impl Into<String>) -> Self {
        Self {
            body: json!({"match": term.into()}),
        }
    }

    /// A term query for exact, unanalyzed matches.
    pub fn term(term: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            body: json!({"term": term.into(), "field": field.into()}),
        }
    }

    /// Matches every document in the index.
    pub fn match_all() -> Self {
        Self {
            body: json!({"match_all": {}}),
        }
    }

    /// A raw query body, for expressions without a dedicated constructor.
    pub fn raw(body: Value) -> Self {
        Self { body }
    }

    /// Returns the JSON form sent to the service.
    pub fn to_json(&self) -> &Value {
        &self.body
    }
}

/// Options for a search query.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Per-call deadline; defaults to the configured query timeout.
    pub timeout: Option<Duration>,
    /// Maximum number of hits to return.
    pub limit: Option<u32>,
    /// Number of hits to skip.
    pub skip: Option<u32>,
    /// Include scoring explanations per hit.
    pub explain: bool,
    /// Stored fields to return with each hit.
    pub fields: Vec<String>,
    /// Sort expressions (`field`, `-field`, `_score`).
    pub sort: Vec<String>,
    /// Facet definitions by name.
    pub facets: HashMap<String, Value>,
    /// Escape hatch: extra body entries passed through verbatim.
    pub raw: HashMap<String, Value>,
}

/// One hit in a search result.
#[derive(Debug, Clone)]
pub struct SearchRow {
    /// Index partition that produced the hit.
    pub index: String,
    /// Matched document id.
    pub id: String,
    /// Relevance score.
    pub score: f64,
    /// Stored fields, when requested.
    pub fields: Option<Value>,
}

/// Metadata accompanying a search result.
#[derive(Debug, Clone, Default)]
pub struct SearchMetaData {
    /// Number of index partitions that answered.
    pub success_count: Option<u64>,
    /// Number of index partitions that failed.
    pub error_count: Option<u64>,
    /// Server-side execution time in nanoseconds.
    pub took: Option<u64>,
    /// Total hits across the index, independent of `limit`.
    pub total_hits: Option<u64>,
    /// Highest relevance score in the result.
    pub max_score: Option<f64>,
}

/// Result of a search query.
#[derive(Debug, Clone)]
pub struct SearchResult {
    rows: Vec<SearchRow>,
    facets: Option<Value>,
    meta_data: SearchMetaData,
}

impl SearchResult {
    /// Returns the hits.
    pub fn rows(&self) -> &[SearchRow] {
        &self.rows
    }

    /// Returns the facet results, when facets were requested.
    pub fn facets(&self) -> Option<&Value> {
        self.facets.as_ref()
    }

    /// Returns the result metadata.
    pub fn meta_data(&self) -> &SearchMetaData {
        &self.meta_data
    }
}

pub(crate) async fn execute(
    core: &Arc<ClientCore>,
    index_name: &str,
    query: SearchQuery,
    options: SearchOptions,
) -> Result<SearchResult> {
    let mut body = Map::new();
    body.insert("index".to_string(), json!(index_name));
    body.insert("query".to_string(), query.to_json().clone());
    if let Some(limit) = options.limit {
        body.insert("size".to_string(), json!(limit));
    }
    if let Some(skip) = options.skip {
        body.insert("from".to_string(), json!(skip));
    }
    if options.explain {
        body.insert("explain".to_string(), json!(true));
    }
    if !options.fields.is_empty() {
        body.insert("fields".to_string(), json!(options.fields));
    }
    if !options.sort.is_empty() {
        body.insert("sort".to_string(), json!(options.sort));
    }
    if !options.facets.is_empty() {
        body.insert("facets".to_string(), json!(options.facets));
    }
    for (key, value) in &options.raw {
        body.insert(key.clone(), value.clone());
    }

    let mut request = KvRequest::cluster_level(OpCode::SearchQuery, Value::Object(body));
    request.timeout = options.timeout;

    let response = core.dispatcher.execute(request).await?;
    mapper::check(&response, index_name, None).map_err(|e| match e {
        CouchbaseError::QueryError { message, context } => {
            CouchbaseError::Search { message, context }
        }
        other => other,
    })?;

    let body = response.body.unwrap_or(Value::Null);
    let rows = body
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| SearchRow {
                    index: hit
                        .get("index")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    id: hit
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    score: hit.get("score").and_then(Value::as_f64).unwrap_or(0.0),
                    fields: hit.get("fields").cloned(),
                })
                .collect()
        })
        .unwrap_or_default();

    let status = body.get("status").cloned().unwrap_or(Value::Null);
    let meta_data = SearchMetaData {
        success_count: status.get("successful").and_then(Value::as_u64),
        error_count: status.get("failed").and_then(Value::as_u64),
        took: body.get("took").and_then(Value::as_u64),
        total_hits: body.get("total_hits").and_then(Value::as_u64),
        max_score: body.get("max_score").and_then(Value::as_f64),
    };

    Ok(SearchResult {
        rows,
        facets: body.get("facets").cloned(),
        meta_data,
    })
}
