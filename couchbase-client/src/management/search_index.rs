//! Full-text search index management.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use couchbase_core::{CouchbaseError, Result};

use super::admin;
use crate::cluster::ClientCore;
use crate::dispatch::mapper::ErrorFilter;

/// A search index definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndex {
    /// Index name.
    pub name: String,
    /// Service-assigned UUID; present on definitions read back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Index type (`fulltext-index`).
    #[serde(default = "SearchIndex::default_type", rename = "type")]
    pub index_type: String,
    /// Name of the bucket the index covers.
    #[serde(default)]
    pub source_name: String,
    /// Index mapping and analysis parameters.
    #[serde(default)]
    pub params: Value,
}

impl SearchIndex {
    fn default_type() -> String {
        "fulltext-index".to_string()
    }

    /// Creates a definition covering the given bucket with default mapping.
    pub fn new(name: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: None,
            index_type: Self::default_type(),
            source_name: source_name.into(),
            params: json!({}),
        }
    }
}

/// Options for dropping a search index.
#[derive(Debug, Clone, Default)]
pub struct DropSearchIndexOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the index does not exist.
    pub ignore_if_not_exists: bool,
}

/// Manages search indexes over the administrative path.
#[derive(Debug)]
pub struct SearchIndexManager {
    core: Arc<ClientCore>,
}

impl SearchIndexManager {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    /// Fetches a search index definition by name.
    pub async fn get_index(&self, name: &str) -> Result<SearchIndex> {
        let mut payload = Map::new();
        payload.insert("name".to_string(), json!(name));

        let body = admin(
            &self.core,
            "search-index.get",
            payload,
            None,
            ErrorFilter::default(),
            name,
        )
        .await?
        .unwrap_or(Value::Null);

        serde_json::from_value(body.get("index").cloned().unwrap_or(Value::Null))
            .map_err(|e| CouchbaseError::Serialization(format!("search index: {e}")))
    }

    /// Lists every search index definition.
    pub async fn get_all_indexes(&self) -> Result<Vec<SearchIndex>> {
        let body = admin(
            &self.core,
            "search-index.get-all",
            Map::new(),
            None,
            ErrorFilter::default(),
            "",
        )
        .await?
        .unwrap_or(Value::Null);

        serde_json::from_value(body.get("indexes").cloned().unwrap_or_else(|| json!([])))
            .map_err(|e| CouchbaseError::Serialization(format!("search index listing: {e}")))
    }

    /// Creates or updates a search index definition.
    pub async fn upsert_index(&self, index: SearchIndex) -> Result<()> {
        let name = index.name.clone();
        let mut payload = Map::new();
        payload.insert(
            "index".to_string(),
            serde_json::to_value(&index).map_err(|e| {
                CouchbaseError::Serialization(format!("search index encode: {e}"))
            })?,
        );

        admin(
            &self.core,
            "search-index.upsert",
            payload,
            None,
            ErrorFilter::default(),
            &name,
        )
        .await
        .map(|_| ())
    }

    /// Drops a search index.
    pub async fn drop_index(&self, name: &str, options: DropSearchIndexOptions) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("name".to_string(), json!(name));

        admin(
            &self.core,
            "search-index.drop",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: false,
                ignore_missing: options.ignore_if_not_exists,
            },
            name,
        )
        .await
        .map(|_| ())
    }

    /// Returns the number of documents the index currently covers.
    pub async fn get_indexed_documents_count(&self, name: &str) -> Result<u64> {
        let mut payload = Map::new();
        payload.insert("name".to_string(), json!(name));

        let body = admin(
            &self.core,
            "search-index.doc-count",
            payload,
            None,
            ErrorFilter::default(),
            name,
        )
        .await?
        .unwrap_or(Value::Null);

        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }
}
