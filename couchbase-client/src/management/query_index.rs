//! Query (secondary) index management.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use couchbase_core::{CouchbaseError, Result};

use super::admin;
use crate::cluster::ClientCore;
use crate::dispatch::mapper::ErrorFilter;

/// Name the service gives a primary index created without an explicit name.
pub const DEFAULT_PRIMARY_INDEX_NAME: &str = "#primary";

/// A secondary or primary index definition, as reported by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryIndex {
    /// Index name.
    pub name: String,
    /// True for the bucket's primary index.
    #[serde(default)]
    pub is_primary: bool,
    /// Index backend (`gsi`).
    #[serde(default, rename = "using")]
    pub index_type: String,
    /// Lifecycle state (`deferred`, `building`, `online`).
    #[serde(default)]
    pub state: String,
    /// The keyspace the index covers.
    #[serde(default)]
    pub keyspace: String,
    /// Indexed expressions.
    #[serde(default)]
    pub index_key: Vec<String>,
    /// Partial-index filter condition, if any.
    #[serde(default)]
    pub condition: Option<String>,
}

/// Options for creating a secondary index.
#[derive(Debug, Clone, Default)]
pub struct CreateQueryIndexOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the index already exists.
    pub ignore_if_exists: bool,
    /// Partial-index filter condition.
    pub condition: Option<String>,
    /// Number of index replicas.
    pub num_replicas: Option<u32>,
    /// Defer the build until `build_deferred_indexes`.
    pub deferred: bool,
}

/// Options for creating a primary index.
#[derive(Debug, Clone, Default)]
pub struct CreatePrimaryQueryIndexOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Name for the primary index; defaults to `#primary`.
    pub index_name: Option<String>,
    /// Succeed without error if the index already exists.
    pub ignore_if_exists: bool,
    /// Number of index replicas.
    pub num_replicas: Option<u32>,
    /// Defer the build until `build_deferred_indexes`.
    pub deferred: bool,
}

/// Options for dropping a secondary index.
#[derive(Debug, Clone, Default)]
pub struct DropQueryIndexOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the index does not exist.
    pub ignore_if_not_exists: bool,
}

/// Options for dropping a primary index.
#[derive(Debug, Clone, Default)]
pub struct DropPrimaryQueryIndexOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Name of the primary index; defaults to `#primary`.
    pub index_name: Option<String>,
    /// Succeed without error if the index does not exist.
    pub ignore_if_not_exists: bool,
}

/// Options for watching indexes come online.
#[derive(Debug, Clone, Default)]
pub struct WatchQueryIndexesOptions {
    /// Also wait for the primary index.
    pub watch_primary: bool,
}

/// Manages query indexes over the administrative path.
#[derive(Debug)]
pub struct QueryIndexManager {
    core: Arc<ClientCore>,
}

impl QueryIndexManager {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    /// Lists every index on the given bucket.
    pub async fn get_all_indexes(&self, bucket_name: &str) -> Result<Vec<QueryIndex>> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(bucket_name));

        let body = admin(
            &self.core,
            "query-index.get-all",
            payload,
            None,
            ErrorFilter::default(),
            bucket_name,
        )
        .await?
        .unwrap_or(Value::Null);

        let indexes = body
            .get("indexes")
            .cloned()
            .unwrap_or_else(|| json!([]));
        serde_json::from_value(indexes)
            .map_err(|e| CouchbaseError::Serialization(format!("index listing: {e}")))
    }

    /// Creates a secondary index over the given fields.
    pub async fn create_index(
        &self,
        bucket_name: &str,
        index_name: &str,
        fields: Vec<String>,
        options: CreateQueryIndexOptions,
    ) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(bucket_name));
        payload.insert("name".to_string(), json!(index_name));
        payload.insert("fields".to_string(), json!(fields));
        payload.insert("is_primary".to_string(), json!(false));
        payload.insert("deferred".to_string(), json!(options.deferred));
        if let Some(condition) = &options.condition {
            payload.insert("condition".to_string(), json!(condition));
        }
        if let Some(replicas) = options.num_replicas {
            payload.insert("num_replicas".to_string(), json!(replicas));
        }

        admin(
            &self.core,
            "query-index.create",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: options.ignore_if_exists,
                ignore_missing: false,
            },
            index_name,
        )
        .await
        .map(|_| ())
    }

    /// Creates the bucket's primary index.
    pub async fn create_primary_index(
        &self,
        bucket_name: &str,
        options: CreatePrimaryQueryIndexOptions,
    ) -> Result<()> {
        let name = options
            .index_name
            .clone()
            .unwrap_or_else(|| DEFAULT_PRIMARY_INDEX_NAME.to_string());

        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(bucket_name));
        payload.insert("name".to_string(), json!(name));
        payload.insert("fields".to_string(), Value::Array(Vec::new()));
        payload.insert("is_primary".to_string(), json!(true));
        payload.insert("deferred".to_string(), json!(options.deferred));
        if let Some(replicas) = options.num_replicas {
            payload.insert("num_replicas".to_string(), json!(replicas));
        }

        admin(
            &self.core,
            "query-index.create",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: options.ignore_if_exists,
                ignore_missing: false,
            },
            &name,
        )
        .await
        .map(|_| ())
    }

    /// Drops a secondary index.
    pub async fn drop_index(
        &self,
        bucket_name: &str,
        index_name: &str,
        options: DropQueryIndexOptions,
    ) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(bucket_name));
        payload.insert("name".to_string(), json!(index_name));

        admin(
            &self.core,
            "query-index.drop",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: false,
                ignore_missing: options.ignore_if_not_exists,
            },
            index_name,
        )
        .await
        .map(|_| ())
    }

    /// Drops the bucket's primary index.
    pub async fn drop_primary_index(
        &self,
        bucket_name: &str,
        options: DropPrimaryQueryIndexOptions,
    ) -> Result<()> {
        let name = options
            .index_name
            .clone()
            .unwrap_or_else(|| DEFAULT_PRIMARY_INDEX_NAME.to_string());

        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(bucket_name));
        payload.insert("name".to_string(), json!(name));

        admin(
            &self.core,
            "query-index.drop",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: false,
                ignore_missing: options.ignore_if_not_exists,
            },
            &name,
        )
        .await
        .map(|_| ())
    }

    /// Starts building every deferred index on the bucket, returning the
    /// names of the indexes now building.
    pub async fn build_deferred_indexes(&self, bucket_name: &str) -> Result<Vec<String>> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(bucket_name));

        let body = admin(
            &self.core,
            "query-index.build-deferred",
            payload,
            None,
            ErrorFilter::default(),
            bucket_name,
        )
        .await?
        .unwrap_or(Value::Null);

        Ok(body
            .get("names")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Polls until every named index (and optionally the primary index) is
    /// online, or the deadline passes.
    pub async fn watch_indexes(
        &self,
        bucket_name: &str,
        index_names: Vec<String>,
        deadline: Duration,
        options: WatchQueryIndexesOptions,
    ) -> Result<()> {
        let mut watched = index_names;
        if options.watch_primary {
            watched.push(DEFAULT_PRIMARY_INDEX_NAME.to_string());
        }

        let started = std::time::Instant::now();
        loop {
            let indexes = self.get_all_indexes(bucket_name).await?;
            let all_online = watched.iter().all(|name| {
                indexes
                    .iter()
                    .any(|index| &index.name == name && index.state == "online")
            });
            if all_online {
                return Ok(());
            }

            if started.elapsed() >= deadline {
                return Err(CouchbaseError::Timeout(format!(
                    "indexes on {bucket_name} did not come online within {deadline:?}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
