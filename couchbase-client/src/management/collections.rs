//! Scope and collection management for a bucket.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use couchbase_core::{CouchbaseError, Result};

use super::admin;
use crate::cluster::ClientCore;
use crate::dispatch::mapper::ErrorFilter;

/// A collection definition inside a scope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,
    /// Name of the scope holding the collection.
    pub scope_name: String,
}

impl CollectionSpec {
    /// Creates a spec addressing `scope_name.name`.
    pub fn new(name: impl Into<String>, scope_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope_name: scope_name.into(),
        }
    }
}

/// A scope definition with its collections.
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeSpec {
    /// Scope name.
    pub name: String,
    /// The collections the scope holds.
    #[serde(default)]
    pub collections: Vec<CollectionSpec>,
}

/// Options for creating a scope.
#[derive(Debug, Clone, Default)]
pub struct CreateScopeOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the scope already exists.
    pub ignore_if_exists: bool,
}

/// Options for dropping a scope.
#[derive(Debug, Clone, Default)]
pub struct DropScopeOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the scope does not exist.
    pub ignore_if_not_exists: bool,
}

/// Options for creating a collection.
#[derive(Debug, Clone, Default)]
pub struct CreateCollectionOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the collection already exists.
    pub ignore_if_exists: bool,
}

/// Options for dropping a collection.
#[derive(Debug, Clone, Default)]
pub struct DropCollectionOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the collection does not exist.
    pub ignore_if_not_exists: bool,
}

/// Manages scopes and collections for one bucket.
#[derive(Debug)]
pub struct CollectionManager {
    core: Arc<ClientCore>,
    bucket_name: String,
}

impl CollectionManager {
    pub(crate) fn new(core: Arc<ClientCore>, bucket_name: String) -> Self {
        Self { core, bucket_name }
    }

    /// Lists every scope in the bucket with its collections.
    pub async fn get_all_scopes(&self) -> Result<Vec<ScopeSpec>> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(self.bucket_name));

        let body = admin(
            &self.core,
            "collection.get-all-scopes",
            payload,
            None,
            ErrorFilter::default(),
            &self.bucket_name,
        )
        .await?
        .unwrap_or(Value::Null);

        serde_json::from_value(body.get("scopes").cloned().unwrap_or_else(|| json!([])))
            .map_err(|e| CouchbaseError::Serialization(format!("scope listing: {e}")))
    }

    /// Fetches one scope definition by name.
    pub async fn get_scope(&self, scope_name: &str) -> Result<ScopeSpec> {
        let scopes = self.get_all_scopes().await?;
        scopes
            .into_iter()
            .find(|scope| scope.name == scope_name)
            .ok_or_else(|| CouchbaseError::ScopeMissing(scope_name.to_string()))
    }

    /// Creates a scope.
    pub async fn create_scope(&self, scope_name: &str, options: CreateScopeOptions) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(self.bucket_name));
        payload.insert("scope".to_string(), json!(scope_name));

        admin(
            &self.core,
            "collection.create-scope",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: options.ignore_if_exists,
                ignore_missing: false,
            },
            scope_name,
        )
        .await
        .map(|_| ())
    }

    /// Drops a scope and every collection in it.
    pub async fn drop_scope(&self, scope_name: &str, options: DropScopeOptions) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(self.bucket_name));
        payload.insert("scope".to_string(), json!(scope_name));

        admin(
            &self.core,
            "collection.drop-scope",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: false,
                ignore_missing: options.ignore_if_not_exists,
            },
            scope_name,
        )
        .await
        .map(|_| ())
    }

    /// Creates a collection.
    pub async fn create_collection(
        &self,
        spec: CollectionSpec,
        options: CreateCollectionOptions,
    ) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(self.bucket_name));
        payload.insert("scope".to_string(), json!(spec.scope_name));
        payload.insert("name".to_string(), json!(spec.name));

        admin(
            &self.core,
            "collection.create",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: options.ignore_if_exists,
                ignore_missing: false,
            },
            &spec.name,
        )
        .await
        .map(|_| ())
    }

    /// Drops a collection.
    pub async fn drop_collection(
        &self,
        spec: CollectionSpec,
        options: DropCollectionOptions,
    ) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("bucket".to_string(), json!(self.bucket_name));
        payload.insert("scope".to_string(), json!(spec.scope_name));
        payload.insert("name".to_string(), json!(spec.name));

        admin(
            &self.core,
            "collection.drop",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: false,
                ignore_missing: options.ignore_if_not_exists,
            },
            &spec.name,
        )
        .await
        .map(|_| ())
    }
}
