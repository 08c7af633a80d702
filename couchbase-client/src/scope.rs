//! Scopes: named sub-partitions of a bucket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use couchbase_core::Keyspace;

use crate::bucket::BucketInner;
use crate::collection::Collection;

pub(crate) struct ScopeInner {
    name: String,
    bucket: Arc<BucketInner>,
    collections: StdMutex<HashMap<String, Collection>>,
}

/// A named scope inside a bucket.
///
/// Scopes hold collections; resolution is lazy and memoized, so asking for
/// the same collection name twice returns the same logical handle.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl Scope {
    pub(crate) fn new(name: String, bucket: Arc<BucketInner>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name,
                bucket,
                collections: StdMutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the scope name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the bucket name this scope belongs to.
    pub fn bucket_name(&self) -> &str {
        self.inner.bucket.name()
    }

    /// Returns a collection handle, memoized per name.
    pub fn collection(&self, name: &str) -> Collection {
        if let Ok(collections) = self.inner.collections.lock() {
            if let Some(existing) = collections.get(name) {
                return existing.clone();
            }
        }

        let keyspace = Keyspace::new(
            self.inner.bucket.name().to_string(),
            self.inner.name.clone(),
            name.to_string(),
        );
        let collection = Collection::new(keyspace, Arc::clone(&self.inner.bucket));

        if let Ok(mut collections) = self.inner.collections.lock() {
            // Another task may have won the race; keep the first handle so
            // memoization stays stable.
            return collections
                .entry(name.to_string())
                .or_insert(collection)
                .clone();
        }
        collection
    }
}
