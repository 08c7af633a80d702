//! Collections: the unit key-value operations target.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use couchbase_core::protocol::{SubdocOp, SubdocSpec};
use couchbase_core::transcoder::{make_flags, COMPRESSION_NONE, FORMAT_BINARY};
use couchbase_core::{Cas, CouchbaseError, Keyspace, KvRequest, OpCode, Result, Transcoder};

use crate::bucket::BucketInner;
use crate::dispatch::mapper;
use crate::options::{
    expiry_secs, AppendOptions, DecrementOptions, ExistsOptions, GetAndLockOptions,
    GetAndTouchOptions, GetOptions, IncrementOptions, InsertOptions, LookupInOptions,
    MutateInOptions, PrependOptions, RemoveOptions, ReplaceOptions, TouchOptions, UnlockOptions,
    UpsertOptions,
};
use crate::results::{
    CounterResult, ExistsResult, GetResult, LookupInResult, MutateInResult, MutationResult,
};
use crate::subdoc::{lookup_specs, mutate_specs, LookupInSpec, MutateInSpec};

pub(crate) struct CollectionInner {
    pub(crate) keyspace: Keyspace,
    pub(crate) bucket: Arc<BucketInner>,
    pub(crate) transcoder: StdMutex<Option<Transcoder>>,
}

/// A named collection inside a scope; the target of document operations.
///
/// Handles are cheap to clone and memoized by the owning scope, so asking
/// for the same collection twice returns the same logical handle.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("keyspace", &self.inner.keyspace)
            .finish_non_exhaustive()
    }
}

impl Collection {
    pub(crate) fn new(keyspace: Keyspace, bucket: Arc<BucketInner>) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                keyspace,
                bucket,
                transcoder: StdMutex::new(None),
            }),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.inner.keyspace.collection
    }

    /// Returns the full keyspace this collection addresses.
    pub fn keyspace(&self) -> &Keyspace {
        &self.inner.keyspace
    }

    /// Installs a transcoder capability pair for this collection only,
    /// overriding the bucket and process defaults.
    pub fn set_transcoder(&self, transcoder: Transcoder) {
        if let Ok(mut slot) = self.inner.transcoder.lock() {
            *slot = Some(transcoder);
        }
    }

    /// Resolves the effective transcoder:
    /// collection override → bucket override → process default.
    pub(crate) fn transcoder(&self) -> Transcoder {
        if let Ok(slot) = self.inner.transcoder.lock() {
            if let Some(transcoder) = slot.as_ref() {
                return transcoder.clone();
            }
        }
        self.inner.bucket.transcoder()
    }

    fn request(&self, opcode: OpCode, id: &str, timeout: Option<Duration>) -> KvRequest {
        let mut request = KvRequest::new(opcode, self.inner.keyspace.clone(), id);
        request.timeout = timeout;
        request
    }

    /// Retrieves a document.
    pub async fn get(&self, id: &str, options: GetOptions) -> Result<GetResult> {
        if !options.project.is_empty() {
            return self.get_projected(id, options).await;
        }

        let mut request = self.request(OpCode::Get, id, options.timeout);
        request.with_expiry = options.with_expiry;

        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_get(response, id, &self.inner.keyspace, &self.transcoder())
    }

    /// A projected get fetches only the requested paths through the
    /// sub-document API and reassembles them into a partial document.
    async fn get_projected(&self, id: &str, options: GetOptions) -> Result<GetResult> {
        let mut request = self.request(OpCode::LookupIn, id, options.timeout);
        request.with_expiry = options.with_expiry;
        request.specs = options
            .project
            .iter()
            .map(|path| SubdocSpec::lookup(SubdocOp::Get, path.clone()))
            .collect();

        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        let lookup = mapper::map_lookup_in(response, id, &self.inner.keyspace)?;

        let mut assembled = Value::Object(serde_json::Map::new());
        for (index, path) in options.project.iter().enumerate() {
            if let Ok(fragment) = lookup.content_at(index) {
                insert_at_path(&mut assembled, path, fragment);
            }
        }

        let raw = serde_json::to_vec(&assembled)
            .map_err(|e| CouchbaseError::Serialization(format!("projection: {e}")))?;
        Ok(GetResult::new(
            Some(assembled),
            Bytes::from(raw),
            make_flags(couchbase_core::transcoder::FORMAT_JSON, COMPRESSION_NONE),
            lookup.cas(),
            lookup.expiry(),
        ))
    }

    /// Checks whether a document exists without fetching it.
    pub async fn exists(&self, id: &str, options: ExistsOptions) -> Result<ExistsResult> {
        let request = self.request(OpCode::Exists, id, options.timeout);
        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_exists(response, id, &self.inner.keyspace)
    }

    /// Retrieves a document and locks it against writes for `lock_time`.
    pub async fn get_and_lock(
        &self,
        id: &str,
        lock_time: Duration,
        options: GetAndLockOptions,
    ) -> Result<GetResult> {
        let mut request = self.request(OpCode::GetAndLock, id, options.timeout);
        request.lock_time = Some(lock_time.as_secs().max(1) as u32);
        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_get(response, id, &self.inner.keyspace, &self.transcoder())
    }

    /// Retrieves a document and updates its expiry in one round trip.
    pub async fn get_and_touch(
        &self,
        id: &str,
        expiry: Duration,
        options: GetAndTouchOptions,
    ) -> Result<GetResult> {
        let mut request = self.request(OpCode::GetAndTouch, id, options.timeout);
        request.expiry = expiry_secs(Some(expiry));
        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_get(response, id, &self.inner.keyspace, &self.transcoder())
    }

    /// Stores a document, creating or replacing it.
    pub async fn upsert(
        &self,
        id: &str,
        content: impl Into<Value>,
        options: UpsertOptions,
    ) -> Result<MutationResult> {
        let (value, flags) = self.transcoder().encode(&content.into())?;
        let mut request = self.request(OpCode::Upsert, id, options.timeout);
        request.value = Some(value);
        request.flags = flags;
        request.expiry = expiry_secs(options.expiry);
        request.cas = options.cas.unwrap_or(Cas::ZERO);
        request.durability = options.durability;

        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_mutation(response, id, &self.inner.keyspace)
    }

    /// Stores a document that must not exist yet.
    pub async fn insert(
        &self,
        id: &str,
        content: impl Into<Value>,
        options: InsertOptions,
    ) -> Result<MutationResult> {
        let (value, flags) = self.transcoder().encode(&content.into())?;
        let mut request = self.request(OpCode::Insert, id, options.timeout);
        request.value = Some(value);
        request.flags = flags;
        request.expiry = expiry_secs(options.expiry);
        request.durability = options.durability;

        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_mutation(response, id, &self.inner.keyspace)
    }

    /// Stores a document that must already exist.
    pub async fn replace(
        &self,
        id: &str,
        content: impl Into<Value>,
        options: ReplaceOptions,
    ) -> Result<MutationResult> {
        let (value, flags) = self.transcoder().encode(&content.into())?;
        let mut request = self.request(OpCode::Replace, id, options.timeout);
        request.value = Some(value);
        request.flags = flags;
        request.expiry = expiry_secs(options.expiry);
        request.cas = options.cas.unwrap_or(Cas::ZERO);
        request.durability = options.durability;

        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_mutation(response, id, &self.inner.keyspace)
    }

    /// Removes a document.
    pub async fn remove(&self, id: &str, options: RemoveOptions) -> Result<MutationResult> {
        let mut request = self.request(OpCode::Remove, id, options.timeout);
        request.cas = options.cas.unwrap_or(Cas::ZERO);
        request.durability = options.durability;

        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_mutation(response, id, &self.inner.keyspace)
    }

    /// Releases a lock taken by [`get_and_lock`](Self::get_and_lock).
    ///
    /// The CAS must be the one the locking get returned.
    pub async fn unlock(&self, id: &str, cas: Cas, options: UnlockOptions) -> Result<()> {
        let mut request = self.request(OpCode::Unlock, id, options.timeout);
        request.cas = cas;
        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::check(&response, id, Some(&self.inner.keyspace))
    }

    /// Updates a document's expiry without touching its value.
    pub async fn touch(
        &self,
        id: &str,
        expiry: Duration,
        options: TouchOptions,
    ) -> Result<MutationResult> {
        let mut request = self.request(OpCode::Touch, id, options.timeout);
        request.expiry = expiry_secs(Some(expiry));
        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_mutation(response, id, &self.inner.keyspace)
    }

    /// Performs a batched sub-document lookup.
    ///
    /// Each spec succeeds or fails independently; only a missing document
    /// fails the whole call.
    pub async fn lookup_in(
        &self,
        id: &str,
        specs: Vec<LookupInSpec>,
        options: LookupInOptions,
    ) -> Result<LookupInResult> {
        let mut request = self.request(OpCode::LookupIn, id, options.timeout);
        request.with_expiry = options.with_expiry;
        request.specs = lookup_specs(specs);
        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_lookup_in(response, id, &self.inner.keyspace)
    }

    /// Performs a batched sub-document mutation, atomically.
    pub async fn mutate_in(
        &self,
        id: &str,
        specs: Vec<MutateInSpec>,
        options: MutateInOptions,
    ) -> Result<MutateInResult> {
        let mut request = self.request(OpCode::MutateIn, id, options.timeout);
        request.specs = mutate_specs(specs);
        request.cas = options.cas.unwrap_or(Cas::ZERO);
        request.expiry = expiry_secs(options.expiry);
        request.durability = options.durability;
        request.store_semantics = options.store_semantics;

        let response = self.inner.bucket.core().dispatcher.execute(request).await?;
        mapper::map_mutate_in(response, id, &self.inner.keyspace)
    }

    /// Returns the raw-bytes view of this collection.
    pub fn binary(&self) -> BinaryCollection {
        BinaryCollection {
            collection: self.clone(),
        }
    }
}

/// Inserts `fragment` into `root` at a dotted path, creating intermediate
/// objects.
fn insert_at_path(root: &mut Value, path: &str, fragment: Value) {
    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let object = match current {
            Value::Object(map) => map,
            _ => return,
        };
        if i + 1 == segments.len() {
            object.insert((*segment).to_string(), fragment);
            return;
        }
        current = object
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

/// Raw-bytes operations on a collection: append/prepend and counters.
///
/// Values handled here bypass the transcoder entirely; they are stored with
/// the binary format tag and no compression.
#[derive(Debug, Clone)]
pub struct BinaryCollection {
    collection: Collection,
}

impl BinaryCollection {
    /// Returns the collection name.
    pub fn name(&self) -> &str {
        self.collection.name()
    }

    /// Appends raw bytes to an existing document.
    pub async fn append(
        &self,
        id: &str,
        value: impl Into<Bytes>,
        options: AppendOptions,
    ) -> Result<MutationResult> {
        self.concat(OpCode::Append, id, value.into(), options.timeout, options.durability)
            .await
    }

    /// Prepends raw bytes to an existing document.
    pub async fn prepend(
        &self,
        id: &str,
        value: impl Into<Bytes>,
        options: PrependOptions,
    ) -> Result<MutationResult> {
        self.concat(OpCode::Prepend, id, value.into(), options.timeout, options.durability)
            .await
    }

    async fn concat(
        &self,
        opcode: OpCode,
        id: &str,
        value: Bytes,
        timeout: Option<Duration>,
        durability: couchbase_core::DurabilityLevel,
    ) -> Result<MutationResult> {
        let mut request = self.collection.request(opcode, id, timeout);
        request.value = Some(value);
        request.flags = make_flags(FORMAT_BINARY, COMPRESSION_NONE);
        request.durability = durability;

        let core = self.collection.inner.bucket.core();
        let response = core.dispatcher.execute(request).await?;
        mapper::map_mutation(response, id, &self.collection.inner.keyspace)
    }

    /// Atomically adds to a counter document, creating it from
    /// `options.initial` when absent (if provided).
    pub async fn increment(&self, id: &str, options: IncrementOptions) -> Result<CounterResult> {
        let mut request = self.collection.request(OpCode::Increment, id, options.timeout);
        request.delta = Some(options.delta);
        request.initial = options.initial;
        request.expiry = expiry_secs(options.expiry);
        request.durability = options.durability;

        let core = self.collection.inner.bucket.core();
        let response = core.dispatcher.execute(request).await?;
        mapper::map_counter(response, id, &self.collection.inner.keyspace)
    }

    /// Atomically subtracts from a counter document. Counters saturate at
    /// zero rather than going negative.
    pub async fn decrement(&self, id: &str, options: DecrementOptions) -> Result<CounterResult> {
        let mut request = self.collection.request(OpCode::Decrement, id, options.timeout);
        request.delta = Some(options.delta);
        request.initial = options.initial;
        request.expiry = expiry_secs(options.expiry);
        request.durability = options.durability;

        let core = self.collection.inner.bucket.core();
        let response = core.dispatcher.execute(request).await?;
        mapper::map_counter(response, id, &self.collection.inner.keyspace)
    }
}
