//! Value types shared between the protocol layer and the public API.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque compare-and-swap version token attached to a stored document.
///
/// A CAS value is produced by the server on every successful mutation and
/// changes whenever the document changes. Writes may pass a previously
/// observed CAS to request optimistic-concurrency semantics; a stale value
/// always fails with a CAS-mismatch error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cas(pub u64);

impl Cas {
    /// The zero CAS, meaning "no version constraint".
    pub const ZERO: Cas = Cas(0);

    /// Returns true if this CAS expresses no version constraint.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u64> for Cas {
    fn from(value: u64) -> Self {
        Cas(value)
    }
}

/// Per-partition sequence marker returned by a successful write.
///
/// Tokens are used to express "read no older than this write" consistency in
/// subsequent queries. Identity is (bucket, partition, partition UUID); the
/// sequence number is monotonic per partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationToken {
    /// Name of the bucket the mutation landed in.
    pub bucket: String,
    /// Partition (vBucket) the document hashed to.
    pub partition_id: u16,
    /// UUID of the partition at the time of the mutation.
    pub partition_uuid: u64,
    /// Sequence number of the mutation inside the partition.
    pub seqno: u64,
}

impl MutationToken {
    /// Compares two tokens for the same partition of the same bucket,
    /// ordering them by sequence number.
    ///
    /// Returns `None` when the tokens refer to different partitions or
    /// buckets and are therefore incomparable.
    pub fn compare_same_partition(&self, other: &MutationToken) -> Option<Ordering> {
        if self.bucket == other.bucket
            && self.partition_id == other.partition_id
            && self.partition_uuid == other.partition_uuid
        {
            Some(self.seqno.cmp(&other.seqno))
        } else {
            None
        }
    }
}

impl fmt::Display for MutationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}@{}",
            self.bucket, self.partition_id, self.seqno, self.partition_uuid
        )
    }
}

/// A set of mutation tokens accumulated across write operations.
///
/// Passing a `MutationState` into a query requests results at least as new
/// as every mutation it records. Adding a token for a partition that is
/// already tracked keeps whichever token has the higher sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationState {
    tokens: HashMap<(String, u16), MutationToken>,
}

impl MutationState {
    /// Creates an empty mutation state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mutation token, keeping the newest per partition.
    pub fn add(&mut self, token: MutationToken) -> &mut Self {
        let key = (token.bucket.clone(), token.partition_id);
        match self.tokens.get(&key) {
            Some(existing) if existing.seqno >= token.seqno => {}
            _ => {
                self.tokens.insert(key, token);
            }
        }
        self
    }

    /// Returns the recorded tokens in no particular order.
    pub fn tokens(&self) -> impl Iterator<Item = &MutationToken> {
        self.tokens.values()
    }

    /// Returns the number of distinct partitions tracked.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no tokens have been recorded.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Serializes the state into the consistency payload a query request
    /// carries: `{bucket: {partition: [seqno, "uuid"]}}`.
    pub fn to_consistency_payload(&self) -> serde_json::Value {
        let mut buckets: HashMap<String, serde_json::Map<String, serde_json::Value>> =
            HashMap::new();
        for token in self.tokens.values() {
            buckets.entry(token.bucket.clone()).or_default().insert(
                token.partition_id.to_string(),
                serde_json::json!([token.seqno, token.partition_uuid.to_string()]),
            );
        }
        serde_json::Value::Object(
            buckets
                .into_iter()
                .map(|(bucket, partitions)| (bucket, serde_json::Value::Object(partitions)))
                .collect(),
        )
    }
}

impl FromIterator<MutationToken> for MutationState {
    fn from_iter<I: IntoIterator<Item = MutationToken>>(iter: I) -> Self {
        let mut state = MutationState::new();
        for token in iter {
            state.add(token);
        }
        state
    }
}

/// Replication/persistence acknowledgment required before a mutation is
/// reported successful. Levels are ordered by strictness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DurabilityLevel {
    /// Acknowledge as soon as the active node accepts the mutation.
    #[default]
    None,
    /// Replicate to a majority of replicas before acknowledging.
    Majority,
    /// Replicate to a majority and persist on the active node.
    MajorityAndPersistToActive,
    /// Persist to a majority of replicas before acknowledging.
    PersistToMajority,
}

impl DurabilityLevel {
    /// Returns true if this level requires any acknowledgment beyond the
    /// active node accepting the write.
    pub fn is_durable(&self) -> bool {
        *self != DurabilityLevel::None
    }
}

/// Document-level semantics for a `mutate_in` operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreSemantics {
    /// The document must already exist.
    #[default]
    Replace,
    /// Create the document if it does not exist.
    Upsert,
    /// The document must not exist yet.
    Insert,
}

/// The Bucket/Scope/Collection addressing triple identifying where a
/// document lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keyspace {
    /// Bucket name.
    pub bucket: String,
    /// Scope name.
    pub scope: String,
    /// Collection name.
    pub collection: String,
}

/// Name of the scope and collection every bucket starts with.
pub const DEFAULT_NAME: &str = "_default";

impl Keyspace {
    /// Creates a keyspace from its three components.
    pub fn new(
        bucket: impl Into<String>,
        scope: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            scope: scope.into(),
            collection: collection.into(),
        }
    }

    /// Creates the default keyspace (`_default._default`) for a bucket.
    pub fn default_for_bucket(bucket: impl Into<String>) -> Self {
        Self::new(bucket, DEFAULT_NAME, DEFAULT_NAME)
    }
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.bucket, self.scope, self.collection)
    }
}
