//! Per-operation option structs.
//!
//! These are plain immutable values with documented defaults; construct them
//! with struct-update syntax over `Default`:
//!
//! ```
//! use std::time::Duration;
//! use couchbase_client::options::UpsertOptions;
//!
//! let options = UpsertOptions {
//!     timeout: Some(Duration::from_millis(500)),
//!     ..UpsertOptions::default()
//! };
//! # let _ = options;
//! ```

use std::time::Duration;

use couchbase_core::{Cas, DurabilityLevel, StoreSemantics};

/// Options for [`Collection::get`](crate::Collection::get).
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Also fetch the document's remaining expiry.
    pub with_expiry: bool,
    /// Fetch only these paths, reassembled into a partial document.
    pub project: Vec<String>,
}

/// Options for [`Collection::exists`](crate::Collection::exists).
#[derive(Debug, Clone, Default)]
pub struct ExistsOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
}

/// Options for [`Collection::get_and_lock`](crate::Collection::get_and_lock).
#[derive(Debug, Clone, Default)]
pub struct GetAndLockOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
}

/// Options for [`Collection::get_and_touch`](crate::Collection::get_and_touch).
#[derive(Debug, Clone, Default)]
pub struct GetAndTouchOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
}

/// Options for [`Collection::insert`](crate::Collection::insert).
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Document expiry; `None` stores without expiry.
    pub expiry: Option<Duration>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
}

/// Options for [`Collection::upsert`](crate::Collection::upsert).
#[derive(Debug, Clone, Default)]
pub struct UpsertOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Document expiry; `None` stores without expiry.
    pub expiry: Option<Duration>,
    /// Optimistic-concurrency precondition; a stale CAS fails the write.
    pub cas: Option<Cas>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
}

/// Options for [`Collection::replace`](crate::Collection::replace).
#[derive(Debug, Clone, Default)]
pub struct ReplaceOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Document expiry; `None` stores without expiry.
    pub expiry: Option<Duration>,
    /// Optimistic-concurrency precondition; a stale CAS fails the write.
    pub cas: Option<Cas>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
}

/// Options for [`Collection::remove`](crate::Collection::remove).
#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Optimistic-concurrency precondition; a stale CAS fails the removal.
    pub cas: Option<Cas>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
}

/// Options for [`Collection::unlock`](crate::Collection::unlock).
#[derive(Debug, Clone, Default)]
pub struct UnlockOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
}

/// Options for [`Collection::touch`](crate::Collection::touch).
#[derive(Debug, Clone, Default)]
pub struct TouchOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
}

/// Options for [`BinaryCollection::append`](crate::BinaryCollection::append).
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
}

/// Options for [`BinaryCollection::prepend`](crate::BinaryCollection::prepend).
#[derive(Debug, Clone, Default)]
pub struct PrependOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
}

/// Options for [`BinaryCollection::increment`](crate::BinaryCollection::increment).
#[derive(Debug, Clone)]
pub struct IncrementOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Expiry applied when the counter document is created.
    pub expiry: Option<Duration>,
    /// Amount to add; defaults to 1.
    pub delta: u64,
    /// Seed value when the counter does not exist yet; `None` makes a
    /// missing counter an error.
    pub initial: Option<u64>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
}

impl Default for IncrementOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            expiry: None,
            delta: 1,
            initial: None,
            durability: DurabilityLevel::None,
        }
    }
}

/// Options for [`BinaryCollection::decrement`](crate::BinaryCollection::decrement).
#[derive(Debug, Clone)]
pub struct DecrementOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Expiry applied when the counter document is created.
    pub expiry: Option<Duration>,
    /// Amount to subtract; defaults to 1. Counters never go below zero.
    pub delta: u64,
    /// Seed value when the counter does not exist yet; `None` makes a
    /// missing counter an error.
    pub initial: Option<u64>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
}

impl Default for DecrementOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            expiry: None,
            delta: 1,
            initial: None,
            durability: DurabilityLevel::None,
        }
    }
}

/// Options for [`Collection::lookup_in`](crate::Collection::lookup_in).
#[derive(Debug, Clone, Default)]
pub struct LookupInOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Also fetch the document's remaining expiry.
    pub with_expiry: bool,
}

/// Options for [`Collection::mutate_in`](crate::Collection::mutate_in).
#[derive(Debug, Clone, Default)]
pub struct MutateInOptions {
    /// Per-call deadline; defaults to the configured key-value timeout.
    pub timeout: Option<Duration>,
    /// Optimistic-concurrency precondition; a stale CAS fails the mutation.
    pub cas: Option<Cas>,
    /// Document expiry applied alongside the mutation.
    pub expiry: Option<Duration>,
    /// Durability acknowledgment required before success is reported.
    pub durability: DurabilityLevel,
    /// Whether the document must exist, may be created, or must be created.
    pub store_semantics: StoreSemantics,
}

pub(crate) fn expiry_secs(expiry: Option<Duration>) -> Option<u32> {
    expiry.map(|d| d.as_secs().min(u64::from(u32::MAX)) as u32)
}
