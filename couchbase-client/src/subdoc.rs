//! User-facing sub-document spec constructors.
//!
//! `lookup_in` and `mutate_in` take lists of these specs; each addresses a
//! path inside a document. Spec results come back by index, in order.

use serde_json::Value;

use couchbase_core::protocol::{SubdocOp, SubdocSpec};

/// A single lookup inside a `lookup_in` call.
#[derive(Debug, Clone)]
pub struct LookupInSpec {
    spec: SubdocSpec,
}

impl LookupInSpec {
    /// Fetches the value at `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            spec: SubdocSpec::lookup(SubdocOp::Get, path),
        }
    }

    /// Checks whether `path` exists.
    pub fn exists(path: impl Into<String>) -> Self {
        Self {
            spec: SubdocSpec::lookup(SubdocOp::Exists, path),
        }
    }

    /// Counts the members of the array or object at `path`.
    pub fn count(path: impl Into<String>) -> Self {
        Self {
            spec: SubdocSpec::lookup(SubdocOp::Count, path),
        }
    }

    /// Fetches the entire document.
    pub fn get_full() -> Self {
        Self {
            spec: SubdocSpec::lookup(SubdocOp::GetDoc, ""),
        }
    }

    /// Addresses the path inside extended attributes instead of the body.
    pub fn xattr(mut self) -> Self {
        self.spec.xattr = true;
        self
    }

    pub(crate) fn into_spec(self) -> SubdocSpec {
        self.spec
    }
}

/// A single mutation inside a `mutate_in` call.
#[derive(Debug, Clone)]
pub struct MutateInSpec {
    spec: SubdocSpec,
}

impl MutateInSpec {
    /// Inserts a dictionary entry at `path`; fails if the path exists.
    pub fn insert(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            spec: SubdocSpec::mutation(SubdocOp::DictAdd, path, value.into()),
        }
    }

    /// Inserts or replaces the value at `path`.
    pub fn upsert(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            spec: SubdocSpec::mutation(SubdocOp::DictUpsert, path, value.into()),
        }
    }

    /// Replaces the value at an existing `path`.
    pub fn replace(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            spec: SubdocSpec::mutation(SubdocOp::Replace, path, value.into()),
        }
    }

    /// Removes the value at `path`.
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            spec: SubdocSpec {
                op: SubdocOp::Delete,
                path: path.into(),
                value: None,
                xattr: false,
                create_path: false,
            },
        }
    }

    /// Appends to the array at `path`.
    pub fn array_append(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            spec: SubdocSpec::mutation(SubdocOp::ArrayPushLast, path, value.into()),
        }
    }

    /// Prepends to the array at `path`.
    pub fn array_prepend(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            spec: SubdocSpec::mutation(SubdocOp::ArrayPushFirst, path, value.into()),
        }
    }

    /// Inserts into the array at `path`, where the path's final component is
    /// the target index (`scores[2]`).
    pub fn array_insert(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            spec: SubdocSpec::mutation(SubdocOp::ArrayInsert, path, value.into()),
        }
    }

    /// Appends to the array at `path` only if the value is not already
    /// present.
    pub fn array_add_unique(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            spec: SubdocSpec::mutation(SubdocOp::ArrayAddUnique, path, value.into()),
        }
    }

    /// Adjusts the number at `path` by `delta`, returning the new value in
    /// the spec's result slot.
    pub fn counter(path: impl Into<String>, delta: i64) -> Self {
        Self {
            spec: SubdocSpec::mutation(SubdocOp::Counter, path, Value::from(delta)),
        }
    }

    /// Addresses the path inside extended attributes instead of the body.
    pub fn xattr(mut self) -> Self {
        self.spec.xattr = true;
        self
    }

    /// Creates missing intermediate path components.
    pub fn create_path(mut self) -> Self {
        self.spec.create_path = true;
        self
    }

    pub(crate) fn into_spec(self) -> SubdocSpec {
        self.spec
    }
}

pub(crate) fn lookup_specs(specs: Vec<LookupInSpec>) -> Vec<SubdocSpec> {
    specs.into_iter().map(LookupInSpec::into_spec).collect()
}

pub(crate) fn mutate_specs(specs: Vec<MutateInSpec>) -> Vec<SubdocSpec> {
    specs.into_iter().map(MutateInSpec::into_spec).collect()
}
