//! Wire-level sub-document spec and result shapes.
//!
//! A `lookup_in`/`mutate_in` call batches several path specs into a single
//! request. Each spec result carries its own status and content; one spec
//! failing does not affect the others.

use serde_json::Value;

use super::status::Status;

/// The kind of a single sub-document operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdocOp {
    /// Fetch the value at a path.
    Get,
    /// Check whether a path exists.
    Exists,
    /// Count the members of an array or object at a path.
    Count,
    /// Fetch the whole document (used alongside xattr lookups).
    GetDoc,
    /// Insert a dictionary entry; fails if the path exists.
    DictAdd,
    /// Insert or replace a dictionary entry.
    DictUpsert,
    /// Replace the value at an existing path.
    Replace,
    /// Remove the value at a path.
    Delete,
    /// Append to the array at a path.
    ArrayPushLast,
    /// Prepend to the array at a path.
    ArrayPushFirst,
    /// Insert into the array at a path-with-index.
    ArrayInsert,
    /// Append to the array only if the value is not already present.
    ArrayAddUnique,
    /// Adjust the numeric value at a path by a delta.
    Counter,
}

impl SubdocOp {
    /// Returns true if the operation mutates the document.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            SubdocOp::Get | SubdocOp::Exists | SubdocOp::Count | SubdocOp::GetDoc
        )
    }
}

/// A single path spec inside a sub-document request.
#[derive(Debug, Clone, PartialEq)]
pub struct SubdocSpec {
    /// Operation kind.
    pub op: SubdocOp,
    /// Path inside the document, dotted notation (empty for `GetDoc`).
    pub path: String,
    /// Operand value for mutations; `None` for lookups and `Delete`.
    pub value: Option<Value>,
    /// Address the path inside extended attributes rather than the document body.
    pub xattr: bool,
    /// Create intermediate path components on mutation when missing.
    pub create_path: bool,
}

impl SubdocSpec {
    /// Creates a lookup spec with no operand.
    pub fn lookup(op: SubdocOp, path: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            value: None,
            xattr: false,
            create_path: false,
        }
    }

    /// Creates a mutation spec with an operand.
    pub fn mutation(op: SubdocOp, path: impl Into<String>, value: Value) -> Self {
        Self {
            op,
            path: path.into(),
            value: Some(value),
            xattr: false,
            create_path: false,
        }
    }
}

/// Result of a single spec inside a sub-document response.
#[derive(Debug, Clone, PartialEq)]
pub struct SubdocField {
    /// Status of this spec, independent of its siblings.
    pub status: Status,
    /// Decoded content for lookups (and counter results); `None` when the
    /// spec failed or produces no content.
    pub value: Option<Value>,
}

impl SubdocField {
    /// Creates a successful field with content.
    pub fn ok(value: Value) -> Self {
        Self {
            status: Status::Ok,
            value: Some(value),
        }
    }

    /// Creates a failed field carrying only a status.
    pub fn failed(status: Status) -> Self {
        Self {
            status,
            value: None,
        }
    }

    /// Returns true if this spec succeeded.
    pub fn exists(&self) -> bool {
        self.status == Status::Ok
    }
}
