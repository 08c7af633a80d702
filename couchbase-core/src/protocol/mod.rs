//! Transport-facing request/response types.

mod message;
mod status;
mod subdoc;

pub use message::{next_correlation_id, KvRequest, KvResponse, OpCode};
pub use status::Status;
pub use subdoc::{SubdocField, SubdocOp, SubdocSpec};
