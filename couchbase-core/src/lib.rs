//! Core types and protocols for the Couchbase Rust client.
//!
//! This crate holds everything shared between the client and the transport
//! layer: the error taxonomy, protocol value types (requests, responses,
//! status codes, CAS and mutation tokens), and the document transcoder.
//! The wire protocol itself is not here; it belongs to the transport
//! implementation consuming these types.

#![warn(missing_docs)]

pub mod error;
pub mod protocol;
pub mod transcoder;
pub mod types;

pub use error::{CouchbaseError, ErrorContext, Result};
pub use protocol::{KvRequest, KvResponse, OpCode, Status, SubdocField, SubdocOp, SubdocSpec};
pub use transcoder::{
    decode_document, encode_document, Compression, DecoderConfig, DocumentFormat, EncoderConfig,
    Transcoder,
};
pub use types::{
    Cas, DurabilityLevel, Keyspace, MutationState, MutationToken, StoreSemantics, DEFAULT_NAME,
};
