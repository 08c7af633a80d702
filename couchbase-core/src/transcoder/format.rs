//! Serialization formats for document values.

use serde_json::Value;

use crate::error::{CouchbaseError, Result};

use super::flags::{FORMAT_BINARY, FORMAT_JSON, FORMAT_NATIVE};

/// Serialization format for the default encoder.
///
/// Only JSON is readable by every SDK in a mixed-language deployment; the
/// native format (CBOR) is a private representation for Rust-to-Rust use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentFormat {
    /// JSON, the interoperable default.
    #[default]
    Json,
    /// CBOR, compact and self-describing but private to this client.
    Native,
}

impl DocumentFormat {
    /// Returns the flags tag for this format.
    pub fn tag(&self) -> u8 {
        match self {
            DocumentFormat::Json => FORMAT_JSON,
            DocumentFormat::Native => FORMAT_NATIVE,
        }
    }

    /// Parses a configuration string (`"json"` or `"native"`).
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(DocumentFormat::Json),
            "native" => Ok(DocumentFormat::Native),
            other => Err(CouchbaseError::InvalidConfiguration(format!(
                "unknown encoder format {other:?}, expected \"json\" or \"native\""
            ))),
        }
    }

    /// Serializes a document value in this format.
    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        match self {
            DocumentFormat::Json => serde_json::to_vec(value)
                .map_err(|e| CouchbaseError::Serialization(format!("JSON encode: {e}"))),
            DocumentFormat::Native => {
                let mut buf = Vec::new();
                ciborium::ser::into_writer(value, &mut buf)
                    .map_err(|e| CouchbaseError::Serialization(format!("CBOR encode: {e}")))?;
                Ok(buf)
            }
        }
    }
}

/// Deserializes a document value from the format named by a flags tag.
pub fn deserialize(tag: u8, bytes: &[u8]) -> Result<Value> {
    match tag {
        FORMAT_JSON => serde_json::from_slice(bytes)
            .map_err(|e| CouchbaseError::Serialization(format!("JSON decode: {e}"))),
        FORMAT_NATIVE => ciborium::de::from_reader(bytes)
            .map_err(|e| CouchbaseError::Serialization(format!("CBOR decode: {e}"))),
        FORMAT_BINARY => Err(CouchbaseError::Serialization(
            "binary document has no structured content; read its raw bytes instead".to_string(),
        )),
        other => Err(CouchbaseError::Serialization(format!(
            "unknown format tag 0x{other:02x}"
        ))),
    }
}
