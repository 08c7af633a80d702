//! Document transcoding: serialization format plus optional compression.
//!
//! Every stored value carries a 32-bit flags word tagging how it was written
//! (see [`flags`]). Encoding is driven by local configuration; decoding is
//! driven entirely by the payload's tags, so values written under different
//! settings always read back.

mod compression;
mod flags;
mod format;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

pub use compression::{decompress, keep_compressed, Compression};
pub use flags::{
    compression_tag, format_tag, make_flags, validate, COMPRESSION_NONE, COMPRESSION_ZLIB,
    COMPRESSION_ZSTD, FORMAT_BINARY, FORMAT_JSON, FORMAT_NATIVE,
};
pub use format::{deserialize, DocumentFormat};

use crate::error::Result;

/// Encoder settings, process-wide by default and overridable per keyspace.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Serialization format for document values.
    pub format: DocumentFormat,
    /// Compression algorithm; [`Compression::None`] disables compression on
    /// write but never on read.
    pub compression: Compression,
    /// Minimum encoded size in bytes before compression is considered.
    pub compression_threshold: usize,
    /// Minimum compression ratio (`original / compressed`) required to keep
    /// the compressed form; `0.0` disables the gate.
    pub compression_min_ratio: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            format: DocumentFormat::Json,
            compression: Compression::None,
            compression_threshold: 0,
            compression_min_ratio: 0.0,
        }
    }
}

/// Decoder settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Accepted for configuration-string compatibility with other SDKs,
    /// where it selects between array and object decodings of JSON arrays.
    /// `serde_json::Value` represents both faithfully, so the knob does not
    /// change decoding here.
    pub json_arrays: bool,
}

/// Encodes a document value under the given configuration.
///
/// Returns the stored bytes and the flags word tagging format and
/// compression, ready to travel with the value.
pub fn encode_document(value: &Value, config: &EncoderConfig) -> Result<(Bytes, u32)> {
    let encoded = config.format.serialize(value)?;

    if config.compression != Compression::None {
        let compressed = config.compression.compress(&encoded)?;
        if keep_compressed(
            encoded.len(),
            compressed.len(),
            config.compression_threshold,
            config.compression_min_ratio,
        ) {
            let flags = make_flags(config.format.tag(), config.compression.tag());
            return Ok((Bytes::from(compressed), flags));
        }
    }

    let flags = make_flags(config.format.tag(), COMPRESSION_NONE);
    Ok((Bytes::from(encoded), flags))
}

/// Decodes stored bytes using the flags the writer tagged them with.
pub fn decode_document(bytes: &[u8], doc_flags: u32, _config: &DecoderConfig) -> Result<Value> {
    validate(doc_flags)?;
    let raw = decompress(compression_tag(doc_flags), bytes)?;
    deserialize(format_tag(doc_flags), &raw)
}

/// Encode half of a transcoder capability pair.
pub type EncodeFn = Arc<dyn Fn(&Value) -> Result<(Bytes, u32)> + Send + Sync>;
/// Decode half of a transcoder capability pair.
pub type DecodeFn = Arc<dyn Fn(&[u8], u32) -> Result<Value> + Send + Sync>;

/// A transcoder is a pair of encode/decode capabilities, not a subclass.
///
/// Keyspaces may install their own pair; resolution walks
/// Collection → Bucket → process default at call time.
#[derive(Clone)]
pub struct Transcoder {
    encode: EncodeFn,
    decode: DecodeFn,
}

impl Transcoder {
    /// Creates a transcoder from an explicit capability pair.
    pub fn new(encode: EncodeFn, decode: DecodeFn) -> Self {
        Self { encode, decode }
    }

    /// Creates the default transcoder for the given encoder/decoder configs.
    pub fn from_config(encoder: EncoderConfig, decoder: DecoderConfig) -> Self {
        let enc_cfg = encoder;
        let dec_cfg = decoder;
        Self {
            encode: Arc::new(move |value| encode_document(value, &enc_cfg)),
            decode: Arc::new(move |bytes, doc_flags| decode_document(bytes, doc_flags, &dec_cfg)),
        }
    }

    /// Encodes a document value.
    pub fn encode(&self, value: &Value) -> Result<(Bytes, u32)> {
        (self.encode)(value)
    }

    /// Decodes stored bytes tagged with the given flags.
    pub fn decode(&self, bytes: &[u8], doc_flags: u32) -> Result<Value> {
        (self.decode)(bytes, doc_flags)
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::from_config(EncoderConfig::default(), DecoderConfig::default())
    }
}

impl fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcoder").finish_non_exhaustive()
    }
}
