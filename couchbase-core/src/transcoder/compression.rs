//! Compression algorithms and the size/ratio gates that decide when to
//! store a compressed form.

use std::io::Read;

use crate::error::{CouchbaseError, Result};

use super::flags::{COMPRESSION_NONE, COMPRESSION_ZLIB, COMPRESSION_ZSTD};

/// Compression algorithm for the default encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Store values uncompressed. Compressed values remain readable.
    #[default]
    None,
    /// zlib (DEFLATE with a zlib header).
    Zlib,
    /// zstd.
    Zstd,
}

impl Compression {
    /// Returns the flags tag for this algorithm.
    pub fn tag(&self) -> u8 {
        match self {
            Compression::None => COMPRESSION_NONE,
            Compression::Zlib => COMPRESSION_ZLIB,
            Compression::Zstd => COMPRESSION_ZSTD,
        }
    }

    /// Parses a configuration string (`"none"`, `"off"`, `"zlib"`, `"zstd"`).
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" | "off" => Ok(Compression::None),
            "zlib" => Ok(Compression::Zlib),
            "zstd" => Ok(Compression::Zstd),
            other => Err(CouchbaseError::InvalidConfiguration(format!(
                "unknown compression {other:?}, expected \"none\", \"zlib\" or \"zstd\""
            ))),
        }
    }

    /// Compresses a buffer with this algorithm.
    ///
    /// Calling this on [`Compression::None`] is a programming error inside
    /// the encoder and surfaces as a bindings failure.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Err(CouchbaseError::Bindings(
                "compress called with compression disabled".to_string(),
            )),
            Compression::Zlib => {
                let mut encoder =
                    flate2::read::ZlibEncoder::new(data, flate2::Compression::default());
                let mut out = Vec::new();
                encoder
                    .read_to_end(&mut out)
                    .map_err(|e| CouchbaseError::Serialization(format!("zlib compress: {e}")))?;
                Ok(out)
            }
            Compression::Zstd => zstd::stream::encode_all(data, 0)
                .map_err(|e| CouchbaseError::Serialization(format!("zstd compress: {e}"))),
        }
    }
}

/// Decompresses a payload according to its flags tag.
///
/// Decompression capability is a property of the payload, not of the local
/// configuration: a client configured with [`Compression::None`] must still
/// read values another writer compressed.
pub fn decompress(tag: u8, data: &[u8]) -> Result<Vec<u8>> {
    match tag {
        COMPRESSION_NONE => Ok(data.to_vec()),
        COMPRESSION_ZLIB => {
            let mut decoder = flate2::read::ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| CouchbaseError::Serialization(format!("zlib decompress: {e}")))?;
            Ok(out)
        }
        COMPRESSION_ZSTD => zstd::stream::decode_all(data)
            .map_err(|e| CouchbaseError::Serialization(format!("zstd decompress: {e}"))),
        other => Err(CouchbaseError::Serialization(format!(
            "unknown compression tag 0x{other:02x}"
        ))),
    }
}

/// Decides whether a compressed form should be kept.
///
/// The compressed form is stored only when the encoded value reached the
/// configured threshold and the compressed size does not exceed
/// `original_len / min_ratio`. A ratio of `0.0` disables the ratio gate.
pub fn keep_compressed(
    original_len: usize,
    compressed_len: usize,
    threshold: usize,
    min_ratio: f64,
) -> bool {
    if original_len < threshold {
        return false;
    }
    if min_ratio <= 0.0 {
        return true;
    }
    compressed_len as f64 <= original_len as f64 / min_ratio
}
