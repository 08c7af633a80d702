//! Common-flags layout shared by every writer and reader of stored values.
//!
//! The upper byte of the 32-bit flags word tags the serialization format and
//! the next byte tags the compression algorithm. Readers dispatch on these
//! tags alone, so a value written by a client with different local settings
//! still decodes correctly.

use crate::error::{CouchbaseError, Result};

/// Bit offset of the format tag inside the flags word.
const FORMAT_SHIFT: u32 = 24;
/// Bit offset of the compression tag inside the flags word.
const COMPRESSION_SHIFT: u32 = 16;

/// Format tag: native (CBOR) serialization.
pub const FORMAT_NATIVE: u8 = 0x01;
/// Format tag: JSON serialization.
pub const FORMAT_JSON: u8 = 0x02;
/// Format tag: raw bytes, not transcoded (binary collection operations).
pub const FORMAT_BINARY: u8 = 0x03;

/// Compression tag: stored uncompressed.
pub const COMPRESSION_NONE: u8 = 0x00;
/// Compression tag: zlib.
pub const COMPRESSION_ZLIB: u8 = 0x01;
/// Compression tag: zstd.
pub const COMPRESSION_ZSTD: u8 = 0x02;

/// Builds a flags word from format and compression tags.
pub fn make_flags(format: u8, compression: u8) -> u32 {
    ((format as u32) << FORMAT_SHIFT) | ((compression as u32) << COMPRESSION_SHIFT)
}

/// Extracts the format tag from a flags word.
pub fn format_tag(flags: u32) -> u8 {
    ((flags >> FORMAT_SHIFT) & 0xff) as u8
}

/// Extracts the compression tag from a flags word.
pub fn compression_tag(flags: u32) -> u8 {
    ((flags >> COMPRESSION_SHIFT) & 0xff) as u8
}

/// Validates that a flags word carries a format tag this client understands.
pub fn validate(flags: u32) -> Result<()> {
    match format_tag(flags) {
        FORMAT_NATIVE | FORMAT_JSON | FORMAT_BINARY => Ok(()),
        tag => Err(CouchbaseError::Serialization(format!(
            "unknown format tag 0x{tag:02x} in flags 0x{flags:08x}"
        ))),
    }
}
