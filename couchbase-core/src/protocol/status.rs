//! Transport status codes.

/// Status of a transport response.
///
/// This is the closed set the result mapper classifies. The numeric codes
/// are the contract with the transport layer, which translates whatever the
/// wire protocol carries into one of these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    /// The operation succeeded.
    Ok = 0x00,
    /// The document was not found.
    NotFound = 0x01,
    /// The document already exists.
    Exists = 0x02,
    /// The value exceeds the server's size limit.
    TooBig = 0x03,
    /// The document is locked.
    Locked = 0x04,
    /// Temporary failure or overload; the caller may retry.
    TempFail = 0x05,
    /// The provided CAS does not match the stored document.
    CasMismatch = 0x06,
    /// The client's credentials were rejected.
    AuthError = 0x07,
    /// The addressed bucket does not exist.
    BucketMissing = 0x08,
    /// The addressed scope does not exist.
    ScopeMissing = 0x09,
    /// The addressed collection does not exist.
    CollectionMissing = 0x0a,
    /// No node offers the requested service.
    ServiceMissing = 0x0b,
    /// The requested durability level cannot be satisfied.
    DurabilityImpossible = 0x0c,
    /// A sub-document path was not found.
    SubdocPathNotFound = 0x10,
    /// A sub-document path already exists.
    SubdocPathExists = 0x11,
    /// A sub-document value is out of range.
    SubdocInvalidRange = 0x12,
    /// One or more sub-document specs failed; per-spec statuses apply.
    SubdocMultiFailure = 0x13,
    /// The query statement failed.
    QueryError = 0x20,
    /// The query service failed.
    QueryServiceError = 0x21,
    /// Unclassified server-side failure.
    ServerError = 0x30,
    /// Network-level failure reported by the transport.
    NetworkError = 0x31,
}

impl Status {
    /// Returns the numeric code for this status.
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Decodes a status from its numeric code.
    ///
    /// Unknown codes map to [`Status::ServerError`] so that a newer transport
    /// never panics an older client.
    pub fn from_code(code: u16) -> Self {
        match code {
            0x00 => Status::Ok,
            0x01 => Status::NotFound,
            0x02 => Status::Exists,
            0x03 => Status::TooBig,
            0x04 => Status::Locked,
            0x05 => Status::TempFail,
            0x06 => Status::CasMismatch,
            0x07 => Status::AuthError,
            0x08 => Status::BucketMissing,
            0x09 => Status::ScopeMissing,
            0x0a => Status::CollectionMissing,
            0x0b => Status::ServiceMissing,
            0x0c => Status::DurabilityImpossible,
            0x10 => Status::SubdocPathNotFound,
            0x11 => Status::SubdocPathExists,
            0x12 => Status::SubdocInvalidRange,
            0x13 => Status::SubdocMultiFailure,
            0x20 => Status::QueryError,
            0x21 => Status::QueryServiceError,
            0x31 => Status::NetworkError,
            _ => Status::ServerError,
        }
    }

    /// Returns true if the status reports success.
    pub fn is_ok(&self) -> bool {
        *self == Status::Ok
    }
}
