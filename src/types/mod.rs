//! Wire-level identifiers shared by the record layer and the crypto code.

mod alert;
pub use alert::{AlertDescription, AlertLevel};

mod ctype;
pub use ctype::ContentType;

mod numerics;
pub use numerics::{dtls_record_sequence, EpochId, DTLS_MAX_SEQUENCE, TLS_MAX_SEQUENCE};

mod version;
pub use version::ProtocolVersion;

/// Which side of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    Server,
    Client,
}

/// Hash algorithms (RFC 5246 §7.4.1.4.1).
///
/// Used for signatures, the PRF and record MACs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum HashAlgorithm {
    /// No hash (not typically used).
    None,
    /// MD5 hash (deprecated, not supported).
    MD5,
    /// SHA-1 hash (deprecated, not supported).
    SHA1,
    /// SHA-224 hash (not supported).
    SHA224,
    SHA256,
    SHA384,
    SHA512,
    /// Unknown or unsupported hash algorithm.
    Unknown(u8),
}

impl HashAlgorithm {
    /// Convert a wire format u8 value to a `HashAlgorithm`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => HashAlgorithm::None,
            1 => HashAlgorithm::MD5,
            2 => HashAlgorithm::SHA1,
            3 => HashAlgorithm::SHA224,
            4 => HashAlgorithm::SHA256,
            5 => HashAlgorithm::SHA384,
            6 => HashAlgorithm::SHA512,
            _ => HashAlgorithm::Unknown(value),
        }
    }

    /// Convert this `HashAlgorithm` to its wire format u8 value.
    pub fn as_u8(&self) -> u8 {
        match self {
            HashAlgorithm::None => 0,
            HashAlgorithm::MD5 => 1,
            HashAlgorithm::SHA1 => 2,
            HashAlgorithm::SHA224 => 3,
            HashAlgorithm::SHA256 => 4,
            HashAlgorithm::SHA384 => 5,
            HashAlgorithm::SHA512 => 6,
            HashAlgorithm::Unknown(value) => *value,
        }
    }

    /// Digest output length in bytes, for the supported algorithms.
    pub fn output_len(&self) -> Option<usize> {
        match self {
            HashAlgorithm::SHA256 => Some(32),
            HashAlgorithm::SHA384 => Some(48),
            HashAlgorithm::SHA512 => Some(64),
            _ => None,
        }
    }
}
