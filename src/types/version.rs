use core::fmt;

use crate::types::AlertDescription;
use crate::Error;

/// Record-layer protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Tls1_0,
    Tls1_1,
    Tls1_2,
    Dtls1_0,
    Dtls1_2,
}

impl ProtocolVersion {
    /// Whether this is a datagram (DTLS) version.
    pub fn is_dtls(&self) -> bool {
        matches!(self, ProtocolVersion::Dtls1_0 | ProtocolVersion::Dtls1_2)
    }

    /// Wire encoding as (major, minor).
    pub fn to_bytes(&self) -> [u8; 2] {
        use ProtocolVersion::*;
        // DTLS versions are using 1-complement.
        match self {
            Tls1_0 => [3, 1],
            Tls1_1 => [3, 2],
            Tls1_2 => [3, 3],
            Dtls1_0 => [!1, !0],
            Dtls1_2 => [!1, !2],
        }
    }

    pub fn from_bytes(major: u8, minor: u8) -> Result<Self, Error> {
        use ProtocolVersion::*;
        match (major, minor) {
            (3, 1) => Ok(Tls1_0),
            (3, 2) => Ok(Tls1_1),
            (3, 3) => Ok(Tls1_2),
            (0xfe, 0xff) => Ok(Dtls1_0),
            (0xfe, 0xfd) => Ok(Dtls1_2),
            _ => Err(Error::Alert(AlertDescription::ProtocolVersion)),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProtocolVersion::*;
        write!(
            f,
            "{}",
            match self {
                Tls1_0 => "TLS 1.0",
                Tls1_1 => "TLS 1.1",
                Tls1_2 => "TLS 1.2",
                Dtls1_0 => "DTLS 1.0",
                Dtls1_2 => "DTLS 1.2",
            }
        )
    }
}
