use std::fmt;

use crate::types::AlertDescription;
use crate::Error;

/// Record content type (RFC 5246 §6.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    pub fn as_u8(&self) -> u8 {
        (*self).into()
    }
}

impl From<ContentType> for u8 {
    fn from(value: ContentType) -> Self {
        use ContentType::*;
        match value {
            ChangeCipherSpec => 20,
            Alert => 21,
            Handshake => 22,
            ApplicationData => 23,
        }
    }
}

impl TryFrom<u8> for ContentType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ContentType::*;
        let t = match value {
            20 => ChangeCipherSpec,
            21 => Alert,
            22 => Handshake,
            23 => ApplicationData,
            _ => return Err(Error::Alert(AlertDescription::UnexpectedMessage)),
        };
        Ok(t)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ContentType::*;
        let s = match self {
            ChangeCipherSpec => "change_cipher_spec",
            Alert => "alert",
            Handshake => "handshake",
            ApplicationData => "application_data",
        };
        write!(f, "{}", s)
    }
}
