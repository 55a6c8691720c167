//! Record protection bound to one epoch's negotiated algorithms.

use std::fmt::Debug;

use crate::crypto::mac::RecordMac;
use crate::types::{AlertDescription, ContentType, ProtocolVersion};
use crate::Error;

/// Max plaintext fragment length (RFC 5246 §6.2.1).
pub const MAX_FRAGMENT_LEN: usize = 1 << 14;

/// Bulk encryption algorithm of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    Null,
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
}

impl EncryptionAlgorithm {
    pub fn key_len(&self) -> usize {
        match self {
            EncryptionAlgorithm::Null => 0,
            EncryptionAlgorithm::Aes128Cbc | EncryptionAlgorithm::Aes128Gcm => 16,
            EncryptionAlgorithm::Aes256Cbc | EncryptionAlgorithm::Aes256Gcm => 32,
        }
    }

    /// Fixed IV length taken from the key block.
    ///
    /// For GCM this is the implicit nonce part (RFC 5288). For CBC it seeds
    /// the per-record IV derivation.
    pub fn fixed_iv_len(&self) -> usize {
        match self {
            EncryptionAlgorithm::Null => 0,
            EncryptionAlgorithm::Aes128Cbc | EncryptionAlgorithm::Aes256Cbc => 16,
            EncryptionAlgorithm::Aes128Gcm | EncryptionAlgorithm::Aes256Gcm => 4,
        }
    }

    pub fn is_aead(&self) -> bool {
        matches!(
            self,
            EncryptionAlgorithm::Aes128Gcm | EncryptionAlgorithm::Aes256Gcm
        )
    }
}

/// Record MAC algorithm of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    Null,
    HmacSha256,
    HmacSha384,
}

impl MacAlgorithm {
    pub fn key_len(&self) -> usize {
        match self {
            MacAlgorithm::Null => 0,
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::HmacSha384 => 48,
        }
    }
}

/// Encodes and decodes single records for one epoch.
///
/// `seq` is the 64-bit value authenticated with the record: the TLS
/// sequence number, or for DTLS the epoch in the top 16 bits and the
/// 48-bit sequence number below it (see [`crate::types::dtls_record_sequence`]).
///
/// A transform holds both directions: records are encoded with our write
/// keys and decoded with the peer's.
pub trait CipherTransform: Send + Debug {
    /// Max plaintext that fits in a record body of `ciphertext_limit` bytes.
    fn plaintext_limit(&self, ciphertext_limit: usize) -> usize;

    /// Protect `plaintext`, returning the record body.
    fn encode(
        &mut self,
        seq: u64,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error>;

    /// Verify and recover the plaintext of a record body.
    ///
    /// Authentication failures are `Error::Alert(BadRecordMac)` regardless of
    /// whether padding or the MAC was wrong.
    fn decode(
        &mut self,
        seq: u64,
        content_type: ContentType,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error>;
}

/// The pseudo-header every MAC and AEAD tag covers (RFC 5246 §6.2.3):
/// seq_num(8) + type(1) + version(2) + length(2).
pub(crate) fn additional_data(
    seq: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    length: usize,
) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..8].copy_from_slice(&seq.to_be_bytes());
    aad[8] = content_type.as_u8();
    aad[9..11].copy_from_slice(&version.to_bytes());
    aad[11..].copy_from_slice(&(length as u16).to_be_bytes());
    aad
}

pub(crate) fn check_plaintext_len(len: usize) -> Result<(), Error> {
    if len > MAX_FRAGMENT_LEN {
        return Err(Error::Alert(AlertDescription::RecordOverflow));
    }
    Ok(())
}

/// Identity transform, optionally authenticated.
///
/// Without a MAC this is the epoch 0 state `TLS_NULL_WITH_NULL_NULL`. With a
/// MAC the record is `plaintext || mac` (NULL cipher suites).
#[derive(Debug)]
pub struct NullTransform {
    version: ProtocolVersion,
    write_mac: Option<RecordMac>,
    read_mac: Option<RecordMac>,
}

impl NullTransform {
    /// The unprotected initial state.
    pub fn new() -> Self {
        NullTransform {
            // Unused without a MAC.
            version: ProtocolVersion::Tls1_2,
            write_mac: None,
            read_mac: None,
        }
    }

    pub(crate) fn with_mac(version: ProtocolVersion, write: RecordMac, read: RecordMac) -> Self {
        NullTransform {
            version,
            write_mac: Some(write),
            read_mac: Some(read),
        }
    }

    fn mac_size(&self) -> usize {
        self.write_mac.as_ref().map(|m| m.size()).unwrap_or(0)
    }
}

impl Default for NullTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherTransform for NullTransform {
    fn plaintext_limit(&self, ciphertext_limit: usize) -> usize {
        ciphertext_limit
            .saturating_sub(self.mac_size())
            .min(MAX_FRAGMENT_LEN)
    }

    fn encode(
        &mut self,
        seq: u64,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        check_plaintext_len(plaintext.len())?;

        let mut out = Vec::with_capacity(plaintext.len() + self.mac_size());
        out.extend_from_slice(plaintext);

        if let Some(mac) = &self.write_mac {
            let header = additional_data(seq, content_type, self.version, plaintext.len());
            mac.compute_into(&header, plaintext, &mut out);
        }

        Ok(out)
    }

    fn decode(
        &mut self,
        seq: u64,
        content_type: ContentType,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let Some(mac) = &self.read_mac else {
            check_plaintext_len(ciphertext.len())?;
            return Ok(ciphertext.to_vec());
        };

        let mac_size = mac.size();
        if ciphertext.len() < mac_size {
            return Err(Error::Alert(AlertDescription::DecodeError));
        }

        let (plaintext, received) = ciphertext.split_at(ciphertext.len() - mac_size);
        check_plaintext_len(plaintext.len())?;

        let header = additional_data(seq, content_type, self.version, plaintext.len());
        if !bool::from(mac.verify(&header, plaintext, received)) {
            return Err(Error::Alert(AlertDescription::BadRecordMac));
        }

        Ok(plaintext.to_vec())
    }
}
