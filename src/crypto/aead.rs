//! AES-GCM record protection (RFC 5288) using RustCrypto.
//!
//! Record body: explicit_nonce(8) || ciphertext || tag(16). The nonce is the
//! 4-byte implicit IV from the key block followed by the explicit part, which
//! is the record's 64-bit sequence value.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Key};

use crate::crypto::transform::{additional_data, check_plaintext_len};
use crate::crypto::transform::{CipherTransform, MAX_FRAGMENT_LEN};
use crate::types::{AlertDescription, ContentType, ProtocolVersion};
use crate::Error;

/// Explicit nonce length, transmitted with each record.
pub(crate) const EXPLICIT_NONCE_LEN: usize = 8;

/// GCM authentication tag length.
pub(crate) const GCM_TAG_LEN: usize = 16;

/// Overhead per AEAD record (explicit nonce + tag).
pub(crate) const AEAD_OVERHEAD: usize = EXPLICIT_NONCE_LEN + GCM_TAG_LEN; // 24

/// Fixed IV portion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Iv([u8; 4]);

impl Iv {
    fn new(iv: &[u8]) -> Result<Self, Error> {
        let iv = iv.try_into().map_err(|_| {
            Error::Security(format!("GCM fixed IV must be 4 bytes, got {}", iv.len()))
        })?;
        Ok(Self(iv))
    }

    /// Full AEAD nonce (fixed IV + explicit nonce).
    fn nonce(&self, explicit: &[u8; EXPLICIT_NONCE_LEN]) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.0);
        nonce[4..].copy_from_slice(explicit);
        nonce
    }
}

enum AesGcm {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl std::fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesGcm::Aes128(_) => f.debug_tuple("AesGcm::Aes128").finish(),
            AesGcm::Aes256(_) => f.debug_tuple("AesGcm::Aes256").finish(),
        }
    }
}

impl AesGcm {
    fn new(key: &[u8]) -> Result<Self, Error> {
        match key.len() {
            16 => {
                let key = Key::<Aes128Gcm>::from_slice(key);
                Ok(AesGcm::Aes128(Box::new(Aes128Gcm::new(key))))
            }
            32 => {
                let key = Key::<Aes256Gcm>::from_slice(key);
                Ok(AesGcm::Aes256(Box::new(Aes256Gcm::new(key))))
            }
            _ => Err(Error::Security(format!(
                "Invalid key size for AES-GCM: {}",
                key.len()
            ))),
        }
    }

    fn seal(&self, nonce: &[u8; 12], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = aes_gcm::Nonce::from_slice(nonce);
        let payload = Payload { msg, aad };
        let res = match self {
            AesGcm::Aes128(c) => c.encrypt(nonce, payload),
            AesGcm::Aes256(c) => c.encrypt(nonce, payload),
        };
        res.map_err(|_| Error::Alert(AlertDescription::InternalError))
    }

    fn open(&self, nonce: &[u8; 12], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = aes_gcm::Nonce::from_slice(nonce);
        let payload = Payload { msg, aad };
        let res = match self {
            AesGcm::Aes128(c) => c.decrypt(nonce, payload),
            AesGcm::Aes256(c) => c.decrypt(nonce, payload),
        };
        res.map_err(|_| Error::Alert(AlertDescription::BadRecordMac))
    }
}

#[derive(Debug)]
pub struct AeadTransform {
    version: ProtocolVersion,
    write: AesGcm,
    write_iv: Iv,
    read: AesGcm,
    read_iv: Iv,
}

impl AeadTransform {
    pub fn new(
        version: ProtocolVersion,
        write_key: &[u8],
        write_iv: &[u8],
        read_key: &[u8],
        read_iv: &[u8],
    ) -> Result<Self, Error> {
        Ok(AeadTransform {
            version,
            write: AesGcm::new(write_key)?,
            write_iv: Iv::new(write_iv)?,
            read: AesGcm::new(read_key)?,
            read_iv: Iv::new(read_iv)?,
        })
    }
}

impl CipherTransform for AeadTransform {
    fn plaintext_limit(&self, ciphertext_limit: usize) -> usize {
        ciphertext_limit
            .saturating_sub(AEAD_OVERHEAD)
            .min(MAX_FRAGMENT_LEN)
    }

    fn encode(
        &mut self,
        seq: u64,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        check_plaintext_len(plaintext.len())?;

        let explicit = seq.to_be_bytes();
        let nonce = self.write_iv.nonce(&explicit);
        let aad = additional_data(seq, content_type, self.version, plaintext.len());

        let sealed = self.write.seal(&nonce, &aad, plaintext)?;

        let mut out = Vec::with_capacity(EXPLICIT_NONCE_LEN + sealed.len());
        out.extend_from_slice(&explicit);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decode(
        &mut self,
        seq: u64,
        content_type: ContentType,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let Some(plaintext_len) = ciphertext.len().checked_sub(AEAD_OVERHEAD) else {
            return Err(Error::Alert(AlertDescription::DecodeError));
        };
        check_plaintext_len(plaintext_len)?;

        let (explicit, sealed) = ciphertext.split_at(EXPLICIT_NONCE_LEN);
        // unwrap: split_at guarantees 8 bytes
        let explicit: [u8; EXPLICIT_NONCE_LEN] = explicit.try_into().unwrap();
        let nonce = self.read_iv.nonce(&explicit);
        let aad = additional_data(seq, content_type, self.version, plaintext_len);

        self.read.open(&nonce, &aad, sealed)
    }
}
