//! Signature generation and verification for RSA, DSA and ECDSA keys.
//!
//! A [`Signer`] is stateless and picked per algorithm family. Keys are
//! loaded once into [`PrivateKey`] / [`PublicKey`] and handed to the signer
//! for each operation.

use std::str;

use der::{Decode, Encode};
use pkcs8::DecodePrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use signature::SignatureEncoding;
use spki::{DecodePublicKey, ObjectIdentifier};
use x509_cert::Certificate as X509Certificate;

use crate::types::HashAlgorithm;
use crate::Error;

const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// Signature algorithm family (RFC 5246 §7.4.1.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signer {
    Rsa,
    Dsa,
    Ecdsa,
}

/// A private key of one of the supported families.
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Dsa(dsa::SigningKey),
    EcdsaP256(p256::ecdsa::SigningKey),
    EcdsaP384(p384::ecdsa::SigningKey),
}

/// A public key of one of the supported families.
#[derive(Clone, PartialEq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Dsa(dsa::VerifyingKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivateKey::Rsa(_) => f.debug_tuple("PrivateKey::Rsa").finish(),
            PrivateKey::Dsa(_) => f.debug_tuple("PrivateKey::Dsa").finish(),
            PrivateKey::EcdsaP256(_) => f.debug_tuple("PrivateKey::EcdsaP256").finish(),
            PrivateKey::EcdsaP384(_) => f.debug_tuple("PrivateKey::EcdsaP384").finish(),
        }
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublicKey::Rsa(_) => f.debug_tuple("PublicKey::Rsa").finish(),
            PublicKey::Dsa(_) => f.debug_tuple("PublicKey::Dsa").finish(),
            PublicKey::EcdsaP256(_) => f.debug_tuple("PublicKey::EcdsaP256").finish(),
            PublicKey::EcdsaP384(_) => f.debug_tuple("PublicKey::EcdsaP384").finish(),
        }
    }
}

impl PrivateKey {
    /// Load a private key from DER or PEM.
    ///
    /// Accepts PKCS#8, SEC1 (EC) and PKCS#1 (RSA).
    pub fn from_der(key_der: &[u8]) -> Result<Self, Error> {
        // PKCS#8 DER format first (most common)
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(key_der) {
            return Ok(PrivateKey::EcdsaP256(key));
        }
        if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_der(key_der) {
            return Ok(PrivateKey::EcdsaP384(key));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(key_der) {
            return Ok(PrivateKey::Rsa(key));
        }
        if let Ok(key) = dsa::SigningKey::from_pkcs8_der(key_der) {
            return Ok(PrivateKey::Dsa(key));
        }

        // SEC1 DER (OpenSSL EC private key format)
        if let Ok(ec_key) = sec1::EcPrivateKey::try_from(key_der) {
            let curve = match &ec_key.parameters {
                Some(sec1::EcParameters::NamedCurve(oid)) => Some(*oid),
                None if ec_key.private_key.len() == 32 => Some(OID_P256),
                None if ec_key.private_key.len() == 48 => Some(OID_P384),
                None => None,
            };
            match curve {
                Some(OID_P256) => {
                    let secret = p256::SecretKey::from_sec1_der(key_der)
                        .map_err(|_| Error::Crypto("Invalid SEC1 P-256 key".to_string()))?;
                    return Ok(PrivateKey::EcdsaP256(secret.into()));
                }
                Some(OID_P384) => {
                    let secret = p384::SecretKey::from_sec1_der(key_der)
                        .map_err(|_| Error::Crypto("Invalid SEC1 P-384 key".to_string()))?;
                    return Ok(PrivateKey::EcdsaP384(secret.into()));
                }
                _ => {}
            }
        }

        // PKCS#1 RSA
        if let Ok(key) = RsaPrivateKey::from_pkcs1_der(key_der) {
            return Ok(PrivateKey::Rsa(key));
        }

        if let Ok(pem_str) = str::from_utf8(key_der) {
            if pem_str.contains("-----BEGIN") {
                if let Ok((_label, doc)) = pkcs8::Document::from_pem(pem_str) {
                    return Self::from_der(doc.as_bytes());
                }
            }
        }

        Err(Error::Crypto(
            "Failed to parse private key in any supported format".to_string(),
        ))
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Rsa(k) => PublicKey::Rsa(k.to_public_key()),
            PrivateKey::Dsa(k) => PublicKey::Dsa(k.verifying_key().clone()),
            PrivateKey::EcdsaP256(k) => PublicKey::EcdsaP256(*k.verifying_key()),
            PrivateKey::EcdsaP384(k) => PublicKey::EcdsaP384(*k.verifying_key()),
        }
    }

    pub fn family(&self) -> Signer {
        match self {
            PrivateKey::Rsa(_) => Signer::Rsa,
            PrivateKey::Dsa(_) => Signer::Dsa,
            PrivateKey::EcdsaP256(_) | PrivateKey::EcdsaP384(_) => Signer::Ecdsa,
        }
    }
}

impl PublicKey {
    /// Load a SubjectPublicKeyInfo in DER.
    pub fn from_spki_der(spki_der: &[u8]) -> Result<Self, Error> {
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
            return Ok(PublicKey::EcdsaP256(key));
        }
        if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
            return Ok(PublicKey::EcdsaP384(key));
        }
        if let Ok(key) = RsaPublicKey::from_public_key_der(spki_der) {
            return Ok(PublicKey::Rsa(key));
        }
        if let Ok(key) = dsa::VerifyingKey::from_public_key_der(spki_der) {
            return Ok(PublicKey::Dsa(key));
        }
        Err(Error::Crypto("Unsupported public key algorithm".to_string()))
    }

    /// Extract the subject public key of an X.509 certificate.
    pub fn from_certificate_der(cert_der: &[u8]) -> Result<Self, Error> {
        let cert = X509Certificate::from_der(cert_der)
            .map_err(|e| Error::Crypto(format!("Failed to parse certificate: {e}")))?;
        let spki_der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Crypto(format!("Failed to encode public key: {e}")))?;
        Self::from_spki_der(&spki_der)
    }

    pub fn family(&self) -> Signer {
        match self {
            PublicKey::Rsa(_) => Signer::Rsa,
            PublicKey::Dsa(_) => Signer::Dsa,
            PublicKey::EcdsaP256(_) | PublicKey::EcdsaP384(_) => Signer::Ecdsa,
        }
    }
}

/// Hash `message` with `hash`.
pub fn digest(hash: HashAlgorithm, message: &[u8]) -> Result<Vec<u8>, Error> {
    match hash {
        HashAlgorithm::SHA256 => Ok(Sha256::digest(message).to_vec()),
        HashAlgorithm::SHA384 => Ok(Sha384::digest(message).to_vec()),
        HashAlgorithm::SHA512 => Ok(Sha512::digest(message).to_vec()),
        _ => Err(Error::Crypto(format!("Unsupported hash algorithm: {:?}", hash))),
    }
}

fn check_digest_len(hash: HashAlgorithm, digest: &[u8]) -> Result<(), Error> {
    match hash.output_len() {
        Some(n) if n == digest.len() => Ok(()),
        Some(n) => Err(Error::Crypto(format!(
            "Digest length {} does not match {:?} ({})",
            digest.len(),
            hash,
            n
        ))),
        None => Err(Error::Crypto(format!("Unsupported hash algorithm: {:?}", hash))),
    }
}

fn rsa_sign(hash: HashAlgorithm, key: &RsaPrivateKey, digest: &[u8]) -> Result<Vec<u8>, Error> {
    use rsa::pkcs1v15::SigningKey;

    let failed = |e: signature::Error| Error::Crypto(format!("RSA signing failed: {e}"));
    let sig = match hash {
        HashAlgorithm::SHA256 => SigningKey::<Sha256>::new(key.clone())
            .sign_prehash(digest)
            .map_err(failed)?,
        HashAlgorithm::SHA384 => SigningKey::<Sha384>::new(key.clone())
            .sign_prehash(digest)
            .map_err(failed)?,
        HashAlgorithm::SHA512 => SigningKey::<Sha512>::new(key.clone())
            .sign_prehash(digest)
            .map_err(failed)?,
        _ => return Err(Error::Crypto(format!("Unsupported hash algorithm: {:?}", hash))),
    };
    Ok(sig.to_vec())
}

fn rsa_verify(
    hash: HashAlgorithm,
    key: &RsaPublicKey,
    digest: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    use rsa::pkcs1v15::{Signature, VerifyingKey};

    let sig = Signature::try_from(signature)
        .map_err(|_| Error::Crypto("Invalid signature format".to_string()))?;
    let key = key.clone();
    let res = match hash {
        HashAlgorithm::SHA256 => VerifyingKey::<Sha256>::new(key).verify_prehash(digest, &sig),
        HashAlgorithm::SHA384 => VerifyingKey::<Sha384>::new(key).verify_prehash(digest, &sig),
        HashAlgorithm::SHA512 => VerifyingKey::<Sha512>::new(key).verify_prehash(digest, &sig),
        _ => return Err(Error::Crypto(format!("Unsupported hash algorithm: {:?}", hash))),
    };
    res.map_err(|_| Error::Crypto(format!("RSA signature verification failed for {:?}", hash)))
}

impl Signer {
    /// Whether `key` belongs to this family.
    ///
    /// Keys are validated when loaded, except RSA private keys whose CRT
    /// components are checked here.
    pub fn is_valid_private_key(&self, key: &PrivateKey) -> bool {
        match (self, key) {
            (Signer::Rsa, PrivateKey::Rsa(k)) => k.validate().is_ok(),
            (Signer::Dsa, PrivateKey::Dsa(_)) => true,
            (Signer::Ecdsa, PrivateKey::EcdsaP256(_) | PrivateKey::EcdsaP384(_)) => true,
            _ => false,
        }
    }

    pub fn is_valid_public_key(&self, key: &PublicKey) -> bool {
        key.family() == *self
    }

    /// Sign a precomputed digest.
    ///
    /// RSA produces a PKCS#1 v1.5 signature over the DigestInfo for `hash`.
    /// DSA and ECDSA produce DER-encoded `(r, s)`.
    pub fn generate_raw_signature(
        &self,
        hash: HashAlgorithm,
        key: &PrivateKey,
        digest: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if !self.is_valid_private_key(key) {
            return Err(Error::Crypto(format!(
                "{:?} signer cannot use {:?}",
                self, key
            )));
        }
        check_digest_len(hash, digest)?;

        let failed = |e: signature::Error| Error::Crypto(format!("Signing failed: {e}"));
        match key {
            PrivateKey::Rsa(k) => rsa_sign(hash, k, digest),
            PrivateKey::Dsa(k) => {
                let sig: dsa::Signature = k.sign_prehash(digest).map_err(failed)?;
                Ok(sig.to_vec())
            }
            PrivateKey::EcdsaP256(k) => {
                let sig: p256::ecdsa::Signature = k.sign_prehash(digest).map_err(failed)?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            PrivateKey::EcdsaP384(k) => {
                let sig: p384::ecdsa::Signature = k.sign_prehash(digest).map_err(failed)?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
        }
    }

    /// Verify a signature over a precomputed digest.
    pub fn verify_raw_signature(
        &self,
        hash: HashAlgorithm,
        key: &PublicKey,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        if !self.is_valid_public_key(key) {
            return Err(Error::Crypto(format!(
                "{:?} signer cannot use {:?}",
                self, key
            )));
        }
        check_digest_len(hash, digest)?;

        let invalid = |_| Error::Crypto("Invalid signature format".to_string());
        let failed =
            |_| Error::Crypto(format!("{:?} signature verification failed for {:?}", self, hash));
        match key {
            PublicKey::Rsa(k) => rsa_verify(hash, k, digest, signature),
            PublicKey::Dsa(k) => {
                let sig = dsa::Signature::try_from(signature).map_err(invalid)?;
                k.verify_prehash(digest, &sig).map_err(failed)
            }
            PublicKey::EcdsaP256(k) => {
                let sig = p256::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                k.verify_prehash(digest, &sig).map_err(failed)
            }
            PublicKey::EcdsaP384(k) => {
                let sig = p384::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                k.verify_prehash(digest, &sig).map_err(failed)
            }
        }
    }

    /// Hash `message`, then sign the digest.
    pub fn sign(
        &self,
        hash: HashAlgorithm,
        key: &PrivateKey,
        message: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if !self.is_valid_private_key(key) {
            return Err(Error::Crypto(format!(
                "{:?} signer cannot use {:?}",
                self, key
            )));
        }
        let digest = digest(hash, message)?;
        self.generate_raw_signature(hash, key, &digest)
    }

    /// Hash `message`, then verify `signature` over the digest.
    pub fn verify(
        &self,
        hash: HashAlgorithm,
        key: &PublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        if !self.is_valid_public_key(key) {
            return Err(Error::Crypto(format!(
                "{:?} signer cannot use {:?}",
                self, key
            )));
        }
        let digest = digest(hash, message)?;
        self.verify_raw_signature(hash, key, &digest, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn p256_key() -> PrivateKey {
        PrivateKey::EcdsaP256(p256::ecdsa::SigningKey::random(&mut OsRng))
    }

    #[test]
    fn ecdsa_sign_and_verify() {
        let key = p256_key();
        let public = key.public_key();
        for hash in [HashAlgorithm::SHA256, HashAlgorithm::SHA384] {
            let sig = Signer::Ecdsa.sign(hash, &key, b"hello").unwrap();
            Signer::Ecdsa.verify(hash, &public, b"hello", &sig).unwrap();
            assert!(Signer::Ecdsa.verify(hash, &public, b"hellO", &sig).is_err());
        }
    }

    #[test]
    fn family_mismatch_is_rejected() {
        let key = p256_key();
        assert!(!Signer::Rsa.is_valid_private_key(&key));
        assert!(!Signer::Dsa.is_valid_public_key(&key.public_key()));
        let err = Signer::Rsa
            .generate_raw_signature(HashAlgorithm::SHA256, &key, &[0; 32])
            .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
        assert!(Signer::Dsa
            .verify(HashAlgorithm::SHA256, &key.public_key(), b"m", &[0; 8])
            .is_err());
    }

    #[test]
    fn digest_length_must_match_hash() {
        let key = p256_key();
        assert!(Signer::Ecdsa
            .generate_raw_signature(HashAlgorithm::SHA384, &key, &[0; 32])
            .is_err());
        assert!(Signer::Ecdsa
            .generate_raw_signature(HashAlgorithm::SHA1, &key, &[0; 20])
            .is_err());
    }

    #[test]
    fn raw_and_message_forms_agree() {
        let key = p256_key();
        let d = digest(HashAlgorithm::SHA256, b"abc").unwrap();
        let sig = Signer::Ecdsa
            .generate_raw_signature(HashAlgorithm::SHA256, &key, &d)
            .unwrap();
        Signer::Ecdsa
            .verify(HashAlgorithm::SHA256, &key.public_key(), b"abc", &sig)
            .unwrap();
    }

    #[test]
    fn pkcs8_roundtrip_loads_same_key() {
        use pkcs8::EncodePrivateKey;
        let sk = p256::ecdsa::SigningKey::random(&mut OsRng);
        let der = sk.to_pkcs8_der().unwrap();
        let key = PrivateKey::from_der(der.as_bytes()).unwrap();
        assert_eq!(key.family(), Signer::Ecdsa);
        assert!(key.public_key() == PublicKey::EcdsaP256(*sk.verifying_key()));
        assert!(PrivateKey::from_der(b"garbage").is_err());
    }
}
