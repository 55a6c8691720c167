//! Negotiated security parameters.
//!
//! The handshake fills in a [`SecurityParametersBuilder`] as messages arrive
//! and only produces [`SecurityParameters`] once everything is known, so the
//! record layer never observes a half-populated value.

use std::fmt;

use zeroize::Zeroizing;

use crate::crypto::prf::{prf, PrfAlgorithm};
use crate::types::ConnectionEnd;
use crate::Error;

/// Length of the TLS master secret.
pub const MASTER_SECRET_LEN: usize = 48;

/// Length of ClientHello.random / ServerHello.random.
pub const RANDOM_LEN: usize = 32;

/// Default Finished verify_data length (RFC 5246 §7.4.9).
pub const DEFAULT_VERIFY_DATA_LEN: usize = 12;

/// Record compression method (RFC 5246 §6.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Null,
    Deflate,
    Unknown(u8),
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => CompressionMethod::Null,
            1 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CompressionMethod::Null => 0,
            CompressionMethod::Deflate => 1,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// The connection's agreed cryptographic identity. Read-only once built.
pub struct SecurityParameters {
    entity: ConnectionEnd,
    prf_algorithm: PrfAlgorithm,
    compression_algorithm: CompressionMethod,
    verify_data_length: usize,
    master_secret: Zeroizing<Vec<u8>>,
    client_random: [u8; RANDOM_LEN],
    server_random: [u8; RANDOM_LEN],
}

impl SecurityParameters {
    pub fn builder(entity: ConnectionEnd) -> SecurityParametersBuilder {
        SecurityParametersBuilder {
            entity,
            prf_algorithm: PrfAlgorithm::TlsPrfSha256,
            compression_algorithm: CompressionMethod::Null,
            verify_data_length: DEFAULT_VERIFY_DATA_LEN,
            master_secret: None,
            client_random: None,
            server_random: None,
        }
    }

    #[inline(always)]
    pub fn entity(&self) -> ConnectionEnd {
        self.entity
    }

    #[inline(always)]
    pub fn prf_algorithm(&self) -> PrfAlgorithm {
        self.prf_algorithm
    }

    #[inline(always)]
    pub fn compression_algorithm(&self) -> CompressionMethod {
        self.compression_algorithm
    }

    #[inline(always)]
    pub fn verify_data_length(&self) -> usize {
        self.verify_data_length
    }

    #[inline(always)]
    pub fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    #[inline(always)]
    pub fn client_random(&self) -> &[u8; RANDOM_LEN] {
        &self.client_random
    }

    #[inline(always)]
    pub fn server_random(&self) -> &[u8; RANDOM_LEN] {
        &self.server_random
    }
}

impl fmt::Debug for SecurityParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityParameters")
            .field("entity", &self.entity)
            .field("prf_algorithm", &self.prf_algorithm)
            .field("compression_algorithm", &self.compression_algorithm)
            .field("verify_data_length", &self.verify_data_length)
            .finish_non_exhaustive()
    }
}

/// Incrementally populated during the handshake.
pub struct SecurityParametersBuilder {
    entity: ConnectionEnd,
    prf_algorithm: PrfAlgorithm,
    compression_algorithm: CompressionMethod,
    verify_data_length: usize,
    master_secret: Option<Zeroizing<Vec<u8>>>,
    client_random: Option<[u8; RANDOM_LEN]>,
    server_random: Option<[u8; RANDOM_LEN]>,
}

impl SecurityParametersBuilder {
    /// Defaults to P_SHA256.
    pub fn prf_algorithm(mut self, alg: PrfAlgorithm) -> Self {
        self.prf_algorithm = alg;
        self
    }

    /// Defaults to null compression.
    pub fn compression_algorithm(mut self, method: CompressionMethod) -> Self {
        self.compression_algorithm = method;
        self
    }

    /// Defaults to 12.
    pub fn verify_data_length(mut self, len: usize) -> Self {
        self.verify_data_length = len;
        self
    }

    pub fn client_random(mut self, random: [u8; RANDOM_LEN]) -> Self {
        self.client_random = Some(random);
        self
    }

    pub fn server_random(mut self, random: [u8; RANDOM_LEN]) -> Self {
        self.server_random = Some(random);
        self
    }

    /// Set an already computed master secret (e.g. session resumption).
    pub fn master_secret(mut self, secret: &[u8]) -> Self {
        self.master_secret = Some(Zeroizing::new(secret.to_vec()));
        self
    }

    /// master_secret = PRF(pre_master_secret, "master secret",
    ///                     ClientHello.random + ServerHello.random)[0..47]
    pub fn derive_master_secret(mut self, pre_master_secret: &[u8]) -> Result<Self, Error> {
        let (client_random, server_random) = self.randoms()?;
        let mut seed = [0u8; RANDOM_LEN * 2];
        seed[..RANDOM_LEN].copy_from_slice(&client_random);
        seed[RANDOM_LEN..].copy_from_slice(&server_random);

        let ms = prf(
            self.prf_algorithm,
            pre_master_secret,
            "master secret",
            &seed,
            MASTER_SECRET_LEN,
        )?;
        self.master_secret = Some(ms);
        Ok(self)
    }

    /// Extended Master Secret calculation (RFC 7627)
    ///
    /// master_secret = PRF(pre_master_secret, "extended master secret", session_hash, 48)
    pub fn derive_extended_master_secret(
        mut self,
        pre_master_secret: &[u8],
        session_hash: &[u8],
    ) -> Result<Self, Error> {
        let ms = prf(
            self.prf_algorithm,
            pre_master_secret,
            "extended master secret",
            session_hash,
            MASTER_SECRET_LEN,
        )?;
        self.master_secret = Some(ms);
        Ok(self)
    }

    fn randoms(&self) -> Result<([u8; RANDOM_LEN], [u8; RANDOM_LEN]), Error> {
        match (self.client_random, self.server_random) {
            (Some(c), Some(s)) => Ok((c, s)),
            _ => Err(Error::Security(
                "client and server random must be set before deriving secrets".into(),
            )),
        }
    }

    /// Finish negotiation. Fails unless randoms and master secret are known.
    pub fn build(self) -> Result<SecurityParameters, Error> {
        let (client_random, server_random) = self.randoms()?;

        let master_secret = self
            .master_secret
            .ok_or_else(|| Error::Security("master secret not established".into()))?;

        if master_secret.len() != MASTER_SECRET_LEN {
            return Err(Error::Security(format!(
                "master secret must be {} bytes, got {}",
                MASTER_SECRET_LEN,
                master_secret.len()
            )));
        }

        if self.verify_data_length == 0 {
            return Err(Error::Config("verify_data_length must be non-zero".into()));
        }

        Ok(SecurityParameters {
            entity: self.entity,
            prf_algorithm: self.prf_algorithm,
            compression_algorithm: self.compression_algorithm,
            verify_data_length: self.verify_data_length,
            master_secret,
            client_random,
            server_random,
        })
    }
}
