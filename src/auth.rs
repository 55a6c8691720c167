//! Certificate authentication callbacks for the handshake layer.
//!
//! [`CertificateVerifier`] is the older yes/no interface. It is bridged into
//! [`Authentication`] by [`LegacyAuthentication`].

use log::{debug, warn};

use crate::crypto::PrivateKey;
use crate::types::{AlertDescription, HashAlgorithm};
use crate::Error;

/// DER-encoded X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDer(pub Vec<u8>);

impl From<Vec<u8>> for CertificateDer {
    fn from(der: Vec<u8>) -> Self {
        CertificateDer(der)
    }
}

impl AsRef<[u8]> for CertificateDer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Yes/no check of a peer certificate chain, end entity first.
pub trait CertificateVerifier {
    fn is_valid(&self, chain: &[CertificateDer]) -> bool;
}

/// Accepts every chain, including an empty one.
///
/// **Unsafe for production use**: the peer is not authenticated at all and
/// any man-in-the-middle is accepted. Only for tests and fixed-peer setups
/// that authenticate by other means.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysValidVerifier;

impl CertificateVerifier for AlwaysValidVerifier {
    fn is_valid(&self, _chain: &[CertificateDer]) -> bool {
        true
    }
}

/// CertificateRequest contents the client answers (RFC 5246 §7.4.4).
#[derive(Debug, Clone, Default)]
pub struct CertificateRequest {
    pub certificate_types: Vec<u8>,
    pub supported_hashes: Vec<HashAlgorithm>,
    pub certificate_authorities: Vec<Vec<u8>>,
}

/// Client certificate chain and its key.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub chain: Vec<CertificateDer>,
    pub private_key: PrivateKey,
}

/// Authentication decisions asked of the application during a handshake.
pub trait Authentication {
    /// Accept or reject the server's chain. An error aborts the handshake.
    fn notify_server_certificate(&mut self, chain: &[CertificateDer]) -> Result<(), Error>;

    /// Credentials to answer a CertificateRequest with, or `None` to send
    /// an empty Certificate message.
    fn client_credentials(
        &mut self,
        request: &CertificateRequest,
    ) -> Result<Option<Credentials>, Error>;
}

/// Bridges a [`CertificateVerifier`] into [`Authentication`].
///
/// A rejected chain is the fatal alert `user_canceled`. No client
/// credentials are ever offered.
#[derive(Debug)]
pub struct LegacyAuthentication<V: CertificateVerifier> {
    verifier: V,
}

impl<V: CertificateVerifier> LegacyAuthentication<V> {
    pub fn new(verifier: V) -> Self {
        LegacyAuthentication { verifier }
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }
}

impl<V: CertificateVerifier> Authentication for LegacyAuthentication<V> {
    fn notify_server_certificate(&mut self, chain: &[CertificateDer]) -> Result<(), Error> {
        if self.verifier.is_valid(chain) {
            debug!("Server certificate chain accepted ({} certs)", chain.len());
            Ok(())
        } else {
            warn!("Server certificate chain rejected by verifier");
            Err(Error::Alert(AlertDescription::UserCanceled))
        }
    }

    fn client_credentials(
        &mut self,
        _request: &CertificateRequest,
    ) -> Result<Option<Credentials>, Error> {
        Ok(None)
    }
}
