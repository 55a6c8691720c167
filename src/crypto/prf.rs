//! TLS 1.2 PRF (RFC 5246 §5) using RustCrypto HMAC.
//!
//! This is the key-derivation collaborator: the cipher transform factory,
//! the master-secret helpers and keying-material export all go through
//! [`prf`].

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use zeroize::Zeroizing;

use crate::types::HashAlgorithm;
use crate::Error;

/// Key-derivation function family negotiated for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrfAlgorithm {
    /// P_SHA256, the TLS 1.2 default.
    TlsPrfSha256,
    /// P_SHA384, for suites that negotiate SHA-384.
    TlsPrfSha384,
}

impl PrfAlgorithm {
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            PrfAlgorithm::TlsPrfSha256 => HashAlgorithm::SHA256,
            PrfAlgorithm::TlsPrfSha384 => HashAlgorithm::SHA384,
        }
    }
}

/// PRF(secret, label, seed) = P_<hash>(secret, label + seed)
///
/// The seed parameter is the seed data WITHOUT the label.
pub fn prf(
    alg: PrfAlgorithm,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    if !label.is_ascii() {
        return Err(Error::Security(format!(
            "PRF label must be ASCII: {:?}",
            label
        )));
    }

    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label.as_bytes());
    full_seed.extend_from_slice(seed);

    let mut out = Zeroizing::new(Vec::with_capacity(output_len));
    match alg {
        PrfAlgorithm::TlsPrfSha256 => {
            p_hash::<Hmac<Sha256>>(secret, &full_seed, &mut out, output_len)?
        }
        PrfAlgorithm::TlsPrfSha384 => {
            p_hash::<Hmac<Sha384>>(secret, &full_seed, &mut out, output_len)?
        }
    }
    Ok(out)
}

fn p_hash<M>(
    secret: &[u8],
    full_seed: &[u8],
    out: &mut Vec<u8>,
    output_len: usize,
) -> Result<(), Error>
where
    M: Mac + KeyInit + Clone,
{
    let keyed = <M as Mac>::new_from_slice(secret)
        .map_err(|_| Error::Security("Invalid HMAC key length".to_string()))?;

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut a = {
        let mut m = keyed.clone();
        m.update(full_seed);
        m.finalize().into_bytes()
    };

    while out.len() < output_len {
        // HMAC_hash(secret, A(i) + seed)
        let mut ctx = keyed.clone();
        ctx.update(&a);
        ctx.update(full_seed);
        let output = ctx.finalize().into_bytes();

        let remaining = output_len - out.len();
        let to_copy = std::cmp::min(remaining, output.len());
        out.extend_from_slice(&output[..to_copy]);

        if out.len() < output_len {
            // A(i+1) = HMAC_hash(secret, A(i))
            let mut next = keyed.clone();
            next.update(&a);
            a = next.finalize().into_bytes();
        }
    }

    Ok(())
}
