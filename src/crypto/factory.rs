//! Builds the cipher transform for a newly negotiated epoch.
//!
//! The factory owns the negotiation policy (which encryption/MAC pairs are
//! allowed) and key-block layout. Transforms only ever see their own keys.

use std::fmt::Debug;

use log::debug;

use crate::context::Context;
use crate::crypto::aead::AeadTransform;
use crate::crypto::block::BlockTransform;
use crate::crypto::mac::RecordMac;
use crate::crypto::prf::prf;
use crate::crypto::transform::{CipherTransform, EncryptionAlgorithm, MacAlgorithm};
use crate::crypto::transform::NullTransform;
use crate::params::{CompressionMethod, RANDOM_LEN};
use crate::types::{AlertDescription, ConnectionEnd};
use crate::Error;

/// Creates exactly one transform per call, for exactly one epoch.
pub trait CipherTransformFactory: Send + Sync + Debug {
    fn create(
        &self,
        context: &Context,
        encryption: EncryptionAlgorithm,
        mac: MacAlgorithm,
    ) -> Result<Box<dyn CipherTransform>, Error>;
}

/// The RustCrypto-backed factory.
#[derive(Debug, Default)]
pub struct DefaultCipherFactory;

/// Static instance, in the manner of a crypto provider component.
pub static DEFAULT_CIPHER_FACTORY: DefaultCipherFactory = DefaultCipherFactory;

/// Key block layout (RFC 5246 §6.3).
struct KeyBlock<'a> {
    client_mac: &'a [u8],
    server_mac: &'a [u8],
    client_key: &'a [u8],
    server_key: &'a [u8],
    client_iv: &'a [u8],
    server_iv: &'a [u8],
}

impl<'a> KeyBlock<'a> {
    fn split(block: &'a [u8], mac_len: usize, key_len: usize, iv_len: usize) -> Self {
        let (client_mac, rest) = block.split_at(mac_len);
        let (server_mac, rest) = rest.split_at(mac_len);
        let (client_key, rest) = rest.split_at(key_len);
        let (server_key, rest) = rest.split_at(key_len);
        let (client_iv, rest) = rest.split_at(iv_len);
        let (server_iv, _) = rest.split_at(iv_len);
        KeyBlock {
            client_mac,
            server_mac,
            client_key,
            server_key,
            client_iv,
            server_iv,
        }
    }
}

fn check_pair(encryption: EncryptionAlgorithm, mac: MacAlgorithm) -> Result<(), Error> {
    let ok = match encryption {
        EncryptionAlgorithm::Aes128Gcm | EncryptionAlgorithm::Aes256Gcm => {
            mac == MacAlgorithm::Null
        }
        EncryptionAlgorithm::Aes128Cbc | EncryptionAlgorithm::Aes256Cbc => {
            mac != MacAlgorithm::Null
        }
        EncryptionAlgorithm::Null => true,
    };
    if !ok {
        return Err(Error::Security(format!(
            "Unsupported cipher combination: {:?} with {:?}",
            encryption, mac
        )));
    }
    Ok(())
}

impl CipherTransformFactory for DefaultCipherFactory {
    fn create(
        &self,
        context: &Context,
        encryption: EncryptionAlgorithm,
        mac: MacAlgorithm,
    ) -> Result<Box<dyn CipherTransform>, Error> {
        check_pair(encryption, mac)?;

        if encryption == EncryptionAlgorithm::Null && mac == MacAlgorithm::Null {
            return Ok(Box::new(NullTransform::new()));
        }

        let params = context.established()?;
        let version = context
            .server_version()
            .ok_or_else(|| Error::Security("protocol version not negotiated".into()))?;

        if params.compression_algorithm() != CompressionMethod::Null {
            return Err(Error::Alert(AlertDescription::IllegalParameter));
        }

        let mac_len = mac.key_len();
        let key_len = encryption.key_len();
        let iv_len = encryption.fixed_iv_len();
        let block_len = 2 * (mac_len + key_len + iv_len);

        // For key expansion, the seed is server_random + client_random
        let mut seed = [0u8; RANDOM_LEN * 2];
        seed[..RANDOM_LEN].copy_from_slice(params.server_random());
        seed[RANDOM_LEN..].copy_from_slice(params.client_random());

        let key_block = prf(
            params.prf_algorithm(),
            params.master_secret(),
            "key expansion",
            &seed,
            block_len,
        )?;
        let kb = KeyBlock::split(&key_block, mac_len, key_len, iv_len);

        let (write_mac, read_mac, write_key, read_key, write_iv, read_iv) = match context.entity()
        {
            ConnectionEnd::Client => (
                kb.client_mac,
                kb.server_mac,
                kb.client_key,
                kb.server_key,
                kb.client_iv,
                kb.server_iv,
            ),
            ConnectionEnd::Server => (
                kb.server_mac,
                kb.client_mac,
                kb.server_key,
                kb.client_key,
                kb.server_iv,
                kb.client_iv,
            ),
        };

        debug!(
            "Creating {:?}/{:?} transform for {:?} under {}",
            encryption,
            mac,
            context.entity(),
            version
        );

        let transform: Box<dyn CipherTransform> = match encryption {
            EncryptionAlgorithm::Null => Box::new(NullTransform::with_mac(
                version,
                RecordMac::new(mac, write_mac)?,
                RecordMac::new(mac, read_mac)?,
            )),
            EncryptionAlgorithm::Aes128Cbc | EncryptionAlgorithm::Aes256Cbc => {
                Box::new(BlockTransform::new(
                    version,
                    write_key,
                    write_iv,
                    RecordMac::new(mac, write_mac)?,
                    read_key,
                    RecordMac::new(mac, read_mac)?,
                )?)
            }
            EncryptionAlgorithm::Aes128Gcm | EncryptionAlgorithm::Aes256Gcm => Box::new(
                AeadTransform::new(version, write_key, write_iv, read_key, read_iv)?,
            ),
        };

        Ok(transform)
    }
}
