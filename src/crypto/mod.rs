//! Record protection, key derivation and signatures.
//!
//! All primitives come from RustCrypto. This module decides how they are
//! combined into TLS 1.2 / DTLS 1.2 record ciphers.

mod aead;
mod block;
mod factory;
mod keying;
mod mac;
pub mod prf;
mod signer;
mod transform;

pub use aead::AeadTransform;
pub use block::BlockTransform;
pub use factory::{CipherTransformFactory, DefaultCipherFactory, DEFAULT_CIPHER_FACTORY};
pub use keying::{KeyingMaterial, SrtpProfile};
pub use prf::PrfAlgorithm;
pub use signer::{digest, PrivateKey, PublicKey, Signer};
pub use transform::{CipherTransform, EncryptionAlgorithm, MacAlgorithm, NullTransform};
pub use transform::MAX_FRAGMENT_LEN;
