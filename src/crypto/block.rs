//! AES-CBC with HMAC, MAC-then-encrypt (RFC 5246 §6.2.3.2).
//!
//! Record body: IV(16) || CBC(plaintext || mac || padding). The per-record IV
//! is derived deterministically by encrypting the 64-bit sequence value XOR
//! the IV seed from the key block under the write key.
//!
//! Decoding never branches on the padding contents. Bad padding and a bad MAC
//! both compute a MAC and both end in the same `bad_record_mac` alert.

use aes_gcm::aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes_gcm::aes::{Aes128, Aes256, Block};
use subtle::{ConditionallySelectable, ConstantTimeEq, ConstantTimeGreater, ConstantTimeLess};

use crate::crypto::mac::RecordMac;
use crate::crypto::transform::{additional_data, check_plaintext_len};
use crate::crypto::transform::{CipherTransform, MAX_FRAGMENT_LEN};
use crate::types::{AlertDescription, ContentType, ProtocolVersion};
use crate::Error;

const BLOCK_LEN: usize = 16;

enum AesBlock {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl std::fmt::Debug for AesBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesBlock::Aes128(_) => f.debug_tuple("AesBlock::Aes128").finish(),
            AesBlock::Aes256(_) => f.debug_tuple("AesBlock::Aes256").finish(),
        }
    }
}

impl AesBlock {
    fn new(key: &[u8]) -> Result<Self, Error> {
        let invalid = |_| Error::Security(format!("Invalid key size for AES-CBC: {}", key.len()));
        match key.len() {
            16 => Ok(AesBlock::Aes128(Box::new(
                Aes128::new_from_slice(key).map_err(invalid)?,
            ))),
            32 => Ok(AesBlock::Aes256(Box::new(
                Aes256::new_from_slice(key).map_err(invalid)?,
            ))),
            _ => Err(Error::Security(format!(
                "Invalid key size for AES-CBC: {}",
                key.len()
            ))),
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = Block::from_mut_slice(block);
        match self {
            AesBlock::Aes128(c) => c.encrypt_block(block),
            AesBlock::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = Block::from_mut_slice(block);
        match self {
            AesBlock::Aes128(c) => c.decrypt_block(block),
            AesBlock::Aes256(c) => c.decrypt_block(block),
        }
    }
}

#[derive(Debug)]
pub struct BlockTransform {
    version: ProtocolVersion,
    write: AesBlock,
    write_iv_seed: [u8; BLOCK_LEN],
    write_mac: RecordMac,
    read: AesBlock,
    read_mac: RecordMac,
}

impl BlockTransform {
    pub(crate) fn new(
        version: ProtocolVersion,
        write_key: &[u8],
        write_iv_seed: &[u8],
        write_mac: RecordMac,
        read_key: &[u8],
        read_mac: RecordMac,
    ) -> Result<Self, Error> {
        let write_iv_seed = write_iv_seed.try_into().map_err(|_| {
            Error::Security(format!(
                "CBC IV seed must be {} bytes, got {}",
                BLOCK_LEN,
                write_iv_seed.len()
            ))
        })?;

        Ok(BlockTransform {
            version,
            write: AesBlock::new(write_key)?,
            write_iv_seed,
            write_mac,
            read: AesBlock::new(read_key)?,
            read_mac,
        })
    }

    fn record_iv(&self, seq: u64) -> [u8; BLOCK_LEN] {
        let mut iv = self.write_iv_seed;
        for (b, s) in iv[BLOCK_LEN - 8..].iter_mut().zip(seq.to_be_bytes()) {
            *b ^= s;
        }
        self.write.encrypt_block(&mut iv);
        iv
    }

    /// Smallest valid body: IV plus enough blocks for the MAC and one padding byte.
    fn min_ciphertext_len(&self) -> usize {
        let mac = self.read_mac.size();
        BLOCK_LEN + (mac + 1).div_ceil(BLOCK_LEN) * BLOCK_LEN
    }
}

impl CipherTransform for BlockTransform {
    fn plaintext_limit(&self, ciphertext_limit: usize) -> usize {
        let blocks = ciphertext_limit.saturating_sub(BLOCK_LEN) / BLOCK_LEN;
        (blocks * BLOCK_LEN)
            .saturating_sub(self.write_mac.size() + 1)
            .min(MAX_FRAGMENT_LEN)
    }

    fn encode(
        &mut self,
        seq: u64,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        check_plaintext_len(plaintext.len())?;

        let mac_size = self.write_mac.size();
        let unpadded = plaintext.len() + mac_size + 1;
        let pad_len = (BLOCK_LEN - unpadded % BLOCK_LEN) % BLOCK_LEN;
        let body_len = unpadded + pad_len;

        let iv = self.record_iv(seq);
        let mut out = Vec::with_capacity(BLOCK_LEN + body_len);
        out.extend_from_slice(&iv);
        out.extend_from_slice(plaintext);

        let header = additional_data(seq, content_type, self.version, plaintext.len());
        self.write_mac.compute_into(&header, plaintext, &mut out);

        // pad_len + 1 bytes, each holding pad_len
        out.resize(BLOCK_LEN + body_len, pad_len as u8);

        let mut prev = iv;
        for chunk in out[BLOCK_LEN..].chunks_exact_mut(BLOCK_LEN) {
            for (b, p) in chunk.iter_mut().zip(prev) {
                *b ^= p;
            }
            self.write.encrypt_block(chunk);
            prev.copy_from_slice(chunk);
        }

        Ok(out)
    }

    fn decode(
        &mut self,
        seq: u64,
        content_type: ContentType,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if ciphertext.len() < self.min_ciphertext_len() {
            return Err(Error::Alert(AlertDescription::DecodeError));
        }
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(Error::Alert(AlertDescription::BadRecordMac));
        }

        let (iv, body) = ciphertext.split_at(BLOCK_LEN);
        let mut plain = body.to_vec();
        let mut prev: [u8; BLOCK_LEN] = [0; BLOCK_LEN];
        prev.copy_from_slice(iv);
        for chunk in plain.chunks_exact_mut(BLOCK_LEN) {
            let mut this = [0u8; BLOCK_LEN];
            this.copy_from_slice(chunk);
            self.read.decrypt_block(chunk);
            for (b, p) in chunk.iter_mut().zip(prev) {
                *b ^= p;
            }
            prev = this;
        }

        let mac_size = self.read_mac.size();
        let total = plain.len();

        // Padding check without data dependent branches.
        let claimed = plain[total - 1];
        let too_long = (claimed as u64 + 1 + mac_size as u64).ct_gt(&(total as u64));
        let pad_len = u8::conditional_select(&claimed, &0, too_long);
        let mut bad = too_long;
        let check_len = total.min(256);
        for i in 0..check_len {
            let in_pad = (i as u64).ct_lt(&(pad_len as u64 + 1));
            let mismatch = !plain[total - 1 - i].ct_eq(&pad_len);
            bad |= in_pad & mismatch;
        }

        let content_len = total - pad_len as usize - 1 - mac_size;
        let (content, rest) = plain.split_at(content_len);
        let (received_mac, padding) = rest.split_at(mac_size);

        let header = additional_data(seq, content_type, self.version, content_len);
        let mac_ok = self.read_mac.verify(&header, content, received_mac);
        // Hash the padding too so the MAC work does not depend on pad_len.
        self.read_mac.dummy(padding);

        if bool::from(bad | !mac_ok) {
            return Err(Error::Alert(AlertDescription::BadRecordMac));
        }

        check_plaintext_len(content_len)?;
        plain.truncate(content_len);
        Ok(plain)
    }
}
