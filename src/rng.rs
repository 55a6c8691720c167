//! Seedable random source for the connection context.
//!
//! When a seed is provided via [`Config::rng_seed`](crate::Config::rng_seed),
//! all randomness drawn through the context is deterministic. This is useful
//! for testing and debugging, never for production.

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

/// Random source of a [`Context`](crate::Context): `StdRng` when seeded,
/// the OS generator otherwise.
pub struct SeededRng {
    inner: Option<StdRng>,
}

impl SeededRng {
    pub fn new(seed: Option<u64>) -> Self {
        let inner = seed.map(StdRng::seed_from_u64);
        Self { inner }
    }

    pub fn fill_bytes(&mut self, out: &mut [u8]) {
        match self.inner.as_mut() {
            Some(rng) => rng.fill_bytes(out),
            None => OsRng.fill_bytes(out),
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.inner.is_some()
    }
}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededRng")
            .field("seeded", &self.is_seeded())
            .finish()
    }
}
