use std::time::Duration;

use crate::Error;

/// Record layer configuration
#[derive(Debug, Clone)]
pub struct Config {
    drop_invalid_records: bool,
    receive_timeout: Duration,
    sequence_warning_margin: u64,
    retain_previous_epoch: bool,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            drop_invalid_records: true,
            receive_timeout: Duration::from_secs(1),
            sequence_warning_margin: 1 << 16,
            retain_previous_epoch: true,
            rng_seed: None,
        }
    }

    /// Whether DTLS records failing decode are silently dropped.
    ///
    /// DTLS must tolerate network garbage. When false, every failed decode is
    /// a fatal `bad_record_mac`. TLS ignores this setting and always fails.
    #[inline(always)]
    pub fn drop_invalid_records(&self) -> bool {
        self.drop_invalid_records
    }

    /// How long a blocking read through the stream adapter waits per datagram.
    #[inline(always)]
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Remaining sequence numbers at which an epoch starts warning that a
    /// rekey is needed.
    #[inline(always)]
    pub fn sequence_warning_margin(&self) -> u64 {
        self.sequence_warning_margin
    }

    /// Keep the read epoch before the last switch, to accept records
    /// reordered across the rekey boundary until explicitly retired. Only
    /// one previous epoch is kept; the next switch retires it.
    #[inline(always)]
    pub fn retain_previous_epoch(&self) -> bool {
        self.retain_previous_epoch
    }

    /// Seed for the context random source. Only for tests.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

/// Builder for record layer configuration.
pub struct ConfigBuilder {
    drop_invalid_records: bool,
    receive_timeout: Duration,
    sequence_warning_margin: u64,
    retain_previous_epoch: bool,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Set whether invalid DTLS records are dropped instead of failing.
    ///
    /// Defaults to true.
    pub fn drop_invalid_records(mut self, drop: bool) -> Self {
        self.drop_invalid_records = drop;
        self
    }

    /// Defaults to 1 second.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Defaults to 2^16.
    pub fn sequence_warning_margin(mut self, margin: u64) -> Self {
        self.sequence_warning_margin = margin;
        self
    }

    /// Defaults to true.
    pub fn retain_previous_epoch(mut self, retain: bool) -> Self {
        self.retain_previous_epoch = retain;
        self
    }

    /// Make the context random source deterministic.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::Config` for a zero receive timeout.
    pub fn build(self) -> Result<Config, Error> {
        if self.receive_timeout.is_zero() {
            return Err(Error::Config("receive_timeout must be non-zero".into()));
        }

        Ok(Config {
            drop_invalid_records: self.drop_invalid_records,
            receive_timeout: self.receive_timeout,
            sequence_warning_margin: self.sequence_warning_margin,
            retain_previous_epoch: self.retain_previous_epoch,
            rng_seed: self.rng_seed,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.drop_invalid_records());
        assert!(config.retain_previous_epoch());
        assert_eq!(config.receive_timeout(), Duration::from_secs(1));
        assert_eq!(config.rng_seed(), None);
    }

    #[test]
    fn zero_timeout_rejected() {
        let res = Config::builder().receive_timeout(Duration::ZERO).build();
        assert!(matches!(res, Err(Error::Config(_))));
    }
}
