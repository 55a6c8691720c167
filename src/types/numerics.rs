use std::fmt;

use crate::Error;

/// Largest sequence number that fits the 48-bit DTLS wire field.
pub const DTLS_MAX_SEQUENCE: u64 = (1 << 48) - 1;

/// Largest TLS sequence number (RFC 5246 §6.1, 64 bits).
pub const TLS_MAX_SEQUENCE: u64 = u64::MAX;

/// DTLS epoch identifier carried in every record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EpochId(pub u16);

impl EpochId {
    /// The initial, unprotected epoch.
    pub const INITIAL: EpochId = EpochId(0);

    /// Increase the epoch by one and error if it wraps.
    pub fn increase(&self) -> Result<EpochId, Error> {
        // https://datatracker.ietf.org/doc/html/rfc6347#section-4.1
        //
        // Similarly, implementations MUST NOT allow the epoch to wrap, but
        // instead MUST establish a new association
        match self.0.checked_add(1) {
            Some(v) => Ok(EpochId(v)),
            None => Err(Error::WrappedEpoch),
        }
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Combine epoch and 48-bit sequence number into the 64-bit value that
/// DTLS authenticates in place of the TLS sequence number (RFC 6347 §4.1.2.1).
#[inline(always)]
pub fn dtls_record_sequence(epoch: EpochId, seq: u64) -> u64 {
    ((epoch.0 as u64) << 48) | (seq & DTLS_MAX_SEQUENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_must_not_wrap() {
        assert_eq!(EpochId(4).increase().unwrap(), EpochId(5));
        assert!(matches!(
            EpochId(u16::MAX).increase(),
            Err(Error::WrappedEpoch)
        ));
    }

    #[test]
    fn record_sequence_puts_epoch_in_top_bits() {
        let s = dtls_record_sequence(EpochId(1), 7);
        assert_eq!(s.to_be_bytes(), [0, 1, 0, 0, 0, 0, 0, 7]);
        let s = dtls_record_sequence(EpochId(0xabcd), DTLS_MAX_SEQUENCE);
        assert_eq!(s, 0xabcd_ffff_ffff_ffff);
    }
}
