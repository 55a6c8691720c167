//! Per-epoch record state: sequence counter, cipher and replay window.

use std::fmt;

use log::{trace, warn};

use crate::crypto::CipherTransform;
use crate::types::{dtls_record_sequence, AlertDescription, EpochId};
use crate::types::{DTLS_MAX_SEQUENCE, TLS_MAX_SEQUENCE};
use crate::window::ReplayWindow;
use crate::Error;

/// One cipher state of a connection.
///
/// Owns exactly one transform and one replay window. The write sequence
/// number starts at 0 and never repeats within the epoch.
pub struct Epoch {
    id: EpochId,
    datagram: bool,
    next_sequence: u64,
    limit: u64,
    warning_margin: u64,
    warned: bool,
    exhausted: bool,
    transform: Box<dyn CipherTransform>,
    window: ReplayWindow,
}

impl Epoch {
    /// A DTLS epoch, limited to 48-bit sequence numbers.
    pub fn dtls(id: EpochId, transform: Box<dyn CipherTransform>, warning_margin: u64) -> Self {
        Self::new(id, true, DTLS_MAX_SEQUENCE, transform, warning_margin)
    }

    /// A TLS cipher state, limited to 64-bit sequence numbers. The id is
    /// local bookkeeping, TLS records do not carry it.
    pub fn tls(id: EpochId, transform: Box<dyn CipherTransform>, warning_margin: u64) -> Self {
        Self::new(id, false, TLS_MAX_SEQUENCE, transform, warning_margin)
    }

    fn new(
        id: EpochId,
        datagram: bool,
        limit: u64,
        transform: Box<dyn CipherTransform>,
        warning_margin: u64,
    ) -> Self {
        Epoch {
            id,
            datagram,
            next_sequence: 0,
            limit,
            warning_margin,
            warned: false,
            exhausted: false,
            transform,
            window: ReplayWindow::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_next_sequence(mut self, next: u64) -> Self {
        self.next_sequence = next;
        self
    }

    #[inline(always)]
    pub fn id(&self) -> EpochId {
        self.id
    }

    /// Next write sequence number, then advance the counter.
    ///
    /// Exhausting the sequence space is fatal. A new epoch must be
    /// negotiated before that.
    pub fn allocate_sequence_number(&mut self) -> Result<u64, Error> {
        if self.exhausted {
            warn!("Sequence numbers exhausted in epoch {}", self.id);
            return Err(Error::Alert(AlertDescription::InternalError));
        }

        let seq = self.next_sequence;
        let remaining = self.limit - seq;
        if !self.warned && remaining < self.warning_margin {
            warn!(
                "Epoch {} has {} sequence numbers left, renegotiate",
                self.id, remaining
            );
            self.warned = true;
        }

        if remaining == 0 {
            self.exhausted = true;
        } else {
            self.next_sequence = seq + 1;
        }
        trace!("Epoch {} allocated sequence {}", self.id, seq);
        Ok(seq)
    }

    /// The 64-bit value the transform authenticates for `seq`.
    #[inline(always)]
    pub fn record_sequence(&self, seq: u64) -> u64 {
        if self.datagram {
            dtls_record_sequence(self.id, seq)
        } else {
            seq
        }
    }

    pub fn transform(&self) -> &dyn CipherTransform {
        self.transform.as_ref()
    }

    pub fn transform_mut(&mut self) -> &mut dyn CipherTransform {
        self.transform.as_mut()
    }

    pub fn window(&self) -> &ReplayWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut ReplayWindow {
        &mut self.window
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Epoch")
            .field("id", &self.id)
            .field("next_sequence", &self.next_sequence)
            .field("transform", &self.transform)
            .field("window", &self.window)
            .finish()
    }
}
