/// Number of sequence numbers tracked below the highest one seen.
pub const REPLAY_WINDOW_WIDTH: u64 = 64;

/// Sliding replay window for DTLS record sequence numbers (RFC 6347 §4.1.2.6).
///
/// Maintains the highest accepted sequence number and a 64-bit bitmap of the
/// last 64 sequence numbers up to it. Bit 0 is `highest` itself, bit `n` is
/// `highest - n`.
///
/// Each epoch owns its own `ReplayWindow`. Checking and marking are separate
/// steps: a record may only be marked after its MAC or AEAD tag verified,
/// otherwise a forged record could poison the window and get the genuine one
/// dropped.
#[derive(Debug, Default, Clone)]
pub struct ReplayWindow {
    highest: u64,
    bitmap: u64,
    seen_any: bool,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number accepted so far, if any.
    pub fn highest_seen(&self) -> Option<u64> {
        self.seen_any.then_some(self.highest)
    }

    /// Whether `seqno` would be accepted. Does not change the window.
    pub fn is_fresh(&self, seqno: u64) -> bool {
        if !self.seen_any || seqno > self.highest {
            return true;
        }
        let offset = self.highest - seqno;
        if offset >= REPLAY_WINDOW_WIDTH {
            return false; // too old
        }
        self.bitmap & (1u64 << offset) == 0
    }

    /// Record `seqno` as received. Call only for authenticated records.
    pub fn mark_seen(&mut self, seqno: u64) {
        if !self.seen_any {
            self.seen_any = true;
            self.highest = seqno;
            self.bitmap = 1;
            return;
        }

        if seqno > self.highest {
            let delta = seqno - self.highest;
            if delta >= REPLAY_WINDOW_WIDTH {
                self.bitmap = 0;
            } else {
                self.bitmap <<= delta;
            }
            self.bitmap |= 1; // mark newest as seen
            self.highest = seqno;
        } else {
            let offset = self.highest - seqno;
            if offset < REPLAY_WINDOW_WIDTH {
                self.bitmap |= 1u64 << offset;
            }
        }
    }

    /// Check and mark in one step. Only for records that are already
    /// authenticated. Returns true if fresh/acceptable, false if
    /// duplicate/too old.
    pub fn check_and_update(&mut self, seqno: u64) -> bool {
        if !self.is_fresh(seqno) {
            return false;
        }
        self.mark_seen(seqno);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_fresh_and_rejects_duplicate() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(0));
        assert!(!w.check_and_update(0)); // duplicate
        assert!(w.check_and_update(1));
        assert!(!w.check_and_update(1));
        assert!(w.check_and_update(2)); // next fresh
    }

    #[test]
    fn accepts_out_of_order_within_window() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(10)); // establish max=10
        assert!(w.check_and_update(8)); // unseen within 64
        assert!(!w.check_and_update(8)); // duplicate now
        assert!(w.check_and_update(9)); // unseen within 64
        assert_eq!(w.highest_seen(), Some(10));
    }

    #[test]
    fn rejects_too_old() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(100));
        // offset = 64 -> too old
        assert!(!w.check_and_update(36));
        // offset = 63 -> allowed once
        assert!(w.check_and_update(37));
        assert!(!w.check_and_update(37));
    }

    #[test]
    fn every_offset_inside_window_accepted_exactly_once() {
        let mut w = ReplayWindow::new();
        let highest = 1000;
        assert!(w.check_and_update(highest));
        for k in 1..REPLAY_WINDOW_WIDTH {
            assert!(w.check_and_update(highest - k), "k={}", k);
            assert!(!w.check_and_update(highest - k), "k={}", k);
        }
        for k in REPLAY_WINDOW_WIDTH..200 {
            assert!(!w.is_fresh(highest - k), "k={}", k);
        }
    }

    #[test]
    fn large_jump_clears_window() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(1));
        assert!(w.check_and_update(80));
        // Within window of new max and unseen
        assert!(w.check_and_update(79));
        // 17 = 80 - 63 was never received, the old max 1 must not alias onto it
        assert!(w.check_and_update(17));
        // Too old relative to new max
        assert!(!w.check_and_update(15));
    }

    #[test]
    fn jump_of_exactly_window_width() {
        let mut w = ReplayWindow::new();
        assert!(w.check_and_update(0));
        assert!(w.check_and_update(64));
        assert!(!w.is_fresh(0));
        assert!(w.is_fresh(1));
    }

    #[test]
    fn shift_preserves_seen_marks() {
        let mut w = ReplayWindow::new();
        for s in [10, 12, 14] {
            assert!(w.check_and_update(s));
        }
        assert!(w.check_and_update(20));
        assert!(!w.is_fresh(10));
        assert!(!w.is_fresh(12));
        assert!(!w.is_fresh(14));
        assert!(w.is_fresh(11));
        assert!(w.is_fresh(13));
        assert!(w.is_fresh(19));
    }

    #[test]
    fn is_fresh_does_not_mutate() {
        let mut w = ReplayWindow::new();
        assert!(w.is_fresh(5));
        assert!(w.is_fresh(5));
        assert_eq!(w.highest_seen(), None);
        w.mark_seen(5);
        assert!(!w.is_fresh(5));
    }
}
