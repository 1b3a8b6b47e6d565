//! Msg3 UL HARQ Process
//!
//! Retransmission context for one pending Msg3. The process identifier is
//! fixed at construction and matches the slot of the pending-Msg3 array the
//! process lives in.

use common::interval::PrbInterval;
use common::slot_point::SlotPoint;
use tracing::{debug, warn};

/// Slots to wait for a CRC before treating the transmission as NACKed
const MAX_ACK_WAIT_SLOTS: u32 = 8;

/// UL HARQ process dedicated to Msg3
#[derive(Debug)]
pub struct UlHarqProcess {
    pid: u8,
    slot_tx: Option<SlotPoint>,
    prbs: PrbInterval,
    mcs: u8,
    nof_retx: u8,
    max_retx: u8,
    tbs_bytes: u32,
    pending_retx: bool,
}

impl UlHarqProcess {
    /// Create an empty process with a fixed identifier
    pub fn new(pid: u8) -> Self {
        Self {
            pid,
            slot_tx: None,
            prbs: PrbInterval::default(),
            mcs: 0,
            nof_retx: 0,
            max_retx: 0,
            tbs_bytes: 0,
            pending_retx: false,
        }
    }

    /// HARQ process identifier
    pub fn pid(&self) -> u8 {
        self.pid
    }

    /// Check whether the process holds no active transmission
    pub fn is_empty(&self) -> bool {
        self.slot_tx.is_none()
    }

    /// PRBs of the last transmission
    pub fn prbs(&self) -> PrbInterval {
        self.prbs
    }

    /// MCS of the last transmission
    pub fn mcs(&self) -> u8 {
        self.mcs
    }

    /// Number of retransmissions so far
    pub fn nof_retx(&self) -> u8 {
        self.nof_retx
    }

    /// Transport block size of the last transmission
    pub fn tbs_bytes(&self) -> u32 {
        self.tbs_bytes
    }

    /// Check whether a retransmission is awaiting allocation
    pub fn has_pending_retx(&self) -> bool {
        self.pending_retx
    }

    /// Record the transport block size once the grant is final
    pub fn set_tbs(&mut self, tbs_bytes: u32) {
        self.tbs_bytes = tbs_bytes;
    }

    /// Start a new transmission. Fails when the process is busy.
    pub fn new_tx(&mut self, slot: SlotPoint, prbs: PrbInterval, mcs: u8, max_retx: u8) -> bool {
        if !self.is_empty() {
            return false;
        }
        self.slot_tx = Some(slot);
        self.prbs = prbs;
        self.mcs = mcs;
        self.nof_retx = 0;
        self.max_retx = max_retx;
        self.pending_retx = false;
        true
    }

    /// Allocate a pending retransmission. Fails when none is pending or the
    /// retransmission budget is exhausted.
    pub fn new_retx(&mut self, slot: SlotPoint, prbs: PrbInterval) -> bool {
        if self.is_empty() || !self.pending_retx || self.nof_retx >= self.max_retx {
            return false;
        }
        self.slot_tx = Some(slot);
        self.prbs = prbs;
        self.nof_retx += 1;
        self.pending_retx = false;
        true
    }

    /// Process the CRC outcome of the last transmission
    pub fn ack_info(&mut self, ack: bool) {
        if self.is_empty() {
            return;
        }
        if ack {
            self.reset();
        } else {
            self.nack();
        }
    }

    /// Advance the process to the given rx slot. A transmission with no CRC
    /// after the ACK wait window is treated as NACKed.
    pub fn slot_indication(&mut self, slot_rx: SlotPoint) {
        let Some(slot_tx) = self.slot_tx else {
            return;
        };
        if !self.pending_retx && slot_rx >= slot_tx + MAX_ACK_WAIT_SLOTS {
            debug!(
                "Msg3 HARQ pid={}: ACK wait expired at slot_rx={}, treating as NACK",
                self.pid, slot_rx
            );
            self.nack();
        }
    }

    fn nack(&mut self) {
        if self.nof_retx >= self.max_retx {
            warn!(
                "Msg3 HARQ pid={}: maximum number of retransmissions ({}) exceeded",
                self.pid, self.max_retx
            );
            self.reset();
        } else {
            self.pending_retx = true;
        }
    }

    /// Release the process
    pub fn reset(&mut self) {
        self.slot_tx = None;
        self.prbs = PrbInterval::default();
        self.mcs = 0;
        self.nof_retx = 0;
        self.max_retx = 0;
        self.tbs_bytes = 0;
        self.pending_retx = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::new(1, count)
    }

    #[test]
    fn test_new_tx_and_ack_releases() {
        let mut harq = UlHarqProcess::new(3);
        assert!(harq.is_empty());
        assert!(harq.new_tx(slot(18), PrbInterval::new(0, 3), 0, 4));
        assert!(!harq.is_empty());
        assert!(!harq.new_tx(slot(19), PrbInterval::new(0, 3), 0, 4));

        harq.ack_info(true);
        assert!(harq.is_empty());
    }

    #[test]
    fn test_nack_then_retx() {
        let mut harq = UlHarqProcess::new(1);
        assert!(harq.new_tx(slot(18), PrbInterval::new(2, 5), 0, 4));
        harq.ack_info(false);
        assert!(harq.has_pending_retx());

        assert!(harq.new_retx(slot(26), PrbInterval::new(2, 5)));
        assert_eq!(harq.nof_retx(), 1);
        assert!(!harq.has_pending_retx());
    }

    #[test]
    fn test_max_retx_exceeded_releases() {
        let mut harq = UlHarqProcess::new(1);
        assert!(harq.new_tx(slot(18), PrbInterval::new(0, 3), 0, 2));
        for retx in 1..=2 {
            harq.ack_info(false);
            assert!(harq.new_retx(slot(18 + 8 * retx), PrbInterval::new(0, 3)));
        }
        // The budget is spent; the next NACK drops the process.
        harq.ack_info(false);
        assert!(harq.is_empty());
    }

    #[test]
    fn test_ack_wait_timeout_is_nack() {
        let mut harq = UlHarqProcess::new(1);
        assert!(harq.new_tx(slot(18), PrbInterval::new(0, 3), 0, 4));
        harq.slot_indication(slot(25));
        assert!(!harq.has_pending_retx());
        harq.slot_indication(slot(26));
        assert!(harq.has_pending_retx());
    }
}
