//! Per-UE DRX Controller
//!
//! Gates PDCCH monitoring for one UE. Deadlines are absolute slot points, so
//! no decay logic runs per slot; the decision ladder compares the current
//! slot against the on-duration window and the active deadlines.

use crate::config::DrxConfig;
use common::slot_point::SlotPoint;
use common::types::SubcarrierSpacing;

#[derive(Debug, Clone, Copy)]
struct DrxTimings {
    period_slots: u32,
    offset_slot: u32,
    on_dur_slots: u32,
    inactivity_slots: u32,
}

/// DRX state machine for one UE
#[derive(Debug)]
pub struct DrxController {
    timings: Option<DrxTimings>,
    conres_timer_slots: u32,
    inactivity_deadline: Option<SlotPoint>,
    conres_deadline: Option<SlotPoint>,
    sr_pending: bool,
}

impl DrxController {
    /// Create the controller; `drx_cfg == None` leaves PDCCH always enabled
    pub fn new(scs: SubcarrierSpacing, conres_timer_ms: u32, drx_cfg: Option<DrxConfig>) -> Self {
        let slots_per_ms = scs.slots_per_subframe();
        Self {
            timings: drx_cfg.map(|cfg| DrxTimings {
                period_slots: cfg.long_cycle_ms * slots_per_ms,
                offset_slot: cfg.long_start_offset_ms * slots_per_ms,
                on_dur_slots: cfg.on_duration_timer_ms * slots_per_ms,
                inactivity_slots: cfg.inactivity_timer_ms * slots_per_ms,
            }),
            conres_timer_slots: conres_timer_ms * slots_per_ms,
            inactivity_deadline: None,
            conres_deadline: None,
            sr_pending: false,
        }
    }

    /// Advance to the current slot, clearing deadlines already passed
    pub fn slot_indication(&mut self, slot: SlotPoint) {
        if self.inactivity_deadline.is_some_and(|deadline| slot > deadline) {
            self.inactivity_deadline = None;
        }
        if self.conres_deadline.is_some_and(|deadline| slot > deadline) {
            self.conres_deadline = None;
        }
    }

    /// Extend the active time after a PDCCH allocation for this UE
    pub fn on_new_pdcch_alloc(&mut self, slot: SlotPoint) {
        let Some(timings) = self.timings else {
            return;
        };
        let deadline = slot + timings.inactivity_slots;
        self.inactivity_deadline = match self.inactivity_deadline {
            Some(current) if current >= deadline => Some(current),
            _ => Some(deadline),
        };
    }

    /// Start the contention-resolution window
    pub fn on_con_res_start(&mut self, slot: SlotPoint) {
        self.conres_deadline = Some(slot + self.conres_timer_slots);
    }

    /// Mark a scheduling request as pending
    pub fn on_sr_indication(&mut self) {
        self.sr_pending = true;
    }

    /// Clear the pending scheduling request
    pub fn reset_sr_indication(&mut self) {
        self.sr_pending = false;
    }

    /// Check whether the UE monitors PDCCH at the given slot
    pub fn is_pdcch_enabled(&self, slot: SlotPoint) -> bool {
        let Some(timings) = self.timings else {
            return true;
        };
        let slot_mod = slot.to_uint() % timings.period_slots;
        if slot_mod >= timings.offset_slot
            && slot_mod < timings.offset_slot + timings.on_dur_slots
        {
            return true;
        }
        if self.inactivity_deadline.is_some_and(|deadline| slot <= deadline) {
            return true;
        }
        if self.conres_deadline.is_some_and(|deadline| slot <= deadline) {
            return true;
        }
        self.sr_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drx_cfg() -> DrxConfig {
        DrxConfig {
            long_cycle_ms: 80,
            long_start_offset_ms: 10,
            on_duration_timer_ms: 10,
            inactivity_timer_ms: 20,
        }
    }

    fn controller() -> DrxController {
        // 15 kHz keeps one slot per millisecond, so config values map to
        // slots directly.
        DrxController::new(SubcarrierSpacing::Scs15, 64, Some(drx_cfg()))
    }

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::new(0, count)
    }

    #[test]
    fn test_no_config_always_enabled() {
        let drx = DrxController::new(SubcarrierSpacing::Scs30, 64, None);
        for count in 0..200 {
            assert!(drx.is_pdcch_enabled(SlotPoint::new(1, count)));
        }
    }

    #[test]
    fn test_on_duration_window() {
        let drx = controller();
        for count in 0..80 {
            let expected = (10..20).contains(&count);
            assert_eq!(drx.is_pdcch_enabled(slot(count)), expected, "slot {}", count);
        }
    }

    #[test]
    fn test_periodicity() {
        let drx = controller();
        for count in 0..80 {
            assert_eq!(
                drx.is_pdcch_enabled(slot(count)),
                drx.is_pdcch_enabled(slot(count + 80))
            );
        }
    }

    #[test]
    fn test_inactivity_extends_active_time() {
        let mut drx = controller();
        assert!(!drx.is_pdcch_enabled(slot(25)));

        drx.on_new_pdcch_alloc(slot(15));
        // Active until slot 35 inclusive.
        assert!(drx.is_pdcch_enabled(slot(25)));
        assert!(drx.is_pdcch_enabled(slot(35)));
        assert!(!drx.is_pdcch_enabled(slot(36)));
    }

    #[test]
    fn test_conres_window() {
        let mut drx = controller();
        drx.on_con_res_start(slot(20));
        for count in 20..=84 {
            assert!(drx.is_pdcch_enabled(slot(count)), "slot {}", count);
        }
        // Slot 85 is past the deadline and outside the on-duration window.
        assert!(!drx.is_pdcch_enabled(slot(85)));
    }

    #[test]
    fn test_sr_pending_forces_active() {
        let mut drx = controller();
        drx.on_sr_indication();
        for count in 0..80 {
            assert!(drx.is_pdcch_enabled(slot(count)));
        }
        drx.reset_sr_indication();
        assert!(!drx.is_pdcch_enabled(slot(25)));
    }

    #[test]
    fn test_slot_indication_clears_passed_deadlines() {
        let mut drx = controller();
        drx.on_new_pdcch_alloc(slot(15));
        drx.slot_indication(slot(40));
        assert!(!drx.is_pdcch_enabled(slot(40)));
    }
}
