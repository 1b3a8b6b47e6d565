//! Cell Resource Allocator
//!
//! Rolling ring of per-slot DL/UL resource grids and scheduling results,
//! spanning the current tx slot and the future slots reachable through k0,
//! k1, k2 and the Msg3 delay. Advancing is O(1): the slot leaving the window
//! is cleared and reused for the slot entering it.

use crate::cell::resource_grid::SlotResourceGrid;
use crate::config::CellConfiguration;
use crate::result::SlotResult;
use common::slot_point::SlotPoint;

/// Number of slots in the allocation ring. Must cover the largest scheduling
/// delay in use (k0 + k1, k2 + Delta, Msg3 retx k2) with margin, and divide
/// the hyper-frame length so ring indexing stays stable across the wrap.
pub const RING_NOF_SLOTS: usize = 20;

/// Resource grids and scheduling result for one slot
#[derive(Debug)]
pub struct SlotAllocation {
    /// Slot this allocation refers to
    pub slot: SlotPoint,
    /// DL resource grid
    pub dl_res_grid: SlotResourceGrid,
    /// UL resource grid
    pub ul_res_grid: SlotResourceGrid,
    /// Scheduling result under construction
    pub result: SlotResult,
}

impl SlotAllocation {
    fn new(slot: SlotPoint, nof_dl_crbs: u16, nof_ul_crbs: u16) -> Self {
        Self {
            slot,
            dl_res_grid: SlotResourceGrid::new(nof_dl_crbs),
            ul_res_grid: SlotResourceGrid::new(nof_ul_crbs),
            result: SlotResult::new(),
        }
    }

    fn reset_for(&mut self, slot: SlotPoint) {
        self.slot = slot;
        self.dl_res_grid.reset();
        self.ul_res_grid.reset();
        self.result.clear();
    }
}

/// Ring of slot allocations owned by one cell
pub struct CellResourceAllocator {
    slots: Vec<SlotAllocation>,
    slot_tx: SlotPoint,
}

impl CellResourceAllocator {
    /// Create the ring with all slots pre-allocated, starting at `slot_tx`
    pub fn new(cfg: &CellConfiguration, slot_tx: SlotPoint) -> Self {
        let nof_dl_crbs = cfg.dl_bwp.crbs.stop;
        let nof_ul_crbs = cfg.ul_bwp.crbs.stop;
        let slots = (0..RING_NOF_SLOTS as u32)
            .map(|k| SlotAllocation::new(slot_tx + k, nof_dl_crbs, nof_ul_crbs))
            .collect();
        Self { slots, slot_tx }
    }

    /// Current tx reference slot
    pub fn slot_tx(&self) -> SlotPoint {
        self.slot_tx
    }

    fn ring_index(&self, k: usize) -> usize {
        assert!(k < RING_NOF_SLOTS, "slot offset {} outside the ring", k);
        (self.slot_tx.to_uint() as usize + k) % RING_NOF_SLOTS
    }

    /// Rotate the ring: the outgoing tx slot is cleared and becomes the new
    /// furthest future slot.
    pub fn advance(&mut self) {
        let recycled = self.ring_index(0);
        let new_slot = self.slot_tx + RING_NOF_SLOTS as u32;
        self.slots[recycled].reset_for(new_slot);
        self.slot_tx += 1;
    }
}

impl std::ops::Index<usize> for CellResourceAllocator {
    type Output = SlotAllocation;

    fn index(&self, k: usize) -> &SlotAllocation {
        let idx = self.ring_index(k);
        &self.slots[idx]
    }
}

impl std::ops::IndexMut<usize> for CellResourceAllocator {
    fn index_mut(&mut self, k: usize) -> &mut SlotAllocation {
        let idx = self.ring_index(k);
        &mut self.slots[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::resource_grid::GrantInfo;
    use crate::config::test_cell_config;
    use common::interval::CrbInterval;
    use common::types::{OfdmSymbolRange, SubcarrierSpacing};

    fn make_alloc() -> CellResourceAllocator {
        let cfg = test_cell_config();
        CellResourceAllocator::new(&cfg, SlotPoint::new(1, 0))
    }

    #[test]
    fn test_indexing_follows_tx_slot() {
        let mut alloc = make_alloc();
        assert_eq!(alloc[0].slot, SlotPoint::new(1, 0));
        assert_eq!(alloc[7].slot, SlotPoint::new(1, 7));
        alloc.advance();
        assert_eq!(alloc.slot_tx(), SlotPoint::new(1, 1));
        assert_eq!(alloc[0].slot, SlotPoint::new(1, 1));
        assert_eq!(alloc[RING_NOF_SLOTS - 1].slot, SlotPoint::new(1, 20));
    }

    #[test]
    fn test_fill_durable_until_advance() {
        let mut alloc = make_alloc();
        let grant = GrantInfo {
            scs: SubcarrierSpacing::Scs30,
            symbols: OfdmSymbolRange::new(0, 14),
            crbs: CrbInterval::new(0, 4),
        };
        alloc[3].dl_res_grid.fill(&grant);

        // Still committed after advancing up to that slot.
        for _ in 0..3 {
            alloc.advance();
            assert!(alloc[0].slot <= SlotPoint::new(1, 3));
        }
        assert!(alloc[0].dl_res_grid.collides(&grant));

        // Cleared once the ring rotates past it.
        alloc.advance();
        assert!(!alloc[RING_NOF_SLOTS - 1].dl_res_grid.collides(&grant));
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_offset_panics() {
        let alloc = make_alloc();
        let _ = &alloc[RING_NOF_SLOTS];
    }
}
