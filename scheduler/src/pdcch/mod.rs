//! PDCCH Resource Allocation
//!
//! CCE accounting for common search spaces on CORESET#0. Allocation returns
//! an index into the slot's PDCCH result list; the caller writes the DCI
//! payload through it. All failures are soft: the candidate is simply not
//! allocated this slot.

use crate::cell::SlotAllocation;
use crate::config::CellConfiguration;
use crate::result::{
    AggregationLevel, Dci0_0TcRnti, Dci1_0, DciDl, DciUl, DlPdcch, PdcchContext, UlPdcch,
};
use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::Arc;
use tracing::debug;

/// Per-slot CCE usage, reset lazily when the ring wraps to a new slot
#[derive(Debug, Clone, Copy)]
struct SlotCceRecord {
    slot: Option<SlotPoint>,
    used_cces: u64,
}

/// Allocator of PDCCH candidates in the common search spaces
pub struct PdcchResourceAllocator {
    cfg: Arc<CellConfiguration>,
    records: Vec<SlotCceRecord>,
}

impl PdcchResourceAllocator {
    /// Number of tracked slots; matches the cell resource ring
    const NOF_RECORDS: usize = crate::cell::resource_allocator::RING_NOF_SLOTS;

    /// Create the allocator for a cell
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            cfg,
            records: vec![
                SlotCceRecord {
                    slot: None,
                    used_cces: 0,
                };
                Self::NOF_RECORDS
            ],
        }
    }

    /// Allocate a DL PDCCH candidate and append its record to the slot result.
    ///
    /// On success the returned index addresses `slot_alloc.result.dl.dl_pdcchs`
    /// and the CCEs are reserved until the slot is advanced past.
    pub fn alloc_dl_pdcch_common(
        &mut self,
        slot_alloc: &mut SlotAllocation,
        rnti: Rnti,
        search_space_id: u8,
        aggregation_level: AggregationLevel,
    ) -> Option<usize> {
        if slot_alloc.result.dl.dl_pdcchs.is_full() {
            debug!("PDCCH allocation failed for rnti={}: DL list full", rnti);
            return None;
        }
        let ctx = self.alloc_candidate(slot_alloc.slot, rnti, search_space_id, aggregation_level)?;
        slot_alloc.result.dl.dl_pdcchs.push(DlPdcch {
            ctx,
            dci: DciDl::RaF1_0(Dci1_0::default()),
        });
        Some(slot_alloc.result.dl.dl_pdcchs.len() - 1)
    }

    /// Allocate an UL PDCCH candidate and append its record to the slot result
    pub fn alloc_ul_pdcch_common(
        &mut self,
        slot_alloc: &mut SlotAllocation,
        rnti: Rnti,
        search_space_id: u8,
        aggregation_level: AggregationLevel,
    ) -> Option<usize> {
        if slot_alloc.result.dl.ul_pdcchs.is_full() {
            debug!("PDCCH allocation failed for rnti={}: UL list full", rnti);
            return None;
        }
        let ctx = self.alloc_candidate(slot_alloc.slot, rnti, search_space_id, aggregation_level)?;
        slot_alloc.result.dl.ul_pdcchs.push(UlPdcch {
            ctx,
            dci: DciUl::TcRntiF0_0(Dci0_0TcRnti::default()),
        });
        Some(slot_alloc.result.dl.ul_pdcchs.len() - 1)
    }

    fn alloc_candidate(
        &mut self,
        slot: SlotPoint,
        rnti: Rnti,
        search_space_id: u8,
        aggregation_level: AggregationLevel,
    ) -> Option<PdcchContext> {
        let ss = self.cfg.search_space(search_space_id)?;
        if !ss.is_monitored(slot) {
            debug!(
                "PDCCH allocation failed for rnti={}: search space {} not monitored at slot {}",
                rnti, search_space_id, slot
            );
            return None;
        }
        debug_assert_eq!(ss.coreset_id, self.cfg.coreset0.id, "common SS outside CORESET#0");
        let coreset = self.cfg.coreset0;
        let coreset_id = coreset.id;
        let nof_cces = coreset.nof_cces();
        let lvl = aggregation_level.nof_cces();

        let record = self.record_mut(slot);
        for candidate in 0..nof_cces / lvl {
            let cce_index = candidate * lvl;
            let mask = ((1u64 << lvl) - 1) << cce_index;
            if record.used_cces & mask == 0 {
                record.used_cces |= mask;
                return Some(PdcchContext {
                    rnti,
                    search_space_id,
                    coreset_id,
                    aggregation_level,
                    cce_index,
                });
            }
        }
        debug!(
            "PDCCH allocation failed for rnti={}: no CCE candidate fits L={} at slot {}",
            rnti, lvl, slot
        );
        None
    }

    fn record_mut(&mut self, slot: SlotPoint) -> &mut SlotCceRecord {
        let idx = slot.to_uint() as usize % Self::NOF_RECORDS;
        let record = &mut self.records[idx];
        if record.slot != Some(slot) {
            record.slot = Some(slot);
            record.used_cces = 0;
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellResourceAllocator;
    use crate::config::test_cell_config;

    fn setup() -> (Arc<CellConfiguration>, CellResourceAllocator, PdcchResourceAllocator) {
        let cfg = Arc::new(test_cell_config());
        let res_alloc = CellResourceAllocator::new(&cfg, SlotPoint::new(1, 0));
        let pdcch = PdcchResourceAllocator::new(cfg.clone());
        (cfg, res_alloc, pdcch)
    }

    #[test]
    fn test_alloc_until_cces_exhausted() {
        // CORESET#0 of the test cell has 8 CCEs, so two AL4 candidates fit.
        let (_cfg, mut res_alloc, mut pdcch) = setup();
        let slot_alloc = &mut res_alloc[0];
        assert_eq!(
            pdcch.alloc_dl_pdcch_common(slot_alloc, Rnti(100), 1, AggregationLevel::N4),
            Some(0)
        );
        assert_eq!(
            pdcch.alloc_dl_pdcch_common(slot_alloc, Rnti(101), 1, AggregationLevel::N4),
            Some(1)
        );
        assert!(pdcch
            .alloc_dl_pdcch_common(slot_alloc, Rnti(102), 1, AggregationLevel::N4)
            .is_none());
        assert_eq!(slot_alloc.result.dl.dl_pdcchs.len(), 2);
        assert_eq!(slot_alloc.result.dl.dl_pdcchs[1].ctx.cce_index, 4);
    }

    #[test]
    fn test_cces_shared_between_dl_and_ul() {
        let (_cfg, mut res_alloc, mut pdcch) = setup();
        let slot_alloc = &mut res_alloc[0];
        assert!(pdcch
            .alloc_dl_pdcch_common(slot_alloc, Rnti(100), 1, AggregationLevel::N4)
            .is_some());
        assert!(pdcch
            .alloc_ul_pdcch_common(slot_alloc, Rnti(100), 1, AggregationLevel::N4)
            .is_some());
        assert!(pdcch
            .alloc_ul_pdcch_common(slot_alloc, Rnti(101), 1, AggregationLevel::N4)
            .is_none());
    }

    #[test]
    fn test_not_monitored_search_space() {
        let mut cfg = test_cell_config();
        cfg.search_spaces[1].periodicity_slots = 2;
        cfg.search_spaces[1].offset_slots = 1;
        let cfg = Arc::new(cfg);
        let mut res_alloc = CellResourceAllocator::new(&cfg, SlotPoint::new(1, 0));
        let mut pdcch = PdcchResourceAllocator::new(cfg);

        // Slot 0 does not satisfy the offset; slot 1 does.
        assert!(pdcch
            .alloc_dl_pdcch_common(&mut res_alloc[0], Rnti(100), 1, AggregationLevel::N4)
            .is_none());
        assert!(pdcch
            .alloc_dl_pdcch_common(&mut res_alloc[1], Rnti(100), 1, AggregationLevel::N4)
            .is_some());
    }

    #[test]
    fn test_cces_freed_when_ring_wraps() {
        let (_cfg, mut res_alloc, mut pdcch) = setup();
        for _ in 0..2 {
            let slot_alloc = &mut res_alloc[0];
            assert!(pdcch
                .alloc_dl_pdcch_common(slot_alloc, Rnti(100), 1, AggregationLevel::N8)
                .is_some());
            assert!(pdcch
                .alloc_dl_pdcch_common(slot_alloc, Rnti(101), 1, AggregationLevel::N8)
                .is_none());
            // Rotate a full ring so the same record index maps to a new slot.
            for _ in 0..PdcchResourceAllocator::NOF_RECORDS {
                res_alloc.advance();
            }
        }
    }
}
