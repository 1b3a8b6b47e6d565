//! PUCCH Allocation
//!
//! Common PUCCH resources for HARQ-ACK before RRC setup, dedicated SR and
//! HARQ-ACK resources afterwards, and UCI removal when feedback moves onto
//! PUSCH. Soft failures return an empty grant; the UE falls back to DTX and
//! the gNB retransmits.

use crate::cell::resource_grid::GrantInfo;
use crate::cell::{CellResourceAllocator, SlotAllocation};
use crate::config::CellConfiguration;
use crate::result::{PdcchContext, PucchFormat, PucchInfo};
use crate::ue::UeCellConfiguration;
use common::interval::{prb_to_crb, CrbInterval, PrbInterval};
use common::types::{OfdmSymbolRange, Rnti};
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of cell-common PUCCH resources, per TS 38.213, Section 9.2.1
const NOF_COMMON_RESOURCES: u8 = 16;

/// Symbols used by the common format-1 resources
const COMMON_SYMBOLS: OfdmSymbolRange = OfdmSymbolRange { start: 4, stop: 14 };

/// Output of a PUCCH HARQ-ACK allocation
#[derive(Debug, Clone, Copy)]
pub struct PucchHarqAckGrant {
    /// PUCCH resource indicator to signal in the DCI; meaningful only when
    /// `pucch_pdu` is set
    pub pucch_res_indicator: u8,
    /// Index of the allocated PDU in the slot's PUCCH list, when successful
    pub pucch_pdu: Option<usize>,
}

impl PucchHarqAckGrant {
    fn failed() -> Self {
        Self {
            pucch_res_indicator: 0,
            pucch_pdu: None,
        }
    }
}

/// HARQ-ACK and CSI bit counts of removed PUCCH grants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PucchUciBits {
    /// HARQ-ACK bits that were to be reported
    pub harq_ack_nof_bits: u16,
    /// CSI part 1 bits that were to be reported
    pub csi_part1_bits: u16,
}

/// Per-cell PUCCH allocator
pub struct PucchAllocator {
    cfg: Arc<CellConfiguration>,
}

impl PucchAllocator {
    /// Create the allocator for a cell
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg }
    }

    /// PRB of a common PUCCH resource: the first eight sit at the lower BWP
    /// edge, the rest mirror at the upper edge.
    fn common_resource_prb(&self, r_pucch: u8) -> u16 {
        let bwp_len = self.cfg.ul_bwp.crbs.length();
        if r_pucch < 8 {
            r_pucch as u16
        } else {
            bwp_len - 1 - (r_pucch as u16 - 8)
        }
    }

    /// Allocate the common PUCCH resource carrying the HARQ-ACK of a Msg4
    /// PDSCH, before any dedicated configuration exists.
    ///
    /// The candidate set starts at the resource implied by the DCI's first
    /// CCE; the returned resource indicator is what the DCI must signal.
    pub fn alloc_common_pucch_harq_ack_ue(
        &self,
        res_alloc: &mut CellResourceAllocator,
        tc_rnti: Rnti,
        pdsch_time_domain_resource: u8,
        k1: u8,
        dci_ctx: &PdcchContext,
    ) -> PucchHarqAckGrant {
        let k0 = self.cfg.pdsch_td_alloc_list[pdsch_time_domain_resource as usize].k0;
        let uci_slot_offset = (k0 + k1) as usize;
        let slot_alloc = &mut res_alloc[uci_slot_offset];
        if !self.cfg.is_ul_enabled(slot_alloc.slot) {
            debug!(
                "PUCCH allocation failed for rnti={}: slot {} is not UL enabled",
                tc_rnti, slot_alloc.slot
            );
            return PucchHarqAckGrant::failed();
        }

        let nof_cces = self.cfg.coreset0.nof_cces();
        let r_base = (2 * dci_ctx.cce_index / nof_cces) as u8;

        for delta_pri in 0..8u8 {
            let r_pucch = (r_base + 2 * delta_pri) % NOF_COMMON_RESOURCES;
            let prb = self.common_resource_prb(r_pucch);
            if let Some(index) = self.alloc_resource(
                slot_alloc,
                tc_rnti,
                prb,
                COMMON_SYMBOLS,
                PucchFormat::F1,
                1,
                0,
            ) {
                return PucchHarqAckGrant {
                    pucch_res_indicator: delta_pri,
                    pucch_pdu: Some(index),
                };
            }
        }
        debug!(
            "PUCCH allocation failed for rnti={}: no common resource available",
            tc_rnti
        );
        PucchHarqAckGrant::failed()
    }

    /// Allocate the periodic SR opportunity of a UE on its dedicated resource
    pub fn pucch_allocate_sr_opportunity(
        &self,
        slot_alloc: &mut SlotAllocation,
        crnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    ) {
        let res = ue_cfg.sr_resource;
        if self
            .alloc_resource(slot_alloc, crnti, res.prb, res.symbols, res.format, 0, 1)
            .is_none()
        {
            warn!(
                "SR opportunity for rnti={} at slot {} skipped: resource unavailable",
                crnti, slot_alloc.slot
            );
        }
    }

    /// Allocate a dedicated HARQ-ACK PUCCH for a UE.
    ///
    /// The caller guarantees no PUSCH is granted to this UE in the same slot;
    /// UCI would be multiplexed there instead.
    pub fn alloc_ded_pucch_harq_ack_ue(
        &self,
        res_alloc: &mut CellResourceAllocator,
        crnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        pdsch_time_domain_resource: u8,
        k1: u8,
    ) -> PucchHarqAckGrant {
        let k0 = self.cfg.pdsch_td_alloc_list[pdsch_time_domain_resource as usize].k0;
        let uci_slot_offset = (k0 + k1) as usize;
        let slot_alloc = &mut res_alloc[uci_slot_offset];

        // A UE reports all HARQ-ACK bits of a slot on one resource.
        if let Some(index) = slot_alloc
            .result
            .ul
            .pucchs
            .iter()
            .position(|pucch| pucch.rnti == crnti && pucch.harq_ack_nof_bits > 0)
        {
            let prb = slot_alloc.result.ul.pucchs[index].prbs.start;
            let indicator = ue_cfg
                .harq_resources
                .iter()
                .position(|res| res.prb == prb)
                .unwrap_or(0) as u8;
            slot_alloc.result.ul.pucchs[index].harq_ack_nof_bits += 1;
            return PucchHarqAckGrant {
                pucch_res_indicator: indicator,
                pucch_pdu: Some(index),
            };
        }

        for (indicator, res) in ue_cfg.harq_resources.iter().enumerate() {
            if let Some(index) = self.alloc_resource(
                slot_alloc,
                crnti,
                res.prb,
                res.symbols,
                res.format,
                1,
                0,
            ) {
                return PucchHarqAckGrant {
                    pucch_res_indicator: indicator as u8,
                    pucch_pdu: Some(index),
                };
            }
        }
        debug!(
            "PUCCH allocation failed for rnti={}: no dedicated resource available",
            crnti
        );
        PucchHarqAckGrant::failed()
    }

    /// Remove the UCI allocations of a UE from a slot, returning the bits
    /// that must be multiplexed onto its PUSCH instead.
    pub fn remove_ue_uci_from_pucch(
        &self,
        slot_alloc: &mut SlotAllocation,
        crnti: Rnti,
    ) -> PucchUciBits {
        let mut bits = PucchUciBits::default();
        for pucch in slot_alloc.result.ul.pucchs.iter() {
            if pucch.rnti == crnti {
                bits.harq_ack_nof_bits += pucch.harq_ack_nof_bits;
                bits.csi_part1_bits += pucch.csi_part1_nof_bits;
            }
        }
        slot_alloc.result.ul.pucchs.retain(|pucch| pucch.rnti != crnti);
        bits
    }

    fn alloc_resource(
        &self,
        slot_alloc: &mut SlotAllocation,
        rnti: Rnti,
        prb: u16,
        symbols: OfdmSymbolRange,
        format: PucchFormat,
        harq_ack_nof_bits: u16,
        sr_nof_bits: u16,
    ) -> Option<usize> {
        if slot_alloc.result.ul.pucchs.is_full() {
            return None;
        }
        let crbs: CrbInterval = prb_to_crb(
            self.cfg.ul_bwp.crbs.start,
            PrbInterval::new(prb, prb + 1),
        );
        let grant = GrantInfo {
            scs: self.cfg.ul_bwp.scs,
            symbols,
            crbs,
        };
        if slot_alloc.ul_res_grid.collides(&grant) {
            return None;
        }
        slot_alloc.ul_res_grid.fill(&grant);
        slot_alloc.result.ul.pucchs.push(PucchInfo {
            rnti,
            format,
            prbs: PrbInterval::new(prb, prb + 1),
            symbols,
            harq_ack_nof_bits,
            sr_nof_bits,
            csi_part1_nof_bits: 0,
        });
        Some(slot_alloc.result.ul.pucchs.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_cell_config;
    use crate::result::AggregationLevel;
    use crate::ue::default_ue_cell_config;
    use common::slot_point::SlotPoint;

    fn setup() -> (Arc<CellConfiguration>, CellResourceAllocator, PucchAllocator) {
        let cfg = Arc::new(test_cell_config());
        let res_alloc = CellResourceAllocator::new(&cfg, SlotPoint::new(1, 0));
        let pucch = PucchAllocator::new(cfg.clone());
        (cfg, res_alloc, pucch)
    }

    fn dci_ctx(cce_index: u16) -> PdcchContext {
        PdcchContext {
            rnti: Rnti(0x4601),
            search_space_id: 1,
            coreset_id: 0,
            aggregation_level: AggregationLevel::N4,
            cce_index,
        }
    }

    #[test]
    fn test_common_harq_ack_allocation() {
        let (_cfg, mut res_alloc, pucch) = setup();
        let grant =
            pucch.alloc_common_pucch_harq_ack_ue(&mut res_alloc, Rnti(0x4601), 0, 4, &dci_ctx(0));
        assert!(grant.pucch_pdu.is_some());

        let slot_alloc = &res_alloc[4];
        let pdu = &slot_alloc.result.ul.pucchs[grant.pucch_pdu.unwrap()];
        assert_eq!(pdu.rnti, Rnti(0x4601));
        assert_eq!(pdu.harq_ack_nof_bits, 1);
        assert_eq!(pdu.format, PucchFormat::F1);
    }

    #[test]
    fn test_common_resources_do_not_collide() {
        let (_cfg, mut res_alloc, pucch) = setup();
        let first =
            pucch.alloc_common_pucch_harq_ack_ue(&mut res_alloc, Rnti(0x4601), 0, 4, &dci_ctx(0));
        let second =
            pucch.alloc_common_pucch_harq_ack_ue(&mut res_alloc, Rnti(0x4602), 0, 4, &dci_ctx(0));
        assert!(first.pucch_pdu.is_some());
        assert!(second.pucch_pdu.is_some());
        let pucchs = &res_alloc[4].result.ul.pucchs;
        assert_ne!(pucchs[0].prbs, pucchs[1].prbs);
        // The second UE was pushed to a later resource indicator.
        assert!(second.pucch_res_indicator > first.pucch_res_indicator);
    }

    #[test]
    fn test_sr_opportunity() {
        let (_cfg, mut res_alloc, pucch) = setup();
        let ue_cfg = default_ue_cell_config();
        pucch.pucch_allocate_sr_opportunity(&mut res_alloc[0], Rnti(0x4601), &ue_cfg);
        let pucchs = &res_alloc[0].result.ul.pucchs;
        assert_eq!(pucchs.len(), 1);
        assert_eq!(pucchs[0].sr_nof_bits, 1);
        assert_eq!(pucchs[0].harq_ack_nof_bits, 0);
    }

    #[test]
    fn test_ded_harq_ack_accumulates_bits() {
        let (_cfg, mut res_alloc, pucch) = setup();
        let ue_cfg = default_ue_cell_config();
        let first =
            pucch.alloc_ded_pucch_harq_ack_ue(&mut res_alloc, Rnti(0x4601), &ue_cfg, 0, 4);
        let second =
            pucch.alloc_ded_pucch_harq_ack_ue(&mut res_alloc, Rnti(0x4601), &ue_cfg, 0, 4);
        assert_eq!(first.pucch_pdu, second.pucch_pdu);
        let pdu = &res_alloc[4].result.ul.pucchs[first.pucch_pdu.unwrap()];
        assert_eq!(pdu.harq_ack_nof_bits, 2);
    }

    #[test]
    fn test_remove_ue_uci_returns_bits() {
        let (_cfg, mut res_alloc, pucch) = setup();
        let ue_cfg = default_ue_cell_config();
        pucch.alloc_ded_pucch_harq_ack_ue(&mut res_alloc, Rnti(0x4601), &ue_cfg, 0, 4);
        pucch.alloc_ded_pucch_harq_ack_ue(&mut res_alloc, Rnti(0x4601), &ue_cfg, 0, 4);

        let bits = pucch.remove_ue_uci_from_pucch(&mut res_alloc[4], Rnti(0x4601));
        assert_eq!(bits.harq_ack_nof_bits, 2);
        assert!(res_alloc[4].result.ul.pucchs.is_empty());

        // Removing again returns zero bits.
        let bits = pucch.remove_ue_uci_from_pucch(&mut res_alloc[4], Rnti(0x4601));
        assert_eq!(bits, PucchUciBits::default());
    }
}
