//! Broadcast Scheduling
//!
//! Periodic SSB and SIB1 allocation. Both commit into the same per-slot
//! resource grids as the RA and UE schedulers, so broadcast signals are
//! protected from being overwritten by later allocations in the tick.

use crate::cell::resource_grid::{find_empty_interval_of_length, GrantInfo};
use crate::cell::CellResourceAllocator;
use crate::config::CellConfiguration;
use crate::pdcch::PdcchResourceAllocator;
use crate::result::{AggregationLevel, Dci1_0, DciDl, PdschCodeword, PdschInfo, SsbInfo};
use crate::support::dmrs::{calculate_nof_dmrs_per_rb, make_dmrs_info_common, DmrsInformation};
use crate::support::mcs::{pdsch_mcs_get_config, McsConfig};
use crate::support::riv::ra_frequency_type1_get_riv;
use crate::support::tbs::{get_nof_prbs, PrbsTbs, TbsCalculatorConfig};
use crate::SchedulerError;
use common::interval::{crb_to_prb, CrbInterval};
use common::types::{OfdmSymbolRange, Rnti};
use std::sync::Arc;
use tracing::{debug, trace};

/// CRBs occupied by one SSB (20 RBs)
const SSB_NOF_CRBS: u16 = 20;

/// Symbols of the first SSB of the burst, pattern case A
const SSB_SYMBOLS: OfdmSymbolRange = OfdmSymbolRange { start: 2, stop: 6 };

/// Slot offset of SIB1 within its period, leaving room to decode the MIB
const SIB1_SLOT_OFFSET: u32 = 2;

/// MCS used for the SIB1 PDSCH
const SIB1_MCS_INDEX: u8 = 5;

/// SSB and SIB1 scheduler of one cell
pub struct BroadcastScheduler {
    cfg: Arc<CellConfiguration>,
    sib1_prbs_tbs: PrbsTbs,
    sib1_dmrs: DmrsInformation,
    sib1_mcs: McsConfig,
}

impl BroadcastScheduler {
    /// Create the scheduler, sizing the SIB1 PDSCH from the payload
    pub fn new(cfg: Arc<CellConfiguration>) -> Result<Self, SchedulerError> {
        let sib1_mcs = pdsch_mcs_get_config(SIB1_MCS_INDEX);
        let pdsch_td = cfg.pdsch_td_alloc_list[0];
        let sib1_dmrs = make_dmrs_info_common(pdsch_td.symbols);
        let sib1_prbs_tbs = get_nof_prbs(
            cfg.sib1_payload_size as u32,
            &TbsCalculatorConfig {
                nof_symb_sh: pdsch_td.symbols.length() as u32,
                nof_dmrs_prb: calculate_nof_dmrs_per_rb(&sib1_dmrs),
                nof_oh_prb: 0,
                target_code_rate: sib1_mcs.code_rate(),
                modulation: sib1_mcs.modulation,
                nof_layers: 1,
                tb_scaling_field: 0,
                nof_prb: 1,
            },
            cfg.dl_bwp.crbs.length(),
        )
        .ok_or_else(|| {
            SchedulerError::InvalidConfiguration("SIB1 payload does not fit in the DL BWP".into())
        })?;
        Ok(Self {
            cfg,
            sib1_prbs_tbs,
            sib1_dmrs,
            sib1_mcs,
        })
    }

    /// Schedule the broadcast signals due at the current tx slot
    pub fn run_slot(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        pdcch: &mut PdcchResourceAllocator,
    ) {
        let slot = res_alloc.slot_tx();
        if !self.cfg.is_dl_enabled(slot) {
            return;
        }

        let ssb_period_slots = self.cfg.ssb_period_ms * self.cfg.slots_per_ms();
        if slot.to_uint() % ssb_period_slots == 0 {
            self.schedule_ssb(res_alloc);
        }

        let sib1_period_slots = self.cfg.sib1_period_ms * self.cfg.slots_per_ms();
        if slot.to_uint() % sib1_period_slots == SIB1_SLOT_OFFSET {
            self.schedule_sib1(res_alloc, pdcch);
        }
    }

    fn schedule_ssb(&self, res_alloc: &mut CellResourceAllocator) {
        let slot_alloc = &mut res_alloc[0];
        if slot_alloc.result.dl.ssb.is_full() {
            return;
        }
        let bwp = self.cfg.dl_bwp.crbs;
        let crbs = CrbInterval::new(bwp.start, (bwp.start + SSB_NOF_CRBS).min(bwp.stop));
        let grant = GrantInfo {
            scs: self.cfg.dl_bwp.scs,
            symbols: SSB_SYMBOLS,
            crbs,
        };
        slot_alloc.dl_res_grid.fill(&grant);
        slot_alloc.result.dl.ssb.push(SsbInfo {
            ssb_index: 0,
            crbs,
            symbols: SSB_SYMBOLS,
        });
        trace!("Scheduled SSB at slot {}", slot_alloc.slot);
    }

    fn schedule_sib1(
        &self,
        res_alloc: &mut CellResourceAllocator,
        pdcch: &mut PdcchResourceAllocator,
    ) {
        let pdsch_td = self.cfg.pdsch_td_alloc_list[0];
        if res_alloc[pdsch_td.k0 as usize].result.dl.pdschs.is_full() {
            debug!("SIB1 postponed: PDSCH list full");
            return;
        }

        // Find CRBs for the SIB1 PDSCH before touching the PDCCH.
        let used = res_alloc[pdsch_td.k0 as usize]
            .dl_res_grid
            .used_crbs(self.cfg.dl_bwp.crbs, pdsch_td.symbols);
        let crbs = find_empty_interval_of_length(&used, self.sib1_prbs_tbs.nof_prbs, 0);
        if crbs.length() < self.sib1_prbs_tbs.nof_prbs {
            debug!("SIB1 postponed: not enough PRBs");
            return;
        }

        let pdcch_index = match pdcch.alloc_dl_pdcch_common(
            &mut res_alloc[0],
            Rnti::SI_RNTI,
            self.cfg.si_search_space_id,
            AggregationLevel::N4,
        ) {
            Some(index) => index,
            None => {
                debug!("SIB1 postponed: no PDCCH candidate");
                return;
            }
        };

        let prbs = crb_to_prb(self.cfg.dl_bwp.crbs.start, crbs);
        res_alloc[0].result.dl.dl_pdcchs[pdcch_index].dci = DciDl::SiF1_0(Dci1_0 {
            n_rb_dl_bwp: self.cfg.dl_bwp.crbs.length(),
            frequency_resource: ra_frequency_type1_get_riv(
                self.cfg.dl_bwp.crbs.length(),
                prbs.start,
                prbs.length(),
            ),
            time_resource: 0,
            vrb_to_prb_mapping: 0,
            modulation_coding_scheme: SIB1_MCS_INDEX,
            tb_scaling: 0,
        });

        let slot_alloc = &mut res_alloc[pdsch_td.k0 as usize];
        slot_alloc.dl_res_grid.fill(&GrantInfo {
            scs: self.cfg.dl_bwp.scs,
            symbols: pdsch_td.symbols,
            crbs,
        });
        slot_alloc.result.dl.pdschs.push(PdschInfo {
            rnti: Rnti::SI_RNTI,
            prbs,
            symbols: pdsch_td.symbols,
            codeword: PdschCodeword {
                mcs_index: SIB1_MCS_INDEX,
                rv_index: 0,
                modulation: self.sib1_mcs.modulation,
                target_code_rate: self.sib1_mcs.target_code_rate,
                tb_size_bytes: self.sib1_prbs_tbs.tbs_bytes,
            },
            dmrs: self.sib1_dmrs,
            n_id: self.cfg.pci.0,
        });
        trace!("Scheduled SIB1 at slot {}", slot_alloc.slot);
    }
}
