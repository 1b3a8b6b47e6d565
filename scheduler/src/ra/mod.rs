//! Random-Access Scheduler
//!
//! Turns RACH indications into RAR PDCCH+PDSCH grants and Msg3 PUSCH grants
//! within the response window, and keeps the Msg3 HARQ processes alive
//! through CRC feedback and retransmissions. All external indications are
//! queued and drained at the start of the slot tick, preserving the
//! single-writer model of the cell.

use crate::cell::resource_grid::{find_empty_interval_of_length, GrantInfo};
use crate::cell::CellResourceAllocator;
use crate::config::{CellConfiguration, PuschTimeDomainResource};
use crate::harq::{nof_codeblocks_from_tbs, TxBufferIdentifier, TxBufferPool};
use crate::pdcch::PdcchResourceAllocator;
use crate::result::{
    AggregationLevel, Dci0_0TcRnti, Dci1_0, DciDl, DciUl, PdschCodeword, PdschInfo,
    RarInformation, RarUlGrant, UlSchedInfo, MAX_GRANTS_PER_RAR,
};
use crate::support::dmrs::{calculate_nof_dmrs_per_rb, make_dmrs_info_common, DmrsInformation};
use crate::support::event_queue::{EventQueue, EventSender};
use crate::support::mcs::{pdsch_mcs_get_config, pusch_mcs_get_config, McsConfig};
use crate::support::riv::ra_frequency_type1_get_riv;
use crate::support::tbs::{get_nof_prbs, tbs_calculator_calculate, PrbsTbs, TbsCalculatorConfig};
use crate::SchedulerError;
use common::interval::{crb_to_prb, prb_to_crb, CrbInterval};
use common::slot_point::{SlotPoint, SlotWindow};
use common::types::{Rnti, SubcarrierSpacing};
use std::sync::Arc;
use tracing::{debug, info, warn};

mod msg3_harq;
pub use msg3_harq::UlHarqProcess;

/// Size of the pending Msg3 array; TC-RNTIs map to entries modulo this value
pub const MAX_NOF_MSG3: usize = 64;

/// Marker for CRC indications whose UE context does not exist yet
pub const INVALID_UE_INDEX: u32 = u32::MAX;

/// Maximum number of preambles detectable in one PRACH occasion
const MAX_PREAMBLES_PER_OCCASION: usize = 64;

/// Maximum number of Msg3 retransmissions before the HARQ is dropped
const MAX_MSG3_RETXS: u8 = 4;

/// RAR payload and subheader sizes per TS 38.321, 6.1.5 and 6.2.3
const RAR_PAYLOAD_SIZE_BYTES: u32 = 7;
const RAR_SUBHEADER_SIZE_BYTES: u32 = 1;

/// MCS used for both the RAR PDSCH and the Msg3 PUSCH grants
const RAR_MCS_INDEX: u8 = 0;
const MSG3_MCS_INDEX: u8 = 0;

/// Redundancy-version sequence across retransmissions
const RV_SEQUENCE: [u8; 4] = [0, 2, 3, 1];

/// Slots between the tx reference slot and the rx slot being decoded
const GNB_RX_DELAY_SLOTS: u32 = 4;

/// One detected preamble within a PRACH occasion
#[derive(Debug, Clone, Copy, Default)]
pub struct RachPreamble {
    /// Preamble index (RAPID)
    pub preamble_id: u8,
    /// TC-RNTI assigned by the MAC
    pub tc_rnti: Rnti,
    /// Timing advance command derived from the preamble
    pub time_advance: u16,
}

/// One PRACH occasion within a RACH indication
#[derive(Debug, Clone)]
pub struct RachOccasion {
    /// First OFDM symbol of the occasion
    pub start_symbol: u8,
    /// PRACH frequency occasion index
    pub frequency_index: u8,
    /// Detected preambles
    pub preambles: Vec<RachPreamble>,
}

/// RACH indication pushed from the PHY
#[derive(Debug, Clone)]
pub struct RachIndication {
    /// Slot where the PRACH was received
    pub slot_rx: SlotPoint,
    /// Detected occasions
    pub occasions: Vec<RachOccasion>,
}

/// One decoded UL transport block
#[derive(Debug, Clone, Copy)]
pub struct UlCrcPdu {
    /// UE index, or `INVALID_UE_INDEX` for Msg3 HARQs
    pub ue_index: u32,
    /// RNTI of the transmission
    pub rnti: Rnti,
    /// HARQ process identifier
    pub harq_id: u8,
    /// CRC outcome
    pub tb_crc_success: bool,
}

/// CRC indication pushed from the PHY
#[derive(Debug, Clone)]
pub struct UlCrcIndication {
    /// Slot where the PUSCH was received
    pub slot_rx: SlotPoint,
    /// Decoded transport blocks
    pub crcs: Vec<UlCrcPdu>,
}

/// Derive the RA-RNTI of a PRACH occasion.
///
/// See TS 38.321, 5.1.3:
/// RA-RNTI = 1 + s_id + 14 * t_id + 14 * 80 * f_id + 14 * 80 * 8 * ul_carrier_id.
pub fn get_ra_rnti(slot_rx: SlotPoint, symbol_index: u8, frequency_index: u8, is_sul: bool) -> u16 {
    debug_assert!(symbol_index < 14 && frequency_index < 8);
    1 + symbol_index as u16
        + 14 * (slot_rx.slot_index() % 80) as u16
        + 14 * 80 * frequency_index as u16
        + 14 * 80 * 8 * is_sul as u16
}

/// Slot delay between the PDCCH slot and the Msg3 PUSCH.
///
/// TS 38.214, Table 6.1.2.1.1-5: delay = k2 + Delta, with Delta defined for
/// PUSCH SCS up to 120 kHz only.
pub fn get_msg3_delay(pusch_td: &PuschTimeDomainResource, pusch_scs: SubcarrierSpacing) -> u32 {
    const DELTAS: [u32; 4] = [2, 3, 4, 6];
    let mu = pusch_scs.to_numerology() as usize;
    assert!(mu < DELTAS.len(), "PUSCH subcarrier spacing not supported for Msg3 delay");
    pusch_td.k2 as u32 + DELTAS[mu]
}

/// RAR awaiting transmission within its response window
#[derive(Debug, Clone)]
struct PendingRar {
    ra_rnti: Rnti,
    prach_slot_rx: SlotPoint,
    rar_window: SlotWindow,
    tc_rntis: Vec<Rnti>,
}

/// Msg3 allocation context, keyed by TC-RNTI modulo `MAX_NOF_MSG3`
#[derive(Debug)]
struct PendingMsg3 {
    preamble: RachPreamble,
    harq: UlHarqProcess,
}

/// Cached PRB/TBS and DM-RS derivation per time-domain resource
#[derive(Debug, Clone, Copy)]
struct CachedGrantData {
    dmrs_info: DmrsInformation,
    prbs_tbs: PrbsTbs,
}

/// Candidate Msg3 allocation produced while sizing a RAR
#[derive(Debug, Clone, Copy)]
struct Msg3AllocCandidate {
    crbs: CrbInterval,
    pusch_td_res_index: usize,
}

/// Per-cell Random-Access scheduler
pub struct RaScheduler {
    cfg: Arc<CellConfiguration>,
    ra_win_nof_slots: u32,
    /// CRBs used for RAR PDSCH allocation; CORESET#0 bounds the initial DL BWP
    initial_dl_bwp_crbs: CrbInterval,
    pending_rachs: EventQueue<RachIndication>,
    pending_crcs: EventQueue<UlCrcIndication>,
    pending_rars: Vec<PendingRar>,
    pending_msg3s: Vec<PendingMsg3>,
    rar_data: Vec<CachedGrantData>,
    msg3_data: Vec<CachedGrantData>,
    rar_mcs_config: McsConfig,
    msg3_mcs_config: McsConfig,
}

impl RaScheduler {
    /// Build the scheduler and pre-compute the per-TD-resource grant sizes
    pub fn new(cfg: Arc<CellConfiguration>) -> Result<Self, SchedulerError> {
        let rar_mcs_config = pdsch_mcs_get_config(RAR_MCS_INDEX);
        let msg3_mcs_config = pusch_mcs_get_config(MSG3_MCS_INDEX, cfg.rach.msg3_transform_precoder);

        // N^{DL,BWP}_RB for RA-RNTI DCIs is the CORESET#0 size when CORESET#0
        // is configured for the cell.
        let initial_dl_bwp_crbs = cfg.coreset0.crbs;

        // Cache PDSCH DM-RS information and RAR required TBS and PRB count.
        let mut rar_data = Vec::with_capacity(cfg.pdsch_td_alloc_list.len());
        for td in cfg.pdsch_td_alloc_list.iter() {
            let dmrs_info = make_dmrs_info_common(td.symbols);
            let prbs_tbs = get_nof_prbs(
                RAR_PAYLOAD_SIZE_BYTES + RAR_SUBHEADER_SIZE_BYTES,
                &TbsCalculatorConfig {
                    nof_symb_sh: td.symbols.length() as u32,
                    nof_dmrs_prb: calculate_nof_dmrs_per_rb(&dmrs_info),
                    nof_oh_prb: 0,
                    target_code_rate: rar_mcs_config.code_rate(),
                    modulation: rar_mcs_config.modulation,
                    nof_layers: 1,
                    tb_scaling_field: 0,
                    nof_prb: 1,
                },
                initial_dl_bwp_crbs.length(),
            )
            .ok_or_else(|| {
                SchedulerError::InvalidConfiguration(
                    "RAR PDU does not fit in the initial DL BWP".into(),
                )
            })?;
            rar_data.push(CachedGrantData {
                dmrs_info,
                prbs_tbs,
            });
        }

        // Cache PUSCH DM-RS information and the Msg3 grant size.
        let mut msg3_data = Vec::with_capacity(cfg.pusch_td_alloc_list.len());
        for td in cfg.pusch_td_alloc_list.iter() {
            msg3_data.push(CachedGrantData {
                dmrs_info: make_dmrs_info_common(td.symbols),
                prbs_tbs: PrbsTbs {
                    nof_prbs: 3,
                    tbs_bytes: 11,
                },
            });
        }

        Ok(Self {
            ra_win_nof_slots: cfg.rach.ra_resp_window_slots,
            initial_dl_bwp_crbs,
            pending_rachs: EventQueue::new(16, "RACH"),
            pending_crcs: EventQueue::new(16, "CRC"),
            pending_rars: Vec::new(),
            pending_msg3s: (0..MAX_NOF_MSG3)
                .map(|pid| PendingMsg3 {
                    preamble: RachPreamble::default(),
                    harq: UlHarqProcess::new(pid as u8),
                })
                .collect(),
            rar_data,
            msg3_data,
            rar_mcs_config,
            msg3_mcs_config,
            cfg,
        })
    }

    /// Queue a RACH indication; processed at the next scheduler tick
    pub fn handle_rach_indication(&self, msg: RachIndication) {
        self.pending_rachs.push(msg);
    }

    /// Producer handle for RACH indications from other threads
    pub fn rach_sender(&self) -> EventSender<RachIndication> {
        self.pending_rachs.sender()
    }

    /// Queue a CRC indication; processed at the next scheduler tick
    pub fn handle_crc_indication(&self, crc_ind: UlCrcIndication) {
        self.pending_crcs.push(crc_ind);
    }

    /// Producer handle for CRC indications from other threads
    pub fn crc_sender(&self) -> EventSender<UlCrcIndication> {
        self.pending_crcs.sender()
    }

    /// Run the RA scheduling for the current tx slot
    pub fn run_slot(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        pdcch: &mut PdcchResourceAllocator,
        pool: &mut TxBufferPool,
    ) {
        let pdcch_slot = res_alloc.slot_tx();
        let pdsch_td = self.cfg.pdsch_td_alloc_list[0];
        let pdsch_slot = pdcch_slot + pdsch_td.k0 as u32;

        // Handle pending CRCs and any Msg3 retransmissions they trigger.
        self.handle_pending_crc_indications(res_alloc, pdcch, pool);

        // Pop pending RACHs and process them.
        self.pending_rachs.slot_indication();
        for rach in self.pending_rachs.take_events() {
            self.handle_rach_indication_impl(&rach);
        }

        // RAR scheduling needs PDCCH and PDSCH slots with DL enabled.
        if !self.cfg.is_dl_enabled(pdcch_slot) || !self.cfg.is_dl_enabled(pdsch_slot) {
            return;
        }

        // RA SearchSpace monitoring must be active at this slot.
        let ra_ss = self
            .cfg
            .search_space(self.cfg.ra_search_space_id)
            .expect("validated at init");
        if !ra_ss.is_monitored(pdcch_slot) {
            return;
        }

        // At least one PUSCH time-domain resource must land on an UL slot.
        let pusch_slots_available = self.cfg.pusch_td_alloc_list.iter().any(|td| {
            let msg3_delay = get_msg3_delay(td, self.cfg.ul_bwp.scs);
            self.cfg.is_ul_enabled(pdcch_slot + msg3_delay)
        });
        if !pusch_slots_available {
            return;
        }

        let mut i = 0;
        while i < self.pending_rars.len() {
            let rar = self.pending_rars[i].clone();

            // Outside the window: discard once passed, stop once not yet open
            // (pending RARs are kept in arrival order).
            if !rar.rar_window.contains(pdcch_slot) {
                if pdcch_slot >= rar.rar_window.stop {
                    warn!(
                        "SCHED: Could not transmit RAR within the window={}, prach_slot={}, slot_tx={}",
                        rar.rar_window, rar.prach_slot_rx, pdcch_slot
                    );
                    self.pending_rars.remove(i);
                    continue;
                }
                break;
            }

            let nof_allocs = self.schedule_rar(&rar, res_alloc, pdcch, pool);
            debug_assert!(nof_allocs <= rar.tc_rntis.len());

            if nof_allocs > 0 {
                if nof_allocs == rar.tc_rntis.len() {
                    self.pending_rars.remove(i);
                } else {
                    // Keep only the Msg3 grants that were not allocated and
                    // stop; the grid is exhausted for this slot.
                    self.pending_rars[i].tc_rntis.drain(..nof_allocs);
                    break;
                }
            } else {
                i += 1;
            }
        }

        self.log_rars(res_alloc, pdsch_td.k0 as usize);
    }

    fn handle_rach_indication_impl(&mut self, msg: &RachIndication) {
        let prach_duration = self.cfg.rach.prach_duration_slots;

        for occasion in msg.occasions.iter() {
            let ra_rnti = Rnti(get_ra_rnti(
                msg.slot_rx,
                occasion.start_symbol,
                occasion.frequency_index,
                false,
            ));

            let rar_index = match self
                .pending_rars
                .iter()
                .position(|rar| rar.ra_rnti == ra_rnti && rar.prach_slot_rx == msg.slot_rx)
            {
                Some(index) => index,
                None => {
                    // The window opens at the first DL-enabled slot after the
                    // PRACH; for TDD that means scanning up to one period.
                    let mut start = msg.slot_rx + prach_duration;
                    for offset in 0..self.cfg.nof_slots_per_tdd_period() {
                        let candidate = msg.slot_rx + prach_duration + offset;
                        if self.cfg.is_dl_enabled(candidate) {
                            start = candidate;
                            break;
                        }
                    }
                    self.pending_rars.push(PendingRar {
                        ra_rnti,
                        prach_slot_rx: msg.slot_rx,
                        rar_window: SlotWindow::new(start, start + self.ra_win_nof_slots),
                        tc_rntis: Vec::new(),
                    });
                    self.pending_rars.len() - 1
                }
            };

            for preamble in occasion.preambles.iter() {
                info!(
                    "SCHED: New PRACH slot={}, preamble={}, ra-rnti={}, temp_crnti={}, ta_cmd={}",
                    msg.slot_rx, preamble.preamble_id, ra_rnti, preamble.tc_rnti, preamble.time_advance
                );

                // Check whether the TC-RNTI value to be scheduled is already under use.
                let msg3_index = preamble.tc_rnti.0 as usize % MAX_NOF_MSG3;
                if !self.pending_msg3s[msg3_index].harq.is_empty() {
                    warn!(
                        "PRACH ignored, as the allocated TC-RNTI={} is already under use",
                        preamble.tc_rnti
                    );
                    continue;
                }

                let rar = &mut self.pending_rars[rar_index];
                if rar.tc_rntis.len() >= MAX_PREAMBLES_PER_OCCASION {
                    warn!(
                        "PRACH ignored, preamble list for ra-rnti={} is full",
                        ra_rnti
                    );
                    continue;
                }
                rar.tc_rntis.push(preamble.tc_rnti);
                self.pending_msg3s[msg3_index].preamble = *preamble;
            }
        }
    }

    fn handle_pending_crc_indications(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        pdcch: &mut PdcchResourceAllocator,
        pool: &mut TxBufferPool,
    ) {
        self.pending_crcs.slot_indication();
        for crc_ind in self.pending_crcs.take_events() {
            for crc in crc_ind.crcs.iter() {
                if crc.ue_index != INVALID_UE_INDEX {
                    debug_assert!(false, "Msg3 HARQ CRCs cannot have a ueId assigned yet");
                    continue;
                }
                let pending_msg3 = &mut self.pending_msg3s[crc.rnti.0 as usize % MAX_NOF_MSG3];
                if pending_msg3.preamble.tc_rnti != crc.rnti {
                    warn!(
                        "Invalid UL CRC, cell={}, rnti={}, h_id={}. Cause: Inexistent rnti.",
                        self.cfg.cell_id.0, crc.rnti, crc.harq_id
                    );
                    continue;
                }
                if pending_msg3.harq.pid() != crc.harq_id {
                    warn!(
                        "Invalid UL CRC, cell={}, rnti={}, h_id={}. Cause: HARQ-Ids do not match ({} != {})",
                        self.cfg.cell_id.0,
                        crc.rnti,
                        crc.harq_id,
                        crc.harq_id,
                        pending_msg3.harq.pid()
                    );
                    continue;
                }
                pending_msg3.harq.ack_info(crc.tb_crc_success);
            }
        }

        // Allocate pending Msg3 retransmissions.
        let slot_rx = res_alloc.slot_tx() - GNB_RX_DELAY_SLOTS;
        for index in 0..self.pending_msg3s.len() {
            if self.pending_msg3s[index].harq.is_empty() {
                continue;
            }
            self.pending_msg3s[index].harq.slot_indication(slot_rx);
            if self.pending_msg3s[index].harq.has_pending_retx() {
                self.schedule_msg3_retx(res_alloc, pdcch, pool, index);
            }
        }
    }

    /// Try to allocate the RAR grant and as many of its Msg3 grants as fit.
    /// Returns the number of Msg3 grants allocated; zero leaves no state behind.
    fn schedule_rar(
        &mut self,
        rar: &PendingRar,
        res_alloc: &mut CellResourceAllocator,
        pdcch: &mut PdcchResourceAllocator,
        pool: &mut TxBufferPool,
    ) -> usize {
        let pdsch_time_res_index = 0usize;
        let pdsch_td = self.cfg.pdsch_td_alloc_list[pdsch_time_res_index];
        let nof_prbs_per_rar = self.rar_data[pdsch_time_res_index].prbs_tbs.nof_prbs;

        // 1. Check space in the DL scheduling result for the RAR.
        if res_alloc[pdsch_td.k0 as usize].result.dl.rar_grants.is_full()
            || res_alloc[0].result.dl.dl_pdcchs.is_full()
        {
            self.log_postponed_rar(rar, "No PDCCH/PDSCH space for RAR.");
            return 0;
        }

        // Start with the highest number of Msg3 grants to allocate, and keep
        // decrementing based on available space.
        let mut max_nof_allocs = rar.tc_rntis.len().min(MAX_GRANTS_PER_RAR);

        // 2. Find available RBs in the PDSCH grid for the RAR grant.
        let mut rar_crbs;
        {
            let nof_rar_rbs = nof_prbs_per_rar * max_nof_allocs as u16;
            let pdsch_alloc = &res_alloc[pdsch_td.k0 as usize];
            let used_crbs = pdsch_alloc
                .dl_res_grid
                .used_crbs(self.initial_dl_bwp_crbs, pdsch_td.symbols);
            rar_crbs = find_empty_interval_of_length(&used_crbs, nof_rar_rbs, 0);
            max_nof_allocs = (rar_crbs.length() / nof_prbs_per_rar) as usize;
            if max_nof_allocs == 0 {
                self.log_postponed_rar(rar, "Not enough PRBs for RAR.");
                return 0;
            }
        }

        // 3. Collect Msg3 candidates across the PUSCH time-domain resources.
        let mut msg3_candidates: Vec<Msg3AllocCandidate> = Vec::with_capacity(max_nof_allocs);
        for (pusch_idx, pusch_td) in self.cfg.pusch_td_alloc_list.iter().enumerate() {
            let mut pusch_res_max_allocs = max_nof_allocs - msg3_candidates.len();
            if pusch_res_max_allocs == 0 {
                break;
            }

            // The Msg3 delay of this resource must land on an UL slot.
            let msg3_delay = get_msg3_delay(pusch_td, self.cfg.ul_bwp.scs) as usize;
            let msg3_alloc = &res_alloc[msg3_delay];
            if !self.cfg.is_ul_enabled(msg3_alloc.slot) {
                continue;
            }

            // 4. Check space in the UL scheduling result for the remaining Msg3s.
            pusch_res_max_allocs =
                pusch_res_max_allocs.min(msg3_alloc.result.ul.puschs.capacity_left());
            if pusch_res_max_allocs == 0 {
                continue;
            }

            // 5. Check CRBs available in the PUSCH grid.
            let nof_prbs_per_msg3 = self.msg3_data[pusch_idx].prbs_tbs.nof_prbs;
            let nof_msg3_prbs = nof_prbs_per_msg3 * pusch_res_max_allocs as u16;
            let used_ul_crbs = msg3_alloc
                .ul_res_grid
                .used_crbs(self.cfg.ul_bwp.crbs, pusch_td.symbols);
            let msg3_crbs = find_empty_interval_of_length(&used_ul_crbs, nof_msg3_prbs, 0);
            pusch_res_max_allocs = (msg3_crbs.length() / nof_prbs_per_msg3) as usize;
            if pusch_res_max_allocs == 0 {
                continue;
            }

            // 6. Register the Msg3 allocations for this PUSCH resource.
            let mut last_crb = msg3_crbs.start;
            for _ in 0..pusch_res_max_allocs {
                msg3_candidates.push(Msg3AllocCandidate {
                    crbs: CrbInterval::new(last_crb, last_crb + nof_prbs_per_msg3),
                    pusch_td_res_index: pusch_idx,
                });
                last_crb += nof_prbs_per_msg3;
            }
        }
        max_nof_allocs = msg3_candidates.len();
        if max_nof_allocs == 0 {
            self.log_postponed_rar(rar, "No PUSCH space for Msg3.");
            return 0;
        }
        rar_crbs.resize(nof_prbs_per_rar * max_nof_allocs as u16);

        // 7. Find space in the PDCCH for the RAR; no rollback is needed on
        // failure because no grid has been filled yet.
        let pdcch_index = match pdcch.alloc_dl_pdcch_common(
            &mut res_alloc[0],
            rar.ra_rnti,
            self.cfg.ra_search_space_id,
            AggregationLevel::N4,
        ) {
            Some(index) => index,
            None => return 0,
        };

        // 8. Commit: fill the RAR and Msg3 PDSCH, PUSCH and DCIs.
        self.fill_rar_grant(res_alloc, rar, rar_crbs, &msg3_candidates, pdcch_index, pool);

        msg3_candidates.len()
    }

    fn fill_rar_grant(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        rar_request: &PendingRar,
        rar_crbs: CrbInterval,
        msg3_candidates: &[Msg3AllocCandidate],
        pdcch_index: usize,
        pool: &mut TxBufferPool,
    ) {
        let pdsch_time_res_index = 0usize;
        let pdsch_td = self.cfg.pdsch_td_alloc_list[pdsch_time_res_index];
        let rar_prbs = crb_to_prb(self.initial_dl_bwp_crbs.start, rar_crbs);

        // Fill the RAR DCI.
        let dci = Dci1_0 {
            n_rb_dl_bwp: self.initial_dl_bwp_crbs.length(),
            frequency_resource: ra_frequency_type1_get_riv(
                self.initial_dl_bwp_crbs.length(),
                rar_prbs.start,
                rar_prbs.length(),
            ),
            time_resource: pdsch_time_res_index as u8,
            vrb_to_prb_mapping: 0,
            modulation_coding_scheme: RAR_MCS_INDEX,
            tb_scaling: 0,
        };
        res_alloc[0].result.dl.dl_pdcchs[pdcch_index].dci = DciDl::RaF1_0(dci);

        // Allocate RBs and result space for the RAR.
        let rar_alloc = &mut res_alloc[pdsch_td.k0 as usize];
        rar_alloc.dl_res_grid.fill(&GrantInfo {
            scs: self.cfg.dl_bwp.scs,
            symbols: pdsch_td.symbols,
            crbs: rar_crbs,
        });

        let mut grants = Vec::with_capacity(msg3_candidates.len());
        for candidate in msg3_candidates.iter() {
            let pusch_td = self.cfg.pusch_td_alloc_list[candidate.pusch_td_res_index];
            let msg3_delay = get_msg3_delay(&pusch_td, self.cfg.ul_bwp.scs) as usize;
            let prbs = crb_to_prb(self.cfg.ul_bwp.crbs.start, candidate.crbs);

            let msg3_index = {
                let tc_rnti = rar_request.tc_rntis[grants.len()];
                tc_rnti.0 as usize % MAX_NOF_MSG3
            };
            debug_assert!(
                self.pending_msg3s[msg3_index].harq.is_empty(),
                "Pending Msg3 should not have been added if HARQ is busy"
            );
            let preamble = self.pending_msg3s[msg3_index].preamble;
            let harq_id = self.pending_msg3s[msg3_index].harq.pid();
            let msg3_tbs = self.msg3_data[candidate.pusch_td_res_index].prbs_tbs.tbs_bytes;

            // MAC SDU with the UL grant (Msg3) carried in the RAR PDU.
            grants.push(RarUlGrant {
                rapid: preamble.preamble_id,
                ta: preamble.time_advance,
                temp_crnti: preamble.tc_rnti,
                time_resource_assignment: candidate.pusch_td_res_index as u8,
                freq_resource_assignment: ra_frequency_type1_get_riv(
                    self.cfg.ul_bwp.crbs.length(),
                    prbs.start,
                    prbs.length(),
                ),
                mcs: MSG3_MCS_INDEX,
                tpc: 0,
                csi_req: false,
            });

            // Allocate the Msg3 RBs and fill the PUSCH.
            let msg3_alloc = &mut res_alloc[msg3_delay];
            msg3_alloc.ul_res_grid.fill(&GrantInfo {
                scs: self.cfg.ul_bwp.scs,
                symbols: pusch_td.symbols,
                crbs: candidate.crbs,
            });
            let msg3_slot = msg3_alloc.slot;
            msg3_alloc.result.ul.puschs.push(UlSchedInfo {
                rnti: preamble.tc_rnti,
                prbs,
                symbols: pusch_td.symbols,
                mcs_index: MSG3_MCS_INDEX,
                modulation: self.msg3_mcs_config.modulation,
                target_code_rate: self.msg3_mcs_config.target_code_rate,
                transform_precoding: self.cfg.rach.msg3_transform_precoder,
                n_id: self.cfg.pci.0,
                nof_layers: 1,
                dmrs: self.msg3_data[candidate.pusch_td_res_index].dmrs_info,
                rv_index: 0,
                harq_id,
                new_data: true,
                tb_size_bytes: msg3_tbs,
            });

            // Reserve the codeblock buffer backing this HARQ process.
            let buffer = pool.reserve(
                msg3_slot,
                TxBufferIdentifier::Tagged {
                    rnti: preamble.tc_rnti,
                    harq_id,
                    is_dl: false,
                },
                nof_codeblocks_from_tbs(msg3_tbs),
                true,
            );
            if !buffer.is_valid() {
                warn!(
                    "SCHED: No codeblock buffer for Msg3 of temp_crnti={}",
                    preamble.tc_rnti
                );
            }
            buffer.release();

            // Allocate the Msg3 UL HARQ.
            let harq = &mut self.pending_msg3s[msg3_index].harq;
            let success = harq.new_tx(msg3_slot, prbs, MSG3_MCS_INDEX, MAX_MSG3_RETXS);
            debug_assert!(success, "Unexpected HARQ allocation return");
            harq.set_tbs(msg3_tbs);
        }

        // Fill the RAR PDSCH.
        let rar_alloc = &mut res_alloc[pdsch_td.k0 as usize];
        rar_alloc.result.dl.rar_grants.push(RarInformation {
            pdsch_cfg: PdschInfo {
                rnti: rar_request.ra_rnti,
                prbs: rar_prbs,
                symbols: pdsch_td.symbols,
                codeword: PdschCodeword {
                    mcs_index: RAR_MCS_INDEX,
                    rv_index: 0,
                    modulation: self.rar_mcs_config.modulation,
                    target_code_rate: self.rar_mcs_config.target_code_rate,
                    tb_size_bytes: self.rar_data[pdsch_time_res_index].prbs_tbs.tbs_bytes,
                },
                dmrs: self.rar_data[pdsch_time_res_index].dmrs_info,
                // n_ID is the Physical Cell ID for RA-RNTI.
                n_id: self.cfg.pci.0,
            },
            grants,
        });
    }

    fn schedule_msg3_retx(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        pdcch: &mut PdcchResourceAllocator,
        pool: &mut TxBufferPool,
        msg3_index: usize,
    ) {
        let k2 = 4usize;
        let pusch_td_res_index = 0usize;
        let pusch_td = self.cfg.pusch_td_alloc_list[pusch_td_res_index];
        let bwp_ul = self.cfg.ul_bwp;

        // Verify there is space in the PUSCH and PDCCH result lists.
        if res_alloc[k2].result.ul.puschs.is_full() || res_alloc[0].result.dl.ul_pdcchs.is_full() {
            warn!("Failed to allocate PUSCH. Cause: No space available in scheduler output list");
            return;
        }

        let tc_rnti = self.pending_msg3s[msg3_index].preamble.tc_rnti;
        let harq_id = self.pending_msg3s[msg3_index].harq.pid();
        let prev_prbs = self.pending_msg3s[msg3_index].harq.prbs();
        let prev_tbs = self.pending_msg3s[msg3_index].harq.tbs_bytes();

        // Try to reuse the previous HARQ PRBs.
        let grant = GrantInfo {
            scs: bwp_ul.scs,
            symbols: pusch_td.symbols,
            crbs: prb_to_crb(bwp_ul.crbs.start, prev_prbs),
        };
        if res_alloc[k2].ul_res_grid.collides(&grant) {
            debug!(
                "SCHED: Msg3 retx postponed for temp_crnti={}, previous PRBs are in use",
                tc_rnti
            );
            return;
        }

        // Find space in the PDCCH for the Msg3 DCI on the RA search space
        // (Type1-PDCCH CSS, TC-RNTI scrambling).
        let pdcch_index = match pdcch.alloc_ul_pdcch_common(
            &mut res_alloc[0],
            tc_rnti,
            self.cfg.ra_search_space_id,
            AggregationLevel::N4,
        ) {
            Some(index) => index,
            None => {
                warn!("SCHED: Failed to schedule PDCCH for Msg3 retx");
                return;
            }
        };

        // The retransmission reuses the codeblock buffer of the initial tx.
        let buffer = pool.reserve(
            res_alloc[k2].slot,
            TxBufferIdentifier::Tagged {
                rnti: tc_rnti,
                harq_id,
                is_dl: false,
            },
            nof_codeblocks_from_tbs(prev_tbs),
            false,
        );
        if !buffer.is_valid() {
            warn!(
                "SCHED: Failed to schedule Msg3 retx for temp_crnti={}, codeblock buffer unavailable",
                tc_rnti
            );
            return;
        }
        buffer.release();

        // Mark the resources as occupied in the grid.
        res_alloc[k2].ul_res_grid.fill(&grant);
        let pusch_slot = res_alloc[k2].slot;

        // Allocate the new retx in the HARQ.
        let prbs = crb_to_prb(bwp_ul.crbs.start, grant.crbs);
        if !self.pending_msg3s[msg3_index].harq.new_retx(pusch_slot, prbs) {
            warn!("SCHED: Failed to schedule Msg3 retx");
            self.pending_msg3s[msg3_index].harq.reset();
            return;
        }
        let nof_retx = self.pending_msg3s[msg3_index].harq.nof_retx();
        let mcs_index = self.pending_msg3s[msg3_index].harq.mcs();
        let rv_index = RV_SEQUENCE[nof_retx as usize % RV_SEQUENCE.len()];

        // Fill the DCI.
        res_alloc[0].result.dl.ul_pdcchs[pdcch_index].dci = DciUl::TcRntiF0_0(Dci0_0TcRnti {
            n_rb_ul_bwp: bwp_ul.crbs.length(),
            frequency_resource: ra_frequency_type1_get_riv(
                bwp_ul.crbs.length(),
                prbs.start,
                prbs.length(),
            ),
            time_resource: pusch_td_res_index as u8,
            frequency_hopping_flag: 0,
            modulation_coding_scheme: mcs_index,
            redundancy_version: rv_index,
            tpc_command: 0,
        });

        // Fill the PUSCH mirroring the DCI.
        let mcs_config = pusch_mcs_get_config(mcs_index, self.cfg.rach.msg3_transform_precoder);
        let tb_size_bytes = tbs_calculator_calculate(&TbsCalculatorConfig {
            nof_symb_sh: grant.symbols.length() as u32,
            nof_dmrs_prb: calculate_nof_dmrs_per_rb(&self.msg3_data[pusch_td_res_index].dmrs_info),
            nof_oh_prb: 0,
            target_code_rate: mcs_config.code_rate(),
            modulation: mcs_config.modulation,
            nof_layers: 1,
            tb_scaling_field: 0,
            nof_prb: grant.crbs.length() as u32,
        }) / 8;
        res_alloc[k2].result.ul.puschs.push(UlSchedInfo {
            rnti: tc_rnti,
            prbs,
            symbols: grant.symbols,
            mcs_index,
            modulation: mcs_config.modulation,
            target_code_rate: mcs_config.target_code_rate,
            transform_precoding: self.cfg.rach.msg3_transform_precoder,
            n_id: self.cfg.pci.0,
            nof_layers: 1,
            dmrs: self.msg3_data[pusch_td_res_index].dmrs_info,
            rv_index,
            harq_id,
            new_data: false,
            tb_size_bytes,
        });

        // Keep the transport block size for the next retransmission.
        self.pending_msg3s[msg3_index].harq.set_tbs(tb_size_bytes);
    }

    fn log_postponed_rar(&self, rar: &PendingRar, cause: &str) {
        debug!(
            "SCHED: RAR allocation for ra-rnti={} was postponed. Cause: {}",
            rar.ra_rnti, cause
        );
    }

    fn log_rars(&self, res_alloc: &CellResourceAllocator, rar_k0: usize) {
        let rars = &res_alloc[rar_k0].result.dl.rar_grants;
        if rars.is_empty() {
            return;
        }
        let mut summary = String::new();
        for rar in rars.iter() {
            summary.push_str(&format!(
                "\n- ra-rnti={}, msg3 grants ({} allocated): [",
                rar.pdsch_cfg.rnti,
                rar.grants.len()
            ));
            let mut prefix = "";
            for msg3 in rar.grants.iter() {
                let prbs = self.pending_msg3s[msg3.temp_crnti.0 as usize % MAX_NOF_MSG3]
                    .harq
                    .prbs();
                summary.push_str(&format!(
                    "{}{{{}: rapid={}, prbs={}, ta={}}}",
                    prefix, msg3.temp_crnti, msg3.rapid, prbs, msg3.ta
                ));
                prefix = ", ";
            }
            summary.push(']');
        }
        info!(
            "SCHED: RAR, cell={} ({} allocated):{}",
            self.cfg.cell_id.0,
            rars.len(),
            summary
        );
    }
}
