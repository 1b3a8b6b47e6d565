//! Slot Orchestrator
//!
//! Owns every scheduler component of one cell and runs the per-slot tick:
//! HARQ pool maintenance, event draining, broadcast, Random Access, then the
//! per-UE pass, finally emitting the slot result and rotating the resource
//! ring. All entry points other than `run_slot` only enqueue work, keeping
//! the cell single-writer.

use crate::broadcast::BroadcastScheduler;
use crate::cell::CellResourceAllocator;
use crate::config::CellConfiguration;
use crate::harq::{TxBufferPool, TxBufferPoolConfig};
use crate::pdcch::PdcchResourceAllocator;
use crate::pucch::PucchAllocator;
use crate::ra::{RaScheduler, RachIndication, UlCrcIndication};
use crate::result::SlotResult;
use crate::support::event_queue::{EventQueue, EventSender};
use crate::ue::{UeCellConfiguration, UeRepository};
use crate::SchedulerError;
use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Scheduling-request state change for one UE
#[derive(Debug, Clone, Copy)]
pub struct SrIndication {
    /// C-RNTI of the UE
    pub crnti: Rnti,
    /// New pending state, set by UCI and cleared by the UL channel manager
    pub sr_pending: bool,
}

/// Per-cell slot scheduler
pub struct CellScheduler {
    cfg: Arc<CellConfiguration>,
    res_alloc: CellResourceAllocator,
    pdcch: PdcchResourceAllocator,
    pucch: PucchAllocator,
    ra: RaScheduler,
    broadcast: BroadcastScheduler,
    pool: TxBufferPool,
    ues: UeRepository,
    sr_events: EventQueue<SrIndication>,
}

impl CellScheduler {
    /// Create the scheduler for a cell. Fails only on configuration errors.
    pub fn new(
        cfg: CellConfiguration,
        pool_cfg: TxBufferPoolConfig,
        start_slot: SlotPoint,
    ) -> Result<Self, SchedulerError> {
        cfg.validate()?;
        let cfg = Arc::new(cfg);
        let scheduler = Self {
            res_alloc: CellResourceAllocator::new(&cfg, start_slot),
            pdcch: PdcchResourceAllocator::new(cfg.clone()),
            pucch: PucchAllocator::new(cfg.clone()),
            ra: RaScheduler::new(cfg.clone())?,
            broadcast: BroadcastScheduler::new(cfg.clone())?,
            pool: TxBufferPool::new(pool_cfg),
            ues: UeRepository::new(),
            sr_events: EventQueue::new(32, "SR"),
            cfg,
        };
        info!(
            "Cell scheduler ready: pci={}, scs={:?}, dl_bwp={}, ul_bwp={}",
            scheduler.cfg.pci.0, scheduler.cfg.scs_common, scheduler.cfg.dl_bwp.crbs, scheduler.cfg.ul_bwp.crbs
        );
        Ok(scheduler)
    }

    /// Current tx reference slot
    pub fn slot_tx(&self) -> SlotPoint {
        self.res_alloc.slot_tx()
    }

    /// Queue a RACH indication from the PHY
    pub fn handle_rach_indication(&self, msg: RachIndication) {
        self.ra.handle_rach_indication(msg);
    }

    /// Producer handle for RACH indications from other threads
    pub fn rach_sender(&self) -> EventSender<RachIndication> {
        self.ra.rach_sender()
    }

    /// Queue a CRC indication from the PHY
    pub fn handle_crc_indication(&self, crc_ind: UlCrcIndication) {
        self.ra.handle_crc_indication(crc_ind);
    }

    /// Producer handle for CRC indications from other threads
    pub fn crc_sender(&self) -> EventSender<UlCrcIndication> {
        self.ra.crc_sender()
    }

    /// Queue a scheduling-request state change
    pub fn handle_sr_indication(&self, sr: SrIndication) {
        self.sr_events.push(sr);
    }

    /// Producer handle for SR indications from other threads
    pub fn sr_sender(&self) -> EventSender<SrIndication> {
        self.sr_events.sender()
    }

    /// Create a UE context; called when RRC setup completes
    pub fn add_ue(&mut self, crnti: Rnti, ue_cfg: UeCellConfiguration) -> bool {
        self.ues.add_ue(&self.cfg, crnti, ue_cfg)
    }

    /// Remove a UE context
    pub fn remove_ue(&mut self, crnti: Rnti) -> bool {
        self.ues.remove_ue(crnti)
    }

    /// Start the contention-resolution window of a UE
    pub fn on_con_res_start(&mut self, crnti: Rnti) {
        let slot = self.res_alloc.slot_tx();
        match self.ues.get_mut(crnti) {
            Some(ue) => ue.drx.on_con_res_start(slot),
            None => warn!("ConRes start for unknown rnti={}", crnti),
        }
    }

    /// Run one scheduler tick and emit the result for the tx slot
    pub fn run_slot(&mut self) -> SlotResult {
        let slot_tx = self.res_alloc.slot_tx();

        // Expire HARQ buffers first so freed entries are reusable this tick.
        self.pool.run_slot(slot_tx);

        // Drain the SR queue into the per-UE DRX state.
        self.sr_events.slot_indication();
        for sr in self.sr_events.take_events() {
            match self.ues.get_mut(sr.crnti) {
                Some(ue) if sr.sr_pending => ue.drx.on_sr_indication(),
                Some(ue) => ue.drx.reset_sr_indication(),
                None => warn!("SR indication for unknown rnti={}", sr.crnti),
            }
        }

        // Broadcast commits first, then RA; UE grants may not evict either.
        self.broadcast.run_slot(&mut self.res_alloc, &mut self.pdcch);
        self.ra
            .run_slot(&mut self.res_alloc, &mut self.pdcch, &mut self.pool);

        // Per-UE pass: advance DRX and serve SR opportunities. Dynamic UE
        // scheduling plugs in here, consulting the same DRX gate.
        let mut nof_pdcch_eligible = 0;
        for ue in self.ues.iter_mut() {
            ue.drx.slot_indication(slot_tx);
            if ue.drx.is_pdcch_enabled(slot_tx) {
                nof_pdcch_eligible += 1;
            }
        }
        trace!(
            "slot={}: {} UEs PDCCH-eligible",
            slot_tx,
            nof_pdcch_eligible
        );
        let sr_ues: Vec<Rnti> = self
            .ues
            .iter()
            .filter(|ue| ue.is_sr_opportunity(slot_tx))
            .map(|ue| ue.crnti)
            .collect();
        for crnti in sr_ues {
            let ue_cfg = self.ues.get(crnti).expect("UE just listed").cfg.clone();
            self.pucch
                .pucch_allocate_sr_opportunity(&mut self.res_alloc[0], crnti, &ue_cfg);
        }

        // Emit the result and rotate the ring; the PHY always receives a
        // well-formed, possibly empty, result.
        let result = self.res_alloc[0].result.clone();
        self.res_alloc.advance();
        result
    }

    /// Access the PUCCH allocator for the UE scheduler layered on top
    pub fn pucch_allocator(&self) -> &PucchAllocator {
        &self.pucch
    }

    /// Teardown barrier: blocks until every HARQ buffer handle is released
    pub fn stop(&mut self) {
        self.pool.stop();
        info!("Cell scheduler stopped: pci={}", self.cfg.pci.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_cell_config;
    use crate::ra::{RachOccasion, RachPreamble};
    use crate::ue::default_ue_cell_config;

    fn pool_cfg() -> TxBufferPoolConfig {
        TxBufferPoolConfig {
            max_codeblock_size: 8448 / 8,
            nof_buffers: 8,
            nof_codeblocks: 16,
            expire_timeout_slots: 100,
            external_soft_bits: false,
        }
    }

    fn scheduler_at(slot_tx: u32) -> CellScheduler {
        CellScheduler::new(
            test_cell_config(),
            pool_cfg(),
            SlotPoint::new(1, slot_tx),
        )
        .unwrap()
    }

    fn rach_at(slot_rx: SlotPoint, tc_rnti: u16) -> RachIndication {
        RachIndication {
            slot_rx,
            occasions: vec![RachOccasion {
                start_symbol: 0,
                frequency_index: 0,
                preambles: vec![RachPreamble {
                    preamble_id: 3,
                    tc_rnti: Rnti(tc_rnti),
                    time_advance: 12,
                }],
            }],
        }
    }

    #[test]
    fn test_tick_emits_broadcast_and_advances() {
        let mut scheduler = scheduler_at(0);
        let result = scheduler.run_slot();
        assert_eq!(result.dl.ssb.len(), 1);
        assert_eq!(scheduler.slot_tx().to_uint(), 1);

        // An idle slot still emits a well-formed empty result.
        let result = scheduler.run_slot();
        assert!(result.dl.ssb.is_empty());
        assert!(result.dl.dl_pdcchs.is_empty());
        assert!(result.ul.puschs.is_empty());
    }

    #[test]
    fn test_rach_to_rar_through_orchestrator() {
        let mut scheduler = scheduler_at(10);
        let sender = scheduler.rach_sender();
        let handle = std::thread::spawn(move || {
            sender.push(rach_at(SlotPoint::new(1, 10), 0x4601));
        });
        handle.join().unwrap();

        // Tick at slot 10 drains the event; the window [11, 21) is still
        // closed, so nothing is emitted yet.
        let result = scheduler.run_slot();
        assert!(result.dl.rar_grants.is_empty());

        // Tick at slot 11 transmits the RAR.
        let result = scheduler.run_slot();
        assert_eq!(result.dl.rar_grants.len(), 1);
        assert_eq!(result.dl.dl_pdcchs.len(), 1);
        assert_eq!(result.dl.rar_grants[0].grants[0].temp_crnti, Rnti(0x4601));

        // The Msg3 PUSCH is emitted when its slot becomes the tx slot.
        let mut found_msg3 = false;
        for _ in 0..7 {
            let result = scheduler.run_slot();
            if !result.ul.puschs.is_empty() {
                assert_eq!(result.ul.puschs[0].rnti, Rnti(0x4601));
                assert!(result.ul.puschs[0].new_data);
                found_msg3 = true;
            }
        }
        assert!(found_msg3);
    }

    #[test]
    fn test_sr_opportunity_follows_configured_period() {
        let mut scheduler = scheduler_at(11);
        scheduler.add_ue(Rnti(0x4700), default_ue_cell_config());
        scheduler.handle_rach_indication(rach_at(SlotPoint::new(1, 10), 0x4601));

        // Slot 11 schedules the RAR; Msg3 lands at slot 18.
        scheduler.run_slot();

        // Advance to slot 18. No SR opportunity matches earlier slots
        // (period 40, offset 0), so PUCCH lists stay empty until slot 40.
        for _ in 12..=18 {
            let result = scheduler.run_slot();
            assert!(result.ul.pucchs.is_empty());
            if !result.ul.puschs.is_empty() {
                // Msg3 occupies PRBs [0, 3) on all symbols at slot 18.
                assert_eq!(result.ul.puschs[0].prbs.start, 0);
            }
        }

        // At slot 40 the SR opportunity is allocated on PRB 0, now free.
        for _ in 19..40 {
            scheduler.run_slot();
        }
        assert_eq!(scheduler.slot_tx().to_uint(), 40);
        let result = scheduler.run_slot();
        assert_eq!(result.ul.pucchs.len(), 1);
        assert_eq!(result.ul.pucchs[0].sr_nof_bits, 1);
    }

    #[test]
    fn test_sr_indication_toggles_drx() {
        let mut cfg = test_cell_config();
        cfg.drx = Some(crate::config::DrxConfig {
            long_cycle_ms: 80,
            long_start_offset_ms: 10,
            on_duration_timer_ms: 10,
            inactivity_timer_ms: 20,
        });
        let mut scheduler =
            CellScheduler::new(cfg, pool_cfg(), SlotPoint::new(1, 0)).unwrap();
        scheduler.add_ue(Rnti(0x4700), default_ue_cell_config());

        scheduler.handle_sr_indication(SrIndication {
            crnti: Rnti(0x4700),
            sr_pending: true,
        });
        scheduler.run_slot();
        let ue = scheduler.ues.get(Rnti(0x4700)).unwrap();
        assert!(ue.drx.is_pdcch_enabled(scheduler.res_alloc.slot_tx()));

        scheduler.handle_sr_indication(SrIndication {
            crnti: Rnti(0x4700),
            sr_pending: false,
        });
        scheduler.run_slot();
        // Slot 2 is outside the on-duration window [20, 40).
        let ue = scheduler.ues.get(Rnti(0x4700)).unwrap();
        assert!(!ue.drx.is_pdcch_enabled(scheduler.res_alloc.slot_tx()));
    }

    #[test]
    fn test_stop_blocks_until_buffers_released() {
        let mut scheduler = scheduler_at(11);
        scheduler.handle_rach_indication(rach_at(SlotPoint::new(1, 10), 0x4601));
        scheduler.run_slot();
        scheduler.stop();
    }
}
