//! UE Repository
//!
//! Minimal per-UE context consumed by the slot orchestrator: the DRX
//! controller gating PDCCH opportunities and the dedicated PUCCH resources
//! used for SR and HARQ-ACK. The full UE data scheduler lives outside this
//! crate.

use crate::config::CellConfiguration;
use crate::drx::DrxController;
use crate::result::PucchFormat;
use common::types::{OfdmSymbolRange, Rnti};
use tracing::warn;

/// Maximum number of UEs tracked per cell
pub const MAX_NOF_UES: usize = 32;

/// One dedicated PUCCH resource of a UE
#[derive(Debug, Clone, Copy)]
pub struct PucchResourceConfig {
    /// PRB of the resource within the UL BWP
    pub prb: u16,
    /// OFDM symbols of the resource
    pub symbols: OfdmSymbolRange,
    /// PUCCH format of the resource
    pub format: PucchFormat,
}

/// Dedicated (post-RRC-setup) configuration of a UE in this cell
#[derive(Debug, Clone)]
pub struct UeCellConfiguration {
    /// SR opportunity periodicity in slots
    pub sr_period_slots: u32,
    /// SR opportunity slot offset
    pub sr_offset_slots: u32,
    /// Dedicated PUCCH resource for SR
    pub sr_resource: PucchResourceConfig,
    /// Dedicated PUCCH resources for HARQ-ACK, indexed by the PUCCH resource
    /// indicator
    pub harq_resources: Vec<PucchResourceConfig>,
}

/// Scheduler-side context of one UE
#[derive(Debug)]
pub struct UeContext {
    /// C-RNTI of the UE
    pub crnti: Rnti,
    /// DRX state gating PDCCH monitoring
    pub drx: DrxController,
    /// Dedicated cell configuration
    pub cfg: UeCellConfiguration,
}

impl UeContext {
    /// Check whether this UE has an SR opportunity at the slot
    pub fn is_sr_opportunity(&self, slot: common::slot_point::SlotPoint) -> bool {
        slot.to_uint() % self.cfg.sr_period_slots
            == self.cfg.sr_offset_slots % self.cfg.sr_period_slots
    }
}

/// Fixed-capacity store of the UEs attached to a cell
pub struct UeRepository {
    ues: Vec<UeContext>,
}

impl UeRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            ues: Vec::with_capacity(MAX_NOF_UES),
        }
    }

    /// Add a UE. Fails when the cell is full or the RNTI is taken.
    pub fn add_ue(&mut self, cell_cfg: &CellConfiguration, crnti: Rnti, ue_cfg: UeCellConfiguration) -> bool {
        if self.ues.len() >= MAX_NOF_UES {
            warn!("Cannot create UE {}: cell is full", crnti);
            return false;
        }
        if self.get(crnti).is_some() {
            warn!("Cannot create UE {}: RNTI already in use", crnti);
            return false;
        }
        self.ues.push(UeContext {
            crnti,
            drx: DrxController::new(cell_cfg.scs_common, cell_cfg.conres_timer_ms, cell_cfg.drx),
            cfg: ue_cfg,
        });
        true
    }

    /// Remove a UE by RNTI
    pub fn remove_ue(&mut self, crnti: Rnti) -> bool {
        let before = self.ues.len();
        self.ues.retain(|ue| ue.crnti != crnti);
        before != self.ues.len()
    }

    /// Look up a UE by RNTI
    pub fn get(&self, crnti: Rnti) -> Option<&UeContext> {
        self.ues.iter().find(|ue| ue.crnti == crnti)
    }

    /// Look up a UE by RNTI for mutation
    pub fn get_mut(&mut self, crnti: Rnti) -> Option<&mut UeContext> {
        self.ues.iter_mut().find(|ue| ue.crnti == crnti)
    }

    /// Iterate over all UEs
    pub fn iter(&self) -> impl Iterator<Item = &UeContext> {
        self.ues.iter()
    }

    /// Iterate over all UEs for mutation
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut UeContext> {
        self.ues.iter_mut()
    }
}

impl Default for UeRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// A default dedicated configuration used until RRC reconfiguration arrives
pub fn default_ue_cell_config() -> UeCellConfiguration {
    UeCellConfiguration {
        sr_period_slots: 40,
        sr_offset_slots: 0,
        sr_resource: PucchResourceConfig {
            prb: 0,
            symbols: OfdmSymbolRange::new(0, 14),
            format: PucchFormat::F1,
        },
        harq_resources: vec![
            PucchResourceConfig {
                prb: 1,
                symbols: OfdmSymbolRange::new(0, 14),
                format: PucchFormat::F1,
            },
            PucchResourceConfig {
                prb: 2,
                symbols: OfdmSymbolRange::new(0, 14),
                format: PucchFormat::F1,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_cell_config;

    #[test]
    fn test_add_remove_lookup() {
        let cell_cfg = test_cell_config();
        let mut ues = UeRepository::new();
        assert!(ues.add_ue(&cell_cfg, Rnti(0x4601), default_ue_cell_config()));
        assert!(!ues.add_ue(&cell_cfg, Rnti(0x4601), default_ue_cell_config()));
        assert!(ues.get(Rnti(0x4601)).is_some());
        assert!(ues.remove_ue(Rnti(0x4601)));
        assert!(!ues.remove_ue(Rnti(0x4601)));
        assert!(ues.get(Rnti(0x4601)).is_none());
    }

    #[test]
    fn test_capacity_bound() {
        let cell_cfg = test_cell_config();
        let mut ues = UeRepository::new();
        for i in 0..MAX_NOF_UES as u16 {
            assert!(ues.add_ue(&cell_cfg, Rnti(0x4601 + i), default_ue_cell_config()));
        }
        assert!(!ues.add_ue(&cell_cfg, Rnti(0x5601), default_ue_cell_config()));
    }

    #[test]
    fn test_sr_opportunity_periodicity() {
        let cell_cfg = test_cell_config();
        let mut ues = UeRepository::new();
        ues.add_ue(&cell_cfg, Rnti(0x4601), default_ue_cell_config());
        let ue = ues.get(Rnti(0x4601)).unwrap();
        assert!(ue.is_sr_opportunity(common::slot_point::SlotPoint::new(1, 0)));
        assert!(!ue.is_sr_opportunity(common::slot_point::SlotPoint::new(1, 1)));
        assert!(ue.is_sr_opportunity(common::slot_point::SlotPoint::new(1, 40)));
    }
}
