//! Cell Configuration
//!
//! Immutable per-cell configuration consumed by the scheduler components.
//! Built once at cell creation and never mutated afterwards; validation
//! failures here are fatal, unlike the soft resource failures at runtime.

use crate::SchedulerError;
use common::interval::CrbInterval;
use common::slot_point::SlotPoint;
use common::types::{CellId, DuplexMode, OfdmSymbolRange, Pci, SubcarrierSpacing};

/// Bandwidth part: a contiguous CRB range at a given numerology
#[derive(Debug, Clone, Copy)]
pub struct BwpConfiguration {
    /// Subcarrier spacing of the BWP
    pub scs: SubcarrierSpacing,
    /// CRBs spanned by the BWP
    pub crbs: CrbInterval,
}

/// CORESET configuration based on 3GPP TS 38.213
#[derive(Debug, Clone, Copy)]
pub struct CoresetConfig {
    /// CORESET identifier
    pub id: u8,
    /// CRBs spanned by the CORESET
    pub crbs: CrbInterval,
    /// Number of OFDM symbols, 1 to 3
    pub nof_symbols: u8,
}

impl CoresetConfig {
    /// Number of CCEs in the CORESET (one CCE is six REGs of one RB x one symbol)
    pub fn nof_cces(&self) -> u16 {
        self.crbs.length() * self.nof_symbols as u16 / 6
    }

    /// Get CORESET#0 dimensions from the table index
    /// Based on 3GPP TS 38.213 Table 13-1 for {15, 15} kHz SCS
    pub fn coreset0_from_index(index: u8, offset_to_carrier: u16) -> Result<Self, SchedulerError> {
        let (num_rbs, num_symbols, rb_offset) = match index {
            0 => (24, 2, 0),
            1 => (24, 2, 2),
            2 => (24, 2, 4),
            3 => (24, 3, 0),
            4 => (24, 3, 2),
            5 => (24, 3, 4),
            6 => (48, 1, 12),
            7 => (48, 1, 16),
            8 => (48, 2, 12),
            9 => (48, 2, 16),
            10 => (48, 3, 12),
            11 => (48, 3, 16),
            12 => (96, 1, 38),
            13 => (96, 2, 38),
            14 => (96, 3, 38),
            _ => {
                return Err(SchedulerError::InvalidConfiguration(format!(
                    "Invalid CORESET#0 index: {}",
                    index
                )))
            }
        };
        let start = offset_to_carrier + rb_offset;
        Ok(Self {
            id: 0,
            crbs: CrbInterval::new(start, start + num_rbs),
            nof_symbols: num_symbols,
        })
    }
}

/// Search space monitoring configuration
#[derive(Debug, Clone, Copy)]
pub struct SearchSpaceConfig {
    /// Search space identifier
    pub id: u8,
    /// CORESET this search space maps to
    pub coreset_id: u8,
    /// Monitoring slot periodicity
    pub periodicity_slots: u32,
    /// Monitoring slot offset
    pub offset_slots: u32,
}

impl SearchSpaceConfig {
    /// Check whether PDCCH monitoring is active for this search space at a slot
    pub fn is_monitored(&self, slot: SlotPoint) -> bool {
        slot.to_uint() % self.periodicity_slots == self.offset_slots % self.periodicity_slots
    }
}

/// PDSCH time-domain resource allocation
#[derive(Debug, Clone, Copy)]
pub struct PdschTimeDomainResource {
    /// Slot delay between PDCCH and PDSCH
    pub k0: u8,
    /// PDSCH OFDM symbols
    pub symbols: OfdmSymbolRange,
}

/// PUSCH time-domain resource allocation
#[derive(Debug, Clone, Copy)]
pub struct PuschTimeDomainResource {
    /// Slot delay between PDCCH and PUSCH
    pub k2: u8,
    /// PUSCH OFDM symbols
    pub symbols: OfdmSymbolRange,
}

/// Common RACH configuration relevant to RAR scheduling
#[derive(Debug, Clone, Copy)]
pub struct RachConfigCommon {
    /// RAR response window length in slots
    pub ra_resp_window_slots: u32,
    /// PRACH preamble duration in slots
    pub prach_duration_slots: u32,
    /// msg3-transformPrecoder from RACH-ConfigCommon
    pub msg3_transform_precoder: bool,
}

/// DRX configuration, all values in milliseconds
#[derive(Debug, Clone, Copy)]
pub struct DrxConfig {
    /// drx-LongCycle
    pub long_cycle_ms: u32,
    /// drx-StartOffset
    pub long_start_offset_ms: u32,
    /// drx-onDurationTimer
    pub on_duration_timer_ms: u32,
    /// drx-InactivityTimer
    pub inactivity_timer_ms: u32,
}

/// Immutable cell configuration
#[derive(Debug, Clone)]
pub struct CellConfiguration {
    /// Physical cell identity
    pub pci: Pci,
    /// Cell identity
    pub cell_id: CellId,
    /// Common subcarrier spacing
    pub scs_common: SubcarrierSpacing,
    /// Duplex mode, with the TDD pattern when applicable
    pub duplex: DuplexMode,
    /// Initial DL bandwidth part
    pub dl_bwp: BwpConfiguration,
    /// Initial UL bandwidth part
    pub ul_bwp: BwpConfiguration,
    /// CORESET#0
    pub coreset0: CoresetConfig,
    /// Configured search spaces
    pub search_spaces: Vec<SearchSpaceConfig>,
    /// Search space used for RA (Type1-PDCCH CSS)
    pub ra_search_space_id: u8,
    /// Search space used for SI (Type0-PDCCH CSS)
    pub si_search_space_id: u8,
    /// PDSCH-TimeDomainResourceAllocation list from PDSCH-ConfigCommon
    pub pdsch_td_alloc_list: Vec<PdschTimeDomainResource>,
    /// PUSCH-TimeDomainResourceAllocation list from PUSCH-ConfigCommon
    pub pusch_td_alloc_list: Vec<PuschTimeDomainResource>,
    /// RACH common configuration
    pub rach: RachConfigCommon,
    /// DRX configuration applied to UEs of this cell, if any
    pub drx: Option<DrxConfig>,
    /// ra-ContentionResolutionTimer in milliseconds
    pub conres_timer_ms: u32,
    /// SSB periodicity in milliseconds
    pub ssb_period_ms: u32,
    /// SIB1 periodicity in milliseconds
    pub sib1_period_ms: u32,
    /// SIB1 payload size in bytes
    pub sib1_payload_size: u16,
}

impl CellConfiguration {
    /// Validate the configuration. Called once at cell creation; any error
    /// here is fatal.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.ul_bwp.scs.to_numerology() > 3 {
            // Msg3 delay is only defined for PUSCH SCS up to 120 kHz.
            return Err(SchedulerError::InvalidConfiguration(format!(
                "PUSCH subcarrier spacing {:?} not supported for Msg3 delay",
                self.ul_bwp.scs
            )));
        }
        if self.pdsch_td_alloc_list.is_empty() || self.pusch_td_alloc_list.is_empty() {
            return Err(SchedulerError::InvalidConfiguration(
                "Empty PDSCH/PUSCH time-domain allocation list".into(),
            ));
        }
        if self.coreset0.crbs.start < self.dl_bwp.crbs.start
            || self.coreset0.crbs.stop > self.dl_bwp.crbs.stop
        {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "CORESET#0 CRBs {} outside the DL BWP {}",
                self.coreset0.crbs, self.dl_bwp.crbs
            )));
        }
        if self.search_space(self.ra_search_space_id).is_none() {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "RA search space {} not configured",
                self.ra_search_space_id
            )));
        }
        if self.search_space(self.si_search_space_id).is_none() {
            return Err(SchedulerError::InvalidConfiguration(format!(
                "SI search space {} not configured",
                self.si_search_space_id
            )));
        }
        if let DuplexMode::Tdd(pattern) = self.duplex {
            if pattern.dl_slots + pattern.ul_slots > pattern.period_slots {
                return Err(SchedulerError::InvalidConfiguration(
                    "TDD DL+UL slots exceed the pattern period".into(),
                ));
            }
        }
        Ok(())
    }

    /// Look up a search space by identifier
    pub fn search_space(&self, id: u8) -> Option<&SearchSpaceConfig> {
        self.search_spaces.iter().find(|ss| ss.id == id)
    }

    /// Check whether DL transmissions can occur at a slot
    pub fn is_dl_enabled(&self, slot: SlotPoint) -> bool {
        match self.duplex {
            DuplexMode::Fdd => true,
            DuplexMode::Tdd(pattern) => slot.to_uint() % pattern.period_slots < pattern.dl_slots,
        }
    }

    /// Check whether UL transmissions can occur at a slot
    pub fn is_ul_enabled(&self, slot: SlotPoint) -> bool {
        match self.duplex {
            DuplexMode::Fdd => true,
            DuplexMode::Tdd(pattern) => {
                slot.to_uint() % pattern.period_slots >= pattern.period_slots - pattern.ul_slots
            }
        }
    }

    /// Number of slots in one TDD period; one for FDD
    pub fn nof_slots_per_tdd_period(&self) -> u32 {
        match self.duplex {
            DuplexMode::Fdd => 1,
            DuplexMode::Tdd(pattern) => pattern.period_slots,
        }
    }

    /// Slots per millisecond at the common numerology
    pub fn slots_per_ms(&self) -> u32 {
        self.scs_common.slots_per_subframe()
    }
}

#[cfg(test)]
pub(crate) fn test_cell_config() -> CellConfiguration {
    CellConfiguration {
        pci: Pci::new(1).unwrap(),
        cell_id: CellId(1),
        scs_common: SubcarrierSpacing::Scs30,
        duplex: DuplexMode::Fdd,
        dl_bwp: BwpConfiguration {
            scs: SubcarrierSpacing::Scs30,
            crbs: CrbInterval::new(0, 24),
        },
        ul_bwp: BwpConfiguration {
            scs: SubcarrierSpacing::Scs30,
            crbs: CrbInterval::new(0, 24),
        },
        coreset0: CoresetConfig {
            id: 0,
            crbs: CrbInterval::new(0, 24),
            nof_symbols: 2,
        },
        search_spaces: vec![
            SearchSpaceConfig {
                id: 0,
                coreset_id: 0,
                periodicity_slots: 1,
                offset_slots: 0,
            },
            SearchSpaceConfig {
                id: 1,
                coreset_id: 0,
                periodicity_slots: 1,
                offset_slots: 0,
            },
        ],
        ra_search_space_id: 1,
        si_search_space_id: 0,
        pdsch_td_alloc_list: vec![PdschTimeDomainResource {
            k0: 0,
            symbols: OfdmSymbolRange::new(2, 14),
        }],
        pusch_td_alloc_list: vec![PuschTimeDomainResource {
            k2: 4,
            symbols: OfdmSymbolRange::new(0, 14),
        }],
        rach: RachConfigCommon {
            ra_resp_window_slots: 10,
            prach_duration_slots: 1,
            msg3_transform_precoder: false,
        },
        drx: None,
        conres_timer_ms: 64,
        ssb_period_ms: 20,
        sib1_period_ms: 160,
        sib1_payload_size: 100,
    }
}
