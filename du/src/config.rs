//! YAML Configuration Structures
//!
//! Deserialized from the DU configuration file and converted into the
//! immutable `CellConfiguration` consumed by the scheduler at startup.

use common::interval::CrbInterval;
use common::types::{CellId, DuplexMode, OfdmSymbolRange, Pci, SubcarrierSpacing, TddPattern};
use scheduler::config::{
    BwpConfiguration, CellConfiguration, CoresetConfig, DrxConfig, PdschTimeDomainResource,
    PuschTimeDomainResource, RachConfigCommon, SearchSpaceConfig,
};
use serde::{Deserialize, Serialize};

/// Main DU configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DuConfig {
    /// Cell configuration
    pub cell_cfg: CellCfg,
    /// HARQ buffer pool configuration
    #[serde(default)]
    pub harq_pool: HarqPoolCfg,
    /// Logging configuration
    #[serde(default)]
    pub log: LogCfg,
}

/// Cell configuration section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellCfg {
    /// Physical Cell ID
    pub pci: u16,
    /// Common subcarrier spacing in kHz
    pub common_scs: u32,
    /// Channel bandwidth in MHz
    #[serde(rename = "channel_bandwidth_MHz")]
    pub channel_bandwidth_mhz: u32,
    /// PDCCH configuration
    pub pdcch: PdcchCfg,
    /// PRACH configuration
    pub prach: PrachCfg,
    /// TDD pattern; absent for FDD cells
    #[serde(default)]
    pub tdd: Option<TddCfg>,
    /// DRX configuration applied to UEs
    #[serde(default)]
    pub drx: Option<DrxCfg>,
    /// SIB1 payload size in bytes
    #[serde(default = "default_sib1_payload_size")]
    pub sib1_payload_size: u16,
}

fn default_sib1_payload_size() -> u16 {
    100
}

/// PDCCH configuration section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PdcchCfg {
    /// CORESET#0 table index
    pub coreset0_index: u8,
    /// SearchSpace#0 index
    #[serde(default)]
    pub ss0_index: u8,
}

/// PRACH configuration section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrachCfg {
    /// RAR response window in slots
    #[serde(default = "default_ra_resp_window")]
    pub ra_response_window: u32,
    /// PRACH preamble duration in slots
    #[serde(default = "default_prach_duration")]
    pub prach_duration: u32,
    /// msg3-transformPrecoder
    #[serde(default)]
    pub msg3_transform_precoder: bool,
}

fn default_ra_resp_window() -> u32 {
    10
}

fn default_prach_duration() -> u32 {
    1
}

/// TDD pattern section
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TddCfg {
    /// Pattern period in slots
    pub period_slots: u32,
    /// Leading DL slots
    pub dl_slots: u32,
    /// Trailing UL slots
    pub ul_slots: u32,
}

/// DRX section, values in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DrxCfg {
    /// drx-LongCycle
    pub long_cycle: u32,
    /// drx-StartOffset
    pub long_start_offset: u32,
    /// drx-onDurationTimer
    pub on_duration_timer: u32,
    /// drx-InactivityTimer
    pub inactivity_timer: u32,
}

/// HARQ buffer pool section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarqPoolCfg {
    /// Maximum codeblock size in bytes
    pub max_codeblock_size: usize,
    /// Number of buffers
    pub nof_buffers: usize,
    /// Codeblock budget over the whole pool
    pub nof_codeblocks: usize,
    /// Reservation lifetime in slots
    pub expire_timeout_slots: u32,
    /// Soft bits stored outside the pool
    #[serde(default)]
    pub external_soft_bits: bool,
}

impl Default for HarqPoolCfg {
    fn default() -> Self {
        Self {
            max_codeblock_size: 8448 / 8,
            nof_buffers: 64,
            nof_codeblocks: 128,
            expire_timeout_slots: 100,
            external_soft_bits: false,
        }
    }
}

/// Logging section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogCfg {
    /// Log level for all components
    #[serde(default = "default_log_level")]
    pub all_level: String,
}

impl Default for LogCfg {
    fn default() -> Self {
        Self {
            all_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DuConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: DuConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

/// Carrier PRB counts from 3GPP TS 38.104 Table 5.3.2-1
fn nof_crbs(bandwidth_mhz: u32, scs: SubcarrierSpacing) -> anyhow::Result<u16> {
    let crbs = match (bandwidth_mhz, scs) {
        (5, SubcarrierSpacing::Scs15) => 25,
        (10, SubcarrierSpacing::Scs15) => 52,
        (10, SubcarrierSpacing::Scs30) => 24,
        (15, SubcarrierSpacing::Scs15) => 79,
        (15, SubcarrierSpacing::Scs30) => 38,
        (20, SubcarrierSpacing::Scs15) => 106,
        (20, SubcarrierSpacing::Scs30) => 51,
        (40, SubcarrierSpacing::Scs30) => 106,
        (50, SubcarrierSpacing::Scs30) => 133,
        (100, SubcarrierSpacing::Scs30) => 273,
        _ => {
            return Err(anyhow::anyhow!(
                "Unsupported bandwidth {} MHz at {:?}",
                bandwidth_mhz,
                scs
            ))
        }
    };
    Ok(crbs)
}

/// Build the immutable cell configuration from the YAML structures
pub fn build_cell_configuration(config: &DuConfig) -> anyhow::Result<CellConfiguration> {
    let cell = &config.cell_cfg;
    let pci =
        Pci::new(cell.pci).ok_or_else(|| anyhow::anyhow!("Invalid PCI: {}", cell.pci))?;
    let scs = match cell.common_scs {
        15 => SubcarrierSpacing::Scs15,
        30 => SubcarrierSpacing::Scs30,
        60 => SubcarrierSpacing::Scs60,
        120 => SubcarrierSpacing::Scs120,
        _ => {
            return Err(anyhow::anyhow!(
                "Invalid subcarrier spacing: {} kHz",
                cell.common_scs
            ))
        }
    };

    let carrier_crbs = nof_crbs(cell.channel_bandwidth_mhz, scs)?;
    let bwp = BwpConfiguration {
        scs,
        crbs: CrbInterval::new(0, carrier_crbs),
    };

    let mut coreset0 = CoresetConfig::coreset0_from_index(cell.pdcch.coreset0_index, 0)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    // Clamp CORESET#0 to the carrier for narrow test bandwidths.
    if coreset0.crbs.stop > carrier_crbs {
        coreset0.crbs = CrbInterval::new(coreset0.crbs.start.min(carrier_crbs), carrier_crbs);
    }

    let duplex = match cell.tdd {
        Some(tdd) => DuplexMode::Tdd(TddPattern {
            period_slots: tdd.period_slots,
            dl_slots: tdd.dl_slots,
            ul_slots: tdd.ul_slots,
        }),
        None => DuplexMode::Fdd,
    };

    let cfg = CellConfiguration {
        pci,
        cell_id: CellId(cell.pci),
        scs_common: scs,
        duplex,
        dl_bwp: bwp,
        ul_bwp: bwp,
        coreset0,
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
            ra_resp_window_slots: cell.prach.ra_response_window,
            prach_duration_slots: cell.prach.prach_duration,
            msg3_transform_precoder: cell.prach.msg3_transform_precoder,
        },
        drx: cell.drx.as_ref().map(|drx| DrxConfig {
            long_cycle_ms: drx.long_cycle,
            long_start_offset_ms: drx.long_start_offset,
            on_duration_timer_ms: drx.on_duration_timer,
            inactivity_timer_ms: drx.inactivity_timer,
        }),
        conres_timer_ms: 64,
        ssb_period_ms: 20,
        sib1_period_ms: 160,
        sib1_payload_size: cell.sib1_payload_size,
    };
    cfg.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_YAML: &str = r#"
cell_cfg:
  pci: 1
  common_scs: 30
  channel_bandwidth_MHz: 10
  pdcch:
    coreset0_index: 0
  prach:
    ra_response_window: 10
"#;

    #[test]
    fn test_parse_minimal_yaml() {
        let config: DuConfig = serde_yaml::from_str(EXAMPLE_YAML).unwrap();
        assert_eq!(config.cell_cfg.pci, 1);
        assert_eq!(config.cell_cfg.common_scs, 30);
        assert_eq!(config.harq_pool.nof_buffers, 64);
        assert_eq!(config.log.all_level, "info");
    }

    #[test]
    fn test_build_cell_configuration() {
        let config: DuConfig = serde_yaml::from_str(EXAMPLE_YAML).unwrap();
        let cell_cfg = build_cell_configuration(&config).unwrap();
        assert_eq!(cell_cfg.pci.0, 1);
        assert_eq!(cell_cfg.dl_bwp.crbs.length(), 24);
        assert_eq!(cell_cfg.scs_common, SubcarrierSpacing::Scs30);
        assert!(matches!(cell_cfg.duplex, DuplexMode::Fdd));
    }

    #[test]
    fn test_invalid_bandwidth_rejected() {
        let mut config: DuConfig = serde_yaml::from_str(EXAMPLE_YAML).unwrap();
        config.cell_cfg.channel_bandwidth_mhz = 7;
        assert!(build_cell_configuration(&config).is_err());
    }
}
