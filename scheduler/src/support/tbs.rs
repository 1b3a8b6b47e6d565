//! Transport Block Size Calculation
//!
//! TS 38.214, Section 5.1.3.2 for the TBS from an allocation, and the inverse
//! search used to size an allocation for a known payload. Both are fixed 3GPP
//! procedures consumed by the RA scheduler.

use super::mcs::Modulation;

/// TS 38.214 Table 5.1.3.2-1: TBS values for Ninfo <= 3824 bits
const TBS_TABLE: [u32; 93] = [
    24, 32, 40, 48, 56, 64, 72, 80, 88, 96, 104, 112, 120, 128, 136, 144, 152, 160, 168, 176, 184,
    192, 208, 224, 240, 256, 272, 288, 304, 320, 336, 352, 368, 384, 408, 432, 456, 480, 504, 528,
    552, 576, 608, 640, 672, 704, 736, 768, 808, 848, 888, 928, 984, 1032, 1064, 1128, 1160, 1192,
    1224, 1256, 1288, 1320, 1352, 1416, 1480, 1544, 1608, 1672, 1736, 1800, 1864, 1928, 2024,
    2088, 2152, 2216, 2280, 2408, 2472, 2536, 2600, 2664, 2728, 2792, 2856, 2976, 3104, 3240,
    3368, 3496, 3624, 3752, 3824,
];

/// Inputs to the TBS calculation
#[derive(Debug, Clone, Copy)]
pub struct TbsCalculatorConfig {
    /// Number of allocated OFDM symbols
    pub nof_symb_sh: u32,
    /// Number of DM-RS resource elements per PRB over the allocation
    pub nof_dmrs_prb: u32,
    /// Overhead resource elements per PRB (xOverhead; 0 for RA-RNTI/TC-RNTI)
    pub nof_oh_prb: u32,
    /// Target code rate as a fraction
    pub target_code_rate: f32,
    /// Modulation scheme
    pub modulation: Modulation,
    /// Number of transmission layers
    pub nof_layers: u32,
    /// TB scaling field, scaling by 2^-s
    pub tb_scaling_field: u32,
    /// Number of allocated PRBs
    pub nof_prb: u32,
}

/// Calculate the transport block size in bits
pub fn tbs_calculator_calculate(cfg: &TbsCalculatorConfig) -> u32 {
    // Resource elements available for data in one PRB, capped at 156.
    let nof_re_prb = 12 * cfg.nof_symb_sh - cfg.nof_dmrs_prb - cfg.nof_oh_prb;
    let nof_re = nof_re_prb.min(156) * cfg.nof_prb;

    let scaling = 1.0_f32 / (1 << cfg.tb_scaling_field) as f32;
    let n_info = nof_re as f32
        * cfg.target_code_rate
        * cfg.modulation.bits_per_symbol() as f32
        * cfg.nof_layers as f32
        * scaling;

    if n_info <= 3824.0 {
        let n_info = n_info.max(1.0);
        let n = ((n_info.log2().floor() as i32) - 6).max(3) as u32;
        let n_info_prime = ((1 << n) * (n_info as u32 / (1 << n))).max(24);
        // Smallest table entry not below Ninfo'.
        *TBS_TABLE
            .iter()
            .find(|&&tbs| tbs >= n_info_prime)
            .unwrap_or(&3824)
    } else {
        let n = ((n_info - 24.0).log2().floor() as u32) - 5;
        let step = (1u64 << n) as f32;
        let n_info_prime = ((step * ((n_info - 24.0) / step).round()) as u32).max(3840);
        if cfg.target_code_rate <= 0.25 {
            let c = (n_info_prime + 24).div_ceil(3816);
            8 * c * (n_info_prime + 24).div_ceil(8 * c) - 24
        } else if n_info_prime > 8424 {
            let c = (n_info_prime + 24).div_ceil(8424);
            8 * c * (n_info_prime + 24).div_ceil(8 * c) - 24
        } else {
            8 * (n_info_prime + 24).div_ceil(8) - 24
        }
    }
}

/// Number of PRBs and resulting TBS for a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrbsTbs {
    /// Number of PRBs of the allocation
    pub nof_prbs: u16,
    /// Transport block size in bytes
    pub tbs_bytes: u32,
}

/// Find the smallest PRB count whose TBS fits `payload_bytes`.
///
/// Returns `None` when the payload does not fit even at `max_nof_prbs`.
pub fn get_nof_prbs(
    payload_bytes: u32,
    cfg_one_prb: &TbsCalculatorConfig,
    max_nof_prbs: u16,
) -> Option<PrbsTbs> {
    for nof_prbs in 1..=max_nof_prbs {
        let cfg = TbsCalculatorConfig {
            nof_prb: nof_prbs as u32,
            ..*cfg_one_prb
        };
        let tbs_bytes = tbs_calculator_calculate(&cfg) / 8;
        if tbs_bytes >= payload_bytes {
            return Some(PrbsTbs {
                nof_prbs,
                tbs_bytes,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rar_cfg() -> TbsCalculatorConfig {
        TbsCalculatorConfig {
            nof_symb_sh: 12,
            nof_dmrs_prb: 24,
            nof_oh_prb: 0,
            target_code_rate: 120.0 / 1024.0,
            modulation: Modulation::Qpsk,
            nof_layers: 1,
            tb_scaling_field: 0,
            nof_prb: 1,
        }
    }

    #[test]
    fn test_tbs_monotone_in_prbs() {
        let mut prev = 0;
        for nof_prb in 1..20 {
            let tbs = tbs_calculator_calculate(&TbsCalculatorConfig {
                nof_prb,
                ..rar_cfg()
            });
            assert!(tbs >= prev);
            prev = tbs;
        }
    }

    #[test]
    fn test_tbs_quantized_to_table() {
        let tbs = tbs_calculator_calculate(&rar_cfg());
        assert!(TBS_TABLE.contains(&tbs));
    }

    #[test]
    fn test_get_nof_prbs_fits_rar_pdu() {
        // 7-byte RAR payload plus 1-byte subheader.
        let sized = get_nof_prbs(8, &rar_cfg(), 24).unwrap();
        assert!(sized.tbs_bytes >= 8);
        // One PRB fewer must not fit.
        if sized.nof_prbs > 1 {
            let smaller = tbs_calculator_calculate(&TbsCalculatorConfig {
                nof_prb: sized.nof_prbs as u32 - 1,
                ..rar_cfg()
            }) / 8;
            assert!(smaller < 8);
        }
    }

    #[test]
    fn test_get_nof_prbs_too_large_payload() {
        assert!(get_nof_prbs(100_000, &rar_cfg(), 24).is_none());
    }
}
