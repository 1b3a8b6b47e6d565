//! MCS Table Lookups
//!
//! Modulation and target code rate per MCS index, from 3GPP TS 38.214
//! Table 5.1.3.1-1 (qam64). The scheduler treats these as fixed inputs.

/// Modulation scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    /// QPSK, 2 bits per symbol
    Qpsk,
    /// 16-QAM, 4 bits per symbol
    Qam16,
    /// 64-QAM, 6 bits per symbol
    Qam64,
}

impl Modulation {
    /// Number of bits carried per modulation symbol
    pub fn bits_per_symbol(&self) -> u32 {
        match self {
            Modulation::Qpsk => 2,
            Modulation::Qam16 => 4,
            Modulation::Qam64 => 6,
        }
    }
}

/// Modulation and coding configuration for one MCS index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McsConfig {
    /// Modulation scheme
    pub modulation: Modulation,
    /// Target code rate multiplied by 1024
    pub target_code_rate: u16,
}

impl McsConfig {
    /// Target code rate as a fraction
    pub fn code_rate(&self) -> f32 {
        self.target_code_rate as f32 / 1024.0
    }
}

/// 3GPP TS 38.214 Table 5.1.3.1-1, MCS index table 1 for PDSCH (qam64)
const MCS_TABLE_QAM64: [(u8, u16); 29] = [
    (2, 120),
    (2, 157),
    (2, 193),
    (2, 251),
    (2, 308),
    (2, 379),
    (2, 449),
    (2, 526),
    (2, 602),
    (2, 679),
    (4, 340),
    (4, 378),
    (4, 434),
    (4, 490),
    (4, 553),
    (4, 616),
    (4, 658),
    (6, 438),
    (6, 466),
    (6, 517),
    (6, 567),
    (6, 616),
    (6, 666),
    (6, 719),
    (6, 772),
    (6, 822),
    (6, 873),
    (6, 910),
    (6, 948),
];

fn qam_from_bits(bits: u8) -> Modulation {
    match bits {
        2 => Modulation::Qpsk,
        4 => Modulation::Qam16,
        _ => Modulation::Qam64,
    }
}

/// Get the PDSCH MCS configuration for an index of the qam64 table
pub fn pdsch_mcs_get_config(mcs_index: u8) -> McsConfig {
    let (bits, tcr) = MCS_TABLE_QAM64[mcs_index as usize];
    McsConfig {
        modulation: qam_from_bits(bits),
        target_code_rate: tcr,
    }
}

/// Get the PUSCH MCS configuration for an index of the qam64 table.
///
/// With transform precoding disabled the PUSCH table matches the PDSCH one.
pub fn pusch_mcs_get_config(mcs_index: u8, _transform_precoding: bool) -> McsConfig {
    pdsch_mcs_get_config(mcs_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcs0_is_qpsk() {
        let mcs = pdsch_mcs_get_config(0);
        assert_eq!(mcs.modulation, Modulation::Qpsk);
        assert_eq!(mcs.target_code_rate, 120);
    }

    #[test]
    fn test_table_monotone_code_rate_within_modulation() {
        for i in 1..9 {
            assert!(
                pdsch_mcs_get_config(i).target_code_rate
                    > pdsch_mcs_get_config(i - 1).target_code_rate
            );
        }
        assert_eq!(pdsch_mcs_get_config(28).modulation, Modulation::Qam64);
    }
}
