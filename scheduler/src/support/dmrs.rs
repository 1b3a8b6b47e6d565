//! DM-RS Overhead Derivation
//!
//! Common (pre-RRC) DM-RS symbol placement for PDSCH/PUSCH mapping type A
//! with typeA-Position pos2 and one additional position, per TS 38.211
//! Table 7.4.1.1.2-3. Only the overhead counts feed the TBS math.

use common::types::OfdmSymbolRange;

/// DM-RS placement for one allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmrsInformation {
    /// Bitmask of DM-RS symbol positions within the slot
    pub symbol_mask: u16,
    /// DM-RS resource elements per PRB on each DM-RS symbol
    pub nof_res_per_symbol: u16,
}

impl DmrsInformation {
    /// Number of DM-RS symbols in the allocation
    pub fn nof_symbols(&self) -> u16 {
        self.symbol_mask.count_ones() as u16
    }
}

/// Derive the common DM-RS placement for a mapping-type-A allocation.
///
/// Type-1 configuration, single-symbol DM-RS, two CDM groups without data,
/// first position l0 = 2, dmrs-AdditionalPosition pos1.
pub fn make_dmrs_info_common(symbols: OfdmSymbolRange) -> DmrsInformation {
    let duration = symbols.stop;
    let mut mask = 1u16 << 2;
    // Additional position from the allocation duration (l_d counted from
    // symbol 0 for mapping type A).
    match duration {
        0..=7 => {}
        8..=9 => mask |= 1 << 7,
        10..=12 => mask |= 1 << 9,
        _ => mask |= 1 << 11,
    }
    DmrsInformation {
        symbol_mask: mask,
        // Two CDM groups without data occupy the full PRB on a DM-RS symbol.
        nof_res_per_symbol: 12,
    }
}

/// Total DM-RS resource elements per PRB over the allocation
pub fn calculate_nof_dmrs_per_rb(dmrs: &DmrsInformation) -> u32 {
    dmrs.nof_symbols() as u32 * dmrs.nof_res_per_symbol as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_allocation_single_dmrs() {
        let dmrs = make_dmrs_info_common(OfdmSymbolRange::new(2, 7));
        assert_eq!(dmrs.nof_symbols(), 1);
        assert_eq!(calculate_nof_dmrs_per_rb(&dmrs), 12);
    }

    #[test]
    fn test_full_slot_two_dmrs() {
        let dmrs = make_dmrs_info_common(OfdmSymbolRange::new(2, 14));
        assert_eq!(dmrs.symbol_mask, (1 << 2) | (1 << 11));
        assert_eq!(calculate_nof_dmrs_per_rb(&dmrs), 24);
    }
}
