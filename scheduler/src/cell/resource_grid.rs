//! Slot Resource Grid
//!
//! Used/free accounting of CRBs per OFDM symbol for one slot. Committed
//! grants are durable until the owning slot is advanced past; there is no
//! rollback, so callers check `collides` before `fill`.

use common::interval::CrbInterval;
use common::types::{OfdmSymbolRange, SubcarrierSpacing};

/// Largest CRB count of any NR carrier (100 MHz at 30 kHz SCS)
pub const MAX_NOF_CRBS: u16 = 275;

const NOF_WORDS: usize = (MAX_NOF_CRBS as usize + 63) / 64;

/// One scheduled allocation in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantInfo {
    /// Subcarrier spacing of the allocation
    pub scs: SubcarrierSpacing,
    /// OFDM symbols spanned by the allocation
    pub symbols: OfdmSymbolRange,
    /// CRBs spanned by the allocation
    pub crbs: CrbInterval,
}

/// Fixed-capacity bitmap over the CRBs of a carrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrbBitmap {
    words: [u64; NOF_WORDS],
    len: u16,
}

impl CrbBitmap {
    /// Create an all-free bitmap covering `len` CRBs
    pub fn new(len: u16) -> Self {
        debug_assert!(len <= MAX_NOF_CRBS);
        Self {
            words: [0; NOF_WORDS],
            len,
        }
    }

    /// Number of CRBs covered
    pub fn len(&self) -> u16 {
        self.len
    }

    /// Test one CRB
    pub fn test(&self, crb: u16) -> bool {
        debug_assert!(crb < self.len);
        self.words[crb as usize / 64] & (1u64 << (crb % 64)) != 0
    }

    /// Mark a CRB range as used
    pub fn fill(&mut self, crbs: CrbInterval) {
        debug_assert!(crbs.stop <= self.len);
        for crb in crbs.start..crbs.stop {
            self.words[crb as usize / 64] |= 1u64 << (crb % 64);
        }
    }

    /// Check whether any CRB of the range is used
    pub fn any_in_range(&self, crbs: CrbInterval) -> bool {
        (crbs.start..crbs.stop).any(|crb| self.test(crb))
    }

    /// Accumulate another bitmap of the same length
    pub fn or_with(&mut self, other: &CrbBitmap) {
        debug_assert_eq!(self.len, other.len);
        for (word, other_word) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= other_word;
        }
    }

    /// Clear all bits
    pub fn reset(&mut self) {
        self.words = [0; NOF_WORDS];
    }
}

/// Find a free interval in the bitmap, preferring the first gap that fits
/// `nof_crbs` starting at or after `start_crb`.
///
/// When no gap fits, the largest gap found is returned instead (possibly
/// empty); callers shrink their allocation to what fits.
pub fn find_empty_interval_of_length(
    used: &CrbBitmap,
    nof_crbs: u16,
    start_crb: u16,
) -> CrbInterval {
    let mut largest = CrbInterval::default();
    let mut gap_start = None;
    for crb in start_crb..=used.len() {
        let occupied = crb == used.len() || used.test(crb);
        match (gap_start, occupied) {
            (None, false) => gap_start = Some(crb),
            (Some(start), true) => {
                let gap = CrbInterval::new(start, crb);
                if gap.length() >= nof_crbs {
                    return CrbInterval::new(start, start + nof_crbs);
                }
                if gap.length() > largest.length() {
                    largest = gap;
                }
                gap_start = None;
            }
            _ => {}
        }
    }
    largest
}

/// Used/free CRB state per OFDM symbol for one slot
#[derive(Debug, Clone)]
pub struct SlotResourceGrid {
    nof_crbs: u16,
    symbols: [CrbBitmap; OfdmSymbolRange::SYMBOLS_PER_SLOT as usize],
}

impl SlotResourceGrid {
    /// Create an empty grid over `nof_crbs` CRBs
    pub fn new(nof_crbs: u16) -> Self {
        Self {
            nof_crbs,
            symbols: [CrbBitmap::new(nof_crbs); OfdmSymbolRange::SYMBOLS_PER_SLOT as usize],
        }
    }

    /// Number of CRBs covered by the grid
    pub fn nof_crbs(&self) -> u16 {
        self.nof_crbs
    }

    /// Mark the grant region as used
    pub fn fill(&mut self, grant: &GrantInfo) {
        debug_assert!(grant.crbs.stop <= self.nof_crbs);
        for symbol in grant.symbols.start..grant.symbols.stop {
            self.symbols[symbol as usize].fill(grant.crbs);
        }
    }

    /// Check whether the grant overlaps any committed allocation
    pub fn collides(&self, grant: &GrantInfo) -> bool {
        (grant.symbols.start..grant.symbols.stop)
            .any(|symbol| self.symbols[symbol as usize].any_in_range(grant.crbs))
    }

    /// Bitmap of CRBs used on any of the given symbols, with CRBs outside
    /// `bwp_crbs` reported as used so searches stay inside the BWP.
    pub fn used_crbs(&self, bwp_crbs: CrbInterval, symbols: OfdmSymbolRange) -> CrbBitmap {
        let mut used = CrbBitmap::new(self.nof_crbs);
        for symbol in symbols.start..symbols.stop {
            used.or_with(&self.symbols[symbol as usize]);
        }
        if bwp_crbs.start > 0 {
            used.fill(CrbInterval::new(0, bwp_crbs.start));
        }
        if bwp_crbs.stop < self.nof_crbs {
            used.fill(CrbInterval::new(bwp_crbs.stop, self.nof_crbs));
        }
        used
    }

    /// Clear all allocations
    pub fn reset(&mut self) {
        for bitmap in self.symbols.iter_mut() {
            bitmap.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::SubcarrierSpacing;

    fn grant(sym_start: u8, sym_stop: u8, crb_start: u16, crb_stop: u16) -> GrantInfo {
        GrantInfo {
            scs: SubcarrierSpacing::Scs30,
            symbols: OfdmSymbolRange::new(sym_start, sym_stop),
            crbs: CrbInterval::new(crb_start, crb_stop),
        }
    }

    #[test]
    fn test_fill_then_collides() {
        let mut grid = SlotResourceGrid::new(24);
        let g = grant(2, 14, 4, 10);
        assert!(!grid.collides(&g));
        grid.fill(&g);
        assert!(grid.collides(&g));
        // Any overlap in both dimensions collides.
        assert!(grid.collides(&grant(13, 14, 9, 12)));
        // Disjoint symbols or disjoint CRBs do not.
        assert!(!grid.collides(&grant(0, 2, 4, 10)));
        assert!(!grid.collides(&grant(2, 14, 10, 14)));
    }

    #[test]
    fn test_used_crbs_masks_outside_bwp() {
        let grid = SlotResourceGrid::new(24);
        let used = grid.used_crbs(CrbInterval::new(2, 20), OfdmSymbolRange::new(0, 14));
        assert!(used.test(0));
        assert!(used.test(1));
        assert!(!used.test(2));
        assert!(!used.test(19));
        assert!(used.test(20));
    }

    #[test]
    fn test_find_empty_interval() {
        let mut used = CrbBitmap::new(24);
        used.fill(CrbInterval::new(0, 4));
        used.fill(CrbInterval::new(10, 12));

        // First fitting gap wins and is truncated to the requested length.
        assert_eq!(
            find_empty_interval_of_length(&used, 3, 0),
            CrbInterval::new(4, 7)
        );
        // A request larger than any gap returns the largest gap.
        assert_eq!(
            find_empty_interval_of_length(&used, 20, 0),
            CrbInterval::new(12, 24)
        );
        // Start hint skips earlier gaps.
        assert_eq!(
            find_empty_interval_of_length(&used, 3, 10),
            CrbInterval::new(12, 15)
        );
    }

    #[test]
    fn test_find_empty_interval_full_bitmap() {
        let mut used = CrbBitmap::new(8);
        used.fill(CrbInterval::new(0, 8));
        assert!(find_empty_interval_of_length(&used, 1, 0).is_empty());
    }
}
