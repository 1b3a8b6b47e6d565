//! Resource Block Intervals
//!
//! Half-open ranges of common and physical resource blocks, and the
//! BWP-relative conversion between the two numbering schemes.

use serde::{Deserialize, Serialize};

/// Half-open interval of Common Resource Blocks [start, stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrbInterval {
    /// First CRB of the interval
    pub start: u16,
    /// One past the last CRB of the interval
    pub stop: u16,
}

/// Half-open interval of Physical Resource Blocks [start, stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrbInterval {
    /// First PRB of the interval
    pub start: u16,
    /// One past the last PRB of the interval
    pub stop: u16,
}

macro_rules! impl_rb_interval {
    ($name:ident) => {
        impl $name {
            /// Create a new interval
            pub fn new(start: u16, stop: u16) -> Self {
                debug_assert!(start <= stop, "invalid interval [{}, {})", start, stop);
                Self { start, stop }
            }

            /// Number of resource blocks in the interval
            pub fn length(&self) -> u16 {
                self.stop - self.start
            }

            /// Check whether the interval is empty
            pub fn is_empty(&self) -> bool {
                self.start == self.stop
            }

            /// Check whether a resource block falls inside the interval
            pub fn contains(&self, rb: u16) -> bool {
                rb >= self.start && rb < self.stop
            }

            /// Check whether two intervals intersect
            pub fn overlaps(&self, other: &$name) -> bool {
                self.start < other.stop && other.start < self.stop
            }

            /// Shrink the interval to the given length, keeping its start
            pub fn resize(&mut self, new_length: u16) {
                debug_assert!(new_length <= self.length());
                self.stop = self.start + new_length;
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "[{}, {})", self.start, self.stop)
            }
        }
    };
}

impl_rb_interval!(CrbInterval);
impl_rb_interval!(PrbInterval);

/// Convert a CRB interval to the PRB numbering of a BWP starting at `bwp_start_crb`.
///
/// The CRB interval must lie inside the BWP.
pub fn crb_to_prb(bwp_start_crb: u16, crbs: CrbInterval) -> PrbInterval {
    debug_assert!(crbs.start >= bwp_start_crb, "CRBs outside the BWP");
    PrbInterval::new(crbs.start - bwp_start_crb, crbs.stop - bwp_start_crb)
}

/// Convert a PRB interval of a BWP starting at `bwp_start_crb` to CRB numbering.
pub fn prb_to_crb(bwp_start_crb: u16, prbs: PrbInterval) -> CrbInterval {
    CrbInterval::new(prbs.start + bwp_start_crb, prbs.stop + bwp_start_crb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_basics() {
        let crbs = CrbInterval::new(4, 10);
        assert_eq!(crbs.length(), 6);
        assert!(crbs.contains(4));
        assert!(!crbs.contains(10));
        assert!(crbs.overlaps(&CrbInterval::new(9, 12)));
        assert!(!crbs.overlaps(&CrbInterval::new(10, 12)));
    }

    #[test]
    fn test_resize() {
        let mut crbs = CrbInterval::new(4, 10);
        crbs.resize(2);
        assert_eq!(crbs, CrbInterval::new(4, 6));
    }

    #[test]
    fn test_crb_prb_round_trip() {
        let bwp_start = 2;
        for start in 2..8 {
            let crbs = CrbInterval::new(start, start + 5);
            let prbs = crb_to_prb(bwp_start, crbs);
            assert_eq!(prb_to_crb(bwp_start, prbs), crbs);
        }
        assert_eq!(
            crb_to_prb(2, CrbInterval::new(2, 7)),
            PrbInterval::new(0, 5)
        );
    }
}
