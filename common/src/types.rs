//! Common Types for the 5G DU Scheduler
//!
//! Defines fundamental identifiers and radio parameters used throughout the scheduler.

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// SI-RNTI used for system information scheduling
    pub const SI_RNTI: Self = Self(0xFFFF);

    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for Rnti {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId(pub u16);

/// Physical Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pci(pub u16);

impl Pci {
    /// Maximum valid PCI value (0-1007)
    pub const MAX: u16 = 1007;

    /// Create a new PCI with validation
    pub fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// Get the numerology value mu, with SCS = 15 kHz * 2^mu
    pub fn to_numerology(&self) -> u8 {
        match self {
            SubcarrierSpacing::Scs15 => 0,
            SubcarrierSpacing::Scs30 => 1,
            SubcarrierSpacing::Scs60 => 2,
            SubcarrierSpacing::Scs120 => 3,
            SubcarrierSpacing::Scs240 => 4,
        }
    }

    /// Build a subcarrier spacing from the numerology value mu
    pub fn from_numerology(mu: u8) -> Option<Self> {
        match mu {
            0 => Some(SubcarrierSpacing::Scs15),
            1 => Some(SubcarrierSpacing::Scs30),
            2 => Some(SubcarrierSpacing::Scs60),
            3 => Some(SubcarrierSpacing::Scs120),
            4 => Some(SubcarrierSpacing::Scs240),
            _ => None,
        }
    }

    /// Number of slots per 1 ms subframe
    pub fn slots_per_subframe(&self) -> u32 {
        1 << self.to_numerology()
    }

    /// Number of slots per 10 ms frame
    pub fn slots_per_frame(&self) -> u32 {
        10 * self.slots_per_subframe()
    }
}

/// TDD DL/UL slot pattern over one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddPattern {
    /// Period of the pattern in slots
    pub period_slots: u32,
    /// Number of leading full-DL slots in the period
    pub dl_slots: u32,
    /// Number of trailing full-UL slots in the period
    pub ul_slots: u32,
}

/// Duplex mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplexMode {
    /// Frequency Division Duplex
    Fdd,
    /// Time Division Duplex with a DL/UL slot pattern
    Tdd(TddPattern),
}

/// OFDM symbol range within a slot, half-open [start, stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfdmSymbolRange {
    /// First symbol index
    pub start: u8,
    /// One past the last symbol index
    pub stop: u8,
}

impl OfdmSymbolRange {
    /// Number of OFDM symbols per slot with normal cyclic prefix
    pub const SYMBOLS_PER_SLOT: u8 = 14;

    /// Create a new symbol range
    pub fn new(start: u8, stop: u8) -> Self {
        debug_assert!(start <= stop && stop <= Self::SYMBOLS_PER_SLOT);
        Self { start, stop }
    }

    /// Number of symbols in the range
    pub fn length(&self) -> u8 {
        self.stop - self.start
    }

    /// Check whether two symbol ranges intersect
    pub fn overlaps(&self, other: &OfdmSymbolRange) -> bool {
        self.start < other.stop && other.start < self.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pci_validation() {
        assert!(Pci::new(0).is_some());
        assert!(Pci::new(1007).is_some());
        assert!(Pci::new(1008).is_none());
    }

    #[test]
    fn test_scs_numerology() {
        assert_eq!(SubcarrierSpacing::Scs15.to_numerology(), 0);
        assert_eq!(SubcarrierSpacing::Scs30.to_numerology(), 1);
        assert_eq!(SubcarrierSpacing::Scs30.slots_per_subframe(), 2);
        assert_eq!(SubcarrierSpacing::Scs120.slots_per_frame(), 80);
        assert_eq!(
            SubcarrierSpacing::from_numerology(1),
            Some(SubcarrierSpacing::Scs30)
        );
        assert_eq!(SubcarrierSpacing::from_numerology(5), None);
    }

    #[test]
    fn test_symbol_range_overlap() {
        let a = OfdmSymbolRange::new(0, 3);
        let b = OfdmSymbolRange::new(2, 14);
        let c = OfdmSymbolRange::new(3, 7);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert_eq!(a.length(), 3);
    }
}
