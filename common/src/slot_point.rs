//! Slot Point Arithmetic
//!
//! Absolute slot indexing modulo the 1024-frame hyper-frame, parameterized by
//! numerology. All scheduler timing (RAR windows, HARQ expiry, DRX deadlines)
//! is expressed with these values.

use crate::types::SubcarrierSpacing;

/// Number of system frames in a hyper-frame
pub const NOF_SFNS: u32 = 1024;

/// Number of subframes per 10 ms frame
pub const NOF_SUBFRAMES_PER_FRAME: u32 = 10;

/// Absolute slot index at a given numerology, wrapping at the hyper-frame.
///
/// Arithmetic adds or subtracts slots within the same numerology; comparisons
/// are modular, so a slot point half a hyper-frame ahead compares greater.
/// Mixing numerologies is a contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotPoint {
    numerology: u8,
    count: u32,
}

impl SlotPoint {
    /// Create a slot point from a numerology and an absolute slot count
    pub fn new(numerology: u8, count: u32) -> Self {
        debug_assert!(numerology <= 4, "invalid numerology {}", numerology);
        let nof_slots = Self::nof_slots_per_hyper_frame(numerology);
        Self {
            numerology,
            count: count % nof_slots,
        }
    }

    /// Create a slot point from a subcarrier spacing and an absolute slot count
    pub fn from_scs(scs: SubcarrierSpacing, count: u32) -> Self {
        Self::new(scs.to_numerology(), count)
    }

    fn nof_slots_per_hyper_frame(numerology: u8) -> u32 {
        NOF_SFNS * NOF_SUBFRAMES_PER_FRAME * (1 << numerology)
    }

    /// Numerology of this slot point
    pub fn numerology(&self) -> u8 {
        self.numerology
    }

    /// Raw slot count within the hyper-frame
    pub fn to_uint(&self) -> u32 {
        self.count
    }

    /// Number of slots per frame at this numerology
    pub fn nof_slots_per_frame(&self) -> u32 {
        NOF_SUBFRAMES_PER_FRAME * (1 << self.numerology)
    }

    /// System frame number, 0..1024
    pub fn sfn(&self) -> u32 {
        self.count / self.nof_slots_per_frame()
    }

    /// Slot index within the current frame
    pub fn slot_index(&self) -> u32 {
        self.count % self.nof_slots_per_frame()
    }

    /// Slot index within the current subframe
    pub fn subframe_slot_index(&self) -> u32 {
        self.count % (1 << self.numerology)
    }

    /// Signed modular distance from `other` to `self` in slots.
    ///
    /// Positive when `self` is ahead of `other` by less than half a
    /// hyper-frame.
    pub fn distance(&self, other: &SlotPoint) -> i32 {
        debug_assert_eq!(
            self.numerology, other.numerology,
            "cross-numerology slot arithmetic"
        );
        let nof_slots = Self::nof_slots_per_hyper_frame(self.numerology) as i64;
        let mut diff = self.count as i64 - other.count as i64;
        if diff >= nof_slots / 2 {
            diff -= nof_slots;
        } else if diff < -nof_slots / 2 {
            diff += nof_slots;
        }
        diff as i32
    }
}

impl std::ops::Add<u32> for SlotPoint {
    type Output = SlotPoint;

    fn add(self, rhs: u32) -> SlotPoint {
        SlotPoint::new(self.numerology, self.count.wrapping_add(rhs))
    }
}

impl std::ops::AddAssign<u32> for SlotPoint {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub<u32> for SlotPoint {
    type Output = SlotPoint;

    fn sub(self, rhs: u32) -> SlotPoint {
        let nof_slots = Self::nof_slots_per_hyper_frame(self.numerology);
        SlotPoint::new(self.numerology, (self.count + nof_slots - rhs % nof_slots) % nof_slots)
    }
}

impl PartialOrd for SlotPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.distance(other).cmp(&0))
    }
}

impl std::fmt::Display for SlotPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.sfn(), self.slot_index())
    }
}

/// Half-open window of slot points [start, stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    /// First slot of the window
    pub start: SlotPoint,
    /// One past the last slot of the window
    pub stop: SlotPoint,
}

impl SlotWindow {
    /// Create a new slot window
    pub fn new(start: SlotPoint, stop: SlotPoint) -> Self {
        Self { start, stop }
    }

    /// Check whether a slot point falls inside the window
    pub fn contains(&self, slot: SlotPoint) -> bool {
        slot >= self.start && slot < self.stop
    }

    /// Number of slots in the window
    pub fn length(&self) -> u32 {
        self.stop.distance(&self.start).max(0) as u32
    }
}

impl std::fmt::Display for SlotWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}
