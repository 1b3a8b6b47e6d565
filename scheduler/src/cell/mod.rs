//! Cell Resources
//!
//! Per-slot DL/UL resource grids and the rolling ring of future slot
//! allocations shared by all scheduler components of a cell.

pub mod resource_allocator;
pub mod resource_grid;

pub use resource_allocator::{CellResourceAllocator, SlotAllocation};
pub use resource_grid::{CrbBitmap, GrantInfo, SlotResourceGrid};
