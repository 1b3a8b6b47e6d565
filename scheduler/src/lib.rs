//! 5G NR Layer-2 Slot Scheduler
//!
//! This crate implements the per-cell downlink/uplink slot scheduler of a gNB
//! Distributed Unit: the rolling resource-grid allocator, PDCCH and PUCCH
//! resource allocation, the Random-Access scheduler, the HARQ transmit buffer
//! pool, per-UE DRX gating, and the slot orchestrator that ties them together.
//!
//! The scheduler is single-writer per cell: one thread calls
//! [`orchestrator::CellScheduler::run_slot`] once per slot boundary, and all
//! external indications (RACH, CRC, SR) are queued and drained at the start of
//! the tick. Resource shortages are soft failures that retry naturally on the
//! next slot; only configuration errors at cell creation are fatal.

pub mod broadcast;
pub mod cell;
pub mod config;
pub mod drx;
pub mod harq;
pub mod orchestrator;
pub mod pdcch;
pub mod pucch;
pub mod ra;
pub mod rar_pdu;
pub mod result;
pub mod support;
pub mod ue;

use thiserror::Error;

/// Errors raised while building or operating a cell scheduler.
///
/// Transient resource shortages are not represented here; allocation paths
/// return `None`/`0` and retry on the next slot.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}
