//! HARQ Transmit Buffer Pool
//!
//! Identifier-keyed pool of codeblock buffers with slot-based expiry.
//! Identifiers and expirations live in parallel dense arrays touched only by
//! the scheduler thread; the per-buffer lock bit is the single piece of
//! cross-thread state, held by the encoder through a move-only handle while
//! it produces codeblocks.

use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Identifier of a buffer reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxBufferIdentifier {
    /// Free buffer
    Invalid,
    /// Anonymous reservation (system information); released on unlock
    Unknown,
    /// Reservation tied to one HARQ process
    Tagged {
        /// RNTI of the transmission
        rnti: Rnti,
        /// HARQ process identifier
        harq_id: u8,
        /// True for a DL process, false for UL
        is_dl: bool,
    },
}

impl std::fmt::Display for TxBufferIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxBufferIdentifier::Invalid => write!(f, "invalid"),
            TxBufferIdentifier::Unknown => write!(f, "unknown"),
            TxBufferIdentifier::Tagged {
                rnti,
                harq_id,
                is_dl,
            } => write!(
                f,
                "rnti={} h_id={} {}",
                rnti,
                harq_id,
                if *is_dl { "dl" } else { "ul" }
            ),
        }
    }
}

/// Buffer pool configuration, persisted for the pool lifetime
#[derive(Debug, Clone, Copy)]
pub struct TxBufferPoolConfig {
    /// Maximum size of one codeblock in bytes
    pub max_codeblock_size: usize,
    /// Number of buffers in the pool
    pub nof_buffers: usize,
    /// Codeblock budget shared by all buffers
    pub nof_codeblocks: usize,
    /// Reservation lifetime in slots
    pub expire_timeout_slots: u32,
    /// True when soft bits are stored outside the pool
    pub external_soft_bits: bool,
}

/// Cross-thread state: one lock bit per buffer plus the stop flag
struct PoolShared {
    stopped: AtomicBool,
    locks: Vec<AtomicBool>,
}

/// Move-only exclusive handle over a reserved buffer.
///
/// Dropping the handle clears the lock bit; an invalid handle represents a
/// failed reservation.
pub struct UniqueTxBuffer {
    shared: Option<Arc<PoolShared>>,
    index: usize,
    nof_codeblocks: usize,
}

impl UniqueTxBuffer {
    /// Handle representing a failed reservation
    pub fn invalid() -> Self {
        Self {
            shared: None,
            index: 0,
            nof_codeblocks: 0,
        }
    }

    /// Check whether the reservation succeeded
    pub fn is_valid(&self) -> bool {
        self.shared.is_some()
    }

    /// Pool index of the reserved buffer
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of codeblocks reserved
    pub fn nof_codeblocks(&self) -> usize {
        self.nof_codeblocks
    }

    /// Unlock the buffer explicitly
    pub fn release(self) {}
}

impl Drop for UniqueTxBuffer {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.locks[self.index].store(false, Ordering::Release);
        }
    }
}

/// Identifier-keyed transmit buffer pool.
///
/// `reserve` and `run_slot` must be called from the scheduler thread; the
/// returned handles may travel to the encoder thread.
pub struct TxBufferPool {
    config: TxBufferPoolConfig,
    identifiers: Vec<TxBufferIdentifier>,
    expirations: Vec<Option<SlotPoint>>,
    nof_codeblocks: Vec<usize>,
    codeblocks_in_use: usize,
    shared: Arc<PoolShared>,
}

impl TxBufferPool {
    /// Create the pool with all buffers free
    pub fn new(config: TxBufferPoolConfig) -> Self {
        let nof_buffers = config.nof_buffers;
        Self {
            config,
            identifiers: vec![TxBufferIdentifier::Invalid; nof_buffers],
            expirations: vec![None; nof_buffers],
            nof_codeblocks: vec![0; nof_buffers],
            codeblocks_in_use: 0,
            shared: Arc::new(PoolShared {
                stopped: AtomicBool::new(false),
                locks: (0..nof_buffers).map(|_| AtomicBool::new(false)).collect(),
            }),
        }
    }

    /// Reserve a buffer for the given identifier.
    ///
    /// Retransmissions (`new_data == false`) must find an existing
    /// reservation with the same identifier and codeblock count.
    pub fn reserve(
        &mut self,
        slot: SlotPoint,
        id: TxBufferIdentifier,
        nof_codeblocks: usize,
        new_data: bool,
    ) -> UniqueTxBuffer {
        debug_assert!(matches!(id, TxBufferIdentifier::Tagged { .. }));
        if self.shared.stopped.load(Ordering::Acquire) {
            return UniqueTxBuffer::invalid();
        }

        // Prefer the buffer already holding this identifier; fall back to a
        // free one only for new data.
        let mut index = self.identifiers.iter().position(|other| *other == id);
        if index.is_none() {
            if new_data {
                index = self
                    .identifiers
                    .iter()
                    .position(|other| *other == TxBufferIdentifier::Invalid);
            } else {
                warn!(
                    "HARQ {}: failed to reserve at slot {}, identifier for retransmissions not found",
                    id, slot
                );
                return UniqueTxBuffer::invalid();
            }
        }
        let Some(index) = index else {
            warn!(
                "HARQ {}: failed to reserve at slot {}, insufficient buffers in the pool",
                id, slot
            );
            return UniqueTxBuffer::invalid();
        };

        if !new_data && nof_codeblocks != self.nof_codeblocks[index] {
            warn!(
                "HARQ {}: failed to reserve at slot {}, number of codeblocks for retransmissions do not match ({} != {})",
                id, slot, nof_codeblocks, self.nof_codeblocks[index]
            );
            return UniqueTxBuffer::invalid();
        }

        self.take_buffer(slot, index, id, nof_codeblocks)
    }

    /// Reserve a buffer without an identifier (system information).
    ///
    /// The occupancy is released automatically once the handle is dropped and
    /// the next `run_slot` runs.
    pub fn reserve_anonymous(&mut self, slot: SlotPoint, nof_codeblocks: usize) -> UniqueTxBuffer {
        if self.shared.stopped.load(Ordering::Acquire) {
            return UniqueTxBuffer::invalid();
        }
        let Some(index) = self
            .identifiers
            .iter()
            .position(|other| *other == TxBufferIdentifier::Invalid)
        else {
            warn!(
                "HARQ unknown: failed to reserve at slot {}, insufficient buffers in the pool",
                slot
            );
            return UniqueTxBuffer::invalid();
        };
        self.take_buffer(slot, index, TxBufferIdentifier::Unknown, nof_codeblocks)
    }

    fn take_buffer(
        &mut self,
        slot: SlotPoint,
        index: usize,
        id: TxBufferIdentifier,
        nof_codeblocks: usize,
    ) -> UniqueTxBuffer {
        // Codeblock budget over the whole pool; a renewed reservation first
        // returns what it held.
        let freed = self.nof_codeblocks[index];
        if self.codeblocks_in_use - freed + nof_codeblocks > self.config.nof_codeblocks {
            warn!(
                "HARQ {}: failed to reserve at slot {}, insufficient CBs",
                id, slot
            );
            return UniqueTxBuffer::invalid();
        }

        if self.shared.locks[index]
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            warn!(
                "HARQ {}: failed to reserve at slot {}, HARQ already in use",
                id, slot
            );
            return UniqueTxBuffer::invalid();
        }

        self.codeblocks_in_use = self.codeblocks_in_use - freed + nof_codeblocks;
        self.identifiers[index] = id;
        self.expirations[index] = Some(slot + self.config.expire_timeout_slots);
        self.nof_codeblocks[index] = nof_codeblocks;

        UniqueTxBuffer {
            shared: Some(self.shared.clone()),
            index,
            nof_codeblocks,
        }
    }

    /// Release expired buffers. A buffer still locked at its expiration gets
    /// its deadline extended by the expiry timeout instead.
    pub fn run_slot(&mut self, slot: SlotPoint) {
        for index in 0..self.identifiers.len() {
            if self.identifiers[index] == TxBufferIdentifier::Invalid {
                continue;
            }
            let locked = self.shared.locks[index].load(Ordering::Acquire);

            // Anonymous reservations free themselves on unlock.
            let mut is_free = self.identifiers[index] == TxBufferIdentifier::Unknown && !locked;

            if let Some(expiration) = self.expirations[index] {
                if expiration <= slot {
                    if locked {
                        self.expirations[index] = Some(slot + self.config.expire_timeout_slots);
                    } else {
                        is_free = true;
                    }
                }
            }

            if is_free {
                self.codeblocks_in_use -= self.nof_codeblocks[index];
                self.identifiers[index] = TxBufferIdentifier::Invalid;
                self.expirations[index] = None;
                self.nof_codeblocks[index] = 0;
            }
        }
    }

    /// Teardown barrier: refuse new reservations and wait until every handle
    /// has been dropped, then release all reservations.
    pub fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
        for lock in self.shared.locks.iter() {
            while lock.load(Ordering::Acquire) {
                std::thread::sleep(std::time::Duration::from_micros(10));
            }
        }
        for index in 0..self.identifiers.len() {
            self.identifiers[index] = TxBufferIdentifier::Invalid;
            self.expirations[index] = None;
            self.nof_codeblocks[index] = 0;
        }
        self.codeblocks_in_use = 0;
    }

    /// Identifier currently held by a buffer; used by tests and telemetry
    pub fn identifier(&self, index: usize) -> TxBufferIdentifier {
        self.identifiers[index]
    }
}

/// LDPC segmentation: number of codeblocks needed for a transport block.
///
/// Base graph 1 limit of 8448 bits per codeblock, 24-bit CRCs.
pub fn nof_codeblocks_from_tbs(tbs_bytes: u32) -> usize {
    const MAX_CB_SIZE_BITS: u32 = 8448;
    const CRC_BITS: u32 = 24;
    let payload_bits = tbs_bytes * 8 + CRC_BITS;
    if payload_bits <= MAX_CB_SIZE_BITS {
        1
    } else {
        payload_bits.div_ceil(MAX_CB_SIZE_BITS - CRC_BITS) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_config() -> TxBufferPoolConfig {
        TxBufferPoolConfig {
            max_codeblock_size: 8448 / 8,
            nof_buffers: 4,
            nof_codeblocks: 8,
            expire_timeout_slots: 10,
            external_soft_bits: false,
        }
    }

    fn tagged(rnti: u16, harq_id: u8) -> TxBufferIdentifier {
        TxBufferIdentifier::Tagged {
            rnti: Rnti(rnti),
            harq_id,
            is_dl: false,
        }
    }

    #[test]
    fn test_reserve_and_release() {
        let mut pool = TxBufferPool::new(pool_config());
        let slot = SlotPoint::new(1, 0);

        let buffer = pool.reserve(slot, tagged(0x4601, 1), 2, true);
        assert!(buffer.is_valid());
        assert_eq!(buffer.nof_codeblocks(), 2);
        let index = buffer.index();
        assert_eq!(pool.identifier(index), tagged(0x4601, 1));

        // While locked, a reservation for the same identifier fails.
        let dup = pool.reserve(slot, tagged(0x4601, 1), 2, true);
        assert!(!dup.is_valid());

        drop(buffer);
        // Identified buffers survive the unlock until expiry.
        pool.run_slot(slot + 1);
        assert_eq!(pool.identifier(index), tagged(0x4601, 1));
    }

    #[test]
    fn test_retx_requires_existing_identifier() {
        let mut pool = TxBufferPool::new(pool_config());
        let slot = SlotPoint::new(1, 0);
        assert!(!pool.reserve(slot, tagged(0x4601, 1), 2, false).is_valid());

        pool.reserve(slot, tagged(0x4601, 1), 2, true).release();
        // Retransmission with the same codeblock count succeeds.
        assert!(pool.reserve(slot + 4, tagged(0x4601, 1), 2, false).is_valid());
        // Different codeblock count fails.
        assert!(!pool.reserve(slot + 8, tagged(0x4601, 1), 3, false).is_valid());
    }

    #[test]
    fn test_expiry_boundary() {
        let mut pool = TxBufferPool::new(pool_config());
        let slot = SlotPoint::new(1, 0);
        let buffer = pool.reserve(slot, tagged(0x4601, 1), 1, true);
        let index = buffer.index();
        drop(buffer);

        // One slot before the deadline the reservation survives.
        pool.run_slot(slot + 9);
        assert_eq!(pool.identifier(index), tagged(0x4601, 1));
        // On the deadline slot it is released.
        pool.run_slot(slot + 10);
        assert_eq!(pool.identifier(index), TxBufferIdentifier::Invalid);
    }

    #[test]
    fn test_locked_buffer_extends_expiry() {
        let mut pool = TxBufferPool::new(pool_config());
        let slot = SlotPoint::new(1, 0);
        let buffer = pool.reserve(slot, tagged(0x4601, 1), 1, true);
        let index = buffer.index();

        pool.run_slot(slot + 10);
        assert_eq!(pool.identifier(index), tagged(0x4601, 1));
        drop(buffer);
        // Deadline was pushed to slot+20; it is still alive just before it.
        pool.run_slot(slot + 19);
        assert_eq!(pool.identifier(index), tagged(0x4601, 1));
        pool.run_slot(slot + 20);
        assert_eq!(pool.identifier(index), TxBufferIdentifier::Invalid);
    }

    #[test]
    fn test_anonymous_released_on_unlock() {
        let mut pool = TxBufferPool::new(pool_config());
        let slot = SlotPoint::new(1, 0);
        let buffer = pool.reserve_anonymous(slot, 3);
        assert!(buffer.is_valid());
        let index = buffer.index();

        pool.run_slot(slot + 1);
        assert_eq!(pool.identifier(index), TxBufferIdentifier::Unknown);
        drop(buffer);
        pool.run_slot(slot + 2);
        assert_eq!(pool.identifier(index), TxBufferIdentifier::Invalid);
    }

    #[test]
    fn test_codeblock_budget() {
        let mut pool = TxBufferPool::new(pool_config());
        let slot = SlotPoint::new(1, 0);
        let first = pool.reserve(slot, tagged(0x4601, 1), 6, true);
        assert!(first.is_valid());
        // Eight codeblocks total; six are taken.
        assert!(!pool.reserve(slot, tagged(0x4602, 1), 3, true).is_valid());
        assert!(pool.reserve(slot, tagged(0x4603, 1), 2, true).is_valid());
    }

    #[test]
    fn test_stop_waits_for_lock() {
        let mut pool = TxBufferPool::new(pool_config());
        let slot = SlotPoint::new(1, 0);
        let buffer = pool.reserve(slot, tagged(0x4601, 1), 1, true);
        assert!(buffer.is_valid());

        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_micros(50));
            drop(buffer);
        });

        pool.stop();
        handle.join().unwrap();

        // After stop every identifier is invalid and reservations fail.
        for index in 0..pool_config().nof_buffers {
            assert_eq!(pool.identifier(index), TxBufferIdentifier::Invalid);
        }
        assert!(!pool.reserve(slot, tagged(0x4601, 1), 1, true).is_valid());
        assert!(!pool.reserve_anonymous(slot, 1).is_valid());
    }

    #[test]
    fn test_nof_codeblocks_from_tbs() {
        assert_eq!(nof_codeblocks_from_tbs(11), 1);
        assert_eq!(nof_codeblocks_from_tbs(1053), 1);
        assert_eq!(nof_codeblocks_from_tbs(1054), 2);
    }
}
