//! Scheduler Slot Result
//!
//! Per-slot output handed to the lower PHY: PDCCH, PDSCH, RAR, PUSCH, PUCCH
//! and common-signal descriptors. Every list is capacity-bounded; allocators
//! check capacity before committing, so the PHY always receives a well-formed
//! (possibly empty) result.

use crate::support::dmrs::DmrsInformation;
use crate::support::mcs::Modulation;
use common::interval::{CrbInterval, PrbInterval};
use common::types::{OfdmSymbolRange, Rnti};

/// Capacity of the DL PDCCH list
pub const MAX_DL_PDCCHS_PER_SLOT: usize = 16;
/// Capacity of the UL PDCCH list
pub const MAX_UL_PDCCHS_PER_SLOT: usize = 16;
/// Capacity of the RAR list
pub const MAX_RAR_PDUS_PER_SLOT: usize = 8;
/// Capacity of Msg3 grants carried by one RAR
pub const MAX_GRANTS_PER_RAR: usize = 16;
/// Capacity of the PDSCH list
pub const MAX_PDSCHS_PER_SLOT: usize = 16;
/// Capacity of the PUSCH list
pub const MAX_PUSCHS_PER_SLOT: usize = 16;
/// Capacity of the PUCCH list
pub const MAX_PUCCHS_PER_SLOT: usize = 16;
/// Capacity of the SSB list
pub const MAX_SSBS_PER_SLOT: usize = 2;
/// Capacity of the CSI-RS list
pub const MAX_CSI_RS_PER_SLOT: usize = 4;
/// Capacity of the SRS list
pub const MAX_SRS_PER_SLOT: usize = 4;

/// Vector with a fixed capacity reserved at creation.
///
/// Pushing beyond capacity is a soft failure: `push` reports it and the
/// caller backs off, retrying on a later slot.
#[derive(Debug, Clone)]
pub struct BoundedVec<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> BoundedVec<T> {
    /// Create an empty list with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Check whether the list is at capacity
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Remaining capacity
    pub fn capacity_left(&self) -> usize {
        self.capacity - self.items.len()
    }

    /// Append an item; returns false and drops it when full
    pub fn push(&mut self, item: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Mutable access to the last item
    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut()
    }

    /// Remove every item matching the predicate
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, f: F) {
        self.items.retain(f);
    }

    /// Clear the list, keeping its capacity
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> std::ops::Deref for BoundedVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> std::ops::DerefMut for BoundedVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

/// PDCCH aggregation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationLevel {
    /// 1 CCE
    N1,
    /// 2 CCEs
    N2,
    /// 4 CCEs
    N4,
    /// 8 CCEs
    N8,
    /// 16 CCEs
    N16,
}

impl AggregationLevel {
    /// Number of CCEs for this aggregation level
    pub fn nof_cces(&self) -> u16 {
        match self {
            AggregationLevel::N1 => 1,
            AggregationLevel::N2 => 2,
            AggregationLevel::N4 => 4,
            AggregationLevel::N8 => 8,
            AggregationLevel::N16 => 16,
        }
    }
}

/// Allocation context shared by DL and UL PDCCHs
#[derive(Debug, Clone, Copy)]
pub struct PdcchContext {
    /// RNTI scrambling the DCI CRC
    pub rnti: Rnti,
    /// Search space the candidate belongs to
    pub search_space_id: u8,
    /// CORESET carrying the candidate
    pub coreset_id: u8,
    /// Aggregation level of the candidate
    pub aggregation_level: AggregationLevel,
    /// First CCE of the candidate
    pub cce_index: u16,
}

/// DCI format 1_0 payload fields common to the SI/RA fallback formats
#[derive(Debug, Clone, Copy, Default)]
pub struct Dci1_0 {
    /// Size of the DL BWP in RBs for frequency-resource encoding
    pub n_rb_dl_bwp: u16,
    /// Type-1 frequency-domain resource (RIV)
    pub frequency_resource: u32,
    /// PDSCH time-domain resource index
    pub time_resource: u8,
    /// VRB-to-PRB mapping flag
    pub vrb_to_prb_mapping: u8,
    /// MCS field
    pub modulation_coding_scheme: u8,
    /// TB scaling field
    pub tb_scaling: u8,
}

/// DCI format 0_0 payload scrambled with TC-RNTI
#[derive(Debug, Clone, Copy, Default)]
pub struct Dci0_0TcRnti {
    /// Size of the UL BWP in RBs for frequency-resource encoding
    pub n_rb_ul_bwp: u16,
    /// Type-1 frequency-domain resource (RIV)
    pub frequency_resource: u32,
    /// PUSCH time-domain resource index
    pub time_resource: u8,
    /// Frequency-hopping flag
    pub frequency_hopping_flag: u8,
    /// MCS field
    pub modulation_coding_scheme: u8,
    /// Redundancy version
    pub redundancy_version: u8,
    /// TPC command
    pub tpc_command: u8,
}

/// DL DCI payload variants
#[derive(Debug, Clone, Copy)]
pub enum DciDl {
    /// SI-RNTI DCI 1_0
    SiF1_0(Dci1_0),
    /// RA-RNTI DCI 1_0
    RaF1_0(Dci1_0),
}

/// UL DCI payload variants
#[derive(Debug, Clone, Copy)]
pub enum DciUl {
    /// TC-RNTI DCI 0_0
    TcRntiF0_0(Dci0_0TcRnti),
}

/// One allocated DL PDCCH candidate
#[derive(Debug, Clone)]
pub struct DlPdcch {
    /// Allocation context
    pub ctx: PdcchContext,
    /// DCI payload
    pub dci: DciDl,
}

/// One allocated UL PDCCH candidate
#[derive(Debug, Clone)]
pub struct UlPdcch {
    /// Allocation context
    pub ctx: PdcchContext,
    /// DCI payload
    pub dci: DciUl,
}

/// Codeword parameters of a PDSCH transmission
#[derive(Debug, Clone, Copy)]
pub struct PdschCodeword {
    /// MCS index within the qam64 table
    pub mcs_index: u8,
    /// Redundancy version
    pub rv_index: u8,
    /// Modulation derived from the MCS index
    pub modulation: Modulation,
    /// Target code rate multiplied by 1024
    pub target_code_rate: u16,
    /// Transport block size in bytes
    pub tb_size_bytes: u32,
}

/// PDSCH transmission descriptor
#[derive(Debug, Clone)]
pub struct PdschInfo {
    /// RNTI the PDSCH is addressed to
    pub rnti: Rnti,
    /// PRBs within the active DL BWP
    pub prbs: PrbInterval,
    /// OFDM symbols of the allocation
    pub symbols: OfdmSymbolRange,
    /// Codeword parameters
    pub codeword: PdschCodeword,
    /// DM-RS placement
    pub dmrs: DmrsInformation,
    /// Scrambling identity (PCI for RA-RNTI/SI-RNTI)
    pub n_id: u16,
}

/// One Msg3 UL grant carried inside a RAR PDU
#[derive(Debug, Clone, Copy)]
pub struct RarUlGrant {
    /// Random-access preamble identifier
    pub rapid: u8,
    /// Timing advance command
    pub ta: u16,
    /// Temporary C-RNTI assigned to the UE
    pub temp_crnti: Rnti,
    /// PUSCH time-domain resource index
    pub time_resource_assignment: u8,
    /// Type-1 frequency-domain resource (RIV)
    pub freq_resource_assignment: u32,
    /// Msg3 MCS
    pub mcs: u8,
    /// TPC command
    pub tpc: u8,
    /// CSI request flag
    pub csi_req: bool,
}

/// Random-Access Response: one PDSCH carrying Msg3 grants
#[derive(Debug, Clone)]
pub struct RarInformation {
    /// PDSCH carrying the RAR MAC PDU
    pub pdsch_cfg: PdschInfo,
    /// Msg3 grants multiplexed in the PDU
    pub grants: Vec<RarUlGrant>,
}

/// PUSCH transmission descriptor
#[derive(Debug, Clone)]
pub struct UlSchedInfo {
    /// RNTI of the transmitting UE
    pub rnti: Rnti,
    /// PRBs within the active UL BWP
    pub prbs: PrbInterval,
    /// OFDM symbols of the allocation
    pub symbols: OfdmSymbolRange,
    /// MCS index within the qam64 table
    pub mcs_index: u8,
    /// Modulation derived from the MCS index
    pub modulation: Modulation,
    /// Target code rate multiplied by 1024
    pub target_code_rate: u16,
    /// msg3-transformPrecoder setting
    pub transform_precoding: bool,
    /// Scrambling identity
    pub n_id: u16,
    /// Number of layers
    pub nof_layers: u8,
    /// DM-RS placement
    pub dmrs: DmrsInformation,
    /// Redundancy version
    pub rv_index: u8,
    /// HARQ process identifier
    pub harq_id: u8,
    /// True for an initial transmission
    pub new_data: bool,
    /// Transport block size in bytes
    pub tb_size_bytes: u32,
}

/// PUCCH format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PucchFormat {
    /// Format 0, short
    F0,
    /// Format 1, long
    F1,
    /// Format 2, short with CSI capacity
    F2,
}

/// PUCCH transmission descriptor
#[derive(Debug, Clone)]
pub struct PucchInfo {
    /// RNTI of the transmitting UE
    pub rnti: Rnti,
    /// PUCCH format
    pub format: PucchFormat,
    /// PRBs of the resource
    pub prbs: PrbInterval,
    /// OFDM symbols of the resource
    pub symbols: OfdmSymbolRange,
    /// Number of HARQ-ACK bits carried
    pub harq_ack_nof_bits: u16,
    /// Number of SR bits carried
    pub sr_nof_bits: u16,
    /// Number of CSI part 1 bits carried
    pub csi_part1_nof_bits: u16,
}

/// SSB transmission descriptor
#[derive(Debug, Clone, Copy)]
pub struct SsbInfo {
    /// SSB index within the burst
    pub ssb_index: u8,
    /// CRBs occupied by the block
    pub crbs: CrbInterval,
    /// OFDM symbols occupied by the block
    pub symbols: OfdmSymbolRange,
}

/// CSI-RS transmission descriptor
#[derive(Debug, Clone, Copy)]
pub struct CsiRsInfo {
    /// CRBs spanned by the resource
    pub crbs: CrbInterval,
    /// OFDM symbols of the resource
    pub symbols: OfdmSymbolRange,
}

/// SRS reception descriptor
#[derive(Debug, Clone, Copy)]
pub struct SrsInfo {
    /// RNTI of the transmitting UE
    pub rnti: Rnti,
    /// OFDM symbols of the resource
    pub symbols: OfdmSymbolRange,
}

/// Downlink part of the slot result
#[derive(Debug, Clone)]
pub struct DlSchedResult {
    /// Allocated DL PDCCHs
    pub dl_pdcchs: BoundedVec<DlPdcch>,
    /// Allocated UL PDCCHs
    pub ul_pdcchs: BoundedVec<UlPdcch>,
    /// Allocated RARs
    pub rar_grants: BoundedVec<RarInformation>,
    /// Allocated PDSCHs (system information)
    pub pdschs: BoundedVec<PdschInfo>,
    /// Scheduled SSBs
    pub ssb: BoundedVec<SsbInfo>,
    /// Scheduled CSI-RS
    pub csi_rs: BoundedVec<CsiRsInfo>,
}

/// Uplink part of the slot result
#[derive(Debug, Clone)]
pub struct UlSchedResult {
    /// Expected PUSCH receptions
    pub puschs: BoundedVec<UlSchedInfo>,
    /// Expected PUCCH receptions
    pub pucchs: BoundedVec<PucchInfo>,
    /// Expected SRS receptions
    pub srs: BoundedVec<SrsInfo>,
}

/// Complete scheduling result for one slot
#[derive(Debug, Clone)]
pub struct SlotResult {
    /// Downlink allocations
    pub dl: DlSchedResult,
    /// Uplink allocations
    pub ul: UlSchedResult,
}

impl SlotResult {
    /// Create an empty result with all capacities reserved
    pub fn new() -> Self {
        Self {
            dl: DlSchedResult {
                dl_pdcchs: BoundedVec::new(MAX_DL_PDCCHS_PER_SLOT),
                ul_pdcchs: BoundedVec::new(MAX_UL_PDCCHS_PER_SLOT),
                rar_grants: BoundedVec::new(MAX_RAR_PDUS_PER_SLOT),
                pdschs: BoundedVec::new(MAX_PDSCHS_PER_SLOT),
                ssb: BoundedVec::new(MAX_SSBS_PER_SLOT),
                csi_rs: BoundedVec::new(MAX_CSI_RS_PER_SLOT),
            },
            ul: UlSchedResult {
                puschs: BoundedVec::new(MAX_PUSCHS_PER_SLOT),
                pucchs: BoundedVec::new(MAX_PUCCHS_PER_SLOT),
                srs: BoundedVec::new(MAX_SRS_PER_SLOT),
            },
        }
    }

    /// Clear every list, keeping the reserved capacities
    pub fn clear(&mut self) {
        self.dl.dl_pdcchs.clear();
        self.dl.ul_pdcchs.clear();
        self.dl.rar_grants.clear();
        self.dl.pdschs.clear();
        self.dl.ssb.clear();
        self.dl.csi_rs.clear();
        self.ul.puschs.clear();
        self.ul.pucchs.clear();
        self.ul.srs.clear();
    }
}

impl Default for SlotResult {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_vec_capacity() {
        let mut list: BoundedVec<u32> = BoundedVec::new(2);
        assert!(list.push(1));
        assert!(!list.is_full());
        assert!(list.push(2));
        assert!(list.is_full());
        assert!(!list.push(3));
        assert_eq!(&list[..], &[1, 2]);
        assert_eq!(list.capacity_left(), 0);
    }

    #[test]
    fn test_slot_result_clear_keeps_capacity() {
        let mut result = SlotResult::new();
        for _ in 0..MAX_RAR_PDUS_PER_SLOT + 1 {
            result.dl.rar_grants.push(RarInformation {
                pdsch_cfg: PdschInfo {
                    rnti: Rnti(1),
                    prbs: PrbInterval::new(0, 1),
                    symbols: OfdmSymbolRange::new(2, 14),
                    codeword: PdschCodeword {
                        mcs_index: 0,
                        rv_index: 0,
                        modulation: Modulation::Qpsk,
                        target_code_rate: 120,
                        tb_size_bytes: 8,
                    },
                    dmrs: Default::default(),
                    n_id: 1,
                },
                grants: Vec::new(),
            });
        }
        assert_eq!(result.dl.rar_grants.len(), MAX_RAR_PDUS_PER_SLOT);
        result.clear();
        assert!(result.dl.rar_grants.is_empty());
        assert!(!result.dl.rar_grants.is_full());
    }
}
