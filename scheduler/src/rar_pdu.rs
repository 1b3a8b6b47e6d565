//! RAR MAC PDU Assembly
//!
//! Serializes a scheduled RAR into the MAC PDU bytes handed to the PHY,
//! per TS 38.321, Sections 6.1.5 and 6.2.3: one E/T/RAPID subheader plus a
//! 7-byte MAC RAR (timing advance, 27-bit UL grant, TC-RNTI) per Msg3 grant.

use crate::result::{RarInformation, RarUlGrant};
use bytes::{BufMut, Bytes, BytesMut};

/// MAC RAR size in bytes, without the subheader
pub const RAR_SIZE_BYTES: usize = 7;

/// Subheader size in bytes
pub const RAR_SUBHEADER_SIZE_BYTES: usize = 1;

fn put_subheader(buf: &mut BytesMut, rapid: u8, more_follow: bool) {
    // E | T=1 | RAPID(6).
    let e_bit = if more_follow { 0x80 } else { 0x00 };
    buf.put_u8(e_bit | 0x40 | (rapid & 0x3F));
}

fn put_rar(buf: &mut BytesMut, grant: &RarUlGrant) {
    let ta = grant.ta & 0x0FFF;
    let freq = grant.freq_resource_assignment & 0x3FFF;
    let hop = 0u8;

    // R | TA(12) | UL grant(27) | TC-RNTI(16), MSB first.
    buf.put_u8(((ta >> 5) & 0x7F) as u8);
    buf.put_u8((((ta & 0x1F) << 3) as u8) | (hop << 2) | ((freq >> 12) as u8 & 0x03));
    buf.put_u8((freq >> 4) as u8);
    buf.put_u8((((freq & 0x0F) << 4) as u8) | (grant.time_resource_assignment & 0x0F));
    buf.put_u8(((grant.mcs & 0x0F) << 4) | ((grant.tpc & 0x07) << 1) | grant.csi_req as u8);
    buf.put_u16(grant.temp_crnti.0);
}

/// Build the MAC PDU bytes of a scheduled RAR.
///
/// The result is `grants * 8` bytes and must not exceed the transport block
/// size the RAR PDSCH was dimensioned for.
pub fn build_rar_pdu(rar: &RarInformation) -> Bytes {
    let mut buf = BytesMut::with_capacity(rar.grants.len() * (RAR_SIZE_BYTES + RAR_SUBHEADER_SIZE_BYTES));
    for (i, grant) in rar.grants.iter().enumerate() {
        put_subheader(&mut buf, grant.rapid, i + 1 != rar.grants.len());
        put_rar(&mut buf, grant);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{PdschCodeword, PdschInfo};
    use crate::support::mcs::Modulation;
    use common::interval::PrbInterval;
    use common::types::{OfdmSymbolRange, Rnti};

    fn rar_with_grants(grants: Vec<RarUlGrant>) -> RarInformation {
        RarInformation {
            pdsch_cfg: PdschInfo {
                rnti: Rnti(141),
                prbs: PrbInterval::new(0, 3),
                symbols: OfdmSymbolRange::new(2, 14),
                codeword: PdschCodeword {
                    mcs_index: 0,
                    rv_index: 0,
                    modulation: Modulation::Qpsk,
                    target_code_rate: 120,
                    tb_size_bytes: 10,
                },
                dmrs: Default::default(),
                n_id: 1,
            },
            grants,
        }
    }

    fn grant(rapid: u8, tc_rnti: u16, ta: u16) -> RarUlGrant {
        RarUlGrant {
            rapid,
            ta,
            temp_crnti: Rnti(tc_rnti),
            time_resource_assignment: 0,
            freq_resource_assignment: 0x120,
            mcs: 0,
            tpc: 0,
            csi_req: false,
        }
    }

    #[test]
    fn test_single_grant_layout() {
        let pdu = build_rar_pdu(&rar_with_grants(vec![grant(3, 0x4601, 12)]));
        assert_eq!(pdu.len(), 8);

        // Subheader: E=0, T=1, RAPID=3.
        assert_eq!(pdu[0], 0x43);
        // TA=12 spans the first two bytes: 0b0000000_0110 0...
        assert_eq!(pdu[1], 0x00);
        assert_eq!(pdu[2] >> 3, 12);
        // TC-RNTI closes the RAR.
        assert_eq!(u16::from_be_bytes([pdu[6], pdu[7]]), 0x4601);
    }

    #[test]
    fn test_frequency_resource_round_trip() {
        let pdu = build_rar_pdu(&rar_with_grants(vec![grant(1, 0x4601, 0)]));
        // Reassemble the 14-bit frequency resource from bytes 2..4.
        let freq = ((pdu[2] as u32 & 0x03) << 12) | ((pdu[3] as u32) << 4) | (pdu[4] as u32 >> 4);
        assert_eq!(freq, 0x120);
    }

    #[test]
    fn test_multiplexed_grants_set_extension_bit() {
        let pdu = build_rar_pdu(&rar_with_grants(vec![
            grant(3, 0x4601, 12),
            grant(7, 0x4602, 5),
        ]));
        assert_eq!(pdu.len(), 16);
        // First subheader has E=1, the last has E=0.
        assert_eq!(pdu[0] & 0x80, 0x80);
        assert_eq!(pdu[8] & 0x80, 0x00);
        assert_eq!(pdu[8] & 0x3F, 7);
    }
}
