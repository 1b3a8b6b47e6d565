//! Frequency-Domain Resource Indication Value
//!
//! Resource allocation type 1 RIV encoding for DCI frequency-domain resource
//! fields, per TS 38.214, Section 5.1.2.2.2.

use common::interval::PrbInterval;

/// Encode the RIV for a contiguous PRB allocation within a BWP of
/// `bwp_size` PRBs.
pub fn ra_frequency_type1_get_riv(bwp_size: u16, start: u16, length: u16) -> u32 {
    debug_assert!(length >= 1 && start + length <= bwp_size);
    let n = bwp_size as u32;
    let s = start as u32;
    let l = length as u32;
    if (l - 1) <= n / 2 {
        n * (l - 1) + s
    } else {
        n * (n - l + 1) + (n - 1 - s)
    }
}

/// Decode a RIV back into the PRB interval it encodes
pub fn ra_frequency_type1_from_riv(bwp_size: u16, riv: u32) -> PrbInterval {
    let n = bwp_size as u32;
    let mut length = riv / n + 1;
    let mut start = riv % n;
    if start + length > n {
        start = n - 1 - start;
        length = n - length + 2;
    }
    PrbInterval::new(start as u16, (start + length) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_riv_round_trip() {
        let bwp_size = 24;
        for start in 0..bwp_size {
            for length in 1..=(bwp_size - start) {
                let riv = ra_frequency_type1_get_riv(bwp_size, start, length);
                let prbs = ra_frequency_type1_from_riv(bwp_size, riv);
                assert_eq!(prbs, PrbInterval::new(start, start + length));
            }
        }
    }

    #[test]
    fn test_riv_known_value() {
        // S=0, L=1 always encodes to 0.
        assert_eq!(ra_frequency_type1_get_riv(52, 0, 1), 0);
        // S=2, L=3 in a 24-PRB BWP.
        assert_eq!(ra_frequency_type1_get_riv(24, 2, 3), 24 * 2 + 2);
    }
}
