//! Nucleotide tables and small helpers on raw reads.
pub use definitions::{complement, is_palindrome, revcmp};

/// Gap symbol in reads. It stands for one base of unknown identity at a known position.
pub const GAP: u8 = b'-';
/// Marker of an unknown base in [BASE2BIT].
pub const UNKNOWN: u64 = 4;

const fn base2bit() -> [u64; 256] {
    let mut slots = [UNKNOWN; 256];
    slots[b'A' as usize] = 0;
    slots[b'a' as usize] = 0;
    slots[b'C' as usize] = 1;
    slots[b'c' as usize] = 1;
    slots[b'G' as usize] = 2;
    slots[b'g' as usize] = 2;
    slots[b'T' as usize] = 3;
    slots[b't' as usize] = 3;
    slots
}

const fn normalize_table() -> [u8; 256] {
    let mut slots = [b'N'; 256];
    slots[b'A' as usize] = b'A';
    slots[b'a' as usize] = b'A';
    slots[b'C' as usize] = b'C';
    slots[b'c' as usize] = b'C';
    slots[b'G' as usize] = b'G';
    slots[b'g' as usize] = b'G';
    slots[b'T' as usize] = b'T';
    slots[b't' as usize] = b'T';
    slots[GAP as usize] = GAP;
    slots
}

/// Two-bit code of a base. A,C,G,T -> 0,1,2,3 and anything else -> [UNKNOWN].
pub const BASE2BIT: [u64; 256] = base2bit();
pub const BIT2BASE: [u8; 4] = *b"ACGT";
const NORMALIZE: [u8; 256] = normalize_table();

/// Uppercase a read and replace anything other than A,C,G,T or the gap symbol by `N`.
pub fn normalize(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| NORMALIZE[b as usize]).collect()
}

pub fn is_acgt(base: u8) -> bool {
    BASE2BIT[base as usize] != UNKNOWN
}

/// The number of unknown bases in a normalized read.
pub fn count_unknown(seq: &[u8]) -> usize {
    bytecount::count(seq, b'N')
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn normalize_reads() {
        assert_eq!(normalize(b"acgtRYn-A"), b"ACGTNNN-A".to_vec());
        assert_eq!(count_unknown(&normalize(b"acgtRYn-A")), 3);
        assert!(is_acgt(b'g'));
        assert!(!is_acgt(b'N'));
        assert!(!is_acgt(GAP));
        for (code, &base) in BIT2BASE.iter().enumerate() {
            assert_eq!(BASE2BIT[base as usize], code as u64);
        }
    }
}
