//! Attendance mask: a bit-set of length `N`, one bit per roster position.
//!
//! Bit = 1 means the node **declined or failed to participate**; bit = 0
//! means it participated. This polarity is preserved from the canonical CoSi
//! specification so masks can be OR-ed freely as they propagate up the tree —
//! inverting it is a silent correctness bug (spec.md §9, "Mask polarity").

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    bits: BitVec<u8, Msb0>,
}

impl Mask {
    /// A fresh mask for `n` roster positions with every bit clear (everyone
    /// present).
    pub fn new(n: usize) -> Self {
        Mask {
            bits: bitvec![u8, Msb0; 0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_absent(&self, idx: usize) -> bool {
        self.bits[idx]
    }

    /// Record `idx` as absent (non-participating).
    pub fn set_absent(&mut self, idx: usize) {
        self.bits.set(idx, true);
    }

    /// Union in place: a bit is set in `self` iff it was set in `self` or `other`.
    pub fn or(&mut self, other: &Mask) {
        assert_eq!(self.len(), other.len(), "mask length mismatch");
        self.bits |= &other.bits;
    }

    /// Number of present (zero-bit) positions.
    pub fn popcount_present(&self) -> usize {
        self.len() - self.bits.count_ones()
    }

    /// Iterate the roster positions that are present (zero bit).
    pub fn present_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().filter_map(|(i, b)| (!*b).then_some(i))
    }

    /// Big-endian bitstring of `ceil(n/8)` bytes (spec.md §6, Serialization).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.bits.clone();
        bytes.set_uninitialized(false);
        bytes.into_vec()
    }

    pub fn from_bytes(n: usize, bytes: &[u8]) -> Self {
        let mut bits: BitVec<u8, Msb0> = BitVec::from_slice(bytes);
        bits.truncate(n);
        Mask { bits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_unions_absences() {
        let mut a = Mask::new(4);
        a.set_absent(1);
        let mut b = Mask::new(4);
        b.set_absent(2);
        a.or(&b);
        assert!(a.is_absent(1));
        assert!(a.is_absent(2));
        assert!(!a.is_absent(0));
        assert!(!a.is_absent(3));
    }

    #[test]
    fn popcount_present_counts_zero_bits() {
        let mut m = Mask::new(7);
        m.set_absent(1);
        m.set_absent(3);
        assert_eq!(m.popcount_present(), 5);
    }

    #[test]
    fn roundtrips_through_bytes() {
        let mut m = Mask::new(10);
        m.set_absent(0);
        m.set_absent(9);
        let bytes = m.to_bytes();
        assert_eq!(bytes.len(), 2);
        let back = Mask::from_bytes(10, &bytes);
        assert_eq!(m, back);
    }
}
