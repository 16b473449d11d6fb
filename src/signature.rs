//! The output of a run: `(C, s, M)`, plus the verification check any third
//! party can perform against a roster (spec.md §3, "Signature").

use crate::mask::Mask;
use crate::roster::Roster;
use crate::suite::{CoSiPoint, CoSiSuite};

/// A completed collective signature.
#[derive(Debug, Clone)]
pub struct Signature<S: CoSiSuite> {
    pub commitment: S::Point,
    pub response: S::Scalar,
    pub mask: Mask,
}

impl<S: CoSiSuite> Signature<S> {
    /// Recompute `e = H(C ‖ M ‖ msg)` and check
    /// `s·G == C + e·Σ_{i : M[i]=0} pub_i`.
    pub fn verify(&self, msg: &[u8], roster: &Roster<S>) -> bool {
        if self.mask.len() != roster.len() {
            return false;
        }
        let e = S::challenge(&self.commitment, &self.mask, msg);

        let present_sum = S::Point::sum(
            self.mask
                .present_indices()
                .map(|i| roster.get(crate::roster::NodeId(i)).clone()),
        );

        let lhs = S::Point::from_scalar(&self.response);
        let rhs = self.commitment.add(&present_sum.scalar_mul(&e));
        lhs == rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::secp256k1::Secp256k1Suite;
    use crate::suite::CoSiScalar;

    type S = Secp256k1Suite;

    #[test]
    fn verify_accepts_correctly_constructed_signature() {
        let x1 = <S as CoSiSuite>::Scalar::random();
        let x2 = <S as CoSiSuite>::Scalar::random();
        let roster = Roster::<S>::new(vec![
            <S as CoSiSuite>::Point::from_scalar(&x1),
            <S as CoSiSuite>::Point::from_scalar(&x2),
        ]);

        let v1 = <S as CoSiSuite>::Scalar::random();
        let v2 = <S as CoSiSuite>::Scalar::random();
        let c1 = <S as CoSiSuite>::Point::from_scalar(&v1);
        let c2 = <S as CoSiSuite>::Point::from_scalar(&v2);
        let commitment = c1.add(&c2);
        let mask = Mask::new(2);

        let msg = b"hello";
        let e = S::challenge(&commitment, &mask, msg);
        let s1 = v1.add(&e.mul(&x1));
        let s2 = v2.add(&e.mul(&x2));
        let response = s1.add(&s2);

        let sig = Signature::<S> { commitment, response, mask };
        assert!(sig.verify(msg, &roster));
        assert!(!sig.verify(b"tampered", &roster));
    }
}
