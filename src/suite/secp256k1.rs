//! Concrete [`CoSiSuite`] built on secp256k1, in the style of the teacher's
//! FROST Schnorr challenge (`multisig::client::signing::frost::build_challenge`):
//! scalars are secp256k1 scalars, points are secp256k1 group elements, and
//! the challenge is `SHA-256(C ‖ M ‖ msg)` reduced into the scalar field.
//!
//! This is a deliberate specialization kept small for testability — the
//! sub-protocol and main-protocol core depend only on the abstract
//! [`CoSiSuite`] trait.

use k256::elliptic_curve::bigint::U256;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::Field;
use k256::{AffinePoint, EncodedPoint, ProjectivePoint, Scalar};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::mask::Mask;
use crate::suite::{CoSiPoint, CoSiScalar, CoSiSuite};

/// Ephemeral nonces (`v`) and secret key shares (`x`) are both
/// `Secp256k1Scalar` values (spec.md §3, "`v` is used exactly once per run
/// and never logged or persisted"; §7, "secrets are zeroized on every exit
/// path"). `k256::Scalar` implements `zeroize::DefaultIsZeroes`, so scrubbing
/// it is a single `zeroize()` call; wiring that into `Drop` means every
/// `Secp256k1Scalar` is scrubbed the moment it goes out of scope, including
/// on early `return`s out of the dispatch task.
#[derive(Clone, Debug, PartialEq)]
pub struct Secp256k1Scalar(pub(crate) Scalar);

impl Zeroize for Secp256k1Scalar {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for Secp256k1Scalar {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl ZeroizeOnDrop for Secp256k1Scalar {}

impl Serialize for Secp256k1Scalar {
    fn serialize<Ser: Serializer>(&self, s: Ser) -> Result<Ser::Ok, Ser::Error> {
        self.to_bytes().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Secp256k1Scalar {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let bytes = <[u8; 32]>::deserialize(d)?;
        Ok(Secp256k1Scalar::from_bytes(&bytes))
    }
}

impl CoSiScalar for Secp256k1Scalar {
    fn zero() -> Self {
        Secp256k1Scalar(Scalar::ZERO)
    }

    fn random() -> Self {
        Secp256k1Scalar(Scalar::random(&mut rand_core::OsRng))
    }

    fn add(&self, other: &Self) -> Self {
        Secp256k1Scalar(self.0 + other.0)
    }

    fn mul(&self, other: &Self) -> Self {
        Secp256k1Scalar(self.0 * other.0)
    }

    fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    fn from_bytes(bytes: &[u8; 32]) -> Self {
        // Reduce mod the group order rather than rejecting out-of-range
        // bytes: the challenge hash has no reason to land exactly in
        // [0, q), and a uniform reduction keeps `from_bytes` total.
        let field_bytes: k256::FieldBytes = (*bytes).into();
        Secp256k1Scalar(<Scalar as Reduce<U256>>::reduce_bytes(&field_bytes))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Secp256k1Point(pub(crate) ProjectivePoint);

impl Serialize for Secp256k1Point {
    fn serialize<Ser: Serializer>(&self, s: Ser) -> Result<Ser::Ok, Ser::Error> {
        CoSiPoint::to_bytes(self).serialize(s)
    }
}

impl<'de> Deserialize<'de> for Secp256k1Point {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(d)?;
        CoSiPoint::from_bytes(&bytes).ok_or_else(|| D::Error::custom("invalid secp256k1 point encoding"))
    }
}

impl CoSiPoint for Secp256k1Point {
    type Scalar = Secp256k1Scalar;

    fn identity() -> Self {
        Secp256k1Point(ProjectivePoint::IDENTITY)
    }

    fn generator() -> Self {
        Secp256k1Point(ProjectivePoint::GENERATOR)
    }

    fn from_scalar(scalar: &Self::Scalar) -> Self {
        Secp256k1Point(ProjectivePoint::GENERATOR * scalar.0)
    }

    fn add(&self, other: &Self) -> Self {
        Secp256k1Point(self.0 + other.0)
    }

    fn scalar_mul(&self, scalar: &Self::Scalar) -> Self {
        Secp256k1Point(self.0 * scalar.0)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let encoded = EncodedPoint::from_bytes(bytes).ok()?;
        let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))?;
        Some(Secp256k1Point(ProjectivePoint::from(affine)))
    }
}

/// Concrete [`CoSiSuite`] for secp256k1.
#[derive(Clone)]
pub struct Secp256k1Suite;

impl CoSiSuite for Secp256k1Suite {
    type Scalar = Secp256k1Scalar;
    type Point = Secp256k1Point;

    fn challenge(commitment: &Self::Point, mask: &Mask, msg: &[u8]) -> Self::Scalar {
        let mut hasher = Sha256::new();
        hasher.update(commitment.to_bytes());
        hasher.update(mask.to_bytes());
        hasher.update(msg);
        let digest: [u8; 32] = hasher.finalize().into();
        Secp256k1Scalar::from_bytes(&digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_scalar_matches_generator_mul() {
        let s = Secp256k1Scalar::random();
        let p1 = Secp256k1Point::from_scalar(&s);
        let p2 = Secp256k1Point::generator().scalar_mul(&s);
        assert_eq!(p1, p2);
    }

    #[test]
    fn challenge_is_deterministic() {
        let c = Secp256k1Point::from_scalar(&Secp256k1Scalar::random());
        let mut mask = Mask::new(4);
        mask.set_absent(2);
        let e1 = Secp256k1Suite::challenge(&c, &mask, b"hello");
        let e2 = Secp256k1Suite::challenge(&c, &mask, b"hello");
        assert_eq!(e1, e2);
    }

    #[test]
    fn point_roundtrips_through_bytes() {
        let p = Secp256k1Point::from_scalar(&Secp256k1Scalar::random());
        let bytes = CoSiPoint::to_bytes(&p);
        assert_eq!(Secp256k1Point::from_bytes(&bytes), Some(p));
    }

    #[test]
    fn scalar_and_point_roundtrip_through_serde_json() {
        let s = Secp256k1Scalar::random();
        let p = Secp256k1Point::from_scalar(&s);
        let s_json = serde_json::to_string(&s).unwrap();
        let p_json = serde_json::to_string(&p).unwrap();
        assert_eq!(serde_json::from_str::<Secp256k1Scalar>(&s_json).unwrap(), s);
        assert_eq!(serde_json::from_str::<Secp256k1Point>(&p_json).unwrap(), p);
    }

    #[test]
    fn challenge_depends_on_mask() {
        let c = Secp256k1Point::from_scalar(&Secp256k1Scalar::random());
        let mask_a = Mask::new(4);
        let mut mask_b = Mask::new(4);
        mask_b.set_absent(0);
        let e_a = Secp256k1Suite::challenge(&c, &mask_a, b"hello");
        let e_b = Secp256k1Suite::challenge(&c, &mask_b, b"hello");
        assert_ne!(e_a, e_b);
    }
}
