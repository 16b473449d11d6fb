//! Narrow capability surface required from the cryptographic backend
//! (spec.md §4.3): scalar/point arithmetic, random scalar generation, and a
//! Fiat–Shamir-style challenge hash. No other cryptographic detail is
//! visible to the sub-protocol or main-protocol core.

pub mod secp256k1;

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroize;

use crate::mask::Mask;

/// A scalar in the suite's underlying group's scalar field.
///
/// `Serialize`/`DeserializeOwned` are required so wire messages carrying
/// scalars (`Challenge`, `Response`) can derive `serde` impls directly,
/// matching the teacher's wire-enum-derives-Serialize convention. `Zeroize`
/// is required so every concrete suite's nonces and secret shares are
/// scrubbed on drop (spec.md §7) without the protocol core needing to know
/// anything about the underlying field representation.
pub trait CoSiScalar: Clone + Send + Sync + Debug + PartialEq + Serialize + DeserializeOwned + Zeroize + 'static {
    fn zero() -> Self;
    fn random() -> Self;
    fn add(&self, other: &Self) -> Self;
    fn mul(&self, other: &Self) -> Self;
    fn to_bytes(&self) -> [u8; 32];
    fn from_bytes(bytes: &[u8; 32]) -> Self;
}

/// A point on the suite's underlying curve.
pub trait CoSiPoint: Clone + Send + Sync + Debug + PartialEq + Serialize + DeserializeOwned + 'static {
    type Scalar: CoSiScalar;

    fn identity() -> Self;
    fn generator() -> Self;
    fn from_scalar(scalar: &Self::Scalar) -> Self;
    fn add(&self, other: &Self) -> Self;
    fn scalar_mul(&self, scalar: &Self::Scalar) -> Self;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Option<Self>
    where
        Self: Sized;

    /// Sum an iterator of points via repeated `add`, starting from `identity`.
    fn sum<I: IntoIterator<Item = Self>>(points: I) -> Self
    where
        Self: Sized,
    {
        points.into_iter().fold(Self::identity(), |acc, p| acc.add(&p))
    }
}

/// The abstract elliptic-curve group and hash primitives this crate depends
/// on, treated as an external collaborator per spec.md §1.
pub trait CoSiSuite: Clone + Send + Sync + 'static {
    type Scalar: CoSiScalar;
    type Point: CoSiPoint<Scalar = Self::Scalar>;

    /// `H(C ‖ M ‖ msg)`: collision-resistant, deterministic.
    fn challenge(commitment: &Self::Point, mask: &Mask, msg: &[u8]) -> Self::Scalar;
}
