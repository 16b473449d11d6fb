//! The tree-delivery transport, treated as an external collaborator
//! (spec.md §6): `send_to_children`, `send_to_parent`, `send_to`,
//! `broadcast`, `register_channel`, plus the node's position in the tree.
//! Delivery on any one pairwise link is reliable and FIFO; link failures
//! surface as timeouts, never as `Overlay` errors.

pub mod memory;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::mask::Mask;
use crate::roster::NodeId;
use crate::suite::CoSiSuite;

/// Per-run correlation id threaded through every wire message and log line
/// (≈ the teacher's `CeremonyId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// The four phase messages plus `Stop` (spec.md §6, "Wire messages"). Derives
/// `Serialize`/`Deserialize` directly off `S::Point`/`S::Scalar` (rather than
/// requiring `S: Serialize`) via an explicit bound, in the style of the
/// teacher's `SigningData`/`KeygenData` wire enums.
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "S::Point: Serialize + serde::de::DeserializeOwned, S::Scalar: Serialize + serde::de::DeserializeOwned")]
pub enum MessageBody<S: CoSiSuite> {
    Announcement {
        msg: Vec<u8>,
        data: Vec<u8>,
        timeout: Duration,
    },
    Commitment {
        commitment: S::Point,
        mask: Mask,
    },
    Challenge {
        challenge: S::Scalar,
    },
    Response {
        response: S::Scalar,
    },
    Stop,
}

// Derived `Debug` would require `S: Debug`, which `CoSiSuite` itself doesn't
// need; the associated `Scalar`/`Point` types already carry that bound.
impl<S: CoSiSuite> std::fmt::Debug for MessageBody<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageBody::Announcement { msg, data, timeout } => f
                .debug_struct("Announcement")
                .field("msg_len", &msg.len())
                .field("data_len", &data.len())
                .field("timeout", timeout)
                .finish(),
            MessageBody::Commitment { commitment, mask } => {
                f.debug_struct("Commitment").field("commitment", commitment).field("mask", mask).finish()
            }
            MessageBody::Challenge { challenge } => {
                f.debug_struct("Challenge").field("challenge", challenge).finish()
            }
            MessageBody::Response { response } => {
                f.debug_struct("Response").field("response", response).finish()
            }
            MessageBody::Stop => write!(f, "Stop"),
        }
    }
}

/// Every wire message carries the sender's tree-node handle and a run
/// identifier (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "S::Point: Serialize + serde::de::DeserializeOwned, S::Scalar: Serialize + serde::de::DeserializeOwned")]
pub struct Envelope<S: CoSiSuite> {
    pub run: RunId,
    pub sender: NodeId,
    pub body: MessageBody<S>,
}

/// Which of a node's five inbound channels `register_channel` is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Announcement,
    Commitment,
    Challenge,
    Response,
    Stop,
}

/// Collaborator contract consumed by the sub-protocol dispatch task
/// (spec.md §6). One handle is bound to exactly one tree node for exactly
/// one run.
pub trait Overlay<S: CoSiSuite>: Send + Sync {
    fn tree_node(&self) -> NodeId;
    fn is_root(&self) -> bool;
    fn is_leaf(&self) -> bool;
    fn children(&self) -> Vec<NodeId>;
    fn parent(&self) -> Option<NodeId>;

    fn send_to_children(&self, body: MessageBody<S>);
    fn send_to_parent(&self, body: MessageBody<S>);
    fn send_to(&self, node: NodeId, body: MessageBody<S>);
    fn broadcast(&self, body: MessageBody<S>);

    /// Take ownership of the inbound receiver for `kind`. Panics if called
    /// twice for the same kind on the same handle — each node registers
    /// each channel exactly once per run.
    fn register_channel(&self, kind: ChannelKind) -> mpsc::UnboundedReceiver<Envelope<S>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::secp256k1::Secp256k1Suite;
    use crate::suite::{CoSiPoint, CoSiScalar, CoSiSuite};

    type S = Secp256k1Suite;

    #[test]
    fn envelope_roundtrips_through_json() {
        let commitment = <S as CoSiSuite>::Point::from_scalar(&<S as CoSiSuite>::Scalar::random());
        let envelope = Envelope::<S> {
            run: RunId(7),
            sender: NodeId(2),
            body: MessageBody::Commitment { commitment, mask: Mask::new(3) },
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope<S> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run, envelope.run);
        assert_eq!(back.sender, envelope.sender);
    }
}
