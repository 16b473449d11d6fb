//! Types shared between the per-node dispatch task (`sub_protocol::run_node`)
//! and its two callers: `SubProtocol` (which drives one subtree) and
//! `MainProtocol` (which drives `k` of those in parallel). Mirrors the
//! teacher's `CeremonyCommon`, which plays the same role for the keygen and
//! signing ceremonies.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::mask::Mask;
use crate::overlay::Overlay;
use crate::suite::CoSiSuite;

/// A node's verification predicate: `verify(msg, data) -> bool` (spec.md
/// §4.1). Boxed so every node in a simulated run can be given its own
/// closure, the way distinct physical machines each run their own copy.
pub type VerifyFn = Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;

/// Per-node dispatch context: this node's overlay handle (which encodes its
/// position in the tree), its secret key share, and its logger.
pub struct NodeContext<S: CoSiSuite, O: Overlay<S>> {
    pub overlay: O,
    pub secret: S::Scalar,
    pub roster_len: usize,
    pub logger: slog::Logger,
    pub verify: VerifyFn,
    /// `Some` only for the node acting as the root of this particular
    /// sub-protocol run (the sub-leader); its aggregate commitment/response
    /// are delivered here instead of via `overlay.send_to_parent`, since its
    /// true parent (the main-protocol root) is an out-of-band collaborator,
    /// not part of this subtree's `Overlay`.
    pub sub_leader_outputs: Option<SubLeaderOutputs<S>>,
}

/// The three single-value outputs the sub-protocol root hands back to the
/// main protocol (spec.md §4.1, "Public contract").
pub struct SubLeaderOutputs<S: CoSiSuite> {
    pub sub_commitment: oneshot::Sender<(S::Point, Mask)>,
    pub sub_response: oneshot::Sender<S::Scalar>,
}
