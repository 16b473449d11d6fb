//! The sub-protocol: one Announcement/Commitment/Challenge/Response pass
//! down and up a subtree rooted at a sub-leader (spec.md §4.1). Every node
//! in the subtree — including the sub-leader and the leaves — runs
//! [`run_node`], the same dispatch state machine, parameterized only by its
//! position in the subtree (`Overlay::is_root`/`is_leaf`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use slog::o;
use tokio::sync::oneshot;

use crate::errors::CosiError;
use crate::mask::Mask;
use crate::overlay::memory::InMemoryNetwork;
use crate::overlay::{ChannelKind, MessageBody, Overlay, RunId};
use crate::protocol::common::{NodeContext, SubLeaderOutputs, VerifyFn};
use crate::roster::NodeId;
use crate::suite::{CoSiPoint, CoSiScalar, CoSiSuite};
use crate::tree::Tree;

/// One node's run of the dispatch state machine: `Idle → Announced →
/// Committed → Challenged → Responded` (spec.md §4.1). Transitions are
/// driven strictly by inbound messages in this order; an inbound message
/// that doesn't match the current phase is dropped with an error log.
/// Spawned as a single tokio task per node per run (spec.md §5, "Scheduling
/// model").
pub async fn run_node<S, O>(ctx: NodeContext<S, O>)
where
    S: CoSiSuite,
    O: Overlay<S>,
{
    let mut ann_rx = ctx.overlay.register_channel(ChannelKind::Announcement);
    let mut commit_rx = ctx.overlay.register_channel(ChannelKind::Commitment);
    let mut challenge_rx = ctx.overlay.register_channel(ChannelKind::Challenge);
    let mut response_rx = ctx.overlay.register_channel(ChannelKind::Response);
    let mut stop_rx = ctx.overlay.register_channel(ChannelKind::Stop);

    let node = ctx.overlay.tree_node();
    let is_root = ctx.overlay.is_root();
    let logger = ctx.logger.new(o!("node" => node.0));

    // Phase 1 — Announcement (downward).
    let (msg, data, timeout) = tokio::select! {
        biased;
        _ = stop_rx.recv() => { slog::debug!(logger, "shutdown before announcement"); return; }
        env = ann_rx.recv() => match env {
            Some(env) => match env.body {
                MessageBody::Announcement { msg, data, timeout } => (msg, data, timeout),
                other => { slog::error!(logger, "out-of-phase message while idle"; "body" => ?other); return; }
            },
            None => return,
        }
    };

    ctx.overlay.send_to_children(MessageBody::Announcement {
        msg: msg.clone(),
        data: data.clone(),
        timeout,
    });

    // The sub-protocol root's own verification is run externally by the
    // main protocol (spec.md §4.1); every other node launches `verify`
    // asynchronously so its latency overlaps with the commitment wait.
    let verify_handle = if is_root {
        None
    } else {
        let verify = ctx.verify.clone();
        let msg_for_verify = msg.clone();
        let data_for_verify = data.clone();
        Some(tokio::task::spawn_blocking(move || verify(&msg_for_verify, &data_for_verify)))
    };

    // Phase 2 — Commitment (upward), with timeouts.
    let window = if is_root { timeout } else { timeout / 2 };
    let children: HashSet<NodeId> = ctx.overlay.children().into_iter().collect();
    let mut remaining = children.clone();
    let mut mask = Mask::new(ctx.roster_len);
    let mut commitment_sum = S::Point::identity();
    let mut fatal = false;

    {
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        while !remaining.is_empty() {
            tokio::select! {
                biased;
                _ = stop_rx.recv() => { slog::debug!(logger, "shutdown during commitment phase"); return; }
                _ = &mut deadline => break,
                env = commit_rx.recv() => {
                    match env {
                        None => break,
                        Some(env) => {
                            if !remaining.remove(&env.sender) {
                                slog::error!(logger, "commitment from non-child or duplicate sender"; "sender" => %env.sender);
                                fatal = true;
                                break;
                            }
                            match env.body {
                                MessageBody::Commitment { commitment, mask: child_mask } => {
                                    commitment_sum = commitment_sum.add(&commitment);
                                    mask.or(&child_mask);
                                }
                                other => {
                                    slog::error!(logger, "expected Commitment"; "got" => ?other);
                                    fatal = true;
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    if fatal {
        return;
    }

    // Window expired (or channel closed) with children unaccounted for:
    // mark them absent. Not an error — this is single-fault tolerance.
    for absent in &remaining {
        mask.set_absent(absent.0);
        slog::warn!(logger, "child timed out in commitment phase"; "child" => absent.0);
    }

    let verified = match verify_handle {
        None => true,
        Some(handle) => handle.await.unwrap_or(false),
    };
    if !verified {
        slog::info!(logger, "local verification failed; terminating silently");
        return;
    }

    let v = S::Scalar::random();
    let c = S::Point::from_scalar(&v);
    commitment_sum = commitment_sum.add(&c);

    let committed_children: Vec<NodeId> =
        children.iter().copied().filter(|c| !remaining.contains(c)).collect();

    match ctx.sub_leader_outputs {
        Some(outputs) => {
            if outputs.sub_commitment.send((commitment_sum, mask)).is_err() {
                slog::debug!(logger, "main protocol no longer listening for commitment");
                return;
            }
            run_challenge_and_response_phases(
                &logger,
                &ctx.overlay,
                &mut challenge_rx,
                &mut response_rx,
                &mut stop_rx,
                &committed_children,
                v,
                ctx.secret,
                Upward::MainProtocol(outputs.sub_response),
            )
            .await;
        }
        None => {
            ctx.overlay.send_to_parent(MessageBody::Commitment { commitment: commitment_sum, mask });
            run_challenge_and_response_phases(
                &logger,
                &ctx.overlay,
                &mut challenge_rx,
                &mut response_rx,
                &mut stop_rx,
                &committed_children,
                v,
                ctx.secret,
                Upward::Overlay,
            )
            .await;
        }
    }

    slog::trace!(logger, "sub-protocol node done");
}

/// Where this node's aggregate response goes once computed.
enum Upward<S: CoSiSuite> {
    Overlay,
    MainProtocol(oneshot::Sender<S::Scalar>),
}

/// Phases 3 (Challenge, downward) and 4 (Response, upward), shared by every
/// node regardless of whether it forwards its aggregate via the overlay or
/// hands it to the main protocol.
#[allow(clippy::too_many_arguments)]
async fn run_challenge_and_response_phases<S, O>(
    logger: &slog::Logger,
    overlay: &O,
    challenge_rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::overlay::Envelope<S>>,
    response_rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::overlay::Envelope<S>>,
    stop_rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::overlay::Envelope<S>>,
    committed_children: &[NodeId],
    v: S::Scalar,
    secret: S::Scalar,
    upward: Upward<S>,
) where
    S: CoSiSuite,
    O: Overlay<S>,
{
    // Phase 3 — Challenge (downward).
    let e = tokio::select! {
        biased;
        _ = stop_rx.recv() => { slog::debug!(logger, "shutdown awaiting challenge"); return; }
        env = challenge_rx.recv() => match env {
            Some(env) => match env.body {
                MessageBody::Challenge { challenge } => challenge,
                other => { slog::error!(logger, "expected Challenge"; "got" => ?other); return; }
            },
            None => return,
        }
    };

    // Forward to exactly the children that successfully committed; absent
    // children are not sent a challenge.
    for child in committed_children {
        overlay.send_to(*child, MessageBody::Challenge { challenge: e.clone() });
    }

    // Phase 4 — Response (upward). Children are independently spawned tasks
    // funneling into one shared channel, so nothing orders one child's
    // Response relative to another's (spec.md §5, "no assumption about
    // ordering between different senders' messages") — accumulate against
    // the set of children still owed a response, the same way Phase 2
    // accumulates commitments, instead of awaiting a fixed sequence.
    let mut total = compute_own_response::<S>(&v, &e, &secret);
    let mut remaining: HashSet<NodeId> = committed_children.iter().copied().collect();
    while !remaining.is_empty() {
        match response_rx.recv().await {
            Some(env) if remaining.remove(&env.sender) => match env.body {
                MessageBody::Response { response } => total = total.add(&response),
                other => {
                    slog::error!(logger, "expected Response"; "got" => ?other);
                    return;
                }
            },
            Some(env) => {
                slog::error!(logger, "response from non-child or duplicate sender"; "sender" => %env.sender);
                return;
            }
            None => {
                slog::error!(logger, "child committed but never responded"; "outstanding" => remaining.len());
                return;
            }
        }
    }

    match upward {
        Upward::Overlay => overlay.send_to_parent(MessageBody::Response { response: total }),
        Upward::MainProtocol(tx) => {
            let _ = tx.send(total);
        }
    }
}

/// `s = v + e*x`: this node's own Schnorr response share.
fn compute_own_response<S: CoSiSuite>(v: &S::Scalar, e: &S::Scalar, x: &S::Scalar) -> S::Scalar {
    v.add(&e.mul(x))
}

/// Outcome of a [`SubProtocol`]'s commitment phase (spec.md §4.1, "Public
/// contract": `sub_commitment` and `subleader_not_responding` fused into one
/// return type since they are mutually exclusive outcomes of the same wait).
#[derive(Debug)]
pub enum CommitmentOutcome<S: CoSiSuite> {
    Committed { commitment: S::Point, mask: Mask },
    SubLeaderNotResponding,
}

/// One run of the sub-protocol, owned by the main protocol. Wraps the
/// subtree's in-memory network and exposes the public contract from
/// spec.md §4.1: `start`, `await_commitment` (`sub_commitment` /
/// `subleader_not_responding`), `await_response` (`sub_response`), and
/// `shutdown`.
pub struct SubProtocol<S: CoSiSuite> {
    sub_leader: NodeId,
    network: Arc<InMemoryNetwork<S>>,
    timeout: Duration,
    /// How long `await_commitment` waits for `sub_commitment`. Defaults to
    /// `timeout`, but the main protocol widens it to its own (larger) main
    /// budget: the sub-leader's internal window is itself `timeout` long
    /// (spec.md §4.1, "root waits full timeout"), so waiting the *same*
    /// duration here would race the sub-leader's own deadline instead of
    /// leaving room for its aggregation and the final channel send.
    await_deadline: Duration,
    commitment_rx: Option<oneshot::Receiver<(S::Point, Mask)>>,
    response_rx: Option<oneshot::Receiver<S::Scalar>>,
    started: bool,
}

impl<S: CoSiSuite> SubProtocol<S> {
    /// Minimum timeout accepted by [`SubProtocol::new`] (spec.md §6).
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

    /// Build a sub-protocol over `subtree` (whose `Tree::root()` is the
    /// sub-leader) and spawn one dispatch task per member.
    pub fn new(
        run: RunId,
        subtree: Tree,
        roster_len: usize,
        secrets: &HashMap<NodeId, S::Scalar>,
        verifiers: &HashMap<NodeId, VerifyFn>,
        timeout: Duration,
        logger: slog::Logger,
    ) -> Result<Self, CosiError> {
        if timeout < Self::MIN_TIMEOUT {
            return Err(CosiError::ConfigError(format!(
                "sub-protocol timeout {timeout:?} below minimum {:?}",
                Self::MIN_TIMEOUT
            )));
        }

        let sub_leader = subtree.root();
        let mut members = subtree.subtree_members(sub_leader);
        members.retain(|&m| m != sub_leader);
        let network = InMemoryNetwork::new(subtree, run);

        let (commitment_tx, commitment_rx) = oneshot::channel();
        let (response_tx, response_rx) = oneshot::channel();

        let spawn_one = |member: NodeId, sub_leader_outputs: Option<SubLeaderOutputs<S>>| -> Result<(), CosiError> {
            let secret = secrets
                .get(&member)
                .cloned()
                .ok_or_else(|| CosiError::ConfigError(format!("missing secret for {member}")))?;
            let verify = verifiers
                .get(&member)
                .cloned()
                .unwrap_or_else(|| Arc::new(|_: &[u8], _: &[u8]| true));
            let ctx = NodeContext {
                overlay: network.handle(member),
                secret,
                roster_len,
                logger: logger.new(o!("sub_leader" => sub_leader.0)),
                verify,
                sub_leader_outputs,
            };
            tokio::spawn(run_node(ctx));
            Ok(())
        };

        spawn_one(
            sub_leader,
            Some(SubLeaderOutputs { sub_commitment: commitment_tx, sub_response: response_tx }),
        )?;
        for member in members {
            spawn_one(member, None)?;
        }

        Ok(SubProtocol {
            sub_leader,
            network,
            timeout,
            await_deadline: timeout,
            commitment_rx: Some(commitment_rx),
            response_rx: Some(response_rx),
            started: false,
        })
    }

    /// Widen the deadline `await_commitment` applies on top of the
    /// sub-leader's own internal window. The main protocol calls this with
    /// its main budget (spec.md §4.2, step 1: sub-protocol timeouts are
    /// "typically ≈ main timeout/2").
    pub fn with_await_deadline(mut self, deadline: Duration) -> Self {
        self.await_deadline = deadline;
        self
    }

    /// Valid only once: places the Announcement on the sub-leader's own
    /// inbound channel. Empty `msg` is accepted (spec.md §8, "msg is empty
    /// byte string ⇒ still valid"); see DESIGN.md for why this overrides the
    /// literal "requires msg ≠ ∅" wording in spec.md §4.1.
    pub fn start(&mut self, msg: Vec<u8>, data: Vec<u8>) -> Result<(), CosiError> {
        if self.started {
            return Err(CosiError::ConfigError("sub-protocol already started".into()));
        }
        self.started = true;
        let handle = self.network.handle(self.sub_leader);
        handle.send_to(self.sub_leader, MessageBody::Announcement { msg, data, timeout: self.timeout });
        Ok(())
    }

    /// Await either `sub_commitment` or `subleader_not_responding`.
    pub async fn await_commitment(&mut self) -> CommitmentOutcome<S> {
        let rx = self.commitment_rx.take().expect("await_commitment called twice");
        match tokio::time::timeout(self.await_deadline, rx).await {
            Ok(Ok((commitment, mask))) => CommitmentOutcome::Committed { commitment, mask },
            _ => CommitmentOutcome::SubLeaderNotResponding,
        }
    }

    /// Await `sub_response`. No timeout: a committed sub-leader that never
    /// responds is a fatal `ProtocolError` for the caller to raise.
    pub async fn await_response(&mut self) -> Option<S::Scalar> {
        let rx = self.response_rx.take().expect("await_response called twice");
        rx.await.ok()
    }

    /// Deliver the challenge computed by the main protocol.
    pub fn deliver_challenge(&self, challenge: S::Scalar) {
        let handle = self.network.handle(self.sub_leader);
        handle.send_to(self.sub_leader, MessageBody::Challenge { challenge });
    }

    /// Idempotent: broadcasts `Stop` across the subtree.
    pub fn shutdown(&self) {
        let handle = self.network.handle(self.sub_leader);
        handle.broadcast(MessageBody::Stop);
    }
}
