//! The outer protocol (spec.md §4.2): partitions the roster into `k`
//! subtrees, dispatches one sub-protocol per subtree, and assembles their
//! outputs into a signature. The overall root (roster position 0) is not a
//! member of any subtree, but it is still a signing participant: it draws its
//! own nonce and folds its own commitment/response share into the aggregate
//! like any other node — see DESIGN.md, "Does the root sign".

use std::collections::HashMap;

use futures::future::join_all;
use slog::o;

use crate::errors::CosiError;
use crate::mask::Mask;
use crate::overlay::RunId;
use crate::protocol::common::VerifyFn;
use crate::protocol::sub_protocol::{CommitmentOutcome, SubProtocol};
use crate::roster::NodeId;
use crate::settings::ValidatedConfig;
use crate::signature::Signature;
use crate::suite::{CoSiPoint, CoSiScalar, CoSiSuite};
use crate::tree::Tree;

pub struct MainProtocol<S: CoSiSuite> {
    tree: Tree,
    roster_len: usize,
    secrets: HashMap<NodeId, S::Scalar>,
    verifiers: HashMap<NodeId, VerifyFn>,
    root_verify: VerifyFn,
    config: ValidatedConfig,
    logger: slog::Logger,
}

/// One subtree's live run: its sub-leader, the `SubProtocol` driving it, and
/// the members it would mark absent if it never delivers a commitment.
struct LiveSubtree<S: CoSiSuite> {
    sub_leader: NodeId,
    members: Vec<NodeId>,
    sub_protocol: SubProtocol<S>,
}

impl<S: CoSiSuite> MainProtocol<S> {
    pub fn new(
        tree: Tree,
        roster_len: usize,
        secrets: HashMap<NodeId, S::Scalar>,
        verifiers: HashMap<NodeId, VerifyFn>,
        root_verify: VerifyFn,
        config: ValidatedConfig,
        logger: slog::Logger,
    ) -> Self {
        MainProtocol { tree, roster_len, secrets, verifiers, root_verify, config, logger }
    }

    /// Run one full signing ceremony and produce a signature, or a fatal
    /// `CosiError` (spec.md §4.2, "Operation").
    pub async fn run(&self, run: RunId, msg: Vec<u8>, data: Vec<u8>) -> Result<Signature<S>, CosiError> {
        let logger = self.logger.new(o!("run" => run.0));

        // 1. Spawn: one sub-protocol per sub-leader.
        let mut live = Vec::new();
        for &sub_leader in self.tree.sub_leaders() {
            let subtree = self.tree.subtree(sub_leader);
            let members = subtree.all_nodes();
            let mut sub_protocol = SubProtocol::new(
                run,
                subtree,
                self.roster_len,
                &self.secrets,
                &self.verifiers,
                self.config.sub_timeout,
                logger.clone(),
            )?
            .with_await_deadline(self.config.timeout);
            sub_protocol.start(msg.clone(), data.clone())?;
            live.push(LiveSubtree { sub_leader, members, sub_protocol });
        }

        // 2. Self-verify.
        if !(self.root_verify)(&msg, &data) {
            for subtree in &live {
                subtree.sub_protocol.shutdown();
            }
            slog::info!(logger, "root verification failed; aborting run");
            return Err(CosiError::VerificationFailed);
        }

        // The overall root is a participant too: it draws its own nonce and
        // folds its own commitment in alongside the subtrees' aggregates,
        // then later its own response share once the challenge is known.
        let root = self.tree.root();
        let root_secret = &self.secrets[&root];
        let root_nonce = S::Scalar::random();
        let root_commitment = S::Point::from_scalar(&root_nonce);

        // 3 & 4. Collect commitments concurrently — every subtree's
        // `await_commitment` deadline runs against the same wall-clock
        // window rather than being chained one after another — then retry
        // (at most once per subtree) and aggregate.
        let mut commitment_sum = root_commitment;
        let mut mask = Mask::new(self.roster_len);
        let mut responding: Vec<LiveSubtree<S>> = Vec::new();

        let first_pass = join_all(live.into_iter().map(|mut subtree| async move {
            let outcome = subtree.sub_protocol.await_commitment().await;
            (subtree, outcome)
        }))
        .await;

        let mut needs_retry: Vec<LiveSubtree<S>> = Vec::new();
        for (subtree, outcome) in first_pass {
            match outcome {
                CommitmentOutcome::Committed { commitment, mask: sub_mask } => {
                    commitment_sum = commitment_sum.add(&commitment);
                    mask.or(&sub_mask);
                    responding.push(subtree);
                }
                CommitmentOutcome::SubLeaderNotResponding => {
                    slog::warn!(logger, "sub-leader did not respond"; "sub_leader" => subtree.sub_leader.0);
                    needs_retry.push(subtree);
                }
            }
        }

        if self.config.retry_subtree_once {
            let retries = join_all(needs_retry.iter().map(|subtree| self.retry_subtree(run, subtree, &msg, &data, &logger))).await;
            let second_pass = join_all(retries.into_iter().map(|replacement| async move {
                match replacement {
                    Some(mut replacement) => {
                        let outcome = replacement.sub_protocol.await_commitment().await;
                        Some((replacement, outcome))
                    }
                    None => None,
                }
            }))
            .await;

            for (failed, retried) in needs_retry.into_iter().zip(second_pass) {
                match retried {
                    Some((replacement, CommitmentOutcome::Committed { commitment, mask: sub_mask })) => {
                        commitment_sum = commitment_sum.add(&commitment);
                        mask.or(&sub_mask);
                        responding.push(replacement);
                    }
                    Some((replacement, CommitmentOutcome::SubLeaderNotResponding)) => {
                        slog::warn!(logger, "replacement sub-leader also failed"; "sub_leader" => replacement.sub_leader.0);
                        for member in &failed.members {
                            mask.set_absent(member.0);
                        }
                    }
                    None => {
                        for member in &failed.members {
                            mask.set_absent(member.0);
                        }
                    }
                }
            }
        } else {
            for failed in &needs_retry {
                for member in &failed.members {
                    mask.set_absent(member.0);
                }
            }
        }

        // 5. Challenge.
        let e = S::challenge(&commitment_sum, &mask, &msg);
        for subtree in &responding {
            subtree.sub_protocol.deliver_challenge(e.clone());
        }

        // 6. Collect responses concurrently, starting from the root's own share.
        let mut response = root_nonce.add(&e.mul(root_secret));
        let response_results = join_all(responding.into_iter().map(|mut subtree| async move {
            let outcome = subtree.sub_protocol.await_response().await;
            (subtree.sub_leader, outcome)
        }))
        .await;
        for (sub_leader, outcome) in response_results {
            match outcome {
                Some(sub_response) => {
                    response = CoSiScalar::add(&response, &sub_response);
                }
                None => {
                    return Err(CosiError::ProtocolError {
                        node: sub_leader,
                        reason: "sub-leader committed but never responded".into(),
                    });
                }
            }
        }

        // 7. Quorum check.
        let present = mask.popcount_present();
        if present < self.config.threshold {
            return Err(CosiError::QuorumError { present, threshold: self.config.threshold });
        }

        // 8. Emit.
        Ok(Signature { commitment: commitment_sum, response, mask })
    }

    /// Re-issue `failed.sub_leader`'s subtree with a replacement sub-leader
    /// (spec.md §4.2, "the canonical policy is at most one retry per
    /// subtree"). The replacement is the failed sub-leader's first child,
    /// with the rest of the subtree flattened directly under it
    /// (`Tree::reroot`) — see DESIGN.md, "Retry re-topology policy".
    async fn retry_subtree(
        &self,
        run: RunId,
        failed: &LiveSubtree<S>,
        msg: &[u8],
        data: &[u8],
        logger: &slog::Logger,
    ) -> Option<LiveSubtree<S>> {
        let original = self.tree.subtree(failed.sub_leader);
        let replacement_id = *original.children(failed.sub_leader).first()?;
        let rerooted = original.reroot(replacement_id);

        let mut sub_protocol = SubProtocol::new(
            run,
            rerooted,
            self.roster_len,
            &self.secrets,
            &self.verifiers,
            self.config.sub_timeout,
            logger.clone(),
        )
        .ok()?
        .with_await_deadline(self.config.timeout);
        sub_protocol.start(msg.to_vec(), data.to_vec()).ok()?;
        slog::info!(logger, "retrying subtree with replacement sub-leader"; "original" => failed.sub_leader.0, "replacement" => replacement_id.0);

        Some(LiveSubtree { sub_leader: replacement_id, members: failed.members.clone(), sub_protocol })
    }
}
