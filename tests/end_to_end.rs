//! End-to-end scenarios from spec.md §8, over the canonical 7-node tree:
//! root = 0, sub-leaders {1, 4}, sub-leader 1 parents {2, 3}, sub-leader 4
//! parents {5, 6}. `msg = "hello"`, `threshold = 5`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cosi_core::overlay::RunId;
use cosi_core::protocol::common::VerifyFn;
use cosi_core::protocol::MainProtocol;
use cosi_core::roster::{NodeId, Roster};
use cosi_core::settings::ValidatedConfig;
use cosi_core::suite::secp256k1::Secp256k1Suite;
use cosi_core::suite::{CoSiPoint, CoSiScalar, CoSiSuite};
use cosi_core::tree::Tree;

type S = Secp256k1Suite;

const MSG: &[u8] = b"hello";

fn example_tree() -> Tree {
    let parent_of = HashMap::from([
        (NodeId(1), NodeId(0)),
        (NodeId(4), NodeId(0)),
        (NodeId(2), NodeId(1)),
        (NodeId(3), NodeId(1)),
        (NodeId(5), NodeId(4)),
        (NodeId(6), NodeId(4)),
    ]);
    Tree::new(NodeId(0), parent_of)
}

fn secrets() -> HashMap<NodeId, <S as CoSiSuite>::Scalar> {
    (0..7).map(|i| (NodeId(i), <S as CoSiSuite>::Scalar::random())).collect()
}

fn roster_from(secrets: &HashMap<NodeId, <S as CoSiSuite>::Scalar>) -> Roster<S> {
    let publics = (0..7)
        .map(|i| <S as CoSiSuite>::Point::from_scalar(&secrets[&NodeId(i)]))
        .collect();
    Roster::new(publics)
}

fn always_true() -> VerifyFn {
    Arc::new(|_, _| true)
}

/// Sleeps well past any window on its first call, then resolves instantly on
/// every subsequent call — simulates a node that is unresponsive during one
/// run and recovers in time for a retry, without hand-driving `SubProtocol`.
fn slow_on_first_call() -> VerifyFn {
    let calls = Arc::new(AtomicUsize::new(0));
    Arc::new(move |_, _| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_secs(2));
        }
        true
    })
}

fn config() -> ValidatedConfig {
    ValidatedConfig {
        threshold: 5,
        timeout: Duration::from_millis(300),
        sub_timeout: Duration::from_millis(150),
        retry_subtree_once: true,
    }
}

/// A sub-leader's own dispatch task only ever reports back after waiting out
/// its full internal window (it never hangs indefinitely), so the only way
/// `MainProtocol::run` actually observes `SubLeaderNotResponding` is when its
/// own outer `timeout` is shorter than that internal window — here 60ms
/// against a 250ms `sub_timeout`, with one slow child forcing the sub-leader
/// to consume the whole window rather than finish early.
fn config_with_slow_subtree(retry_subtree_once: bool) -> ValidatedConfig {
    ValidatedConfig {
        threshold: 5,
        timeout: Duration::from_millis(60),
        sub_timeout: Duration::from_millis(250),
        retry_subtree_once,
    }
}

fn main_protocol(
    secrets: HashMap<NodeId, <S as CoSiSuite>::Scalar>,
    verifiers: HashMap<NodeId, VerifyFn>,
    root_verify: VerifyFn,
    config: ValidatedConfig,
) -> MainProtocol<S> {
    MainProtocol::new(example_tree(), 7, secrets, verifiers, root_verify, config, cosi_core::logging::test_logger())
}

#[tokio::test]
async fn happy_path_all_present() {
    let secrets = secrets();
    let roster = roster_from(&secrets);
    let protocol = main_protocol(secrets, HashMap::new(), always_true(), config());

    let sig = protocol.run(RunId(1), MSG.to_vec(), vec![]).await.unwrap();
    assert_eq!(sig.mask.popcount_present(), 7);
    assert!(sig.verify(MSG, &roster));
}

#[tokio::test]
async fn leaf_timeout_marks_one_bit_absent() {
    let secrets = secrets();
    let roster = roster_from(&secrets);
    let mut verifiers: HashMap<NodeId, VerifyFn> = HashMap::new();
    // Node 3 never participates: its own verify sleeps well past both the
    // intermediate commitment window and the sub-leader's window, so its
    // parent (node 1) marks it absent.
    verifiers.insert(NodeId(3), Arc::new(|_, _| {
        std::thread::sleep(Duration::from_secs(2));
        true
    }));
    let protocol = main_protocol(secrets, verifiers, always_true(), config());

    let sig = protocol.run(RunId(2), MSG.to_vec(), vec![]).await.unwrap();
    assert!(sig.mask.is_absent(3));
    assert_eq!(sig.mask.popcount_present(), 6);
    assert!(sig.verify(MSG, &roster));
}

#[tokio::test]
async fn verification_rejection_at_a_leaf_sets_its_bit() {
    let secrets = secrets();
    let roster = roster_from(&secrets);
    let mut verifiers: HashMap<NodeId, VerifyFn> = HashMap::new();
    verifiers.insert(NodeId(5), Arc::new(|_, _| false));
    let protocol = main_protocol(secrets, verifiers, always_true(), config());

    let sig = protocol.run(RunId(3), MSG.to_vec(), vec![]).await.unwrap();
    assert!(sig.mask.is_absent(5));
    assert_eq!(sig.mask.popcount_present(), 6);
    assert!(sig.verify(MSG, &roster));
}

#[tokio::test]
async fn root_verification_failure_aborts_the_run() {
    let secrets = secrets();
    let protocol = main_protocol(secrets, HashMap::new(), Arc::new(|_, _| false), config());

    match protocol.run(RunId(4), MSG.to_vec(), vec![]).await {
        Err(cosi_core::CosiError::VerificationFailed) => {}
        other => panic!("expected VerificationFailed, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn sub_leader_timeout_without_retry_fails_quorum() {
    // Node 3 is permanently slow to verify, so sub-leader 1 consumes its
    // entire internal window before it can report — longer than the main
    // protocol's patience, so the whole subtree {1, 2, 3} is marked absent.
    // With no retry, only the root and subtree 4 (4, 5, 6) remain present:
    // 4 positions, under threshold 5.
    let secrets = secrets();
    let mut verifiers: HashMap<NodeId, VerifyFn> = HashMap::new();
    verifiers.insert(NodeId(3), slow_on_first_call());
    let protocol = main_protocol(secrets, verifiers, always_true(), config_with_slow_subtree(false));

    match protocol.run(RunId(5), MSG.to_vec(), vec![]).await {
        Err(cosi_core::CosiError::QuorumError { present, threshold }) => {
            assert_eq!(present, 4);
            assert_eq!(threshold, 5);
        }
        other => panic!("expected QuorumError, got {:?}", other.map(|sig| sig.mask.popcount_present())),
    }
}

#[tokio::test]
async fn sub_leader_timeout_with_retry_succeeds_with_replacement() {
    // Same slow-node-3 setup, but node 3 only stalls on its first verify
    // call; by the time `MainProtocol::retry_subtree` reroots the subtree
    // onto replacement sub-leader 2 and re-announces, node 3's second call
    // resolves immediately, so the retried subtree succeeds in full.
    let secrets = secrets();
    let roster = roster_from(&secrets);
    let mut verifiers: HashMap<NodeId, VerifyFn> = HashMap::new();
    verifiers.insert(NodeId(3), slow_on_first_call());
    let protocol = main_protocol(secrets, verifiers, always_true(), config_with_slow_subtree(true));

    let sig = protocol.run(RunId(6), MSG.to_vec(), vec![]).await.unwrap();
    assert_eq!(sig.mask.popcount_present(), 7);
    assert!(sig.verify(MSG, &roster));
}
