//! Single-process [`Overlay`] backed by per-node, per-channel
//! `tokio::sync::mpsc` channels. Used by tests and by single-process
//! deployments that don't need a real network stack, the way the teacher's
//! `multisig_p2p`/`p2p_muxer` modules sit underneath the abstract ceremony
//! transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::overlay::{ChannelKind, Envelope, MessageBody, Overlay, RunId};
use crate::roster::NodeId;
use crate::suite::CoSiSuite;
use crate::tree::Tree;

fn channel_kind<S: CoSiSuite>(body: &MessageBody<S>) -> ChannelKind {
    match body {
        MessageBody::Announcement { .. } => ChannelKind::Announcement,
        MessageBody::Commitment { .. } => ChannelKind::Commitment,
        MessageBody::Challenge { .. } => ChannelKind::Challenge,
        MessageBody::Response { .. } => ChannelKind::Response,
        MessageBody::Stop => ChannelKind::Stop,
    }
}

const ALL_KINDS: [ChannelKind; 5] = [
    ChannelKind::Announcement,
    ChannelKind::Commitment,
    ChannelKind::Challenge,
    ChannelKind::Response,
    ChannelKind::Stop,
];

type ReceiverMap<S> = HashMap<(NodeId, ChannelKind), mpsc::UnboundedReceiver<Envelope<S>>>;

/// Shared, in-memory fabric for one tree. Create one per run and hand a
/// [`OverlayHandle`] to each simulated node's dispatch task.
pub struct InMemoryNetwork<S: CoSiSuite> {
    tree: Tree,
    run: RunId,
    senders: HashMap<(NodeId, ChannelKind), mpsc::UnboundedSender<Envelope<S>>>,
    receivers: Mutex<ReceiverMap<S>>,
}

impl<S: CoSiSuite> InMemoryNetwork<S> {
    pub fn new(tree: Tree, run: RunId) -> Arc<Self> {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for node in tree.all_nodes() {
            for kind in ALL_KINDS {
                let (tx, rx) = mpsc::unbounded_channel();
                senders.insert((node, kind), tx);
                receivers.insert((node, kind), rx);
            }
        }
        Arc::new(InMemoryNetwork {
            tree,
            run,
            senders,
            receivers: Mutex::new(receivers),
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// A handle bound to `node` for the lifetime of this run.
    pub fn handle(self: &Arc<Self>, node: NodeId) -> OverlayHandle<S> {
        OverlayHandle {
            net: self.clone(),
            node,
        }
    }
}

#[derive(Clone)]
pub struct OverlayHandle<S: CoSiSuite> {
    net: Arc<InMemoryNetwork<S>>,
    node: NodeId,
}

impl<S: CoSiSuite> Overlay<S> for OverlayHandle<S> {
    fn tree_node(&self) -> NodeId {
        self.node
    }

    fn is_root(&self) -> bool {
        self.net.tree.is_root(self.node)
    }

    fn is_leaf(&self) -> bool {
        self.net.tree.is_leaf(self.node)
    }

    fn children(&self) -> Vec<NodeId> {
        self.net.tree.children(self.node).to_vec()
    }

    fn parent(&self) -> Option<NodeId> {
        self.net.tree.parent(self.node)
    }

    fn send_to_children(&self, body: MessageBody<S>) {
        for child in self.children() {
            self.send_to(child, body.clone());
        }
    }

    fn send_to_parent(&self, body: MessageBody<S>) {
        if let Some(parent) = self.parent() {
            self.send_to(parent, body);
        }
    }

    fn send_to(&self, node: NodeId, body: MessageBody<S>) {
        let kind = channel_kind(&body);
        if let Some(tx) = self.net.senders.get(&(node, kind)) {
            // The receiving node may already have terminated (shutdown or a
            // fatal error elsewhere in the run); a dropped receiver is not
            // this node's problem to report.
            let _ = tx.send(Envelope {
                run: self.net.run,
                sender: self.node,
                body,
            });
        }
    }

    fn broadcast(&self, body: MessageBody<S>) {
        for node in self.net.tree.all_nodes() {
            self.send_to(node, body.clone());
        }
    }

    fn register_channel(&self, kind: ChannelKind) -> mpsc::UnboundedReceiver<Envelope<S>> {
        self.net
            .receivers
            .lock()
            .unwrap()
            .remove(&(self.node, kind))
            .expect("channel already registered for this node")
    }
}
