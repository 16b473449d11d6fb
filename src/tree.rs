//! A spanning structure over the roster: root at position 0, `k` sub-leaders
//! as its children, and the remaining nodes partitioned among the
//! sub-leaders' subtrees. Fixed for the duration of a run.

use std::collections::HashMap;

use crate::roster::NodeId;

#[derive(Debug, Clone)]
pub struct Tree {
    root: NodeId,
    children: HashMap<NodeId, Vec<NodeId>>,
    parent: HashMap<NodeId, NodeId>,
    sub_leaders: Vec<NodeId>,
}

impl Tree {
    /// Build a tree from the overall root and, for every other node, its
    /// parent. Sub-leaders are exactly the direct children of `root`.
    pub fn new(root: NodeId, parent_of: HashMap<NodeId, NodeId>) -> Self {
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (&node, &parent) in &parent_of {
            children.entry(parent).or_default().push(node);
        }
        let mut sub_leaders = children.get(&root).cloned().unwrap_or_default();
        sub_leaders.sort();

        Tree {
            root,
            children,
            parent: parent_of,
            sub_leaders,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_root(&self, node: NodeId) -> bool {
        node == self.root
    }

    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.children.get(&node).map(|c| c.is_empty()).unwrap_or(true)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.parent.get(&node).copied()
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Direct children of the overall root: the sub-leaders.
    pub fn sub_leaders(&self) -> &[NodeId] {
        &self.sub_leaders
    }

    /// Every node known to this tree: the root plus every node that has a
    /// parent entry.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut nodes = vec![self.root];
        nodes.extend(self.parent.keys().copied());
        nodes
    }

    /// Every node in the subtree rooted at `sub_leader` (inclusive), found by
    /// a breadth-first walk of `children`.
    pub fn subtree_members(&self, sub_leader: NodeId) -> Vec<NodeId> {
        let mut members = vec![sub_leader];
        let mut frontier = vec![sub_leader];
        while let Some(node) = frontier.pop() {
            for &child in self.children(node) {
                members.push(child);
                frontier.push(child);
            }
        }
        members
    }

    /// A standalone `Tree` for the subtree rooted at `sub_leader`, suitable
    /// for handing to `SubProtocol::new`.
    pub fn subtree(&self, sub_leader: NodeId) -> Tree {
        let mut parent_of = HashMap::new();
        for member in self.subtree_members(sub_leader) {
            if member == sub_leader {
                continue;
            }
            if let Some(parent) = self.parent(member) {
                parent_of.insert(member, parent);
            }
        }
        Tree::new(sub_leader, parent_of)
    }

    /// Flatten this tree's non-root members as direct children of
    /// `new_root`, for the main protocol's bounded sub-leader replacement
    /// policy (spec.md §4.2, "re-issue the sub-protocol with a replacement
    /// sub-leader").
    pub fn reroot(&self, new_root: NodeId) -> Tree {
        let parent_of = self
            .all_nodes()
            .into_iter()
            .filter(|&m| m != new_root)
            .map(|m| (m, new_root))
            .collect();
        Tree::new(new_root, parent_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds the 7-node example tree from spec.md §8: root 0, sub-leaders
    /// {1, 4}, sub-leader 1 parents {2, 3}, sub-leader 4 parents {5, 6}.
    pub fn example_tree() -> Tree {
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

    #[test]
    fn sub_leaders_are_roots_children() {
        let tree = example_tree();
        assert_eq!(tree.sub_leaders(), &[NodeId(1), NodeId(4)]);
    }

    #[test]
    fn subtree_members_cover_the_whole_subtree() {
        let tree = example_tree();
        let mut members = tree.subtree_members(NodeId(1));
        members.sort();
        assert_eq!(members, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn leaves_have_no_children() {
        let tree = example_tree();
        assert!(tree.is_leaf(NodeId(2)));
        assert!(!tree.is_leaf(NodeId(1)));
        assert!(!tree.is_leaf(NodeId(0)));
    }

    #[test]
    fn subtree_is_rooted_at_sub_leader() {
        let tree = example_tree();
        let sub = tree.subtree(NodeId(1));
        assert_eq!(sub.root(), NodeId(1));
        let mut members = sub.all_nodes();
        members.sort();
        assert_eq!(members, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn reroot_flattens_members_under_the_replacement() {
        let tree = example_tree();
        let sub = tree.subtree(NodeId(1));
        let rerooted = sub.reroot(NodeId(2));
        assert_eq!(rerooted.root(), NodeId(2));
        let mut children = rerooted.children(NodeId(2)).to_vec();
        children.sort();
        assert_eq!(children, vec![NodeId(1), NodeId(3)]);
    }
}
