//! The roster: an ordered sequence of participant public keys. Position in
//! this sequence is the node's index and the sole identity used in
//! attendance masks and tree structure. Immutable during a run.

use serde::{Deserialize, Serialize};

use crate::suite::CoSiSuite;

/// A roster index, wrapped to avoid confusion with other bare `usize`s at API
/// boundaries (the teacher's `AccountId` + `PartyIdxMapping` play the same
/// role for validator identities).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Ordered sequence of participant public keys, length `N`. Position 0 is
/// the overall root.
#[derive(Clone)]
pub struct Roster<S: CoSiSuite> {
    publics: Vec<S::Point>,
}

impl<S: CoSiSuite> Roster<S> {
    pub fn new(publics: Vec<S::Point>) -> Self {
        Roster { publics }
    }

    pub fn len(&self) -> usize {
        self.publics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publics.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &S::Point {
        &self.publics[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &S::Point)> {
        self.publics.iter().enumerate().map(|(i, p)| (NodeId(i), p))
    }
}
