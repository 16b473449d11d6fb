//! Tree-structured collective Schnorr signing (CoSi): an outer
//! [`protocol::MainProtocol`] coordinates one [`protocol::SubProtocol`] per
//! sub-leader, aggregating per-node Schnorr commitments and responses under
//! an attendance [`mask::Mask`] into a single [`signature::Signature`].

pub mod errors;
pub mod logging;
pub mod mask;
pub mod overlay;
pub mod protocol;
pub mod roster;
pub mod settings;
pub mod signature;
pub mod suite;
pub mod tree;

pub use errors::{CosiError, CosiResult};
pub use protocol::{MainProtocol, SubProtocol};
pub use roster::{NodeId, Roster};
pub use settings::{CosiConfig, ValidatedConfig};
pub use signature::Signature;
pub use tree::Tree;
