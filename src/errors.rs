use crate::roster::NodeId;

/// Errors surfaced by the sub-protocol and main-protocol state machines.
///
/// Child-level timeouts and individual verify-failures are absorbed locally
/// (mask bits flipped, run continues) and never produce a `CosiError` — only
/// conditions that are fatal to the current run reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum CosiError {
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("protocol violation at node {node:?}: {reason}")]
    ProtocolError { node: NodeId, reason: String },

    #[error("root verification of the message failed")]
    VerificationFailed,

    #[error("quorum not met: {present} of {threshold} required positions present")]
    QuorumError { present: usize, threshold: usize },

    #[error("run {run} timed out waiting on {what}")]
    Timeout { run: u64, what: String },
}

pub type CosiResult<T> = Result<T, CosiError>;
