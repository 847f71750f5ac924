//! Error taxonomy.
//!
//! - Structural errors ([`TreeError`]) are returned synchronously and leave
//!   the tree unchanged.
//! - [`ActionFailure`] aborts one flow execution and goes to the diagnostic
//!   sink; it is never fatal to the runtime.
//! - Dangling references are not errors at all. They degrade to empty values
//!   or no-ops wherever they are read.

use thiserror::Error;

use crate::types::{BlockId, FlowId, PageId, VariableId};

/// Why a parent was refused by `create` or `move_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParentRejection {
    #[error("parent does not exist")]
    Unknown,
    #[error("parent is archived")]
    Archived,
    #[error("maximum nesting depth of {0} exceeded")]
    TooDeep(usize),
}

/// Rejected structural operation on a component tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("block {0} not found")]
    NotFound(BlockId),
    #[error("cannot place block under {parent}: {reason}")]
    InvalidParent {
        parent: BlockId,
        reason: ParentRejection,
    },
    #[error("moving block {block} under {target} would create a cycle")]
    Cycle { block: BlockId, target: BlockId },
}

/// A structural invariant that does not hold (snapshot validation, tests).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("duplicate block id {0}")]
    DuplicateId(BlockId),
    #[error("block {block} references missing parent {parent}")]
    MissingParent { block: BlockId, parent: BlockId },
    #[error("block {0} is its own ancestor")]
    Cycle(BlockId),
    #[error("sibling order under {parent:?} is not dense: {indices:?}")]
    SparseOrder {
        parent: Option<BlockId>,
        indices: Vec<usize>,
    },
}

/// Error from a project-level registry operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectError {
    #[error("page {0} not found")]
    PageNotFound(PageId),
    #[error("flow {0} not found")]
    FlowNotFound(FlowId),
    #[error("variable {0} not found")]
    VariableNotFound(VariableId),
    #[error("action index {index} out of range for flow {flow} ({len} actions)")]
    ActionIndex {
        flow: FlowId,
        index: usize,
        len: usize,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] InvariantViolation),
    #[error("snapshot version {found} is not supported (expected {supported})")]
    SnapshotVersion { found: u32, supported: u32 },
}

/// A host capability (alert, navigation, network) rejected a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CapabilityError(pub String);

impl CapabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Why one action in a flow failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionFailure {
    #[error("{action} capability failed: {source}")]
    Capability {
        action: &'static str,
        #[source]
        source: CapabilityError,
    },
    #[error("malformed params: {0}")]
    MalformedParams(String),
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("arithmetic produced a non-finite number")]
    NonFiniteNumber,
}

/// Misuse of the flow runtime's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("flow runtime is not running")]
    NotRunning,
}

/// Failure to store or retrieve a snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no snapshot has been saved")]
    Empty,
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
