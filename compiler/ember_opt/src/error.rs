//! Error types for IR manipulation, flow analysis and the passes.
//!
//! Pattern mismatches are never errors: a pass that cannot prove a rewrite
//! safe simply skips it. These types report broken invariants, which the
//! caller treats as a compiler bug.

use crate::ir::{BlockId, OpId, VarId};

/// Structural IR invariant failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// A rewrite or insertion targeted an operator no longer in any block.
    #[error("operator {op:?} is detached from the graph")]
    Detached { op: OpId },

    /// Removing the operator would leave its block without a terminator.
    #[error("operator {op:?} is a control operator and cannot be removed")]
    RemovesTerminator { op: OpId },

    /// An operator does not match the operand layout of its kind.
    #[error("{kind} operator {op:?} has {found} {what}, expected {expected}")]
    Arity {
        op: OpId,
        kind: &'static str,
        what: &'static str,
        expected: String,
        found: usize,
    },

    #[error("block {block:?} does not end in a control operator")]
    MissingTerminator { block: BlockId },

    #[error("control operator {op:?} is not the last operator of block {block:?}")]
    MisplacedControl { block: BlockId, op: OpId },

    /// A block lists an operator whose back-pointer names another block.
    #[error("operator {op:?} is listed in block {block:?} but records {recorded:?}")]
    Membership {
        block: BlockId,
        op: OpId,
        recorded: Option<BlockId>,
    },

    #[error("operator {op:?} branches to nonexistent block {target:?}")]
    UnknownTarget { op: OpId, target: BlockId },

    #[error("operator {op:?} references dropped variable {var:?}")]
    DroppedVariable { op: OpId, var: VarId },

    #[error("operator {op:?} defines argument {var:?}")]
    DefinesArgument { op: OpId, var: VarId },
}

/// Flow-analysis cache misuse.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// A chain lookup used an index assigned by a different refresh.
    #[error(
        "spanning-tree index from generation {index_generation} used with chains of generation {chains_generation}"
    )]
    StaleIndex {
        index_generation: u32,
        chains_generation: u32,
    },

    /// The variable was allocated after the chains were computed.
    #[error("variable {var:?} has no spanning-tree index")]
    Unindexed { var: VarId },

    /// The flow cache refreshed inside a batch that relied on one snapshot.
    #[error("flow cache refreshed {refreshes} time(s) since the checkpoint")]
    RefreshedSinceCheckpoint { refreshes: u64 },

    #[error("no cache checkpoint has been recorded")]
    NoCheckpoint,
}

/// Failure of an optimization pass.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PassError {
    /// A recognized pattern violated an invariant its rewrite relies on.
    #[error("invariant violated at {op:?}: {message}")]
    Invariant { op: OpId, message: String },

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl PassError {
    pub(crate) fn invariant(op: OpId, message: impl Into<String>) -> Self {
        PassError::Invariant {
            op,
            message: message.into(),
        }
    }
}
