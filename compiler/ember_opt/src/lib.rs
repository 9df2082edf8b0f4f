//! IR rewrite engine and scalar lowering for the Ember AOT compiler.
//!
//! This crate provides:
//!
//! - **Operator IR** ([`Operator`], [`OpKind`], [`Expression`]) and the
//!   **control-flow graph** ([`ControlFlowGraph`]) that owns it.
//!
//! - **Flow analysis** ([`FlowChains`]): memoized definition and use chains,
//!   recomputed when the graph version changes, plus the safety queries
//!   [`single_definition`] and [`single_use`].
//!
//! - **Rewrite primitives** (`substitute_with_operator`, `substitute_usage`,
//!   `remove_operator`, `insert_before`, `replace_all_uses` on
//!   [`ControlFlowGraph`]) with an explicit [`DebugInfoPolicy`].
//!
//! - **Dead-variable elimination** ([`drop_dead_variables`]).
//!
//! - **Scalar lowering** ([`inline_scalars`]): constructors, equality and
//!   `m_value` accesses of runtime scalar wrappers become native operations.
//!
//! - **A reference interpreter** ([`eval`]) used to check that rewrites
//!   preserve behavior.
//!
//! # Tracing
//!
//! Passes log through `tracing`. Tests install a subscriber when `RUST_LOG`
//! is set:
//! - `RUST_LOG=ember_opt=debug`: per-pass summaries
//! - `RUST_LOG=ember_opt=trace`: every skipped pattern and rewrite

mod cfg;
mod cleanup;
mod dump;
mod error;
pub mod eval;
mod flow;
mod inline_scalars;
mod ir;
mod rewrite;

#[cfg(test)]
mod test_helpers;

pub use cfg::{BasicBlock, ControlFlowGraph};
pub use cleanup::drop_dead_variables;
pub use dump::CfgDisplay;
pub use error::{FlowError, IrError, PassError};
pub use flow::{single_definition, single_use, FlowChains, Uniqueness};
pub use inline_scalars::{
    inline_scalars, inline_scalars_with_stats, run, InlineScalarsConfig, InlineScalarsStats,
};
pub use ir::{
    BlockId, Condition, ConstValue, Constant, DebugInfo, Expression, OpFlags, OpId, OpKind,
    Operator, SpanningTreeIndex, VarId, VarKind, Variable,
};
pub use rewrite::DebugInfoPolicy;

#[cfg(test)]
mod tests;
