//! Dead-variable elimination.
//!
//! Runs after a pass has orphaned values. Each round works from one fresh
//! chain snapshot:
//!
//! 1. For every non-argument variable with no attached use, each defining
//!    operator is deleted if it is pure and none of its results is read,
//!    otherwise the variable is stripped from its results (the operator
//!    stays for its side effects).
//! 2. Repeat until a round changes nothing, since deleting a definition can
//!    orphan the variables it read.
//!
//! Finally, locals and temporaries that no attached operator mentions are
//! marked dropped. Arguments are never dropped.

use smallvec::SmallVec;

use crate::cfg::ControlFlowGraph;
use crate::error::PassError;
use crate::flow::{live_defs, live_uses, FlowChains};
use crate::ir::{OpId, VarId};
use crate::rewrite::DebugInfoPolicy;

/// Remove dead definitions and drop unreferenced variables.
///
/// Returns the number of variables dropped.
pub fn drop_dead_variables(cfg: &mut ControlFlowGraph) -> Result<usize, PassError> {
    let mut rounds = 0usize;
    let mut deleted = 0usize;
    let mut stripped = 0usize;

    loop {
        let chains = cfg.flow_chains();
        let mut changed = false;

        for var in cfg.var_ids().collect::<SmallVec<[VarId; 16]>>() {
            let variable = cfg.var(var);
            if variable.is_argument() || variable.is_dropped() {
                continue;
            }
            if !live_uses(cfg, &chains, var)?.is_empty() {
                continue;
            }
            for def in live_defs(cfg, &chains, var)? {
                if !cfg.op(def).is_attached() {
                    continue;
                }
                if cfg.op(def).is_pure() && results_unused(cfg, &chains, def)? {
                    cfg.remove_operator(def, DebugInfoPolicy::Discard)?;
                    deleted += 1;
                } else {
                    cfg.strip_result(def, var);
                    stripped += 1;
                }
                changed = true;
            }
        }

        rounds += 1;
        if !changed {
            break;
        }
    }

    let dropped = drop_unreferenced(cfg);

    tracing::debug!(
        function = cfg.name(),
        rounds,
        deleted,
        stripped,
        dropped,
        "dropped dead variables",
    );
    Ok(dropped)
}

/// Returns `true` if no result of `op` has an attached reader.
fn results_unused(
    cfg: &ControlFlowGraph,
    chains: &FlowChains,
    op: OpId,
) -> Result<bool, PassError> {
    for &result in cfg.op(op).results() {
        if !live_uses(cfg, chains, result)?.is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Mark every local and temporary that no attached operator mentions.
fn drop_unreferenced(cfg: &mut ControlFlowGraph) -> usize {
    let mut referenced = vec![false; cfg.num_vars()];
    for id in cfg.operators() {
        let op = cfg.op(id);
        for var in op.used_vars().chain(op.results().iter().copied()) {
            referenced[var.index()] = true;
        }
    }

    let mut dropped = 0;
    for var in cfg.var_ids().collect::<SmallVec<[VarId; 16]>>() {
        let variable = cfg.var(var);
        if referenced[var.index()] || variable.is_argument() || variable.is_dropped() {
            continue;
        }
        let variable = cfg.var_mut(var);
        variable.dropped = true;
        variable.index = None;
        dropped += 1;
    }
    if dropped > 0 {
        cfg.bump_version();
    }
    dropped
}

impl ControlFlowGraph {
    /// Remove `var` from the results of an operator that stays for its
    /// side effects.
    pub(crate) fn strip_result(&mut self, op: OpId, var: VarId) {
        self.op_mut(op).results.retain(|result| *result != var);
        self.bump_version();
    }
}
