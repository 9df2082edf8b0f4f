//! Redundant address-load cleanup.
//!
//! Runs once the scalar rewrites have left address round-trips behind:
//!
//! 1. `p = &x` with no reader is deleted; `p = &x; v = *p` with `p` read
//!    only by that load folds to `x`.
//! 2. `p = &obj.f; v = *p` becomes `v = obj.f` (static fields likewise).
//! 3. `p = &arr[i]; v = *p` becomes `v = arr[i]`.
//!
//! Each sweep gets its own chain snapshot.

use smallvec::SmallVec;

use ember_types::Pool;

use crate::cfg::ControlFlowGraph;
use crate::error::PassError;
use crate::flow::{live_uses, single_definition, FlowChains};
use crate::ir::{Expression, OpId, OpKind, Operator};
use crate::rewrite::DebugInfoPolicy;

use super::resolve::{forward_value, is_stable};

/// A `p = <address>; v = *p` pair where the load is `p`'s only reader.
struct AddressPair {
    address: OpId,
    load: OpId,
}

/// Find the lone dereference of the pointer defined by `address`.
fn lone_dereference(
    cfg: &ControlFlowGraph,
    chains: &FlowChains,
    address: OpId,
) -> Result<Option<AddressPair>, PassError> {
    let Some(pointer) = cfg.op(address).first_result() else {
        return Ok(None);
    };
    if single_definition(cfg, chains, pointer)?.unique() != Some(address) {
        return Ok(None);
    }
    let users = live_uses(cfg, chains, pointer)?;
    let &[load] = users.as_slice() else {
        return Ok(None);
    };
    if !matches!(cfg.op(load).kind, OpKind::LoadIndirect { .. }) {
        return Ok(None);
    }
    Ok(Some(AddressPair { address, load }))
}

/// Returns `true` if moving a fault from `from` to `to` cannot be observed:
/// both are in the same block and nothing between them has an effect.
fn fault_can_move(cfg: &ControlFlowGraph, from: OpId, to: OpId) -> bool {
    let Some(block) = cfg.op(from).block() else {
        return false;
    };
    if cfg.op(to).block() != Some(block) {
        return false;
    }
    let ops = cfg.block(block).ops();
    let (Some(start), Some(end)) = (
        ops.iter().position(|&id| id == from),
        ops.iter().position(|&id| id == to),
    ) else {
        return false;
    };
    start < end && ops[start + 1..end].iter().all(|&id| cfg.op(id).is_pure())
}

// ── Sweep 1: local addresses ────────────────────────────────────────

pub(super) fn fold_local_addresses(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
) -> Result<usize, PassError> {
    let addresses = cfg.operators_matching(|op| op.kind == OpKind::AddressAssignment);
    let mut folded = 0;
    let mut orphans = 0;
    for address in addresses {
        let Some(pointer) = cfg.op(address).first_result() else {
            continue;
        };
        if live_uses(cfg, chains, pointer)?.is_empty() {
            cfg.remove_operator(address, DebugInfoPolicy::Discard)?;
            orphans += 1;
            continue;
        }
        let Some(pair) = lone_dereference(cfg, chains, address)? else {
            continue;
        };
        let &[addressed] = cfg.op(address).arguments() else {
            continue;
        };
        match cfg.op(pair.load).first_result() {
            // Kept only for its null check; a local's address is never null.
            None => {
                cfg.remove_operator(pair.load, DebugInfoPolicy::Discard)?;
            }
            Some(loaded) => {
                if single_definition(cfg, chains, loaded)?.unique() != Some(pair.load) {
                    continue;
                }
                let stable = is_stable(cfg, pool, chains, &addressed)?;
                forward_value(cfg, chains, pair.load, loaded, addressed, stable)?;
            }
        }
        cfg.remove_operator(address, DebugInfoPolicy::Discard)?;
        folded += 1;
    }
    if orphans > 0 {
        tracing::trace!(orphans, "deleted unread address-of operators");
    }
    Ok(folded + orphans)
}

// ── Sweep 2: field addresses ────────────────────────────────────────

pub(super) fn fold_field_addresses(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
) -> Result<usize, PassError> {
    let addresses = cfg.operators_matching(|op| {
        matches!(
            op.kind,
            OpKind::LoadInstanceFieldAddress { .. } | OpKind::LoadStaticFieldAddress { .. }
        )
    });
    let mut folded = 0;
    for address in addresses {
        let Some(pair) = lone_dereference(cfg, chains, address)? else {
            continue;
        };
        let addr_op = cfg.op(address);
        let kind = match addr_op.kind {
            OpKind::LoadInstanceFieldAddress { field } => OpKind::LoadInstanceField { field },
            OpKind::LoadStaticFieldAddress { field } => OpKind::LoadStaticField { field },
            _ => continue,
        };
        let args = addr_op.args.clone();
        let mut stable = true;
        for arg in &args {
            stable &= is_stable(cfg, pool, chains, arg)?;
        }
        if !stable || (addr_op.may_fault() && !fault_can_move(cfg, address, pair.load)) {
            continue;
        }
        fuse(cfg, pair, kind, args)?;
        folded += 1;
    }
    Ok(folded)
}

// ── Sweep 3: element addresses ──────────────────────────────────────

pub(super) fn fold_element_addresses(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
) -> Result<usize, PassError> {
    let addresses = cfg.operators_matching(|op| op.kind == OpKind::LoadElementAddress);
    let mut folded = 0;
    for address in addresses {
        let Some(pair) = lone_dereference(cfg, chains, address)? else {
            continue;
        };
        let addr_op = cfg.op(address);
        let args = addr_op.args.clone();
        let may_fault = addr_op.may_fault();
        let mut stable = true;
        for arg in &args {
            stable &= is_stable(cfg, pool, chains, arg)?;
        }
        if !stable || (may_fault && !fault_can_move(cfg, address, pair.load)) {
            continue;
        }
        fuse(cfg, pair, OpKind::LoadElement, args)?;
        folded += 1;
    }
    Ok(folded)
}

/// Replace the load of a pair by a direct load of kind `kind`, then delete
/// the address computation.
fn fuse(
    cfg: &mut ControlFlowGraph,
    pair: AddressPair,
    kind: OpKind,
    args: SmallVec<[Expression; 3]>,
) -> Result<(), PassError> {
    let load = cfg.op(pair.load);
    if load.results.is_empty() && matches!(kind, OpKind::LoadStaticField { .. }) {
        // A static field's address is never null.
        cfg.remove_operator(pair.load, DebugInfoPolicy::Discard)?;
        cfg.remove_operator(pair.address, DebugInfoPolicy::Discard)?;
        return Ok(());
    }
    let flags = load.flags | cfg.op(pair.address).flags;
    let fused = Operator::new(kind, args, load.results.clone(), flags);
    cfg.substitute_with_operator(pair.load, fused, DebugInfoPolicy::Keep)?;
    cfg.remove_operator(pair.address, DebugInfoPolicy::Discard)?;
    Ok(())
}
