//! Scalar `m_value` access removal.
//!
//! A scalar wrapper occupies exactly its raw value, so:
//!
//! - `v = p->m_value` reads `*p` (or `v = x.m_value` reads `x`),
//! - `fp = &p->m_value` is `p` itself (or `&x` for a by-value receiver).
//!
//! Both rewrites require the result to be defined only by the access
//! being removed.

use ember_types::Pool;

use crate::cfg::ControlFlowGraph;
use crate::error::PassError;
use crate::flow::{single_definition, FlowChains};
use crate::ir::{OpId, OpKind, Operator};
use crate::rewrite::DebugInfoPolicy;

use super::resolve::{forward_value, is_stable, load_scalar_address, Origin};

/// Remove loads of a scalar's own field.
pub(super) fn remove_scalar_field_loads(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
) -> Result<usize, PassError> {
    let loads =
        cfg.operators_matching(|op| matches!(op.kind, OpKind::LoadInstanceField { .. }));
    let mut removed = 0;
    for load in loads {
        if try_remove_field_load(cfg, pool, chains, load)? {
            removed += 1;
        }
    }
    Ok(removed)
}

fn try_remove_field_load(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
    load: OpId,
) -> Result<bool, PassError> {
    let op = cfg.op(load);
    let OpKind::LoadInstanceField { field } = op.kind else {
        return Ok(false);
    };
    if !pool.is_scalar(pool.field(field).owner) {
        return Ok(false);
    }
    let &[receiver] = op.arguments() else {
        return Err(PassError::invariant(load, "field load takes exactly one receiver"));
    };
    let Some(receiver) = receiver.as_var() else {
        return Ok(false);
    };
    let Some(loaded) = op.first_result() else {
        return Ok(false);
    };
    let check_for_null = op.check_for_null();
    let receiver_ty = cfg.var(receiver).ty;
    if !pool.is_scalar(receiver_ty) && pool.pointee(receiver_ty).is_none() {
        tracing::trace!(load = load.raw(), "field load through a boxed receiver");
        return Ok(false);
    }
    if single_definition(cfg, chains, loaded)?.unique() != Some(load) {
        tracing::trace!(load = load.raw(), "field load result has other definitions");
        return Ok(false);
    }

    let resolved = load_scalar_address(cfg, pool, chains, receiver, load, check_for_null)?;
    let stable = match resolved.origin {
        Origin::Loaded => true,
        Origin::Addressed | Origin::ByValue => is_stable(cfg, pool, chains, &resolved.expr)?,
    };
    forward_value(cfg, chains, load, loaded, resolved.expr, stable)?;
    Ok(true)
}

/// Remove address-of-field operators on a scalar's own field.
pub(super) fn remove_scalar_field_addresses(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
) -> Result<usize, PassError> {
    let addresses =
        cfg.operators_matching(|op| matches!(op.kind, OpKind::LoadInstanceFieldAddress { .. }));
    let mut removed = 0;
    for address in addresses {
        if try_remove_field_address(cfg, pool, chains, address)? {
            removed += 1;
        }
    }
    Ok(removed)
}

fn try_remove_field_address(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
    address: OpId,
) -> Result<bool, PassError> {
    let op = cfg.op(address);
    let OpKind::LoadInstanceFieldAddress { field } = op.kind else {
        return Ok(false);
    };
    if !pool.is_scalar(pool.field(field).owner) {
        return Ok(false);
    }
    let &[receiver] = op.arguments() else {
        return Err(PassError::invariant(
            address,
            "field address takes exactly one receiver",
        ));
    };
    let Some(field_ptr) = op.first_result() else {
        return Ok(false);
    };
    if single_definition(cfg, chains, field_ptr)?.unique() != Some(address) {
        return Ok(false);
    }

    if pool.is_scalar(cfg.expr_type(&receiver)) {
        let Some(value) = receiver.as_var() else {
            return Ok(false);
        };
        let address_of = Operator::address_of(field_ptr, value);
        cfg.substitute_with_operator(address, address_of, DebugInfoPolicy::Keep)?;
        return Ok(true);
    }

    if pool.pointee(cfg.expr_type(&receiver)).is_none() {
        return Ok(false);
    }
    let stable = is_stable(cfg, pool, chains, &receiver)?;
    forward_value(cfg, chains, address, field_ptr, receiver, stable)?;
    Ok(true)
}
