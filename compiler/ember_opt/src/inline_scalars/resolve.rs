//! Address resolution and operand stability.

use smallvec::SmallVec;

use ember_types::{MethodKind, Pool};

use crate::cfg::ControlFlowGraph;
use crate::error::PassError;
use crate::flow::{live_defs, live_uses, single_definition, FlowChains, Uniqueness};
use crate::ir::{Expression, OpId, OpKind, Operator, VarId};
use crate::rewrite::DebugInfoPolicy;

/// How [`load_scalar_address`] produced its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Origin {
    /// The pointer's only definition took the address of this expression.
    Addressed,
    /// A load through the pointer was inserted into a fresh temporary.
    Loaded,
    /// The receiver already held the scalar value.
    ByValue,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct Resolved {
    pub(super) expr: Expression,
    pub(super) origin: Origin,
}

/// Resolve a scalar receiver to an expression holding its value at
/// `using_op`.
///
/// A non-argument pointer whose only definition is an address-of yields the
/// addressed expression directly. Any other pointer is loaded through into a
/// fresh temporary just before `using_op`; the load carries
/// `check_for_null`.
pub(super) fn load_scalar_address(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
    pointer: VarId,
    using_op: OpId,
    check_for_null: bool,
) -> Result<Resolved, PassError> {
    let ty = cfg.var(pointer).ty;
    if pool.is_scalar(ty) {
        return Ok(Resolved {
            expr: Expression::Var(pointer),
            origin: Origin::ByValue,
        });
    }
    let Some(pointee) = pool.pointee(ty) else {
        return Err(PassError::invariant(
            using_op,
            format!(
                "scalar receiver {pointer:?} has non-pointer type {}",
                pool.display(ty)
            ),
        ));
    };

    if !cfg.var(pointer).is_argument() {
        match single_definition(cfg, chains, pointer)? {
            Uniqueness::Unique(def) if cfg.op(def).kind == OpKind::AddressAssignment => {
                if let &[addressed] = cfg.op(def).arguments() {
                    return Ok(Resolved {
                        expr: addressed,
                        origin: Origin::Addressed,
                    });
                }
            }
            Uniqueness::Empty => {
                return Err(PassError::invariant(
                    using_op,
                    format!("could not find the source of scalar address {pointer:?}"),
                ));
            }
            Uniqueness::Unique(_) | Uniqueness::Ambiguous(_) => {}
        }
    }

    let temp = cfg.allocate_temporary(pointee);
    let mut load = Operator::load_indirect(pointee, temp, Expression::Var(pointer), check_for_null);
    load.debug = cfg.op(using_op).debug;
    cfg.insert_before(using_op, load)?;
    tracing::trace!(
        pointer = pointer.raw(),
        temp = temp.raw(),
        check_for_null,
        "loaded scalar through pointer",
    );
    Ok(Resolved {
        expr: Expression::Var(temp),
        origin: Origin::Loaded,
    })
}

/// Returns `true` if no store can reach `expr` behind the chains' back.
///
/// Constants always qualify. A variable does when it has at most one
/// definition and every address taken of it is only read through.
pub(super) fn is_stable(
    cfg: &ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
    expr: &Expression,
) -> Result<bool, PassError> {
    let Some(var) = expr.as_var() else {
        return Ok(true);
    };
    if matches!(single_definition(cfg, chains, var)?, Uniqueness::Ambiguous(_)) {
        return Ok(false);
    }
    for user in live_uses(cfg, chains, var)? {
        let op = cfg.op(user);
        if op.kind != OpKind::AddressAssignment {
            continue;
        }
        let Some(address) = op.first_result() else {
            continue;
        };
        if !pointer_is_read_only(cfg, pool, chains, address)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Returns `true` if every attached reader of `pointer` only reads through
/// it.
fn pointer_is_read_only(
    cfg: &ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
    pointer: VarId,
) -> Result<bool, PassError> {
    for user in live_uses(cfg, chains, pointer)? {
        let op = cfg.op(user);
        let read_only = match op.kind {
            OpKind::LoadIndirect { .. }
            | OpKind::LoadInstanceField { .. }
            | OpKind::Compare { .. } => true,
            OpKind::Call { method } => {
                let target = pool.method(method);
                target.kind == MethodKind::Instance
                    && pool.is_scalar(target.owner)
                    && op.arguments().first() == Some(&Expression::Var(pointer))
                    && !op.arguments()[1..].contains(&Expression::Var(pointer))
            }
            _ => false,
        };
        if !read_only {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Replace a value-producing operator's reads of its result by `value`.
///
/// Every reader of `result` is redirected and the operator becomes a no-op
/// when `value` is stable and each reader sees the value `value` held at
/// `op`. Otherwise the operator becomes the copy `result = value`, which
/// reads `value` at the original point. Returns `true` for the redirecting
/// form.
pub(super) fn forward_value(
    cfg: &mut ControlFlowGraph,
    chains: &FlowChains,
    op: OpId,
    result: VarId,
    value: Expression,
    stable: bool,
) -> Result<bool, PassError> {
    let redirect = stable
        && value.as_var() != Some(result)
        && readers_see_value_at(cfg, chains, op, result, &value)?;
    if redirect {
        cfg.replace_all_uses(chains, result, &value)?;
        cfg.remove_operator(op, DebugInfoPolicy::Keep)?;
    } else {
        cfg.substitute_with_operator(op, Operator::assign(result, value), DebugInfoPolicy::Keep)?;
    }
    Ok(redirect)
}

/// Returns `true` if every reader of `result` follows `op` in its block with
/// no write of `value` in between, and none takes `result`'s address.
///
/// `result` must be defined only by `op`.
fn readers_see_value_at(
    cfg: &ControlFlowGraph,
    chains: &FlowChains,
    op: OpId,
    result: VarId,
    value: &Expression,
) -> Result<bool, PassError> {
    let Some(block) = cfg.op(op).block() else {
        return Ok(false);
    };
    let ops = cfg.block(block).ops();
    let position = |id: OpId| ops.iter().position(|&other| other == id);
    let Some(start) = position(op) else {
        return Ok(false);
    };

    let mut writes = SmallVec::<[usize; 4]>::new();
    if let Some(var) = value.as_var() {
        for def in live_defs(cfg, chains, var)? {
            if let Some(at) = position(def) {
                writes.push(at);
            }
        }
    }

    for reader in live_uses(cfg, chains, result)? {
        if cfg.op(reader).kind == OpKind::AddressAssignment {
            tracing::trace!(op = op.raw(), "forwarded result has its address taken");
            return Ok(false);
        }
        let Some(end) = position(reader) else {
            return Ok(false);
        };
        if end <= start || writes.iter().any(|&at| start < at && at < end) {
            return Ok(false);
        }
    }
    Ok(true)
}
