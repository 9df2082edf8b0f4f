//! Scalar equality inlining.
//!
//! - `r = call Int32::op_Equality(null, a, b)` becomes `r = cmp eq a, b`
//! - `r = call Int32::op_Inequality(null, a, b)` becomes `r = cmp ne a, b`
//! - `r = call Int32::Equals(p, b)` becomes `r = cmp eq *p, b`, with `*p`
//!   resolved through [`load_scalar_address`]
//!
//! Instance `Equals` on `float`/`double` is left alone: it treats NaN as
//! equal to itself, which a raw comparison does not.

use ember_types::{MethodKind, Pool, ScalarKind};

use crate::cfg::ControlFlowGraph;
use crate::error::PassError;
use crate::flow::FlowChains;
use crate::ir::{Condition, OpId, OpKind, Operator};
use crate::rewrite::DebugInfoPolicy;

use super::resolve::load_scalar_address;

pub(super) fn inline_scalar_equality(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
) -> Result<usize, PassError> {
    let calls = cfg.operators_matching(|op| matches!(op.kind, OpKind::Call { .. }));
    let mut inlined = 0;
    for call in calls {
        if try_inline_equality(cfg, pool, chains, call)? {
            inlined += 1;
        }
    }
    Ok(inlined)
}

fn try_inline_equality(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
    call: OpId,
) -> Result<bool, PassError> {
    let op = cfg.op(call);
    let OpKind::Call { method } = op.kind else {
        return Ok(false);
    };
    let target = pool.method(method);
    if !pool.is_scalar(target.owner) {
        return Ok(false);
    }
    let condition = match (target.kind, pool.name(target.name)) {
        (MethodKind::Static, "op_Equality") | (MethodKind::Instance, "Equals") => Condition::Eq,
        (MethodKind::Static, "op_Inequality") => Condition::Ne,
        _ => return Ok(false),
    };
    let Some(result) = op.first_result() else {
        return Ok(false);
    };
    let check_for_null = op.check_for_null();

    let (left, right) = if target.kind == MethodKind::Static {
        let &[_, left, right] = op.arguments() else {
            return Err(arity_violation(call, 3, op.arguments().len()));
        };
        if !pool.is_scalar(cfg.expr_type(&left)) || !pool.is_scalar(cfg.expr_type(&right)) {
            tracing::trace!(call = call.raw(), "equality operands are not scalars");
            return Ok(false);
        }
        (left, right)
    } else {
        let &[this_ptr, right] = op.arguments() else {
            return Err(arity_violation(call, 2, op.arguments().len()));
        };
        if !pool.is_scalar(cfg.expr_type(&right)) {
            return Ok(false);
        }
        if pool.scalar_kind(target.owner).is_some_and(ScalarKind::is_float) {
            tracing::trace!(call = call.raw(), "float Equals is reflexive on NaN");
            return Ok(false);
        }
        let Some(this_ptr) = this_ptr.as_var() else {
            return Ok(false);
        };
        let left = load_scalar_address(cfg, pool, chains, this_ptr, call, check_for_null)?;
        (left.expr, right)
    };

    let compare = Operator::compare(condition, result, left, right);
    cfg.substitute_with_operator(call, compare, DebugInfoPolicy::Keep)?;
    Ok(true)
}

fn arity_violation(call: OpId, expected: usize, found: usize) -> PassError {
    PassError::invariant(
        call,
        format!("scalar equality takes {expected} arguments, found {found}"),
    )
}
