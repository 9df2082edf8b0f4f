//! Scalar constructor inlining.
//!
//! `p = &local; call Int32::.ctor(p, value)` becomes `local = value`. The
//! rewrite requires proof that `p` points at a stack-resident local: its
//! only definition must be the address-of.

use ember_types::{MethodKind, Pool};

use crate::cfg::ControlFlowGraph;
use crate::error::PassError;
use crate::flow::{single_definition, FlowChains};
use crate::ir::{Expression, OpId, OpKind, Operator};
use crate::rewrite::DebugInfoPolicy;

pub(super) fn inline_scalar_constructors(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    chains: &FlowChains,
) -> Result<usize, PassError> {
    let calls = cfg.operators_matching(|op| matches!(op.kind, OpKind::Call { .. }));
    let mut inlined = 0;
    for call in calls {
        if try_inline_constructor(cfg, pool, chains, call)? {
            inlined += 1;
        }
    }
    Ok(inlined)
}

fn try_inline_constructor(
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
    if target.kind != MethodKind::Constructor || !pool.is_scalar(target.owner) {
        return Ok(false);
    }
    let &[this_ptr, value] = op.arguments() else {
        return Err(PassError::invariant(
            call,
            format!(
                "scalar constructor takes `this` and one value, found {} arguments",
                op.arguments().len()
            ),
        ));
    };
    if !op.results().is_empty() {
        return Ok(false);
    }
    if !pool.can_assign(target.owner, cfg.expr_type(&value)) {
        tracing::trace!(call = call.raw(), "constructor value is not assignable");
        return Ok(false);
    }
    let Some(this_ptr) = this_ptr.as_var() else {
        return Ok(false);
    };
    if cfg.var(this_ptr).is_argument() {
        return Ok(false);
    }
    let Some(def) = single_definition(cfg, chains, this_ptr)?.unique() else {
        tracing::trace!(call = call.raw(), "constructor receiver has no unique source");
        return Ok(false);
    };
    let source = cfg.op(def);
    if source.kind != OpKind::AddressAssignment {
        return Ok(false);
    }
    let Some(local) = source.arguments().first().and_then(Expression::as_var) else {
        return Ok(false);
    };
    let variable = cfg.var(local);
    if variable.is_argument() || variable.ty != target.owner {
        return Ok(false);
    }

    cfg.substitute_with_operator(call, Operator::assign(local, value), DebugInfoPolicy::Keep)?;
    Ok(true)
}
