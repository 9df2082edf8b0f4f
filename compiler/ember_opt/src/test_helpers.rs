//! Shared test utilities for the IR, flow and pass tests.
//!
//! Only compiled in test builds.

use std::sync::Once;

use ember_types::{Idx, Pool, ScalarMembers};

use crate::cfg::ControlFlowGraph;
use crate::ir::{BlockId, Constant, Expression, OpKind, VarId};

static TRACING_INIT: Once = Once::new();

/// Install a fmt subscriber when `RUST_LOG` is set.
pub(crate) fn init_test_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_test_writer())
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

/// A pool with the members of the commonly used scalars declared.
pub(crate) struct Scalars {
    pub(crate) pool: Pool,
    pub(crate) int: ScalarMembers,
    pub(crate) long: ScalarMembers,
    pub(crate) double: ScalarMembers,
    pub(crate) int_ptr: Idx,
    pub(crate) double_ptr: Idx,
}

pub(crate) fn scalars() -> Scalars {
    let mut pool = Pool::new();
    let members = |pool: &mut Pool, ty: Idx| {
        pool.declare_scalar_members(ty)
            .unwrap_or_else(|| panic!("{ty:?} is a scalar"))
    };
    let int = members(&mut pool, Idx::I32);
    let long = members(&mut pool, Idx::I64);
    let double = members(&mut pool, Idx::F64);
    let int_ptr = pool.pointer_to(Idx::I32);
    let double_ptr = pool.pointer_to(Idx::F64);
    Scalars {
        pool,
        int,
        long,
        double,
        int_ptr,
        double_ptr,
    }
}

/// Shorthand for `VarId::new(n)`.
pub(crate) fn v(n: u32) -> VarId {
    VarId::new(n)
}

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// Variable operand.
pub(crate) fn var(var: VarId) -> Expression {
    Expression::Var(var)
}

/// `int` constant operand.
pub(crate) fn int(value: i64) -> Expression {
    Expression::Const(Constant::int(Idx::I32, value))
}

/// The receiver slot of a static call.
pub(crate) fn null_receiver() -> Expression {
    Expression::Const(Constant::null(Idx::OBJECT))
}

/// Number of attached operators whose kind satisfies `pred`.
pub(crate) fn count_ops(cfg: &ControlFlowGraph, pred: impl Fn(&OpKind) -> bool) -> usize {
    cfg.operators().filter(|&id| pred(&cfg.op(id).kind)).count()
}

/// Kinds of the attached operators of `block`, in order.
pub(crate) fn kinds(cfg: &ControlFlowGraph, block: BlockId) -> Vec<OpKind> {
    cfg.block(block)
        .ops()
        .iter()
        .map(|&id| cfg.op(id).kind)
        .collect()
}
