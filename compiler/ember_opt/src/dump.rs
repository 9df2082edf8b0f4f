//! Textual IR dump.
//!
//! ```text
//! fn main(v0: int) {
//!     let v1: int
//!     let v2: int*
//! bb0:
//!     v2 = addr v1
//!     call int::.ctor(v2, v0)
//!     ret v1
//! }
//! ```

use std::fmt;

use ember_types::{Idx, Pool};

use crate::cfg::ControlFlowGraph;
use crate::ir::{ConstValue, Constant, Expression, OpKind, Operator};

/// [`Display`](fmt::Display) adapter returned by [`ControlFlowGraph::display`].
pub struct CfgDisplay<'a> {
    cfg: &'a ControlFlowGraph,
    pool: &'a Pool,
}

impl ControlFlowGraph {
    /// Render the graph, resolving type and member names through `pool`.
    pub fn display<'a>(&'a self, pool: &'a Pool) -> CfgDisplay<'a> {
        CfgDisplay { cfg: self, pool }
    }
}

impl fmt::Display for CfgDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cfg = self.cfg;
        let params: Vec<String> = cfg
            .var_ids()
            .filter(|&v| cfg.var(v).is_argument())
            .map(|v| format!("v{}: {}", v.raw(), self.pool.display(cfg.var(v).ty)))
            .collect();
        writeln!(f, "fn {}({}) {{", cfg.name(), params.join(", "))?;

        for var in cfg.var_ids() {
            let variable = cfg.var(var);
            if variable.is_argument() || variable.is_dropped() {
                continue;
            }
            writeln!(f, "    let v{}: {}", var.raw(), self.pool.display(variable.ty))?;
        }

        for block in cfg.block_ids() {
            if !cfg.block(block).is_reachable() {
                continue;
            }
            writeln!(f, "bb{}:", block.raw())?;
            for &id in cfg.block(block).ops() {
                write!(f, "    ")?;
                self.operator(f, cfg.op(id))?;
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl CfgDisplay<'_> {
    fn operator(&self, f: &mut fmt::Formatter<'_>, op: &Operator) -> fmt::Result {
        if !op.results.is_empty() {
            let results: Vec<String> = op.results.iter().map(|r| format!("v{}", r.raw())).collect();
            write!(f, "{} = ", results.join(", "))?;
        }
        write!(f, "{}", op.kind.mnemonic())?;

        let args: Vec<String> = op.args.iter().map(|arg| self.expression(arg)).collect();
        let args = args.join(", ");
        match op.kind {
            OpKind::Call { method } => {
                let target = self.pool.method(method);
                write!(
                    f,
                    " {}::{}({args})",
                    self.pool.display(target.owner),
                    self.pool.name(target.name)
                )?;
            }
            OpKind::LoadInstanceField { field }
            | OpKind::LoadStaticField { field }
            | OpKind::LoadInstanceFieldAddress { field }
            | OpKind::LoadStaticFieldAddress { field }
            | OpKind::StoreInstanceField { field } => {
                let def = self.pool.field(field);
                write!(
                    f,
                    " {}::{}",
                    self.pool.display(def.owner),
                    self.pool.name(def.name)
                )?;
                if !args.is_empty() {
                    write!(f, " {args}")?;
                }
            }
            OpKind::LoadIndirect { ty } => write!(f, ".{} {args}", self.pool.display(ty))?,
            OpKind::Compare { condition } => write!(f, ".{} {args}", condition.mnemonic())?,
            OpKind::Jump { target } => write!(f, " bb{}", target.raw())?,
            OpKind::Branch {
                then_block,
                else_block,
            } => write!(f, " {args}, bb{}, bb{}", then_block.raw(), else_block.raw())?,
            _ => {
                if !args.is_empty() {
                    write!(f, " {args}")?;
                }
            }
        }

        if op.check_for_null() && !matches!(op.kind, OpKind::Call { .. }) {
            write!(f, " !null")?;
        }
        if let Some(debug) = op.debug {
            write!(f, " @{}:{}", debug.line, debug.column)?;
        }
        Ok(())
    }

    fn expression(&self, expr: &Expression) -> String {
        match expr {
            Expression::Var(var) => format!("v{}", var.raw()),
            Expression::Const(constant) => self.constant(constant),
        }
    }

    fn constant(&self, constant: &Constant) -> String {
        match constant.value {
            ConstValue::Int(value) => value.to_string(),
            ConstValue::Float(bits) if constant.ty == Idx::F32 => {
                format!("{:?}f", f32::from_bits(bits as u32))
            }
            ConstValue::Float(bits) => format!("{:?}", f64::from_bits(bits)),
            ConstValue::Bool(value) => value.to_string(),
            ConstValue::Null => "null".to_owned(),
        }
    }
}
