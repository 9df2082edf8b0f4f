//! Control-flow graph container.
//!
//! [`ControlFlowGraph`] owns every variable, operator and basic block of one
//! method body, plus the flow-analysis cache. Structural changes go through
//! its methods (builders here, rewrite primitives in [`crate::rewrite`]);
//! each one bumps [`version`](ControlFlowGraph::version), which is how the
//! flow cache knows it is stale.
//!
//! Operators are stored in an append-only arena. Removing or replacing an
//! operator detaches it from its block but keeps its slot, so an [`OpId`]
//! never dangles and never silently names a different operator.

use smallvec::SmallVec;

use ember_types::Idx;

use crate::error::IrError;
use crate::flow::FlowState;
use crate::ir::{BlockId, Expression, OpId, Operator, VarId, VarKind, Variable};

// ── Blocks ──────────────────────────────────────────────────────────

/// A straight-line sequence of operators ending in a control operator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicBlock {
    pub(crate) ops: Vec<OpId>,
    pub(crate) reachable: bool,
}

impl BasicBlock {
    /// The operators of the block, in execution order.
    #[inline]
    pub fn ops(&self) -> &[OpId] {
        &self.ops
    }

    /// Reachability from the entry block, as of the last
    /// [`update_flow_information`](ControlFlowGraph::update_flow_information).
    #[inline]
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    #[inline]
    pub fn terminator(&self) -> Option<OpId> {
        self.ops.last().copied()
    }
}

// ── Graph ───────────────────────────────────────────────────────────

/// One method body.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    name: String,
    vars: Vec<Variable>,
    ops: Vec<Operator>,
    blocks: Vec<BasicBlock>,
    entry: BlockId,
    version: u64,
    pub(crate) flow: FlowState,
}

impl ControlFlowGraph {
    /// Create an empty graph with a single (entry) block.
    pub fn new(name: impl Into<String>) -> Self {
        ControlFlowGraph {
            name: name.into(),
            vars: Vec::new(),
            ops: Vec::new(),
            blocks: vec![BasicBlock {
                ops: Vec::new(),
                reachable: true,
            }],
            entry: BlockId::new(0),
            version: 0,
            flow: FlowState::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Structural version. Bumped by every mutation.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    // === Variables ===

    fn push_var(&mut self, kind: VarKind, ty: Idx) -> VarId {
        let raw = u32::try_from(self.vars.len())
            .unwrap_or_else(|_| panic!("variable count exceeds u32::MAX"));
        self.vars.push(Variable::new(kind, ty));
        self.bump_version();
        VarId::new(raw)
    }

    /// Declare a method parameter.
    pub fn add_argument(&mut self, ty: Idx) -> VarId {
        self.push_var(VarKind::Argument, ty)
    }

    /// Declare a local variable.
    pub fn add_local(&mut self, ty: Idx) -> VarId {
        self.push_var(VarKind::Local, ty)
    }

    /// Allocate a fresh temporary.
    ///
    /// The temporary has no spanning-tree index until the next flow-cache
    /// refresh; chain lookups on it fail with
    /// [`FlowError::Unindexed`](crate::FlowError::Unindexed).
    pub fn allocate_temporary(&mut self, ty: Idx) -> VarId {
        let var = self.push_var(VarKind::Temporary, ty);
        tracing::trace!(var = var.raw(), ty = ty.raw(), "allocated temporary");
        var
    }

    #[inline]
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    #[inline]
    pub(crate) fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.index()]
    }

    #[inline]
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len()).map(|i| VarId::new(i as u32))
    }

    /// The static type of an operand.
    pub fn expr_type(&self, expr: &Expression) -> Idx {
        match expr {
            Expression::Var(var) => self.var(*var).ty,
            Expression::Const(constant) => constant.ty,
        }
    }

    // === Blocks ===

    /// Append an empty block.
    pub fn add_block(&mut self) -> BlockId {
        let raw = u32::try_from(self.blocks.len())
            .unwrap_or_else(|_| panic!("block count exceeds u32::MAX"));
        self.blocks.push(BasicBlock {
            ops: Vec::new(),
            reachable: true,
        });
        self.bump_version();
        BlockId::new(raw)
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(|i| BlockId::new(i as u32))
    }

    /// Successors of a block, taken from its terminator.
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        match self.block(block).terminator() {
            Some(term) if self.op(term).is_control() => self.op(term).successors(),
            _ => SmallVec::new(),
        }
    }

    // === Operators ===

    /// Store an unattached operator in the arena.
    pub(crate) fn push_op(&mut self, mut op: Operator) -> OpId {
        let raw = u32::try_from(self.ops.len())
            .unwrap_or_else(|_| panic!("operator count exceeds u32::MAX"));
        op.block = None;
        for var in op.used_vars().chain(op.results().iter().copied()) {
            self.touch(var);
        }
        self.ops.push(op);
        OpId::new(raw)
    }

    /// Append an operator to the end of `block`.
    pub fn append(&mut self, block: BlockId, op: Operator) -> OpId {
        let id = self.push_op(op);
        self.ops[id.index()].block = Some(block);
        self.blocks[block.index()].ops.push(id);
        self.bump_version();
        id
    }

    #[inline]
    pub fn op(&self, id: OpId) -> &Operator {
        &self.ops[id.index()]
    }

    #[inline]
    pub(crate) fn op_mut(&mut self, id: OpId) -> &mut Operator {
        &mut self.ops[id.index()]
    }

    #[inline]
    pub(crate) fn block_ops_mut(&mut self, block: BlockId) -> &mut Vec<OpId> {
        &mut self.blocks[block.index()].ops
    }

    /// Every attached operator, in block order.
    pub fn operators(&self) -> impl Iterator<Item = OpId> + '_ {
        self.blocks.iter().flat_map(|block| block.ops.iter().copied())
    }

    /// Attached operators satisfying `pred`, in block order.
    ///
    /// The result is a snapshot: rewriting one of the returned operators
    /// does not disturb iteration over the rest.
    pub fn operators_matching(&self, mut pred: impl FnMut(&Operator) -> bool) -> Vec<OpId> {
        self.operators().filter(|&id| pred(self.op(id))).collect()
    }

    /// Block and position of an attached operator.
    pub(crate) fn position_of(&self, id: OpId) -> Result<(BlockId, usize), IrError> {
        let block = self.op(id).block.ok_or(IrError::Detached { op: id })?;
        let pos = self.blocks[block.index()]
            .ops
            .iter()
            .position(|&listed| listed == id)
            .ok_or(IrError::Membership {
                block,
                op: id,
                recorded: Some(block),
            })?;
        Ok((block, pos))
    }

    // === Flow information ===

    /// Recompute reachability from the entry block.
    ///
    /// Operators of unreachable blocks are detached; the blocks stay in
    /// place, empty and marked unreachable. Returns the number of blocks
    /// emptied by this call.
    pub fn update_flow_information(&mut self) -> usize {
        let mut reachable = vec![false; self.blocks.len()];
        let mut worklist = vec![self.entry];
        while let Some(block) = worklist.pop() {
            if std::mem::replace(&mut reachable[block.index()], true) {
                continue;
            }
            for succ in self.successors(block) {
                if succ.index() < reachable.len() && !reachable[succ.index()] {
                    worklist.push(succ);
                }
            }
        }

        let mut emptied = 0;
        for (idx, block) in self.blocks.iter_mut().enumerate() {
            block.reachable = reachable[idx];
            if block.reachable || block.ops.is_empty() {
                continue;
            }
            for id in block.ops.drain(..) {
                self.ops[id.index()].block = None;
            }
            emptied += 1;
        }

        if emptied > 0 {
            self.bump_version();
            tracing::debug!(
                function = self.name.as_str(),
                blocks = emptied,
                "detached unreachable blocks",
            );
        }
        emptied
    }

    // === Verification ===

    /// Check the structural invariants of the graph.
    ///
    /// Every reachable block ends in exactly one control operator, every
    /// listed operator records its block, branch targets exist, operands
    /// match their kind's layout, no operator references a dropped
    /// variable, and no operator defines an argument.
    pub fn verify(&self) -> Result<(), IrError> {
        for block_id in self.block_ids() {
            let block = self.block(block_id);
            if !block.reachable {
                continue;
            }
            let Some(last) = block.terminator() else {
                return Err(IrError::MissingTerminator { block: block_id });
            };
            for &id in &block.ops {
                let op = self.op(id);
                if op.block != Some(block_id) {
                    return Err(IrError::Membership {
                        block: block_id,
                        op: id,
                        recorded: op.block,
                    });
                }
                if op.is_control() && id != last {
                    return Err(IrError::MisplacedControl { block: block_id, op: id });
                }
                self.verify_operator(id, op)?;
            }
            if !self.op(last).is_control() {
                return Err(IrError::MissingTerminator { block: block_id });
            }
        }
        Ok(())
    }

    fn verify_operator(&self, id: OpId, op: &Operator) -> Result<(), IrError> {
        let check = |what: &'static str, found: usize, (lo, hi): (usize, usize)| {
            if (lo..=hi).contains(&found) {
                return Ok(());
            }
            let expected = if lo == hi {
                lo.to_string()
            } else {
                format!("{lo}..={hi}")
            };
            Err(IrError::Arity {
                op: id,
                kind: op.kind.mnemonic(),
                what,
                expected,
                found,
            })
        };
        if let Some(range) = op.kind.arg_range() {
            check("arguments", op.args.len(), range)?;
        }
        check("results", op.results.len(), op.kind.result_range())?;

        for target in op.successors() {
            if target.index() >= self.blocks.len() {
                return Err(IrError::UnknownTarget { op: id, target });
            }
        }
        for var in op.used_vars().chain(op.results.iter().copied()) {
            if self.var(var).dropped {
                return Err(IrError::DroppedVariable { op: id, var });
            }
        }
        for &var in &op.results {
            if self.var(var).is_argument() {
                return Err(IrError::DefinesArgument { op: id, var });
            }
        }
        Ok(())
    }
}
