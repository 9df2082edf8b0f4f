//! Rewrite primitives.
//!
//! The only ways a pass may change an attached operator. Each primitive
//! keeps block membership consistent, bumps the graph version, and refuses
//! to act on a detached operator.

use crate::cfg::ControlFlowGraph;
use crate::error::{IrError, PassError};
use crate::flow::{live_uses, FlowChains};
use crate::ir::{Expression, OpId, Operator, VarId};

/// What happens to the source position of a replaced operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugInfoPolicy {
    /// The replacement inherits the old position unless it carries its own.
    Keep,
    /// The old position is dropped.
    Discard,
}

impl ControlFlowGraph {
    /// Put `new` in place of `old`, detaching `old`.
    ///
    /// Returns the replacement's ID.
    pub fn substitute_with_operator(
        &mut self,
        old: OpId,
        mut new: Operator,
        policy: DebugInfoPolicy,
    ) -> Result<OpId, IrError> {
        let (block, pos) = self.position_of(old)?;
        match policy {
            DebugInfoPolicy::Keep => {
                if new.debug.is_none() {
                    new.debug = self.op(old).debug;
                }
            }
            DebugInfoPolicy::Discard => self.op_mut(old).debug = None,
        }

        let id = self.push_op(new);
        self.op_mut(id).block = Some(block);
        self.op_mut(old).block = None;
        self.block_ops_mut(block)[pos] = id;
        self.bump_version();
        tracing::trace!(old = old.raw(), new = id.raw(), "substituted operator");
        Ok(id)
    }

    /// Replace every read of `old` in one operator by `new`.
    ///
    /// Returns the number of replaced occurrences.
    pub fn substitute_usage(
        &mut self,
        op: OpId,
        old: VarId,
        new: &Expression,
    ) -> Result<usize, IrError> {
        if !self.op(op).is_attached() {
            return Err(IrError::Detached { op });
        }
        let replaced = self.op_mut(op).substitute_var(old, new);
        if replaced > 0 {
            self.touch(old);
            if let Some(var) = new.as_var() {
                self.touch(var);
            }
            self.bump_version();
        }
        Ok(replaced)
    }

    /// Remove an operator.
    ///
    /// With [`DebugInfoPolicy::Keep`] the operator becomes a no-op carrying
    /// its source position, whose ID is returned. With
    /// [`DebugInfoPolicy::Discard`] it is deleted outright.
    pub fn remove_operator(
        &mut self,
        op: OpId,
        policy: DebugInfoPolicy,
    ) -> Result<Option<OpId>, IrError> {
        if self.op(op).is_control() {
            return Err(IrError::RemovesTerminator { op });
        }
        match policy {
            DebugInfoPolicy::Keep => self
                .substitute_with_operator(op, Operator::nop(), DebugInfoPolicy::Keep)
                .map(Some),
            DebugInfoPolicy::Discard => {
                let (block, pos) = self.position_of(op)?;
                self.block_ops_mut(block).remove(pos);
                let removed = self.op_mut(op);
                removed.block = None;
                removed.debug = None;
                self.bump_version();
                tracing::trace!(op = op.raw(), "deleted operator");
                Ok(None)
            }
        }
    }

    /// Insert `new` immediately before `anchor` in the anchor's block.
    pub fn insert_before(&mut self, anchor: OpId, new: Operator) -> Result<OpId, IrError> {
        let (block, pos) = self.position_of(anchor)?;
        let id = self.push_op(new);
        self.op_mut(id).block = Some(block);
        self.block_ops_mut(block).insert(pos, id);
        self.bump_version();
        Ok(id)
    }

    /// Redirect every attached read of `var` recorded in `chains` to `new`.
    ///
    /// Returns the number of replaced occurrences.
    pub fn replace_all_uses(
        &mut self,
        chains: &FlowChains,
        var: VarId,
        new: &Expression,
    ) -> Result<usize, PassError> {
        let users = live_uses(self, chains, var)?;
        let mut replaced = 0;
        for user in users {
            replaced += self.substitute_usage(user, var, new)?;
        }
        Ok(replaced)
    }
}

#[cfg(test)]
mod tests;
