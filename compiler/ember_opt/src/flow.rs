//! Flow-analysis cache: definition and use chains.
//!
//! For every live variable the chains record which attached operators
//! define it and which read it. The chains are computed by a single scan
//! over the graph and memoized against the graph
//! [`version`](ControlFlowGraph::version): [`ControlFlowGraph::flow_chains`]
//! returns the cached snapshot while nothing has changed and recomputes
//! otherwise.
//!
//! # Refreshes and spanning-tree indices
//!
//! A recompute is a *refresh*. It renumbers every live variable with a
//! dense [`SpanningTreeIndex`] stamped with a new generation. Lookups with
//! an index from another generation fail with [`FlowError::StaleIndex`]
//! instead of reading an unrelated slot.
//!
//! # Batches
//!
//! A rewrite batch takes one snapshot, calls
//! [`reset_cache_checkpoint`](ControlFlowGraph::reset_cache_checkpoint),
//! rewrites against that snapshot, and finishes with
//! [`assert_no_cache_refresh_since_checkpoint`](ControlFlowGraph::assert_no_cache_refresh_since_checkpoint).
//! Rewrites inside the batch make the snapshot stale. Removed operators are
//! skipped on lookup. Variables that gain a definition or a reader after the
//! snapshot are recorded as *touched*, and `live_defs`/`live_uses` rescan the
//! graph for them instead of trusting the snapshot.

use std::rc::Rc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::cfg::ControlFlowGraph;
use crate::error::FlowError;
use crate::ir::{OpId, SpanningTreeIndex, VarId};

type Chain = SmallVec<[OpId; 2]>;

/// One snapshot of the definition and use chains.
#[derive(Debug)]
pub struct FlowChains {
    version: u64,
    generation: u32,
    definitions: Vec<Chain>,
    uses: Vec<Chain>,
}

impl FlowChains {
    /// Graph version the snapshot was computed from.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of indexed variables.
    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns `true` if the graph has not changed since the snapshot.
    pub fn is_current(&self, cfg: &ControlFlowGraph) -> bool {
        self.version == cfg.version()
    }

    fn slot(&self, index: SpanningTreeIndex) -> Result<usize, FlowError> {
        if index.generation != self.generation {
            return Err(FlowError::StaleIndex {
                index_generation: index.generation,
                chains_generation: self.generation,
            });
        }
        Ok(index.slot())
    }

    /// Operators that wrote the variable at `index`.
    pub fn definitions(&self, index: SpanningTreeIndex) -> Result<&[OpId], FlowError> {
        let slot = self.slot(index)?;
        Ok(&self.definitions[slot])
    }

    /// Operators that read the variable at `index`.
    pub fn uses(&self, index: SpanningTreeIndex) -> Result<&[OpId], FlowError> {
        let slot = self.slot(index)?;
        Ok(&self.uses[slot])
    }
}

/// Per-graph cache bookkeeping.
#[derive(Clone, Debug, Default)]
pub(crate) struct FlowState {
    cached: Option<Rc<FlowChains>>,
    generation: u32,
    refreshes: u64,
    checkpoint: Option<u64>,
    /// Variables whose chains changed since the cached snapshot.
    touched: FxHashSet<VarId>,
}

impl ControlFlowGraph {
    /// The definition and use chains for the current graph.
    ///
    /// Refreshes (and renumbers every variable) only when the graph changed
    /// since the cached snapshot.
    pub fn flow_chains(&mut self) -> Rc<FlowChains> {
        if let Some(cached) = &self.flow.cached {
            if cached.version == self.version() {
                return Rc::clone(cached);
            }
        }
        let chains = Rc::new(self.compute_chains());
        self.flow.cached = Some(Rc::clone(&chains));
        chains
    }

    /// The definition chains. Same snapshot as [`flow_chains`](Self::flow_chains).
    pub fn definition_chains(&mut self) -> Rc<FlowChains> {
        self.flow_chains()
    }

    /// The use chains. Same snapshot as [`flow_chains`](Self::flow_chains).
    pub fn use_chains(&mut self) -> Rc<FlowChains> {
        self.flow_chains()
    }

    /// Number of refreshes performed on this graph.
    #[inline]
    pub fn refresh_count(&self) -> u64 {
        self.flow.refreshes
    }

    /// Mark the start of a batch that reuses one chain snapshot.
    pub fn reset_cache_checkpoint(&mut self) {
        self.flow.checkpoint = Some(self.flow.refreshes);
    }

    /// Fail if the cache refreshed since the last checkpoint.
    pub fn assert_no_cache_refresh_since_checkpoint(&self) -> Result<(), FlowError> {
        let checkpoint = self.flow.checkpoint.ok_or(FlowError::NoCheckpoint)?;
        if self.flow.refreshes == checkpoint {
            Ok(())
        } else {
            Err(FlowError::RefreshedSinceCheckpoint {
                refreshes: self.flow.refreshes - checkpoint,
            })
        }
    }

    /// Definitions of `var` in `chains`.
    pub fn defs_of<'c>(&self, chains: &'c FlowChains, var: VarId) -> Result<&'c [OpId], FlowError> {
        let index = self
            .var(var)
            .spanning_tree_index()
            .ok_or(FlowError::Unindexed { var })?;
        chains.definitions(index)
    }

    /// Uses of `var` in `chains`.
    pub fn uses_of<'c>(&self, chains: &'c FlowChains, var: VarId) -> Result<&'c [OpId], FlowError> {
        let index = self
            .var(var)
            .spanning_tree_index()
            .ok_or(FlowError::Unindexed { var })?;
        chains.uses(index)
    }

    /// Record that `var` gained a definition or a reader.
    pub(crate) fn touch(&mut self, var: VarId) {
        self.flow.touched.insert(var);
    }

    #[inline]
    pub(crate) fn is_touched(&self, var: VarId) -> bool {
        self.flow.touched.contains(&var)
    }

    fn compute_chains(&mut self) -> FlowChains {
        self.flow.generation = self.flow.generation.wrapping_add(1);
        self.flow.refreshes += 1;
        self.flow.touched.clear();
        let generation = self.flow.generation;

        let mut slots = 0u32;
        for var in self.var_ids() {
            let variable = self.var_mut(var);
            if variable.dropped {
                variable.index = None;
                continue;
            }
            variable.index = Some(SpanningTreeIndex {
                generation,
                slot: slots,
            });
            slots += 1;
        }

        let mut definitions = vec![Chain::new(); slots as usize];
        let mut uses = vec![Chain::new(); slots as usize];
        for id in self.operators() {
            let op = self.op(id);
            for var in op.used_vars() {
                if let Some(index) = self.var(var).index {
                    let chain = &mut uses[index.slot()];
                    if chain.last() != Some(&id) {
                        chain.push(id);
                    }
                }
            }
            for &var in op.results() {
                if let Some(index) = self.var(var).index {
                    let chain = &mut definitions[index.slot()];
                    if chain.last() != Some(&id) {
                        chain.push(id);
                    }
                }
            }
        }

        tracing::trace!(
            function = self.name(),
            generation,
            variables = slots,
            "refreshed flow chains",
        );

        FlowChains {
            version: self.version(),
            generation,
            definitions,
            uses,
        }
    }
}

// ── Safety queries ──────────────────────────────────────────────────

/// How many attached operators a chain holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Uniqueness {
    Unique(OpId),
    Empty,
    Ambiguous(usize),
}

impl Uniqueness {
    /// The operator, if exactly one.
    #[inline]
    pub fn unique(self) -> Option<OpId> {
        match self {
            Uniqueness::Unique(op) => Some(op),
            Uniqueness::Empty | Uniqueness::Ambiguous(_) => None,
        }
    }

    fn of(cfg: &ControlFlowGraph, chain: &[OpId]) -> Self {
        let mut attached = chain.iter().copied().filter(|&id| cfg.op(id).is_attached());
        match (attached.next(), attached.count()) {
            (None, _) => Uniqueness::Empty,
            (Some(op), 0) => Uniqueness::Unique(op),
            (Some(_), rest) => Uniqueness::Ambiguous(rest + 1),
        }
    }
}

/// The sole attached operator defining `var`.
pub fn single_definition(
    cfg: &ControlFlowGraph,
    chains: &FlowChains,
    var: VarId,
) -> Result<Uniqueness, FlowError> {
    let defs = live_defs(cfg, chains, var)?;
    Ok(Uniqueness::of(cfg, &defs))
}

/// The sole attached operator reading `var`.
pub fn single_use(
    cfg: &ControlFlowGraph,
    chains: &FlowChains,
    var: VarId,
) -> Result<Uniqueness, FlowError> {
    let uses = live_uses(cfg, chains, var)?;
    Ok(Uniqueness::of(cfg, &uses))
}

/// Attached operators defining `var` now, in block order for touched
/// variables.
pub(crate) fn live_defs(
    cfg: &ControlFlowGraph,
    chains: &FlowChains,
    var: VarId,
) -> Result<SmallVec<[OpId; 4]>, FlowError> {
    if cfg.is_touched(var) {
        return Ok(cfg
            .operators()
            .filter(|&id| cfg.op(id).results().contains(&var))
            .collect());
    }
    Ok(attached(cfg, cfg.defs_of(chains, var)?))
}

/// Attached operators reading `var` now, in block order for touched
/// variables.
pub(crate) fn live_uses(
    cfg: &ControlFlowGraph,
    chains: &FlowChains,
    var: VarId,
) -> Result<SmallVec<[OpId; 4]>, FlowError> {
    if cfg.is_touched(var) {
        return Ok(cfg
            .operators()
            .filter(|&id| cfg.op(id).uses_var(var))
            .collect());
    }
    Ok(attached(cfg, cfg.uses_of(chains, var)?))
}

/// Attached operators of a chain, copied out so the graph can be mutated
/// while walking them.
fn attached(cfg: &ControlFlowGraph, chain: &[OpId]) -> SmallVec<[OpId; 4]> {
    chain
        .iter()
        .copied()
        .filter(|&id| cfg.op(id).is_attached())
        .collect()
}
