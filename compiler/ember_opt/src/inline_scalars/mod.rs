//! Scalar lowering: replace scalar-wrapper operations by native ones.
//!
//! Managed code treats `int`, `double` and friends as wrapper types with a
//! constructor, equality methods and an `m_value` field. Emitted as-is they
//! cost a call and an address round-trip per operation. This pass lowers
//! them:
//!
//! 1. **Constructors**: `p = &x; call .ctor(p, v)` becomes `x = v`.
//! 2. **Equality**: `op_Equality`, `op_Inequality` and integer `Equals`
//!    become native comparisons.
//! 3. **Field loads**: `v = p->m_value` reads `*p`; `fp = &p->m_value` is
//!    `p`.
//! 4. **Finalization** (only if 1-3 changed something): reachability
//!    refresh, redundant address-load cleanup, dead-variable elimination.
//!
//! # Batches
//!
//! Each step is a batch ([`batch`]): it takes one flow-chain snapshot,
//! rewrites against it, and checks that the cache did not refresh in
//! between. The snapshot is refreshed between batches.
//!
//! # Soundness
//!
//! A rewrite happens only when the chains prove it safe (the pointer has a
//! single address-of definition, the loaded result has a single
//! definition, the pointer has a single reader). Anything unproven is
//! skipped. Values are forwarded to later readers only when they are
//! stable (see [`resolve::is_stable`]) and every reader follows the
//! rewritten operator in its block; otherwise the rewrite copies them at
//! the original point.

mod address_loads;
mod constructors;
mod equality;
mod field_loads;
mod resolve;

use ember_types::Pool;

use crate::cfg::ControlFlowGraph;
use crate::cleanup::drop_dead_variables;
use crate::error::PassError;
use crate::flow::FlowChains;

/// Which parts of the pass run.
///
/// The default runs everything and verifies the graph afterwards in debug
/// builds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineScalarsConfig {
    /// Inline scalar constructors.
    pub constructors: bool,
    /// Inline `op_Equality`, `op_Inequality` and `Equals`.
    pub equality: bool,
    /// Remove `m_value` loads and address-of-`m_value`.
    pub field_loads: bool,
    /// Fold address round-trips left behind by the rewrites.
    pub address_cleanup: bool,
    /// Run dead-variable elimination during finalization.
    pub drop_dead_variables: bool,
    /// Run [`ControlFlowGraph::verify`] after the pass.
    pub verify: bool,
}

impl Default for InlineScalarsConfig {
    fn default() -> Self {
        InlineScalarsConfig {
            constructors: true,
            equality: true,
            field_loads: true,
            address_cleanup: true,
            drop_dead_variables: true,
            verify: cfg!(debug_assertions),
        }
    }
}

impl InlineScalarsConfig {
    /// Create a config that runs nothing (for enabling steps one by one).
    pub fn all_disabled() -> Self {
        InlineScalarsConfig {
            constructors: false,
            equality: false,
            field_loads: false,
            address_cleanup: false,
            drop_dead_variables: false,
            verify: false,
        }
    }
}

/// Per-step rewrite counts of one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InlineScalarsStats {
    pub constructors: usize,
    pub equality: usize,
    pub field_loads: usize,
    pub field_addresses: usize,
    pub address_loads: usize,
    pub dropped_variables: usize,
}

impl InlineScalarsStats {
    /// Returns `true` if steps 1-3 rewrote anything.
    pub fn modified(&self) -> bool {
        self.constructors + self.equality + self.field_loads + self.field_addresses > 0
    }
}

/// Run one rewrite batch against a single chain snapshot.
fn batch(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    step: impl FnOnce(&mut ControlFlowGraph, &Pool, &FlowChains) -> Result<usize, PassError>,
) -> Result<usize, PassError> {
    let chains = cfg.flow_chains();
    cfg.reset_cache_checkpoint();
    let rewritten = step(cfg, pool, &chains)?;
    cfg.assert_no_cache_refresh_since_checkpoint()?;
    Ok(rewritten)
}

/// Lower the scalar-wrapper operations of `cfg`.
///
/// Returns `true` if the graph was modified.
pub fn inline_scalars(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    config: &InlineScalarsConfig,
) -> Result<bool, PassError> {
    inline_scalars_with_stats(cfg, pool, config).map(|stats| stats.modified())
}

/// [`inline_scalars`], reporting what each step rewrote.
pub fn inline_scalars_with_stats(
    cfg: &mut ControlFlowGraph,
    pool: &Pool,
    config: &InlineScalarsConfig,
) -> Result<InlineScalarsStats, PassError> {
    let span = tracing::debug_span!("inline_scalars", function = cfg.name());
    let _guard = span.enter();
    let mut stats = InlineScalarsStats::default();

    if config.constructors {
        stats.constructors = batch(cfg, pool, constructors::inline_scalar_constructors)?;
    }
    if config.equality {
        stats.equality = batch(cfg, pool, equality::inline_scalar_equality)?;
    }
    if config.field_loads {
        stats.field_loads = batch(cfg, pool, field_loads::remove_scalar_field_loads)?;
        stats.field_addresses = batch(cfg, pool, field_loads::remove_scalar_field_addresses)?;
    }

    if stats.modified() {
        cfg.update_flow_information();
        if config.address_cleanup {
            stats.address_loads = batch(cfg, pool, address_loads::fold_local_addresses)?
                + batch(cfg, pool, address_loads::fold_field_addresses)?
                + batch(cfg, pool, address_loads::fold_element_addresses)?;
        }
        if config.drop_dead_variables {
            stats.dropped_variables = drop_dead_variables(cfg)?;
        }
    }

    if config.verify {
        cfg.verify()?;
    }

    tracing::debug!(
        function = cfg.name(),
        constructors = stats.constructors,
        equality = stats.equality,
        field_loads = stats.field_loads,
        field_addresses = stats.field_addresses,
        address_loads = stats.address_loads,
        dropped_variables = stats.dropped_variables,
        "inline_scalars complete",
    );
    Ok(stats)
}

/// Run the pass with the default configuration.
pub fn run(cfg: &mut ControlFlowGraph, pool: &Pool) -> Result<bool, PassError> {
    inline_scalars(cfg, pool, &InlineScalarsConfig::default())
}
