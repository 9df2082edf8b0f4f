use ember_types::Idx;
use pretty_assertions::assert_eq;

use crate::cfg::ControlFlowGraph;
use crate::error::{IrError, PassError};
use crate::ir::{Condition, DebugInfo, OpId, OpKind, Operator, VarId};
use crate::test_helpers::{int, kinds, var};

use super::DebugInfoPolicy;

/// `bb0: v1 = v0 @3:1; v2 = cmp.eq v1, v0; ret v2`
fn graph() -> (ControlFlowGraph, VarId, VarId, [OpId; 3]) {
    let mut cfg = ControlFlowGraph::new("f");
    let arg = cfg.add_argument(Idx::I32);
    let local = cfg.add_local(Idx::I32);
    let flag = cfg.allocate_temporary(Idx::BOOL);
    let entry = cfg.entry();
    let assign = cfg.append(entry, Operator::assign(local, var(arg)).with_debug(3, 1));
    let compare = cfg.append(
        entry,
        Operator::compare(Condition::Eq, flag, var(local), var(arg)),
    );
    let ret = cfg.append(entry, Operator::ret(Some(var(flag))));
    (cfg, arg, local, [assign, compare, ret])
}

#[test]
fn substitute_keeps_position_and_debug_info() {
    let (mut cfg, _, local, [assign, ..]) = graph();
    let version = cfg.version();
    let new = cfg
        .substitute_with_operator(assign, Operator::assign(local, int(7)), DebugInfoPolicy::Keep)
        .unwrap_or_else(|err| panic!("{err}"));

    assert!(cfg.version() > version);
    assert_eq!(cfg.block(cfg.entry()).ops()[0], new);
    assert_eq!(cfg.op(new).debug, Some(DebugInfo { line: 3, column: 1 }));
    assert_eq!(cfg.op(new).block(), Some(cfg.entry()));
    assert!(!cfg.op(assign).is_attached());
    assert_eq!(cfg.verify(), Ok(()));
}

#[test]
fn substitute_prefers_the_replacement_debug_info() {
    let (mut cfg, _, local, [assign, ..]) = graph();
    let replacement = Operator::assign(local, int(7)).with_debug(9, 2);
    let new = cfg
        .substitute_with_operator(assign, replacement, DebugInfoPolicy::Keep)
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(cfg.op(new).debug, Some(DebugInfo { line: 9, column: 2 }));
}

#[test]
fn substitute_discard_drops_the_old_position() {
    let (mut cfg, _, local, [assign, ..]) = graph();
    let new = cfg
        .substitute_with_operator(assign, Operator::assign(local, int(7)), DebugInfoPolicy::Discard)
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(cfg.op(new).debug, None);
    assert_eq!(cfg.op(assign).debug, None);
}

#[test]
fn substitute_rejects_detached_operator() {
    let (mut cfg, _, local, [assign, ..]) = graph();
    cfg.remove_operator(assign, DebugInfoPolicy::Discard)
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(
        cfg.substitute_with_operator(assign, Operator::assign(local, int(0)), DebugInfoPolicy::Keep),
        Err(IrError::Detached { op: assign })
    );
}

#[test]
fn substitute_usage_counts_replacements() {
    let (mut cfg, arg, local, [assign, compare, _]) = graph();
    let version = cfg.version();
    assert_eq!(cfg.substitute_usage(compare, local, &int(4)), Ok(1));
    assert!(cfg.version() > version);
    assert_eq!(cfg.op(compare).arguments(), &[int(4), var(arg)]);

    let version = cfg.version();
    assert_eq!(cfg.substitute_usage(compare, local, &int(5)), Ok(0));
    assert_eq!(cfg.version(), version);

    cfg.remove_operator(assign, DebugInfoPolicy::Keep)
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(
        cfg.substitute_usage(assign, arg, &int(0)),
        Err(IrError::Detached { op: assign })
    );
}

#[test]
fn remove_keep_leaves_a_nop() {
    let (mut cfg, _, _, [assign, ..]) = graph();
    let nop = cfg
        .remove_operator(assign, DebugInfoPolicy::Keep)
        .unwrap_or_else(|err| panic!("{err}"));
    let Some(nop) = nop else {
        panic!("keeping debug info leaves a no-op behind");
    };
    assert_eq!(cfg.op(nop).kind, OpKind::Nop);
    assert_eq!(cfg.op(nop).debug, Some(DebugInfo { line: 3, column: 1 }));
    assert_eq!(
        kinds(&cfg, cfg.entry()),
        vec![
            OpKind::Nop,
            OpKind::Compare {
                condition: Condition::Eq
            },
            OpKind::Return
        ]
    );
}

#[test]
fn remove_discard_deletes_outright() {
    let (mut cfg, _, _, [assign, compare, ret]) = graph();
    assert_eq!(cfg.remove_operator(assign, DebugInfoPolicy::Discard), Ok(None));
    assert_eq!(cfg.block(cfg.entry()).ops(), &[compare, ret]);
    assert!(!cfg.op(assign).is_attached());
    assert_eq!(cfg.op(assign).debug, None);
}

#[test]
fn remove_refuses_terminators() {
    let (mut cfg, _, _, [_, _, ret]) = graph();
    assert_eq!(
        cfg.remove_operator(ret, DebugInfoPolicy::Discard),
        Err(IrError::RemovesTerminator { op: ret })
    );
    assert!(cfg.op(ret).is_attached());
}

#[test]
fn insert_before_places_operator() {
    let (mut cfg, arg, _, [assign, compare, ret]) = graph();
    let scratch = cfg.allocate_temporary(Idx::I32);
    let inserted = cfg
        .insert_before(compare, Operator::assign(scratch, var(arg)))
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(
        cfg.block(cfg.entry()).ops(),
        &[assign, inserted, compare, ret]
    );
    assert_eq!(cfg.op(inserted).block(), Some(cfg.entry()));
    assert_eq!(cfg.verify(), Ok(()));
}

#[test]
fn replace_all_uses_redirects_attached_readers() {
    let (mut cfg, arg, local, [_, compare, _]) = graph();
    let chains = cfg.flow_chains();
    assert_eq!(cfg.replace_all_uses(&chains, local, &var(arg)), Ok(1));
    assert_eq!(cfg.op(compare).arguments(), &[var(arg), var(arg)]);

    // Readers removed after the snapshot are skipped.
    let chains = cfg.flow_chains();
    cfg.remove_operator(compare, DebugInfoPolicy::Discard)
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(cfg.replace_all_uses(&chains, arg, &int(0)), Ok(1));
}

#[test]
fn replace_all_uses_needs_an_indexed_variable() {
    let (mut cfg, _, _, _) = graph();
    let chains = cfg.flow_chains();
    let late = cfg.allocate_temporary(Idx::I32);
    assert!(matches!(
        cfg.replace_all_uses(&chains, late, &int(0)),
        Err(PassError::Flow(_))
    ));
}
