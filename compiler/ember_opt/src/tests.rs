//! End-to-end tests: lowering whole method bodies and checking the result
//! against the reference interpreter.

use ember_types::{FieldDef, FieldId, Idx, Pool};
use pretty_assertions::assert_eq;

use crate::eval::{evaluate, evaluate_with, Heap, Value};
use crate::test_helpers::{count_ops, init_test_tracing, int, null_receiver, scalars, var, Scalars};
use crate::{inline_scalars_with_stats, run, ControlFlowGraph, InlineScalarsConfig, OpKind, Operator};

/// Declare a class `Box` with `slots` instance fields of type `ty`.
fn box_class(pool: &mut Pool, slots: usize, ty: Idx) -> (Idx, Vec<FieldId>) {
    let class = pool.class("Box");
    let fields = (0..slots)
        .map(|slot| {
            let name = pool.intern_name(&format!("slot{slot}"));
            pool.add_field(FieldDef {
                name,
                owner: class,
                ty,
                is_static: false,
            })
        })
        .collect();
    (class, fields)
}

/// ```text
/// fn pick(v0: int, v1: int) -> int {
///     int x = new int(v0); int y = new int(v1);
///     return x.Equals(y) ? x.m_value : y.m_value;
/// }
/// ```
fn pick(s: &Scalars) -> ControlFlowGraph {
    let mut cfg = ControlFlowGraph::new("pick");
    let a = cfg.add_argument(Idx::I32);
    let b = cfg.add_argument(Idx::I32);
    let x = cfg.add_local(Idx::I32);
    let x_ptr = cfg.allocate_temporary(s.int_ptr);
    let y = cfg.add_local(Idx::I32);
    let y_ptr = cfg.allocate_temporary(s.int_ptr);
    let same = cfg.allocate_temporary(Idx::BOOL);
    let from_x = cfg.allocate_temporary(Idx::I32);
    let from_y = cfg.allocate_temporary(Idx::I32);

    let entry = cfg.entry();
    let then_block = cfg.add_block();
    let else_block = cfg.add_block();
    cfg.append(entry, Operator::address_of(x_ptr, x));
    cfg.append(entry, Operator::call(s.int.ctor, &[var(x_ptr), var(a)], None));
    cfg.append(entry, Operator::address_of(y_ptr, y));
    cfg.append(entry, Operator::call(s.int.ctor, &[var(y_ptr), var(b)], None));
    cfg.append(
        entry,
        Operator::call(s.int.equals, &[var(x_ptr), var(y)], Some(same)),
    );
    cfg.append(entry, Operator::branch(var(same), then_block, else_block));
    cfg.append(
        then_block,
        Operator::load_field(s.int.value_field, from_x, var(x_ptr), false),
    );
    cfg.append(then_block, Operator::ret(Some(var(from_x))));
    cfg.append(
        else_block,
        Operator::load_field(s.int.value_field, from_y, var(y_ptr), false),
    );
    cfg.append(else_block, Operator::ret(Some(var(from_y))));
    cfg
}

#[test]
fn lowering_removes_every_wrapper_operation() {
    init_test_tracing();
    let s = scalars();
    let mut cfg = pick(&s);
    let stats = inline_scalars_with_stats(&mut cfg, &s.pool, &InlineScalarsConfig::default())
        .unwrap_or_else(|err| panic!("{err}"));

    assert_eq!(stats.constructors, 2);
    assert_eq!(stats.equality, 1);
    assert_eq!(stats.field_loads, 2);
    assert_eq!(stats.address_loads, 2);
    assert_eq!(stats.dropped_variables, 4);
    assert_eq!(count_ops(&cfg, |kind| matches!(kind, OpKind::Call { .. })), 0);
    assert_eq!(count_ops(&cfg, |kind| *kind == OpKind::AddressAssignment), 0);
    assert_eq!(
        count_ops(&cfg, |kind| matches!(kind, OpKind::LoadInstanceField { .. })),
        0
    );
    assert_eq!(cfg.verify(), Ok(()));
}

#[test]
fn lowered_graph_dump() {
    let s = scalars();
    let mut cfg = pick(&s);
    assert_eq!(run(&mut cfg, &s.pool), Ok(true));
    assert_eq!(
        cfg.display(&s.pool).to_string(),
        "\
fn pick(v0: int, v1: int) {
    let v2: int
    let v4: int
    let v6: bool
bb0:
    v2 = mov v0
    v4 = mov v1
    v6 = cmp.eq v2, v4
    br v6, bb1, bb2
bb1:
    nop
    ret v2
bb2:
    nop
    ret v4
}
"
    );
}

#[test]
fn dump_shows_members_flags_and_positions() {
    let s = scalars();
    let cfg = pick(&s);
    let dump = cfg.display(&s.pool).to_string();
    assert!(dump.contains("    let v3: int*\n"), "{dump}");
    assert!(dump.contains("    call int::.ctor(v3, v0)\n"), "{dump}");
    assert!(dump.contains("    v6 = call int::Equals(v3, v4)\n"), "{dump}");
    assert!(dump.contains("    v7 = ldfld int::m_value v3\n"), "{dump}");

    let mut checked = ControlFlowGraph::new("checked");
    let ptr = checked.add_argument(s.int_ptr);
    let loaded = checked.add_local(Idx::I32);
    let entry = checked.entry();
    checked.append(
        entry,
        Operator::load_indirect(Idx::I32, loaded, var(ptr), true).with_debug(12, 4),
    );
    checked.append(entry, Operator::ret(Some(var(loaded))));
    let dump = checked.display(&s.pool).to_string();
    assert!(dump.contains("    v1 = ldind.int v0 !null @12:4\n"), "{dump}");
}

#[test]
fn static_equality_on_doubles_follows_ieee() {
    let s = scalars();
    let mut cfg = ControlFlowGraph::new("same");
    let left = cfg.add_argument(Idx::F64);
    let right = cfg.add_argument(Idx::F64);
    let result = cfg.allocate_temporary(Idx::BOOL);
    let entry = cfg.entry();
    cfg.append(
        entry,
        Operator::call(
            s.double.op_equality,
            &[null_receiver(), var(left), var(right)],
            Some(result),
        ),
    );
    cfg.append(entry, Operator::ret(Some(var(result))));
    let before = cfg.clone();
    assert_eq!(run(&mut cfg, &s.pool), Ok(true));

    for (l, r) in [(f64::NAN, f64::NAN), (0.0, -0.0), (1.5, 1.5), (1.5, 2.5)] {
        let args = [Value::f64(l), Value::f64(r)];
        let lowered = evaluate(&cfg, &s.pool, &args).map(|outcome| outcome.returned);
        let original = evaluate(&before, &s.pool, &args).map(|outcome| outcome.returned);
        assert_eq!(lowered, original, "{l} == {r}");
    }
}

#[allow(
    clippy::disallowed_types,
    reason = "proptest macros internally use Arc"
)]
mod proptest_soundness {
    use ember_types::{FieldId, Idx};
    use proptest::prelude::*;

    use super::box_class;
    use crate::eval::{evaluate, evaluate_with, Heap, Value};
    use crate::ir::{Constant, Expression};
    use crate::test_helpers::{count_ops, int, null_receiver, scalars, var, Scalars};
    use crate::{run, ControlFlowGraph, OpId, OpKind, Operator, VarId};

    const LOCALS: usize = 3;
    const ARGS: usize = 2;

    #[derive(Clone, Copy, Debug)]
    enum Source {
        Arg(usize),
        Const(i64),
    }

    /// One statement over `int` locals, each with a fixed address `&local`.
    #[derive(Clone, Debug)]
    enum Step {
        Construct { local: usize, source: Source },
        Assign { local: usize, source: Source },
        Equals { left: usize, right: usize },
        Operator { left: usize, right: usize, negate: bool },
        LoadValue { local: usize },
        LoadTwice { local: usize },
        StoreThrough { local: usize, value: i64 },
        OverwriteLoaded { local: usize, value: i64 },
    }

    fn source() -> impl Strategy<Value = Source> {
        prop_oneof![
            (0..ARGS).prop_map(Source::Arg),
            (-3i64..3).prop_map(Source::Const),
        ]
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0..LOCALS, source()).prop_map(|(local, source)| Step::Construct { local, source }),
            (0..LOCALS, source()).prop_map(|(local, source)| Step::Assign { local, source }),
            (0..LOCALS, 0..LOCALS).prop_map(|(left, right)| Step::Equals { left, right }),
            (0..LOCALS, 0..LOCALS, any::<bool>())
                .prop_map(|(left, right, negate)| Step::Operator { left, right, negate }),
            (0..LOCALS).prop_map(|local| Step::LoadValue { local }),
            (0..LOCALS).prop_map(|local| Step::LoadTwice { local }),
            (0..LOCALS, -3i64..3).prop_map(|(local, value)| Step::StoreThrough { local, value }),
            (0..LOCALS, -3i64..3)
                .prop_map(|(local, value)| Step::OverwriteLoaded { local, value }),
        ]
    }

    /// A method body running `steps`, then storing every step result and
    /// every local into a distinct field of the `Box` argument.
    struct Program {
        s: Scalars,
        cfg: ControlFlowGraph,
    }

    fn program(steps: &[Step]) -> Program {
        let mut s = scalars();
        let (class, slots) = box_class(&mut s.pool, 2 * steps.len() + LOCALS, Idx::I32);
        let mut cfg = ControlFlowGraph::new("fuzz");
        let args: Vec<VarId> = (0..ARGS).map(|_| cfg.add_argument(Idx::I32)).collect();
        let sink = cfg.add_argument(class);
        let locals: Vec<VarId> = (0..LOCALS).map(|_| cfg.add_local(Idx::I32)).collect();
        let ptrs: Vec<VarId> = (0..LOCALS)
            .map(|_| cfg.allocate_temporary(s.int_ptr))
            .collect();
        let entry = cfg.entry();

        let expr = |source: Source| match source {
            Source::Arg(n) => var(args[n]),
            Source::Const(value) => int(value),
        };
        for n in 0..LOCALS {
            cfg.append(entry, Operator::assign(locals[n], int(0)));
            cfg.append(entry, Operator::address_of(ptrs[n], locals[n]));
        }

        let mut slot = slots.iter().copied();
        let store = |cfg: &mut ControlFlowGraph, value: Expression, field: Option<FieldId>| {
            if let Some(field) = field {
                cfg.append(entry, Operator::store_field(field, var(sink), value));
            }
        };
        for step in steps {
            match *step {
                Step::Construct { local, source } => {
                    cfg.append(
                        entry,
                        Operator::call(s.int.ctor, &[var(ptrs[local]), expr(source)], None),
                    );
                    store(&mut cfg, var(locals[local]), slot.next());
                }
                Step::Assign { local, source } => {
                    cfg.append(entry, Operator::assign(locals[local], expr(source)));
                    store(&mut cfg, var(locals[local]), slot.next());
                }
                Step::Equals { left, right } => {
                    let result = cfg.allocate_temporary(Idx::BOOL);
                    cfg.append(
                        entry,
                        Operator::call(
                            s.int.equals,
                            &[var(ptrs[left]), var(locals[right])],
                            Some(result),
                        ),
                    );
                    store(&mut cfg, var(result), slot.next());
                }
                Step::Operator { left, right, negate } => {
                    let method = if negate {
                        s.int.op_inequality
                    } else {
                        s.int.op_equality
                    };
                    let result = cfg.allocate_temporary(Idx::BOOL);
                    cfg.append(
                        entry,
                        Operator::call(
                            method,
                            &[null_receiver(), var(locals[left]), var(locals[right])],
                            Some(result),
                        ),
                    );
                    store(&mut cfg, var(result), slot.next());
                }
                Step::LoadValue { local } => {
                    let loaded = cfg.allocate_temporary(Idx::I32);
                    cfg.append(
                        entry,
                        Operator::load_field(s.int.value_field, loaded, var(ptrs[local]), false),
                    );
                    store(&mut cfg, var(loaded), slot.next());
                }
                Step::LoadTwice { local } => {
                    let loaded = cfg.allocate_temporary(Idx::I32);
                    let reloaded = cfg.allocate_temporary(Idx::I32);
                    cfg.append(
                        entry,
                        Operator::load_field(s.int.value_field, loaded, var(ptrs[local]), false),
                    );
                    cfg.append(
                        entry,
                        Operator::load_field(s.int.value_field, reloaded, var(loaded), false),
                    );
                    store(&mut cfg, var(reloaded), slot.next());
                }
                Step::StoreThrough { local, value } => {
                    cfg.append(
                        entry,
                        Operator::store_indirect(var(ptrs[local]), int(value), false),
                    );
                    store(&mut cfg, var(locals[local]), slot.next());
                }
                Step::OverwriteLoaded { local, value } => {
                    let loaded = cfg.allocate_temporary(Idx::I32);
                    let loaded_ptr = cfg.allocate_temporary(s.int_ptr);
                    cfg.append(
                        entry,
                        Operator::load_field(s.int.value_field, loaded, var(ptrs[local]), false),
                    );
                    cfg.append(entry, Operator::address_of(loaded_ptr, loaded));
                    cfg.append(
                        entry,
                        Operator::store_indirect(var(loaded_ptr), int(value), false),
                    );
                    store(&mut cfg, var(loaded), slot.next());
                    store(&mut cfg, var(locals[local]), slot.next());
                }
            }
        }
        for &local in &locals {
            store(&mut cfg, var(local), slot.next());
        }
        cfg.append(entry, Operator::ret(None));
        Program { s, cfg }
    }

    /// Heap left behind by one run on `(a, b)`.
    fn final_heap(program: &Program, cfg: &ControlFlowGraph, a: i64, b: i64) -> Heap {
        let mut heap = Heap::new();
        let sink = heap.alloc_object();
        let outcome = evaluate_with(
            cfg,
            &program.s.pool,
            &[Value::int(a), Value::int(b), sink],
            heap,
            crate::eval::DEFAULT_FUEL,
        );
        match outcome {
            Ok(outcome) => outcome.heap,
            Err(err) => panic!("{err}\n{}", cfg.display(&program.s.pool)),
        }
    }

    fn float_arg() -> impl Strategy<Value = f64> {
        prop_oneof![
            any::<f64>(),
            Just(f64::NAN),
            Just(0.0),
            Just(-0.0),
            Just(f64::INFINITY),
        ]
    }

    proptest! {
        #[test]
        fn lowering_preserves_behavior(
            steps in proptest::collection::vec(step(), 0..12),
            a in -3i64..3,
            b in -3i64..3,
        ) {
            let mut program = program(&steps);
            let original = program.cfg.clone();
            let modified = run(&mut program.cfg, &program.s.pool);
            prop_assert!(modified.is_ok());

            let lowered = final_heap(&program, &program.cfg, a, b);
            let expected = final_heap(&program, &original, a, b);
            prop_assert_eq!(lowered, expected, "{}", program.cfg.display(&program.s.pool));
            prop_assert_eq!(program.cfg.verify(), Ok(()));

            if modified == Ok(true) {
                let chains = program.cfg.flow_chains();
                for id in program.cfg.var_ids() {
                    let variable = program.cfg.var(id);
                    if variable.is_argument() || variable.is_dropped() {
                        continue;
                    }
                    let defs = program.cfg.defs_of(&chains, id).map(<[OpId]>::len);
                    let uses = program.cfg.uses_of(&chains, id).map(<[OpId]>::len);
                    prop_assert!(
                        defs == Ok(0) || uses.is_ok_and(|n| n > 0),
                        "{:?} is defined but never read\n{}",
                        id,
                        program.cfg.display(&program.s.pool)
                    );
                }
            }
        }

        #[test]
        fn lowering_leaves_no_wrapper_calls(steps in proptest::collection::vec(step(), 0..12)) {
            let mut program = program(&steps);
            prop_assert!(run(&mut program.cfg, &program.s.pool).is_ok());
            prop_assert_eq!(count_ops(&program.cfg, |kind| matches!(kind, OpKind::Call { .. })), 0);
            prop_assert_eq!(
                count_ops(&program.cfg, |kind| matches!(kind, OpKind::LoadInstanceField { .. })),
                0
            );
        }

        #[test]
        fn lowering_is_idempotent(steps in proptest::collection::vec(step(), 0..12)) {
            let mut program = program(&steps);
            prop_assert!(run(&mut program.cfg, &program.s.pool).is_ok());
            let once = program.cfg.display(&program.s.pool).to_string();
            prop_assert_eq!(run(&mut program.cfg, &program.s.pool), Ok(false));
            prop_assert_eq!(program.cfg.display(&program.s.pool).to_string(), once);
        }

        #[test]
        fn double_wrappers_keep_nan_semantics(x in float_arg(), y in float_arg()) {
            let mut s = scalars();
            let (class, slots) = box_class(&mut s.pool, 2, Idx::BOOL);
            let mut cfg = ControlFlowGraph::new("doubles");
            let left = cfg.add_argument(Idx::F64);
            let right = cfg.add_argument(Idx::F64);
            let sink = cfg.add_argument(class);
            let local = cfg.add_local(Idx::F64);
            let this = cfg.allocate_temporary(s.double_ptr);
            let same = cfg.allocate_temporary(Idx::BOOL);
            let equals = cfg.allocate_temporary(Idx::BOOL);
            let entry = cfg.entry();
            cfg.append(entry, Operator::address_of(this, local));
            cfg.append(entry, Operator::call(s.double.ctor, &[var(this), var(left)], None));
            cfg.append(
                entry,
                Operator::call(
                    s.double.op_equality,
                    &[null_receiver(), var(local), var(right)],
                    Some(same),
                ),
            );
            cfg.append(
                entry,
                Operator::call(s.double.equals, &[var(this), var(right)], Some(equals)),
            );
            cfg.append(entry, Operator::store_field(slots[0], var(sink), var(same)));
            cfg.append(entry, Operator::store_field(slots[1], var(sink), var(equals)));
            cfg.append(entry, Operator::ret(None));
            let original = cfg.clone();
            prop_assert_eq!(run(&mut cfg, &s.pool), Ok(true));

            let mut heap = Heap::new();
            let object = heap.alloc_object();
            let args = [Value::f64(x), Value::f64(y), object];
            let lowered = evaluate_with(&cfg, &s.pool, &args, heap.clone(), 100)
                .map(|outcome| outcome.heap);
            let expected = evaluate_with(&original, &s.pool, &args, heap, 100)
                .map(|outcome| outcome.heap);
            prop_assert_eq!(lowered, expected);
        }

        #[test]
        fn constant_constructors_fold(value in any::<i32>()) {
            let s = scalars();
            let mut cfg = ControlFlowGraph::new("constant");
            let local = cfg.add_local(Idx::I32);
            let this = cfg.allocate_temporary(s.int_ptr);
            let entry = cfg.entry();
            let constant = Expression::Const(Constant::int(Idx::I32, i64::from(value)));
            cfg.append(entry, Operator::address_of(this, local));
            cfg.append(entry, Operator::call(s.int.ctor, &[var(this), constant], None));
            cfg.append(entry, Operator::ret(Some(var(local))));
            prop_assert_eq!(run(&mut cfg, &s.pool), Ok(true));

            let outcome = evaluate(&cfg, &s.pool, &[]);
            prop_assert_eq!(
                outcome.map(|outcome| outcome.returned),
                Ok(Some(Value::int(i64::from(value))))
            );
        }
    }
}

#[test]
fn lowering_preserves_pick() {
    let s = scalars();
    let mut cfg = pick(&s);
    let before = cfg.clone();
    assert_eq!(run(&mut cfg, &s.pool), Ok(true));
    for (a, b) in [(1, 1), (1, 2), (-5, 7)] {
        let args = [Value::int(a), Value::int(b)];
        let lowered = evaluate(&cfg, &s.pool, &args).map(|outcome| outcome.returned);
        let original = evaluate(&before, &s.pool, &args).map(|outcome| outcome.returned);
        assert_eq!(lowered, original);
    }
}

#[test]
fn stores_through_an_address_survive_lowering() {
    let s = scalars();
    let mut pool = s.pool;
    let (class, slots) = box_class(&mut pool, 2, Idx::I32);
    let mut cfg = ControlFlowGraph::new("alias");
    let arg = cfg.add_argument(Idx::I32);
    let sink = cfg.add_argument(class);
    let local = cfg.add_local(Idx::I32);
    let this = cfg.allocate_temporary(s.int_ptr);
    let before_store = cfg.allocate_temporary(Idx::I32);
    let entry = cfg.entry();
    cfg.append(entry, Operator::address_of(this, local));
    cfg.append(entry, Operator::call(s.int.ctor, &[var(this), var(arg)], None));
    cfg.append(
        entry,
        Operator::load_field(s.int.value_field, before_store, var(this), false),
    );
    cfg.append(
        entry,
        Operator::store_indirect(var(this), int(99), false),
    );
    cfg.append(entry, Operator::store_field(slots[0], var(sink), var(before_store)));
    cfg.append(entry, Operator::store_field(slots[1], var(sink), var(local)));
    cfg.append(entry, Operator::ret(None));
    let original = cfg.clone();
    assert_eq!(run(&mut cfg, &pool), Ok(true));

    let heap_after = |cfg: &ControlFlowGraph| {
        let mut heap = Heap::new();
        let object = heap.alloc_object();
        let outcome = evaluate_with(cfg, &pool, &[Value::int(3), object], heap, 100)
            .unwrap_or_else(|err| panic!("{err}"));
        (
            outcome.heap.field(object, slots[0]),
            outcome.heap.field(object, slots[1]),
        )
    };
    assert_eq!(heap_after(&original), (Some(Value::int(3)), Some(Value::int(99))));
    assert_eq!(heap_after(&cfg), heap_after(&original));
}
