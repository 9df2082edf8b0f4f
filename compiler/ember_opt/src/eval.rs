//! Reference interpreter for control-flow graphs.
//!
//! Executes a graph directly, with the runtime semantics of the scalar
//! wrapper built-ins (`.ctor`, `Equals`, `op_Equality`, `op_Inequality`).
//! Used to check that a rewrite preserves behavior: run the graph before
//! and after, compare the [`Outcome`]s.
//!
//! Every dereference of a null pointer or receiver faults with
//! [`EvalError::NullReference`], whatever the operator's flags say; the
//! flags describe what generated code must check, not what the runtime
//! tolerates.

use rustc_hash::FxHashMap;

use ember_types::{FieldId, MethodId, MethodKind, Pool, ScalarKind};

use crate::cfg::ControlFlowGraph;
use crate::ir::{
    BlockId, Condition, ConstValue, Constant, Expression, OpId, OpKind, Operator, VarId,
};

/// Step budget used by [`evaluate`].
pub const DEFAULT_FUEL: usize = 100_000;

// ── Values ──────────────────────────────────────────────────────────

/// A runtime value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// Never written.
    Undef,
    /// Raw scalar payload, encoded like [`ConstValue`].
    Bits(u64),
    Null,
    Ptr(Location),
    Object(usize),
    Array(usize),
}

impl Value {
    pub fn int(value: i64) -> Self {
        Value::Bits(value as u64)
    }

    pub fn bool(value: bool) -> Self {
        Value::Bits(u64::from(value))
    }

    pub fn f32(value: f32) -> Self {
        Value::Bits(u64::from(value.to_bits()))
    }

    pub fn f64(value: f64) -> Self {
        Value::Bits(value.to_bits())
    }

    fn of_constant(constant: &Constant) -> Self {
        match constant.value {
            ConstValue::Int(value) => Value::int(value),
            ConstValue::Float(bits) => Value::Bits(bits),
            ConstValue::Bool(value) => Value::bool(value),
            ConstValue::Null => Value::Null,
        }
    }
}

/// Something a pointer can point at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Var(VarId),
    Field { object: usize, field: FieldId },
    Static(FieldId),
    Element { array: usize, index: usize },
}

/// Objects, arrays and static fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Heap {
    objects: Vec<FxHashMap<FieldId, Value>>,
    arrays: Vec<Vec<Value>>,
    statics: FxHashMap<FieldId, Value>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object with every field [`Value::Undef`].
    pub fn alloc_object(&mut self) -> Value {
        self.objects.push(FxHashMap::default());
        Value::Object(self.objects.len() - 1)
    }

    pub fn alloc_array(&mut self, elements: Vec<Value>) -> Value {
        self.arrays.push(elements);
        Value::Array(self.arrays.len() - 1)
    }

    pub fn set_field(&mut self, object: Value, field: FieldId, value: Value) {
        if let Value::Object(object) = object {
            self.objects[object].insert(field, value);
        }
    }

    pub fn field(&self, object: Value, field: FieldId) -> Option<Value> {
        match object {
            Value::Object(object) => Some(
                self.objects[object]
                    .get(&field)
                    .copied()
                    .unwrap_or(Value::Undef),
            ),
            _ => None,
        }
    }

    pub fn set_static(&mut self, field: FieldId, value: Value) {
        self.statics.insert(field, value);
    }

    pub fn static_value(&self, field: FieldId) -> Value {
        self.statics.get(&field).copied().unwrap_or(Value::Undef)
    }

    pub fn elements(&self, array: Value) -> Option<&[Value]> {
        match array {
            Value::Array(array) => Some(&self.arrays[array]),
            _ => None,
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────

/// Runtime fault or malformed graph.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("null reference at {op:?}")]
    NullReference { op: OpId },

    #[error("index {index} out of range for length {len} at {op:?}")]
    IndexOutOfRange { op: OpId, index: i64, len: usize },

    #[error("invalid operand at {op:?}: {message}")]
    InvalidOperand { op: OpId, message: String },

    #[error("cannot evaluate call to `{method}` at {op:?}")]
    UnsupportedCall { op: OpId, method: String },

    #[error("expected {expected} argument(s), got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("block {block:?} ends without a control operator")]
    FellOffBlock { block: BlockId },

    #[error("step budget of {fuel} exhausted")]
    OutOfFuel { fuel: usize },
}

/// Final state of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Value of the `ret` operand, `None` for a void return.
    pub returned: Option<Value>,
    /// Final contents of every variable, indexed by [`VarId`].
    pub vars: Vec<Value>,
    pub heap: Heap,
    /// Operators executed.
    pub steps: usize,
}

impl Outcome {
    #[inline]
    pub fn var(&self, var: VarId) -> Value {
        self.vars[var.index()]
    }
}

/// Run `cfg` on `args` (one per argument variable, in declaration order)
/// with an empty heap.
pub fn evaluate(
    cfg: &ControlFlowGraph,
    pool: &Pool,
    args: &[Value],
) -> Result<Outcome, EvalError> {
    evaluate_with(cfg, pool, args, Heap::new(), DEFAULT_FUEL)
}

/// Run `cfg` on `args` against `heap`, executing at most `fuel` operators.
pub fn evaluate_with(
    cfg: &ControlFlowGraph,
    pool: &Pool,
    args: &[Value],
    heap: Heap,
    fuel: usize,
) -> Result<Outcome, EvalError> {
    let params: Vec<VarId> = cfg.var_ids().filter(|&v| cfg.var(v).is_argument()).collect();
    if params.len() != args.len() {
        return Err(EvalError::ArgumentCount {
            expected: params.len(),
            found: args.len(),
        });
    }
    let mut machine = Machine {
        cfg,
        pool,
        vars: vec![Value::Undef; cfg.num_vars()],
        heap,
    };
    for (&param, &arg) in params.iter().zip(args) {
        machine.vars[param.index()] = arg;
    }
    machine.run(fuel)
}

// ── Machine ─────────────────────────────────────────────────────────

enum Flow {
    Next,
    Jump(BlockId),
    Return(Option<Value>),
}

struct Machine<'a> {
    cfg: &'a ControlFlowGraph,
    pool: &'a Pool,
    vars: Vec<Value>,
    heap: Heap,
}

fn invalid(op: OpId, message: impl Into<String>) -> EvalError {
    EvalError::InvalidOperand {
        op,
        message: message.into(),
    }
}

impl Machine<'_> {
    fn run(mut self, fuel: usize) -> Result<Outcome, EvalError> {
        let cfg = self.cfg;
        let mut block = cfg.entry();
        let mut steps = 0;
        'blocks: loop {
            for &id in cfg.block(block).ops() {
                if steps == fuel {
                    return Err(EvalError::OutOfFuel { fuel });
                }
                steps += 1;
                match self.step(id)? {
                    Flow::Next => {}
                    Flow::Jump(target) => {
                        block = target;
                        continue 'blocks;
                    }
                    Flow::Return(returned) => {
                        return Ok(Outcome {
                            returned,
                            vars: self.vars,
                            heap: self.heap,
                            steps,
                        });
                    }
                }
            }
            return Err(EvalError::FellOffBlock { block });
        }
    }

    fn eval(&self, expr: &Expression) -> Value {
        match expr {
            Expression::Var(var) => self.vars[var.index()],
            Expression::Const(constant) => Value::of_constant(constant),
        }
    }

    fn arg(&self, id: OpId, op: &Operator, n: usize) -> Result<Value, EvalError> {
        op.args
            .get(n)
            .map(|expr| self.eval(expr))
            .ok_or_else(|| invalid(id, format!("missing argument {n}")))
    }

    fn define(&mut self, op: &Operator, value: Value) {
        if let Some(result) = op.first_result() {
            self.vars[result.index()] = value;
        }
    }

    fn location(&self, id: OpId, pointer: Value) -> Result<Location, EvalError> {
        match pointer {
            Value::Ptr(location) => Ok(location),
            Value::Null => Err(EvalError::NullReference { op: id }),
            other => Err(invalid(id, format!("{other:?} is not a pointer"))),
        }
    }

    fn read(&self, location: Location) -> Value {
        match location {
            Location::Var(var) => self.vars[var.index()],
            Location::Field { object, field } => self.heap.objects[object]
                .get(&field)
                .copied()
                .unwrap_or(Value::Undef),
            Location::Static(field) => self.heap.static_value(field),
            Location::Element { array, index } => self.heap.arrays[array][index],
        }
    }

    fn write(&mut self, location: Location, value: Value) {
        match location {
            Location::Var(var) => self.vars[var.index()] = value,
            Location::Field { object, field } => {
                self.heap.objects[object].insert(field, value);
            }
            Location::Static(field) => self.heap.set_static(field, value),
            Location::Element { array, index } => self.heap.arrays[array][index] = value,
        }
    }

    fn element(&self, id: OpId, array: Value, index: Value) -> Result<Location, EvalError> {
        let array = match array {
            Value::Array(array) => array,
            Value::Null => return Err(EvalError::NullReference { op: id }),
            other => return Err(invalid(id, format!("{other:?} is not an array"))),
        };
        let Value::Bits(bits) = index else {
            return Err(invalid(id, format!("{index:?} is not an index")));
        };
        let index = bits as i64;
        let len = self.heap.arrays[array].len();
        match usize::try_from(index) {
            Ok(index) if index < len => Ok(Location::Element { array, index }),
            _ => Err(EvalError::IndexOutOfRange { op: id, index, len }),
        }
    }

    fn step(&mut self, id: OpId) -> Result<Flow, EvalError> {
        let cfg = self.cfg;
        let op = cfg.op(id);
        match op.kind {
            OpKind::Call { method } => self.call(id, op, method)?,
            OpKind::LoadInstanceField { field } => {
                let receiver = self.arg(id, op, 0)?;
                let value = self.load_field(id, receiver, field)?;
                self.define(op, value);
            }
            OpKind::LoadStaticField { field } => {
                let value = self.heap.static_value(field);
                self.define(op, value);
            }
            OpKind::LoadInstanceFieldAddress { field } => {
                let receiver = self.arg(id, op, 0)?;
                let address = match receiver {
                    Value::Object(object) => Location::Field { object, field },
                    Value::Null => return Err(EvalError::NullReference { op: id }),
                    Value::Ptr(location) if self.pool.is_scalar(self.pool.field(field).owner) => {
                        location
                    }
                    Value::Bits(_) => match op.args.first().and_then(Expression::as_var) {
                        Some(var) => Location::Var(var),
                        None => return Err(invalid(id, "address of a constant's field")),
                    },
                    other => return Err(invalid(id, format!("no field address in {other:?}"))),
                };
                self.define(op, Value::Ptr(address));
            }
            OpKind::LoadStaticFieldAddress { field } => {
                self.define(op, Value::Ptr(Location::Static(field)));
            }
            OpKind::StoreInstanceField { field } => {
                let object = self.arg(id, op, 0)?;
                let value = self.arg(id, op, 1)?;
                match object {
                    Value::Object(object) => {
                        self.heap.objects[object].insert(field, value);
                    }
                    Value::Null => return Err(EvalError::NullReference { op: id }),
                    other => return Err(invalid(id, format!("cannot store a field of {other:?}"))),
                }
            }
            OpKind::LoadElement => {
                let location = self.element(id, self.arg(id, op, 0)?, self.arg(id, op, 1)?)?;
                let value = self.read(location);
                self.define(op, value);
            }
            OpKind::LoadElementAddress => {
                let location = self.element(id, self.arg(id, op, 0)?, self.arg(id, op, 1)?)?;
                self.define(op, Value::Ptr(location));
            }
            OpKind::AddressAssignment => {
                let Some(var) = op.args.first().and_then(Expression::as_var) else {
                    return Err(invalid(id, "address of a constant"));
                };
                self.define(op, Value::Ptr(Location::Var(var)));
            }
            OpKind::LoadIndirect { .. } => {
                let location = self.location(id, self.arg(id, op, 0)?)?;
                let value = self.read(location);
                self.define(op, value);
            }
            OpKind::StoreIndirect => {
                let location = self.location(id, self.arg(id, op, 0)?)?;
                let value = self.arg(id, op, 1)?;
                self.write(location, value);
            }
            OpKind::Assign => {
                let value = self.arg(id, op, 0)?;
                self.define(op, value);
            }
            OpKind::Compare { condition } => {
                let kind = op.args.first().and_then(|left| {
                    self.pool.scalar_kind(self.cfg.expr_type(left))
                });
                let equal = values_equal(
                    id,
                    kind,
                    self.arg(id, op, 0)?,
                    self.arg(id, op, 1)?,
                    false,
                )?;
                let result = match condition {
                    Condition::Eq => equal,
                    Condition::Ne => !equal,
                };
                self.define(op, Value::bool(result));
            }
            OpKind::Nop => {}
            OpKind::Jump { target } => return Ok(Flow::Jump(target)),
            OpKind::Branch {
                then_block,
                else_block,
            } => {
                return match self.arg(id, op, 0)? {
                    Value::Bits(0) => Ok(Flow::Jump(else_block)),
                    Value::Bits(_) => Ok(Flow::Jump(then_block)),
                    other => Err(invalid(id, format!("branch on {other:?}"))),
                };
            }
            OpKind::Return => {
                let returned = op.args.first().map(|expr| self.eval(expr));
                return Ok(Flow::Return(returned));
            }
        }
        Ok(Flow::Next)
    }

    fn load_field(&self, id: OpId, receiver: Value, field: FieldId) -> Result<Value, EvalError> {
        let scalar_owner = self.pool.is_scalar(self.pool.field(field).owner);
        match receiver {
            Value::Null => Err(EvalError::NullReference { op: id }),
            Value::Object(object) => Ok(self.heap.objects[object]
                .get(&field)
                .copied()
                .unwrap_or(Value::Undef)),
            Value::Ptr(location) if scalar_owner => Ok(self.read(location)),
            Value::Bits(_) if scalar_owner => Ok(receiver),
            other => Err(invalid(id, format!("cannot load a field of {other:?}"))),
        }
    }

    fn call(&mut self, id: OpId, op: &Operator, method: MethodId) -> Result<(), EvalError> {
        let pool = self.pool;
        let target = pool.method(method);
        let name = pool.name(target.name);
        let unsupported = || EvalError::UnsupportedCall {
            op: id,
            method: name.to_owned(),
        };
        let Some(kind) = pool.scalar_kind(target.owner) else {
            return Err(unsupported());
        };
        match (target.kind, name) {
            (MethodKind::Constructor, ".ctor") => {
                let location = self.location(id, self.arg(id, op, 0)?)?;
                let value = self.arg(id, op, 1)?;
                self.write(location, value);
            }
            (MethodKind::Instance, "Equals") => {
                let receiver = self.arg(id, op, 0)?;
                let this = match receiver {
                    Value::Bits(_) => receiver,
                    pointer => self.read(self.location(id, pointer)?),
                };
                let equal = values_equal(id, Some(kind), this, self.arg(id, op, 1)?, true)?;
                self.define(op, Value::bool(equal));
            }
            (MethodKind::Static, "op_Equality" | "op_Inequality") => {
                let equal = values_equal(
                    id,
                    Some(kind),
                    self.arg(id, op, 1)?,
                    self.arg(id, op, 2)?,
                    false,
                )?;
                self.define(op, Value::bool(equal == (name == "op_Equality")));
            }
            _ => return Err(unsupported()),
        }
        Ok(())
    }
}

/// Compare two values of scalar kind `kind` (`None` for references).
///
/// Floats compare by IEEE rules; `nan_is_equal` gives `Equals` semantics,
/// where NaN equals itself.
fn values_equal(
    id: OpId,
    kind: Option<ScalarKind>,
    left: Value,
    right: Value,
    nan_is_equal: bool,
) -> Result<bool, EvalError> {
    let (Value::Bits(a), Value::Bits(b)) = (left, right) else {
        if matches!(left, Value::Undef) || matches!(right, Value::Undef) {
            return Err(invalid(id, "comparison reads an undefined value"));
        }
        return Ok(left == right);
    };
    let equal = match kind {
        Some(ScalarKind::F32) => {
            let (a, b) = (f32::from_bits(a as u32), f32::from_bits(b as u32));
            a == b || (nan_is_equal && a.is_nan() && b.is_nan())
        }
        Some(ScalarKind::F64) => {
            let (a, b) = (f64::from_bits(a), f64::from_bits(b));
            a == b || (nan_is_equal && a.is_nan() && b.is_nan())
        }
        _ => a == b,
    };
    Ok(equal)
}
