//! Operator IR: the nodes of the control-flow graph.
//!
//! Every executable step of a method body is an [`Operator`]. Operators read
//! [`Expression`]s (variables or constants) and write result variables. The
//! operator kinds form a closed set ([`OpKind`]); passes dispatch with
//! `match` rather than by downcasting.
//!
//! Operators live in the [`ControlFlowGraph`](crate::ControlFlowGraph) arena
//! and are addressed by [`OpId`]. An operator that has been replaced or
//! removed stays in the arena but is *detached*: it no longer belongs to a
//! block, and no rewrite may touch it again.

use smallvec::{smallvec, SmallVec};

use ember_types::{FieldId, Idx, MethodId};

// ── ID newtypes ─────────────────────────────────────────────────────

/// Variable ID within a [`ControlFlowGraph`](crate::ControlFlowGraph).
///
/// IDs are allocated sequentially starting from 0 and are never reused,
/// so a variable keeps its ID across every rewrite and cache refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Operator ID within a [`ControlFlowGraph`](crate::ControlFlowGraph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct OpId(u32);

impl OpId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block ID within a [`ControlFlowGraph`](crate::ControlFlowGraph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Variables ───────────────────────────────────────────────────────

/// How a variable is bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum VarKind {
    /// Method parameter. Immutable: no operator inside the body defines it.
    Argument,
    /// Declared local variable.
    Local,
    /// Compiler-introduced temporary.
    Temporary,
}

/// Dense index into the flow chain tables.
///
/// Assigned by every flow-cache refresh. `generation` names the refresh
/// that produced it; chain lookups with an index from another generation
/// fail instead of reading a foreign slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanningTreeIndex {
    pub(crate) generation: u32,
    pub(crate) slot: u32,
}

impl SpanningTreeIndex {
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn slot(self) -> usize {
        self.slot as usize
    }
}

/// A storage location of the method body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub kind: VarKind,
    pub ty: Idx,
    pub(crate) index: Option<SpanningTreeIndex>,
    pub(crate) dropped: bool,
}

impl Variable {
    pub(crate) fn new(kind: VarKind, ty: Idx) -> Self {
        Variable {
            kind,
            ty,
            index: None,
            dropped: false,
        }
    }

    #[inline]
    pub fn is_argument(&self) -> bool {
        self.kind == VarKind::Argument
    }

    /// The chain index from the most recent flow-cache refresh.
    ///
    /// `None` for variables allocated after that refresh and for dropped
    /// variables.
    #[inline]
    pub fn spanning_tree_index(&self) -> Option<SpanningTreeIndex> {
        self.index
    }

    /// Returns `true` once dead-variable elimination has removed the
    /// variable from the method.
    #[inline]
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }
}

// ── Expressions ─────────────────────────────────────────────────────

/// Raw payload of a constant.
///
/// Integers are stored sign- or zero-extended to 64 bits according to their
/// type. Floats store their IEEE bit pattern (`f32::to_bits` widened for
/// `float`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstValue {
    Int(i64),
    Float(u64),
    Bool(bool),
    Null,
}

/// A typed constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Constant {
    pub ty: Idx,
    pub value: ConstValue,
}

impl Constant {
    pub fn int(ty: Idx, value: i64) -> Self {
        Constant {
            ty,
            value: ConstValue::Int(value),
        }
    }

    pub fn f32(value: f32) -> Self {
        Constant {
            ty: Idx::F32,
            value: ConstValue::Float(u64::from(value.to_bits())),
        }
    }

    pub fn f64(value: f64) -> Self {
        Constant {
            ty: Idx::F64,
            value: ConstValue::Float(value.to_bits()),
        }
    }

    pub fn bool(value: bool) -> Self {
        Constant {
            ty: Idx::BOOL,
            value: ConstValue::Bool(value),
        }
    }

    /// The null reference, typed as `ty` (`object` for static receivers).
    pub fn null(ty: Idx) -> Self {
        Constant {
            ty,
            value: ConstValue::Null,
        }
    }
}

/// An operand: a variable read or a constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Expression {
    Var(VarId),
    Const(Constant),
}

impl Expression {
    /// The variable this expression reads, if it is a variable reference.
    #[inline]
    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Expression::Var(var) => Some(*var),
            Expression::Const(_) => None,
        }
    }

    #[inline]
    pub fn is_const(&self) -> bool {
        matches!(self, Expression::Const(_))
    }
}

impl From<VarId> for Expression {
    fn from(var: VarId) -> Self {
        Expression::Var(var)
    }
}

impl From<Constant> for Expression {
    fn from(constant: Constant) -> Self {
        Expression::Const(constant)
    }
}

// ── Operator payloads ───────────────────────────────────────────────

/// Source position attached to an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct DebugInfo {
    pub line: u32,
    pub column: u32,
}

bitflags::bitflags! {
    /// Runtime checks an operator performs.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct OpFlags: u8 {
        /// Dereferencing a null receiver or pointer must raise.
        const CHECK_FOR_NULL = 1 << 0;
        /// The operator can raise for reasons other than a null receiver
        /// (an index out of range, a throwing callee).
        const MAY_THROW = 1 << 1;
    }
}

/// Comparison condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Condition {
    Eq,
    Ne,
}

impl Condition {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
        }
    }
}

/// The kind of an operator, with its kind-specific payload.
///
/// Operand layout per kind:
///
/// | Kind | args | results |
/// |------|------|---------|
/// | `Call` | `[this or null, args..]` | 0 or 1 |
/// | `LoadInstanceField` | `[object or pointer]` | 0 or 1 |
/// | `LoadStaticField` | `[]` | 1 |
/// | `LoadInstanceFieldAddress` | `[object or pointer]` | 0 or 1 |
/// | `LoadStaticFieldAddress` | `[]` | 1 |
/// | `StoreInstanceField` | `[object, value]` | 0 |
/// | `LoadElement`, `LoadElementAddress` | `[array, index]` | 0 or 1 |
/// | `AddressAssignment` | `[addressed]` | 1 |
/// | `LoadIndirect` | `[pointer]` | 0 or 1 |
/// | `StoreIndirect` | `[pointer, value]` | 0 |
/// | `Assign` | `[value]` | 1 |
/// | `Compare` | `[left, right]` | 1 |
/// | `Branch` | `[condition]` | 0 |
/// | `Return` | `[]` or `[value]` | 0 |
/// | `Nop`, `Jump` | `[]` | 0 |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Method invocation. Whether it is a constructor, instance or static
    /// call is a property of the callee.
    Call { method: MethodId },
    LoadInstanceField { field: FieldId },
    LoadStaticField { field: FieldId },
    LoadInstanceFieldAddress { field: FieldId },
    LoadStaticFieldAddress { field: FieldId },
    StoreInstanceField { field: FieldId },
    LoadElement,
    LoadElementAddress,
    /// `result = &addressed`.
    AddressAssignment,
    /// `result = *pointer`, reading a `ty`.
    LoadIndirect { ty: Idx },
    /// `*pointer = value`.
    StoreIndirect,
    /// `result = value`.
    Assign,
    Compare { condition: Condition },
    Nop,
    Jump { target: BlockId },
    Branch { then_block: BlockId, else_block: BlockId },
    Return,
}

impl OpKind {
    /// Control operators end a basic block.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            OpKind::Jump { .. } | OpKind::Branch { .. } | OpKind::Return
        )
    }

    /// Short name used by IR dumps and diagnostics.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpKind::Call { .. } => "call",
            OpKind::LoadInstanceField { .. } => "ldfld",
            OpKind::LoadStaticField { .. } => "ldsfld",
            OpKind::LoadInstanceFieldAddress { .. } => "ldflda",
            OpKind::LoadStaticFieldAddress { .. } => "ldsflda",
            OpKind::StoreInstanceField { .. } => "stfld",
            OpKind::LoadElement => "ldelem",
            OpKind::LoadElementAddress => "ldelema",
            OpKind::AddressAssignment => "addr",
            OpKind::LoadIndirect { .. } => "ldind",
            OpKind::StoreIndirect => "stind",
            OpKind::Assign => "mov",
            OpKind::Compare { .. } => "cmp",
            OpKind::Nop => "nop",
            OpKind::Jump { .. } => "jmp",
            OpKind::Branch { .. } => "br",
            OpKind::Return => "ret",
        }
    }

    /// Allowed argument counts (inclusive). `Call` arity comes from the
    /// callee and is checked by the passes that interpret it.
    pub(crate) fn arg_range(self) -> Option<(usize, usize)> {
        let range = match self {
            OpKind::Call { .. } => return None,
            OpKind::LoadStaticField { .. }
            | OpKind::LoadStaticFieldAddress { .. }
            | OpKind::Nop
            | OpKind::Jump { .. } => (0, 0),
            OpKind::LoadInstanceField { .. }
            | OpKind::LoadInstanceFieldAddress { .. }
            | OpKind::AddressAssignment
            | OpKind::LoadIndirect { .. }
            | OpKind::Assign
            | OpKind::Branch { .. } => (1, 1),
            OpKind::StoreInstanceField { .. }
            | OpKind::LoadElement
            | OpKind::LoadElementAddress
            | OpKind::StoreIndirect
            | OpKind::Compare { .. } => (2, 2),
            OpKind::Return => (0, 1),
        };
        Some(range)
    }

    /// Allowed result counts (inclusive).
    pub(crate) fn result_range(self) -> (usize, usize) {
        match self {
            // Checked loads may outlive their result for the fault.
            OpKind::Call { .. }
            | OpKind::LoadIndirect { .. }
            | OpKind::LoadInstanceField { .. }
            | OpKind::LoadInstanceFieldAddress { .. }
            | OpKind::LoadElement
            | OpKind::LoadElementAddress => (0, 1),
            OpKind::LoadStaticField { .. }
            | OpKind::LoadStaticFieldAddress { .. }
            | OpKind::AddressAssignment
            | OpKind::Assign
            | OpKind::Compare { .. } => (1, 1),
            OpKind::StoreInstanceField { .. }
            | OpKind::StoreIndirect
            | OpKind::Nop
            | OpKind::Jump { .. }
            | OpKind::Branch { .. }
            | OpKind::Return => (0, 0),
        }
    }
}

// ── Operators ───────────────────────────────────────────────────────

/// A single executable step.
///
/// Operators are built with the constructors below and handed to the CFG;
/// once attached they change only through the rewrite primitives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operator {
    pub kind: OpKind,
    pub args: SmallVec<[Expression; 3]>,
    pub results: SmallVec<[VarId; 1]>,
    pub debug: Option<DebugInfo>,
    pub flags: OpFlags,
    pub(crate) block: Option<BlockId>,
}

impl Operator {
    /// Build an operator from its parts. Prefer the kind-specific
    /// constructors.
    pub fn new(
        kind: OpKind,
        args: SmallVec<[Expression; 3]>,
        results: SmallVec<[VarId; 1]>,
        flags: OpFlags,
    ) -> Self {
        Operator {
            kind,
            args,
            results,
            debug: None,
            flags,
            block: None,
        }
    }

    /// Attach a source position.
    #[must_use]
    pub fn with_debug(mut self, line: u32, column: u32) -> Self {
        self.debug = Some(DebugInfo { line, column });
        self
    }

    /// Add runtime-check flags.
    #[must_use]
    pub fn with_flags(mut self, flags: OpFlags) -> Self {
        self.flags |= flags;
        self
    }

    fn null_check(check_for_null: bool) -> OpFlags {
        if check_for_null {
            OpFlags::CHECK_FOR_NULL
        } else {
            OpFlags::empty()
        }
    }

    // === Constructors ===

    /// `result = call method(args..)`. `args[0]` is the receiver slot.
    pub fn call(method: MethodId, args: &[Expression], result: Option<VarId>) -> Self {
        Operator::new(
            OpKind::Call { method },
            args.iter().copied().collect(),
            result.into_iter().collect(),
            OpFlags::MAY_THROW,
        )
    }

    /// `dst = value`.
    pub fn assign(dst: VarId, value: Expression) -> Self {
        Operator::new(
            OpKind::Assign,
            smallvec![value],
            smallvec![dst],
            OpFlags::empty(),
        )
    }

    /// `dst = &addressed`.
    pub fn address_of(dst: VarId, addressed: VarId) -> Self {
        Operator::new(
            OpKind::AddressAssignment,
            smallvec![Expression::Var(addressed)],
            smallvec![dst],
            OpFlags::empty(),
        )
    }

    /// `dst = left <condition> right`.
    pub fn compare(
        condition: Condition,
        dst: VarId,
        left: Expression,
        right: Expression,
    ) -> Self {
        Operator::new(
            OpKind::Compare { condition },
            smallvec![left, right],
            smallvec![dst],
            OpFlags::empty(),
        )
    }

    /// `dst = *pointer`.
    pub fn load_indirect(ty: Idx, dst: VarId, pointer: Expression, check_for_null: bool) -> Self {
        Operator::new(
            OpKind::LoadIndirect { ty },
            smallvec![pointer],
            smallvec![dst],
            Self::null_check(check_for_null),
        )
    }

    /// `*pointer = value`.
    pub fn store_indirect(pointer: Expression, value: Expression, check_for_null: bool) -> Self {
        Operator::new(
            OpKind::StoreIndirect,
            smallvec![pointer, value],
            SmallVec::new(),
            Self::null_check(check_for_null),
        )
    }

    /// `dst = object.field`.
    pub fn load_field(field: FieldId, dst: VarId, object: Expression, check_for_null: bool) -> Self {
        Operator::new(
            OpKind::LoadInstanceField { field },
            smallvec![object],
            smallvec![dst],
            Self::null_check(check_for_null),
        )
    }

    /// `dst = &object.field`.
    pub fn load_field_address(
        field: FieldId,
        dst: VarId,
        object: Expression,
        check_for_null: bool,
    ) -> Self {
        Operator::new(
            OpKind::LoadInstanceFieldAddress { field },
            smallvec![object],
            smallvec![dst],
            Self::null_check(check_for_null),
        )
    }

    /// `dst = Owner.field`.
    pub fn load_static_field(field: FieldId, dst: VarId) -> Self {
        Operator::new(
            OpKind::LoadStaticField { field },
            SmallVec::new(),
            smallvec![dst],
            OpFlags::empty(),
        )
    }

    /// `dst = &Owner.field`.
    pub fn load_static_field_address(field: FieldId, dst: VarId) -> Self {
        Operator::new(
            OpKind::LoadStaticFieldAddress { field },
            SmallVec::new(),
            smallvec![dst],
            OpFlags::empty(),
        )
    }

    /// `object.field = value`.
    pub fn store_field(field: FieldId, object: Expression, value: Expression) -> Self {
        Operator::new(
            OpKind::StoreInstanceField { field },
            smallvec![object, value],
            SmallVec::new(),
            OpFlags::CHECK_FOR_NULL,
        )
    }

    /// `dst = array[index]`, bounds- and null-checked.
    pub fn load_element(dst: VarId, array: Expression, index: Expression) -> Self {
        Operator::new(
            OpKind::LoadElement,
            smallvec![array, index],
            smallvec![dst],
            OpFlags::CHECK_FOR_NULL | OpFlags::MAY_THROW,
        )
    }

    /// `dst = &array[index]`, bounds- and null-checked.
    pub fn load_element_address(dst: VarId, array: Expression, index: Expression) -> Self {
        Operator::new(
            OpKind::LoadElementAddress,
            smallvec![array, index],
            smallvec![dst],
            OpFlags::CHECK_FOR_NULL | OpFlags::MAY_THROW,
        )
    }

    pub fn nop() -> Self {
        Operator::new(OpKind::Nop, SmallVec::new(), SmallVec::new(), OpFlags::empty())
    }

    pub fn jump(target: BlockId) -> Self {
        Operator::new(
            OpKind::Jump { target },
            SmallVec::new(),
            SmallVec::new(),
            OpFlags::empty(),
        )
    }

    pub fn branch(condition: Expression, then_block: BlockId, else_block: BlockId) -> Self {
        Operator::new(
            OpKind::Branch {
                then_block,
                else_block,
            },
            smallvec![condition],
            SmallVec::new(),
            OpFlags::empty(),
        )
    }

    pub fn ret(value: Option<Expression>) -> Self {
        Operator::new(
            OpKind::Return,
            value.into_iter().collect(),
            SmallVec::new(),
            OpFlags::empty(),
        )
    }

    // === Queries ===

    #[inline]
    pub fn arguments(&self) -> &[Expression] {
        &self.args
    }

    #[inline]
    pub fn results(&self) -> &[VarId] {
        &self.results
    }

    #[inline]
    pub fn first_result(&self) -> Option<VarId> {
        self.results.first().copied()
    }

    /// The block containing this operator, `None` once detached.
    #[inline]
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.block.is_some()
    }

    #[inline]
    pub fn is_control(&self) -> bool {
        self.kind.is_control()
    }

    #[inline]
    pub fn check_for_null(&self) -> bool {
        self.flags.contains(OpFlags::CHECK_FOR_NULL)
    }

    /// Returns `true` if the operator can raise at runtime.
    #[inline]
    pub fn may_fault(&self) -> bool {
        self.flags
            .intersects(OpFlags::CHECK_FOR_NULL | OpFlags::MAY_THROW)
    }

    /// Returns `true` if removing the operator cannot change observable
    /// behavior once its results are unused.
    ///
    /// Calls, stores and control operators are never pure. Loads are pure
    /// only while they perform no runtime check.
    pub fn is_pure(&self) -> bool {
        match self.kind {
            OpKind::Assign | OpKind::AddressAssignment | OpKind::Compare { .. } | OpKind::Nop => {
                true
            }
            OpKind::LoadInstanceField { .. }
            | OpKind::LoadStaticField { .. }
            | OpKind::LoadInstanceFieldAddress { .. }
            | OpKind::LoadStaticFieldAddress { .. }
            | OpKind::LoadElement
            | OpKind::LoadElementAddress
            | OpKind::LoadIndirect { .. } => !self.may_fault(),
            OpKind::Call { .. }
            | OpKind::StoreInstanceField { .. }
            | OpKind::StoreIndirect
            | OpKind::Jump { .. }
            | OpKind::Branch { .. }
            | OpKind::Return => false,
        }
    }

    /// Variables read by this operator, in argument order (with repeats).
    pub fn used_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.args.iter().filter_map(Expression::as_var)
    }

    /// Returns `true` if any argument reads `var`.
    pub fn uses_var(&self, var: VarId) -> bool {
        self.used_vars().any(|used| used == var)
    }

    /// Successor blocks named by a control operator.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self.kind {
            OpKind::Jump { target } => smallvec![target],
            OpKind::Branch {
                then_block,
                else_block,
            } => smallvec![then_block, else_block],
            _ => SmallVec::new(),
        }
    }

    /// Replace every argument reading `old` with `new`.
    ///
    /// Results are NOT substituted. Returns the number of replaced
    /// occurrences.
    pub(crate) fn substitute_var(&mut self, old: VarId, new: &Expression) -> usize {
        let mut replaced = 0;
        for arg in &mut self.args {
            if *arg == Expression::Var(old) {
                *arg = *new;
                replaced += 1;
            }
        }
        replaced
    }
}
