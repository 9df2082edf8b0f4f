//! Field and method tables.

use crate::{Idx, Name};

/// Field handle within a [`Pool`](crate::Pool).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct FieldId(u32);

impl FieldId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Method handle within a [`Pool`](crate::Pool).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct MethodId(u32);

impl MethodId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A declared field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldDef {
    pub name: Name,
    /// The type that declares the field.
    pub owner: Idx,
    /// The field's value type.
    pub ty: Idx,
    pub is_static: bool,
}

/// Structural classification of a callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum MethodKind {
    /// Instance constructor. Receives the address of the value under
    /// construction as its `this` argument.
    Constructor,
    /// Instance method with a `this` argument.
    Instance,
    /// Static method. Call sites still pass a (null) receiver slot.
    Static,
}

/// A declared method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDef {
    pub name: Name,
    pub owner: Idx,
    pub kind: MethodKind,
    /// Parameter types including the receiver slot at position 0.
    pub this_plus_arguments: Vec<Idx>,
    pub return_type: Idx,
}

impl MethodDef {
    /// Number of arguments a call site passes, including the receiver slot.
    pub fn arity(&self) -> usize {
        self.this_plus_arguments.len()
    }
}

/// Members the runtime declares on every scalar wrapper type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalarMembers {
    /// The wrapped raw value, `m_value`.
    pub value_field: FieldId,
    /// `.ctor(this, value)`.
    pub ctor: MethodId,
    /// Instance `Equals(this, other)`.
    pub equals: MethodId,
    /// Static `op_Equality(null, left, right)`.
    pub op_equality: MethodId,
    /// Static `op_Inequality(null, left, right)`.
    pub op_inequality: MethodId,
}
