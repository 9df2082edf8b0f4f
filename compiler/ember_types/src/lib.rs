//! Type system queries for the Ember optimizer.
//!
//! The optimizer never inspects type structure directly. It asks the
//! [`Pool`] a handful of questions:
//!
//! - is this a runtime-owned scalar wrapper ([`Pool::is_scalar`])?
//! - can a value of type B be stored where type A is expected
//!   ([`Pool::can_assign`])?
//! - what does a pointer point to ([`Pool::pointee`])?
//! - who declares this field or method, what kind of method is it, and
//!   what is it called ([`Pool::field`], [`Pool::method`], [`Pool::name`])?
//!
//! # Scalar wrappers
//!
//! Scalar wrapper types (`System.Int32`, `System.Double`, ...) are
//! pre-interned at fixed [`Idx`] values. They are created and owned by the
//! runtime, which lets the optimizer assume they occupy no storage beyond
//! the raw value: the address of `m_value` is the address of the wrapper.

mod idx;
mod member;
mod pool;

pub use idx::Idx;
pub use member::{FieldDef, FieldId, MethodDef, MethodId, MethodKind, ScalarMembers};
pub use pool::{Name, Pool, TypeKind};

/// Primitive representation of a scalar wrapper type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalarKind {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    /// Width of the raw value in bits.
    pub const fn bits(self) -> u32 {
        match self {
            ScalarKind::Bool | ScalarKind::I8 | ScalarKind::U8 => 8,
            ScalarKind::Char | ScalarKind::I16 | ScalarKind::U16 => 16,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 32,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 64,
        }
    }

    /// Returns `true` for `F32` and `F64`.
    pub const fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    /// Returns `true` for the signed integer kinds.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64
        )
    }

    /// Short keyword used by IR dumps.
    pub const fn keyword(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Char => "char",
            ScalarKind::I8 => "sbyte",
            ScalarKind::I16 => "short",
            ScalarKind::I32 => "int",
            ScalarKind::I64 => "long",
            ScalarKind::U8 => "byte",
            ScalarKind::U16 => "ushort",
            ScalarKind::U32 => "uint",
            ScalarKind::U64 => "ulong",
            ScalarKind::F32 => "float",
            ScalarKind::F64 => "double",
        }
    }

    /// Runtime type name (`System.<name>`).
    pub const fn runtime_name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "Boolean",
            ScalarKind::Char => "Char",
            ScalarKind::I8 => "SByte",
            ScalarKind::I16 => "Int16",
            ScalarKind::I32 => "Int32",
            ScalarKind::I64 => "Int64",
            ScalarKind::U8 => "Byte",
            ScalarKind::U16 => "UInt16",
            ScalarKind::U32 => "UInt32",
            ScalarKind::U64 => "UInt64",
            ScalarKind::F32 => "Single",
            ScalarKind::F64 => "Double",
        }
    }
}
