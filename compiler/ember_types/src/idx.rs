//! Type index handle.
//!
//! Every type lives in the [`Pool`](crate::Pool) and is referenced by a
//! 32-bit `Idx`. The runtime-owned scalar wrapper types occupy fixed
//! indices so passes can name them without a pool lookup.

use std::fmt;

use crate::ScalarKind;

/// A 32-bit index into the type pool.
///
/// Types are compared by index equality, never structurally.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Idx(u32);

impl Idx {
    // === Pre-interned Types (indices 0-13) ===

    /// `System.Void`.
    pub const VOID: Self = Self(0);
    /// `System.Boolean`.
    pub const BOOL: Self = Self(1);
    /// `System.Char`.
    pub const CHAR: Self = Self(2);
    /// `System.SByte`.
    pub const I8: Self = Self(3);
    /// `System.Int16`.
    pub const I16: Self = Self(4);
    /// `System.Int32`.
    pub const I32: Self = Self(5);
    /// `System.Int64`.
    pub const I64: Self = Self(6);
    /// `System.Byte`.
    pub const U8: Self = Self(7);
    /// `System.UInt16`.
    pub const U16: Self = Self(8);
    /// `System.UInt32`.
    pub const U32: Self = Self(9);
    /// `System.UInt64`.
    pub const U64: Self = Self(10);
    /// `System.Single`.
    pub const F32: Self = Self(11);
    /// `System.Double`.
    pub const F64: Self = Self(12);
    /// `System.Object`, the root reference type.
    pub const OBJECT: Self = Self(13);

    /// Number of pre-interned types.
    pub const PRIMITIVE_COUNT: u32 = 14;

    /// The scalar wrapper types, in index order.
    pub const SCALARS: [Self; 12] = [
        Self::BOOL,
        Self::CHAR,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
    ];

    /// Create an index from a raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is one of the pre-interned types.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::PRIMITIVE_COUNT
    }

    /// The scalar kind of a pre-interned scalar wrapper, without a pool.
    pub const fn scalar_kind(self) -> Option<ScalarKind> {
        match self.0 {
            1 => Some(ScalarKind::Bool),
            2 => Some(ScalarKind::Char),
            3 => Some(ScalarKind::I8),
            4 => Some(ScalarKind::I16),
            5 => Some(ScalarKind::I32),
            6 => Some(ScalarKind::I64),
            7 => Some(ScalarKind::U8),
            8 => Some(ScalarKind::U16),
            9 => Some(ScalarKind::U32),
            10 => Some(ScalarKind::U64),
            11 => Some(ScalarKind::F32),
            12 => Some(ScalarKind::F64),
            _ => None,
        }
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::VOID => write!(f, "Idx::VOID"),
            Self::OBJECT => write!(f, "Idx::OBJECT"),
            other => match other.scalar_kind() {
                Some(kind) => write!(f, "Idx::{kind:?}"),
                None => write!(f, "Idx({})", self.0),
            },
        }
    }
}

impl fmt::Display for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::VOID => write!(f, "void"),
            Self::OBJECT => write!(f, "object"),
            other => match other.scalar_kind() {
                Some(kind) => write!(f, "{}", kind.keyword()),
                None => write!(f, "type#{}", self.0),
            },
        }
    }
}

const _: () = assert!(std::mem::size_of::<Idx>() == 4);
