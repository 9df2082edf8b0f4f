//! Type pool: interned types, names, fields and methods.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{FieldDef, FieldId, Idx, MethodDef, MethodId, MethodKind, ScalarKind, ScalarMembers};

/// Interned identifier (type, field and method names).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

/// Structure of a pooled type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    /// Runtime-owned scalar wrapper.
    Scalar(ScalarKind),
    /// `System.Object`.
    Object,
    /// Named reference type.
    Class { name: Name },
    /// Managed or unmanaged pointer / by-ref.
    Pointer { pointee: Idx },
    /// Single-dimensional array.
    Array { element: Idx },
}

/// The type pool.
///
/// Pre-interns `void`, every scalar wrapper and `object` at the fixed
/// indices declared on [`Idx`]. Compound types are deduplicated, so two
/// `pointer_to(Idx::I32)` calls return the same index.
pub struct Pool {
    types: Vec<TypeKind>,
    dedup: FxHashMap<TypeKind, Idx>,
    names: Vec<Box<str>>,
    name_lookup: FxHashMap<Box<str>, Name>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    scalar_members: FxHashMap<Idx, ScalarMembers>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// Create a pool holding only the pre-interned types.
    pub fn new() -> Self {
        let mut pool = Pool {
            types: Vec::with_capacity(64),
            dedup: FxHashMap::default(),
            names: Vec::new(),
            name_lookup: FxHashMap::default(),
            fields: Vec::new(),
            methods: Vec::new(),
            scalar_members: FxHashMap::default(),
        };

        pool.push(TypeKind::Void);
        for idx in Idx::SCALARS {
            if let Some(kind) = idx.scalar_kind() {
                pool.push(TypeKind::Scalar(kind));
            }
        }
        pool.push(TypeKind::Object);
        debug_assert_eq!(pool.types.len(), Idx::PRIMITIVE_COUNT as usize);

        pool
    }

    fn push(&mut self, kind: TypeKind) -> Idx {
        let raw = u32::try_from(self.types.len())
            .unwrap_or_else(|_| panic!("type count exceeds u32::MAX"));
        let idx = Idx::from_raw(raw);
        self.types.push(kind);
        self.dedup.insert(kind, idx);
        idx
    }

    /// Intern a type, returning the existing index for a duplicate.
    pub fn intern(&mut self, kind: TypeKind) -> Idx {
        if let Some(&idx) = self.dedup.get(&kind) {
            return idx;
        }
        let idx = self.push(kind);
        tracing::trace!(idx = idx.raw(), ?kind, "interned type");
        idx
    }

    /// Look up the structure of a type.
    #[inline]
    pub fn kind(&self, idx: Idx) -> TypeKind {
        self.types[idx.index()]
    }

    /// Create a pointer type `*pointee`.
    pub fn pointer_to(&mut self, pointee: Idx) -> Idx {
        self.intern(TypeKind::Pointer { pointee })
    }

    /// Create an array type `element[]`.
    pub fn array_of(&mut self, element: Idx) -> Idx {
        self.intern(TypeKind::Array { element })
    }

    /// Create (or find) a named reference type.
    pub fn class(&mut self, name: &str) -> Idx {
        let name = self.intern_name(name);
        self.intern(TypeKind::Class { name })
    }

    // === Queries ===

    /// Returns `true` if `idx` is a runtime-owned scalar wrapper.
    #[inline]
    pub fn is_scalar(&self, idx: Idx) -> bool {
        self.scalar_kind(idx).is_some()
    }

    /// The primitive representation of a scalar wrapper.
    pub fn scalar_kind(&self, idx: Idx) -> Option<ScalarKind> {
        match self.kind(idx) {
            TypeKind::Scalar(kind) => Some(kind),
            _ => None,
        }
    }

    /// The underlying type of a pointer, `None` for non-pointers.
    pub fn pointee(&self, idx: Idx) -> Option<Idx> {
        match self.kind(idx) {
            TypeKind::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    /// The element type of an array, `None` for non-arrays.
    pub fn element(&self, idx: Idx) -> Option<Idx> {
        match self.kind(idx) {
            TypeKind::Array { element } => Some(element),
            _ => None,
        }
    }

    /// Returns `true` for types whose values are heap references.
    pub fn is_reference(&self, idx: Idx) -> bool {
        matches!(
            self.kind(idx),
            TypeKind::Object | TypeKind::Class { .. } | TypeKind::Array { .. }
        )
    }

    /// Can a value of type `from` be stored in a slot of type `to`?
    ///
    /// Identity always holds. Every reference type is assignable to
    /// `object`. Scalars never convert implicitly: `int` is not assignable
    /// from `short`, since the wrapper constructors take exactly their own
    /// raw type.
    pub fn can_assign(&self, to: Idx, from: Idx) -> bool {
        if to == from {
            return true;
        }
        to == Idx::OBJECT && self.is_reference(from)
    }

    // === Names ===

    /// Intern a name.
    pub fn intern_name(&mut self, text: &str) -> Name {
        if let Some(&name) = self.name_lookup.get(text) {
            return name;
        }
        let raw = u32::try_from(self.names.len())
            .unwrap_or_else(|_| panic!("name count exceeds u32::MAX"));
        let name = Name::from_raw(raw);
        self.names.push(text.into());
        self.name_lookup.insert(text.into(), name);
        name
    }

    /// Resolve an interned name.
    #[inline]
    pub fn name(&self, name: Name) -> &str {
        &self.names[name.raw() as usize]
    }

    // === Members ===

    /// Declare a field.
    pub fn add_field(&mut self, def: FieldDef) -> FieldId {
        let raw = u32::try_from(self.fields.len())
            .unwrap_or_else(|_| panic!("field count exceeds u32::MAX"));
        self.fields.push(def);
        FieldId::new(raw)
    }

    #[inline]
    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.index()]
    }

    /// Declare a method.
    pub fn add_method(&mut self, def: MethodDef) -> MethodId {
        let raw = u32::try_from(self.methods.len())
            .unwrap_or_else(|_| panic!("method count exceeds u32::MAX"));
        self.methods.push(def);
        MethodId::new(raw)
    }

    #[inline]
    pub fn method(&self, id: MethodId) -> &MethodDef {
        &self.methods[id.index()]
    }

    /// Declare the runtime members of a scalar wrapper.
    ///
    /// Idempotent: the second call for the same type returns the members
    /// declared by the first. Returns `None` for non-scalar types.
    pub fn declare_scalar_members(&mut self, scalar: Idx) -> Option<ScalarMembers> {
        if let Some(&members) = self.scalar_members.get(&scalar) {
            return Some(members);
        }
        self.scalar_kind(scalar)?;

        let this_ptr = self.pointer_to(scalar);
        let value_name = self.intern_name("m_value");
        let value_field = self.add_field(FieldDef {
            name: value_name,
            owner: scalar,
            ty: scalar,
            is_static: false,
        });

        let ctor = self.add_member_method(
            ".ctor",
            scalar,
            MethodKind::Constructor,
            &[this_ptr, scalar],
            Idx::VOID,
        );
        let equals = self.add_member_method(
            "Equals",
            scalar,
            MethodKind::Instance,
            &[this_ptr, scalar],
            Idx::BOOL,
        );
        let op_equality = self.add_member_method(
            "op_Equality",
            scalar,
            MethodKind::Static,
            &[scalar, scalar, scalar],
            Idx::BOOL,
        );
        let op_inequality = self.add_member_method(
            "op_Inequality",
            scalar,
            MethodKind::Static,
            &[scalar, scalar, scalar],
            Idx::BOOL,
        );

        let members = ScalarMembers {
            value_field,
            ctor,
            equals,
            op_equality,
            op_inequality,
        };
        self.scalar_members.insert(scalar, members);
        tracing::trace!(scalar = scalar.raw(), "declared scalar members");
        Some(members)
    }

    fn add_member_method(
        &mut self,
        name: &str,
        owner: Idx,
        kind: MethodKind,
        this_plus_arguments: &[Idx],
        return_type: Idx,
    ) -> MethodId {
        let name = self.intern_name(name);
        self.add_method(MethodDef {
            name,
            owner,
            kind,
            this_plus_arguments: this_plus_arguments.to_vec(),
            return_type,
        })
    }

    /// Render a type for diagnostics and IR dumps.
    pub fn display(&self, idx: Idx) -> String {
        match self.kind(idx) {
            TypeKind::Void | TypeKind::Object | TypeKind::Scalar(_) => idx.to_string(),
            TypeKind::Class { name } => self.name(name).to_owned(),
            TypeKind::Pointer { pointee } => format!("{}*", self.display(pointee)),
            TypeKind::Array { element } => format!("{}[]", self.display(element)),
        }
    }
}
