//! Types, symbols and literals

use core::fmt;
use core::ptr::NonNull;

use crate::ids::{LiteralId, SymbolId, TypeId};

/// Width of every pointer type
pub const POINTER_SIZE_BITS: u64 = 64;

/// Shape of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDef {
    /// The sentinel at id 0
    NoType,
    /// A fixed-width scalar
    Primitive { name: String, size_bits: u64 },
    /// Pointer to `base`
    Pointer { base: TypeId },
    /// Aggregate; `fields` lists field type ids in definition order
    Struct {
        name: String,
        size_bits: u64,
        fields: Vec<TypeId>,
    },
    /// A member of struct `owner`
    Field {
        owner: TypeId,
        name: String,
        ty: TypeId,
        offset_bits: u64,
    },
}

impl TypeDef {
    /// Copy of this definition with every type reference passed through `map`
    pub fn remap(&self, mut map: impl FnMut(TypeId) -> TypeId) -> Self {
        match self {
            Self::NoType | Self::Primitive { .. } => self.clone(),
            Self::Pointer { base } => Self::Pointer { base: map(*base) },
            Self::Struct {
                name,
                size_bits,
                fields,
            } => Self::Struct {
                name: name.clone(),
                size_bits: *size_bits,
                fields: fields.iter().map(|f| map(*f)).collect(),
            },
            Self::Field {
                owner,
                name,
                ty,
                offset_bits,
            } => Self::Field {
                owner: map(*owner),
                name: name.clone(),
                ty: map(*ty),
                offset_bits: *offset_bits,
            },
        }
    }

    /// Other types this definition refers to
    pub fn references(&self) -> Vec<TypeId> {
        match self {
            Self::NoType | Self::Primitive { .. } => Vec::new(),
            Self::Pointer { base } => vec![*base],
            Self::Struct { fields, .. } => fields.clone(),
            Self::Field { owner, ty, .. } => vec![*owner, *ty],
        }
    }
}

/// A type owned by an [`Ir`](crate::Ir)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    id: TypeId,
    def: TypeDef,
}

impl Type {
    pub(crate) fn new(id: TypeId, def: TypeDef) -> Self {
        Self { id, def }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn def(&self) -> &TypeDef {
        &self.def
    }

    pub(crate) fn def_mut(&mut self) -> &mut TypeDef {
        &mut self.def
    }

    /// Display name; pointers and fields are named structurally
    pub fn name(&self) -> String {
        match &self.def {
            TypeDef::NoType => "NoType".to_owned(),
            TypeDef::Primitive { name, .. } | TypeDef::Struct { name, .. } => name.clone(),
            TypeDef::Pointer { base } => format!("PointerTo(t{base})"),
            TypeDef::Field { owner, name, .. } => format!("t{owner}.{name}"),
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.def, TypeDef::Struct { .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[type t{} ", self.id)?;
        match &self.def {
            TypeDef::NoType => write!(f, "NoType")?,
            TypeDef::Primitive { name, size_bits } => write!(f, "primitive {name} {size_bits}")?,
            TypeDef::Pointer { base } => write!(f, "pointer t{base} {POINTER_SIZE_BITS}")?,
            TypeDef::Struct {
                name,
                size_bits,
                fields,
            } => {
                write!(f, "struct {name} {size_bits} [fields")?;
                for field in fields {
                    write!(f, " t{field}")?;
                }
                write!(f, "]")?;
            }
            TypeDef::Field {
                owner,
                name,
                ty,
                offset_bits,
            } => write!(f, "field t{owner} {name} t{ty} @{offset_bits}")?,
        }
        write!(f, "]")
    }
}

/// A named, typed symbol, stored in its IR's region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    id: SymbolId,
    name: String,
    ty: TypeId,
}

impl Symbol {
    pub(crate) fn new(id: SymbolId, name: String, ty: TypeId) -> Self {
        Self { id, name, ty }
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub(crate) fn set_ty(&mut self, ty: TypeId) {
        self.ty = ty;
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[symbol s{} \"{}\" t{}]", self.id, self.name, self.ty)
    }
}

/// A constant whose bytes live in its IR's region
///
/// Literals are only reachable through `&Ir`, and the region outlives every
/// borrow of the IR, so the byte view stays valid.
#[derive(Debug)]
pub struct Literal {
    id: LiteralId,
    ty: TypeId,
    bytes: NonNull<[u8]>,
}

impl Literal {
    /// # Safety
    /// `bytes` must stay valid for as long as the owning IR is alive.
    pub(crate) unsafe fn new(id: LiteralId, ty: TypeId, bytes: NonNull<[u8]>) -> Self {
        Self { id, ty, bytes }
    }

    pub fn id(&self) -> LiteralId {
        self.id
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub(crate) fn set_ty(&mut self, ty: TypeId) {
        self.ty = ty;
    }

    /// The literal's bytes
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the bytes were copied into the owning IR's region, which is
        // only released when the IR (and with it this literal) is dropped.
        unsafe { self.bytes.as_ref() }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[literal l{} t{} 0x", self.id, self.ty)?;
        for byte in self.bytes() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn remap_touches_every_reference() {
        let shift = |t: TypeId| TypeId::new(t.get() + 100);
        let field = TypeDef::Field {
            owner: TypeId::new(4),
            name: "next".into(),
            ty: TypeId::new(5),
            offset_bits: 64,
        };
        let moved = field.remap(shift);
        assert_eq!(moved.references(), vec![TypeId::new(104), TypeId::new(105)]);

        let st = TypeDef::Struct {
            name: "Node".into(),
            size_bits: 128,
            fields: vec![TypeId::new(6), TypeId::new(7)],
        };
        assert_eq!(st.remap(shift).references(), vec![TypeId::new(106), TypeId::new(107)]);
        assert!(TypeDef::NoType.remap(shift).references().is_empty());
    }

    #[test]
    fn display_forms() {
        let t = Type::new(TypeId::new(9), TypeDef::Pointer { base: TypeId::new(3) });
        assert_eq!(t.to_string(), "[type t9 pointer t3 64]");
        assert_eq!(t.name(), "PointerTo(t3)");

        let s = Symbol::new(SymbolId::new(0), "x".into(), TypeId::new(3));
        assert_eq!(s.to_string(), "[symbol s0 \"x\" t3]");
    }
}
