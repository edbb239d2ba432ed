//! The base type system addon
//!
//! Installs the primitive types every IR needs and memoises derived types,
//! so asking twice for "pointer to Int32" yields the same id.

use core::any::Any;
use std::collections::HashMap;

use indexmap::IndexMap;

use crate::cloner::{AddonIr, IrCloner};
use crate::error::IrResult;
use crate::extensible::Addon;
use crate::ids::TypeId;
use crate::ir::Ir;
use crate::kind::{HasKind, Kind, base_ir_addon_kind};

/// Primitive types and memo tables for derived types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseIrAddon {
    pub int8: TypeId,
    pub int16: TypeId,
    pub int32: TypeId,
    pub int64: TypeId,
    pub float32: TypeId,
    pub float64: TypeId,
    pub address: TypeId,
    pub word: TypeId,
    pointer_type_from_base_type: HashMap<TypeId, TypeId>,
    struct_type_from_name: IndexMap<String, TypeId>,
}

impl HasKind for BaseIrAddon {
    fn static_kind() -> Kind {
        base_ir_addon_kind()
    }
}

impl BaseIrAddon {
    /// Define the primitive types in `ir` and attach the addon to it
    pub fn install(ir: &mut Ir) {
        let addon = Self {
            int8: ir.define_primitive("Int8", 8),
            int16: ir.define_primitive("Int16", 16),
            int32: ir.define_primitive("Int32", 32),
            int64: ir.define_primitive("Int64", 64),
            float32: ir.define_primitive("Float32", 32),
            float64: ir.define_primitive("Float64", 64),
            address: ir.define_primitive("Address", 64),
            word: ir.define_primitive("Word", 64),
            pointer_type_from_base_type: HashMap::new(),
            struct_type_from_name: IndexMap::new(),
        };
        ir.attach(Box::new(addon));
    }

    /// Pointer to `base`, defined on first request
    ///
    /// Without a base addon on `ir` nothing is memoised and every call
    /// defines a new pointer type.
    pub fn pointer_to(ir: &mut Ir, base: TypeId) -> IrResult<TypeId> {
        if let Some(found) = ir
            .addon::<Self>()
            .and_then(|addon| addon.pointer_type_from_base_type(base))
        {
            return Ok(found);
        }
        let ptr = ir.define_pointer(base)?;
        if let Some(addon) = ir.addon_mut::<Self>() {
            addon.pointer_type_from_base_type.insert(base, ptr);
        }
        Ok(ptr)
    }

    /// Struct named `name`, defined on first request
    ///
    /// A later request with the same name returns the first definition
    /// regardless of `size_bits`.
    pub fn define_struct(ir: &mut Ir, name: &str, size_bits: u64) -> TypeId {
        if let Some(found) = ir
            .addon::<Self>()
            .and_then(|addon| addon.struct_type_from_name(name))
        {
            return found;
        }
        let st = ir.define_struct(name, size_bits);
        if let Some(addon) = ir.addon_mut::<Self>() {
            addon.struct_type_from_name.insert(name.to_owned(), st);
        }
        st
    }

    pub fn pointer_type_from_base_type(&self, base: TypeId) -> Option<TypeId> {
        self.pointer_type_from_base_type.get(&base).copied()
    }

    pub fn struct_type_from_name(&self, name: &str) -> Option<TypeId> {
        self.struct_type_from_name.get(name).copied()
    }

    /// All primitive ids, narrowest integer first
    pub fn primitives(&self) -> [TypeId; 8] {
        [
            self.int8,
            self.int16,
            self.int32,
            self.int64,
            self.float32,
            self.float64,
            self.address,
            self.word,
        ]
    }
}

impl Addon for BaseIrAddon {
    fn kind(&self) -> Kind {
        Self::static_kind()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl AddonIr for BaseIrAddon {
    fn clone_addon(&self, cloner: &IrCloner<'_>) -> Box<dyn AddonIr> {
        let t = |id| cloner.cloned_type(id);
        Box::new(Self {
            int8: t(self.int8),
            int16: t(self.int16),
            int32: t(self.int32),
            int64: t(self.int64),
            float32: t(self.float32),
            float64: t(self.float64),
            address: t(self.address),
            word: t(self.word),
            pointer_type_from_base_type: self
                .pointer_type_from_base_type
                .iter()
                .map(|(&base, &ptr)| (t(base), t(ptr)))
                .collect(),
            struct_type_from_name: self
                .struct_type_from_name
                .iter()
                .map(|(name, &st)| (name.clone(), t(st)))
                .collect(),
        })
    }
}
