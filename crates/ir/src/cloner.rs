//! Deep cloning of an IR with its addons
//!
//! [`Ir::clone_with`](crate::Ir::clone_with) builds the new IR in two
//! phases: first a placeholder for every type, symbol and literal (filling
//! the original-to-clone maps), then a pass that rewrites every reference
//! through those maps. Cycles such as a struct and its fields therefore need
//! no special ordering. Entry points and addons are cloned last, with an
//! [`IrCloner`] that can answer "what became of X" for any entity.

use std::collections::HashMap;

use crate::extensible::{Addon, Extensible};
use crate::ids::{EntryPointId, LiteralId, SymbolId, TypeId};
use crate::ir::Ir;

/// Addon that can follow its host into a cloned IR
///
/// Every IR addon must say how to clone itself; the cloner it receives maps
/// any entity the addon refers to onto the clone.
pub trait AddonIr: Addon {
    fn clone_addon(&self, cloner: &IrCloner<'_>) -> Box<dyn AddonIr>;
}

/// Original-to-clone id maps filled while cloning
#[derive(Debug, Default)]
pub(crate) struct CloneMaps {
    pub(crate) types: HashMap<TypeId, TypeId>,
    pub(crate) symbols: HashMap<SymbolId, SymbolId>,
    pub(crate) literals: HashMap<LiteralId, LiteralId>,
    pub(crate) entry_points: HashMap<EntryPointId, EntryPointId>,
}

/// Context handed to entry points and addons while an IR is cloned
pub struct IrCloner<'a> {
    source: &'a Ir,
    target: &'a Ir,
    maps: &'a CloneMaps,
}

impl<'a> IrCloner<'a> {
    pub(crate) fn new(source: &'a Ir, target: &'a Ir, maps: &'a CloneMaps) -> Self {
        Self {
            source,
            target,
            maps,
        }
    }

    /// The IR being cloned
    pub fn source(&self) -> &'a Ir {
        self.source
    }

    /// The IR being built; its types, symbols and literals are complete
    pub fn cloned_ir(&self) -> &'a Ir {
        self.target
    }

    /// Clone of type `original`
    ///
    /// # Panics
    /// If `original` does not belong to the source IR.
    pub fn cloned_type(&self, original: TypeId) -> TypeId {
        match self.maps.types.get(&original) {
            Some(&id) => id,
            None => panic!("type t{original} is not part of the IR being cloned"),
        }
    }

    /// Clones of several types, in order
    pub fn cloned_type_array(&self, originals: &[TypeId]) -> Vec<TypeId> {
        originals.iter().map(|&t| self.cloned_type(t)).collect()
    }

    /// Clone of symbol `original`
    ///
    /// # Panics
    /// If `original` does not belong to the source IR.
    pub fn cloned_symbol(&self, original: SymbolId) -> SymbolId {
        match self.maps.symbols.get(&original) {
            Some(&id) => id,
            None => panic!("symbol s{original} is not part of the IR being cloned"),
        }
    }

    /// Clone of literal `original`
    ///
    /// # Panics
    /// If `original` does not belong to the source IR.
    pub fn cloned_literal(&self, original: LiteralId) -> LiteralId {
        match self.maps.literals.get(&original) {
            Some(&id) => id,
            None => panic!("literal l{original} is not part of the IR being cloned"),
        }
    }

    /// Clone of entry point `original`, if it has been cloned
    ///
    /// `None` for entry points that declined to clone, and for ones not yet
    /// reached while entry points themselves are being cloned.
    pub fn cloned_entry_point(&self, original: EntryPointId) -> Option<EntryPointId> {
        self.maps.entry_points.get(&original).copied()
    }

    /// Same kind, with every addon cloned in order
    pub fn clone_extensible(&self, original: &Extensible<dyn AddonIr>) -> Extensible<dyn AddonIr> {
        let mut clone = Extensible::new(original.kind());
        for addon in original.addons() {
            clone.attach(addon.clone_addon(self));
        }
        clone
    }
}
