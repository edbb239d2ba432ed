//! The IR container
//!
//! An [`Ir`] owns every type, symbol, literal and entry point created for
//! it, a region holding symbols and literal bytes, and its own addons. Ids are issued per
//! category from counters inside the IR.

use core::fmt;
use core::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;
use jitkit_memory::{HeapRegion, RegionConfig, heap_region};

use crate::cloner::{AddonIr, CloneMaps, IrCloner};
use crate::entry::EntryPoint;
use crate::error::{IrError, IrResult};
use crate::extensible::{Addon, Extensible, HasAddons};
use crate::ids::{EntryPointId, IdCounter, IrId, LiteralId, SymbolId, TypeId};
use crate::kind::{HasKind, Kind, ir_kind};
use crate::types::{Literal, POINTER_SIZE_BITS, Symbol, Type, TypeDef};

static NEXT_IR_ID: AtomicU32 = AtomicU32::new(0);

/// A compiler IR: entity tables, literal storage and addons
pub struct Ir {
    id: IrId,
    config: RegionConfig,
    types: Vec<Type>,
    /// Each symbol lives in `region`, which drops it on release
    symbols: Vec<NonNull<Symbol>>,
    literals: Vec<Literal>,
    entry_points: IndexMap<EntryPointId, Box<dyn EntryPoint>>,
    type_ids: IdCounter,
    symbol_ids: IdCounter,
    literal_ids: IdCounter,
    entry_point_ids: IdCounter,
    ext: Extensible<dyn AddonIr>,
    /// Declared last so symbol and literal views are dropped before their
    /// storage
    region: HeapRegion,
}

impl Ir {
    /// An IR holding only `NoType`
    ///
    /// # Errors
    /// [`IrError::Memory`] if `config` is invalid.
    pub fn new(config: RegionConfig) -> IrResult<Self> {
        let region = heap_region(&config)?;
        let mut ir = Self {
            id: IrId::new(NEXT_IR_ID.fetch_add(1, Ordering::Relaxed)),
            config,
            types: Vec::new(),
            symbols: Vec::new(),
            literals: Vec::new(),
            entry_points: IndexMap::new(),
            type_ids: IdCounter::default(),
            symbol_ids: IdCounter::default(),
            literal_ids: IdCounter::default(),
            entry_point_ids: IdCounter::default(),
            ext: Extensible::new(ir_kind()),
            region,
        };
        let no_type = ir.push_type(TypeDef::NoType);
        debug_assert_eq!(no_type, TypeId::NO_TYPE);
        tracing::debug!(ir = %ir.id, "ir created");
        Ok(ir)
    }

    /// An IR with the base type system installed
    pub fn with_base_types(config: RegionConfig) -> IrResult<Self> {
        let mut ir = Self::new(config)?;
        crate::BaseIrAddon::install(&mut ir);
        Ok(ir)
    }

    pub fn id(&self) -> IrId {
        self.id
    }

    pub fn kind(&self) -> Kind {
        self.ext.kind()
    }

    /// Region configuration, reused by [`try_clone`](Self::try_clone)
    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// Storage for literal bytes
    pub fn region(&self) -> &HeapRegion {
        &self.region
    }

    // ---- types -------------------------------------------------------------

    fn push_type(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId::new(self.type_ids.next());
        self.types.push(Type::new(id, def));
        id
    }

    fn require_type(&self, id: TypeId) -> IrResult<&Type> {
        self.types.get(id.index()).ok_or(IrError::UnknownType(id))
    }

    pub fn define_primitive(&mut self, name: &str, size_bits: u64) -> TypeId {
        self.push_type(TypeDef::Primitive {
            name: name.to_owned(),
            size_bits,
        })
    }

    /// A new pointer type; see [`BaseIrAddon::pointer_to`](crate::BaseIrAddon::pointer_to)
    /// for the memoised form
    pub fn define_pointer(&mut self, base: TypeId) -> IrResult<TypeId> {
        self.require_type(base)?;
        Ok(self.push_type(TypeDef::Pointer { base }))
    }

    /// A struct with no fields yet
    pub fn define_struct(&mut self, name: &str, size_bits: u64) -> TypeId {
        self.push_type(TypeDef::Struct {
            name: name.to_owned(),
            size_bits,
            fields: Vec::new(),
        })
    }

    /// Add a field of type `ty` to struct `owner`
    ///
    /// # Errors
    /// Unknown ids, a non-struct owner, a name already used in the struct,
    /// or a field that extends past the end of the struct.
    pub fn define_field(
        &mut self,
        owner: TypeId,
        name: &str,
        ty: TypeId,
        offset_bits: u64,
    ) -> IrResult<TypeId> {
        let (struct_size, existing) = match self.require_type(owner)?.def() {
            TypeDef::Struct {
                size_bits, fields, ..
            } => (*size_bits, fields),
            _ => return Err(IrError::NotAStruct { ty: owner }),
        };
        let taken = existing.iter().any(|&f| {
            matches!(self.types[f.index()].def(), TypeDef::Field { name: n, .. } if n == name)
        });
        if taken {
            return Err(IrError::DuplicateField {
                owner,
                name: name.to_owned(),
            });
        }
        self.require_type(ty)?;
        if let Some(field_size) = self.size_bits(ty)
            && offset_bits.saturating_add(field_size) > struct_size
        {
            return Err(IrError::FieldOutOfBounds {
                owner,
                name: name.to_owned(),
                offset_bits,
                size_bits: struct_size,
            });
        }

        let field = self.push_type(TypeDef::Field {
            owner,
            name: name.to_owned(),
            ty,
            offset_bits,
        });
        if let TypeDef::Struct { fields, .. } = self.types[owner.index()].def_mut() {
            fields.push(field);
        }
        Ok(field)
    }

    /// Width of values of type `id`, if it has a fixed one
    pub fn size_bits(&self, id: TypeId) -> Option<u64> {
        match self.types.get(id.index())?.def() {
            TypeDef::NoType => None,
            TypeDef::Primitive { size_bits, .. } | TypeDef::Struct { size_bits, .. } => {
                Some(*size_bits)
            }
            TypeDef::Pointer { .. } => Some(POINTER_SIZE_BITS),
            TypeDef::Field { ty, .. } => self.size_bits(*ty),
        }
    }

    pub fn get_type(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.index())
    }

    pub fn types(&self) -> impl ExactSizeIterator<Item = &Type> + '_ {
        self.types.iter()
    }

    /// Highest type id issued; never `None` because of `NoType`
    pub fn max_type_id(&self) -> Option<TypeId> {
        self.type_ids.max_issued().map(TypeId::new)
    }

    // ---- symbols and literals ---------------------------------------------

    fn push_symbol(&mut self, name: String, ty: TypeId) -> IrResult<SymbolId> {
        let mut ids = self.symbol_ids;
        let id = SymbolId::new(ids.next());
        let stored = NonNull::from(self.region.alloc(Symbol::new(id, name, ty))?);
        self.symbol_ids = ids;
        self.symbols.push(stored);
        Ok(id)
    }

    fn symbol_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        // SAFETY: the symbol lives in `self.region` until this IR is dropped,
        // and `&mut self` rules out any other view of it.
        self.symbols.get_mut(id.index()).map(|sym| unsafe { sym.as_mut() })
    }

    /// Create a symbol whose storage belongs to this IR's region
    pub fn create_symbol(&mut self, name: &str, ty: TypeId) -> IrResult<SymbolId> {
        self.require_type(ty)?;
        self.push_symbol(name.to_owned(), ty)
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        // SAFETY: the symbol lives in `self.region` until this IR is dropped,
        // and it is only mutated through `&mut self`.
        self.symbols.get(id.index()).map(|sym| unsafe { sym.as_ref() })
    }

    pub fn symbols(&self) -> impl ExactSizeIterator<Item = &Symbol> + '_ {
        // SAFETY: as in `symbol`.
        self.symbols.iter().map(|sym| unsafe { sym.as_ref() })
    }

    pub fn max_symbol_id(&self) -> Option<SymbolId> {
        self.symbol_ids.max_issued().map(SymbolId::new)
    }

    fn push_literal(&mut self, ty: TypeId, bytes: &[u8]) -> IrResult<LiteralId> {
        let stored = NonNull::from(self.region.alloc_slice_copy(bytes)?);
        let id = LiteralId::new(self.literal_ids.next());
        // SAFETY: `stored` lives in `self.region`, which is only released
        // when this IR is dropped.
        self.literals.push(unsafe { Literal::new(id, ty, stored) });
        Ok(id)
    }

    /// Copy `bytes` into the IR as a literal of type `ty`
    ///
    /// # Errors
    /// An unknown type, a byte length that disagrees with a fixed-size type,
    /// or running out of literal storage.
    pub fn create_literal(&mut self, ty: TypeId, bytes: &[u8]) -> IrResult<LiteralId> {
        self.require_type(ty)?;
        if let Some(bits) = self.size_bits(ty)
            && bits % 8 == 0
            && bytes.len() as u64 != bits / 8
        {
            return Err(IrError::LiteralSize {
                ty,
                expected: (bits / 8) as usize,
                actual: bytes.len(),
            });
        }
        self.push_literal(ty, bytes)
    }

    pub fn literal(&self, id: LiteralId) -> Option<&Literal> {
        self.literals.get(id.index())
    }

    pub fn literals(&self) -> impl ExactSizeIterator<Item = &Literal> + '_ {
        self.literals.iter()
    }

    pub fn max_literal_id(&self) -> Option<LiteralId> {
        self.literal_ids.max_issued().map(LiteralId::new)
    }

    // ---- entry points -------------------------------------------------------

    /// Issue an entry point id and store what `build` makes with it
    pub fn add_entry_point<E, F>(&mut self, build: F) -> EntryPointId
    where
        E: EntryPoint,
        F: FnOnce(EntryPointId) -> E,
    {
        let id = EntryPointId::new(self.entry_point_ids.next());
        let entry = build(id);
        debug_assert_eq!(entry.info().id(), id, "entry point must keep its issued id");
        self.entry_points.insert(id, Box::new(entry));
        id
    }

    pub fn entry_point(&self, id: EntryPointId) -> Option<&dyn EntryPoint> {
        self.entry_points.get(&id).map(|e| &**e)
    }

    pub fn entry_point_mut(&mut self, id: EntryPointId) -> Option<&mut (dyn EntryPoint + 'static)> {
        self.entry_points.get_mut(&id).map(|e| &mut **e)
    }

    /// Entry points in creation order
    pub fn entry_points(&self) -> impl ExactSizeIterator<Item = &dyn EntryPoint> + '_ {
        self.entry_points.values().map(|e| &**e)
    }

    pub fn max_entry_point_id(&self) -> Option<EntryPointId> {
        self.entry_point_ids.max_issued().map(EntryPointId::new)
    }

    // ---- addons ---------------------------------------------------------------

    pub fn attach(&mut self, addon: Box<dyn AddonIr>) {
        self.ext.attach(addon);
    }

    pub fn addon<T: Addon + HasKind>(&self) -> Option<&T> {
        self.ext.addon::<T>()
    }

    pub fn addon_mut<T: Addon + HasKind>(&mut self) -> Option<&mut T> {
        self.ext.addon_mut::<T>()
    }

    pub fn addons(&self) -> &Extensible<dyn AddonIr> {
        &self.ext
    }

    // ---- cloning ----------------------------------------------------------------

    /// Deep copy with the same region configuration
    pub fn try_clone(&self) -> IrResult<Self> {
        self.clone_with(self.config)
    }

    /// Deep copy into a fresh IR whose region uses `config`
    ///
    /// Every type, symbol and literal is copied and every reference between
    /// them re-pointed at the copies. Entry points come along only if they
    /// opt in. Addons of the IR and of cloned entry points are cloned
    /// through an [`IrCloner`].
    pub fn clone_with(&self, config: RegionConfig) -> IrResult<Self> {
        let mut clone = Self::new(config)?;
        let mut maps = CloneMaps::default();

        // placeholders
        maps.types.insert(TypeId::NO_TYPE, TypeId::NO_TYPE);
        for ty in self.types.iter().skip(1) {
            let id = clone.push_type(TypeDef::NoType);
            maps.types.insert(ty.id(), id);
        }
        for sym in self.symbols() {
            let id = clone.push_symbol(sym.name().to_owned(), TypeId::NO_TYPE)?;
            maps.symbols.insert(sym.id(), id);
        }
        for lit in &self.literals {
            let id = clone.push_literal(TypeId::NO_TYPE, lit.bytes())?;
            maps.literals.insert(lit.id(), id);
        }

        // references
        let map_type = |t: TypeId| match maps.types.get(&t) {
            Some(&id) => id,
            None => panic!("t{t} referenced but not defined"),
        };
        for ty in &self.types {
            *clone.types[map_type(ty.id()).index()].def_mut() = ty.def().remap(map_type);
        }
        for sym in self.symbols() {
            if let Some(copy) = clone.symbol_mut(maps.symbols[&sym.id()]) {
                copy.set_ty(map_type(sym.ty()));
            }
        }
        for lit in &self.literals {
            clone.literals[maps.literals[&lit.id()].index()].set_ty(map_type(lit.ty()));
        }

        // entry points
        clone.entry_point_ids = self.entry_point_ids;
        let mut entries = Vec::with_capacity(self.entry_points.len());
        for (&id, entry) in &self.entry_points {
            let cloned = entry.clone_entry_point(&IrCloner::new(self, &clone, &maps));
            if let Some(cloned) = cloned {
                maps.entry_points.insert(id, cloned.info().id());
                entries.push(cloned);
            }
        }

        // addons
        let addons: Vec<Box<dyn AddonIr>> = {
            let cloner = IrCloner::new(self, &clone, &maps);
            self.ext.addons().map(|addon| addon.clone_addon(&cloner)).collect()
        };

        for entry in entries {
            clone.entry_points.insert(entry.info().id(), entry);
        }
        for addon in addons {
            clone.ext.attach(addon);
        }

        tracing::debug!(
            source = %self.id,
            clone = %clone.id,
            types = clone.types.len(),
            entry_points = clone.entry_points.len(),
            addons = clone.ext.addon_count(),
            "ir cloned"
        );
        Ok(clone)
    }

    // ---- logging ------------------------------------------------------------------

    /// Textual dump of the whole IR
    pub fn log(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "[ir i{}", self.id)?;
        for ty in &self.types {
            writeln!(out, "  {ty}")?;
        }
        for lit in &self.literals {
            writeln!(out, "  {lit}")?;
        }
        for sym in self.symbols() {
            writeln!(out, "  {sym}")?;
        }
        for entry in self.entry_points() {
            write!(out, "  ")?;
            entry.log(out)?;
            writeln!(out)?;
        }
        writeln!(out, "]")
    }
}

impl HasAddons<dyn AddonIr> for Ir {
    fn extensible(&self) -> &Extensible<dyn AddonIr> {
        &self.ext
    }

    fn extensible_mut(&mut self) -> &mut Extensible<dyn AddonIr> {
        &mut self.ext
    }
}

impl fmt::Debug for Ir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ir")
            .field("id", &self.id)
            .field("types", &self.types.len())
            .field("symbols", &self.symbols.len())
            .field("literals", &self.literals.len())
            .field("entry_points", &self.entry_points.len())
            .field("addons", &self.ext)
            .finish_non_exhaustive()
    }
}
