//! # jitkit-ir
//!
//! A compiler IR whose objects can carry addons contributed by extensions.
//!
//! - [`kind`]: a process-wide kind hierarchy; every extensible object and
//!   every addon has a [`Kind`]
//! - [`Extensible`]: an ordered list of addons with typed lookup
//! - [`Ir`]: types, symbols, literals and entry points, with symbols and
//!   literal bytes stored in a [`HeapRegion`](jitkit_memory::HeapRegion)
//! - [`IrCloner`]: the context passed to addons and entry points during
//!   [`Ir::clone_with`]
//!
//! ## Quick Start
//!
//! ```rust
//! use jitkit_ir::prelude::*;
//!
//! let mut ir = Ir::with_base_types(RegionConfig::default())?;
//! let int32 = ir.addon::<BaseIrAddon>().map(|base| base.int32).unwrap();
//! let ptr = BaseIrAddon::pointer_to(&mut ir, int32)?;
//! assert_eq!(BaseIrAddon::pointer_to(&mut ir, int32)?, ptr);
//!
//! let copy = ir.try_clone()?;
//! assert_eq!(copy.addon::<BaseIrAddon>().unwrap().pointer_type_from_base_type(int32), Some(ptr));
//! # Ok::<(), IrError>(())
//! ```

#![allow(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::return_self_not_must_use)]

pub mod base_addon;
pub mod cloner;
pub mod entry;
pub mod error;
pub mod extensible;
pub mod ids;
pub mod ir;
pub mod kind;
pub mod types;

pub use base_addon::BaseIrAddon;
pub use cloner::{AddonIr, IrCloner};
pub use entry::{EntryPoint, EntryPointInfo, NativeEntry};
pub use error::{IrError, IrResult};
pub use extensible::{Addon, AddonRegistry, Extensible, HasAddons};
pub use ids::{EntryPointId, IrId, LiteralId, SymbolId, TypeId};
pub use ir::Ir;
pub use kind::{HasKind, Kind};
pub use types::{Literal, POINTER_SIZE_BITS, Symbol, Type, TypeDef};

pub use jitkit_memory::RegionConfig;

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Addon, AddonIr, BaseIrAddon, EntryPoint, Extensible, HasAddons, HasKind, Ir, IrCloner,
        IrError, IrResult, Kind, NativeEntry, RegionConfig, TypeDef, TypeId,
    };
}
