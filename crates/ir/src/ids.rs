//! Typed identifiers for IR entities
//!
//! Each category draws from its own counter inside an [`Ir`](crate::Ir), so
//! ids are dense and only meaningful within the IR that issued them. A
//! clone keeps the numbering of the original.

use core::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw index
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// The raw index
            #[inline]
            pub const fn get(self) -> u32 {
                self.0
            }

            #[inline]
            pub(crate) const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identity of an [`Ir`](crate::Ir) itself
    IrId
);
define_id!(
    /// Index into an IR's type table; 0 is always `NoType`
    TypeId
);
define_id!(
    /// Index into an IR's symbol table
    SymbolId
);
define_id!(
    /// Index into an IR's literal table
    LiteralId
);
define_id!(
    /// Entry point id, unique within one IR
    EntryPointId
);

impl TypeId {
    /// The `NoType` sentinel present in every IR
    pub const NO_TYPE: Self = Self(0);
}

/// Hands out consecutive ids for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct IdCounter(u32);

impl IdCounter {
    pub(crate) fn next(&mut self) -> u32 {
        let id = self.0;
        assert!(id < u32::MAX, "id space exhausted");
        self.0 += 1;
        id
    }

    /// Highest id handed out so far, or `None` if nothing was
    pub(crate) fn max_issued(self) -> Option<u32> {
        self.0.checked_sub(1)
    }
}
