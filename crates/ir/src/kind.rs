//! Hierarchical run-time kinds
//!
//! A [`Kind`] is a small integer handed out by a [`KindService`]. Each kind
//! carries a bit vector holding its own bit plus every bit of its base, so
//! "is this a K or something derived from K" is a subset test. The
//! extensible-object hierarchy lives in one process-wide service reached
//! through [`extensible_kinds`]; new kinds are declared with
//! [`declare_kind!`](crate::declare_kind).

use std::sync::LazyLock;

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

/// Run-time type tag issued by a [`KindService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kind(u64);

impl Kind {
    /// The root every service starts with
    pub const NO_KIND: Self = Self(0);
    /// Base of every user-assigned kind
    pub const ANY_KIND: Self = Self(1);

    /// The raw kind number
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

type KindBits = SmallVec<[u64; 2]>;

fn single_bit(index: usize) -> KindBits {
    let mut bits = KindBits::from_elem(0, index / 64 + 1);
    bits[index / 64] |= 1 << (index % 64);
    bits
}

fn union(a: &KindBits, b: &KindBits) -> KindBits {
    let len = a.len().max(b.len());
    (0..len)
        .map(|w| a.get(w).copied().unwrap_or(0) | b.get(w).copied().unwrap_or(0))
        .collect()
}

/// Registry of kinds for one category of objects
#[derive(Debug)]
pub struct KindService {
    category: &'static str,
    /// Insertion index is the kind number
    kinds: IndexMap<String, KindBits>,
}

impl KindService {
    /// A service holding only `NoKind` and `AnyKind`
    pub fn new(category: &'static str) -> Self {
        let mut kinds = IndexMap::new();
        kinds.insert("NoKind".to_owned(), single_bit(0));
        let mut service = Self { category, kinds };
        let any = service.assign_kind(Kind::NO_KIND, "AnyKind");
        debug_assert_eq!(any, Kind::ANY_KIND);
        service
    }

    /// Category name, for diagnostics
    pub fn category(&self) -> &'static str {
        self.category
    }

    /// Register `name` as a kind derived from `base`
    ///
    /// Assigning a name that already exists returns the existing kind, even
    /// if `base` differs.
    ///
    /// # Panics
    /// If `base` was not issued by this service.
    pub fn assign_kind(&mut self, base: Kind, name: &str) -> Kind {
        if let Some(existing) = self.kinds.get_index_of(name) {
            return Kind(existing as u64);
        }

        let base_bits = self.bits(base).clone();
        let kind = Kind(self.kinds.len() as u64);
        let bits = union(&single_bit(kind.slot()), &base_bits);
        self.kinds.insert(name.to_owned(), bits);

        tracing::trace!(
            category = self.category,
            kind = kind.raw(),
            base = base.raw(),
            name,
            "kind assigned"
        );
        kind
    }

    /// Name of `kind`, or `""` if it is unknown
    pub fn get_name(&self, kind: Kind) -> &str {
        self.kinds
            .get_index(kind.slot())
            .map_or("", |(name, _)| name.as_str())
    }

    /// Look a kind up by name
    pub fn kind_named(&self, name: &str) -> Option<Kind> {
        self.kinds.get_index_of(name).map(|i| Kind(i as u64))
    }

    /// True if `matchee` is `matcher` or derives from it
    ///
    /// # Panics
    /// If either kind is unknown.
    pub fn is_match(&self, matchee: Kind, matcher: Kind) -> bool {
        let have = self.bits(matchee);
        let want = self.bits(matcher);
        want.iter().enumerate().all(|(w, &mask)| {
            let word = have.get(w).copied().unwrap_or(0);
            word & mask == mask
        })
    }

    /// True if both kinds have identical bit vectors
    ///
    /// # Panics
    /// If either kind is unknown.
    pub fn is_exact_match(&self, matchee: Kind, matcher: Kind) -> bool {
        let a = self.bits(matchee);
        let b = self.bits(matcher);
        let len = a.len().max(b.len());
        (0..len).all(|w| a.get(w).copied().unwrap_or(0) == b.get(w).copied().unwrap_or(0))
    }

    /// Number of kinds, including `NoKind` and `AnyKind`
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Never true; every service holds the two root kinds
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    fn bits(&self, kind: Kind) -> &KindBits {
        match self.kinds.get_index(kind.slot()) {
            Some((_, bits)) => bits,
            None => panic!("kind {} is not known to the {} kind service", kind.raw(), self.category),
        }
    }
}

static EXTENSIBLE_KINDS: LazyLock<RwLock<KindService>> =
    LazyLock::new(|| RwLock::new(KindService::new("Extensible")));

/// The process-wide kind service for extensible objects and addons
pub fn extensible_kinds() -> &'static RwLock<KindService> {
    &EXTENSIBLE_KINDS
}

/// Name of a kind in the extensible service
pub fn kind_name(kind: Kind) -> String {
    extensible_kinds().read().get_name(kind).to_owned()
}

/// Subtype-aware match in the extensible service
pub fn is_kind(matchee: Kind, matcher: Kind) -> bool {
    extensible_kinds().read().is_match(matchee, matcher)
}

/// Types with a kind fixed at compile time
pub trait HasKind {
    /// The kind every instance of this type reports
    fn static_kind() -> Kind;
}

/// Declare a lazily registered kind in the extensible service
///
/// Two forms: a free accessor function, or a [`HasKind`] impl for a type.
///
/// ```
/// use jitkit_ir::{Kind, HasKind, declare_kind, kind::{is_kind, addon_kind}};
///
/// declare_kind!(pub fn optimizer_kind = "Optimizer" : addon_kind());
///
/// struct Inliner;
/// declare_kind!(impl HasKind for Inliner = "Inliner" : optimizer_kind());
///
/// assert!(is_kind(Inliner::static_kind(), optimizer_kind()));
/// assert!(is_kind(Inliner::static_kind(), Kind::ANY_KIND));
/// ```
#[macro_export]
macro_rules! declare_kind {
    ($vis:vis fn $fn_name:ident = $name:literal : $base:expr) => {
        $vis fn $fn_name() -> $crate::Kind {
            static KIND: ::std::sync::OnceLock<$crate::Kind> = ::std::sync::OnceLock::new();
            *KIND.get_or_init(|| {
                let base: $crate::Kind = $base;
                $crate::kind::extensible_kinds().write().assign_kind(base, $name)
            })
        }
    };
    (impl HasKind for $ty:ty = $name:literal : $base:expr) => {
        impl $crate::HasKind for $ty {
            fn static_kind() -> $crate::Kind {
                static KIND: ::std::sync::OnceLock<$crate::Kind> = ::std::sync::OnceLock::new();
                *KIND.get_or_init(|| {
                    let base: $crate::Kind = $base;
                    $crate::kind::extensible_kinds().write().assign_kind(base, $name)
                })
            }
        }
    };
}

declare_kind!(pub fn extensible_kind = "Extensible" : Kind::ANY_KIND);
declare_kind!(pub fn extensible_ir_kind = "ExtensibleIR" : extensible_kind());
declare_kind!(pub fn ir_kind = "IR" : extensible_ir_kind());
declare_kind!(pub fn entry_point_kind = "EntryPoint" : extensible_ir_kind());
declare_kind!(pub fn native_entry_kind = "NativeEntry" : entry_point_kind());
declare_kind!(pub fn addon_kind = "Addon" : extensible_kind());
declare_kind!(pub fn addon_ir_kind = "AddonIR" : addon_kind());
declare_kind!(pub fn base_ir_addon_kind = "BaseIRAddon" : addon_ir_kind());
declare_kind!(pub fn ir_cloner_kind = "IRCloner" : extensible_kind());
