//! Run-time capability attachment
//!
//! An [`Extensible`] holds a kind and an ordered list of owned addons.
//! Extensions attach addons to core objects (an IR, an entry point) without
//! the core knowing their types; lookups go through the kind service, so a
//! query for kind K also finds addons whose kind derives from K.

use core::any::Any;
use core::fmt;

use crate::kind::{HasKind, Kind, extensible_kinds};

/// Something that can be attached to an [`Extensible`]
pub trait Addon: Any {
    /// Kind of this addon instance
    fn kind(&self) -> Kind;

    /// Upcast for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Owner of a kind and a lazily created list of addons
pub struct Extensible<A: ?Sized + Addon> {
    kind: Kind,
    addons: Option<Vec<Box<A>>>,
}

impl<A: ?Sized + Addon> Extensible<A> {
    /// An object of `kind` with no addons
    pub const fn new(kind: Kind) -> Self {
        Self { kind, addons: None }
    }

    /// Kind of the owning object
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Take ownership of `addon`, appending it after existing ones
    pub fn attach(&mut self, addon: Box<A>) {
        tracing::trace!(
            host = self.kind.raw(),
            addon = addon.kind().raw(),
            "addon attached"
        );
        self.addons.get_or_insert_with(Vec::new).push(addon);
    }

    /// Positions of addons whose kind is `kind` or derives from it
    ///
    /// Addon kinds are resolved before the kind service is locked: resolving
    /// a kind for the first time registers it, which needs the write lock.
    fn positions_of(&self, kind: Kind) -> Vec<usize> {
        let addon_kinds: Vec<Kind> = self.addons().map(Addon::kind).collect();
        let kinds = extensible_kinds().read();
        addon_kinds
            .iter()
            .enumerate()
            .filter(|(_, addon_kind)| kinds.is_match(**addon_kind, kind))
            .map(|(index, _)| index)
            .collect()
    }

    fn addon_at(&self, index: usize) -> Option<&A> {
        self.addons.as_ref()?.get(index).map(|addon| &**addon)
    }

    /// First addon whose kind is `kind` or derives from it
    pub fn addon_of_kind(&self, kind: Kind) -> Option<&A> {
        let index = *self.positions_of(kind).first()?;
        self.addon_at(index)
    }

    /// First addon of type `T`
    pub fn addon<T: Addon + HasKind>(&self) -> Option<&T> {
        self.positions_of(T::static_kind())
            .into_iter()
            .filter_map(|index| self.addon_at(index))
            .find_map(|addon| addon.as_any().downcast_ref::<T>())
    }

    /// First addon of type `T`, mutably
    pub fn addon_mut<T: Addon + HasKind>(&mut self) -> Option<&mut T> {
        let index = self
            .positions_of(T::static_kind())
            .into_iter()
            .find(|index| {
                self.addon_at(*index)
                    .is_some_and(|addon| addon.as_any().is::<T>())
            })?;
        self.addons
            .as_mut()?
            .get_mut(index)?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// True if an addon of type `T` is attached
    pub fn has_addon<T: Addon + HasKind>(&self) -> bool {
        self.addon::<T>().is_some()
    }

    /// Remove and return the first addon matching `kind`
    pub fn detach_kind(&mut self, kind: Kind) -> Option<Box<A>> {
        let index = *self.positions_of(kind).first()?;
        Some(self.addons.as_mut()?.remove(index))
    }

    /// Number of attached addons
    pub fn addon_count(&self) -> usize {
        self.addons.as_ref().map_or(0, Vec::len)
    }

    /// Attached addons in attachment order
    pub fn addons(&self) -> impl Iterator<Item = &A> + '_ {
        self.addons.iter().flatten().map(|addon| &**addon)
    }
}

impl<A: ?Sized + Addon> fmt::Debug for Extensible<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addon_kinds: Vec<Kind> = self.addons().map(Addon::kind).collect();
        let kinds = extensible_kinds().read();
        f.debug_struct("Extensible")
            .field("kind", &kinds.get_name(self.kind))
            .field(
                "addons",
                &addon_kinds
                    .iter()
                    .map(|addon_kind| kinds.get_name(*addon_kind))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Objects that expose an [`Extensible`] for their addons
pub trait HasAddons<A: ?Sized + Addon> {
    /// The addon holder
    fn extensible(&self) -> &Extensible<A>;

    /// The addon holder, mutably
    fn extensible_mut(&mut self) -> &mut Extensible<A>;
}

type AddonFactory<H, A> = Box<dyn Fn(&H) -> Option<Box<A>> + Send + Sync>;

/// Factories that equip newly created hosts with addons
///
/// An extension registers a factory against a host kind; whenever a host
/// whose kind matches is announced through
/// [`notify_creation`](Self::notify_creation), the factory may produce an
/// addon for it.
pub struct AddonRegistry<H: ?Sized, A: ?Sized + Addon> {
    factories: Vec<(Kind, AddonFactory<H, A>)>,
}

impl<H: ?Sized + HasAddons<A>, A: ?Sized + Addon> AddonRegistry<H, A> {
    /// A registry with no factories
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Run `factory` for every new host of kind `host_kind` (or a subtype)
    pub fn register<F>(&mut self, host_kind: Kind, factory: F)
    where
        F: Fn(&H) -> Option<Box<A>> + Send + Sync + 'static,
    {
        self.factories.push((host_kind, Box::new(factory)));
    }

    /// Offer `host` to every matching factory; returns how many addons were
    /// attached
    pub fn notify_creation(&self, host: &mut H) -> usize {
        let host_kind = host.extensible().kind();
        let matching: Vec<&AddonFactory<H, A>> = {
            let kinds = extensible_kinds().read();
            self.factories
                .iter()
                .filter(|(kind, _)| kinds.is_match(host_kind, *kind))
                .map(|(_, factory)| factory)
                .collect()
        };
        // lock released: factories may declare kinds of their own
        let produced: Vec<Box<A>> = matching
            .into_iter()
            .filter_map(|factory| factory(&*host))
            .collect();
        let count = produced.len();
        let ext = host.extensible_mut();
        for addon in produced {
            ext.attach(addon);
        }
        count
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<H: ?Sized + HasAddons<A>, A: ?Sized + Addon> Default for AddonRegistry<H, A> {
    fn default() -> Self {
        Self::new()
    }
}
