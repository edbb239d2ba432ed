//! Lookups over addons whose kinds register themselves on first use
//!
//! No subscriber is installed here, so `attach` never resolves an addon's
//! kind and the first resolution happens inside the lookup itself.

use std::any::Any;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use jitkit_ir::kind::{addon_kind, extensible_kind, kind_name};
use jitkit_ir::{Addon, Extensible, HasKind, Kind, declare_kind};
use pretty_assertions::assert_eq;

macro_rules! late_addon {
    ($($ty:ident = $name:literal),* $(,)?) => {$(
        struct $ty;
        declare_kind!(impl HasKind for $ty = $name : addon_kind());

        impl Addon for $ty {
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
    )*};
}

late_addon!(
    LateFirst = "LateFirst",
    LateBeforeTyped = "LateBeforeTyped",
    LateBeforeMut = "LateBeforeMut",
    LateDetached = "LateDetached",
    LateShown = "LateShown",
    Wanted = "Wanted",
);

struct Counter(u32);
declare_kind!(impl HasKind for Counter = "LateCounter" : addon_kind());

impl Addon for Counter {
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

/// Run `work` on its own thread, failing the test if it never returns
fn finishes<T: Send + 'static>(work: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(work());
    });
    rx.recv_timeout(Duration::from_secs(10))
        .expect("lookup never returned")
}

fn host() -> Extensible<dyn Addon> {
    Extensible::new(extensible_kind())
}

#[test]
fn kind_lookup_resolves_attached_kinds() {
    let found = finishes(|| {
        let mut ext = host();
        ext.attach(Box::new(LateFirst));
        ext.addon_of_kind(addon_kind()).map(|addon| kind_name(addon.kind()))
    });
    assert_eq!(found.as_deref(), Some("LateFirst"));
}

#[test]
fn typed_lookup_past_an_unresolved_addon() {
    let found = finishes(|| {
        let mut ext = host();
        ext.attach(Box::new(LateBeforeTyped));
        ext.attach(Box::new(Wanted));
        ext.has_addon::<Wanted>()
    });
    assert!(found);
}

#[test]
fn mutable_lookup_past_an_unresolved_addon() {
    let count = finishes(|| {
        let mut ext = host();
        ext.attach(Box::new(LateBeforeMut));
        ext.attach(Box::new(Counter(1)));
        if let Some(counter) = ext.addon_mut::<Counter>() {
            counter.0 += 41;
        }
        ext.addon::<Counter>().map(|counter| counter.0)
    });
    assert_eq!(count, Some(42));
}

#[test]
fn detach_resolves_attached_kinds() {
    let left = finishes(|| {
        let mut ext = host();
        ext.attach(Box::new(LateDetached));
        let removed = ext.detach_kind(addon_kind()).map(|addon| kind_name(addon.kind()));
        (removed, ext.addon_count())
    });
    assert_eq!(left, (Some("LateDetached".to_owned()), 0));
}

#[test]
fn debug_names_unresolved_addons() {
    let shown = finishes(|| {
        let mut ext = host();
        ext.attach(Box::new(LateShown));
        format!("{ext:?}")
    });
    assert!(shown.contains("LateShown"), "{shown}");
}
