//! Entry points into compiled code

use core::any::Any;
use core::fmt;
use core::mem;
use core::ptr::NonNull;

use crate::cloner::{AddonIr, IrCloner};
use crate::extensible::{Extensible, HasAddons};
use crate::ids::EntryPointId;
use crate::kind::{Kind, kind_name, native_entry_kind};

/// State shared by every entry point
#[derive(Debug)]
pub struct EntryPointInfo {
    id: EntryPointId,
    entry_id: u32,
    name: Option<String>,
    addons: Extensible<dyn AddonIr>,
}

impl EntryPointInfo {
    /// Info for entry point `id` of kind `kind`; `entry_id` tags its role
    pub fn new(id: EntryPointId, entry_id: u32, kind: Kind) -> Self {
        Self {
            id,
            entry_id,
            name: None,
            addons: Extensible::new(kind),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> EntryPointId {
        self.id
    }

    pub fn entry_id(&self) -> u32 {
        self.entry_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> Kind {
        self.addons.kind()
    }

    pub fn addons(&self) -> &Extensible<dyn AddonIr> {
        &self.addons
    }

    pub fn addons_mut(&mut self) -> &mut Extensible<dyn AddonIr> {
        &mut self.addons
    }

    /// Same id, role, name and kind, with every addon cloned through `cloner`
    pub fn clone_with(&self, cloner: &IrCloner<'_>) -> Self {
        Self {
            id: self.id,
            entry_id: self.entry_id,
            name: self.name.clone(),
            addons: cloner.clone_extensible(&self.addons),
        }
    }
}

/// A way into code produced for an IR
///
/// Entry points are not cloned with their IR unless the concrete type opts
/// in by overriding [`clone_entry_point`](Self::clone_entry_point).
pub trait EntryPoint: Any {
    fn info(&self) -> &EntryPointInfo;

    fn info_mut(&mut self) -> &mut EntryPointInfo;

    /// Clone into the IR `cloner` is building; `None` leaves it behind
    fn clone_entry_point(&self, cloner: &IrCloner<'_>) -> Option<Box<dyn EntryPoint>> {
        let _ = cloner;
        None
    }

    /// Type-specific part of the log line
    fn log_contents(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let _ = out;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

impl dyn EntryPoint + '_ {
    /// Write `[entry e<id> <kind> <contents>]`
    pub fn log(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let info = self.info();
        write!(out, "[entry e{} {} ", info.id(), kind_name(info.kind()))?;
        self.log_contents(out)?;
        write!(out, "]")
    }

    /// Downcast to a concrete entry point type
    pub fn downcast_ref<T: EntryPoint>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

impl fmt::Debug for dyn EntryPoint + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.info(), f)
    }
}

impl HasAddons<dyn AddonIr> for dyn EntryPoint + '_ {
    fn extensible(&self) -> &Extensible<dyn AddonIr> {
        self.info().addons()
    }

    fn extensible_mut(&mut self) -> &mut Extensible<dyn AddonIr> {
        self.info_mut().addons_mut()
    }
}

/// Entry point that is a native code address
#[derive(Debug)]
pub struct NativeEntry {
    info: EntryPointInfo,
    entry: Option<NonNull<u8>>,
}

impl NativeEntry {
    /// An entry point with no address yet
    pub fn new(id: EntryPointId, entry_id: u32) -> Self {
        Self {
            info: EntryPointInfo::new(id, entry_id, native_entry_kind()),
            entry: None,
        }
    }

    /// An entry point at `entry`
    pub fn with_entry(id: EntryPointId, entry_id: u32, entry: NonNull<u8>) -> Self {
        Self {
            entry: Some(entry),
            ..Self::new(id, entry_id)
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.info.name = Some(name.into());
        self
    }

    pub fn set_entry(&mut self, entry: NonNull<u8>) {
        self.entry = Some(entry);
    }

    pub fn entry(&self) -> Option<NonNull<u8>> {
        self.entry
    }

    /// The address as a typed function pointer
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type whose signature and ABI match the
    /// code at the entry address, and that code must still be mapped.
    ///
    /// # Panics
    /// If `F` is not pointer sized.
    pub unsafe fn entry_as<F: Copy>(&self) -> Option<F> {
        assert_eq!(
            mem::size_of::<F>(),
            mem::size_of::<*const u8>(),
            "entry_as needs a pointer-sized function type"
        );
        let entry = self.entry?;
        // SAFETY: sizes checked above; the caller vouches for the signature.
        Some(unsafe { mem::transmute_copy::<*const u8, F>(&entry.as_ptr().cast_const()) })
    }
}

impl EntryPoint for NativeEntry {
    fn info(&self) -> &EntryPointInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryPointInfo {
        &mut self.info
    }

    fn clone_entry_point(&self, cloner: &IrCloner<'_>) -> Option<Box<dyn EntryPoint>> {
        Some(Box::new(Self {
            info: self.info.clone_with(cloner),
            entry: self.entry,
        }))
    }

    fn log_contents(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let addr = self.entry.map_or(0, |p| p.as_ptr() as usize);
        write!(out, "entryPC {addr:#x} ")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn answer() -> i32 {
        42
    }

    #[test]
    fn native_entry_logs_its_address() {
        let pc = NonNull::new(0x1000 as *mut u8).unwrap();
        let entry: Box<dyn EntryPoint> = Box::new(NativeEntry::with_entry(EntryPointId::new(3), 0, pc));
        let mut out = String::new();
        entry.log(&mut out).unwrap();
        assert_eq!(out, "[entry e3 NativeEntry entryPC 0x1000 ]");
    }

    #[test]
    fn entry_as_calls_through() {
        let pc = NonNull::new(answer as *const () as *mut u8).unwrap();
        let entry = NativeEntry::with_entry(EntryPointId::new(0), 0, pc).named("answer");
        // SAFETY: the address is `answer`, which has exactly this signature.
        let f = unsafe { entry.entry_as::<extern "C" fn() -> i32>() }.unwrap();
        assert_eq!(f(), 42);
        assert_eq!(entry.info().name(), Some("answer"));
    }

    #[test]
    fn address_starts_unset() {
        let mut entry = NativeEntry::new(EntryPointId::new(1), 7);
        // SAFETY: no address, nothing is called.
        assert!(unsafe { entry.entry_as::<fn()>() }.is_none());
        entry.set_entry(NonNull::dangling());
        assert!(entry.entry().is_some());
        assert_eq!(entry.info().entry_id(), 7);
    }
}
