//! Cloning an IR: entities, addons and entry points follow into the copy

use std::any::Any;
use std::ptr::NonNull;

use jitkit_ir::kind::{addon_ir_kind, entry_point_kind, is_kind};
use jitkit_ir::prelude::*;
use jitkit_ir::{EntryPointId, EntryPointInfo, IrId, declare_kind};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

/// Remembers a struct type and which IR it was made for
#[derive(Debug)]
struct LayoutNote {
    layout: TypeId,
    made_for: IrId,
}
declare_kind!(impl HasKind for LayoutNote = "LayoutNote" : addon_ir_kind());

impl Addon for LayoutNote {
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

impl AddonIr for LayoutNote {
    fn clone_addon(&self, cloner: &IrCloner<'_>) -> Box<dyn AddonIr> {
        Box::new(Self {
            layout: cloner.cloned_type(self.layout),
            made_for: cloner.cloned_ir().id(),
        })
    }
}

/// Entry point that keeps the default and stays behind on clone
struct Interpreted {
    info: EntryPointInfo,
}
declare_kind!(fn interpreted_kind = "Interpreted" : entry_point_kind());

impl EntryPoint for Interpreted {
    fn info(&self) -> &EntryPointInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut EntryPointInfo {
        &mut self.info
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Jumps to another entry point; records what that became in the clone
struct Trampoline {
    info: EntryPointInfo,
    target: EntryPointId,
    target_in_clone: Option<EntryPointId>,
}
declare_kind!(fn trampoline_kind = "Trampoline" : entry_point_kind());

impl EntryPoint for Trampoline {
    fn info(&self) -> &EntryPointInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut EntryPointInfo {
        &mut self.info
    }
    fn clone_entry_point(&self, cloner: &IrCloner<'_>) -> Option<Box<dyn EntryPoint>> {
        Some(Box::new(Self {
            info: self.info.clone_with(cloner),
            target: self.target,
            target_in_clone: cloner.cloned_entry_point(self.target),
        }))
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn linked_list_ir() -> (Ir, TypeId, TypeId) {
    let mut ir = Ir::with_base_types(RegionConfig::default()).unwrap();
    let int64 = ir.addon::<BaseIrAddon>().unwrap().int64;
    let node = BaseIrAddon::define_struct(&mut ir, "Node", 128);
    let node_ptr = BaseIrAddon::pointer_to(&mut ir, node).unwrap();
    ir.define_field(node, "value", int64, 0).unwrap();
    let next = ir.define_field(node, "next", node_ptr, 64).unwrap();
    (ir, node, next)
}

#[test]
fn struct_field_cycle_is_rewired() {
    let (ir, node, next) = linked_list_ir();
    let copy = ir.try_clone().unwrap();

    assert_ne!(copy.id(), ir.id());
    assert_eq!(copy.types().len(), ir.types().len());
    for (a, b) in ir.types().zip(copy.types()) {
        assert_eq!(a.def(), b.def());
    }

    let TypeDef::Struct { fields, .. } = copy.get_type(node).unwrap().def() else {
        panic!("Node should stay a struct");
    };
    assert!(fields.contains(&next));
    let TypeDef::Field { owner, ty, .. } = copy.get_type(next).unwrap().def() else {
        panic!("next should stay a field");
    };
    assert_eq!(*owner, node);
    assert_eq!(copy.get_type(*ty).unwrap().def(), &TypeDef::Pointer { base: node });
}

#[test]
fn literals_get_their_own_bytes() {
    let (mut ir, ..) = linked_list_ir();
    let int32 = ir.addon::<BaseIrAddon>().unwrap().int32;
    let lit = ir.create_literal(int32, &7_u32.to_le_bytes()).unwrap();
    let sym = ir.create_symbol("seven", int32).unwrap();

    let copy = ir.try_clone().unwrap();
    let (a, b) = (ir.literal(lit).unwrap(), copy.literal(lit).unwrap());
    assert_eq!(a.bytes(), b.bytes());
    assert_eq!(b.ty(), int32);
    assert_ne!(a.bytes().as_ptr(), b.bytes().as_ptr());
    assert_eq!(copy.symbol(sym).unwrap().name(), "seven");

    drop(ir);
    assert_eq!(copy.literal(lit).unwrap().bytes(), &[7, 0, 0, 0]);
}

#[test]
fn addons_follow_the_clone() {
    let (mut ir, node, _) = linked_list_ir();
    let note = LayoutNote {
        layout: node,
        made_for: ir.id(),
    };
    ir.attach(Box::new(note));

    let copy = ir.try_clone().unwrap();
    assert_eq!(copy.addons().addon_count(), ir.addons().addon_count());
    let cloned = copy.addon::<LayoutNote>().unwrap();
    assert_eq!(cloned.layout, node);
    assert_eq!(cloned.made_for, copy.id());
    assert_eq!(ir.addon::<LayoutNote>().unwrap().made_for, ir.id());

    let base = copy.addon::<BaseIrAddon>().unwrap();
    assert_eq!(base.struct_type_from_name("Node"), Some(node));
}

#[test]
fn entry_points_clone_only_on_request() {
    let mut ir = Ir::with_base_types(RegionConfig::default()).unwrap();
    let interpreted = ir.add_entry_point(|id| Interpreted {
        info: EntryPointInfo::new(id, 0, interpreted_kind()),
    });
    let pc = NonNull::new(0x4000 as *mut u8).unwrap();
    let native = ir.add_entry_point(|id| NativeEntry::with_entry(id, 1, pc).named("main"));
    let ir_id = ir.id();
    ir.entry_point_mut(native)
        .unwrap()
        .info_mut()
        .addons_mut()
        .attach(Box::new(LayoutNote {
            layout: TypeId::NO_TYPE,
            made_for: ir_id,
        }));
    let trampoline = |target: EntryPointId| {
        move |id: EntryPointId| Trampoline {
            info: EntryPointInfo::new(id, 2, trampoline_kind()),
            target,
            target_in_clone: None,
        }
    };
    let to_interpreted = ir.add_entry_point(trampoline(interpreted));
    let to_native = ir.add_entry_point(trampoline(native));

    let copy = ir.try_clone().unwrap();
    assert!(copy.entry_point(interpreted).is_none());
    assert_eq!(copy.entry_points().len(), 3);
    assert_eq!(copy.max_entry_point_id(), ir.max_entry_point_id());

    let cloned = copy.entry_point(native).unwrap();
    assert!(is_kind(cloned.info().kind(), entry_point_kind()));
    let cloned = cloned.downcast_ref::<NativeEntry>().unwrap();
    assert_eq!(cloned.entry(), Some(pc));
    assert_eq!(cloned.info().name(), Some("main"));
    let note = cloned.info().addons().addon::<LayoutNote>().unwrap();
    assert_eq!(note.made_for, copy.id());

    let target_of = |id: EntryPointId| {
        copy.entry_point(id)
            .unwrap()
            .downcast_ref::<Trampoline>()
            .unwrap()
            .target_in_clone
    };
    assert_eq!(target_of(to_interpreted), None);
    assert_eq!(target_of(to_native), Some(native));
}

#[rstest]
#[case::same_blocks(RegionConfig::default())]
#[case::small_blocks(RegionConfig::default().with_block_size(256))]
fn clone_into_another_region_config(#[case] config: RegionConfig) {
    let (mut ir, ..) = linked_list_ir();
    let int8 = ir.addon::<BaseIrAddon>().unwrap().int8;
    for i in 0..64_u8 {
        ir.create_literal(int8, &[i]).unwrap();
    }
    let copy = ir.clone_with(config).unwrap();
    assert_eq!(copy.config(), &config);
    assert_eq!(copy.literals().len(), 64);
    assert!(copy.region().bytes_used() >= 64);
}

#[test]
fn clone_logs_like_the_source() {
    let _guard = jitkit_log::init_test().unwrap();
    let (mut ir, ..) = linked_list_ir();
    let word = ir.addon::<BaseIrAddon>().unwrap().word;
    ir.create_literal(word, &[0xff; 8]).unwrap();
    ir.create_symbol("mask", word).unwrap();

    let copy = ir.try_clone().unwrap();
    let (mut a, mut b) = (String::new(), String::new());
    ir.log(&mut a).unwrap();
    copy.log(&mut b).unwrap();
    let strip_header = |s: &str| s.lines().skip(1).collect::<Vec<_>>().join("\n");
    assert_eq!(strip_header(&a), strip_header(&b));
}

proptest! {
    #[test]
    fn every_addon_is_cloned(structs in 1_usize..8, notes in 0_usize..6) {
        let mut ir = Ir::with_base_types(RegionConfig::default()).unwrap();
        let ids: Vec<TypeId> = (0..structs)
            .map(|i| BaseIrAddon::define_struct(&mut ir, &format!("S{i}"), 64))
            .collect();
        for n in 0..notes {
            ir.attach(Box::new(LayoutNote { layout: ids[n % ids.len()], made_for: ir.id() }));
        }

        let copy = ir.try_clone().unwrap();
        prop_assert_eq!(copy.addons().addon_count(), notes + 1);
        let copied: Vec<&dyn AddonIr> = copy.addons().addons().collect();
        for (n, addon) in copied.iter().skip(1).enumerate() {
            let note = addon.as_any().downcast_ref::<LayoutNote>().unwrap();
            prop_assert_eq!(note.layout, ids[n % ids.len()]);
            prop_assert_eq!(note.made_for, copy.id());
        }
    }
}
