use std::mem::{align_of, size_of};
use std::sync::Once;

use particle_store::{
    attribute_description, attribute_id_of, build_attribute_set, freeze_attributes,
    register_attribute, ColumnSet, ParticleId, RegistryError, StoreError,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Charge(f64);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct NeverRegistered(u8);

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        register_attribute::<Position>().unwrap();
        register_attribute::<Velocity>().unwrap();
        register_attribute::<Charge>().unwrap();
        freeze_attributes();
    });
}

#[test]
fn registration_is_idempotent_and_frozen_after_freeze() {
    init_registry();

    let first = attribute_id_of::<Position>().unwrap();
    let again = register_attribute::<Position>().unwrap();
    assert_eq!(first, again);

    let desc = attribute_description(first).unwrap();
    assert_eq!(desc.size, size_of::<Position>());
    assert_eq!(desc.align, align_of::<Position>());
    assert!(desc.name.contains("Position"));

    match register_attribute::<NeverRegistered>() {
        Err(StoreError::Registry(RegistryError::Frozen)) => {}
        other => panic!("expected Frozen, got {other:?}"),
    }
    match attribute_id_of::<NeverRegistered>() {
        Err(StoreError::Registry(RegistryError::Unregistered(_))) => {}
        other => panic!("expected Unregistered, got {other:?}"),
    }
}

#[test]
fn typed_views_round_trip_and_reject_wrong_types() {
    init_registry();

    let pos = attribute_id_of::<Position>().unwrap();
    let vel = attribute_id_of::<Velocity>().unwrap();
    let attrs = build_attribute_set(&[pos, vel]);

    let mut set = ColumnSet::create(attrs, 8).unwrap();
    assert_eq!(set.capacity(), 8);

    {
        let positions = set.view_mut::<Position>(pos).unwrap();
        for (i, p) in positions.iter_mut().enumerate() {
            *p = Position {
                x: i as f32,
                y: -(i as f32),
            };
        }
    }

    let positions = set.view::<Position>(pos).unwrap();
    assert_eq!(positions[3], Position { x: 3.0, y: -3.0 });

    // Fresh columns are zero-initialized.
    let velocities = set.view::<Velocity>(vel).unwrap();
    assert!(velocities.iter().all(|v| *v == Velocity::default()));

    // Asking for the wrong element type must fail, not transmute.
    assert!(set.view::<Velocity>(pos).is_err());

    // An id outside the schema is rejected even if registered.
    let charge = attribute_id_of::<Charge>().unwrap();
    assert!(set.view::<Charge>(charge).is_err());
}

#[test]
fn scatter_moves_values_and_skips_sentinels() {
    init_registry();

    let pos = attribute_id_of::<Position>().unwrap();
    let attrs = build_attribute_set(&[pos]);

    let mut src = ColumnSet::create(attrs, 4).unwrap();
    src.ids_mut().copy_from_slice(&[100, 101, 102, 103]);
    {
        let positions = src.view_mut::<Position>(pos).unwrap();
        for (i, p) in positions.iter_mut().enumerate() {
            p.x = 10.0 + i as f32;
        }
    }

    // Slot 1 is discarded; the rest land permuted in a smaller set.
    let mut dst = src.clone_empty(3);
    src.scatter_to(&mut dst, &[2, -1, 0, 1]).unwrap();

    assert_eq!(dst.ids(), &[102, 103, 100]);
    let positions = dst.view::<Position>(pos).unwrap();
    assert_eq!(positions[0].x, 12.0);
    assert_eq!(positions[1].x, 13.0);
    assert_eq!(positions[2].x, 10.0);
}

#[test]
fn scatter_rejects_bad_map_lengths() {
    init_registry();

    let pos = attribute_id_of::<Position>().unwrap();
    let attrs = build_attribute_set(&[pos]);

    let src = ColumnSet::create(attrs, 4).unwrap();
    let mut dst = src.clone_empty(4);
    assert!(src.scatter_to(&mut dst, &[0, 1, 2]).is_err());
}

#[test]
fn columns_are_contiguous_and_aligned() {
    init_registry();

    let pos = attribute_id_of::<Position>().unwrap();
    let attrs = build_attribute_set(&[pos]);

    let set = ColumnSet::create(attrs, 64).unwrap();
    let positions = set.view::<Position>(pos).unwrap();
    assert_eq!(positions.len(), 64);

    let base = positions.as_ptr() as usize;
    assert_eq!(base % align_of::<Position>(), 0);

    let stride = size_of::<Position>();
    for i in 0..positions.len() {
        let pi = unsafe { positions.as_ptr().add(i) as usize };
        assert_eq!(pi, base + i * stride, "row {i} not at expected byte offset");
    }

    // The type-erased byte view covers exactly capacity * size_of::<T>().
    let (_, col) = set.iter_columns().next().unwrap();
    assert_eq!(col.bytes().len(), 64 * stride);
    assert_eq!(col.len(), 64);

    // The ids column does not alias the attribute column.
    assert_ne!(set.ids().as_ptr() as usize, base);
}

#[test]
fn clone_empty_preserves_schema_with_new_capacity() {
    init_registry();

    let pos = attribute_id_of::<Position>().unwrap();
    let vel = attribute_id_of::<Velocity>().unwrap();
    let attrs = build_attribute_set(&[pos, vel]);

    let set = ColumnSet::create(attrs, 5).unwrap();
    let fresh = set.clone_empty(11);

    assert_eq!(fresh.capacity(), 11);
    assert_eq!(fresh.attributes(), set.attributes());
    assert_eq!(fresh.ids().len(), 11);
    assert!(fresh.ids().iter().all(|&id| id == ParticleId::default()));
    assert_eq!(fresh.view::<Position>(pos).unwrap().len(), 11);
    assert_eq!(fresh.view::<Velocity>(vel).unwrap().len(), 11);
}
