use std::collections::HashMap;
use std::sync::Once;

use particle_store::{
    attribute_id_of, build_attribute_set, freeze_attributes, register_attribute,
    AttributeSet, ChunkParams, ChunkedStore, ColumnSet, ElementId, PackedStore,
    ParticleId, ParticleStore, SlotId, SENTINEL,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        register_attribute::<Position>().unwrap();
        freeze_attributes();
    });
}

fn attrs() -> AttributeSet {
    build_attribute_set(&[attribute_id_of::<Position>().unwrap()])
}

fn batch(ids: &[ParticleId]) -> ColumnSet {
    let mut set = ColumnSet::create(attrs(), ids.len()).unwrap();
    set.ids_mut().copy_from_slice(ids);
    let pos_id = attribute_id_of::<Position>().unwrap();
    let positions = set.view_mut::<Position>(pos_id).unwrap();
    for (i, p) in positions.iter_mut().enumerate() {
        p.x = ids[i] as f32;
    }
    set
}

fn empty_batch() -> ColumnSet {
    ColumnSet::create(attrs(), 0).unwrap()
}

/// Maps each live particle id to its owning element, padding excluded.
fn contents(store: &ChunkedStore) -> HashMap<ParticleId, ElementId> {
    let mut map = HashMap::new();
    let ids = store.data().ids();
    store.for_each_slot(&mut |element, slot, occupied| {
        if occupied {
            assert_ne!(element, SENTINEL);
            let prev = map.insert(ids[slot as usize], element);
            assert!(prev.is_none(), "particle id appeared in two slots");
        }
    });
    map
}

fn targets_from_plan(
    store: &ChunkedStore,
    plan: &HashMap<ParticleId, ElementId>,
) -> Vec<ElementId> {
    let ids = store.data().ids();
    store
        .slot_elements()
        .iter()
        .enumerate()
        .map(|(slot, &element)| {
            if element == SENTINEL {
                SENTINEL
            } else {
                plan.get(&ids[slot]).copied().unwrap_or(element)
            }
        })
        .collect()
}

fn assert_layout_invariants(store: &ChunkedStore) {
    let width = store.params().width;
    assert_eq!(store.num_rows() % width, 0);
    assert_eq!(store.num_rows() / width, store.num_chunks());

    let offsets = store.offsets();
    assert_eq!(offsets.len(), store.num_rows() + 1);
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(offsets[store.num_rows()] as usize, store.capacity());

    // Every row of a chunk shares the chunk's padded width, which is the
    // maximum count among the chunk's elements.
    for k in 0..store.num_chunks() {
        let rows = k * width..(k + 1) * width;
        let mut max_count = 0;
        for row in rows.clone() {
            let row_width = (offsets[row + 1] - offsets[row]) as usize;
            assert_eq!(row_width, store.chunk_width(k));
            let element = store.element_of_row(row);
            if element != SENTINEL {
                max_count = max_count.max(store.count_of(element));
            }
        }
        assert_eq!(store.chunk_width(k), max_count);
    }

    // Row maps are mutually inverse for real elements.
    for element in 0..store.num_elements() as ElementId {
        assert_eq!(store.element_of_row(store.row_of_element(element)), element);
    }

    // Each row's occupied prefix carries its element; the rest is padding.
    let mask = store.slot_elements();
    let mut occupied = 0;
    for row in 0..store.num_rows() {
        let element = store.element_of_row(row);
        let start = offsets[row] as usize;
        let end = offsets[row + 1] as usize;
        let count = if element == SENTINEL {
            0
        } else {
            store.count_of(element)
        };
        for slot in start..end {
            if slot < start + count {
                assert_eq!(mask[slot], element);
                occupied += 1;
            } else {
                assert_eq!(mask[slot], SENTINEL);
            }
        }
    }
    assert_eq!(occupied, store.num_particles());
}

#[test]
fn rows_are_padded_to_chunk_width() {
    init_registry();

    // 6 elements, width 4: rows padded to 8, two chunks.
    let elems: Vec<ElementId> = vec![0, 0, 0, 1, 2, 2, 4, 5, 5, 5, 5];
    let ids: Vec<ParticleId> = (0..elems.len() as ParticleId).collect();
    let params = ChunkParams {
        width: 4,
        sigma: usize::MAX,
    };
    let store = ChunkedStore::new(6, params, &elems, &batch(&ids)).unwrap();

    assert_eq!(store.num_rows(), 8);
    assert_eq!(store.num_chunks(), 2);
    assert_eq!(store.num_particles(), elems.len());
    assert!(store.capacity() >= store.num_particles());
    assert_layout_invariants(&store);

    let mut expected = HashMap::new();
    for (i, &e) in elems.iter().enumerate() {
        expected.insert(i as ParticleId, e);
    }
    assert_eq!(contents(&store), expected);
}

#[test]
fn sigma_sort_orders_rows_by_descending_count() {
    init_registry();

    // Counts per element: [1, 4, 2, 2, 0, 3].
    let elems: Vec<ElementId> = vec![0, 1, 1, 1, 1, 2, 2, 3, 3, 5, 5, 5];
    let ids: Vec<ParticleId> = (0..elems.len() as ParticleId).collect();
    let params = ChunkParams {
        width: 2,
        sigma: usize::MAX,
    };
    let store = ChunkedStore::new(6, params, &elems, &batch(&ids)).unwrap();

    // Full-range window: descending count, ties broken by ascending id.
    let order: Vec<ElementId> = (0..store.num_rows())
        .map(|row| store.element_of_row(row))
        .collect();
    assert_eq!(order, vec![1, 5, 2, 3, 0, 4]);
    assert_layout_invariants(&store);
}

#[test]
fn sigma_one_keeps_element_order() {
    init_registry();

    let elems: Vec<ElementId> = vec![2, 2, 2, 0];
    let ids: Vec<ParticleId> = (0..4).collect();
    let params = ChunkParams { width: 2, sigma: 1 };
    let store = ChunkedStore::new(4, params, &elems, &batch(&ids)).unwrap();

    let order: Vec<ElementId> = (0..store.num_rows())
        .map(|row| store.element_of_row(row))
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
    assert_layout_invariants(&store);
}

#[test]
fn zero_width_is_clamped_to_one() {
    init_registry();

    let elems: Vec<ElementId> = vec![0, 0, 2];
    let ids: Vec<ParticleId> = vec![40, 41, 42];
    let params = ChunkParams {
        width: 0,
        sigma: usize::MAX,
    };
    let mut store = ChunkedStore::new(3, params, &elems, &batch(&ids)).unwrap();

    // Degenerate width behaves exactly like width 1: one row per chunk,
    // each padded to its own element's count.
    assert_eq!(store.params().width, 1);
    assert_eq!(store.num_chunks(), store.num_rows());
    for k in 0..store.num_chunks() {
        let element = store.element_of_row(k);
        let expected = if element == SENTINEL {
            0
        } else {
            store.count_of(element)
        };
        assert_eq!(store.chunk_width(k), expected);
    }
    assert_layout_invariants(&store);

    let targets = targets_from_plan(&store, &HashMap::new());
    store.rebuild(&targets, &[], &empty_batch()).unwrap();
    assert_layout_invariants(&store);
}

#[test]
fn garbage_targets_on_padding_lanes_are_masked() {
    init_registry();

    let elems: Vec<ElementId> = vec![0, 0, 1];
    let ids: Vec<ParticleId> = vec![10, 11, 12];
    let params = ChunkParams {
        width: 2,
        sigma: usize::MAX,
    };
    let mut store = ChunkedStore::new(2, params, &elems, &batch(&ids)).unwrap();

    let before = contents(&store);
    let mut targets = targets_from_plan(&store, &HashMap::new());
    for (slot, &element) in store.slot_elements().iter().enumerate() {
        if element == SENTINEL {
            // Out-of-range garbage on an empty lane must be ignored.
            targets[slot] = 999;
        }
    }
    store.rebuild(&targets, &[], &empty_batch()).unwrap();

    assert_eq!(contents(&store), before);
    assert_layout_invariants(&store);
}

#[test]
fn rebuild_resorts_rows_and_repads() {
    init_registry();

    let elems: Vec<ElementId> = vec![0, 0, 0, 1];
    let ids: Vec<ParticleId> = vec![20, 21, 22, 23];
    let params = ChunkParams {
        width: 2,
        sigma: usize::MAX,
    };
    let mut store = ChunkedStore::new(2, params, &elems, &batch(&ids)).unwrap();
    assert_eq!(store.element_of_row(0), 0);

    // Move everything to element 1 and add two more there.
    let plan: HashMap<ParticleId, ElementId> =
        ids.iter().map(|&id| (id, 1)).collect();
    let targets = targets_from_plan(&store, &plan);
    store.rebuild(&targets, &[1, 1], &batch(&[30, 31])).unwrap();

    assert_eq!(store.element_of_row(0), 1);
    assert_eq!(store.count_of(1), 6);
    assert_eq!(store.count_of(0), 0);
    assert_eq!(store.num_particles(), 6);
    assert_layout_invariants(&store);

    // Attribute values still travel with their particles.
    let pos_id = attribute_id_of::<Position>().unwrap();
    let positions = store.data().view::<Position>(pos_id).unwrap();
    let ids_col = store.data().ids();
    store.for_each_slot(&mut |_, slot, occupied| {
        if occupied {
            assert_eq!(positions[slot as usize].x, ids_col[slot as usize] as f32);
        }
    });
}

#[test]
fn external_contract_matches_packed_layout() {
    init_registry();

    let n = 7;
    let ids: Vec<ParticleId> = (0..40).collect();
    let elems: Vec<ElementId> = ids.iter().map(|&i| ((i * 3 + 1) % n) as ElementId).collect();

    let mut packed = PackedStore::new(n as usize, &elems, &batch(&ids)).unwrap();
    let mut chunked = ChunkedStore::new(
        n as usize,
        ChunkParams {
            width: 4,
            sigma: usize::MAX,
        },
        &elems,
        &batch(&ids),
    )
    .unwrap();

    assert_eq!(contents_packed(&packed), contents(&chunked));

    // Apply one id-level migration plan to both layouts.
    let plan: HashMap<ParticleId, ElementId> = ids
        .iter()
        .map(|&id| {
            let target = if id % 5 == 0 {
                SENTINEL
            } else {
                ((id * 11 + 2) % n) as ElementId
            };
            (id, target)
        })
        .collect();

    let packed_targets: Vec<ElementId> = {
        let ids_col = packed.data().ids();
        (0..packed.capacity() as SlotId)
            .map(|slot| plan[&ids_col[slot as usize]])
            .collect()
    };
    packed.rebuild(&packed_targets, &[0], &batch(&[1000])).unwrap();

    let chunked_targets = targets_from_plan(&chunked, &plan);
    chunked
        .rebuild(&chunked_targets, &[0], &batch(&[1000]))
        .unwrap();

    assert_eq!(contents_packed(&packed), contents(&chunked));
    assert_eq!(packed.num_particles(), chunked.num_particles());
    assert_layout_invariants(&chunked);
}

fn contents_packed(store: &PackedStore) -> HashMap<ParticleId, ElementId> {
    let mut map = HashMap::new();
    let ids = store.data().ids();
    store.for_each_slot(&mut |element, slot, _| {
        map.insert(ids[slot as usize], element);
    });
    map
}
