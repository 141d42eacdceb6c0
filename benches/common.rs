#![allow(dead_code)]

use std::sync::Once;

use particle_store::{
    attribute_id_of, build_attribute_set, freeze_attributes, register_attribute,
    AttributeSet, ChunkParams, ChunkedStore, ColumnSet, ElementId, PackedStore,
    ParticleId, ParticleStore, SENTINEL,
};

pub const ELEMS_SMALL: usize = 1_000;
pub const ELEMS_LARGE: usize = 50_000;

pub const PTCLS_SMALL: usize = 100_000;
pub const PTCLS_LARGE: usize = 2_000_000;

#[derive(Clone, Copy, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Copy, Default)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

static INIT: Once = Once::new();

pub fn init_attributes() {
    INIT.call_once(|| {
        register_attribute::<Position>().unwrap();
        register_attribute::<Velocity>().unwrap();
        freeze_attributes();
    });
}

pub fn attrs() -> AttributeSet {
    build_attribute_set(&[
        attribute_id_of::<Position>().unwrap(),
        attribute_id_of::<Velocity>().unwrap(),
    ])
}

/// Deterministic xorshift64* generator, seeded per setup call so repeated
/// bench iterations see identical migration patterns.
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    #[inline]
    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}

/// Builds an incoming batch of `count` particles with ids starting at
/// `first_id`, spread uniformly over the elements.
pub fn make_batch(
    rng: &mut Rng,
    num_elems: usize,
    count: usize,
    first_id: ParticleId,
) -> (Vec<ElementId>, ColumnSet) {
    let elems: Vec<ElementId> = (0..count)
        .map(|_| rng.below(num_elems) as ElementId)
        .collect();
    let mut data = ColumnSet::create(attrs(), count).unwrap();
    for (i, id) in data.ids_mut().iter_mut().enumerate() {
        *id = first_id + i as ParticleId;
    }
    (elems, data)
}

pub fn make_packed(num_elems: usize, num_ptcls: usize) -> PackedStore {
    init_attributes();
    let mut rng = Rng::new(0x9E37_79B9);
    let (elems, data) = make_batch(&mut rng, num_elems, num_ptcls, 0);
    PackedStore::new(num_elems, &elems, &data).unwrap()
}

pub fn make_chunked(num_elems: usize, num_ptcls: usize) -> ChunkedStore {
    init_attributes();
    let mut rng = Rng::new(0x9E37_79B9);
    let (elems, data) = make_batch(&mut rng, num_elems, num_ptcls, 0);
    ChunkedStore::new(num_elems, ChunkParams::default(), &elems, &data).unwrap()
}

/// Targets that keep every particle where it is.
pub fn identity_targets<S: ParticleStore>(store: &S) -> Vec<ElementId> {
    let mut targets = vec![SENTINEL; store.capacity()];
    store.for_each_slot(&mut |element, slot, occupied| {
        if occupied {
            targets[slot as usize] = element;
        }
    });
    targets
}

/// Targets that move every particle to a random element.
pub fn shuffle_targets<S: ParticleStore>(store: &S, rng: &mut Rng) -> Vec<ElementId> {
    let num_elems = store.num_elements();
    let mut targets = vec![SENTINEL; store.capacity()];
    store.for_each_slot(&mut |_, slot, occupied| {
        if occupied {
            targets[slot as usize] = rng.below(num_elems) as ElementId;
        }
    });
    targets
}

/// Targets that drop roughly `percent` of the particles and keep the rest.
pub fn churn_targets<S: ParticleStore>(
    store: &S,
    rng: &mut Rng,
    percent: usize,
) -> Vec<ElementId> {
    let mut targets = vec![SENTINEL; store.capacity()];
    store.for_each_slot(&mut |element, slot, occupied| {
        if occupied && rng.below(100) >= percent {
            targets[slot as usize] = element;
        }
    });
    targets
}

pub fn empty_batch() -> ColumnSet {
    ColumnSet::create(attrs(), 0).unwrap()
}
