//! Core identifier types, sentinels, and layout parameters.
//!
//! This module defines the **fundamental types and constants** shared by every
//! part of the storage engine: element and particle identifiers, the sentinel
//! convention, the attribute bitset used to describe a container's column
//! schema, and the tuning parameters of the chunked layout.
//!
//! ## Identifier conventions
//!
//! All per-slot index arrays (migration targets, destination maps, validity
//! masks) use **signed 32-bit** values so that [`SENTINEL`] (`-1`) can flow
//! through the same arrays as real indices. Conversions to `usize` happen at
//! the indexing boundary, after sentinel filtering.
//!
//! Particle ids are 64-bit: they are persistent across rebuilds and across
//! partition migrations, so they must not be recycled from a small index
//! space.

/// Index of a spatial element (mesh cell). Owned by the surrounding mesh.
pub type ElementId = i32;

/// Persistent particle identifier, unique among occupied slots.
pub type ParticleId = i64;

/// Index of a storage slot within a container's column storage.
pub type SlotId = i32;

/// Compact runtime identifier for a registered attribute kind.
pub type AttributeId = u16;

/// The "no element" / "no slot" / "remove this particle" marker.
///
/// Appears in migration target arrays (drop the particle), destination maps
/// (no destination claimed), and per-slot validity masks (empty lane).
pub const SENTINEL: ElementId = -1;

/// Maximum number of registered attribute kinds.
pub const ATTRIBUTE_CAP: usize = 64;

/// Bitset over registered attribute kinds.
///
/// Describes which attribute columns a container carries. Fits in a single
/// word because [`ATTRIBUTE_CAP`] is 64.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttributeSet {
    bits: u64,
}

impl AttributeSet {
    /// Creates an empty attribute set.
    #[inline]
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Sets the bit for `attribute_id`.
    #[inline]
    pub fn set(&mut self, attribute_id: AttributeId) {
        debug_assert!((attribute_id as usize) < ATTRIBUTE_CAP);
        self.bits |= 1u64 << attribute_id;
    }

    /// Clears the bit for `attribute_id`.
    #[inline]
    pub fn clear(&mut self, attribute_id: AttributeId) {
        self.bits &= !(1u64 << attribute_id);
    }

    /// Returns `true` if `attribute_id` is present.
    #[inline]
    pub fn has(&self, attribute_id: AttributeId) -> bool {
        (self.bits >> attribute_id) & 1 == 1
    }

    /// Returns `true` if every attribute in `other` is present in `self`.
    #[inline]
    pub fn contains_all(&self, other: &AttributeSet) -> bool {
        (self.bits & other.bits) == other.bits
    }

    /// Number of attributes present.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Returns `true` if no attribute is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterates over the attribute ids present, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = AttributeId> + '_ {
        let mut bits = self.bits;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let tz = bits.trailing_zeros();
            bits &= bits - 1;
            Some(tz as AttributeId)
        })
    }
}

/// Builds an attribute set from a list of attribute ids.
pub fn build_attribute_set(attribute_ids: &[AttributeId]) -> AttributeSet {
    let mut set = AttributeSet::empty();
    for &id in attribute_ids {
        set.set(id);
    }
    set
}

/// Tuning parameters for the chunked vectorized layout.
///
/// ## Fields
/// - `width` — number of elements (rows) per lock-step chunk; every row in a
///   chunk is padded to the chunk's maximum particle count so all `width`
///   lanes share one trip count.
/// - `sigma` — length of the sliding sort window: rows are stably reordered
///   within consecutive windows of `sigma` rows by descending particle
///   count, ties broken by ascending element id. `usize::MAX` sorts the
///   whole range in one window; `1` disables reordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkParams {
    /// Elements per chunk (lock-step lane count).
    pub width: usize,

    /// Sliding sort-window length for occupancy balancing.
    pub sigma: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            width: 32,
            sigma: usize::MAX,
        }
    }
}
