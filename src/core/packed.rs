//! Exact packed layout.
//!
//! Particles of element `e` occupy the contiguous slot range
//! `offsets[e]..offsets[e+1]`, with no padding anywhere: capacity always
//! equals the live particle count. The price is that every rebuild
//! reallocates and rewrites the whole storage; the layout trades rebuild
//! cost for perfectly dense iteration.

use rayon::prelude::*;

use crate::core::column::ColumnSet;
use crate::core::error::{ColumnError, StoreResult};
use crate::core::rebuild::{
    claim_destinations, exclusive_scan, snapshot_counts, tally, validate_incoming,
    validate_targets, zeroed_counts, ParticleStore, RowCursor,
};
use crate::core::types::{AttributeSet, ElementId, SlotId};
use crate::profiling::span;

/// Immutable snapshot of one generation of packed storage.
///
/// Built off to the side during a rebuild and committed by a single
/// assignment, so readers never observe a half-updated generation.
struct PackedLayout {
    /// Range offsets, length `num_elements + 1`.
    offsets: Vec<SlotId>,

    /// Column storage, capacity `offsets[num_elements]`.
    data: ColumnSet,
}

/// Element-grouped particle container with exact per-element ranges.
pub struct PackedStore {
    num_elements: usize,
    layout: PackedLayout,
}

impl PackedStore {
    /// Builds a container over `num_elements` elements from an initial
    /// particle batch.
    ///
    /// `initial_element[i]` is the element owning particle `i` of
    /// `initial_data`. Construction runs the ordinary rebuild path with an
    /// empty current layout and the batch as the incoming set.
    pub fn new(
        num_elements: usize,
        initial_element: &[ElementId],
        initial_data: &ColumnSet,
    ) -> StoreResult<Self> {
        let mut store = Self {
            num_elements,
            layout: PackedLayout {
                offsets: vec![0; num_elements + 1],
                data: initial_data.clone_empty(0),
            },
        };
        store.rebuild(&[], initial_element, initial_data)?;
        Ok(store)
    }

    /// Slot range owned by element `element`.
    #[inline]
    pub fn slot_range(&self, element: ElementId) -> std::ops::Range<usize> {
        let e = element as usize;
        self.layout.offsets[e] as usize..self.layout.offsets[e + 1] as usize
    }

    /// Recovers the element owning `slot` by offset partition point.
    pub fn element_of_slot(&self, slot: SlotId) -> ElementId {
        debug_assert!((slot as usize) < self.capacity());
        let upper = self.layout.offsets.partition_point(|&o| o <= slot);
        (upper - 1) as ElementId
    }

    /// Range offsets, length `num_elements + 1`.
    #[inline]
    pub fn offsets(&self) -> &[SlotId] {
        &self.layout.offsets
    }

    /// Visits every occupied slot in parallel, blocked by element.
    pub fn par_for_each_slot<F>(&self, visit: F)
    where
        F: Fn(ElementId, SlotId) + Sync,
    {
        let offsets = &self.layout.offsets;
        (0..self.num_elements).into_par_iter().for_each(|e| {
            for slot in offsets[e]..offsets[e + 1] {
                visit(e as ElementId, slot);
            }
        });
    }
}

impl ParticleStore for PackedStore {
    fn num_elements(&self) -> usize {
        self.num_elements
    }

    fn num_particles(&self) -> usize {
        self.layout.offsets[self.num_elements] as usize
    }

    fn capacity(&self) -> usize {
        self.layout.data.capacity()
    }

    fn attributes(&self) -> AttributeSet {
        self.layout.data.attributes()
    }

    fn data(&self) -> &ColumnSet {
        &self.layout.data
    }

    fn data_mut(&mut self) -> &mut ColumnSet {
        &mut self.layout.data
    }

    fn for_each_slot(&self, visit: &mut dyn FnMut(ElementId, SlotId, bool)) {
        for e in 0..self.num_elements {
            for slot in self.layout.offsets[e]..self.layout.offsets[e + 1] {
                visit(e as ElementId, slot, true);
            }
        }
    }

    fn rebuild(
        &mut self,
        target_element: &[ElementId],
        incoming_element: &[ElementId],
        incoming_data: &ColumnSet,
    ) -> StoreResult<()> {
        let _whole = span("rebuild/packed");
        let n = self.num_elements;

        validate_targets(target_element, self.capacity(), n)?;
        validate_incoming(incoming_element, incoming_data, n)?;
        if incoming_data.attributes() != self.layout.data.attributes() {
            return Err(ColumnError::AttributeMismatch.into());
        }

        let counts = {
            let _g = span("rebuild/count");
            let counts = zeroed_counts(n);
            tally(&counts, target_element);
            tally(&counts, incoming_element);
            snapshot_counts(&counts)
        };

        let offsets = {
            let _g = span("rebuild/scan");
            exclusive_scan(&counts)
        };
        let total = offsets[n] as usize;

        let mut fresh = self.layout.data.clone_empty(total);
        let cursor = RowCursor::from_starts(&offsets[..n]);

        {
            let _g = span("rebuild/scatter_existing");
            let dest = claim_destinations(target_element, &cursor, |e| e as usize);
            self.layout.data.scatter_to(&mut fresh, &dest)?;
        }
        {
            let _g = span("rebuild/scatter_incoming");
            let dest = claim_destinations(incoming_element, &cursor, |e| e as usize);
            incoming_data.scatter_to(&mut fresh, &dest)?;
        }

        // Commit: one assignment swaps in the fully built generation.
        self.layout = PackedLayout {
            offsets,
            data: fresh,
        };
        Ok(())
    }
}
