//! Chunked vectorized layout.
//!
//! Elements become **rows**; rows are grouped into chunks of a fixed width
//! `C` and every row in a chunk is padded to the chunk's maximum particle
//! count. All `C` lanes of a chunk then share one trip count, which is what
//! lock-step (SIMD or GPU-warp style) iteration wants.
//!
//! To keep padding small, rows are reordered before chunking: within each
//! sliding window of `sigma` rows, rows are stably sorted by descending
//! particle count (ties by ascending element id). Element ids are never
//! renumbered; `row_to_element` / `element_to_row` maps translate between
//! the two index spaces and are rebuilt on every rebuild.
//!
//! Padding lanes are marked with [`SENTINEL`] in the per-slot `slot_element`
//! array, which doubles as the iteration validity mask.

use rayon::prelude::*;

use crate::core::column::{ColumnSet, SendPtr};
use crate::core::error::{ColumnError, LengthMismatchError, RebuildError, StoreResult};
use crate::core::rebuild::{
    claim_destinations, snapshot_counts, tally, validate_incoming, validate_targets,
    zeroed_counts, ParticleStore, RowCursor,
};
use crate::core::types::{AttributeSet, ChunkParams, ElementId, SlotId, SENTINEL};
use crate::profiling::span;

/// One committed generation of chunked storage.
struct ChunkedLayout {
    /// Row-indexed range offsets, length `num_rows + 1`. Every row of a
    /// chunk has the same padded width.
    offsets: Vec<SlotId>,

    /// Element owning each row, `SENTINEL` for filler rows past the last
    /// real element.
    row_to_element: Vec<ElementId>,

    /// Inverse of `row_to_element`, element-indexed.
    element_to_row: Vec<usize>,

    /// Exact per-element particle counts.
    counts: Vec<i32>,

    /// Owning element per slot, `SENTINEL` for padding lanes.
    slot_element: Vec<ElementId>,

    /// Occupied slots (padding excluded).
    num_particles: usize,

    /// Column storage, capacity `offsets[num_rows]`.
    data: ColumnSet,
}

/// Element-grouped particle container with chunk-uniform padded rows.
pub struct ChunkedStore {
    num_elements: usize,
    params: ChunkParams,
    layout: ChunkedLayout,
}

/// Stable in-window reorder by descending count, ties by ascending id.
fn sigma_sort(counts: &[i32], sigma: usize) -> Vec<ElementId> {
    let mut order: Vec<ElementId> = (0..counts.len() as ElementId).collect();
    let window = sigma.max(1).min(counts.len().max(1));
    for chunk in order.chunks_mut(window) {
        chunk.sort_by_key(|&e| (std::cmp::Reverse(counts[e as usize]), e));
    }
    order
}

impl ChunkedStore {
    /// Builds a container over `num_elements` elements from an initial
    /// particle batch, with layout tuning in `params`. A width of zero is
    /// treated as one.
    ///
    /// Construction runs the ordinary rebuild path with an empty current
    /// layout and the batch as the incoming set.
    pub fn new(
        num_elements: usize,
        params: ChunkParams,
        initial_element: &[ElementId],
        initial_data: &ColumnSet,
    ) -> StoreResult<Self> {
        let params = ChunkParams {
            width: params.width.max(1),
            ..params
        };
        let num_rows = num_elements.div_ceil(params.width) * params.width;
        let mut row_to_element: Vec<ElementId> =
            (0..num_elements as ElementId).collect();
        row_to_element.resize(num_rows, SENTINEL);

        let mut store = Self {
            num_elements,
            params,
            layout: ChunkedLayout {
                offsets: vec![0; num_rows + 1],
                row_to_element,
                element_to_row: (0..num_elements).collect(),
                counts: vec![0; num_elements],
                slot_element: Vec::new(),
                num_particles: 0,
                data: initial_data.clone_empty(0),
            },
        };
        store.rebuild(&[], initial_element, initial_data)?;
        Ok(store)
    }

    /// The layout tuning parameters this container was built with.
    #[inline]
    pub fn params(&self) -> ChunkParams {
        self.params
    }

    /// Number of rows (elements padded to a multiple of the chunk width).
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.layout.row_to_element.len()
    }

    /// Number of chunks.
    #[inline]
    pub fn num_chunks(&self) -> usize {
        self.num_rows() / self.params.width
    }

    /// Padded row width of chunk `k` (uniform across the chunk's rows).
    pub fn chunk_width(&self, k: usize) -> usize {
        let first_row = k * self.params.width;
        (self.layout.offsets[first_row + 1] - self.layout.offsets[first_row]) as usize
    }

    /// Row currently holding element `element`.
    #[inline]
    pub fn row_of_element(&self, element: ElementId) -> usize {
        self.layout.element_to_row[element as usize]
    }

    /// Element owning row `row`, or `SENTINEL` for a filler row.
    #[inline]
    pub fn element_of_row(&self, row: usize) -> ElementId {
        self.layout.row_to_element[row]
    }

    /// Exact particle count of element `element`.
    #[inline]
    pub fn count_of(&self, element: ElementId) -> usize {
        self.layout.counts[element as usize] as usize
    }

    /// Occupied slot range of element `element` (padding excluded).
    pub fn slot_range(&self, element: ElementId) -> std::ops::Range<usize> {
        let row = self.row_of_element(element);
        let start = self.layout.offsets[row] as usize;
        start..start + self.count_of(element)
    }

    /// Row-indexed range offsets, length `num_rows + 1`.
    #[inline]
    pub fn offsets(&self) -> &[SlotId] {
        &self.layout.offsets
    }

    /// Per-slot validity mask: owning element, or `SENTINEL` for padding.
    #[inline]
    pub fn slot_elements(&self) -> &[ElementId] {
        &self.layout.slot_element
    }

    /// Visits every slot in parallel, blocked by chunk. Padding lanes are
    /// visited with `occupied == false` so lock-step consumers can mask.
    pub fn par_for_each_slot<F>(&self, visit: F)
    where
        F: Fn(ElementId, SlotId, bool) + Sync,
    {
        let width = self.params.width;
        let layout = &self.layout;
        (0..self.num_chunks()).into_par_iter().for_each(|k| {
            for row in k * width..(k + 1) * width {
                let element = layout.row_to_element[row];
                for slot in layout.offsets[row]..layout.offsets[row + 1] {
                    let occupied = layout.slot_element[slot as usize] != SENTINEL;
                    visit(element, slot, occupied);
                }
            }
        });
    }

    /// Recomputes row order and padded offsets for the given counts.
    fn plan_layout(
        &self,
        counts: &[i32],
    ) -> (Vec<ElementId>, Vec<usize>, Vec<SlotId>) {
        let width = self.params.width;
        let num_rows = self.num_rows();

        let mut row_to_element = sigma_sort(counts, self.params.sigma);
        row_to_element.resize(num_rows, SENTINEL);

        let mut element_to_row = vec![0usize; self.num_elements];
        for (row, &element) in row_to_element.iter().enumerate() {
            if element != SENTINEL {
                element_to_row[element as usize] = row;
            }
        }

        let mut offsets = Vec::with_capacity(num_rows + 1);
        offsets.push(0);
        let mut total: SlotId = 0;
        for k in 0..num_rows / width {
            let rows = &row_to_element[k * width..(k + 1) * width];
            let chunk_max = rows
                .iter()
                .filter(|&&e| e != SENTINEL)
                .map(|&e| counts[e as usize])
                .max()
                .unwrap_or(0);
            for _ in rows {
                total += chunk_max;
                offsets.push(total);
            }
        }
        (row_to_element, element_to_row, offsets)
    }
}

/// Builds the per-slot validity mask: each row's occupied prefix carries its
/// element, the padded remainder carries `SENTINEL`. Rows own disjoint slot
/// ranges, so the parallel writes cannot overlap.
fn build_slot_mask(
    row_to_element: &[ElementId],
    offsets: &[SlotId],
    counts: &[i32],
) -> Vec<ElementId> {
    let capacity = offsets[row_to_element.len()] as usize;
    let mut mask = vec![SENTINEL; capacity];
    let ptr = SendPtr::new(mask.as_mut_ptr());
    row_to_element.par_iter().enumerate().for_each(|(row, &element)| {
        if element != SENTINEL {
            let start = offsets[row] as usize;
            let count = counts[element as usize] as usize;
            for slot in start..start + count {
                // SAFETY: row slot ranges are disjoint and within capacity.
                unsafe {
                    *ptr.get().add(slot) = element;
                }
            }
        }
    });
    mask
}

impl ParticleStore for ChunkedStore {
    fn num_elements(&self) -> usize {
        self.num_elements
    }

    fn num_particles(&self) -> usize {
        self.layout.num_particles
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
        for row in 0..self.num_rows() {
            let element = self.layout.row_to_element[row];
            for slot in self.layout.offsets[row]..self.layout.offsets[row + 1] {
                let occupied = self.layout.slot_element[slot as usize] != SENTINEL;
                visit(element, slot, occupied);
            }
        }
    }

    fn rebuild(
        &mut self,
        target_element: &[ElementId],
        incoming_element: &[ElementId],
        incoming_data: &ColumnSet,
    ) -> StoreResult<()> {
        let _whole = span("rebuild/chunked");
        let n = self.num_elements;

        if target_element.len() != self.capacity() {
            return Err(RebuildError::from(LengthMismatchError {
                what: "target_element",
                expected: self.capacity(),
                actual: target_element.len(),
            })
            .into());
        }
        // Padding lanes never migrate; whatever the caller supplied for
        // them is masked to a sentinel before validation and counting.
        let masked: Vec<ElementId> = target_element
            .par_iter()
            .enumerate()
            .map(|(slot, &target)| {
                if self.layout.slot_element[slot] == SENTINEL {
                    SENTINEL
                } else {
                    target
                }
            })
            .collect();
        validate_targets(&masked, self.capacity(), n)?;
        validate_incoming(incoming_element, incoming_data, n)?;
        if incoming_data.attributes() != self.layout.data.attributes() {
            return Err(ColumnError::AttributeMismatch.into());
        }

        let counts = {
            let _g = span("rebuild/count");
            let counts = zeroed_counts(n);
            tally(&counts, &masked);
            tally(&counts, incoming_element);
            snapshot_counts(&counts)
        };
        let num_particles = counts.iter().map(|&c| c as usize).sum();

        let (row_to_element, element_to_row, offsets) = {
            let _g = span("rebuild/scan");
            self.plan_layout(&counts)
        };
        let capacity = offsets[row_to_element.len()] as usize;

        let slot_element = build_slot_mask(&row_to_element, &offsets, &counts);
        let mut fresh = self.layout.data.clone_empty(capacity);
        let cursor = RowCursor::from_starts(&offsets[..row_to_element.len()]);

        {
            let _g = span("rebuild/scatter_existing");
            let dest =
                claim_destinations(&masked, &cursor, |e| element_to_row[e as usize]);
            self.layout.data.scatter_to(&mut fresh, &dest)?;
        }
        {
            let _g = span("rebuild/scatter_incoming");
            let dest = claim_destinations(incoming_element, &cursor, |e| {
                element_to_row[e as usize]
            });
            incoming_data.scatter_to(&mut fresh, &dest)?;
        }

        // Commit: one assignment swaps in the fully built generation.
        self.layout = ChunkedLayout {
            offsets,
            row_to_element,
            element_to_row,
            counts,
            slot_element,
            num_particles,
            data: fresh,
        };
        Ok(())
    }
}
