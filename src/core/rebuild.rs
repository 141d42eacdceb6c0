//! Shared rebuild machinery and the container trait.
//!
//! Both layouts rebuild through the same phase skeleton:
//!
//! 1. **validate** — every precondition is checked before any mutation;
//! 2. **count** — parallel atomic tally of particles per element;
//! 3. **scan** — exclusive prefix sum of counts into range offsets
//!    (layout-specific padding happens here);
//! 4. **scatter-existing** — surviving particles claim destination slots
//!    through an atomic [`RowCursor`] and copy into a freshly allocated
//!    column set;
//! 5. **scatter-incoming** — the incoming batch claims slots through the
//!    *same* cursor, so the two scatters compose without collisions;
//! 6. **commit** — the fully built layout value replaces the old one in a
//!    single assignment.
//!
//! Each phase is a single parallel-for; the join at the end of each
//! `par_iter` is the inter-phase barrier. Slot assignment order within a
//! phase is nondeterministic, and nothing here depends on it.

use std::sync::atomic::{AtomicI32, Ordering};

use rayon::prelude::*;

use crate::core::column::ColumnSet;
use crate::core::error::{
    ElementOutOfRangeError, LengthMismatchError, RebuildError, StoreResult,
};
use crate::core::types::{AttributeSet, ElementId, SlotId, SENTINEL};

// ─────────────────────────── input validation ───────────────────────────

/// Checks a migration target array: correct length, every entry `-1` or a
/// valid element index. Runs before any storage mutation.
pub(crate) fn validate_targets(
    targets: &[ElementId],
    expected_len: usize,
    num_elems: usize,
) -> Result<(), RebuildError> {
    if targets.len() != expected_len {
        return Err(LengthMismatchError {
            what: "target_element",
            expected: expected_len,
            actual: targets.len(),
        }
        .into());
    }
    for (index, &element) in targets.iter().enumerate() {
        if element != SENTINEL && !(0..num_elems as ElementId).contains(&element) {
            return Err(ElementOutOfRangeError {
                what: "target_element",
                index,
                element,
                num_elems,
            }
            .into());
        }
    }
    Ok(())
}

/// Checks an incoming batch: element array and data block agree in length,
/// and every incoming particle names a real element (`-1` is invalid here).
pub(crate) fn validate_incoming(
    incoming_element: &[ElementId],
    incoming_data: &ColumnSet,
    num_elems: usize,
) -> Result<(), RebuildError> {
    if incoming_data.capacity() != incoming_element.len() {
        return Err(LengthMismatchError {
            what: "incoming_data",
            expected: incoming_element.len(),
            actual: incoming_data.capacity(),
        }
        .into());
    }
    for (index, &element) in incoming_element.iter().enumerate() {
        if !(0..num_elems as ElementId).contains(&element) {
            return Err(ElementOutOfRangeError {
                what: "incoming_element",
                index,
                element,
                num_elems,
            }
            .into());
        }
    }
    Ok(())
}

// ───────────────────────────── count / scan ─────────────────────────────

/// Allocates a zeroed atomic counter array of `num_elems` entries.
pub(crate) fn zeroed_counts(num_elems: usize) -> Vec<AtomicI32> {
    std::iter::repeat_with(|| AtomicI32::new(0))
        .take(num_elems)
        .collect()
}

/// Parallel per-element tally: one increment per non-sentinel entry.
pub(crate) fn tally(counts: &[AtomicI32], elements: &[ElementId]) {
    elements.par_iter().for_each(|&element| {
        if element != SENTINEL {
            counts[element as usize].fetch_add(1, Ordering::Relaxed);
        }
    });
}

/// Snapshots atomic counters into a plain vector once counting is done.
pub(crate) fn snapshot_counts(counts: &[AtomicI32]) -> Vec<i32> {
    counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
}

/// Exclusive prefix sum. `offsets[i]` is the first slot of range `i`;
/// `offsets[n]` is the total. Always monotonically non-decreasing.
pub(crate) fn exclusive_scan(counts: &[i32]) -> Vec<SlotId> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    let mut total: SlotId = 0;
    offsets.push(0);
    for &count in counts {
        total += count;
        offsets.push(total);
    }
    offsets
}

// ───────────────────────────── row cursor ─────────────────────────────

/// Atomic slot-allocation cursor, one counter per destination range.
///
/// Initialized to each range's start offset. [`claim`](Self::claim) is an
/// atomic fetch-and-increment, so concurrent claims on the same range
/// receive distinct consecutive slots. Correct counting guarantees a cursor
/// never runs past its range end.
pub(crate) struct RowCursor {
    next: Vec<AtomicI32>,
}

impl RowCursor {
    /// Builds a cursor from per-range start offsets (`offsets[..n]`).
    pub(crate) fn from_starts(starts: &[SlotId]) -> Self {
        Self {
            next: starts.iter().map(|&s| AtomicI32::new(s)).collect(),
        }
    }

    /// Claims the next free slot in range `row`.
    #[inline]
    pub(crate) fn claim(&self, row: usize) -> SlotId {
        self.next[row].fetch_add(1, Ordering::Relaxed)
    }
}

/// Builds a destination map by claiming one slot per non-sentinel entry.
///
/// `row_of` maps an element to its destination range index (identity for
/// the packed layout, the sigma-sorted row for the chunked layout). Entries
/// with a `-1` target receive a `-1` destination.
pub(crate) fn claim_destinations<F>(
    targets: &[ElementId],
    cursor: &RowCursor,
    row_of: F,
) -> Vec<SlotId>
where
    F: Fn(ElementId) -> usize + Sync,
{
    targets
        .par_iter()
        .map(|&element| {
            if element == SENTINEL {
                SENTINEL as SlotId
            } else {
                cursor.claim(row_of(element))
            }
        })
        .collect()
}

// ───────────────────────────── container trait ─────────────────────────────

/// External surface shared by both particle containers.
///
/// Readers observe either the entire pre-rebuild state or the entire
/// post-rebuild state; `rebuild` commits by replacing the layout value in
/// one assignment, never by piecemeal mutation.
pub trait ParticleStore {
    /// Number of mesh elements the container is indexed by.
    fn num_elements(&self) -> usize;

    /// Number of live particles (occupied slots).
    fn num_particles(&self) -> usize;

    /// Total slot capacity, padding included.
    fn capacity(&self) -> usize;

    /// The attribute schema of the column storage.
    fn attributes(&self) -> AttributeSet;

    /// Shared view of the column storage.
    fn data(&self) -> &ColumnSet;

    /// Exclusive view of the column storage, for writing attribute values
    /// into occupied slots between rebuilds.
    fn data_mut(&mut self) -> &mut ColumnSet;

    /// Visits every slot as `(element, slot, occupied)`.
    ///
    /// Packed containers visit occupied slots only; chunked containers also
    /// visit padding lanes with `occupied == false`.
    fn for_each_slot(&self, visit: &mut dyn FnMut(ElementId, SlotId, bool));

    /// Restores the element-grouped storage property after migration.
    ///
    /// `target_element[i]` is slot `i`'s new element, or `-1` to remove the
    /// particle. `incoming_element` and `incoming_data` describe particles
    /// entering this container; an incoming target must name a real
    /// element. On a precondition error the container is unchanged.
    fn rebuild(
        &mut self,
        target_element: &[ElementId],
        incoming_element: &[ElementId],
        incoming_data: &ColumnSet,
    ) -> StoreResult<()>;
}
