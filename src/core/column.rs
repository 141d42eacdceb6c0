//! Typed structure-of-arrays column storage.
//!
//! A container's particle data lives in a [`ColumnSet`]: one contiguous
//! [`Column<T>`] per registered attribute plus a dedicated particle-id
//! column. All columns of a set share a single capacity and a single slot
//! indexing, so slot `i` of every column belongs to the same particle.
//!
//! The one data-movement primitive is the **scatter**: given an index map
//! with one destination slot per source slot (`-1` for "discard"), every
//! column copies its surviving values to a destination set in parallel. The
//! rebuild protocol is built entirely out of this primitive.
//!
//! ## Safety
//! Parallel scatter writes through a raw pointer shared across rayon
//! workers. Soundness rests on the caller contract that non-sentinel map
//! entries are pairwise distinct (each destination slot written at most
//! once); destination bounds are validated up front.

use std::any::{type_name, Any, TypeId};

use rayon::prelude::*;

use crate::core::attribute::make_column;
use crate::core::error::{
    ColumnError, LengthMismatchError, StoreResult, TypeMismatchError,
};
use crate::core::types::{AttributeId, AttributeSet, ParticleId, SlotId};

// ─────────────────────────── raw byte views ───────────────────────────

/// Reinterprets a typed slice as raw bytes.
///
/// ## Safety
/// `T` must have no padding-dependent interpretation for the caller's use;
/// the view is only valid for the lifetime of `data`.
pub unsafe fn cast_bytes<T>(data: &[T]) -> &[u8] {
    // SAFETY: data is a valid allocation of len * size_of::<T>() bytes.
    unsafe {
        std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data))
    }
}

/// Reinterprets a typed slice as mutable raw bytes.
///
/// ## Safety
/// As [`cast_bytes`], and the caller must not write byte patterns that are
/// invalid for `T`.
pub unsafe fn cast_bytes_mut<T>(data: &mut [T]) -> &mut [u8] {
    // SAFETY: same layout argument as cast_bytes; exclusive borrow held.
    unsafe {
        std::slice::from_raw_parts_mut(
            data.as_mut_ptr().cast::<u8>(),
            std::mem::size_of_val(data),
        )
    }
}

/// Raw pointer wrapper that may cross rayon worker threads.
///
/// Writes through the pointer are only sound when the surrounding scatter
/// guarantees disjoint destinations per worker.
pub(crate) struct SendPtr<T>(*mut T);

unsafe impl<T: Send> Send for SendPtr<T> {}
unsafe impl<T: Send> Sync for SendPtr<T> {}

impl<T> SendPtr<T> {
    pub(crate) fn new(ptr: *mut T) -> Self {
        Self(ptr)
    }

    pub(crate) fn get(&self) -> *mut T {
        self.0
    }
}

// ───────────────────────────── typed column ─────────────────────────────

/// A contiguous typed column of per-slot values.
///
/// Freshly created columns hold `capacity` default values; occupied slots
/// are overwritten by scatters.
#[derive(Debug, Clone)]
pub struct Column<T> {
    data: Vec<T>,
}

impl<T: Copy + Default + Send + Sync + 'static> Column<T> {
    /// Allocates a column of `capacity` default-initialized slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity],
        }
    }

    /// Shared view of the slot values.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Exclusive view of the slot values.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Object-safe surface of a typed column.
///
/// Lets a [`ColumnSet`] hold columns of heterogeneous element types behind
/// one vtable while containers recover typed slices through `as_any`.
pub trait TypeErasedColumn: Send + Sync {
    /// Number of slots.
    fn len(&self) -> usize;

    /// Returns `true` if the column has zero slots.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `TypeId` of the element type.
    fn element_type_id(&self) -> TypeId;

    /// Element type name, for diagnostics.
    fn element_type_name(&self) -> &'static str;

    /// Upcast for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Allocates a fresh default-initialized column of the same element
    /// type with `capacity` slots.
    fn clone_empty(&self, capacity: usize) -> Box<dyn TypeErasedColumn>;

    /// Raw byte view of the column storage.
    fn bytes(&self) -> &[u8];

    /// Mutable raw byte view of the column storage.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Scatters this column's values into `dst`.
    ///
    /// For every source slot `i` with `index_map[i] != -1`, writes
    /// `dst[index_map[i]] = self[i]`, in parallel. Sentinel entries are
    /// skipped. Non-sentinel entries must be pairwise distinct; destination
    /// bounds are checked before any write.
    fn scatter_into(
        &self,
        dst: &mut dyn TypeErasedColumn,
        index_map: &[SlotId],
    ) -> Result<(), ColumnError>;
}

impl<T: Copy + Default + Send + Sync + 'static> TypeErasedColumn for Column<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_empty(&self, capacity: usize) -> Box<dyn TypeErasedColumn> {
        Box::new(Column::<T>::new(capacity))
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: T is Copy; the view borrows self.
        unsafe { cast_bytes(&self.data) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: T is Copy; any byte pattern written must come from a
        // value of T (upload paths copy whole T-sized records).
        unsafe { cast_bytes_mut(&mut self.data) }
    }

    fn scatter_into(
        &self,
        dst: &mut dyn TypeErasedColumn,
        index_map: &[SlotId],
    ) -> Result<(), ColumnError> {
        if dst.element_type_id() != TypeId::of::<T>() {
            return Err(TypeMismatchError {
                expected: TypeId::of::<T>(),
                actual: dst.element_type_id(),
            }
            .into());
        }
        if index_map.len() != self.data.len() {
            return Err(LengthMismatchError {
                what: "index_map",
                expected: self.data.len(),
                actual: index_map.len(),
            }
            .into());
        }

        let dst_col = dst
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .ok_or(ColumnError::InternalInvariant("downcast after type check"))?;
        let dst_len = dst_col.data.len();

        let in_range = index_map
            .par_iter()
            .all(|&d| d < 0 || (d as usize) < dst_len);
        if !in_range {
            return Err(ColumnError::InternalInvariant(
                "destination slot outside column capacity",
            ));
        }

        scatter_values(&self.data, &mut dst_col.data, index_map);
        Ok(())
    }
}

/// Parallel scatter of `src[i]` into `dst[index_map[i]]`, skipping `-1`.
///
/// Bounds are the caller's responsibility (checked by `scatter_into`);
/// distinctness of destinations is the rebuild protocol's guarantee.
pub(crate) fn scatter_values<T: Copy + Send + Sync>(
    src: &[T],
    dst: &mut [T],
    index_map: &[SlotId],
) {
    debug_assert_eq!(src.len(), index_map.len());
    let dst_ptr = SendPtr::new(dst.as_mut_ptr());
    src.par_iter().enumerate().for_each(|(i, value)| {
        let d = index_map[i];
        if d >= 0 {
            // SAFETY: d < dst.len() was validated by the caller, and the
            // protocol guarantees no two slots claim the same destination.
            unsafe {
                *dst_ptr.get().add(d as usize) = *value;
            }
        }
    });
}

// ───────────────────────────── column set ─────────────────────────────

/// The full data block of a particle container.
///
/// Holds the dedicated particle-id column and one type-erased column per
/// attribute in the container's schema. All columns share `capacity` slots.
/// A `ColumnSet` is exclusively owned by its container and dropped with it.
pub struct ColumnSet {
    capacity: usize,
    attributes: AttributeSet,
    ids: Column<ParticleId>,
    columns: Vec<(AttributeId, Box<dyn TypeErasedColumn>)>,
}

impl ColumnSet {
    /// Allocates zero-initialized storage for `capacity` slots with one
    /// column per attribute in `attributes`.
    pub fn create(attributes: AttributeSet, capacity: usize) -> StoreResult<Self> {
        let mut columns = Vec::with_capacity(attributes.len());
        for id in attributes.iter() {
            columns.push((id, make_column(id, capacity)?));
        }
        Ok(Self {
            capacity,
            attributes,
            ids: Column::new(capacity),
            columns,
        })
    }

    /// Allocates a fresh set with the same schema and `capacity` slots.
    pub fn clone_empty(&self, capacity: usize) -> Self {
        Self {
            capacity,
            attributes: self.attributes,
            ids: Column::new(capacity),
            columns: self
                .columns
                .iter()
                .map(|(id, col)| (*id, col.clone_empty(capacity)))
                .collect(),
        }
    }

    /// Shared slot capacity of every column in the set.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The schema this set was created with.
    #[inline]
    pub fn attributes(&self) -> AttributeSet {
        self.attributes
    }

    /// Shared view of the particle-id column.
    #[inline]
    pub fn ids(&self) -> &[ParticleId] {
        self.ids.as_slice()
    }

    /// Exclusive view of the particle-id column.
    #[inline]
    pub fn ids_mut(&mut self) -> &mut [ParticleId] {
        self.ids.as_mut_slice()
    }

    /// Iterates the attribute columns with their ids.
    pub fn iter_columns(
        &self,
    ) -> impl Iterator<Item = (AttributeId, &dyn TypeErasedColumn)> {
        self.columns.iter().map(|(id, col)| (*id, col.as_ref()))
    }

    /// Iterates the attribute columns mutably with their ids.
    pub fn iter_columns_mut(
        &mut self,
    ) -> impl Iterator<Item = (AttributeId, &mut (dyn TypeErasedColumn + 'static))> {
        self.columns.iter_mut().map(|(id, col)| (*id, col.as_mut()))
    }

    fn find(&self, id: AttributeId) -> Result<&dyn TypeErasedColumn, ColumnError> {
        self.columns
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, col)| col.as_ref())
            .ok_or(ColumnError::UnknownAttribute(id))
    }

    /// Shared typed view of attribute `id`'s column.
    pub fn view<T: Copy + Default + Send + Sync + 'static>(
        &self,
        id: AttributeId,
    ) -> StoreResult<&[T]> {
        let col = self.find(id)?;
        let typed = col.as_any().downcast_ref::<Column<T>>().ok_or_else(|| {
            ColumnError::TypeMismatch(TypeMismatchError {
                expected: col.element_type_id(),
                actual: TypeId::of::<T>(),
            })
        })?;
        Ok(typed.as_slice())
    }

    /// Exclusive typed view of attribute `id`'s column.
    pub fn view_mut<T: Copy + Default + Send + Sync + 'static>(
        &mut self,
        id: AttributeId,
    ) -> StoreResult<&mut [T]> {
        let col = self
            .columns
            .iter_mut()
            .find(|(cid, _)| *cid == id)
            .map(|(_, col)| col.as_mut())
            .ok_or(ColumnError::UnknownAttribute(id))?;
        let expected = col.element_type_id();
        let typed = col.as_any_mut().downcast_mut::<Column<T>>().ok_or_else(|| {
            ColumnError::TypeMismatch(TypeMismatchError {
                expected,
                actual: TypeId::of::<T>(),
            })
        })?;
        Ok(typed.as_mut_slice())
    }

    /// Scatters every column (ids included) into `dst` through `index_map`.
    ///
    /// `index_map[i]` is the destination slot for source slot `i`, or `-1`
    /// to discard. Schemas must match; non-sentinel destinations must be
    /// pairwise distinct.
    pub fn scatter_to(&self, dst: &mut ColumnSet, index_map: &[SlotId]) -> StoreResult<()> {
        if dst.attributes != self.attributes {
            return Err(ColumnError::AttributeMismatch.into());
        }
        if index_map.len() != self.capacity {
            return Err(ColumnError::Length(LengthMismatchError {
                what: "index_map",
                expected: self.capacity,
                actual: index_map.len(),
            })
            .into());
        }
        let dst_len = dst.capacity;
        let in_range = index_map
            .par_iter()
            .all(|&d| d < 0 || (d as usize) < dst_len);
        if !in_range {
            return Err(ColumnError::InternalInvariant(
                "destination slot outside column capacity",
            )
            .into());
        }

        scatter_values(self.ids.as_slice(), dst.ids.as_mut_slice(), index_map);
        for ((src_id, src_col), (dst_id, dst_col)) in
            self.columns.iter().zip(dst.columns.iter_mut())
        {
            if src_id != dst_id {
                return Err(ColumnError::AttributeMismatch.into());
            }
            src_col.scatter_into(dst_col.as_mut(), index_map)?;
        }
        Ok(())
    }
}
