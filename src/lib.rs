//! # Particle Store
//!
//! Mesh-based particle storage engine with a data-parallel rebuild protocol.
//!
//! Particles live in structure-of-arrays column storage grouped by the mesh
//! element that owns them. After a migration step scatters particles across
//! elements, a rebuild restores the grouping in a fixed sequence of parallel
//! phases (count, scan, scatter, commit) whose only slot-assignment
//! primitive is an atomic fetch-and-increment.
//!
//! ## Design Goals
//! - Element-grouped SoA storage for cache- and lane-friendly iteration
//! - Two layouts: exact packed, and chunked with lock-step padded rows
//! - One parallel-for per rebuild phase, no locks, no ordering assumptions
//! - Safe, explicit data access
//!
//! This crate builds as both:
//! - `rlib` (for Rust usage & integration tests)
//! - `cdylib` (for FFI / DLL usage)

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod core;
pub mod gpu;
pub mod profiling;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Identifier types and layout parameters

pub use self::core::types::{
    build_attribute_set,
    AttributeId,
    AttributeSet,
    ChunkParams,
    ElementId,
    ParticleId,
    SlotId,
    ATTRIBUTE_CAP,
    SENTINEL,
};

// Attribute registry

pub use self::core::attribute::{
    attribute_description,
    attribute_id_of,
    freeze_attributes,
    register_attribute,
    AttributeDesc,
};

// Column storage

pub use self::core::column::{Column, ColumnSet, TypeErasedColumn};

// Containers

pub use self::core::rebuild::ParticleStore;
pub use self::core::packed::PackedStore;
pub use self::core::chunked::ChunkedStore;

pub use self::core::error::{
    ColumnError,
    ElementOutOfRangeError,
    LengthMismatchError,
    RebuildError,
    RegistryError,
    StoreError,
    StoreResult,
    TypeMismatchError,
};

#[cfg(feature = "gpu")]
pub use self::gpu::{GpuContext, StoreMirror};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used storage types.
///
/// Import with:
/// ```rust
/// use particle_store::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        build_attribute_set,
        freeze_attributes,
        attribute_id_of,
        register_attribute,
        AttributeSet,
        ChunkParams,
        ChunkedStore,
        ColumnSet,
        ElementId,
        PackedStore,
        ParticleId,
        ParticleStore,
        SlotId,
        StoreResult,
        SENTINEL,
    };
}
