//! # GPU Device Mirror
//!
//! This module mirrors a particle container's storage into `wgpu` buffers so
//! that compute shaders can consume the element-grouped layout directly.
//!
//! The mirror is an **optional, feature-gated extension** (`feature = "gpu"`).
//! It does not schedule or dispatch kernels; it only owns the device copies
//! of the container's columns and the two explicit boundary operations:
//!
//! 1. **Upload** — ids, range offsets, the slot validity mask, and every
//!    attribute column are copied into storage buffers after a rebuild or
//!    after host-side attribute writes.
//! 2. **Download** — ids and attribute columns mutated on the device are
//!    copied back into host storage. Offsets and the mask are
//!    host-authoritative and never downloaded.
//!
//! Transfers are explicit: nothing synchronizes implicitly, and a transfer
//! happens only when the corresponding dirty / pending flag is raised.
//!
//! ## Module structure
//!
//! * [`context`] — device and queue initialization
//! * [`mirror`] — per-column buffer mirroring and boundary transfers

#![cfg(feature = "gpu")]

mod context;
mod mirror;

pub use context::GpuContext;
pub use mirror::{GpuBindingDesc, MirrorSource, StoreMirror};
