//! The storage engine proper.
//!
//! Everything element-grouped lives here: identifier types, the attribute
//! registry, typed column storage, the shared rebuild machinery, and the two
//! container layouts built on top of it.

pub mod attribute;
pub mod chunked;
pub mod column;
pub mod error;
pub mod packed;
pub mod rebuild;
pub mod types;
