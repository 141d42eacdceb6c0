//! Error types for column storage and the rebuild protocol.
//!
//! This module declares focused, composable error types used across the
//! storage engine. Each error carries enough context to make failures
//! actionable while remaining small and cheap to pass around or convert into
//! the aggregate [`StoreError`].
//!
//! ## Taxonomy
//! * **Precondition violations** ([`LengthMismatchError`],
//!   [`ElementOutOfRangeError`]) — the caller breached the rebuild contract
//!   (wrong array length, invalid element index, `-1` target on an incoming
//!   particle). These are detected *before* any storage mutation; the
//!   container is untouched when they are returned.
//! * **Column misuse** ([`ColumnError`]) — type or schema mismatches when
//!   accessing or scattering typed columns.
//! * **Registry misuse** ([`RegistryError`]) — registering after freeze,
//!   exceeding capacity, or looking up an unregistered type.
//! * **Internal invariant failures** — conditions the count/scan/scatter
//!   algebra makes structurally impossible (e.g. a destination slot outside
//!   its element's range). If one surfaces, it indicates a bug in the
//!   engine, not a recoverable caller error.
//!
//! Capacity growth or shrink is never an error: the rebuild recomputes
//! capacity from the count phase every step.
//!
//! ## Typical flow
//! Low-level operations return the small dedicated types; orchestration code
//! uses `?` to bubble them into [`RebuildError`] or [`StoreError`], which
//! callers can match on for control flow or log with readable messages.

use std::any::TypeId;
use std::fmt;

use crate::core::types::{AttributeId, ElementId};

/// Convenient alias for results carrying [`StoreError`].
pub type StoreResult<T> = Result<T, StoreError>;

/// Returned when a caller-supplied array has the wrong length.
///
/// ### Fields
/// * `what` — which input was mis-sized (e.g. `"targetElement"`).
/// * `expected` — the length the contract requires.
/// * `actual` — the length the caller provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMismatchError {
    /// Name of the mis-sized input.
    pub what: &'static str,

    /// Required length.
    pub expected: usize,

    /// Provided length.
    pub actual: usize,
}

impl fmt::Display for LengthMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} has length {} (expected {})",
            self.what, self.actual, self.expected
        )
    }
}

impl std::error::Error for LengthMismatchError {}

/// Returned when an element index in a migration input is invalid.
///
/// Covers both out-of-range indices and a `-1` target on an incoming
/// particle (an incoming particle must always name a real element).
///
/// ### Fields
/// * `what` — which input held the offending value.
/// * `index` — position of the offending entry within that input.
/// * `element` — the offending element value.
/// * `num_elems` — the exclusive upper bound for valid element indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementOutOfRangeError {
    /// Name of the input holding the offending value.
    pub what: &'static str,

    /// Position of the offending entry.
    pub index: usize,

    /// The offending element value.
    pub element: ElementId,

    /// Exclusive upper bound for valid element indices.
    pub num_elems: usize,
}

impl fmt::Display for ElementOutOfRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] = {} is not a valid element index (num_elems {})",
            self.what, self.index, self.element, self.num_elems
        )
    }
}

impl std::error::Error for ElementOutOfRangeError {}

/// Returned when a typed column access does not match the column's element
/// type.
///
/// ### Fields
/// * `expected` — the [`TypeId`] the column stores.
/// * `actual` — the [`TypeId`] the caller requested or provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatchError {
    /// Column's declared element type.
    pub expected: TypeId,

    /// Requested or provided type.
    pub actual: TypeId,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "column type mismatch: expected {:?}, actual {:?}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for TypeMismatchError {}

/// Aggregate error for column storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnError {
    /// The dynamic type of a value or view did not match the column type.
    TypeMismatch(TypeMismatchError),

    /// The requested attribute is not part of this column set's schema.
    UnknownAttribute(AttributeId),

    /// Source and destination column sets carry different attribute schemas.
    AttributeMismatch,

    /// An index map or column view had the wrong length.
    Length(LengthMismatchError),

    /// A structural invariant of column storage was violated.
    InternalInvariant(&'static str),
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnError::TypeMismatch(e) => write!(f, "{e}"),
            ColumnError::UnknownAttribute(id) => {
                write!(f, "attribute {id} is not part of this column set")
            }
            ColumnError::AttributeMismatch => {
                f.write_str("source and destination column sets have different schemas")
            }
            ColumnError::Length(e) => write!(f, "{e}"),
            ColumnError::InternalInvariant(what) => {
                write!(f, "column storage invariant violated: {what}")
            }
        }
    }
}

impl std::error::Error for ColumnError {}

impl From<TypeMismatchError> for ColumnError {
    fn from(e: TypeMismatchError) -> Self {
        ColumnError::TypeMismatch(e)
    }
}

impl From<LengthMismatchError> for ColumnError {
    fn from(e: LengthMismatchError) -> Self {
        ColumnError::Length(e)
    }
}

/// Errors from the global attribute registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Registration was attempted after [`freeze_attributes`] was called.
    ///
    /// [`freeze_attributes`]: crate::core::attribute::freeze_attributes
    Frozen,

    /// The registry is full (`ATTRIBUTE_CAP` kinds already registered).
    CapacityExceeded,

    /// The requested type was never registered.
    Unregistered(&'static str),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Frozen => f.write_str("attribute registry is frozen"),
            RegistryError::CapacityExceeded => {
                f.write_str("attribute registry capacity exceeded")
            }
            RegistryError::Unregistered(name) => {
                write!(f, "attribute type {name} is not registered")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors surfaced by a `rebuild` call.
///
/// All variants except `InternalInvariant` are caller contract breaches and
/// are returned before any storage mutation; the container remains in its
/// pre-call state. `InternalInvariant` reports a condition that correct
/// counting and scanning make impossible (the slot-collision class); it
/// indicates an engine bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildError {
    /// A migration input had the wrong length.
    Length(LengthMismatchError),

    /// A migration input named an invalid element.
    ElementOutOfRange(ElementOutOfRangeError),

    /// A column-level failure during scatter or allocation.
    Column(ColumnError),

    /// A structurally-impossible condition was observed.
    InternalInvariant(&'static str),
}

impl fmt::Display for RebuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildError::Length(e) => write!(f, "{e}"),
            RebuildError::ElementOutOfRange(e) => write!(f, "{e}"),
            RebuildError::Column(e) => write!(f, "rebuild column failure: {e}"),
            RebuildError::InternalInvariant(what) => {
                write!(f, "rebuild invariant violated: {what}")
            }
        }
    }
}

impl std::error::Error for RebuildError {}

impl From<LengthMismatchError> for RebuildError {
    fn from(e: LengthMismatchError) -> Self {
        RebuildError::Length(e)
    }
}

impl From<ElementOutOfRangeError> for RebuildError {
    fn from(e: ElementOutOfRangeError) -> Self {
        RebuildError::ElementOutOfRange(e)
    }
}

impl From<ColumnError> for RebuildError {
    fn from(e: ColumnError) -> Self {
        RebuildError::Column(e)
    }
}

/// Top-level error type for the storage engine.
///
/// `From` conversions are implemented for every lower-level error so that
/// orchestration code can use `?` and still return a single expressive type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A rebuild failed.
    Rebuild(RebuildError),

    /// A column storage operation failed.
    Column(ColumnError),

    /// An attribute registry operation failed.
    Registry(RegistryError),

    /// A GPU boundary operation failed.
    #[cfg(feature = "gpu")]
    Gpu(GpuError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Rebuild(e) => write!(f, "{e}"),
            StoreError::Column(e) => write!(f, "{e}"),
            StoreError::Registry(e) => write!(f, "{e}"),
            #[cfg(feature = "gpu")]
            StoreError::Gpu(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<RebuildError> for StoreError {
    fn from(e: RebuildError) -> Self {
        StoreError::Rebuild(e)
    }
}

impl From<ColumnError> for StoreError {
    fn from(e: ColumnError) -> Self {
        StoreError::Column(e)
    }
}

impl From<RegistryError> for StoreError {
    fn from(e: RegistryError) -> Self {
        StoreError::Registry(e)
    }
}

/// Failure of a host-device transfer or device setup.
#[cfg(feature = "gpu")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuError {
    /// Human-readable description of the failure.
    pub message: String,
}

#[cfg(feature = "gpu")]
impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpu operation failed: {}", self.message)
    }
}

#[cfg(feature = "gpu")]
impl std::error::Error for GpuError {}

#[cfg(feature = "gpu")]
impl From<GpuError> for StoreError {
    fn from(e: GpuError) -> Self {
        StoreError::Gpu(e)
    }
}
