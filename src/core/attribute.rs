//! Global attribute registry.
//!
//! Particle attributes (position, velocity, charge, ...) are declared once at
//! startup by registering their Rust type. Each registered type receives a
//! stable compact [`AttributeId`] together with a factory that allocates a
//! zero-initialized type-erased column of a given capacity. Containers then
//! describe their schema as an [`AttributeSet`] of registered ids and build
//! their column storage through the registry.
//!
//! ## Lifecycle
//! 1. `register_attribute::<T>()` for every attribute type the program uses.
//! 2. `freeze_attributes()` — after this, registration fails with
//!    [`RegistryError::Frozen`].
//! 3. Containers are created; each looks up ids via `attribute_id_of::<T>()`
//!    and allocates columns via `make_column`.
//!
//! Registration is idempotent per type: registering the same `T` twice
//! returns the same id. The registry lives in a process-wide
//! `OnceLock<RwLock<..>>`.

use std::any::{type_name, TypeId};
use std::sync::{OnceLock, RwLock};

use crate::core::column::{Column, TypeErasedColumn};
use crate::core::error::{RegistryError, StoreResult};
use crate::core::types::{AttributeId, ATTRIBUTE_CAP};

/// Metadata recorded for each registered attribute kind.
#[derive(Clone, Copy, Debug)]
pub struct AttributeDesc {
    /// Compact runtime id.
    pub id: AttributeId,

    /// Rust type name, for diagnostics.
    pub name: &'static str,

    /// `TypeId` of the element type.
    pub type_id: TypeId,

    /// `size_of::<T>()`.
    pub size: usize,

    /// `align_of::<T>()`.
    pub align: usize,
}

type ColumnFactory = fn(usize) -> Box<dyn TypeErasedColumn>;

struct Registry {
    descs: Vec<AttributeDesc>,
    factories: Vec<ColumnFactory>,
    frozen: bool,
}

impl Registry {
    fn new() -> Self {
        Self {
            descs: Vec::new(),
            factories: Vec::new(),
            frozen: false,
        }
    }

    fn lookup(&self, type_id: TypeId) -> Option<AttributeId> {
        self.descs
            .iter()
            .find(|d| d.type_id == type_id)
            .map(|d| d.id)
    }
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::new()))
}

fn make_column_of<T>(capacity: usize) -> Box<dyn TypeErasedColumn>
where
    T: Copy + Default + Send + Sync + 'static,
{
    Box::new(Column::<T>::new(capacity))
}

/// Registers `T` as an attribute kind and returns its id.
///
/// Idempotent: a second registration of the same type returns the id
/// assigned the first time. Fails once the registry is frozen or full.
pub fn register_attribute<T>() -> StoreResult<AttributeId>
where
    T: Copy + Default + Send + Sync + 'static,
{
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());

    if let Some(id) = reg.lookup(TypeId::of::<T>()) {
        return Ok(id);
    }
    if reg.frozen {
        return Err(RegistryError::Frozen.into());
    }
    if reg.descs.len() >= ATTRIBUTE_CAP {
        return Err(RegistryError::CapacityExceeded.into());
    }

    let id = reg.descs.len() as AttributeId;
    reg.descs.push(AttributeDesc {
        id,
        name: type_name::<T>(),
        type_id: TypeId::of::<T>(),
        size: std::mem::size_of::<T>(),
        align: std::mem::align_of::<T>(),
    });
    reg.factories.push(make_column_of::<T>);
    Ok(id)
}

/// Locks the registry. Subsequent registrations of new types fail.
pub fn freeze_attributes() {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    reg.frozen = true;
}

/// Looks up the id previously assigned to `T`.
pub fn attribute_id_of<T>() -> StoreResult<AttributeId>
where
    T: 'static,
{
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    reg.lookup(TypeId::of::<T>())
        .ok_or_else(|| RegistryError::Unregistered(type_name::<T>()).into())
}

/// Returns the recorded metadata for `id`, if registered.
pub fn attribute_description(id: AttributeId) -> Option<AttributeDesc> {
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    reg.descs.get(id as usize).copied()
}

/// Allocates a zero-initialized type-erased column for attribute `id`.
pub fn make_column(id: AttributeId, capacity: usize) -> StoreResult<Box<dyn TypeErasedColumn>> {
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    let factory = reg
        .factories
        .get(id as usize)
        .ok_or(RegistryError::Unregistered("<unknown attribute id>"))?;
    Ok(factory(capacity))
}
