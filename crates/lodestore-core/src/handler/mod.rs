//! # Type Handlers
//!
//! A type handler moves instances of one type between the object graph and
//! entity records. The protocol runs in phases so that cyclic graphs can be
//! rebuilt:
//!
//! - `store`: write header and fields; references become object ids
//! - `create`: allocate a bare instance and set its value fields
//! - `initialize_state`: set reference fields once every instance exists
//! - `update_state`: refresh a live instance (or validate an immutable one)
//! - `complete`: post-resolution fix-up, a no-op for ordinary types
//!
//! Capabilities are separate traits composed into [`TypeHandler`].

mod abstract_type;
mod custom;
mod entity;
mod field;

pub use abstract_type::AbstractTypeHandler;
pub use custom::{CustomTypeHandler, CustomTypeHandlerBuilder, FieldValues};
pub use entity::EntityTypeHandler;
pub use field::{BinaryField, Primitive};

use crate::binary::{BinaryWriter, EntityData};
use crate::definition::TypeDefinition;
use crate::{LodestoreError, ObjRef, ObjectId, TypeId};
use std::any::Any;

/// A heap-allocated instance living in the object graph.
pub type Instance = Box<dyn Any + Send + Sync>;

// =============================================================================
// CALLBACKS
// =============================================================================

/// Turns live references into persisted object ids during `store`.
pub trait StoreHandler {
    fn apply(&mut self, reference: ObjRef) -> Result<ObjectId, LodestoreError>;
}

/// Resolves persisted object ids to live instances during load.
pub trait LoadHandler {
    /// `Ok(None)` for the null id; `UnresolvedReference` for unknown ids.
    fn lookup_reference(&self, id: ObjectId) -> Result<Option<ObjRef>, LodestoreError>;
}

// =============================================================================
// RUNTIME TYPE
// =============================================================================

/// The in-process type a handler is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeType {
    pub id: std::any::TypeId,
    pub name: &'static str,
}

impl RuntimeType {
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: std::any::TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Moves instance state to and from entity records.
pub trait Storable: Send + Sync {
    fn store(
        &self,
        out: &mut BinaryWriter,
        object_id: ObjectId,
        instance: &dyn Any,
        handler: &mut dyn StoreHandler,
    ) -> Result<(), LodestoreError>;

    fn create(&self, data: &EntityData<'_>) -> Result<Instance, LodestoreError>;

    fn initialize_state(
        &self,
        data: &EntityData<'_>,
        instance: &mut dyn Any,
        handler: &dyn LoadHandler,
    ) -> Result<(), LodestoreError>;

    fn update_state(
        &self,
        data: &EntityData<'_>,
        instance: &mut dyn Any,
        handler: &dyn LoadHandler,
    ) -> Result<(), LodestoreError>;
}

/// Enumerates the references of an instance or a record.
pub trait Referring: Send + Sync {
    fn has_persisted_references(&self) -> bool;

    /// Visit every non-null reference held by a live instance.
    fn iterate_instance_references(
        &self,
        instance: &dyn Any,
        visit: &mut dyn FnMut(ObjRef),
    ) -> Result<(), LodestoreError>;

    /// Visit every non-null object id stored in a record.
    fn iterate_loadable_references(
        &self,
        data: &EntityData<'_>,
        visit: &mut dyn FnMut(ObjectId),
    ) -> Result<(), LodestoreError>;
}

/// Final load phase, run after every reference has been resolved.
pub trait Completable: Send + Sync {
    fn complete(&self, _data: &EntityData<'_>, _instance: &mut dyn Any) -> Result<(), LodestoreError> {
        Ok(())
    }
}

/// A complete handler for one persisted type.
pub trait TypeHandler: Storable + Referring + Completable {
    /// The handler's definition. Fails if lazy layout initialization failed.
    fn type_definition(&self) -> Result<&TypeDefinition, LodestoreError>;

    fn type_id(&self) -> TypeId;

    fn type_name(&self) -> &str;

    /// The runtime type this handler materializes, if any.
    fn runtime_type(&self) -> Option<RuntimeType>;
}
