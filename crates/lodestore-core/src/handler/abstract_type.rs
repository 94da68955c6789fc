//! # Abstract Type Handler
//!
//! Placeholder for a type that has a dictionary entry but must never be
//! persisted or materialized itself, such as a shared supertype name.
//! Every persistence operation fails with `TypeNotPersistable`.

use crate::binary::{BinaryWriter, EntityData};
use crate::definition::TypeDefinition;
use crate::handler::{
    Completable, Instance, LoadHandler, Referring, RuntimeType, Storable, StoreHandler,
    TypeHandler,
};
use crate::{LodestoreError, ObjRef, ObjectId, TypeId};
use std::any::Any;

/// Handler that refuses to store, create or update instances.
#[derive(Debug, Clone)]
pub struct AbstractTypeHandler {
    definition: TypeDefinition,
}

impl AbstractTypeHandler {
    pub fn new(type_id: TypeId, type_name: impl Into<String>) -> Result<Self, LodestoreError> {
        Ok(Self {
            definition: TypeDefinition::new(type_id, type_name, None, Vec::new())?,
        })
    }

    fn refuse(&self) -> LodestoreError {
        LodestoreError::TypeNotPersistable(self.definition.type_name().to_string())
    }
}

impl Storable for AbstractTypeHandler {
    fn store(
        &self,
        _out: &mut BinaryWriter,
        _object_id: ObjectId,
        _instance: &dyn Any,
        _handler: &mut dyn StoreHandler,
    ) -> Result<(), LodestoreError> {
        Err(self.refuse())
    }

    fn create(&self, _data: &EntityData<'_>) -> Result<Instance, LodestoreError> {
        Err(self.refuse())
    }

    fn initialize_state(
        &self,
        _data: &EntityData<'_>,
        _instance: &mut dyn Any,
        _handler: &dyn LoadHandler,
    ) -> Result<(), LodestoreError> {
        Err(self.refuse())
    }

    fn update_state(
        &self,
        _data: &EntityData<'_>,
        _instance: &mut dyn Any,
        _handler: &dyn LoadHandler,
    ) -> Result<(), LodestoreError> {
        Err(self.refuse())
    }
}

impl Referring for AbstractTypeHandler {
    fn has_persisted_references(&self) -> bool {
        false
    }

    fn iterate_instance_references(
        &self,
        _instance: &dyn Any,
        _visit: &mut dyn FnMut(ObjRef),
    ) -> Result<(), LodestoreError> {
        Ok(())
    }

    fn iterate_loadable_references(
        &self,
        _data: &EntityData<'_>,
        _visit: &mut dyn FnMut(ObjectId),
    ) -> Result<(), LodestoreError> {
        Ok(())
    }
}

impl Completable for AbstractTypeHandler {}

impl TypeHandler for AbstractTypeHandler {
    fn type_definition(&self) -> Result<&TypeDefinition, LodestoreError> {
        Ok(&self.definition)
    }

    fn type_id(&self) -> TypeId {
        self.definition.type_id()
    }

    fn type_name(&self) -> &str {
        self.definition.type_name()
    }

    fn runtime_type(&self) -> Option<RuntimeType> {
        None
    }
}
