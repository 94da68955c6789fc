//! # Entity Type Handler
//!
//! Storage-side view of a type: everything that can be done with a record
//! knowing only its type definition. Used to validate records and walk
//! their references without materializing instances, including records of
//! legacy types that no longer have a runtime counterpart.

use crate::binary::EntityData;
use crate::definition::TypeDefinition;
use crate::field::{FieldDescriptor, FieldKind};
use crate::{LodestoreError, ObjectId, TypeId};

/// Visit every non-null object id stored in a record laid out by `members`.
pub(crate) fn iterate_record_references(
    members: &[FieldDescriptor],
    data: &EntityData<'_>,
    visit: &mut dyn FnMut(ObjectId),
) -> Result<(), LodestoreError> {
    for member in members.iter().filter(|m| m.kind.has_references()) {
        let offset = member.offset().ok_or_else(|| {
            LodestoreError::CorruptRecord(format!("field {} has no offset", member.identifier))
        })?;
        match member.kind {
            FieldKind::Reference => {
                let id = data.read_object_id(offset)?;
                if !id.is_null() {
                    visit(id);
                }
            }
            FieldKind::ReferenceList => {
                for id in data.read_object_ids(offset)? {
                    if !id.is_null() {
                        visit(id);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Handler built from a type definition alone.
#[derive(Debug, Clone)]
pub struct EntityTypeHandler {
    definition: TypeDefinition,
}

impl EntityTypeHandler {
    #[must_use]
    pub fn new(definition: TypeDefinition) -> Self {
        Self { definition }
    }

    #[must_use]
    pub fn definition(&self) -> &TypeDefinition {
        &self.definition
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.definition.type_id()
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.definition.type_name()
    }

    #[must_use]
    pub fn has_references(&self) -> bool {
        self.definition.has_references()
    }

    /// Check that a record's content length lies within the type's bounds.
    pub fn validate_entity(&self, length: u64, object_id: ObjectId) -> Result<(), LodestoreError> {
        if self.definition.accepts_length(length) {
            return Ok(());
        }
        Err(LodestoreError::InvalidEntityLength {
            type_id: self.type_id(),
            object_id,
            length,
            minimum: self.definition.members_persisted_length_minimum(),
            maximum: self.definition.members_persisted_length_maximum(),
        })
    }

    /// Visit every non-null object id referenced by a record of this type.
    pub fn iterate_references(
        &self,
        data: &EntityData<'_>,
        visit: &mut dyn FnMut(ObjectId),
    ) -> Result<(), LodestoreError> {
        if !self.has_references() {
            return Ok(());
        }
        iterate_record_references(self.definition.members(), data, visit)
    }
}

// =============================================================================
// TESTS
// =============================================================================
