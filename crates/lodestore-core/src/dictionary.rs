//! # Type Dictionary
//!
//! The persisted catalogue of type definitions: `TypeId -> TypeDefinition`
//! plus a name index. Several ids may carry the same name; the highest id is
//! the current version and the others are legacy versions kept to read old
//! records.

use crate::definition::{TypeDefinition, TypeDescription};
use crate::{LodestoreError, TypeId};
use std::collections::BTreeMap;

/// Deterministically ordered set of type definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDictionary {
    by_id: BTreeMap<TypeId, TypeDefinition>,
    current_by_name: BTreeMap<String, TypeId>,
}

impl TypeDictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dictionary from definitions, rejecting conflicting ids.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = TypeDefinition>,
    ) -> Result<Self, LodestoreError> {
        let mut dictionary = Self::new();
        for definition in definitions {
            dictionary.register(definition)?;
        }
        Ok(dictionary)
    }

    /// Add a definition. Registering a layout-equal definition again is a
    /// no-op; a different layout under a known id is a mismatch.
    pub fn register(&mut self, definition: TypeDefinition) -> Result<(), LodestoreError> {
        if let Some(existing) = self.by_id.get(&definition.type_id()) {
            if existing.is_layout_equal(&definition) {
                return Ok(());
            }
            return Err(LodestoreError::TypeDefinitionMismatch {
                type_id: definition.type_id(),
                type_name: definition.type_name().to_string(),
            });
        }

        let type_id = definition.type_id();
        let current = self
            .current_by_name
            .entry(definition.type_name().to_string())
            .or_insert(type_id);
        if type_id > *current {
            *current = type_id;
        }
        self.by_id.insert(type_id, definition);
        Ok(())
    }

    #[must_use]
    pub fn lookup_by_id(&self, type_id: TypeId) -> Option<&TypeDefinition> {
        self.by_id.get(&type_id)
    }

    /// Current (highest id) definition carrying `type_name`.
    #[must_use]
    pub fn lookup_by_name(&self, type_name: &str) -> Option<&TypeDefinition> {
        self.current_by_name
            .get(type_name)
            .and_then(|id| self.by_id.get(id))
    }

    /// Every definition carrying `type_name`, oldest first.
    pub fn versions_of<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a TypeDefinition> + 'a {
        self.by_id
            .values()
            .filter(move |d| d.type_name() == type_name)
    }

    /// All definitions in type id order.
    pub fn all_types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.by_id.values()
    }

    #[must_use]
    pub fn highest_type_id(&self) -> Option<TypeId> {
        self.by_id.keys().next_back().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Serializable form, in type id order.
    #[must_use]
    pub fn descriptions(&self) -> Vec<TypeDescription> {
        self.by_id.values().cloned().map(TypeDescription::from).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDescriptor, FieldKind, MemberIdentifier, PrimitiveKind};

    fn def(id: u64, name: &str, fields: &[&str]) -> TypeDefinition {
        TypeDefinition::new(
            TypeId(id),
            name,
            None,
            fields
                .iter()
                .map(|f| {
                    FieldDescriptor::new(
                        MemberIdentifier::new(*f),
                        FieldKind::Primitive(PrimitiveKind::U32),
                    )
                })
                .collect(),
        )
        .expect("definition")
    }

    #[test]
    fn highest_id_is_current_version() {
        let dictionary = TypeDictionary::from_definitions([
            def(1010, "Customer", &["id", "name_hash"]),
            def(1000, "Customer", &["id"]),
            def(1005, "Order", &["id"]),
        ])
        .expect("dictionary");

        let current = dictionary.lookup_by_name("Customer").expect("current");
        assert_eq!(current.type_id(), TypeId(1010));
        assert_eq!(dictionary.versions_of("Customer").count(), 2);
        assert_eq!(dictionary.highest_type_id(), Some(TypeId(1010)));
        assert!(dictionary.lookup_by_name("Invoice").is_none());
    }

    #[test]
    fn conflicting_layout_for_same_id_rejected() {
        let mut dictionary = TypeDictionary::new();
        dictionary.register(def(1, "A", &["x"])).expect("first");
        dictionary.register(def(1, "A", &["x"])).expect("identical again");

        let err = dictionary.register(def(1, "A", &["y"])).expect_err("conflict");
        assert_eq!(
            err,
            LodestoreError::TypeDefinitionMismatch {
                type_id: TypeId(1),
                type_name: "A".to_string(),
            }
        );
        assert_eq!(dictionary.len(), 1);
    }

    #[test]
    fn iteration_is_ordered_by_id() {
        let dictionary =
            TypeDictionary::from_definitions([def(3, "C", &["c"]), def(1, "A", &["a"])])
                .expect("dictionary");
        let ids: Vec<_> = dictionary.all_types().map(|d| d.type_id()).collect();
        assert_eq!(ids, vec![TypeId(1), TypeId(3)]);
        assert_eq!(dictionary.descriptions()[0].type_name, "A");
    }
}
