//! # Type Definitions
//!
//! A type definition binds an ordered, deduplicated field list to a type id
//! and a dictionary name, and caches the aggregate layout facts the registry
//! and the storage side need: persisted length bounds, whether the type has
//! references, whether it is a primitive wrapper.

use crate::field::{FieldDescriptor, FieldKind, MemberIdentifier};
use crate::layout::derive_layout;
use crate::{LodestoreError, TypeId};
use serde::{Deserialize, Serialize};

// =============================================================================
// PERSISTED FORM
// =============================================================================

/// Serializable description of a type, as written into the dictionary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescription {
    pub type_id: TypeId,
    pub type_name: String,
    pub runtime_type_name: Option<String>,
    pub members: Vec<FieldDescriptor>,
}

// =============================================================================
// TYPE DEFINITION
// =============================================================================

/// Validated layout of one persisted type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TypeDescription", into = "TypeDescription")]
pub struct TypeDefinition {
    type_id: TypeId,
    type_name: String,
    runtime_type_name: Option<String>,
    members: Vec<FieldDescriptor>,
    has_references: bool,
    has_variable_length: bool,
    minimum_length: u64,
    maximum_length: u64,
}

impl TypeDefinition {
    /// Build a definition, deriving (or re-validating) member offsets.
    pub fn new(
        type_id: TypeId,
        type_name: impl Into<String>,
        runtime_type_name: Option<String>,
        mut members: Vec<FieldDescriptor>,
    ) -> Result<Self, LodestoreError> {
        let type_name = type_name.into();
        derive_layout(&type_name, &mut members)?;

        let minimum_length = members
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.minimum_length()));
        let maximum_length = members
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.maximum_length()));

        Ok(Self {
            type_id,
            type_name,
            runtime_type_name,
            has_references: members.iter().any(|m| m.kind.has_references()),
            has_variable_length: members.iter().any(|m| m.kind.is_variable_length()),
            members,
            minimum_length,
            maximum_length,
        })
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Dictionary name of the type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Name of the in-process type bound to this definition, absent for
    /// legacy definitions without a runtime counterpart.
    #[must_use]
    pub fn runtime_type_name(&self) -> Option<&str> {
        self.runtime_type_name.as_deref()
    }

    /// Members in persisted order.
    #[must_use]
    pub fn members(&self) -> &[FieldDescriptor] {
        &self.members
    }

    /// Find a member by identifier.
    #[must_use]
    pub fn member(&self, identifier: &MemberIdentifier) -> Option<&FieldDescriptor> {
        self.members.iter().find(|m| &m.identifier == identifier)
    }

    /// Find a member by local name, ignoring qualifiers.
    #[must_use]
    pub fn member_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.members.iter().find(|m| m.name() == name)
    }

    #[must_use]
    pub fn has_references(&self) -> bool {
        self.has_references
    }

    #[must_use]
    pub fn has_variable_length(&self) -> bool {
        self.has_variable_length
    }

    /// A primitive definition wraps exactly one fixed-width value.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self.members.as_slice(), [m] if matches!(m.kind, FieldKind::Primitive(_)))
    }

    #[must_use]
    pub fn members_persisted_length_minimum(&self) -> u64 {
        self.minimum_length
    }

    #[must_use]
    pub fn members_persisted_length_maximum(&self) -> u64 {
        self.maximum_length
    }

    /// Check if an entity content length fits this type.
    #[must_use]
    pub fn accepts_length(&self, length: u64) -> bool {
        length >= self.minimum_length && length <= self.maximum_length
    }

    /// Layout equality: same id, name and members in the same order.
    ///
    /// The runtime type name does not take part; a legacy definition loaded
    /// from disk equals the definition derived from the live type.
    #[must_use]
    pub fn is_layout_equal(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && self.type_name == other.type_name
            && self.members == other.members
    }
}

impl TryFrom<TypeDescription> for TypeDefinition {
    type Error = LodestoreError;

    fn try_from(description: TypeDescription) -> Result<Self, Self::Error> {
        Self::new(
            description.type_id,
            description.type_name,
            description.runtime_type_name,
            description.members,
        )
    }
}

impl From<TypeDefinition> for TypeDescription {
    fn from(definition: TypeDefinition) -> Self {
        Self {
            type_id: definition.type_id,
            type_name: definition.type_name,
            runtime_type_name: definition.runtime_type_name,
            members: definition.members,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
