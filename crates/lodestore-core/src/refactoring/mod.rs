//! # Refactoring Resolver
//!
//! Maps identifiers of legacy types and members to their current
//! counterparts using an explicit table of `source -> target` entries.
//!
//! ## Lookup
//!
//! Candidate keys are rendered by identifier builders in descending order of
//! priority; the first key present in the table wins. An entry without a
//! target marks a deliberate deletion, which is distinct from having no
//! entry at all (the identifier is unchanged).
//!
//! Default member keys, highest priority first:
//!
//! | Builder                 | Key                            |
//! |-------------------------|--------------------------------|
//! | `TypeIdQualifiedMember` | `1000:Customer#name`           |
//! | `TypeQualifiedMember`   | `Customer#name`                |
//! | `MemberNameOnly`        | `#name`                        |

mod similarity;

pub use similarity::{
    LegacyMemberMapper, MatchKind, MemberMappingResult, MemberMatch, MemberSimilarity,
    TypeSimilarity,
};

use crate::LodestoreError;
use crate::definition::TypeDefinition;
use crate::field::FieldDescriptor;
use std::collections::BTreeMap;

// =============================================================================
// MAPPING TABLE
// =============================================================================

/// Immutable table of refactoring entries. A `None` target marks deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefactoringMapping {
    entries: BTreeMap<String, Option<String>>,
}

impl RefactoringMapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. A later entry for the same source replaces the earlier.
    pub fn insert(&mut self, source: impl Into<String>, target: Option<String>) {
        self.entries.insert(source.into(), target);
    }

    /// Raw entry for `source`: `None` if absent, `Some(None)` if deleted.
    #[must_use]
    pub fn get(&self, source: &str) -> Option<Option<&str>> {
        self.entries.get(source).map(Option::as_deref)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(source, target)| (source.as_str(), target.as_deref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Option<String>)> for RefactoringMapping {
    fn from_iter<I: IntoIterator<Item = (S, Option<String>)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (source, target) in iter {
            mapping.insert(source, target);
        }
        mapping
    }
}

// =============================================================================
// IDENTIFIER BUILDERS
// =============================================================================

/// Renders a lookup key for a type.
pub trait TypeIdentifierBuilder: Send + Sync {
    fn build(&self, definition: &TypeDefinition) -> Option<String>;
}

/// Renders a lookup key for a member of a type.
pub trait MemberIdentifierBuilder: Send + Sync {
    fn build(&self, definition: &TypeDefinition, member: &FieldDescriptor) -> Option<String>;
}

/// `"{type_id}:{type_name}"`
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeIdQualified;

impl TypeIdentifierBuilder for TypeIdQualified {
    fn build(&self, definition: &TypeDefinition) -> Option<String> {
        Some(format!("{}:{}", definition.type_id(), definition.type_name()))
    }
}

/// `"{type_name}"`
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeNameOnly;

impl TypeIdentifierBuilder for TypeNameOnly {
    fn build(&self, definition: &TypeDefinition) -> Option<String> {
        Some(definition.type_name().to_string())
    }
}

/// `"{type_id}:{type_name}#{member}"`
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeIdQualifiedMember;

impl MemberIdentifierBuilder for TypeIdQualifiedMember {
    fn build(&self, definition: &TypeDefinition, member: &FieldDescriptor) -> Option<String> {
        Some(format!(
            "{}:{}#{}",
            definition.type_id(),
            definition.type_name(),
            member.identifier
        ))
    }
}

/// `"{qualifier}#{name}"`, using the type name when the member is
/// unqualified.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeQualifiedMember;

impl MemberIdentifierBuilder for TypeQualifiedMember {
    fn build(&self, definition: &TypeDefinition, member: &FieldDescriptor) -> Option<String> {
        let qualifier = member
            .identifier
            .qualifier
            .as_deref()
            .unwrap_or(definition.type_name());
        Some(format!("{qualifier}#{}", member.identifier.name))
    }
}

/// `"#{name}"`
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberNameOnly;

impl MemberIdentifierBuilder for MemberNameOnly {
    fn build(&self, _definition: &TypeDefinition, member: &FieldDescriptor) -> Option<String> {
        Some(format!("#{}", member.identifier.name))
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Outcome of resolving a legacy type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeResolution {
    /// No entry: the stored name still applies.
    Unchanged,
    Renamed(String),
    /// The type was removed on purpose.
    Deleted,
}

/// A resolved member entry. `target: None` marks a deleted member.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberMapping {
    pub source: FieldDescriptor,
    pub target: Option<FieldDescriptor>,
}

/// Resolves legacy identifiers through a [`RefactoringMapping`].
pub struct RefactoringResolver {
    mapping: RefactoringMapping,
    type_builders: Vec<Box<dyn TypeIdentifierBuilder>>,
    source_member_builders: Vec<Box<dyn MemberIdentifierBuilder>>,
    target_member_builders: Vec<Box<dyn MemberIdentifierBuilder>>,
}

impl std::fmt::Debug for RefactoringResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefactoringResolver")
            .field("entries", &self.mapping.len())
            .field("type_builders", &self.type_builders.len())
            .field("source_member_builders", &self.source_member_builders.len())
            .field("target_member_builders", &self.target_member_builders.len())
            .finish()
    }
}

fn default_member_builders() -> Vec<Box<dyn MemberIdentifierBuilder>> {
    vec![
        Box::new(TypeIdQualifiedMember),
        Box::new(TypeQualifiedMember),
        Box::new(MemberNameOnly),
    ]
}

impl RefactoringResolver {
    /// Resolver with the default builder lists.
    #[must_use]
    pub fn new(mapping: RefactoringMapping) -> Self {
        Self {
            mapping,
            type_builders: vec![Box::new(TypeIdQualified), Box::new(TypeNameOnly)],
            source_member_builders: default_member_builders(),
            target_member_builders: default_member_builders(),
        }
    }

    /// Replace the type key builders, highest priority first.
    #[must_use]
    pub fn with_type_builders(mut self, builders: Vec<Box<dyn TypeIdentifierBuilder>>) -> Self {
        self.type_builders = builders;
        self
    }

    /// Replace the member key builders for the source and target side.
    #[must_use]
    pub fn with_member_builders(
        mut self,
        source: Vec<Box<dyn MemberIdentifierBuilder>>,
        target: Vec<Box<dyn MemberIdentifierBuilder>>,
    ) -> Self {
        self.source_member_builders = source;
        self.target_member_builders = target;
        self
    }

    #[must_use]
    pub fn mapping(&self) -> &RefactoringMapping {
        &self.mapping
    }

    /// Raw table entry for an identifier.
    #[must_use]
    pub fn lookup(&self, identifier: &str) -> Option<Option<&str>> {
        self.mapping.get(identifier)
    }

    /// First table entry matching one of the type's keys, with that key.
    fn type_entry(&self, definition: &TypeDefinition) -> Option<(String, Option<&str>)> {
        self.type_builders.iter().find_map(|builder| {
            let key = builder.build(definition)?;
            let entry = self.mapping.get(&key)?;
            Some((key, entry))
        })
    }

    /// Current name of a stored type.
    #[must_use]
    pub fn resolve_type_name(&self, definition: &TypeDefinition) -> TypeResolution {
        match self.type_entry(definition) {
            None => TypeResolution::Unchanged,
            Some((_, None)) => TypeResolution::Deleted,
            Some((_, Some(target))) if target == definition.type_name() => {
                TypeResolution::Unchanged
            }
            Some((_, Some(target))) => TypeResolution::Renamed(target.to_string()),
        }
    }

    /// Current type a stored type maps to, found through `lookup` by name.
    ///
    /// `Ok(None)` for a deleted type, or for an unmapped type no current
    /// type carries the name of. An explicit rename to a name `lookup` does
    /// not know is a broken refactoring table and fails with
    /// `UnresolvableTypeMapping`.
    pub fn resolve_current_type<T>(
        &self,
        definition: &TypeDefinition,
        lookup: impl FnOnce(&str) -> Option<T>,
    ) -> Result<Option<T>, LodestoreError> {
        match self.type_entry(definition) {
            None => Ok(lookup(definition.type_name())),
            Some((_, None)) => Ok(None),
            Some((key, Some(target))) => lookup(target).map(Some).ok_or_else(|| {
                LodestoreError::UnresolvableTypeMapping {
                    source_id: key,
                    target_id: target.to_string(),
                }
            }),
        }
    }

    /// Find the explicit mapping of `source_member` into `target_type`.
    ///
    /// `Ok(None)` means there is no entry. An entry naming a member that
    /// `target_type` does not have is a broken refactoring table and fails
    /// with `UnresolvableMemberMapping`.
    pub fn resolve_member(
        &self,
        source_type: &TypeDefinition,
        source_member: &FieldDescriptor,
        target_type: &TypeDefinition,
    ) -> Result<Option<MemberMapping>, LodestoreError> {
        for builder in &self.source_member_builders {
            let Some(key) = builder.build(source_type, source_member) else {
                continue;
            };
            let Some(entry) = self.mapping.get(&key) else {
                continue;
            };
            let Some(target_id) = entry else {
                return Ok(Some(MemberMapping {
                    source: source_member.clone(),
                    target: None,
                }));
            };
            let target = self.find_target(target_type, target_id).ok_or_else(|| {
                LodestoreError::UnresolvableMemberMapping {
                    source_id: key.clone(),
                    target_id: target_id.to_string(),
                }
            })?;
            tracing::trace!(source = %key, target = target_id, "resolved member mapping");
            return Ok(Some(MemberMapping {
                source: source_member.clone(),
                target: Some(target.clone()),
            }));
        }
        Ok(None)
    }

    fn find_target<'t>(
        &self,
        target_type: &'t TypeDefinition,
        target_id: &str,
    ) -> Option<&'t FieldDescriptor> {
        target_type.members().iter().find(|member| {
            self.target_member_builders
                .iter()
                .any(|builder| builder.build(target_type, member).as_deref() == Some(target_id))
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
