//! # Legacy Records
//!
//! Records written under an older definition of a type are rewritten into
//! the layout of the current definition before they are loaded.
//!
//! A legacy type is one the registry knows only from the stored dictionary:
//! it has a definition but no runtime handler. Its current counterpart is
//! found by name through the
//! [`RefactoringResolver`](crate::refactoring::RefactoringResolver), and its members are
//! mapped with a [`LegacyMemberMapper`]:
//!
//! - mapped members are copied byte for byte (the field kinds must agree)
//! - legacy members without counterpart are dropped
//! - current members without source get the zero value (empty for
//!   variable-length fields, null for references)
//!
//! Records of a type the refactoring table deletes are dropped; references
//! to them load as absent.

use crate::binary::{BinaryWriter, EntityData, EntityHeader, EntityRecords};
use crate::definition::TypeDefinition;
use crate::field::FieldKind;
use crate::refactoring::LegacyMemberMapper;
use crate::registry::TypeRegistry;
use crate::{LodestoreError, ObjectId, TypeId};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// RECORD TRANSLATOR
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSource {
    /// Copy the legacy field at `offset`.
    Copy { offset: u64, kind: FieldKind },
    /// No legacy counterpart.
    Zero(FieldKind),
}

/// Rewrites records of one legacy type into the layout of its current type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTranslator {
    source_type: TypeId,
    target_type: TypeId,
    fields: Vec<FieldSource>,
}

impl RecordTranslator {
    /// Map the members of `legacy` onto `current`.
    pub fn new(
        mapper: &LegacyMemberMapper<'_>,
        legacy: &TypeDefinition,
        current: &TypeDefinition,
    ) -> Result<Self, LodestoreError> {
        let mapping = mapper.map_members(legacy, current)?;
        let mut fields = Vec::with_capacity(current.members().len());
        for target in current.members() {
            let source = mapping
                .matched
                .iter()
                .find(|m| m.target.as_ref() == Some(target))
                .map(|m| &m.source);
            let Some(source) = source else {
                fields.push(FieldSource::Zero(target.kind));
                continue;
            };
            if source.kind != target.kind {
                return Err(LodestoreError::IncompatibleMemberMapping {
                    source_id: format!("{}#{}", legacy.type_name(), source.identifier),
                    target_id: format!("{}#{}", current.type_name(), target.identifier),
                });
            }
            let offset = source.offset().ok_or_else(|| {
                LodestoreError::CorruptRecord(format!(
                    "member {} of {} has no offset",
                    source.identifier,
                    legacy.type_name()
                ))
            })?;
            fields.push(FieldSource::Copy {
                offset,
                kind: target.kind,
            });
        }

        tracing::debug!(
            source = %legacy.type_id(),
            target = %current.type_id(),
            unmatched = mapping.unmatched_sources.len(),
            new_members = mapping.new_targets.len(),
            "legacy type mapped"
        );
        Ok(Self {
            source_type: legacy.type_id(),
            target_type: current.type_id(),
            fields,
        })
    }

    #[must_use]
    pub fn source_type(&self) -> TypeId {
        self.source_type
    }

    #[must_use]
    pub fn target_type(&self) -> TypeId {
        self.target_type
    }

    /// Append the current-layout form of `data` to `out`. The object id is
    /// kept.
    pub fn translate(&self, data: &EntityData<'_>, out: &mut BinaryWriter) -> Result<(), LodestoreError> {
        if data.type_id() != self.source_type {
            return Err(LodestoreError::UnhandledTypeId(data.type_id()));
        }
        let mut content = BinaryWriter::new();
        for field in &self.fields {
            match *field {
                FieldSource::Copy { offset, kind } if kind.is_variable_length() => {
                    content.write_variable(data.read_variable(offset)?);
                }
                FieldSource::Copy { offset, kind } => {
                    content.write_bytes(data.slice(offset, kind.minimum_length())?);
                }
                FieldSource::Zero(kind) if kind.is_variable_length() => {
                    content.write_variable(&[]);
                }
                FieldSource::Zero(kind) => {
                    content.write_bytes(&vec![0u8; kind.minimum_length() as usize]);
                }
            }
        }
        out.begin_record(&EntityHeader {
            content_length: content.len() as u64,
            type_id: self.target_type,
            object_id: data.object_id(),
        })?;
        out.write_bytes(content.as_bytes());
        Ok(())
    }
}

// =============================================================================
// CHUNK REWRITING
// =============================================================================

/// A chunk with every legacy record rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RewrittenChunk<'b> {
    pub bytes: Cow<'b, [u8]>,
    /// Object ids of records dropped because their type was deleted.
    pub dropped: BTreeSet<ObjectId>,
}

impl<'b> RewrittenChunk<'b> {
    pub fn unchanged(bytes: &'b [u8]) -> Self {
        Self {
            bytes: Cow::Borrowed(bytes),
            dropped: BTreeSet::new(),
        }
    }
}

/// Rewrites the legacy records of a chunk, building one translator per
/// legacy type on first use.
pub(crate) struct LegacyRecords<'a> {
    registry: &'a TypeRegistry,
    mapper: LegacyMemberMapper<'a>,
    /// `None` marks a deleted type.
    translators: BTreeMap<TypeId, Option<RecordTranslator>>,
}

impl<'a> LegacyRecords<'a> {
    pub fn new(registry: &'a TypeRegistry, mapper: LegacyMemberMapper<'a>) -> Self {
        Self {
            registry,
            mapper,
            translators: BTreeMap::new(),
        }
    }

    fn is_legacy(&self, type_id: TypeId) -> bool {
        self.registry.lookup_runtime_handler(type_id).is_none()
            && self.registry.lookup_type_handler(type_id).is_some()
    }

    fn translator(&mut self, type_id: TypeId) -> Result<Option<&RecordTranslator>, LodestoreError> {
        if !self.translators.contains_key(&type_id) {
            let translator = self.build_translator(type_id)?;
            self.translators.insert(type_id, translator);
        }
        Ok(self.translators.get(&type_id).and_then(Option::as_ref))
    }

    fn build_translator(&self, type_id: TypeId) -> Result<Option<RecordTranslator>, LodestoreError> {
        let legacy = self
            .registry
            .lookup_type_by_id(type_id)
            .ok_or(LodestoreError::UnhandledTypeId(type_id))?;
        let current = self
            .mapper
            .resolver()
            .resolve_current_type(&legacy, |name| self.registry.lookup_type_by_name(name))?;
        let Some(current) = current else {
            tracing::debug!(type_id = %type_id, type_name = legacy.type_name(), "legacy type deleted");
            return Ok(None);
        };
        if current.type_id() == type_id || self.registry.lookup_runtime_handler(current.type_id()).is_none() {
            return Err(LodestoreError::UnhandledTypeId(current.type_id()));
        }
        RecordTranslator::new(&self.mapper, &legacy, &current).map(Some)
    }

    /// Rewrite every legacy record of `bytes`. Records of current types and
    /// of unknown types pass through unchanged.
    pub fn rewrite<'b>(&mut self, bytes: &'b [u8]) -> Result<RewrittenChunk<'b>, LodestoreError> {
        let has_legacy = EntityRecords::new(bytes).any(|r| r.is_ok_and(|data| self.is_legacy(data.type_id())));
        if !has_legacy {
            return Ok(RewrittenChunk::unchanged(bytes));
        }

        let mut out = BinaryWriter::new();
        let mut dropped = BTreeSet::new();
        let mut translated = 0usize;
        for record in EntityRecords::new(bytes) {
            let data = record?;
            if !self.is_legacy(data.type_id()) {
                out.write_bytes(data.raw());
                continue;
            }
            self.registry
                .validate_entity(data.content_length(), data.type_id(), data.object_id())?;
            match self.translator(data.type_id())? {
                Some(translator) => {
                    translator.translate(&data, &mut out)?;
                    translated += 1;
                }
                None => {
                    dropped.insert(data.object_id());
                }
            }
        }

        tracing::debug!(translated, dropped = dropped.len(), "rewrote legacy records");
        Ok(RewrittenChunk {
            bytes: Cow::Owned(out.into_bytes()),
            dropped,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
