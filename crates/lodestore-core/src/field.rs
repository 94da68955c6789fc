//! # Field Descriptors
//!
//! A field descriptor names one persisted member of a type and fixes its
//! binary shape: primitive width, reference, or one of the variable-length
//! kinds. Offsets are assigned exactly once by layout derivation.

use crate::primitives::{LENGTH_PREFIX_LENGTH, MAX_ENTITY_CONTENT_LENGTH, REFERENCE_LENGTH};
use crate::LodestoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// PRIMITIVE KINDS
// =============================================================================

/// Fixed-width value kinds, persisted little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Char,
}

impl PrimitiveKind {
    /// Persisted width in bytes.
    #[must_use]
    pub const fn width(self) -> u64 {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 | Self::Char => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Dictionary name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
        }
    }
}

// =============================================================================
// FIELD KINDS
// =============================================================================

/// Semantic kind of a persisted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Fixed-width value.
    Primitive(PrimitiveKind),
    /// Single reference, persisted as an object id.
    Reference,
    /// Variable-length raw bytes.
    Bytes,
    /// Variable-length UTF-8 text.
    Text,
    /// Variable-length list of references.
    ReferenceList,
}

impl FieldKind {
    /// Check if the persisted length varies per instance.
    #[must_use]
    pub const fn is_variable_length(self) -> bool {
        matches!(self, Self::Bytes | Self::Text | Self::ReferenceList)
    }

    /// Check if the field is a single reference.
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(self, Self::Reference)
    }

    /// Check if the field carries references of any shape.
    #[must_use]
    pub const fn has_references(self) -> bool {
        matches!(self, Self::Reference | Self::ReferenceList)
    }

    /// Minimum persisted length in bytes.
    ///
    /// Variable-length kinds persist at least their length prefix.
    #[must_use]
    pub const fn minimum_length(self) -> u64 {
        match self {
            Self::Primitive(kind) => kind.width(),
            Self::Reference => REFERENCE_LENGTH,
            Self::Bytes | Self::Text | Self::ReferenceList => LENGTH_PREFIX_LENGTH,
        }
    }

    /// Maximum persisted length in bytes.
    #[must_use]
    pub const fn maximum_length(self) -> u64 {
        if self.is_variable_length() {
            MAX_ENTITY_CONTENT_LENGTH
        } else {
            self.minimum_length()
        }
    }

    /// Type name recorded when the declaration names none.
    #[must_use]
    pub const fn default_type_name(self) -> &'static str {
        match self {
            Self::Primitive(kind) => kind.name(),
            Self::Reference => "ref",
            Self::Bytes => "bytes",
            Self::Text => "text",
            Self::ReferenceList => "ref[]",
        }
    }
}

// =============================================================================
// MEMBER IDENTIFIER
// =============================================================================

/// Identifier of a member: an optional declaring-scope qualifier and a name.
///
/// Rendered as `qualifier#name`, or just `name` without qualifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberIdentifier {
    pub qualifier: Option<String>,
    pub name: String,
}

impl MemberIdentifier {
    /// Unqualified identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Identifier qualified by its declaring scope.
    #[must_use]
    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// Parse `qualifier#name` or `name`. The last `#` separates the two.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.rsplit_once('#') {
            Some((qualifier, name)) if !qualifier.is_empty() => Self::qualified(qualifier, name),
            Some((_, name)) => Self::new(name),
            None => Self::new(s),
        }
    }
}

impl fmt::Display for MemberIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}#{}", q, self.name),
            None => f.write_str(&self.name),
        }
    }
}

// =============================================================================
// FIELD DESCRIPTOR
// =============================================================================

/// One persisted field of a type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub identifier: MemberIdentifier,
    pub kind: FieldKind,
    /// Declared member type: primitive name, `bytes`, `text`, or the
    /// dictionary name of the referenced type.
    pub type_name: String,
    offset: Option<u64>,
}

impl FieldDescriptor {
    /// Create a descriptor without an offset.
    #[must_use]
    pub fn new(identifier: MemberIdentifier, kind: FieldKind) -> Self {
        Self {
            identifier,
            kind,
            type_name: kind.default_type_name().to_string(),
            offset: None,
        }
    }

    /// Override the declared member type name.
    #[must_use]
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Local name of the field.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identifier.name
    }

    /// Assigned offset, if layout derivation has run.
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Assign the offset. Re-assigning the same value is a no-op.
    pub fn initialize_offset(&mut self, offset: u64) -> Result<(), LodestoreError> {
        match self.offset {
            None => {
                self.offset = Some(offset);
                Ok(())
            }
            Some(current) if current == offset => Ok(()),
            Some(current) => Err(LodestoreError::OffsetConflict {
                field: self.identifier.to_string(),
                current,
                requested: offset,
            }),
        }
    }

    #[must_use]
    pub fn minimum_length(&self) -> u64 {
        self.kind.minimum_length()
    }

    #[must_use]
    pub fn maximum_length(&self) -> u64 {
        self.kind.maximum_length()
    }
}

// =============================================================================
// TESTS
// =============================================================================
