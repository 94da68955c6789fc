//! # Core Type Definitions
//!
//! This module contains the identifiers and the error type shared by every
//! part of the Lodestore engine:
//! - Persisted identifiers (`TypeId`, `ObjectId`)
//! - In-memory instance handles (`ObjRef`)
//! - Error types (`LodestoreError`, `ErrorClass`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` for deterministic ordering in
//! `BTreeMap`/`BTreeSet`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// PERSISTED IDENTIFIERS
// =============================================================================

/// Stable identifier of a persisted type, biunique with its dictionary name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u64);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a persisted instance, distinct from its type.
///
/// `ObjectId::NULL` encodes the absent reference.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// The null reference.
    pub const NULL: Self = Self(0);

    /// Check if this is the null reference.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// IN-MEMORY HANDLES
// =============================================================================

/// Index of an instance inside an [`crate::ObjectGraph`] arena.
///
/// Persistable structs hold references to other instances as `ObjRef`,
/// `Option<ObjRef>` or `Vec<ObjRef>`; cycles are plain index cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjRef(pub u32);

impl ObjRef {
    /// Get the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Broad category of a [`LodestoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Setup-time misconfiguration. Never retried.
    Configuration,
    /// Corrupted data or a broken migration. Fatal for the current operation.
    DataConsistency,
    /// A placeholder handler was asked to persist or materialize an instance.
    NotPersistable,
    /// Storage backend or encoding failure.
    Storage,
}

/// Errors that can occur in the Lodestore engine.
///
/// - No silent failures
/// - Use `Result<T, LodestoreError>` for fallible operations
/// - The engine never panics; a failed operation leaves the registry in its
///   last consistent state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LodestoreError {
    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------
    /// A field was declared without a name.
    #[error("Unnamed field of type {type_name}")]
    UnnamedField { type_name: String },

    /// Two fields of one type share an identifier.
    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    /// A type declares more than one variable-length field.
    #[error("Multiple variable-length fields: {first} and {second}")]
    MultipleVariableLengthFields { first: String, second: String },

    /// A field offset was re-assigned to a different value.
    #[error("Offset of field {field} already set to {current}, refusing {requested}")]
    OffsetConflict {
        field: String,
        current: u64,
        requested: u64,
    },

    /// A type id is already bound to a different handler.
    #[error("Type id {type_id} is already associated with a type handler for {type_name}")]
    TypeIdAlreadyRegistered { type_id: TypeId, type_name: String },

    /// A runtime type is already bound to a different type id.
    #[error("Runtime type {runtime_type} is already registered as type id {type_id}")]
    RuntimeTypeAlreadyRegistered {
        runtime_type: String,
        type_id: TypeId,
    },

    /// No handler is registered for an instance's runtime type.
    #[error("No type handler registered for runtime type {0}")]
    UnhandledRuntimeType(String),

    /// The registry is already bound to a different dictionary.
    #[error("Type dictionary already initialized")]
    AlreadyInitialized,

    // -------------------------------------------------------------------------
    // Data consistency
    // -------------------------------------------------------------------------
    /// An entity carries a type id that no handler knows.
    #[error("Unhandled type id {0}")]
    UnhandledTypeId(TypeId),

    /// An entity record references an unknown type.
    #[error("Unknown type id {type_id} of entity with oid {object_id} and length {length}")]
    UnknownEntityType {
        type_id: TypeId,
        object_id: ObjectId,
        length: u64,
    },

    /// An entity record length lies outside the type's persisted bounds.
    #[error(
        "Invalid length {length} of entity {object_id} of type {type_id}: expected {minimum}..={maximum}"
    )]
    InvalidEntityLength {
        type_id: TypeId,
        object_id: ObjectId,
        length: u64,
        minimum: u64,
        maximum: u64,
    },

    /// A stored type definition differs from the runtime one.
    #[error("Invalid type description: {type_id} {type_name}")]
    TypeDefinitionMismatch { type_id: TypeId, type_name: String },

    /// An explicit refactoring entry points at a member that does not exist.
    #[error("Refactoring mapping {source_id} -> {target_id} cannot be resolved")]
    UnresolvableMemberMapping {
        source_id: String,
        target_id: String,
    },

    /// An explicit refactoring entry renames a type to one that does not
    /// exist.
    #[error("Refactoring mapping {source_id} -> {target_id} names no known type")]
    UnresolvableTypeMapping {
        source_id: String,
        target_id: String,
    },

    /// A legacy member is mapped onto a member of a different field kind.
    #[error("Member {source_id} cannot be loaded into {target_id}: field kinds differ")]
    IncompatibleMemberMapping {
        source_id: String,
        target_id: String,
    },

    /// A named field was requested that the type does not declare.
    #[error("Type {type_name} has no field {field}")]
    UnknownField { type_name: String, field: String },

    /// An in-memory handle points outside the object graph.
    #[error("No instance at {0:?}")]
    UnknownInstance(ObjRef),

    /// A persisted reference points at an object id that was never loaded.
    #[error("Unresolved reference to object {0}")]
    UnresolvedReference(ObjectId),

    /// One chunk contains two records for the same object id.
    #[error("Duplicate object id {0}")]
    DuplicateObjectId(ObjectId),

    /// A record is truncated or structurally invalid.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// A handler received an instance of an unexpected runtime type.
    #[error("Instance type mismatch: expected {expected}")]
    InstanceTypeMismatch { expected: String },

    /// An immutable instance no longer matches its persisted state.
    #[error("State mismatch in {type_name}.{field} of object {object_id}")]
    StateMismatch {
        type_name: String,
        field: String,
        object_id: ObjectId,
    },

    // -------------------------------------------------------------------------
    // Not persistable
    // -------------------------------------------------------------------------
    /// A placeholder handler was invoked for a persistence operation.
    #[error("Type not persistable: {0}")]
    TypeNotPersistable(String),

    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------
    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A bounded resource is exhausted.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LodestoreError {
    /// Classify the error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnnamedField { .. }
            | Self::DuplicateField(_)
            | Self::MultipleVariableLengthFields { .. }
            | Self::OffsetConflict { .. }
            | Self::TypeIdAlreadyRegistered { .. }
            | Self::RuntimeTypeAlreadyRegistered { .. }
            | Self::UnhandledRuntimeType(_)
            | Self::AlreadyInitialized => ErrorClass::Configuration,
            Self::UnhandledTypeId(_)
            | Self::UnknownEntityType { .. }
            | Self::InvalidEntityLength { .. }
            | Self::TypeDefinitionMismatch { .. }
            | Self::UnresolvableMemberMapping { .. }
            | Self::UnresolvableTypeMapping { .. }
            | Self::IncompatibleMemberMapping { .. }
            | Self::UnknownField { .. }
            | Self::UnknownInstance(_)
            | Self::UnresolvedReference(_)
            | Self::DuplicateObjectId(_)
            | Self::CorruptRecord(_)
            | Self::InstanceTypeMismatch { .. }
            | Self::StateMismatch { .. } => ErrorClass::DataConsistency,
            Self::TypeNotPersistable(_) => ErrorClass::NotPersistable,
            Self::SerializationError(_)
            | Self::DeserializationError(_)
            | Self::IoError(_)
            | Self::CapacityExceeded(_)
            | Self::ConfigError(_) => ErrorClass::Storage,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
