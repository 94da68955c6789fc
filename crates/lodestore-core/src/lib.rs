//! # lodestore-core
//!
//! The binary persistence engine of Lodestore.
//!
//! This crate stores arbitrary in-memory object graphs as flat entity
//! records and rebuilds them on load, tolerating schema evolution between
//! runs.
//!
//! ## Layers
//!
//! - `field` / `layout` / `definition`: explicit binary layouts per type
//! - `handler`: the store / create / initialize / update / complete protocol
//! - `dictionary` / `registry`: stable type ids and cross-run layout checks
//! - `traversal`: iterative, cycle-safe object-graph walker
//! - `refactoring`: legacy identifier mapping and member similarity
//! - `legacy`: rewriting records of older type definitions on load
//! - `persister` / `session` / `storage`: whole-graph store and load on redb
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: `BTreeMap`/`BTreeSet` only
//! - Layouts are declared through field builders, never discovered

// =============================================================================
// MODULES
// =============================================================================

pub mod binary;
pub mod definition;
pub mod dictionary;
pub mod field;
pub mod formats;
pub mod graph;
pub mod handler;
pub mod layout;
pub mod legacy;
pub mod persister;
pub mod primitives;
pub mod refactoring;
pub mod registry;
pub mod session;
pub mod storage;
pub mod traversal;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ErrorClass, LodestoreError, ObjRef, ObjectId, TypeId};

// =============================================================================
// RE-EXPORTS: Type System
// =============================================================================

pub use binary::{BinaryWriter, EntityData, EntityHeader, EntityRecords};
pub use definition::{TypeDefinition, TypeDescription};
pub use dictionary::TypeDictionary;
pub use field::{FieldDescriptor, FieldKind, MemberIdentifier, PrimitiveKind};
pub use handler::{
    AbstractTypeHandler, BinaryField, CustomTypeHandler, EntityTypeHandler, LoadHandler,
    StoreHandler, TypeHandler,
};
pub use registry::TypeRegistry;

// =============================================================================
// RE-EXPORTS: Object Graph and Persistence
// =============================================================================

pub use graph::ObjectGraph;
pub use persister::{Loader, ObjectIdRegistry, StoredChunk, Storer};
pub use session::{CheckReport, DanglingReference, InvalidRecord, Session, SessionStatus};
pub use storage::RedbEntityStore;
pub use traversal::{ReferenceHandler, TraversalMode, TraverserProvider, TypeTraverser, Visit};

// =============================================================================
// RE-EXPORTS: Refactoring
// =============================================================================

pub use legacy::RecordTranslator;
pub use refactoring::{
    LegacyMemberMapper, MatchKind, MemberMappingResult, MemberSimilarity, RefactoringMapping,
    RefactoringResolver, TypeResolution, TypeSimilarity,
};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{PersistenceHeader, dictionary_from_bytes, dictionary_to_bytes};
