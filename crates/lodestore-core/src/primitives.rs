//! # Format Primitives
//!
//! Hardcoded constants of the Lodestore binary formats.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Changing any of them breaks compatibility with existing stores.

/// Magic bytes for the Lodestore dictionary file header.
///
/// - File Header = Magic Bytes ("LODE") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"LODE";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// ENTITY RECORD LAYOUT
// =============================================================================

/// Length of the entity header: content length, type id, object id.
///
/// All three are little-endian u64 values.
pub const ENTITY_HEADER_LENGTH: u64 = 24;

/// Persisted width of a reference (an object id).
pub const REFERENCE_LENGTH: u64 = 8;

/// Persisted width of the length prefix in front of a variable-length field.
pub const LENGTH_PREFIX_LENGTH: u64 = 8;

/// Maximum content length of a single entity record (1 GiB).
///
/// Records claiming a larger content length are treated as corrupt.
pub const MAX_ENTITY_CONTENT_LENGTH: u64 = 1024 * 1024 * 1024;

/// First object id handed out to a persisted instance.
///
/// Object id 0 is reserved for the null reference.
pub const FIRST_OBJECT_ID: u64 = 1;

// =============================================================================
// TRAVERSAL
// =============================================================================

/// Number of slots in one worklist segment of the traversal engine.
pub const SEGMENT_SIZE: usize = 500;

// =============================================================================
// SIMILARITY
// =============================================================================

/// Default minimum similarity for a suggested legacy member mapping.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
