//! # Persistence Format
//!
//! Binary serialization of type dictionaries.
//!
//! Format: Header (5 bytes) + postcard-serialized list of type descriptions.
//! - 4 bytes: Magic ("LODE")
//! - 1 byte: Version
//!
//! ## Limits
//!
//! Input is validated before deserialization:
//! - Maximum payload size (`MAX_PERSISTENCE_PAYLOAD_SIZE`)
//! - Header validation before payload parsing
//! - Every decoded description is re-validated by layout derivation

use crate::definition::{TypeDefinition, TypeDescription};
use crate::dictionary::TypeDictionary;
use crate::{LodestoreError, primitives};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed size of an encoded dictionary.
///
/// Checked BEFORE attempting deserialization so a corrupted length cannot
/// trigger a huge allocation.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 64 * 1024 * 1024; // 64 MB

/// Header length: magic plus version byte.
const HEADER_LENGTH: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes all dictionary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), LodestoreError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(LodestoreError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(LodestoreError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut bytes = [0u8; HEADER_LENGTH];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LodestoreError> {
        let Some(header) = bytes.get(..HEADER_LENGTH) else {
            return Err(LodestoreError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a dictionary to bytes (header + payload), in type id order.
pub fn dictionary_to_bytes(dictionary: &TypeDictionary) -> Result<Vec<u8>, LodestoreError> {
    let payload = postcard::to_stdvec(&dictionary.descriptions())
        .map_err(|e| LodestoreError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LENGTH + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a dictionary from bytes.
///
/// Size and header are validated before the payload is decoded; each
/// description is then rebuilt into a definition, so stored offsets that
/// disagree with the derived layout are rejected.
pub fn dictionary_from_bytes(bytes: &[u8]) -> Result<TypeDictionary, LodestoreError> {
    if bytes.len() < HEADER_LENGTH {
        return Err(LodestoreError::DeserializationError(format!(
            "Data too short: minimum {HEADER_LENGTH} bytes required"
        )));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(LodestoreError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    let descriptions: Vec<TypeDescription> = postcard::from_bytes(&bytes[HEADER_LENGTH..])
        .map_err(|e| {
            LodestoreError::DeserializationError(format!(
                "Failed to deserialize type dictionary: {e}"
            ))
        })?;

    let definitions = descriptions
        .into_iter()
        .map(TypeDefinition::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    TypeDictionary::from_definitions(definitions)
}

// =============================================================================
// TESTS
// =============================================================================
