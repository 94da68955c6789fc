//! # Entity Record Buffers
//!
//! Byte-level access to entity records.
//!
//! Record format (all integers little-endian):
//! - 8 bytes: content length
//! - 8 bytes: type id
//! - 8 bytes: object id
//! - content: fields in layout order
//!
//! Variable-length fields are an 8-byte payload length followed by the
//! payload; a reference list payload is a sequence of 8-byte object ids.
//! Every read is bounds-checked and reports `CorruptRecord` instead of
//! panicking.

use crate::primitives::{
    ENTITY_HEADER_LENGTH, LENGTH_PREFIX_LENGTH, MAX_ENTITY_CONTENT_LENGTH, REFERENCE_LENGTH,
};
use crate::{LodestoreError, ObjectId, TypeId};

fn corrupt(message: impl Into<String>) -> LodestoreError {
    LodestoreError::CorruptRecord(message.into())
}

fn to_usize(value: u64) -> Result<usize, LodestoreError> {
    usize::try_from(value).map_err(|_| corrupt(format!("length {} exceeds address space", value)))
}

fn u64_at(bytes: &[u8], at: usize) -> Result<u64, LodestoreError> {
    let end = at
        .checked_add(8)
        .ok_or_else(|| corrupt("offset overflow"))?;
    let word: [u8; 8] = bytes
        .get(at..end)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| corrupt(format!("word at {} out of bounds", at)))?;
    Ok(u64::from_le_bytes(word))
}

// =============================================================================
// ENTITY HEADER
// =============================================================================

/// The header preceding every entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityHeader {
    pub content_length: u64,
    pub type_id: TypeId,
    pub object_id: ObjectId,
}

impl EntityHeader {
    /// Write header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ENTITY_HEADER_LENGTH as usize] {
        let mut bytes = [0u8; ENTITY_HEADER_LENGTH as usize];
        bytes[0..8].copy_from_slice(&self.content_length.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.type_id.0.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.object_id.0.to_le_bytes());
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LodestoreError> {
        Ok(Self {
            content_length: u64_at(bytes, 0)?,
            type_id: TypeId(u64_at(bytes, 8)?),
            object_id: ObjectId(u64_at(bytes, 16)?),
        })
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Append-only buffer receiving entity records.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_header(&mut self, header: &EntityHeader) {
        self.buffer.extend_from_slice(&header.to_bytes());
    }

    /// Write the header of a record about to be stored, refusing content
    /// lengths no reader would accept.
    pub fn begin_record(&mut self, header: &EntityHeader) -> Result<(), LodestoreError> {
        if header.content_length > MAX_ENTITY_CONTENT_LENGTH {
            return Err(LodestoreError::CapacityExceeded(format!(
                "entity {} of type {} has {} content bytes, maximum is {}",
                header.object_id, header.type_id, header.content_length, MAX_ENTITY_CONTENT_LENGTH
            )));
        }
        self.write_header(header);
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_object_id(&mut self, id: ObjectId) {
        self.write_u64(id.0);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a length-prefixed payload.
    pub fn write_variable(&mut self, payload: &[u8]) {
        self.write_u64(payload.len() as u64);
        self.write_bytes(payload);
    }

    /// Write a length-prefixed list of object ids.
    pub fn write_object_ids(&mut self, ids: &[ObjectId]) {
        self.write_u64((ids.len() as u64).saturating_mul(REFERENCE_LENGTH));
        for id in ids {
            self.write_object_id(*id);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

// =============================================================================
// ENTITY DATA
// =============================================================================

/// Read view over one entity record.
#[derive(Debug, Clone, Copy)]
pub struct EntityData<'a> {
    header: EntityHeader,
    raw: &'a [u8],
    content: &'a [u8],
}

impl<'a> EntityData<'a> {
    /// Parse one complete record (header followed by exactly its content).
    pub fn parse(raw: &'a [u8]) -> Result<Self, LodestoreError> {
        let header = EntityHeader::from_bytes(raw)?;
        let content = raw
            .get(ENTITY_HEADER_LENGTH as usize..)
            .ok_or_else(|| corrupt("record shorter than its header"))?;
        if content.len() as u64 != header.content_length {
            return Err(corrupt(format!(
                "entity {} declares {} content bytes but has {}",
                header.object_id,
                header.content_length,
                content.len()
            )));
        }
        Ok(Self {
            header,
            raw,
            content,
        })
    }

    #[must_use]
    pub fn header(&self) -> EntityHeader {
        self.header
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.header.type_id
    }

    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.header.object_id
    }

    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.header.content_length
    }

    /// Field bytes without the header.
    #[must_use]
    pub fn content(&self) -> &'a [u8] {
        self.content
    }

    /// The whole record including its header.
    #[must_use]
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Bounds-checked content slice.
    pub fn slice(&self, offset: u64, length: u64) -> Result<&'a [u8], LodestoreError> {
        let start = to_usize(offset)?;
        let end = start
            .checked_add(to_usize(length)?)
            .ok_or_else(|| corrupt("offset overflow"))?;
        self.content.get(start..end).ok_or_else(|| {
            corrupt(format!(
                "bytes {}..{} out of bounds in entity {} ({} bytes)",
                start,
                end,
                self.header.object_id,
                self.content.len()
            ))
        })
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64, LodestoreError> {
        u64_at(self.content, to_usize(offset)?)
    }

    pub fn read_object_id(&self, offset: u64) -> Result<ObjectId, LodestoreError> {
        self.read_u64(offset).map(ObjectId)
    }

    /// Payload of the trailing variable-length field at `offset`.
    ///
    /// The payload must end exactly at the end of the record.
    pub fn read_variable(&self, offset: u64) -> Result<&'a [u8], LodestoreError> {
        let length = self.read_u64(offset)?;
        let start = offset
            .checked_add(LENGTH_PREFIX_LENGTH)
            .ok_or_else(|| corrupt("offset overflow"))?;
        let payload = self.slice(start, length)?;
        if start.saturating_add(length) != self.header.content_length {
            return Err(corrupt(format!(
                "variable field of entity {} does not end the record",
                self.header.object_id
            )));
        }
        Ok(payload)
    }

    /// Object ids of a trailing reference list at `offset`.
    pub fn read_object_ids(&self, offset: u64) -> Result<Vec<ObjectId>, LodestoreError> {
        let payload = self.read_variable(offset)?;
        if payload.len() as u64 % REFERENCE_LENGTH != 0 {
            return Err(corrupt(format!(
                "reference list of entity {} has {} bytes",
                self.header.object_id,
                payload.len()
            )));
        }
        payload
            .chunks_exact(REFERENCE_LENGTH as usize)
            .map(|chunk| u64_at(chunk, 0).map(ObjectId))
            .collect()
    }
}

// =============================================================================
// RECORD ITERATION
// =============================================================================

/// Iterator over consecutive entity records in a byte chunk.
///
/// Yields an error once and then stops if a record is truncated or claims
/// an impossible content length.
#[derive(Debug, Clone)]
pub struct EntityRecords<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> EntityRecords<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn next_record(&mut self) -> Result<EntityData<'a>, LodestoreError> {
        let rest = self
            .bytes
            .get(self.position..)
            .ok_or_else(|| corrupt("position out of bounds"))?;
        if (rest.len() as u64) < ENTITY_HEADER_LENGTH {
            return Err(corrupt(format!(
                "truncated header at byte {}",
                self.position
            )));
        }
        let header = EntityHeader::from_bytes(rest)?;
        if header.content_length > MAX_ENTITY_CONTENT_LENGTH {
            return Err(corrupt(format!(
                "entity {} claims {} content bytes",
                header.object_id, header.content_length
            )));
        }
        let total = to_usize(ENTITY_HEADER_LENGTH.saturating_add(header.content_length))?;
        let raw = rest.get(..total).ok_or_else(|| {
            corrupt(format!(
                "truncated content of entity {} at byte {}",
                header.object_id, self.position
            ))
        })?;
        self.position = self.position.saturating_add(total);
        EntityData::parse(raw)
    }
}

impl<'a> Iterator for EntityRecords<'a> {
    type Item = Result<EntityData<'a>, LodestoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.bytes.len() {
            return None;
        }
        let record = self.next_record();
        if record.is_err() {
            self.position = self.bytes.len();
        }
        Some(record)
    }
}

// =============================================================================
// TESTS
// =============================================================================
