//! # redb-backed Entity Store
//!
//! A disk-backed store for entity records using the redb embedded database,
//! providing:
//! - ACID transactions (a stored chunk is committed whole or not at all)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! ## Tables
//!
//! | Table      | Key             | Value                         |
//! |------------|-----------------|-------------------------------|
//! | `entities` | object id (u64) | raw entity record             |
//! | `metadata` | name            | dictionary file, root id list |
//! | `counters` | name            | next object id                |

use crate::binary::{EntityData, EntityRecords};
use crate::dictionary::TypeDictionary;
use crate::formats::{dictionary_from_bytes, dictionary_to_bytes};
use crate::persister::StoredChunk;
use crate::primitives::FIRST_OBJECT_ID;
use crate::{LodestoreError, ObjectId};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for entities: ObjectId(u64) -> raw record bytes (header included)
const ENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("entities");

/// Table for metadata blobs: key string -> bytes
const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Table for counters: key string -> value u64
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const DICTIONARY_KEY: &str = "dictionary";
const ROOTS_KEY: &str = "roots";
const NEXT_OBJECT_ID_KEY: &str = "next_object_id";

/// A disk-backed entity store using redb.
pub struct RedbEntityStore {
    /// The redb database handle.
    db: Database,
    /// Next object id not yet handed out, mirrored from `counters`.
    next_object_id: u64,
}

impl std::fmt::Debug for RedbEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEntityStore")
            .field("next_object_id", &self.next_object_id)
            .finish_non_exhaustive()
    }
}

impl RedbEntityStore {
    /// Open or create an entity store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LodestoreError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| LodestoreError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ENTITIES)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(COUNTERS)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        }

        let next_object_id = {
            let read_txn = db
                .begin_read()
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            let table = read_txn
                .open_table(COUNTERS)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            table
                .get(NEXT_OBJECT_ID_KEY)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(FIRST_OBJECT_ID)
        };

        tracing::debug!(next_object_id, "opened entity store");
        Ok(Self { db, next_object_id })
    }

    /// Compact the database.
    pub fn compact(&mut self) -> Result<(), LodestoreError> {
        self.db
            .compact()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Write every record of `chunk`, its root list, the object id counter
    /// and (optionally) the dictionary in one transaction.
    ///
    /// Records are parsed before the transaction opens; a malformed chunk
    /// writes nothing. Records for known object ids are overwritten.
    pub fn commit_chunk(
        &mut self,
        chunk: &StoredChunk,
        next_object_id: u64,
        dictionary: Option<&TypeDictionary>,
    ) -> Result<(), LodestoreError> {
        let records = EntityRecords::new(&chunk.bytes).collect::<Result<Vec<EntityData<'_>>, _>>()?;
        let roots = postcard::to_stdvec(&chunk.roots.iter().map(|id| id.value()).collect::<Vec<u64>>())
            .map_err(|e| LodestoreError::SerializationError(e.to_string()))?;
        let dictionary_bytes = dictionary.map(dictionary_to_bytes).transpose()?;
        let next_object_id = next_object_id.max(self.next_object_id);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        {
            let mut entities = write_txn
                .open_table(ENTITIES)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            for record in &records {
                entities
                    .insert(record.object_id().value(), record.raw())
                    .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            }

            let mut metadata = write_txn
                .open_table(METADATA)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            metadata
                .insert(ROOTS_KEY, roots.as_slice())
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            if let Some(bytes) = &dictionary_bytes {
                metadata
                    .insert(DICTIONARY_KEY, bytes.as_slice())
                    .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            }

            let mut counters = write_txn
                .open_table(COUNTERS)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            counters
                .insert(NEXT_OBJECT_ID_KEY, next_object_id)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;

        self.next_object_id = next_object_id;
        tracing::debug!(
            records = records.len(),
            roots = chunk.roots.len(),
            next_object_id,
            "committed chunk"
        );
        Ok(())
    }

    /// Every stored record, concatenated in object id order.
    pub fn load_records(&self) -> Result<Vec<u8>, LodestoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;

        let mut bytes = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| LodestoreError::IoError(e.to_string()))?;
            bytes.extend_from_slice(value.value());
        }
        Ok(bytes)
    }

    /// The raw record of one object.
    pub fn record(&self, object_id: ObjectId) -> Result<Option<Vec<u8>>, LodestoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        Ok(table
            .get(object_id.value())
            .map_err(|e| LodestoreError::IoError(e.to_string()))?
            .map(|v| v.value().to_vec()))
    }

    fn metadata(&self, key: &str) -> Result<Option<Vec<u8>>, LodestoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(METADATA)
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        Ok(table
            .get(key)
            .map_err(|e| LodestoreError::IoError(e.to_string()))?
            .map(|v| v.value().to_vec()))
    }

    /// Root object ids of the last committed chunk, in stored order.
    pub fn roots(&self) -> Result<Vec<ObjectId>, LodestoreError> {
        let Some(bytes) = self.metadata(ROOTS_KEY)? else {
            return Ok(Vec::new());
        };
        let roots: Vec<u64> = postcard::from_bytes(&bytes)
            .map_err(|e| LodestoreError::DeserializationError(e.to_string()))?;
        Ok(roots.into_iter().map(ObjectId).collect())
    }

    /// Replace the stored dictionary.
    pub fn save_dictionary(&self, dictionary: &TypeDictionary) -> Result<(), LodestoreError> {
        let bytes = dictionary_to_bytes(dictionary)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        {
            let mut metadata = write_txn
                .open_table(METADATA)
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
            metadata
                .insert(DICTIONARY_KEY, bytes.as_slice())
                .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        tracing::debug!(types = dictionary.len(), "saved type dictionary");
        Ok(())
    }

    /// The stored dictionary, if one was ever saved.
    pub fn load_dictionary(&self) -> Result<Option<TypeDictionary>, LodestoreError> {
        self.metadata(DICTIONARY_KEY)?
            .map(|bytes| dictionary_from_bytes(&bytes))
            .transpose()
    }

    /// Number of stored entity records.
    pub fn entity_count(&self) -> Result<usize, LodestoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        let count = table
            .len()
            .map_err(|e| LodestoreError::IoError(e.to_string()))?;
        usize::try_from(count).map_err(|e| LodestoreError::CapacityExceeded(e.to_string()))
    }

    /// Next object id not yet handed out.
    #[must_use]
    pub fn next_object_id(&self) -> u64 {
        self.next_object_id
    }
}

// =============================================================================
// TESTS
// =============================================================================
