//! # Storer and Loader
//!
//! Drives the type handler protocol over whole object graphs.
//!
//! ## Storing
//!
//! A full traversal from the roots visits every reachable instance once.
//! Each visited instance gets an object id (kept stable across stores through
//! [`ObjectIdRegistry`]) and its handler appends one entity record to the
//! chunk. References are written as object ids, assigning ids on demand.
//!
//! ## Loading
//!
//! Records are loaded in phases so that cycles resolve:
//!
//! 1. every record is parsed and validated against the registry
//! 2. unknown object ids get a fresh instance through `create`
//! 3. references are set: `initialize_state` for new instances,
//!    `update_state` for instances that were already live
//! 4. `complete` runs on every loaded instance
//!
//! A failure removes the instances created by the failed load.
//!
//! With a [`LegacyMemberMapper`] configured, records of legacy types are
//! first rewritten into their current layout (see [`crate::legacy`]).

use crate::binary::{BinaryWriter, EntityData, EntityRecords};
use crate::graph::{GraphTraverserProvider, ObjectGraph};
use crate::handler::{LoadHandler, StoreHandler, TypeHandler};
use crate::legacy::{LegacyRecords, RewrittenChunk};
use crate::primitives::FIRST_OBJECT_ID;
use crate::refactoring::LegacyMemberMapper;
use crate::registry::TypeRegistry;
use crate::traversal::ReferenceHandler;
use crate::{LodestoreError, ObjRef, ObjectId};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::sync::Arc;

// =============================================================================
// OBJECT ID REGISTRY
// =============================================================================

/// Bijection between live instances and persisted object ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdRegistry {
    by_ref: BTreeMap<ObjRef, ObjectId>,
    by_id: BTreeMap<ObjectId, ObjRef>,
    next_object_id: u64,
}

impl Default for ObjectIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectIdRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(FIRST_OBJECT_ID)
    }

    /// Registry whose next assigned id is `next_object_id` (never below
    /// `FIRST_OBJECT_ID`).
    #[must_use]
    pub fn starting_at(next_object_id: u64) -> Self {
        Self {
            by_ref: BTreeMap::new(),
            by_id: BTreeMap::new(),
            next_object_id: next_object_id.max(FIRST_OBJECT_ID),
        }
    }

    /// Object id of `reference`, assigning the next free id if it has none.
    /// The flag is true when a new id was assigned.
    pub fn ensure_id(&mut self, reference: ObjRef) -> Result<(ObjectId, bool), LodestoreError> {
        if let Some(id) = self.by_ref.get(&reference) {
            return Ok((*id, false));
        }
        let id = ObjectId(self.next_object_id);
        self.next_object_id = self
            .next_object_id
            .checked_add(1)
            .ok_or_else(|| LodestoreError::CapacityExceeded("object id space".to_string()))?;
        self.by_ref.insert(reference, id);
        self.by_id.insert(id, reference);
        Ok((id, true))
    }

    #[must_use]
    pub fn object_id(&self, reference: ObjRef) -> Option<ObjectId> {
        self.by_ref.get(&reference).copied()
    }

    #[must_use]
    pub fn object_ref(&self, id: ObjectId) -> Option<ObjRef> {
        self.by_id.get(&id).copied()
    }

    /// Bind a loaded instance to its persisted id.
    pub fn bind(&mut self, id: ObjectId, reference: ObjRef) -> Result<(), LodestoreError> {
        if id.is_null() {
            return Err(LodestoreError::CorruptRecord(
                "entity record with null object id".to_string(),
            ));
        }
        if self.by_id.contains_key(&id) {
            return Err(LodestoreError::DuplicateObjectId(id));
        }
        self.by_id.insert(id, reference);
        self.by_ref.insert(reference, id);
        if id.value() >= self.next_object_id {
            self.next_object_id = id.value().saturating_add(1);
        }
        Ok(())
    }

    /// Forget a binding made by a failed operation.
    pub(crate) fn unbind(&mut self, id: ObjectId) {
        if let Some(reference) = self.by_id.remove(&id) {
            self.by_ref.remove(&reference);
        }
    }

    /// Restore the id counter saved before a failed operation.
    pub(crate) fn rewind(&mut self, next_object_id: u64) {
        self.next_object_id = next_object_id.max(FIRST_OBJECT_ID);
    }

    /// The id the next `ensure_id` call would assign.
    #[must_use]
    pub fn next_object_id(&self) -> u64 {
        self.next_object_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Resolves persisted references against the id registry. References to
/// dropped records resolve to nothing.
struct IdResolver<'a> {
    ids: &'a ObjectIdRegistry,
    dropped: &'a BTreeSet<ObjectId>,
}

impl LoadHandler for IdResolver<'_> {
    fn lookup_reference(&self, id: ObjectId) -> Result<Option<ObjRef>, LodestoreError> {
        if id.is_null() || self.dropped.contains(&id) {
            return Ok(None);
        }
        self.ids
            .object_ref(id)
            .map(Some)
            .ok_or(LodestoreError::UnresolvedReference(id))
    }
}

/// Assigns ids to referenced instances while storing.
struct IdAssigner<'a> {
    ids: &'a mut ObjectIdRegistry,
    assigned: &'a mut Vec<ObjectId>,
}

impl IdAssigner<'_> {
    fn assign(&mut self, reference: ObjRef) -> Result<ObjectId, LodestoreError> {
        let (id, fresh) = self.ids.ensure_id(reference)?;
        if fresh {
            self.assigned.push(id);
        }
        Ok(id)
    }
}

impl StoreHandler for IdAssigner<'_> {
    fn apply(&mut self, reference: ObjRef) -> Result<ObjectId, LodestoreError> {
        self.assign(reference)
    }
}

// =============================================================================
// STORER
// =============================================================================

/// Entity records produced by one store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    /// Concatenated entity records, in traversal order.
    pub bytes: Vec<u8>,
    /// Object ids of the roots, in the order given.
    pub roots: Vec<ObjectId>,
    pub entity_count: usize,
}

/// Serializes the instances reachable from a set of roots.
#[derive(Debug, Clone, Copy)]
pub struct Storer<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> Storer<'r> {
    #[must_use]
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Store every instance reachable from `roots`.
    ///
    /// On failure, ids assigned by this call are released again and the id
    /// counter is restored.
    pub fn store(
        &self,
        graph: &ObjectGraph,
        roots: &[ObjRef],
        ids: &mut ObjectIdRegistry,
    ) -> Result<StoredChunk, LodestoreError> {
        let next_object_id = ids.next_object_id();
        let mut assigned = Vec::new();
        let result = self.store_reachable(graph, roots, ids, &mut assigned);
        if result.is_err() {
            for id in assigned {
                ids.unbind(id);
            }
            ids.rewind(next_object_id);
        }
        result
    }

    fn store_reachable(
        &self,
        graph: &ObjectGraph,
        roots: &[ObjRef],
        ids: &mut ObjectIdRegistry,
        assigned: &mut Vec<ObjectId>,
    ) -> Result<StoredChunk, LodestoreError> {
        let provider = GraphTraverserProvider::new(graph, self.registry);
        let mut out = BinaryWriter::new();
        let mut entity_count = 0usize;

        let mut assigner = IdAssigner { ids, assigned };
        let root_ids = roots
            .iter()
            .map(|root| {
                graph.runtime_type(*root)?;
                assigner.assign(*root)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let summary = ReferenceHandler::new(&provider).handle(roots.iter().copied(), |node, _| {
            let handler = provider.handler(node)?;
            let object_id = assigner.assign(node)?;
            handler.store(&mut out, object_id, graph.get_any(node)?, &mut assigner)?;
            entity_count += 1;
            Ok(ControlFlow::Continue(()))
        })?;

        tracing::debug!(
            entities = entity_count,
            visited = summary.visited(),
            bytes = out.len(),
            "stored object graph"
        );
        Ok(StoredChunk {
            bytes: out.into_bytes(),
            roots: root_ids,
            entity_count,
        })
    }
}

// =============================================================================
// LOADER
// =============================================================================

struct PlannedRecord<'a> {
    data: EntityData<'a>,
    handler: Arc<dyn TypeHandler>,
    existing: Option<ObjRef>,
}

/// Materializes entity records into an object graph.
#[derive(Debug, Clone, Copy)]
pub struct Loader<'r> {
    registry: &'r TypeRegistry,
    legacy: Option<LegacyMemberMapper<'r>>,
}

impl<'r> Loader<'r> {
    #[must_use]
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            legacy: None,
        }
    }

    /// Load records of legacy types through `mapper`. Without it they fail
    /// with `UnhandledTypeId`.
    #[must_use]
    pub fn with_legacy_mapper(mut self, mapper: LegacyMemberMapper<'r>) -> Self {
        self.legacy = Some(mapper);
        self
    }

    /// Load every record in `bytes`, returning the instance of each record
    /// in record order. Records of deleted types have no instance.
    pub fn load(
        &self,
        graph: &mut ObjectGraph,
        ids: &mut ObjectIdRegistry,
        bytes: &[u8],
    ) -> Result<Vec<ObjRef>, LodestoreError> {
        let chunk = match self.legacy {
            Some(mapper) => LegacyRecords::new(self.registry, mapper).rewrite(bytes)?,
            None => RewrittenChunk::unchanged(bytes),
        };
        let plan = self.plan(ids, &chunk.bytes)?;

        let graph_len = graph.len();
        let next_object_id = ids.next_object_id();
        let mut bound = Vec::new();
        let result = Self::apply(&plan, graph, ids, &chunk.dropped, &mut bound);
        if let Err(e) = &result {
            tracing::warn!(error = %e, created = bound.len(), "load failed, rolling back");
            for id in bound {
                ids.unbind(id);
            }
            ids.rewind(next_object_id);
            graph.truncate(graph_len);
        }
        result
    }

    /// Parse and validate every record before touching the graph.
    fn plan<'b>(
        &self,
        ids: &ObjectIdRegistry,
        bytes: &'b [u8],
    ) -> Result<Vec<PlannedRecord<'b>>, LodestoreError> {
        let mut seen = BTreeSet::new();
        let mut plan = Vec::new();
        for record in EntityRecords::new(bytes) {
            let data = record?;
            let object_id = data.object_id();
            self.registry
                .validate_entity(data.content_length(), data.type_id(), object_id)?;
            let handler = self
                .registry
                .lookup_runtime_handler(data.type_id())
                .ok_or(LodestoreError::UnhandledTypeId(data.type_id()))?;
            if object_id.is_null() {
                return Err(LodestoreError::CorruptRecord(
                    "entity record with null object id".to_string(),
                ));
            }
            if !seen.insert(object_id) {
                return Err(LodestoreError::DuplicateObjectId(object_id));
            }
            plan.push(PlannedRecord {
                data,
                handler,
                existing: ids.object_ref(object_id),
            });
        }
        Ok(plan)
    }

    fn apply(
        plan: &[PlannedRecord<'_>],
        graph: &mut ObjectGraph,
        ids: &mut ObjectIdRegistry,
        dropped: &BTreeSet<ObjectId>,
        bound: &mut Vec<ObjectId>,
    ) -> Result<Vec<ObjRef>, LodestoreError> {
        let mut refs = Vec::with_capacity(plan.len());
        for record in plan {
            let reference = match record.existing {
                Some(reference) => reference,
                None => {
                    let runtime = record.handler.runtime_type().ok_or_else(|| {
                        LodestoreError::TypeNotPersistable(record.handler.type_name().to_string())
                    })?;
                    let instance = record.handler.create(&record.data)?;
                    let reference = graph.insert_instance(instance, runtime)?;
                    ids.bind(record.data.object_id(), reference)?;
                    bound.push(record.data.object_id());
                    reference
                }
            };
            refs.push(reference);
        }

        let resolver = IdResolver {
            ids: &*ids,
            dropped,
        };
        for (record, reference) in plan.iter().zip(&refs) {
            let instance = graph.get_any_mut(*reference)?;
            if record.existing.is_some() {
                record
                    .handler
                    .update_state(&record.data, instance, &resolver)?;
            } else {
                record
                    .handler
                    .initialize_state(&record.data, instance, &resolver)?;
            }
        }

        for (record, reference) in plan.iter().zip(&refs) {
            record
                .handler
                .complete(&record.data, graph.get_any_mut(*reference)?)?;
        }

        tracing::debug!(
            records = plan.len(),
            created = bound.len(),
            "loaded entity records"
        );
        Ok(refs)
    }
}

// =============================================================================
// TESTS
// =============================================================================
