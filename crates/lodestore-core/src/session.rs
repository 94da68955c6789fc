//! # Session
//!
//! A [`Session`] ties a [`TypeRegistry`] to a [`RedbEntityStore`] and owns the
//! live [`ObjectGraph`] together with the object ids bound to it.
//!
//! Opening a session validates the stored dictionary against the registry:
//! every stored definition must be layout-equal to the registered one with
//! the same id. Stored types the registry does not know yet are registered
//! as storage-only types, so their records can still be validated and
//! traversed. On load, their records are rewritten into the current type of
//! the same (or refactored) name; see [`Session::with_refactoring`].

use crate::binary::{EntityData, EntityRecords};
use crate::dictionary::TypeDictionary;
use crate::graph::ObjectGraph;
use crate::handler::EntityTypeHandler;
use crate::persister::{Loader, ObjectIdRegistry, StoredChunk, Storer};
use crate::primitives::DEFAULT_SIMILARITY_THRESHOLD;
use crate::refactoring::{LegacyMemberMapper, MemberSimilarity, RefactoringMapping, RefactoringResolver};
use crate::registry::TypeRegistry;
use crate::storage::RedbEntityStore;
use crate::traversal::{ReferenceHandler, TraverserProvider, TypeTraverser};
use crate::{LodestoreError, ObjRef, ObjectId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

/// Registry, store and live object graph.
#[derive(Debug)]
pub struct Session {
    registry: Arc<TypeRegistry>,
    store: RedbEntityStore,
    graph: ObjectGraph,
    ids: ObjectIdRegistry,
    refactoring: RefactoringResolver,
    similarity: MemberSimilarity,
    similarity_threshold: f64,
}

/// Summary of a store, as reported by [`Session::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub entity_count: usize,
    pub type_count: usize,
    pub next_object_id: u64,
    pub roots: Vec<ObjectId>,
}

/// A stored record that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidRecord {
    pub object_id: ObjectId,
    pub error: String,
}

/// A reference to an object id with no stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DanglingReference {
    pub from: ObjectId,
    pub to: ObjectId,
}

/// Result of [`Session::check`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub entity_count: usize,
    pub reachable: usize,
    /// Valid records no root reaches.
    pub unreachable: Vec<ObjectId>,
    pub invalid: Vec<InvalidRecord>,
    pub dangling: Vec<DanglingReference>,
    /// Root ids without a stored record.
    pub missing_roots: Vec<ObjectId>,
}

impl CheckReport {
    /// Check if the store has no invalid records, dangling references or
    /// missing roots. Unreachable records are reported but tolerated.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.invalid.is_empty() && self.dangling.is_empty() && self.missing_roots.is_empty()
    }
}

impl Session {
    /// Open (or create) the store at `path` and bind its dictionary to
    /// `registry`.
    pub fn open(path: impl AsRef<Path>, registry: Arc<TypeRegistry>) -> Result<Self, LodestoreError> {
        let store = RedbEntityStore::open(path)?;
        if let Some(dictionary) = store.load_dictionary()? {
            registry.validate(&dictionary)?;
            if registry.dictionary().is_none() {
                registry.initialize(Arc::new(dictionary))?;
            } else {
                for definition in dictionary.all_types() {
                    registry.register_type_description(definition.clone())?;
                }
            }
        }
        let ids = ObjectIdRegistry::starting_at(store.next_object_id());
        tracing::debug!(next_object_id = ids.next_object_id(), "session opened");
        Ok(Self {
            registry,
            store,
            graph: ObjectGraph::new(),
            ids,
            refactoring: RefactoringResolver::new(RefactoringMapping::new()),
            similarity: MemberSimilarity::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        })
    }

    /// Map legacy types and members through `resolver`, matching the
    /// remaining members by `similarity` at `threshold` or above.
    #[must_use]
    pub fn with_refactoring(
        mut self,
        resolver: RefactoringResolver,
        similarity: MemberSimilarity,
        threshold: f64,
    ) -> Self {
        self.refactoring = resolver;
        self.similarity = similarity;
        self.similarity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        &mut self.graph
    }

    /// Object id bound to a live instance, if it was stored or loaded.
    #[must_use]
    pub fn object_id(&self, reference: ObjRef) -> Option<ObjectId> {
        self.ids.object_id(reference)
    }

    /// Store everything reachable from `roots` and make `roots` the stored
    /// root list. The registry's definitions are saved alongside.
    pub fn store_roots(&mut self, roots: &[ObjRef]) -> Result<StoredChunk, LodestoreError> {
        let chunk = Storer::new(&self.registry).store(&self.graph, roots, &mut self.ids)?;
        let dictionary = self.registry.dictionary_snapshot()?;
        self.store
            .commit_chunk(&chunk, self.ids.next_object_id(), Some(&dictionary))?;
        tracing::info!(
            entities = chunk.entity_count,
            roots = chunk.roots.len(),
            "stored roots"
        );
        Ok(chunk)
    }

    /// Load every stored record into the graph and return the stored roots.
    pub fn load_roots(&mut self) -> Result<Vec<ObjRef>, LodestoreError> {
        let bytes = self.store.load_records()?;
        let mapper = LegacyMemberMapper::new(&self.refactoring, &self.similarity)
            .with_threshold(self.similarity_threshold);
        let loaded = Loader::new(&self.registry)
            .with_legacy_mapper(mapper)
            .load(&mut self.graph, &mut self.ids, &bytes)?;
        let roots = self
            .store
            .roots()?
            .into_iter()
            .map(|id| {
                self.ids
                    .object_ref(id)
                    .ok_or(LodestoreError::UnresolvedReference(id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(entities = loaded.len(), roots = roots.len(), "loaded roots");
        Ok(roots)
    }

    /// Merge `dictionary` into the registry and persist the result.
    ///
    /// Fails without changes if any definition conflicts with a registered
    /// layout.
    pub fn import_dictionary(&mut self, dictionary: &TypeDictionary) -> Result<(), LodestoreError> {
        self.registry.validate(dictionary)?;
        for definition in dictionary.all_types() {
            self.registry.register_type_description(definition.clone())?;
        }
        self.save_dictionary()
    }

    /// Persist the registry's current definitions.
    pub fn save_dictionary(&mut self) -> Result<(), LodestoreError> {
        let dictionary = self.registry.dictionary_snapshot()?;
        self.store.save_dictionary(&dictionary)
    }

    pub fn status(&self) -> Result<SessionStatus, LodestoreError> {
        Ok(SessionStatus {
            entity_count: self.store.entity_count()?,
            type_count: self.registry.dictionary_snapshot()?.len(),
            next_object_id: self.store.next_object_id(),
            roots: self.store.roots()?,
        })
    }

    pub fn compact(&mut self) -> Result<(), LodestoreError> {
        self.store.compact()
    }

    /// Validate every stored record and walk the stored references from the
    /// roots.
    pub fn check(&self) -> Result<CheckReport, LodestoreError> {
        let bytes = self.store.load_records()?;
        let mut report = CheckReport::default();
        let mut stored = BTreeSet::new();
        let mut records = BTreeMap::new();

        for record in EntityRecords::new(&bytes) {
            let data = record?;
            let object_id = data.object_id();
            report.entity_count += 1;
            stored.insert(object_id);
            match self
                .registry
                .validate_entity(data.content_length(), data.type_id(), object_id)
            {
                Ok(handler) => {
                    records.insert(object_id, CheckedRecord { data, handler });
                }
                Err(e) => report.invalid.push(InvalidRecord {
                    object_id,
                    error: e.to_string(),
                }),
            }
        }

        let roots = self.store.roots()?;
        report.missing_roots = roots
            .iter()
            .copied()
            .filter(|id| !stored.contains(id))
            .collect();

        let provider = RecordTraverserProvider { records: &records };
        let mut reachable = BTreeSet::new();
        let mut dangling = BTreeSet::new();
        ReferenceHandler::new(&provider)
            .skip(|id: ObjectId| !records.contains_key(&id))
            .leaf(|id: ObjectId| {
                records
                    .get(&id)
                    .is_some_and(|record| !record.handler.has_references())
            })
            .handle(roots.iter().copied(), |id, _| {
                reachable.insert(id);
                if let Some(record) = records.get(&id) {
                    record.handler.iterate_references(&record.data, &mut |to: ObjectId| {
                        if !stored.contains(&to) {
                            dangling.insert(DanglingReference { from: id, to });
                        }
                    })?;
                }
                Ok(ControlFlow::Continue(()))
            })?;

        report.reachable = reachable.len();
        report.unreachable = records
            .keys()
            .copied()
            .filter(|id| !reachable.contains(id))
            .collect();
        report.dangling = dangling.into_iter().collect();

        tracing::debug!(
            entities = report.entity_count,
            reachable = report.reachable,
            invalid = report.invalid.len(),
            dangling = report.dangling.len(),
            "checked store"
        );
        Ok(report)
    }
}

// =============================================================================
// TRAVERSAL OVER STORED RECORDS
// =============================================================================

struct CheckedRecord<'b> {
    data: EntityData<'b>,
    handler: Arc<EntityTypeHandler>,
}

struct RecordTraverserProvider<'r, 'b> {
    records: &'r BTreeMap<ObjectId, CheckedRecord<'b>>,
}

struct RecordTraverser<'b> {
    data: EntityData<'b>,
    handler: Arc<EntityTypeHandler>,
}

impl TypeTraverser<ObjectId> for RecordTraverser<'_> {
    fn traverse_references(
        &self,
        _node: ObjectId,
        enqueue: &mut dyn FnMut(ObjectId),
    ) -> Result<(), LodestoreError> {
        self.handler.iterate_references(&self.data, enqueue)
    }
}

impl<'b> TraverserProvider<ObjectId> for RecordTraverserProvider<'_, 'b> {
    type Traverser = RecordTraverser<'b>;

    fn provide(&self, node: ObjectId) -> Result<RecordTraverser<'b>, LodestoreError> {
        let record = self
            .records
            .get(&node)
            .ok_or(LodestoreError::UnresolvedReference(node))?;
        Ok(RecordTraverser {
            data: record.data,
            handler: Arc::clone(&record.handler),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
