//! # Type Registry
//!
//! Binds type ids to handlers and validates layouts across runs.
//!
//! ## Contents
//!
//! - `TypeId -> EntityTypeHandler`: one per known definition, including
//!   legacy ones without a runtime counterpart
//! - `TypeId -> TypeHandler`: runtime handlers that materialize instances
//! - runtime type -> `TypeId`
//! - the dictionary the registry was initialized from
//!
//! ## Locking
//!
//! All state sits behind one `RwLock`. Mutations take the write lock and
//! build every handler before publishing anything, so a failed call leaves
//! no partial registration behind and readers never see a half-built
//! handler.

use crate::definition::TypeDefinition;
use crate::dictionary::TypeDictionary;
use crate::handler::{EntityTypeHandler, TypeHandler};
use crate::{LodestoreError, ObjectId, TypeId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct RegistryState {
    dictionary: Option<Arc<TypeDictionary>>,
    entity_handlers: BTreeMap<TypeId, Arc<EntityTypeHandler>>,
    type_handlers: BTreeMap<TypeId, Arc<dyn TypeHandler>>,
    runtime_types: BTreeMap<std::any::TypeId, TypeId>,
}

impl RegistryState {
    /// Check `definition` against what is already registered under its id.
    /// Returns the existing handler if the layouts are equal.
    fn check_definition(
        &self,
        definition: &TypeDefinition,
    ) -> Result<Option<Arc<EntityTypeHandler>>, LodestoreError> {
        match self.entity_handlers.get(&definition.type_id()) {
            None => Ok(None),
            Some(existing) if existing.definition().is_layout_equal(definition) => {
                Ok(Some(Arc::clone(existing)))
            }
            Some(_) => Err(LodestoreError::TypeDefinitionMismatch {
                type_id: definition.type_id(),
                type_name: definition.type_name().to_string(),
            }),
        }
    }
}

/// Shared registry of type handlers.
#[derive(Default)]
pub struct TypeRegistry {
    state: RwLock<RegistryState>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("TypeRegistry")
            .field("initialized", &state.dictionary.is_some())
            .field("entity_handlers", &state.entity_handlers.len())
            .field("type_handlers", &state.type_handlers.len())
            .finish()
    }
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Register a definition and return its storage-side handler.
    ///
    /// Registering a layout-equal definition again returns the existing
    /// handler; a different layout under a registered id fails.
    pub fn register_type_description(
        &self,
        definition: TypeDefinition,
    ) -> Result<Arc<EntityTypeHandler>, LodestoreError> {
        let mut state = self.state.write();
        match state.check_definition(&definition) {
            Ok(Some(existing)) => Ok(existing),
            Ok(None) => {
                let handler = Arc::new(EntityTypeHandler::new(definition));
                tracing::debug!(
                    type_id = %handler.type_id(),
                    type_name = handler.type_name(),
                    "registered type description"
                );
                state
                    .entity_handlers
                    .insert(handler.type_id(), Arc::clone(&handler));
                Ok(handler)
            }
            Err(_) => {
                let existing = state
                    .entity_handlers
                    .get(&definition.type_id())
                    .map(|h| h.type_name().to_string())
                    .unwrap_or_default();
                tracing::warn!(type_id = %definition.type_id(), "type id already registered");
                Err(LodestoreError::TypeIdAlreadyRegistered {
                    type_id: definition.type_id(),
                    type_name: existing,
                })
            }
        }
    }

    /// Bind a runtime handler to its type id and runtime type.
    pub fn register_type_handler(&self, handler: Arc<dyn TypeHandler>) -> Result<(), LodestoreError> {
        // Lazy layout derivation runs outside the lock.
        let definition = handler.type_definition()?.clone();
        let type_id = handler.type_id();
        let runtime = handler.runtime_type();

        let mut state = self.state.write();
        if let Some(existing) = state.type_handlers.get(&type_id) {
            if Arc::ptr_eq(existing, &handler) {
                return Ok(());
            }
            return Err(LodestoreError::TypeIdAlreadyRegistered {
                type_id,
                type_name: existing.type_name().to_string(),
            });
        }
        if let Some(runtime) = runtime {
            if let Some(bound) = state.runtime_types.get(&runtime.id) {
                return Err(LodestoreError::RuntimeTypeAlreadyRegistered {
                    runtime_type: runtime.name.to_string(),
                    type_id: *bound,
                });
            }
        }
        let entity = match state.check_definition(&definition)? {
            Some(existing) => existing,
            None => Arc::new(EntityTypeHandler::new(definition)),
        };

        state.entity_handlers.insert(type_id, entity);
        if let Some(runtime) = runtime {
            state.runtime_types.insert(runtime.id, type_id);
        }
        state.type_handlers.insert(type_id, handler);
        tracing::debug!(type_id = %type_id, "registered type handler");
        Ok(())
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Storage-side handler for a type id.
    #[must_use]
    pub fn lookup_type_handler(&self, type_id: TypeId) -> Option<Arc<EntityTypeHandler>> {
        self.state.read().entity_handlers.get(&type_id).cloned()
    }

    /// Runtime handler for a type id.
    #[must_use]
    pub fn lookup_runtime_handler(&self, type_id: TypeId) -> Option<Arc<dyn TypeHandler>> {
        self.state.read().type_handlers.get(&type_id).cloned()
    }

    /// Runtime handler for a Rust type.
    #[must_use]
    pub fn handler_for<T: 'static>(&self) -> Option<Arc<dyn TypeHandler>> {
        self.handler_for_runtime(std::any::TypeId::of::<T>())
    }

    /// Runtime handler for a runtime type handle.
    #[must_use]
    pub fn handler_for_runtime(&self, runtime: std::any::TypeId) -> Option<Arc<dyn TypeHandler>> {
        let state = self.state.read();
        state
            .runtime_types
            .get(&runtime)
            .and_then(|id| state.type_handlers.get(id))
            .cloned()
    }

    /// Current definition carrying `type_name` (highest type id).
    #[must_use]
    pub fn lookup_type_by_name(&self, type_name: &str) -> Option<TypeDefinition> {
        self.state
            .read()
            .entity_handlers
            .values()
            .rev()
            .find(|h| h.type_name() == type_name)
            .map(|h| h.definition().clone())
    }

    #[must_use]
    pub fn lookup_type_by_id(&self, type_id: TypeId) -> Option<TypeDefinition> {
        self.lookup_type_handler(type_id)
            .map(|h| h.definition().clone())
    }

    #[must_use]
    pub fn highest_type_id(&self) -> Option<TypeId> {
        self.state.read().entity_handlers.keys().next_back().copied()
    }

    /// Visit every runtime handler in type id order.
    pub fn iterate_type_handlers(&self, mut visit: impl FnMut(&Arc<dyn TypeHandler>)) {
        let handlers: Vec<_> = self.state.read().type_handlers.values().cloned().collect();
        for handler in &handlers {
            visit(handler);
        }
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Fail if no handler exists for `type_id`.
    pub fn validate_entity_type_id(&self, type_id: TypeId) -> Result<(), LodestoreError> {
        if self.state.read().entity_handlers.contains_key(&type_id) {
            Ok(())
        } else {
            Err(LodestoreError::UnhandledTypeId(type_id))
        }
    }

    /// Check a record header before decoding it.
    pub fn validate_entity(
        &self,
        length: u64,
        type_id: TypeId,
        object_id: ObjectId,
    ) -> Result<Arc<EntityTypeHandler>, LodestoreError> {
        let handler = self.lookup_type_handler(type_id).ok_or(
            LodestoreError::UnknownEntityType {
                type_id,
                object_id,
                length,
            },
        )?;
        handler.validate_entity(length, object_id)?;
        Ok(handler)
    }

    /// Check that every definition of `dictionary` is layout-equal to the
    /// registered definition with the same id. Ids unknown to the registry
    /// are accepted; `initialize` registers them.
    pub fn validate(&self, dictionary: &TypeDictionary) -> Result<(), LodestoreError> {
        let state = self.state.read();
        for definition in dictionary.all_types() {
            state.check_definition(definition).inspect_err(|e| {
                tracing::warn!(error = %e, "dictionary validation failed");
            })?;
        }
        Ok(())
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Bind the registry to `dictionary` and register all of its types.
    ///
    /// Calling again with the same dictionary instance is a no-op; any other
    /// dictionary fails with `AlreadyInitialized`. Nothing is registered
    /// unless every definition is accepted.
    pub fn initialize(&self, dictionary: Arc<TypeDictionary>) -> Result<(), LodestoreError> {
        let mut state = self.state.write();
        if let Some(current) = &state.dictionary {
            if Arc::ptr_eq(current, &dictionary) {
                return Ok(());
            }
            return Err(LodestoreError::AlreadyInitialized);
        }

        let mut staged = Vec::new();
        for definition in dictionary.all_types() {
            if state.check_definition(definition)?.is_none() {
                staged.push(Arc::new(EntityTypeHandler::new(definition.clone())));
            }
        }
        let added = staged.len();
        for handler in staged {
            state.entity_handlers.insert(handler.type_id(), handler);
        }
        state.dictionary = Some(dictionary);
        tracing::debug!(added, "type registry initialized");
        Ok(())
    }

    /// Dictionary the registry was initialized with, if any.
    #[must_use]
    pub fn dictionary(&self) -> Option<Arc<TypeDictionary>> {
        self.state.read().dictionary.clone()
    }

    /// Every registered definition, as a dictionary.
    pub fn dictionary_snapshot(&self) -> Result<TypeDictionary, LodestoreError> {
        let state = self.state.read();
        TypeDictionary::from_definitions(
            state
                .entity_handlers
                .values()
                .map(|h| h.definition().clone()),
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
