//! # Object Graph
//!
//! Arena holding the live instances that are stored and loaded. Instances
//! refer to each other through [`ObjRef`] indices, so cyclic structures need
//! no shared ownership. The arena only grows; a failed load truncates it back
//! to its previous length.

use crate::handler::{Instance, RuntimeType, TypeHandler};
use crate::registry::TypeRegistry;
use crate::traversal::{TraverserProvider, TypeTraverser};
use crate::{LodestoreError, ObjRef};
use std::any::Any;
use std::sync::Arc;

struct Slot {
    instance: Instance,
    runtime: RuntimeType,
}

/// Arena of live instances addressed by [`ObjRef`].
#[derive(Default)]
pub struct ObjectGraph {
    slots: Vec<Slot>,
}

impl std::fmt::Debug for ObjectGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectGraph")
            .field("len", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl ObjectGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance and return its handle.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Result<ObjRef, LodestoreError> {
        self.insert_instance(Box::new(value), RuntimeType::of::<T>())
    }

    /// Add a boxed instance whose runtime type is already known.
    pub fn insert_instance(
        &mut self,
        instance: Instance,
        runtime: RuntimeType,
    ) -> Result<ObjRef, LodestoreError> {
        let index = u32::try_from(self.slots.len()).map_err(|_| {
            LodestoreError::CapacityExceeded("object graph holds u32::MAX instances".to_string())
        })?;
        self.slots.push(Slot { instance, runtime });
        Ok(ObjRef(index))
    }

    fn slot(&self, reference: ObjRef) -> Result<&Slot, LodestoreError> {
        self.slots
            .get(reference.index())
            .ok_or(LodestoreError::UnknownInstance(reference))
    }

    fn slot_mut(&mut self, reference: ObjRef) -> Result<&mut Slot, LodestoreError> {
        self.slots
            .get_mut(reference.index())
            .ok_or(LodestoreError::UnknownInstance(reference))
    }

    /// Typed access to an instance.
    pub fn get<T: Any>(&self, reference: ObjRef) -> Result<&T, LodestoreError> {
        self.slot(reference)?
            .instance
            .downcast_ref::<T>()
            .ok_or_else(|| LodestoreError::InstanceTypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn get_mut<T: Any>(&mut self, reference: ObjRef) -> Result<&mut T, LodestoreError> {
        self.slot_mut(reference)?
            .instance
            .downcast_mut::<T>()
            .ok_or_else(|| LodestoreError::InstanceTypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn get_any(&self, reference: ObjRef) -> Result<&dyn Any, LodestoreError> {
        Ok(&*self.slot(reference)?.instance)
    }

    pub fn get_any_mut(&mut self, reference: ObjRef) -> Result<&mut dyn Any, LodestoreError> {
        Ok(&mut *self.slot_mut(reference)?.instance)
    }

    /// Runtime type recorded when the instance was inserted.
    pub fn runtime_type(&self, reference: ObjRef) -> Result<RuntimeType, LodestoreError> {
        Ok(self.slot(reference)?.runtime)
    }

    /// Handles of every instance, in insertion order.
    pub fn refs(&self) -> impl Iterator<Item = ObjRef> + '_ {
        (0..self.slots.len()).filter_map(|index| u32::try_from(index).ok().map(ObjRef))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every instance at or after `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }
}

// =============================================================================
// TRAVERSAL OVER LIVE INSTANCES
// =============================================================================

/// Resolves each live instance to the handler of its runtime type.
#[derive(Debug, Clone, Copy)]
pub struct GraphTraverserProvider<'g> {
    graph: &'g ObjectGraph,
    registry: &'g TypeRegistry,
}

impl<'g> GraphTraverserProvider<'g> {
    #[must_use]
    pub fn new(graph: &'g ObjectGraph, registry: &'g TypeRegistry) -> Self {
        Self { graph, registry }
    }

    /// Handler bound to the runtime type of `reference`.
    pub fn handler(&self, reference: ObjRef) -> Result<Arc<dyn TypeHandler>, LodestoreError> {
        let runtime = self.graph.runtime_type(reference)?;
        self.registry
            .handler_for_runtime(runtime.id)
            .ok_or_else(|| LodestoreError::UnhandledRuntimeType(runtime.name.to_string()))
    }
}

/// Enumerates the references held by one live instance.
pub struct InstanceTraverser<'g> {
    graph: &'g ObjectGraph,
    handler: Arc<dyn TypeHandler>,
}

impl TypeTraverser<ObjRef> for InstanceTraverser<'_> {
    fn traverse_references(
        &self,
        node: ObjRef,
        enqueue: &mut dyn FnMut(ObjRef),
    ) -> Result<(), LodestoreError> {
        self.handler
            .iterate_instance_references(self.graph.get_any(node)?, enqueue)
    }
}

impl<'g> TraverserProvider<ObjRef> for GraphTraverserProvider<'g> {
    type Traverser = InstanceTraverser<'g>;

    fn provide(&self, node: ObjRef) -> Result<InstanceTraverser<'g>, LodestoreError> {
        Ok(InstanceTraverser {
            graph: self.graph,
            handler: self.handler(node)?,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
