//! # Traversal Engine
//!
//! Generic graph walk used by storing (over live instances), loading (over
//! persisted records) and consistency checks. The walk itself knows nothing
//! about instances or records: a [`TraverserProvider`] hands out the
//! [`TypeTraverser`] responsible for each node.

mod handler;
mod worklist;

pub use handler::{NodePredicate, ReferenceHandler, TraversalMode, TraversalSummary, Visit};
pub use worklist::Worklist;

use crate::LodestoreError;

/// Enumerates the direct references of one node.
pub trait TypeTraverser<N> {
    fn traverse_references(
        &self,
        node: N,
        enqueue: &mut dyn FnMut(N),
    ) -> Result<(), LodestoreError>;
}

/// Supplies the traverser responsible for a node, usually by looking up the
/// handler of the node's type.
pub trait TraverserProvider<N> {
    type Traverser: TypeTraverser<N>;

    fn provide(&self, node: N) -> Result<Self::Traverser, LodestoreError>;
}
