//! # Reference Handler
//!
//! Iterative breadth-first walk over a reference graph. Nodes are marked as
//! handled when they are enqueued, so every reachable node is visited at most
//! once regardless of cycles, and the call stack never grows with graph depth.
//!
//! Each dequeued node is classified by optional predicates:
//!
//! | Mode   | Precedence                 | Fallback |
//! |--------|----------------------------|----------|
//! | `Full` | leaf, node                 | full     |
//! | `Node` | full, leaf                 | node     |
//! | `Leaf` | full, node                 | leaf     |
//!
//! Only `Visit::Full` nodes have their references enumerated.

use super::{TraverserProvider, TypeTraverser, Worklist};
use crate::LodestoreError;
use std::collections::BTreeSet;
use std::ops::ControlFlow;

/// Predicate over traversal nodes.
pub type NodePredicate<'p, N> = Box<dyn Fn(N) -> bool + 'p>;

/// How a dequeued node is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Visit the node and enqueue its references.
    Full,
    /// Visit the node without enumerating its references.
    Node,
    /// Visit the node as a terminal.
    Leaf,
}

/// Default classification for nodes no predicate claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    #[default]
    Full,
    Node,
    Leaf,
}

/// Counters collected over one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraversalSummary {
    pub full: usize,
    pub node: usize,
    pub leaf: usize,
    /// The visitor requested an early stop.
    pub aborted: bool,
}

impl TraversalSummary {
    /// Total number of visited nodes.
    #[must_use]
    pub fn visited(&self) -> usize {
        self.full + self.node + self.leaf
    }
}

/// Configurable traversal over the nodes reachable from a set of roots.
pub struct ReferenceHandler<'p, N, P> {
    provider: &'p P,
    mode: TraversalMode,
    skip: Option<NodePredicate<'p, N>>,
    leaf: Option<NodePredicate<'p, N>>,
    node: Option<NodePredicate<'p, N>>,
    full: Option<NodePredicate<'p, N>>,
}

impl<'p, N, P> ReferenceHandler<'p, N, P>
where
    N: Copy + Ord,
    P: TraverserProvider<N>,
{
    #[must_use]
    pub fn new(provider: &'p P) -> Self {
        Self {
            provider,
            mode: TraversalMode::Full,
            skip: None,
            leaf: None,
            node: None,
            full: None,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: TraversalMode) -> Self {
        self.mode = mode;
        self
    }

    /// Never enqueue nodes matching `predicate`.
    #[must_use]
    pub fn skip(mut self, predicate: impl Fn(N) -> bool + 'p) -> Self {
        self.skip = Some(Box::new(predicate));
        self
    }

    #[must_use]
    pub fn leaf(mut self, predicate: impl Fn(N) -> bool + 'p) -> Self {
        self.leaf = Some(Box::new(predicate));
        self
    }

    #[must_use]
    pub fn node(mut self, predicate: impl Fn(N) -> bool + 'p) -> Self {
        self.node = Some(Box::new(predicate));
        self
    }

    #[must_use]
    pub fn full(mut self, predicate: impl Fn(N) -> bool + 'p) -> Self {
        self.full = Some(Box::new(predicate));
        self
    }

    /// Classify a node under the configured mode and predicates.
    #[must_use]
    pub fn classify(&self, node: N) -> Visit {
        let matches = |predicate: &Option<NodePredicate<'p, N>>| {
            predicate.as_ref().is_some_and(|p| p(node))
        };
        match self.mode {
            TraversalMode::Full => {
                if matches(&self.leaf) {
                    Visit::Leaf
                } else if matches(&self.node) {
                    Visit::Node
                } else {
                    Visit::Full
                }
            }
            TraversalMode::Node => {
                if matches(&self.full) {
                    Visit::Full
                } else if matches(&self.leaf) {
                    Visit::Leaf
                } else {
                    Visit::Node
                }
            }
            TraversalMode::Leaf => {
                if matches(&self.full) {
                    Visit::Full
                } else if matches(&self.node) {
                    Visit::Node
                } else {
                    Visit::Leaf
                }
            }
        }
    }

    fn enqueue(&self, node: N, worklist: &mut Worklist<N>, handled: &mut BTreeSet<N>) {
        // Skipped nodes count as handled, so the skip predicate sees each node once.
        if !handled.insert(node) {
            return;
        }
        if self.skip.as_ref().is_some_and(|p| p(node)) {
            return;
        }
        worklist.push(node);
    }

    /// Walk everything reachable from `roots`, calling `visitor` once per
    /// node. Returning `ControlFlow::Break` stops the walk.
    pub fn handle<I, V>(&self, roots: I, mut visitor: V) -> Result<TraversalSummary, LodestoreError>
    where
        I: IntoIterator<Item = N>,
        V: FnMut(N, Visit) -> Result<ControlFlow<()>, LodestoreError>,
    {
        let mut worklist = Worklist::new();
        let mut handled = BTreeSet::new();
        let mut summary = TraversalSummary::default();
        let mut pending = Vec::new();

        for root in roots {
            self.enqueue(root, &mut worklist, &mut handled);
        }

        while let Some(current) = worklist.pop() {
            let visit = self.classify(current);
            match visit {
                Visit::Full => summary.full += 1,
                Visit::Node => summary.node += 1,
                Visit::Leaf => summary.leaf += 1,
            }

            if visitor(current, visit)?.is_break() {
                summary.aborted = true;
                break;
            }

            if visit == Visit::Full {
                let traverser = self.provider.provide(current)?;
                traverser.traverse_references(current, &mut |reference| pending.push(reference))?;
                for reference in pending.drain(..) {
                    self.enqueue(reference, &mut worklist, &mut handled);
                }
            }
        }

        tracing::trace!(
            visited = summary.visited(),
            aborted = summary.aborted,
            "traversal finished"
        );
        Ok(summary)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Adjacency-list graph over `u32` nodes.
    struct Adjacency(BTreeMap<u32, Vec<u32>>);

    struct Edges(Vec<u32>);

    impl TypeTraverser<u32> for Edges {
        fn traverse_references(
            &self,
            _node: u32,
            enqueue: &mut dyn FnMut(u32),
        ) -> Result<(), LodestoreError> {
            for target in &self.0 {
                enqueue(*target);
            }
            Ok(())
        }
    }

    impl TraverserProvider<u32> for Adjacency {
        type Traverser = Edges;

        fn provide(&self, node: u32) -> Result<Edges, LodestoreError> {
            Ok(Edges(self.0.get(&node).cloned().unwrap_or_default()))
        }
    }

    fn graph(edges: &[(u32, u32)]) -> Adjacency {
        let mut map: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (from, to) in edges {
            map.entry(*from).or_default().push(*to);
        }
        Adjacency(map)
    }

    fn collect(handler: &ReferenceHandler<'_, u32, Adjacency>, roots: &[u32]) -> Vec<(u32, Visit)> {
        let mut seen = Vec::new();
        handler
            .handle(roots.iter().copied(), |n, v| {
                seen.push((n, v));
                Ok(ControlFlow::Continue(()))
            })
            .expect("traversal");
        seen
    }

    #[test]
    fn cycle_visits_each_node_once() {
        let g = graph(&[(1, 2), (2, 3), (3, 1), (3, 3)]);
        let handler = ReferenceHandler::new(&g);
        let seen = collect(&handler, &[1, 1, 2]);
        assert_eq!(
            seen,
            vec![(1, Visit::Full), (2, Visit::Full), (3, Visit::Full)]
        );
    }

    #[test]
    fn breadth_first_order() {
        let g = graph(&[(1, 2), (1, 3), (2, 4), (3, 5)]);
        let handler = ReferenceHandler::new(&g);
        let order: Vec<u32> = collect(&handler, &[1]).into_iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn leaf_predicate_stops_descent() {
        let g = graph(&[(1, 2), (2, 3)]);
        let handler = ReferenceHandler::new(&g).leaf(|n| n == 2);
        let seen = collect(&handler, &[1]);
        assert_eq!(seen, vec![(1, Visit::Full), (2, Visit::Leaf)]);
    }

    #[test]
    fn skip_predicate_never_visits() {
        let g = graph(&[(1, 2), (1, 3), (2, 4)]);
        let handler = ReferenceHandler::new(&g).skip(|n| n == 2);
        let nodes: Vec<u32> = collect(&handler, &[1]).into_iter().map(|(n, _)| n).collect();
        assert_eq!(nodes, vec![1, 3]);
    }

    #[test]
    fn skip_predicate_runs_once_per_node() {
        let g = graph(&[(1, 4), (2, 4), (3, 4), (1, 2), (2, 3)]);
        let calls = std::cell::Cell::new(0);
        let handler = ReferenceHandler::new(&g).skip(|n| {
            if n == 4 {
                calls.set(calls.get() + 1);
            }
            n == 4
        });
        let nodes: Vec<u32> = collect(&handler, &[1]).into_iter().map(|(n, _)| n).collect();
        assert_eq!(nodes, vec![1, 2, 3]);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn mode_precedence() {
        let g = graph(&[]);
        let handler = ReferenceHandler::new(&g)
            .leaf(|n| n % 2 == 0)
            .node(|n| n % 3 == 0)
            .full(|n| n % 5 == 0);

        // 6 matches leaf and node, 10 matches leaf and full, 15 node and full.
        assert_eq!(handler.classify(6), Visit::Leaf);
        assert_eq!(handler.classify(15), Visit::Node);
        assert_eq!(handler.classify(7), Visit::Full);

        let handler = handler.mode(TraversalMode::Node);
        assert_eq!(handler.classify(10), Visit::Full);
        assert_eq!(handler.classify(6), Visit::Leaf);
        assert_eq!(handler.classify(7), Visit::Node);

        let handler = handler.mode(TraversalMode::Leaf);
        assert_eq!(handler.classify(15), Visit::Full);
        assert_eq!(handler.classify(9), Visit::Node);
        assert_eq!(handler.classify(7), Visit::Leaf);
    }

    #[test]
    fn node_mode_visits_roots_only() {
        let g = graph(&[(1, 2)]);
        let handler = ReferenceHandler::new(&g).mode(TraversalMode::Node);
        let seen = collect(&handler, &[1]);
        assert_eq!(seen, vec![(1, Visit::Node)]);
    }

    #[test]
    fn visitor_can_abort() {
        let g = graph(&[(1, 2), (2, 3)]);
        let handler = ReferenceHandler::new(&g);
        let mut count = 0;
        let summary = handler
            .handle([1], |_, _| {
                count += 1;
                Ok(if count == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .expect("traversal");
        assert!(summary.aborted);
        assert_eq!(summary.visited(), 2);
    }

    #[test]
    fn visitor_error_propagates() {
        let g = graph(&[(1, 2)]);
        let handler = ReferenceHandler::new(&g);
        let err = handler
            .handle([1], |n, _| {
                if n == 2 {
                    Err(LodestoreError::UnhandledRuntimeType("Two".to_string()))
                } else {
                    Ok(ControlFlow::Continue(()))
                }
            })
            .expect_err("error");
        assert_eq!(err, LodestoreError::UnhandledRuntimeType("Two".to_string()));
    }

    #[test]
    fn long_chain_does_not_recurse() {
        let edges: Vec<(u32, u32)> = (0..5_000).map(|n| (n, n + 1)).collect();
        let g = graph(&edges);
        let summary = ReferenceHandler::new(&g)
            .handle([0], |_, _| Ok(ControlFlow::Continue(())))
            .expect("traversal");
        assert_eq!(summary.visited(), 5_001);
        assert_eq!(summary.full, 5_001);
    }
}
