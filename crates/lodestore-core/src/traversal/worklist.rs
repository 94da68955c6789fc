//! # Segmented Worklist
//!
//! FIFO queue of pending nodes stored as a chain of fixed-size segments.
//! Consumed segments are released as soon as the read position moves past
//! them, so a long traversal never holds more than one exhausted segment.

use crate::primitives::SEGMENT_SIZE;
use std::collections::VecDeque;

/// Segmented FIFO of pending traversal nodes.
#[derive(Debug, Clone)]
pub struct Worklist<N> {
    segments: VecDeque<Vec<N>>,
    segment_size: usize,
    tail_index: usize,
}

impl<N: Copy> Default for Worklist<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Copy> Worklist<N> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_segment_size(SEGMENT_SIZE)
    }

    /// Create a worklist with a custom segment size (minimum 1).
    #[must_use]
    pub fn with_segment_size(segment_size: usize) -> Self {
        let segment_size = segment_size.max(1);
        let mut segments = VecDeque::new();
        segments.push_back(Vec::with_capacity(segment_size));
        Self {
            segments,
            segment_size,
            tail_index: 0,
        }
    }

    /// Append a node at the head of the queue.
    pub fn push(&mut self, node: N) {
        let needs_segment = self
            .segments
            .back()
            .is_none_or(|head| head.len() >= self.segment_size);
        if needs_segment {
            self.segments
                .push_back(Vec::with_capacity(self.segment_size));
        }
        if let Some(head) = self.segments.back_mut() {
            head.push(node);
        }
    }

    /// Take the oldest pending node.
    pub fn pop(&mut self) -> Option<N> {
        loop {
            let single = self.segments.len() == 1;
            let front = self.segments.front_mut()?;
            if let Some(node) = front.get(self.tail_index).copied() {
                self.tail_index += 1;
                return Some(node);
            }
            if single {
                // Single exhausted segment: rewind instead of reallocating.
                front.clear();
                self.tail_index = 0;
                return None;
            }
            self.segments.pop_front();
            self.tail_index = 0;
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pending nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        let total: usize = self.segments.iter().map(Vec::len).sum();
        total - self.tail_index
    }

    /// Number of allocated segments, including the current one.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
