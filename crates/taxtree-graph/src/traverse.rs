//! Subtree walks.
//!
//! Descendant walks are the only unbounded operations on the index. They are
//! lazy breadth-first iterators: nothing is materialized ahead of the caller,
//! and a `CancelToken` lets another thread stop a walk that is no longer
//! wanted.

use crate::tree::{NodeId, TaxonTree};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use taxtree_core::TaxonNode;

/// Shared early-stop signal.
///
/// Clones observe the same flag. Once cancelled a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals every holder of this token to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Breadth-first iterator over the nodes below a starting node.
pub struct Descendants<'a> {
    tree: &'a TaxonTree,
    queue: VecDeque<(NodeId, usize)>,
    max_depth: Option<usize>,
    cancel: Option<CancelToken>,
}

impl<'a> Descendants<'a> {
    pub(crate) fn new(tree: &'a TaxonTree, start: NodeId, max_depth: Option<usize>) -> Self {
        let mut walk = Self {
            tree,
            queue: VecDeque::new(),
            max_depth,
            cancel: None,
        };
        walk.enqueue_children(start, 0);
        walk
    }

    /// Stops the walk as soon as `token` is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Like `next`, but also returns the hop distance from the start.
    pub fn next_with_depth(&mut self) -> Option<(&'a TaxonNode, usize)> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            self.queue.clear();
            return None;
        }

        let (index, depth) = self.queue.pop_front()?;
        self.enqueue_children(index, depth);
        Some((self.tree.node_at(index), depth))
    }

    fn enqueue_children(&mut self, index: NodeId, depth: usize) {
        if self.max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        for child in self.tree.children_at(index) {
            self.queue.push_back((child, depth + 1));
        }
    }
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a TaxonNode;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_depth().map(|(node, _)| node)
    }
}
