//! Tree builder for constructing the taxonomy index from flat node rows.
//!
//! The builder handles the two-pass process:
//! 1. Add all nodes to the arena and the id index
//! 2. Link every node to its parent and validate the hierarchy
//!
//! The passes never overlap: no edge exists until every node is known, and
//! validation only runs on the fully linked arena.

use crate::error::{Result, TreeError};
use crate::tree::{child_indices, parent_index, NodeId, TaxonTree, TreePosition};
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use taxtree_core::{TaxId, TaxonNode};
use tracing::debug;

/// Builds a `TaxonTree` from taxon nodes.
pub struct TreeBuilder {
    graph: DiGraph<TaxonNode, ()>,
    /// Maps taxon ids to arena indexes.
    id_index: HashMap<TaxId, NodeId>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            id_index: HashMap::new(),
        }
    }

    /// Creates a builder with room for `nodes` nodes.
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            graph: DiGraph::with_capacity(nodes, nodes),
            id_index: HashMap::with_capacity(nodes),
        }
    }

    /// Adds one node. Parents may arrive later.
    pub fn add_node(&mut self, node: TaxonNode) -> Result<NodeId> {
        let id = node.id;
        if self.id_index.contains_key(&id) {
            return Err(TreeError::DuplicateNode(id));
        }
        let index = self.graph.add_node(node);
        self.id_index.insert(id, index);
        Ok(index)
    }

    /// Adds a sequence of nodes.
    pub fn add_nodes<I>(&mut self, nodes: I) -> Result<()>
    where
        I: IntoIterator<Item = TaxonNode>,
    {
        for node in nodes {
            self.add_node(node)?;
        }
        Ok(())
    }

    /// Number of nodes added so far.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Links and validates the hierarchy and returns the finished tree.
    pub fn build(mut self) -> Result<TaxonTree> {
        let root = self.link()?;
        let node_count = self.graph.node_count();

        let root = match root {
            Some(root) => root,
            None if node_count == 0 => return Err(TreeError::MissingRoot),
            // Every node has a parent inside the set, so the pointers must loop.
            None => {
                let id = cycle_member(&self.graph, NodeId::new(0));
                return Err(TreeError::CycleDetected { id });
            }
        };

        let (positions, preorder) = label(&self.graph, root);
        if preorder.len() < node_count {
            let unreachable = self
                .graph
                .node_indices()
                .find(|idx| !positions[idx.index()].is_assigned())
                .unwrap_or(root);
            let id = cycle_member(&self.graph, unreachable);
            return Err(TreeError::CycleDetected { id });
        }

        debug!(
            "Built taxonomy tree: {} nodes, root {}",
            node_count, self.graph[root].id
        );

        Ok(TaxonTree {
            graph: self.graph,
            id_index: self.id_index,
            root,
            positions,
            preorder,
        })
    }

    /// Second pass: resolves parent ids into parent -> child edges.
    ///
    /// Returns the root, if there is one.
    fn link(&mut self) -> Result<Option<NodeId>> {
        let mut root: Option<NodeId> = None;
        let mut edges = Vec::with_capacity(self.graph.node_count());

        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            if node.is_root() {
                if let Some(first) = root {
                    return Err(TreeError::MultipleRoots {
                        first: self.graph[first].id,
                        second: node.id,
                    });
                }
                root = Some(index);
                continue;
            }

            match self.id_index.get(&node.parent_id) {
                Some(&parent) => edges.push((parent, index)),
                None => {
                    return Err(TreeError::OrphanNode {
                        child: node.id,
                        missing_parent: node.parent_id,
                    })
                }
            }
        }

        // Edges are added in node order, which fixes children to source order.
        for (parent, child) in edges {
            self.graph.add_edge(parent, child, ());
        }
        Ok(root)
    }
}

/// Assigns pre-order interval labels starting at `root`.
///
/// Returns the label of every node (unassigned for nodes not reachable from
/// the root) and the nodes in pre-order.
fn label(graph: &DiGraph<TaxonNode, ()>, root: NodeId) -> (Vec<TreePosition>, Vec<NodeId>) {
    let node_count = graph.node_count();
    let mut positions = vec![TreePosition::UNASSIGNED; node_count];
    let mut preorder = Vec::with_capacity(node_count);

    // Each reachable node has exactly one incoming edge, so the walk visits
    // every node at most once.
    let mut stack = vec![(root, 0u32)];
    while let Some((index, depth)) = stack.pop() {
        positions[index.index()] = TreePosition {
            pre: preorder.len() as u32,
            last: 0,
            depth,
        };
        preorder.push(index);
        for child in child_indices(graph, index).into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }

    let mut subtree_sizes = vec![1u32; node_count];
    for &index in preorder.iter().rev() {
        if let Some(parent) = parent_index(graph, index) {
            subtree_sizes[parent.index()] += subtree_sizes[index.index()];
        }
    }
    for &index in &preorder {
        let position = &mut positions[index.index()];
        position.last = position.pre + subtree_sizes[index.index()] - 1;
    }

    (positions, preorder)
}

/// Finds a node on the cycle that `start` leads into and reports the
/// smallest taxon id on that cycle.
///
/// `start` must not reach the root through its parent pointers, and the
/// arena must already be linked.
fn cycle_member(graph: &DiGraph<TaxonNode, ()>, start: NodeId) -> TaxId {
    let parent_of = |index: NodeId| parent_index(graph, index);

    // After node_count hops the walk is guaranteed to be on the cycle.
    let mut current = start;
    for _ in 0..graph.node_count() {
        match parent_of(current) {
            Some(parent) => current = parent,
            None => return graph[current].id,
        }
    }

    let entry = current;
    let mut smallest = graph[entry].id;
    let mut hops = 0;
    while let Some(parent) = parent_of(current) {
        if parent == entry || hops > graph.node_count() {
            break;
        }
        smallest = smallest.min(graph[parent].id);
        current = parent;
        hops += 1;
    }
    smallest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: TaxId, parent: TaxId, rank: &str) -> TaxonNode {
        TaxonNode::new(id, parent, rank)
    }

    #[test]
    fn test_builder_adds_nodes() {
        let mut builder = TreeBuilder::new();
        builder
            .add_nodes(vec![node(1, 1, "no rank"), node(2, 1, "genus")])
            .unwrap();
        assert_eq!(builder.len(), 2);

        let tree = builder.build().unwrap();
        assert_eq!(tree.node_count(), 2);
        assert_eq!(tree.root().id, 1);
    }

    #[test]
    fn test_parent_may_arrive_after_child() {
        let tree = TaxonTree::build(vec![
            node(3, 2, "species"),
            node(2, 1, "genus"),
            node(1, 1, "no rank"),
        ])
        .unwrap();
        assert_eq!(tree.get_parent(3).unwrap().unwrap().id, 2);
    }

    #[test]
    fn test_orphan_node_is_rejected() {
        let err = TaxonTree::build(vec![node(1, 1, "no rank"), node(2, 999, "genus")])
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::OrphanNode {
                child: 2,
                missing_parent: 999
            }
        );
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn test_two_node_cycle_without_root() {
        let err = TaxonTree::build(vec![node(5, 6, "genus"), node(6, 5, "genus")]).unwrap_err();
        assert_eq!(err, TreeError::CycleDetected { id: 5 });
    }

    #[test]
    fn test_cycle_beside_valid_root() {
        let err = TaxonTree::build(vec![
            node(1, 1, "no rank"),
            node(2, 1, "genus"),
            node(7, 9, "genus"),
            node(8, 7, "species"),
            node(9, 8, "species"),
            node(10, 9, "subspecies"),
        ])
        .unwrap_err();
        assert_eq!(err, TreeError::CycleDetected { id: 7 });
    }

    #[test]
    fn test_duplicate_and_root_errors() {
        let mut builder = TreeBuilder::new();
        builder.add_node(node(1, 1, "no rank")).unwrap();
        assert_eq!(
            builder.add_node(node(1, 1, "no rank")).unwrap_err(),
            TreeError::DuplicateNode(1)
        );

        assert_eq!(
            TaxonTree::build(Vec::new()).unwrap_err(),
            TreeError::MissingRoot
        );
        assert_eq!(
            TaxonTree::build(vec![node(1, 1, "no rank"), node(4, 0, "no rank")]).unwrap_err(),
            TreeError::MultipleRoots {
                first: 1,
                second: 4
            }
        );
    }

    #[test]
    fn test_interval_labels() {
        let tree = TaxonTree::build(vec![
            node(1, 1, "no rank"),
            node(2, 1, "genus"),
            node(3, 2, "species"),
            node(4, 1, "genus"),
        ])
        .unwrap();

        let root = tree.position(1).unwrap();
        assert_eq!((root.pre, root.last, root.depth), (0, 3, 0));
        let genus = tree.position(2).unwrap();
        assert_eq!((genus.pre, genus.last, genus.depth), (1, 2, 1));
        let leaf = tree.position(4).unwrap();
        assert_eq!((leaf.pre, leaf.last), (3, 3));
    }
}
