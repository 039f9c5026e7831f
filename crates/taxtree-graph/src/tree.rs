//! Core tree data structure.
//!
//! The TaxonTree is a validated, read-only view of the taxonomy: an arena of
//! nodes with parent -> child edges, an id index and pre-order interval
//! labels. Once built it never changes; a new import means a new tree.

use crate::builder::TreeBuilder;
use crate::error::{Result, TreeError};
use crate::traverse::Descendants;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use taxtree_core::{TaxId, TaxonNode};

/// Index of a node in the tree arena.
pub type NodeId = NodeIndex;

/// Pre-order interval label of a node.
///
/// A node's subtree occupies the pre-order range `pre..=last`, so ancestry
/// is a range containment test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePosition {
    /// Pre-order number; the root is 0.
    pub pre: u32,
    /// Largest pre-order number inside the subtree.
    pub last: u32,
    /// Hops from the root.
    pub depth: u32,
}

impl TreePosition {
    pub(crate) const UNASSIGNED: TreePosition = TreePosition {
        pre: u32::MAX,
        last: 0,
        depth: 0,
    };

    pub(crate) fn is_assigned(&self) -> bool {
        self.pre != u32::MAX
    }

    /// True if `other` lies in this node's subtree (including the node itself).
    pub fn contains(&self, other: &TreePosition) -> bool {
        self.pre <= other.pre && other.pre <= self.last
    }

    /// Number of nodes in the subtree, the node included.
    pub fn subtree_size(&self) -> u32 {
        self.last - self.pre + 1
    }

    pub fn is_leaf(&self) -> bool {
        self.pre == self.last
    }
}

/// Children of `index` in source order.
pub(crate) fn child_indices(graph: &DiGraph<TaxonNode, ()>, index: NodeId) -> Vec<NodeId> {
    // petgraph lists neighbors newest edge first.
    let mut children: Vec<NodeId> = graph
        .neighbors_directed(index, Direction::Outgoing)
        .collect();
    children.reverse();
    children
}

pub(crate) fn parent_index(graph: &DiGraph<TaxonNode, ()>, index: NodeId) -> Option<NodeId> {
    graph.neighbors_directed(index, Direction::Incoming).next()
}

/// The taxonomy tree index.
#[derive(Debug)]
pub struct TaxonTree {
    pub(crate) graph: DiGraph<TaxonNode, ()>,
    /// Maps taxon ids to arena indexes.
    pub(crate) id_index: HashMap<TaxId, NodeId>,
    pub(crate) root: NodeId,
    /// Interval labels, indexed by arena index.
    pub(crate) positions: Vec<TreePosition>,
    /// All nodes in pre-order.
    pub(crate) preorder: Vec<NodeId>,
}

impl TaxonTree {
    /// Builds and validates a tree from a node sequence.
    pub fn build<I>(nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaxonNode>,
    {
        let mut builder = TreeBuilder::new();
        builder.add_nodes(nodes)?;
        builder.build()
    }

    pub(crate) fn index_of(&self, id: TaxId) -> Result<NodeId> {
        self.id_index.get(&id).copied().ok_or(TreeError::NotFound(id))
    }

    pub(crate) fn node_at(&self, index: NodeId) -> &TaxonNode {
        &self.graph[index]
    }

    pub(crate) fn children_at(&self, index: NodeId) -> Vec<NodeId> {
        child_indices(&self.graph, index)
    }

    pub(crate) fn position_at(&self, index: NodeId) -> TreePosition {
        self.positions[index.index()]
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// True if the id is part of the tree.
    pub fn contains(&self, id: TaxId) -> bool {
        self.id_index.contains_key(&id)
    }

    /// The root node.
    pub fn root(&self) -> &TaxonNode {
        &self.graph[self.root]
    }

    /// Gets a node by taxon id.
    pub fn get_node(&self, id: TaxId) -> Result<&TaxonNode> {
        Ok(self.node_at(self.index_of(id)?))
    }

    /// Gets the parent of a node; `None` for the root.
    pub fn get_parent(&self, id: TaxId) -> Result<Option<&TaxonNode>> {
        let index = self.index_of(id)?;
        Ok(parent_index(&self.graph, index).map(|p| self.node_at(p)))
    }

    /// Gets the children of a node in source order. Empty for a leaf.
    pub fn get_children(&self, id: TaxId) -> Result<Vec<&TaxonNode>> {
        let index = self.index_of(id)?;
        Ok(self
            .children_at(index)
            .into_iter()
            .map(|c| self.node_at(c))
            .collect())
    }

    /// Gets the other children of this node's parent. Empty for the root.
    pub fn get_siblings(&self, id: TaxId) -> Result<Vec<&TaxonNode>> {
        let index = self.index_of(id)?;
        let Some(parent) = parent_index(&self.graph, index) else {
            return Ok(Vec::new());
        };
        Ok(self
            .children_at(parent)
            .into_iter()
            .filter(|&c| c != index)
            .map(|c| self.node_at(c))
            .collect())
    }

    /// Gets the path from a node up to and including the root.
    pub fn get_lineage(&self, id: TaxId) -> Result<Vec<&TaxonNode>> {
        let mut current = self.index_of(id)?;
        let mut lineage = vec![self.node_at(current)];

        // Bounded by the node count even though the build rejected cycles.
        for _ in 0..self.node_count() {
            match parent_index(&self.graph, current) {
                Some(parent) => {
                    lineage.push(self.node_at(parent));
                    current = parent;
                }
                None => break,
            }
        }
        Ok(lineage)
    }

    /// Breadth-first walk below a node.
    ///
    /// `max_depth` bounds the hop count from the starting node; `None` walks
    /// the whole subtree. Every call starts a fresh walk.
    pub fn get_descendants(&self, id: TaxId, max_depth: Option<usize>) -> Result<Descendants<'_>> {
        let index = self.index_of(id)?;
        Ok(Descendants::new(self, index, max_depth))
    }

    /// The interval label of a node.
    pub fn position(&self, id: TaxId) -> Result<TreePosition> {
        Ok(self.position_at(self.index_of(id)?))
    }

    /// Depth of a node; the root has depth 0.
    pub fn depth(&self, id: TaxId) -> Result<usize> {
        Ok(self.position(id)?.depth as usize)
    }

    /// True if `ancestor` is a proper ancestor of `descendant`. O(1).
    pub fn is_ancestor(&self, ancestor: TaxId, descendant: TaxId) -> Result<bool> {
        Ok(ancestor != descendant && self.is_in_subtree(descendant, ancestor)?)
    }

    /// True if `id` lies in the subtree rooted at `scope_root` (inclusive). O(1).
    pub fn is_in_subtree(&self, id: TaxId, scope_root: TaxId) -> Result<bool> {
        let scope = self.position(scope_root)?;
        let node = self.position(id)?;
        Ok(scope.contains(&node))
    }

    /// Iterates over all nodes in pre-order: root first, children in source order.
    pub fn preorder(&self) -> impl Iterator<Item = &TaxonNode> + '_ {
        self.preorder.iter().map(move |&index| self.node_at(index))
    }

    /// Summary statistics of the tree.
    pub fn stats(&self) -> TreeStats {
        let mut ranks: BTreeMap<String, usize> = BTreeMap::new();
        let mut max_depth = 0;
        let mut leaves = 0;
        for &index in &self.preorder {
            let position = self.position_at(index);
            max_depth = max_depth.max(position.depth as usize);
            if position.is_leaf() {
                leaves += 1;
            }
            *ranks.entry(self.node_at(index).rank.clone()).or_default() += 1;
        }
        TreeStats {
            node_count: self.node_count(),
            max_depth,
            leaf_count: leaves,
            ranks,
        }
    }
}

/// Tree statistics for the status command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeStats {
    pub node_count: usize,
    pub max_depth: usize,
    pub leaf_count: usize,
    /// Node count per rank.
    pub ranks: BTreeMap<String, usize>,
}
