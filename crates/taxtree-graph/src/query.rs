//! Query service over the published taxonomy snapshot.
//!
//! Every call takes the current snapshot and works on it without holding any
//! lock, so queries run in parallel with each other and with a refresh.
//! Unknown ids are not errors here: they come back as `None`.

use crate::name_index::{NameLookup, NamePattern};
use crate::store::RowStore;
use crate::taxonomy::{LoadError, SharedTaxonomy, Taxonomy};
use crate::traverse::CancelToken;
use crate::tree::TreeStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taxtree_core::{NameClass, NameRecord, TaxId, TaxonNode};
use tracing::debug;

/// Ranks reported by `ranked_lineage`, lowest first.
pub const STANDARD_RANKS: &[&str] = &[
    "species",
    "genus",
    "family",
    "order",
    "class",
    "phylum",
    "kingdom",
    "superkingdom",
    "domain",
    "realm",
];

/// A window into a result sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// A page large enough to hold everything.
    pub fn unbounded() -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    /// More results exist past this page.
    pub has_more: bool,
    /// Full result size, when known without walking everything.
    pub total: Option<usize>,
}

impl<T> Paged<T> {
    fn from_all(all: Vec<T>, page: Page) -> Self {
        let total = all.len();
        let items: Vec<T> = all.into_iter().skip(page.offset).take(page.limit).collect();
        let has_more = page.offset.saturating_add(items.len()) < total;
        Self {
            items,
            has_more,
            total: Some(total),
        }
    }

    /// Converts the items of the page, dropping those that map to `None`.
    /// Paging metadata is kept as is.
    fn map<U, F: FnMut(T) -> Option<U>>(self, f: F) -> Paged<U> {
        Paged {
            items: self.items.into_iter().filter_map(f).collect(),
            has_more: self.has_more,
            total: self.total,
        }
    }

    /// Takes one page from a lazy sequence, pulling at most one item past it.
    fn from_iter<I: Iterator<Item = T>>(iter: I, page: Page) -> Self {
        let mut iter = iter.skip(page.offset);
        let items: Vec<T> = iter.by_ref().take(page.limit).collect();
        let has_more = items.len() == page.limit && iter.next().is_some();
        Self {
            items,
            has_more,
            total: None,
        }
    }
}

/// Node summary returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: TaxId,
    pub parent_id: TaxId,
    pub rank: String,
    pub scientific_name: Option<String>,
    pub depth: usize,
    pub is_leaf: bool,
    /// Number of nodes below this one.
    pub descendant_count: usize,
}

impl NodeInfo {
    fn new(taxonomy: &Taxonomy, node: &TaxonNode) -> Self {
        let position = taxonomy.tree.position(node.id).ok();
        Self {
            id: node.id,
            parent_id: node.parent_id,
            rank: node.rank.clone(),
            scientific_name: taxonomy.names.scientific_name(node.id).map(str::to_string),
            depth: position.map_or(0, |p| p.depth as usize),
            is_leaf: position.map_or(true, |p| p.is_leaf()),
            descendant_count: position.map_or(0, |p| p.subtree_size() as usize - 1),
        }
    }
}

/// One named rank on a lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTaxon {
    pub rank: String,
    pub id: TaxId,
    pub name: Option<String>,
}

/// The standard ranks along a lineage, lowest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLineage {
    pub id: TaxId,
    pub name: Option<String>,
    pub ranks: Vec<RankedTaxon>,
}

impl RankedLineage {
    /// The entry for `rank`, if the lineage has one.
    pub fn get(&self, rank: &str) -> Option<&RankedTaxon> {
        self.ranks.iter().find(|r| r.rank == rank)
    }
}

/// Snapshot-wide statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyStats {
    #[serde(flatten)]
    pub tree: TreeStats,
    pub name_count: usize,
    pub distinct_names: usize,
}

/// Read-side operations on the taxonomy.
#[derive(Debug, Clone)]
pub struct QueryService {
    taxonomy: SharedTaxonomy,
}

impl QueryService {
    pub fn new(taxonomy: SharedTaxonomy) -> Self {
        Self { taxonomy }
    }

    /// Loads the taxonomy from the store and serves it.
    pub fn from_store(store: &RowStore) -> Result<Self, LoadError> {
        Ok(Self::new(SharedTaxonomy::new(Taxonomy::load(store)?)))
    }

    pub fn taxonomy(&self) -> &SharedTaxonomy {
        &self.taxonomy
    }

    /// Rebuilds the snapshot from the store. On failure the current snapshot
    /// keeps serving.
    pub fn refresh(&self, store: &RowStore) -> Result<(), LoadError> {
        self.taxonomy.refresh(store)
    }

    fn snapshot(&self) -> Arc<Taxonomy> {
        self.taxonomy.snapshot()
    }

    fn known(taxonomy: &Taxonomy, id: TaxId) -> Option<()> {
        if taxonomy.tree.contains(id) {
            Some(())
        } else {
            debug!("Query for unknown taxon {}", id);
            None
        }
    }

    pub fn node(&self, id: TaxId) -> Option<NodeInfo> {
        let taxonomy = self.snapshot();
        Self::known(&taxonomy, id)?;
        let node = taxonomy.tree.get_node(id).ok()?;
        Some(NodeInfo::new(&taxonomy, node))
    }

    /// The parent of a node. `Some(None)` for the root.
    pub fn parent(&self, id: TaxId) -> Option<Option<NodeInfo>> {
        let taxonomy = self.snapshot();
        Self::known(&taxonomy, id)?;
        let parent = taxonomy.tree.get_parent(id).ok()?;
        Some(parent.map(|p| NodeInfo::new(&taxonomy, p)))
    }

    pub fn children(&self, id: TaxId) -> Option<Vec<NodeInfo>> {
        let taxonomy = self.snapshot();
        Self::known(&taxonomy, id)?;
        let children = taxonomy.tree.get_children(id).ok()?;
        Some(children.into_iter().map(|n| NodeInfo::new(&taxonomy, n)).collect())
    }

    pub fn siblings(&self, id: TaxId) -> Option<Vec<NodeInfo>> {
        let taxonomy = self.snapshot();
        Self::known(&taxonomy, id)?;
        let siblings = taxonomy.tree.get_siblings(id).ok()?;
        Some(siblings.into_iter().map(|n| NodeInfo::new(&taxonomy, n)).collect())
    }

    /// The path from a node to the root, both included.
    pub fn lineage(&self, id: TaxId) -> Option<Vec<NodeInfo>> {
        let taxonomy = self.snapshot();
        Self::known(&taxonomy, id)?;
        let lineage = taxonomy.tree.get_lineage(id).ok()?;
        Some(lineage.into_iter().map(|n| NodeInfo::new(&taxonomy, n)).collect())
    }

    /// One page of a breadth-first walk below a node.
    ///
    /// The walk stops once the page is full or `cancel` fires; a cancelled
    /// walk returns what it collected so far.
    pub fn descendants(
        &self,
        id: TaxId,
        max_depth: Option<usize>,
        page: Page,
        cancel: Option<&CancelToken>,
    ) -> Option<Paged<NodeInfo>> {
        let taxonomy = self.snapshot();
        Self::known(&taxonomy, id)?;
        let mut walk = taxonomy.tree.get_descendants(id, max_depth).ok()?;
        if let Some(token) = cancel {
            walk = walk.with_cancel(token.clone());
        }
        let infos = walk.map(|n| NodeInfo::new(&taxonomy, n));
        Some(Paged::from_iter(infos, page))
    }

    /// Ids of taxa with a name matching `pattern`, ascending, restricted to
    /// the subtree of `scope` (the scope included). `None` if the scope is
    /// unknown.
    fn matching_taxa(
        taxonomy: &Taxonomy,
        pattern: &str,
        class: Option<&NameClass>,
        scope: Option<TaxId>,
    ) -> Option<Vec<TaxId>> {
        let scope_position = match scope {
            Some(root) => {
                Self::known(taxonomy, root)?;
                Some(taxonomy.tree.position(root).ok()?)
            }
            None => None,
        };

        let pattern = NamePattern::parse(pattern);
        let ids = taxonomy
            .names
            .find_taxa(&pattern, class)
            .into_iter()
            .filter(|&id| match taxonomy.tree.position(id) {
                Ok(position) => scope_position.map_or(true, |scope| scope.contains(&position)),
                Err(_) => false,
            })
            .collect();
        Some(ids)
    }

    /// Builds node summaries for one page of ids.
    fn page_of_nodes(taxonomy: &Taxonomy, ids: Vec<TaxId>, page: Page) -> Paged<NodeInfo> {
        Paged::from_all(ids, page).map(|id| {
            taxonomy
                .tree
                .get_node(id)
                .ok()
                .map(|node| NodeInfo::new(taxonomy, node))
        })
    }

    /// Taxa with a name matching `pattern`, in ascending id order.
    ///
    /// With `scope`, only taxa inside that subtree (the scope included) are
    /// returned. `None` if the scope is unknown.
    pub fn find_by_name(
        &self,
        pattern: &str,
        class: Option<&NameClass>,
        scope: Option<TaxId>,
        page: Page,
    ) -> Option<Paged<NodeInfo>> {
        let taxonomy = self.snapshot();
        let ids = Self::matching_taxa(&taxonomy, pattern, class, scope)?;
        Some(Self::page_of_nodes(&taxonomy, ids, page))
    }

    /// Descendants of `scope` (the scope excluded) with a name matching
    /// `pattern`.
    pub fn descendants_named(
        &self,
        scope: TaxId,
        pattern: &str,
        class: Option<&NameClass>,
        page: Page,
    ) -> Option<Paged<NodeInfo>> {
        let taxonomy = self.snapshot();
        let mut ids = Self::matching_taxa(&taxonomy, pattern, class, Some(scope))?;
        ids.retain(|&id| id != scope);
        Some(Self::page_of_nodes(&taxonomy, ids, page))
    }

    /// Standard ranks along the lineage of a node, each with its scientific name.
    pub fn ranked_lineage(&self, id: TaxId) -> Option<RankedLineage> {
        let taxonomy = self.snapshot();
        Self::known(&taxonomy, id)?;
        let lineage = taxonomy.tree.get_lineage(id).ok()?;

        let ranks = lineage
            .iter()
            .filter(|n| STANDARD_RANKS.contains(&n.rank.as_str()))
            .map(|n| RankedTaxon {
                rank: n.rank.clone(),
                id: n.id,
                name: taxonomy.names.scientific_name(n.id).map(str::to_string),
            })
            .collect();

        Some(RankedLineage {
            id,
            name: taxonomy.names.scientific_name(id).map(str::to_string),
            ranks,
        })
    }

    /// All name records of a node.
    pub fn names(&self, id: TaxId) -> Option<Vec<NameRecord>> {
        let taxonomy = self.snapshot();
        Self::known(&taxonomy, id)?;
        Some(taxonomy.names.names_of(id).to_vec())
    }

    pub fn stats(&self) -> TaxonomyStats {
        let taxonomy = self.snapshot();
        TaxonomyStats {
            tree: taxonomy.tree.stats(),
            name_count: taxonomy.names.len(),
            distinct_names: taxonomy.names.distinct_names(),
        }
    }
}
