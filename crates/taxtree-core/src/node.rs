//! Taxon node records.
//!
//! A `TaxonNode` is one row of `nodes.dmp`: a taxon id, a pointer to its
//! parent and the taxonomic rank. The remaining columns of the dump are kept
//! in `NodeAttributes` because nothing in the tree logic depends on them.

use serde::{Deserialize, Serialize};

/// NCBI taxonomy identifier.
pub type TaxId = u32;

/// A single taxon in the NCBI taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonNode {
    /// Taxon id (`tax_id`).
    pub id: TaxId,

    /// Parent taxon id. The root points to itself (or to 0).
    pub parent_id: TaxId,

    /// Rank label as written in the dump ("species", "no rank", ...).
    pub rank: String,

    /// Secondary dump columns.
    #[serde(default)]
    pub attributes: NodeAttributes,
}

/// Columns of `nodes.dmp` beyond id, parent and rank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttributes {
    /// Locus-name prefix; not unique.
    pub embl_code: Option<String>,
    pub division_id: Option<u32>,
    pub genetic_code_id: Option<u32>,
    pub mitochondrial_genetic_code_id: Option<u32>,
    /// Name is suppressed in GenBank entry lineage.
    pub genbank_hidden: bool,
    /// This subtree has no sequence data yet.
    pub hidden_subtree_root: bool,
    pub comments: Option<String>,
}

impl TaxonNode {
    /// Creates a node with empty secondary attributes.
    pub fn new(id: TaxId, parent_id: TaxId, rank: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            rank: rank.into(),
            attributes: NodeAttributes::default(),
        }
    }

    /// Attaches secondary attributes.
    pub fn with_attributes(mut self, attributes: NodeAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// True when this node is a root: it points to itself or to 0.
    pub fn is_root(&self) -> bool {
        self.parent_id == self.id || self.parent_id == 0
    }
}

impl std::fmt::Display for TaxonNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_detection() {
        assert!(TaxonNode::new(1, 1, "no rank").is_root());
        assert!(TaxonNode::new(7, 0, "no rank").is_root());
        assert!(!TaxonNode::new(2, 1, "superkingdom").is_root());
    }
}
