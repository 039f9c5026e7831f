//! A loaded taxonomy: the tree index plus the name index, built from one
//! consistent read of the row store, and the shared handle readers use.

use crate::error::TreeError;
use crate::name_index::NameIndex;
use crate::store::{RowStore, StoreError};
use crate::tree::TaxonTree;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid taxonomy: {0}")]
    Tree(#[from] TreeError),
}

/// An immutable taxonomy snapshot.
#[derive(Debug)]
pub struct Taxonomy {
    pub tree: TaxonTree,
    pub names: NameIndex,
}

impl Taxonomy {
    pub fn new(tree: TaxonTree, names: NameIndex) -> Self {
        Self { tree, names }
    }

    /// Builds a snapshot from everything in the row store.
    pub fn load(store: &RowStore) -> Result<Self, LoadError> {
        let nodes = store.load_all_nodes().collect::<Result<Vec<_>, _>>()?;
        let tree = TaxonTree::build(nodes)?;
        let names = NameIndex::load(store)?;

        info!(
            "Loaded taxonomy: {} nodes, {} names",
            tree.node_count(),
            names.len()
        );
        Ok(Self { tree, names })
    }
}

/// Shared, swappable taxonomy snapshot.
///
/// Readers clone the inner `Arc` and release the lock at once, so a long
/// walk never blocks a refresh and a refresh never exposes a half-built
/// snapshot.
#[derive(Debug, Clone)]
pub struct SharedTaxonomy {
    current: Arc<RwLock<Arc<Taxonomy>>>,
}

impl SharedTaxonomy {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(taxonomy))),
        }
    }

    /// The snapshot published at the time of the call.
    pub fn snapshot(&self) -> Arc<Taxonomy> {
        Arc::clone(&self.current.read())
    }

    /// Publishes a new snapshot.
    pub fn publish(&self, taxonomy: Taxonomy) {
        *self.current.write() = Arc::new(taxonomy);
    }

    /// Rebuilds from the store and publishes the result.
    ///
    /// The build happens without holding the lock. On failure the previous
    /// snapshot stays published and the error is returned.
    pub fn refresh(&self, store: &RowStore) -> Result<(), LoadError> {
        match Taxonomy::load(store) {
            Ok(taxonomy) => {
                self.publish(taxonomy);
                Ok(())
            }
            Err(e) => {
                warn!("Taxonomy refresh failed, keeping previous snapshot: {}", e);
                Err(e)
            }
        }
    }
}
