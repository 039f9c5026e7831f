//! Taxtree Graph - taxonomy storage, tree index and queries
//!
//! This crate persists parsed dump records in a row store and rebuilds a
//! navigable tree from them. The tree answers structural queries (parent,
//! children, siblings, lineage, descendants) and, together with the name
//! index, subtree-scoped name searches.
//!
//! # Architecture
//!
//! The tree uses petgraph internally with additional indexes for:
//! - Taxon id lookups
//! - Pre-order interval labels for O(1) ancestor checks
//! - Names, by taxon and by trigram
//!
//! # Example
//!
//! ```no_run
//! use taxtree_graph::{ImportConfig, Importer, Page, QueryService, RowStore};
//! use std::path::Path;
//!
//! let store = RowStore::open(".taxtree/taxtree.db").unwrap();
//! let importer = Importer::new(store.clone(), ImportConfig::default());
//! importer.run(Path::new("taxdump"), false).unwrap();
//!
//! let service = QueryService::from_store(&store).unwrap();
//! let lineage = service.lineage(9606);
//! let hits = service.find_by_name("homo %", None, Some(9604), Page::default());
//! ```

mod builder;
mod error;
mod import;
mod name_index;
mod query;
mod store;
mod taxonomy;
mod traverse;
mod tree;

pub use builder::TreeBuilder;
pub use error::{Result, TreeError};
pub use import::{ImportConfig, ImportError, ImportOutcome, Importer};
pub use name_index::{NameIndex, NameLookup, NamePattern};
pub use query::{
    NodeInfo, Page, Paged, QueryService, RankedLineage, RankedTaxon, TaxonomyStats,
    STANDARD_RANKS,
};
pub use store::{ImportStamp, RowStore, StoreError, DEFAULT_BATCH_SIZE};
pub use taxonomy::{LoadError, SharedTaxonomy, Taxonomy};
pub use traverse::{CancelToken, Descendants};
pub use tree::{NodeId, TaxonTree, TreePosition, TreeStats};
