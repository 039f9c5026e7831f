use taxtree_core::TaxId;
use thiserror::Error;

/// Integrity and lookup failures of the tree index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Taxon {0} not found")]
    NotFound(TaxId),

    #[error("Orphan node: taxon {child} references missing parent {missing_parent}")]
    OrphanNode { child: TaxId, missing_parent: TaxId },

    #[error("Cycle detected in parent pointers at taxon {id}")]
    CycleDetected { id: TaxId },

    #[error("No root node (a node whose parent is itself or 0)")]
    MissingRoot,

    #[error("More than one root node: {first} and {second}")]
    MultipleRoots { first: TaxId, second: TaxId },

    #[error("Taxon {0} appears more than once")]
    DuplicateNode(TaxId),
}

pub type Result<T> = std::result::Result<T, TreeError>;
