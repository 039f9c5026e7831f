//! Row store for taxon nodes and names.
//!
//! The store keeps one sled tree per table. Rows are keyed by their primary
//! id, so writing the same rows twice leaves the store unchanged. Writes go
//! out in batches; each batch is applied atomically and a failed batch is
//! reported with its record range so the caller can retry or abort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Batch, Db, Transactional, Tree};
use std::collections::HashMap;
use std::path::Path;
use taxtree_core::{NameRecord, TaxId, TaxonNode};
use thiserror::Error;
use tracing::debug;

/// Default number of rows per write batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

const NODES_TREE: &str = "nodes";
const NAMES_TREE: &str = "names";
const META_TREE: &str = "meta";
const IMPORT_STAMP_KEY: &str = "last_import";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Batch [{start}, {end}) of table '{table}' failed: {source}")]
    BatchFailed {
        table: &'static str,
        start: u64,
        end: u64,
        #[source]
        source: Box<StoreError>,
    },
    #[error("Transaction aborted")]
    TransactionAborted,
}

impl StoreError {
    /// The failed record range, for batch failures.
    pub fn batch_range(&self) -> Option<(u64, u64)> {
        match self {
            StoreError::BatchFailed { start, end, .. } => Some((*start, *end)),
            _ => None,
        }
    }
}

impl From<TransactionError<()>> for StoreError {
    fn from(e: TransactionError<()>) -> Self {
        match e {
            TransactionError::Storage(e) => StoreError::Sled(e),
            TransactionError::Abort(()) => StoreError::TransactionAborted,
        }
    }
}

/// Summary of the last completed import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStamp {
    pub nodes: u64,
    pub names: u64,
    pub skipped_lines: u64,
    pub finished_at: DateTime<Utc>,
}

/// Row store handle.
///
/// Cheap to clone; clones share the same database.
#[derive(Clone)]
pub struct RowStore {
    db: Db,
    nodes: Tree,
    names: Tree,
    meta: Tree,
    batch_size: usize,
}

fn node_key(id: TaxId) -> [u8; 4] {
    id.to_be_bytes()
}

/// Name rows are keyed by taxon id followed by the record content. Identical
/// records share a key and a prefix scan yields one taxon's names.
fn name_key(record: &NameRecord) -> Result<Vec<u8>, StoreError> {
    let mut key = node_key(record.taxon_id).to_vec();
    let content = bincode::serialize(&(&record.name_class, &record.name, &record.unique_name))?;
    key.extend_from_slice(&content);
    Ok(key)
}

impl RowStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// Opens a throwaway store that is deleted on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            nodes: db.open_tree(NODES_TREE)?,
            names: db.open_tree(NAMES_TREE)?,
            meta: db.open_tree(META_TREE)?,
            db,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Sets the number of rows written per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Writes one batch of nodes atomically.
    ///
    /// `start` is the position of the first record in the overall stream and
    /// only serves to label a failure.
    pub fn write_node_batch(&self, start: u64, rows: &[TaxonNode]) -> Result<(), StoreError> {
        let end = start + rows.len() as u64;
        let result = (|| -> Result<(), StoreError> {
            let mut batch = Batch::default();
            for node in rows {
                batch.insert(node_key(node.id).to_vec(), bincode::serialize(node)?);
            }
            self.nodes.apply_batch(batch)?;
            Ok(())
        })();

        result.map_err(|source| StoreError::BatchFailed {
            table: NODES_TREE,
            start,
            end,
            source: Box::new(source),
        })?;
        debug!("Committed node rows [{}, {})", start, end);
        Ok(())
    }

    /// Writes one batch of names atomically.
    pub fn write_name_batch(&self, start: u64, rows: &[NameRecord]) -> Result<(), StoreError> {
        let end = start + rows.len() as u64;
        let result = (|| -> Result<(), StoreError> {
            let mut batch = Batch::default();
            for name in rows {
                batch.insert(name_key(name)?, bincode::serialize(name)?);
            }
            self.names.apply_batch(batch)?;
            Ok(())
        })();

        result.map_err(|source| StoreError::BatchFailed {
            table: NAMES_TREE,
            start,
            end,
            source: Box::new(source),
        })?;
        debug!("Committed name rows [{}, {})", start, end);
        Ok(())
    }

    /// Inserts or replaces nodes, batched. Returns the number of rows written.
    pub fn upsert_nodes<I>(&self, nodes: I) -> Result<u64, StoreError>
    where
        I: IntoIterator<Item = TaxonNode>,
    {
        let mut written = 0u64;
        let mut buf = Vec::with_capacity(self.batch_size);
        for node in nodes {
            buf.push(node);
            if buf.len() == self.batch_size {
                self.write_node_batch(written, &buf)?;
                written += buf.len() as u64;
                buf.clear();
            }
        }
        if !buf.is_empty() {
            self.write_node_batch(written, &buf)?;
            written += buf.len() as u64;
        }
        Ok(written)
    }

    /// Inserts or replaces names, batched. Returns the number of rows written.
    pub fn upsert_names<I>(&self, names: I) -> Result<u64, StoreError>
    where
        I: IntoIterator<Item = NameRecord>,
    {
        let mut written = 0u64;
        let mut buf = Vec::with_capacity(self.batch_size);
        for name in names {
            buf.push(name);
            if buf.len() == self.batch_size {
                self.write_name_batch(written, &buf)?;
                written += buf.len() as u64;
                buf.clear();
            }
        }
        if !buf.is_empty() {
            self.write_name_batch(written, &buf)?;
            written += buf.len() as u64;
        }
        Ok(written)
    }

    /// Gets one node by id.
    pub fn get_node(&self, id: TaxId) -> Result<Option<TaxonNode>, StoreError> {
        match self.nodes.get(node_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// True if a node with this id is stored.
    pub fn contains_node(&self, id: TaxId) -> Result<bool, StoreError> {
        Ok(self.nodes.contains_key(node_key(id))?)
    }

    /// Streams every node in ascending id order.
    pub fn load_all_nodes(&self) -> impl Iterator<Item = Result<TaxonNode, StoreError>> {
        self.nodes
            .iter()
            .values()
            .map(|value| -> Result<TaxonNode, StoreError> {
                Ok(bincode::deserialize(&value?)?)
            })
    }

    /// Streams every name, grouped by taxon in ascending id order.
    pub fn load_all_names(&self) -> impl Iterator<Item = Result<NameRecord, StoreError>> {
        self.names
            .iter()
            .values()
            .map(|value| -> Result<NameRecord, StoreError> {
                Ok(bincode::deserialize(&value?)?)
            })
    }

    /// Loads the names of the given taxa. Ids without names are absent from
    /// the returned map.
    pub fn load_names_for<I>(&self, ids: I) -> Result<HashMap<TaxId, Vec<NameRecord>>, StoreError>
    where
        I: IntoIterator<Item = TaxId>,
    {
        let mut result: HashMap<TaxId, Vec<NameRecord>> = HashMap::new();
        for id in ids {
            if result.contains_key(&id) {
                continue;
            }
            let names = self
                .names
                .scan_prefix(node_key(id))
                .values()
                .map(|value| -> Result<NameRecord, StoreError> {
                    Ok(bincode::deserialize(&value?)?)
                })
                .collect::<Result<Vec<NameRecord>, StoreError>>()?;
            if !names.is_empty() {
                result.insert(id, names);
            }
        }
        Ok(result)
    }

    /// Deletes a taxon and all of its names in one transaction.
    ///
    /// Returns false if the node did not exist.
    pub fn remove_taxon(&self, id: TaxId) -> Result<bool, StoreError> {
        let key = node_key(id);
        let name_keys = self
            .names
            .scan_prefix(key)
            .keys()
            .collect::<Result<Vec<_>, _>>()?;

        let existed = (&self.nodes, &self.names).transaction(
            |(nodes, names)| -> ConflictableTransactionResult<bool, ()> {
                let existed = nodes.remove(key.to_vec())?.is_some();
                for name_key in &name_keys {
                    names.remove(name_key.clone())?;
                }
                Ok(existed)
            },
        )?;
        Ok(existed)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// True when both tables hold rows.
    pub fn has_data(&self) -> bool {
        !self.nodes.is_empty() && !self.names.is_empty()
    }

    /// Records the outcome of a completed import.
    pub fn record_import(&self, stamp: &ImportStamp) -> Result<(), StoreError> {
        self.meta
            .insert(IMPORT_STAMP_KEY, bincode::serialize(stamp)?)?;
        Ok(())
    }

    /// The last recorded import, if any.
    pub fn last_import(&self) -> Result<Option<ImportStamp>, StoreError> {
        match self.meta.get(IMPORT_STAMP_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes all rows.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.nodes.clear()?;
        self.names.clear()?;
        self.meta.clear()?;
        self.flush()
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxtree_core::NameClass;
    use tempfile::tempdir;

    fn sample_nodes() -> Vec<TaxonNode> {
        vec![
            TaxonNode::new(1, 1, "no rank"),
            TaxonNode::new(2, 1, "genus"),
            TaxonNode::new(3, 2, "species"),
        ]
    }

    fn sample_names() -> Vec<NameRecord> {
        vec![
            NameRecord::new(1, "root", NameClass::ScientificName),
            NameRecord::new(3, "Homo sapiens", NameClass::ScientificName),
            NameRecord::new(3, "human", NameClass::GenbankCommonName),
        ]
    }

    #[test]
    fn test_save_load_rows() {
        let dir = tempdir().unwrap();
        let store = RowStore::open(dir.path()).unwrap().with_batch_size(2);

        assert_eq!(store.upsert_nodes(sample_nodes()).unwrap(), 3);
        assert_eq!(store.upsert_names(sample_names()).unwrap(), 3);

        let nodes: Vec<_> = store.load_all_nodes().collect::<Result<_, _>>().unwrap();
        assert_eq!(nodes, sample_nodes());
        assert_eq!(store.get_node(2).unwrap().unwrap().rank, "genus");
        assert!(store.contains_node(3).unwrap());
        assert!(!store.contains_node(42).unwrap());
        assert!(store.get_node(42).unwrap().is_none());

        let names = store.load_names_for([3, 2, 3]).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[&3].len(), 2);
        assert!(store.has_data());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = RowStore::temporary().unwrap();
        for _ in 0..2 {
            store.upsert_nodes(sample_nodes()).unwrap();
            store.upsert_names(sample_names()).unwrap();
        }
        assert_eq!(store.node_count(), 3);
        assert_eq!(store.name_count(), 3);

        // Replace semantics: a changed row overwrites the old one.
        store
            .upsert_nodes(vec![TaxonNode::new(3, 1, "subspecies")])
            .unwrap();
        assert_eq!(store.node_count(), 3);
        assert_eq!(store.get_node(3).unwrap().unwrap().rank, "subspecies");
    }

    #[test]
    fn test_remove_taxon_cascades_to_names() {
        let store = RowStore::temporary().unwrap();
        store.upsert_nodes(sample_nodes()).unwrap();
        store.upsert_names(sample_names()).unwrap();

        assert!(store.remove_taxon(3).unwrap());
        assert!(store.get_node(3).unwrap().is_none());
        assert_eq!(store.name_count(), 1);
        assert!(store.load_names_for([3]).unwrap().is_empty());

        assert!(!store.remove_taxon(3).unwrap());
    }

    #[test]
    fn test_import_stamp_and_clear() {
        let store = RowStore::temporary().unwrap();
        assert!(store.last_import().unwrap().is_none());

        let stamp = ImportStamp {
            nodes: 3,
            names: 3,
            skipped_lines: 0,
            finished_at: Utc::now(),
        };
        store.record_import(&stamp).unwrap();
        assert_eq!(store.last_import().unwrap(), Some(stamp));

        store.upsert_nodes(sample_nodes()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.node_count(), 0);
        assert!(store.last_import().unwrap().is_none());
        assert!(!store.has_data());
    }

    #[test]
    fn test_batch_failure_reports_range() {
        let err = StoreError::BatchFailed {
            table: "nodes",
            start: 20,
            end: 30,
            source: Box::new(StoreError::TransactionAborted),
        };
        assert_eq!(err.batch_range(), Some((20, 30)));
        assert!(err.to_string().contains("[20, 30)"));
    }
}
