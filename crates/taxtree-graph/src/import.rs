//! Import pipeline: dump files into the row store.
//!
//! Nodes are written first, then names, each streamed straight from the
//! parser in fixed-size batches. A failed batch is retried a bounded number
//! of times before the import aborts. An import replaces whatever the store
//! held before, so re-running an aborted or completed import converges to
//! the same state.
//!
//! Every name must belong to a node of the same dump. A name whose taxon is
//! missing is a line error, skipped or fatal like a malformed line.

use crate::store::{ImportStamp, RowStore, StoreError, DEFAULT_BATCH_SIZE};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;
use taxtree_core::{
    DumpFiles, DumpReader, DumpRecord, NameRecord, NameReader, NodeReader, ParseError,
    ParseOptions, TaxId,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{file}:{line}: name references unknown taxon {taxon_id}")]
    UnknownTaxon {
        file: &'static str,
        line: u64,
        taxon_id: TaxId,
    },
    #[error("Another import is already running")]
    AlreadyRunning,
}

/// Import settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows per write batch.
    pub batch_size: usize,
    /// Log and skip malformed lines instead of aborting.
    pub skip_malformed: bool,
    /// Extra attempts for a failed batch before giving up.
    pub max_batch_retries: u32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            skip_malformed: false,
            max_batch_retries: 2,
        }
    }
}

/// Result of an import run.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported(ImportStamp),
    /// The store already held data and the run was not forced.
    Skipped,
}

/// Rows written and lines rejected by one table's pass.
struct TableCounts {
    written: u64,
    rejected: u64,
}

/// Runs imports into one row store, one at a time.
pub struct Importer {
    store: RowStore,
    config: ImportConfig,
    running: Mutex<()>,
}

impl Importer {
    pub fn new(store: RowStore, config: ImportConfig) -> Self {
        let store = store.with_batch_size(config.batch_size);
        Self {
            store,
            config,
            running: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    /// Imports `nodes.dmp` and `names.dmp` from an unpacked dump directory.
    pub fn run(&self, dump_dir: &Path, force: bool) -> Result<ImportOutcome, ImportError> {
        let files = DumpFiles::in_dir(dump_dir);
        files.ensure_present()?;

        let options = self.parse_options();
        let nodes = files.open_nodes(options)?;
        let names = files.open_names(options)?;
        self.run_readers(nodes, names, force)
    }

    /// Imports from already opened readers.
    ///
    /// Without `force` a store that already holds a taxonomy is left alone.
    /// Otherwise the store is cleared first, so rows missing from the new
    /// dump do not survive it.
    pub fn run_readers<N, M>(
        &self,
        mut nodes: NodeReader<N>,
        mut names: NameReader<M>,
        force: bool,
    ) -> Result<ImportOutcome, ImportError>
    where
        N: BufRead,
        M: BufRead,
    {
        let _guard = self.running.try_lock().ok_or(ImportError::AlreadyRunning)?;

        if !force && self.store.has_data() {
            info!("Store already holds taxonomy data, skipping import");
            return Ok(ImportOutcome::Skipped);
        }
        if self.store.node_count() > 0 || self.store.name_count() > 0 {
            info!("Clearing store before import");
            self.store.clear()?;
        }

        let node_counts = self.write_batched(
            &mut nodes,
            |_, _| Ok(()),
            |store, start, rows| store.write_node_batch(start, rows),
        )?;
        info!(
            "Imported {} nodes ({} lines skipped)",
            node_counts.written,
            nodes.skipped()
        );

        let store = &self.store;
        let name_counts = self.write_batched(
            &mut names,
            |record: &NameRecord, line| {
                if store.contains_node(record.taxon_id)? {
                    Ok(())
                } else {
                    Err(ImportError::UnknownTaxon {
                        file: NameRecord::FILE_NAME,
                        line,
                        taxon_id: record.taxon_id,
                    })
                }
            },
            |store, start, rows| store.write_name_batch(start, rows),
        )?;
        info!(
            "Imported {} names ({} lines skipped, {} without a taxon)",
            name_counts.written,
            names.skipped(),
            name_counts.rejected
        );

        let stamp = ImportStamp {
            nodes: node_counts.written,
            names: name_counts.written,
            skipped_lines: nodes.skipped() + names.skipped() + name_counts.rejected,
            finished_at: Utc::now(),
        };
        self.store.record_import(&stamp)?;
        self.store.flush()?;
        Ok(ImportOutcome::Imported(stamp))
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            skip_malformed: self.config.skip_malformed,
        }
    }

    /// Streams parsed records into the store in batches.
    ///
    /// `admit` vets each record with its line number. A rejected record is
    /// skipped and counted when skipping is configured, else it aborts.
    fn write_batched<R, T, A, W>(
        &self,
        reader: &mut DumpReader<R, T>,
        mut admit: A,
        write: W,
    ) -> Result<TableCounts, ImportError>
    where
        R: BufRead,
        T: DumpRecord,
        A: FnMut(&T, u64) -> Result<(), ImportError>,
        W: Fn(&RowStore, u64, &[T]) -> Result<(), StoreError>,
    {
        let table = T::FILE_NAME;
        let batch_size = self.store.batch_size();
        let mut counts = TableCounts {
            written: 0,
            rejected: 0,
        };
        let mut buf = Vec::with_capacity(batch_size);

        while let Some(record) = reader.next() {
            let record = record?;
            match admit(&record, reader.lines_read()) {
                Ok(()) => buf.push(record),
                Err(e @ ImportError::UnknownTaxon { .. }) if self.config.skip_malformed => {
                    warn!("Skipping record: {}", e);
                    counts.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
            if buf.len() == batch_size {
                self.commit(table, counts.written, &buf, &write)?;
                counts.written += buf.len() as u64;
                buf.clear();
            }
        }
        if !buf.is_empty() {
            self.commit(table, counts.written, &buf, &write)?;
            counts.written += buf.len() as u64;
        }
        Ok(counts)
    }

    fn commit<T, W>(&self, table: &str, start: u64, rows: &[T], write: &W) -> Result<(), StoreError>
    where
        W: Fn(&RowStore, u64, &[T]) -> Result<(), StoreError>,
    {
        with_retries(self.config.max_batch_retries, || {
            write(&self.store, start, rows)
        })
        .map_err(|e| {
            warn!("Giving up on {} batch at row {}: {}", table, start, e);
            e
        })
    }
}

/// Runs `attempt` once plus up to `retries` more times while it fails.
fn with_retries<F>(retries: u32, mut attempt: F) -> Result<(), StoreError>
where
    F: FnMut() -> Result<(), StoreError>,
{
    let mut failures = 0;
    loop {
        match attempt() {
            Ok(()) => return Ok(()),
            Err(e) if failures < retries => {
                failures += 1;
                debug!("Batch failed (attempt {}), retrying: {}", failures, e);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use taxtree_core::DumpReader;

    const NODES: &str = "1\t|\t1\t|\tno rank\t|\t\t|\t8\t|\t0\t|\t1\t|\t0\t|\t0\t|\t0\t|\t0\t|\t0\t|\t\t|\n\
2\t|\t1\t|\tgenus\t|\t\t|\t0\t|\t0\t|\t11\t|\t0\t|\t0\t|\t0\t|\t0\t|\t0\t|\t\t|\n\
3\t|\t2\t|\tspecies\t|\t\t|\t0\t|\t0\t|\t11\t|\t0\t|\t0\t|\t0\t|\t0\t|\t0\t|\t\t|\n";

    const NAMES: &str = "1\t|\troot\t|\t\t|\tscientific name\t|\n\
3\t|\tHomo sapiens\t|\t\t|\tscientific name\t|\n\
3\t|\thuman\t|\t\t|\tgenbank common name\t|\n";

    fn readers(
        nodes: &str,
        names: &str,
        options: ParseOptions,
    ) -> (NodeReader<Cursor<Vec<u8>>>, NameReader<Cursor<Vec<u8>>>) {
        (
            DumpReader::new(Cursor::new(nodes.as_bytes().to_vec()), "nodes.dmp", options),
            DumpReader::new(Cursor::new(names.as_bytes().to_vec()), "names.dmp", options),
        )
    }

    fn importer(config: ImportConfig) -> Importer {
        Importer::new(RowStore::temporary().unwrap(), config)
    }

    fn import(importer: &Importer, nodes: &str, names: &str, force: bool) -> ImportOutcome {
        let (n, m) = readers(nodes, names, importer.parse_options());
        importer.run_readers(n, m, force).unwrap()
    }

    #[test]
    fn test_import_writes_rows_and_stamp() {
        let importer = importer(ImportConfig {
            batch_size: 2,
            ..Default::default()
        });
        let ImportOutcome::Imported(stamp) = import(&importer, NODES, NAMES, false) else {
            panic!("expected an import");
        };
        assert_eq!((stamp.nodes, stamp.names, stamp.skipped_lines), (3, 3, 0));
        assert_eq!(importer.store().node_count(), 3);
        assert_eq!(importer.store().name_count(), 3);
        assert_eq!(importer.store().last_import().unwrap(), Some(stamp));
    }

    #[test]
    fn test_existing_data_skips_unless_forced() {
        let importer = importer(ImportConfig::default());
        import(&importer, NODES, NAMES, false);
        assert_eq!(import(&importer, NODES, NAMES, false), ImportOutcome::Skipped);
        assert!(matches!(
            import(&importer, NODES, NAMES, true),
            ImportOutcome::Imported(_)
        ));
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let importer = importer(ImportConfig::default());
        import(&importer, NODES, NAMES, false);
        let nodes: Vec<_> = importer.store().load_all_nodes().map(Result::unwrap).collect();

        import(&importer, NODES, NAMES, true);
        assert_eq!(importer.store().node_count(), 3);
        assert_eq!(importer.store().name_count(), 3);
        let again: Vec<_> = importer.store().load_all_nodes().map(Result::unwrap).collect();
        assert_eq!(nodes, again);
    }

    #[test]
    fn test_forced_import_replaces_old_rows() {
        let importer = importer(ImportConfig::default());
        let names = "1\t|\troot\t|\t\t|\tscientific name\t|\n\
2\t|\tOldname\t|\t\t|\tscientific name\t|\n";
        import(&importer, NODES, names, false);

        let changed_nodes: String = NODES.lines().take(2).map(|l| format!("{}\n", l)).collect();
        let changed_names = "1\t|\troot\t|\t\t|\tscientific name\t|\n\
2\t|\tNewname\t|\t\t|\tscientific name\t|\n";
        import(&importer, &changed_nodes, changed_names, true);

        let store = importer.store();
        assert_eq!(store.node_count(), 2);
        assert!(store.get_node(3).unwrap().is_none());
        let names: Vec<String> = store.load_names_for([2]).unwrap()[&2]
            .iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, vec!["Newname".to_string()]);
        assert_eq!(store.name_count(), 2);
    }

    #[test]
    fn test_name_without_taxon_aborts_by_default() {
        let importer = importer(ImportConfig::default());
        let names = format!("{}777\t|\tGhost taxon\t|\t\t|\tscientific name\t|\n", NAMES);
        let (n, m) = readers(NODES, &names, importer.parse_options());
        let err = importer.run_readers(n, m, false).unwrap_err();
        match err {
            ImportError::UnknownTaxon { line, taxon_id, .. } => {
                assert_eq!((line, taxon_id), (4, 777));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(importer.store().last_import().unwrap().is_none());
    }

    #[test]
    fn test_name_without_taxon_is_skipped_when_configured() {
        let importer = importer(ImportConfig {
            skip_malformed: true,
            ..Default::default()
        });
        let names = format!(
            "777\t|\tGhost taxon\t|\t\t|\tscientific name\t|\n{}",
            NAMES
        );
        let ImportOutcome::Imported(stamp) = import(&importer, NODES, &names, false) else {
            panic!("expected an import");
        };
        assert_eq!(stamp.names, 3);
        assert_eq!(stamp.skipped_lines, 1);
        assert_eq!(importer.store().name_count(), 3);
        assert!(importer.store().load_names_for([777]).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_line_aborts_by_default() {
        let importer = importer(ImportConfig::default());
        let bad = format!("{}not a node line\n", NODES);
        let (n, m) = readers(&bad, NAMES, importer.parse_options());
        let err = importer.run_readers(n, m, false).unwrap_err();
        match err {
            ImportError::Parse(e) => assert_eq!(e.line(), Some(4)),
            other => panic!("unexpected error: {}", other),
        }
        assert!(importer.store().last_import().unwrap().is_none());
    }

    #[test]
    fn test_skip_malformed_counts_lines() {
        let importer = importer(ImportConfig {
            skip_malformed: true,
            ..Default::default()
        });
        let bad = format!("{}not a node line\n", NODES);
        let ImportOutcome::Imported(stamp) = import(&importer, &bad, NAMES, false) else {
            panic!("expected an import");
        };
        assert_eq!(stamp.nodes, 3);
        assert_eq!(stamp.skipped_lines, 1);
    }

    #[test]
    fn test_retries_are_bounded() {
        let mut calls = 0;
        let result = with_retries(2, || {
            calls += 1;
            Err(StoreError::TransactionAborted)
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result = with_retries(2, || {
            calls += 1;
            if calls < 2 {
                Err(StoreError::TransactionAborted)
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }
}
