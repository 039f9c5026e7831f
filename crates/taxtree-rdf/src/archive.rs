//! Batched Turtle archives.
//!
//! An export is a zip file holding `taxtree_00000.ttl`, `taxtree_00001.ttl`,
//! ... with at most `batch_size` statements each, and a `manifest.json`
//! describing the export. Batch boundaries carry no meaning; they only keep
//! single files under the import limits of the target store.

use crate::emitter::{EmitReport, ExportConfig, TripleEmitter, TripleStream};
use crate::triple::Triple;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;
use taxtree_graph::NameLookup;
use thiserror::Error;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the manifest entry.
pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Export cancelled")]
    Cancelled,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub created_at: DateTime<Utc>,
    pub base_uri: String,
    pub batch_size: usize,
    /// Batch file names, in order.
    pub batches: Vec<String>,
    pub report: EmitReport,
}

/// File name of batch `index`.
pub fn batch_file_name(index: usize) -> String {
    format!("taxtree_{:05}.ttl", index)
}

/// Writes statements as Turtle lines. Returns the number written.
pub fn write_turtle<W, I>(out: &mut W, triples: I) -> io::Result<u64>
where
    W: Write,
    I: IntoIterator<Item = Triple>,
{
    let mut written = 0;
    for triple in triples {
        triple.write_to(out)?;
        written += 1;
    }
    Ok(written)
}

/// Drains a triple stream into a zip archive.
///
/// A cancelled stream fails the export instead of leaving a silently
/// truncated archive behind.
pub fn write_archive<W, L>(
    writer: W,
    stream: &mut TripleStream<'_, L>,
    config: &ExportConfig,
) -> Result<ArchiveManifest, ExportError>
where
    W: Write + Seek,
    L: NameLookup + ?Sized,
{
    let batch_size = config.batch_size.max(1);
    let mut zip = ZipWriter::new(writer);
    let options: SimpleFileOptions =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut batches = Vec::new();
    loop {
        let mut chunk = stream.by_ref().take(batch_size).peekable();
        if chunk.peek().is_none() {
            break;
        }

        let name = batch_file_name(batches.len());
        zip.start_file(name.as_str(), options)?;
        let written = write_turtle(&mut zip, chunk)?;
        debug!("Wrote {} statements to {}", written, name);
        batches.push(name);
    }

    if stream.was_cancelled() {
        return Err(ExportError::Cancelled);
    }

    let manifest = ArchiveManifest {
        created_at: Utc::now(),
        base_uri: config.base_uri.clone(),
        batch_size,
        batches,
        report: stream.report().clone(),
    };
    zip.start_file(MANIFEST_NAME, options)?;
    serde_json::to_writer_pretty(&mut zip, &manifest)?;
    zip.finish()?;

    info!(
        "Exported {} statements for {} taxa in {} batches",
        manifest.report.triples,
        manifest.report.nodes,
        manifest.batches.len()
    );
    Ok(manifest)
}

/// Emits everything and writes the archive to `path`.
///
/// On failure the partial file is removed.
pub fn export_archive<L>(
    path: &Path,
    emitter: &TripleEmitter<'_, L>,
    config: &ExportConfig,
) -> Result<ArchiveManifest, ExportError>
where
    L: NameLookup + ?Sized,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = BufWriter::new(File::create(path)?);
    let mut stream = emitter.emit();
    let result = write_archive(file, &mut stream, config);
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Cursor, Read};
    use taxtree_core::{NameClass, NameRecord, TaxId, TaxonNode};
    use taxtree_graph::{CancelToken, TaxonTree};
    use tempfile::tempdir;

    fn scenario() -> (TaxonTree, HashMap<TaxId, Vec<NameRecord>>) {
        let tree = TaxonTree::build(vec![
            TaxonNode::new(1, 1, "no rank"),
            TaxonNode::new(2, 1, "genus"),
            TaxonNode::new(3, 2, "species"),
        ])
        .unwrap();
        let mut names = HashMap::new();
        names.insert(
            3,
            vec![NameRecord::new(3, "Homo sapiens", NameClass::ScientificName)],
        );
        (tree, names)
    }

    fn read_entry(archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut content = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    #[test]
    fn test_batches_hold_at_most_batch_size() {
        let (tree, names) = scenario();
        let config = ExportConfig {
            batch_size: 4,
            ..Default::default()
        };
        let emitter = TripleEmitter::new(&tree, &names, &config);
        let mut stream = emitter.emit();

        let mut buf = Cursor::new(Vec::new());
        let manifest = write_archive(&mut buf, &mut stream, &config).unwrap();

        // 3 types + 3 ids + 2 subClassOf + 1 label
        assert_eq!(manifest.report.triples, 9);
        assert_eq!(
            manifest.batches,
            vec![batch_file_name(0), batch_file_name(1), batch_file_name(2)]
        );

        let mut archive = zip::ZipArchive::new(Cursor::new(buf.into_inner())).unwrap();
        let sizes: Vec<usize> = manifest
            .batches
            .iter()
            .map(|name| read_entry(&mut archive, name).lines().count())
            .collect();
        assert_eq!(sizes, vec![4, 4, 1]);

        let stored: ArchiveManifest =
            serde_json::from_str(&read_entry(&mut archive, MANIFEST_NAME)).unwrap();
        assert_eq!(stored, manifest);
    }

    #[test]
    fn test_export_to_file() {
        let (tree, names) = scenario();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("taxtree.zip");
        let config = ExportConfig::default();
        let emitter = TripleEmitter::new(&tree, &names, &config);

        let manifest = export_archive(&path, &emitter, &config).unwrap();
        assert_eq!(manifest.batches.len(), 1);
        assert!(path.is_file());
    }

    #[test]
    fn test_cancelled_export_removes_file() {
        let (tree, names) = scenario();
        let dir = tempdir().unwrap();
        let path = dir.path().join("taxtree.zip");
        let config = ExportConfig::default();
        let token = CancelToken::new();
        token.cancel();
        let emitter = TripleEmitter::new(&tree, &names, &config).with_cancel(token);

        let err = export_archive(&path, &emitter, &config).unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
        assert!(!path.exists());
    }

    #[test]
    fn test_write_turtle_lines() {
        let (tree, names) = scenario();
        let config = ExportConfig::default();
        let emitter = TripleEmitter::new(&tree, &names, &config);

        let mut out = Vec::new();
        let written = write_turtle(&mut out, emitter.emit()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count() as u64, written);
        assert!(text.lines().all(|l| l.starts_with('<') && l.ends_with(" .")));
    }
}
