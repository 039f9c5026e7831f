//! Taxtree RDF - triple export of the taxonomy
//!
//! This crate turns a built tree index and its name records into RDF
//! statements and writes them as a batched Turtle archive for bulk loading
//! into a graph database.
//!
//! # Example
//!
//! ```no_run
//! use taxtree_graph::{RowStore, Taxonomy};
//! use taxtree_rdf::{export_archive, ExportConfig, TripleEmitter};
//! use std::path::Path;
//!
//! let store = RowStore::open(".taxtree/taxtree.db").unwrap();
//! let taxonomy = Taxonomy::load(&store).unwrap();
//! let config = ExportConfig::default();
//! let emitter = TripleEmitter::for_taxonomy(&taxonomy, &config);
//! let manifest = export_archive(Path::new("taxtree.zip"), &emitter, &config).unwrap();
//! println!("{} statements", manifest.report.triples);
//! ```

mod archive;
mod emitter;
mod triple;
pub mod vocab;

pub use archive::{
    batch_file_name, export_archive, write_archive, write_turtle, ArchiveManifest, ExportError,
    MANIFEST_NAME,
};
pub use emitter::{
    EmitReport, ExportConfig, TripleEmitter, TripleStream, DEFAULT_EXPORT_BATCH_SIZE,
};
pub use triple::{escape_turtle_string, Term, Triple};
pub use vocab::Vocabulary;
