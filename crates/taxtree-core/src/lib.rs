//! Taxtree Core - NCBI taxonomy records and dump parsing
//!
//! This crate defines the records of the NCBI taxonomy dump (taxon nodes and
//! their names) and streams them out of the `nodes.dmp` / `names.dmp` files.
//!
//! # Example
//!
//! ```no_run
//! use taxtree_core::{DumpFiles, ParseOptions};
//! use std::path::Path;
//!
//! let files = DumpFiles::in_dir(Path::new("taxdump"));
//! for node in files.open_nodes(ParseOptions::default()).unwrap() {
//!     let node = node.unwrap();
//!     println!("{} -> {}", node.id, node.parent_id);
//! }
//! ```

pub mod dump;
mod error;
mod name;
mod node;

pub use dump::{DumpFiles, DumpReader, DumpRecord, NameReader, NodeReader, ParseOptions};
pub use error::{ParseError, Result};
pub use name::{NameClass, NameRecord};
pub use node::{NodeAttributes, TaxId, TaxonNode};
