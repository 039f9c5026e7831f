//! Streaming reader for NCBI taxonomy dump files.
//!
//! Dump lines look like `9606\t|\t9605\t|\tspecies\t|\t...\t|`: fields are
//! separated by `\t|\t` and every line ends with `\t|`. The readers here
//! turn a byte stream into a lazy, single-pass sequence of typed records.
//!
//! A malformed line either ends the stream with a `ParseError` or, when the
//! reader is configured to skip, is logged and counted and the stream goes on.
//! Partial lines are never turned into records.

use crate::error::{ParseError, Result};
use crate::name::{NameClass, NameRecord};
use crate::node::{NodeAttributes, TaxId, TaxonNode};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Separator between two fields.
pub const FIELD_SEPARATOR: &str = "\t|\t";

/// Sequence closing every line.
pub const LINE_TERMINATOR: &str = "\t|";

/// Column count of `nodes.dmp` in the classic `taxdump` archive.
pub const NODE_FIELDS_TAXDUMP: usize = 13;

/// Column count of `nodes.dmp` in the `new_taxdump` archive.
pub const NODE_FIELDS_NEW_TAXDUMP: usize = 18;

/// Column count of `names.dmp`.
pub const NAME_FIELDS: usize = 4;

/// Why a line's fields could not become a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Count { expected: &'static str, found: usize },
    Integer { field: &'static str, value: String },
    Flag { field: &'static str, value: String },
}

/// A record type that can be read from a dump file.
pub trait DumpRecord: Sized {
    /// File name inside the dump directory.
    const FILE_NAME: &'static str;

    /// Builds a record from the fields of one line.
    fn from_fields(fields: &[&str]) -> std::result::Result<Self, FieldError>;
}

/// Options shared by all dump readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Log and skip malformed lines instead of failing.
    pub skip_malformed: bool,
}

/// Splits one line into its fields.
///
/// The line may still carry a trailing `\r`. Returns `None` if the line does
/// not end with the line terminator.
pub fn split_fields(line: &str) -> Option<Vec<&str>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let body = line.strip_suffix(LINE_TERMINATOR)?;
    Some(body.split(FIELD_SEPARATOR).collect())
}

fn parse_int<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> std::result::Result<T, FieldError> {
    value.trim().parse().map_err(|_| FieldError::Integer {
        field,
        value: value.to_string(),
    })
}

fn parse_opt_int<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> std::result::Result<Option<T>, FieldError> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        parse_int(field, value).map(Some)
    }
}

fn parse_flag(field: &'static str, value: &str) -> std::result::Result<bool, FieldError> {
    match value.trim() {
        "" | "0" => Ok(false),
        "1" => Ok(true),
        other => Err(FieldError::Flag {
            field,
            value: other.to_string(),
        }),
    }
}

fn opt_text(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl DumpRecord for TaxonNode {
    const FILE_NAME: &'static str = "nodes.dmp";

    fn from_fields(fields: &[&str]) -> std::result::Result<Self, FieldError> {
        if fields.len() != NODE_FIELDS_TAXDUMP && fields.len() != NODE_FIELDS_NEW_TAXDUMP {
            return Err(FieldError::Count {
                expected: "13 or 18",
                found: fields.len(),
            });
        }

        let id: TaxId = parse_int("tax_id", fields[0])?;
        let parent_id: TaxId = parse_int("parent_tax_id", fields[1])?;
        let attributes = NodeAttributes {
            embl_code: opt_text(fields[3]),
            division_id: parse_opt_int("division_id", fields[4])?,
            genetic_code_id: parse_opt_int("genetic_code_id", fields[6])?,
            mitochondrial_genetic_code_id: parse_opt_int(
                "mitochondrial_genetic_code_id",
                fields[8],
            )?,
            genbank_hidden: parse_flag("genbank_hidden_flag", fields[10])?,
            hidden_subtree_root: parse_flag("hidden_subtree_root_flag", fields[11])?,
            comments: opt_text(fields[12]),
        };

        Ok(TaxonNode::new(id, parent_id, fields[2].trim()).with_attributes(attributes))
    }
}

impl DumpRecord for NameRecord {
    const FILE_NAME: &'static str = "names.dmp";

    fn from_fields(fields: &[&str]) -> std::result::Result<Self, FieldError> {
        if fields.len() != NAME_FIELDS {
            return Err(FieldError::Count {
                expected: "4",
                found: fields.len(),
            });
        }

        let taxon_id: TaxId = parse_int("tax_id", fields[0])?;
        Ok(NameRecord {
            taxon_id,
            name: fields[1].to_string(),
            unique_name: opt_text(fields[2]),
            name_class: NameClass::from_dump(fields[3]),
        })
    }
}

/// Lazy reader producing one record per dump line.
///
/// The reader is single-pass: once it has returned `None` or a fatal error it
/// stays exhausted.
pub struct DumpReader<R, T> {
    reader: R,
    label: String,
    options: ParseOptions,
    line_no: u64,
    skipped: u64,
    buf: Vec<u8>,
    finished: bool,
    _record: PhantomData<fn() -> T>,
}

/// Reader over `nodes.dmp` content.
pub type NodeReader<R> = DumpReader<R, TaxonNode>;

/// Reader over `names.dmp` content.
pub type NameReader<R> = DumpReader<R, NameRecord>;

impl<R: BufRead, T: DumpRecord> DumpReader<R, T> {
    /// Wraps a buffered reader. `label` names the source in errors.
    pub fn new(reader: R, label: impl Into<String>, options: ParseOptions) -> Self {
        Self {
            reader,
            label: label.into(),
            options,
            line_no: 0,
            skipped: 0,
            buf: Vec::new(),
            finished: false,
            _record: PhantomData,
        }
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    fn malformed(&self, reason: String, content: &str) -> ParseError {
        ParseError::Malformed {
            file: self.label.clone(),
            line: self.line_no,
            reason,
            content: content.to_string(),
        }
    }

    fn parse_line(&self, line: &str) -> Result<T> {
        let fields = split_fields(line)
            .ok_or_else(|| self.malformed("missing line terminator".to_string(), line))?;

        T::from_fields(&fields).map_err(|e| match e {
            FieldError::Count { expected, found } => {
                self.malformed(format!("expected {} fields, found {}", expected, found), line)
            }
            FieldError::Integer { field, value } => ParseError::InvalidInteger {
                file: self.label.clone(),
                line: self.line_no,
                field,
                value,
                content: line.to_string(),
            },
            FieldError::Flag { field, value } => {
                self.malformed(format!("flag '{}' must be 0 or 1, got {:?}", field, value), line)
            }
        })
    }
}

impl<T: DumpRecord> DumpReader<BufReader<File>, T> {
    /// Opens a dump file from disk.
    pub fn open(path: &Path, options: ParseOptions) -> Result<Self> {
        let file = File::open(path).map_err(|source| ParseError::Io {
            file: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(
            BufReader::new(file),
            path.display().to_string(),
            options,
        ))
    }
}

impl<R: BufRead, T: DumpRecord> Iterator for DumpReader<R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {}
                Err(source) => {
                    self.finished = true;
                    return Some(Err(ParseError::Io {
                        file: self.label.clone(),
                        source,
                    }));
                }
            }
            self.line_no += 1;

            let raw = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf[..]);
            let parsed = match std::str::from_utf8(raw) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.parse_line(line),
                Err(e) => Err(self.malformed(
                    format!("invalid UTF-8 at byte {}", e.valid_up_to()),
                    &String::from_utf8_lossy(raw),
                )),
            };

            match parsed {
                Ok(record) => return Some(Ok(record)),
                Err(e) if self.options.skip_malformed => {
                    warn!("Skipping malformed line: {}", e);
                    self.skipped += 1;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Locations of the dump files inside an unpacked dump directory.
#[derive(Debug, Clone)]
pub struct DumpFiles {
    pub nodes: PathBuf,
    pub names: PathBuf,
}

impl DumpFiles {
    /// Standard file names under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            nodes: dir.join(TaxonNode::FILE_NAME),
            names: dir.join(NameRecord::FILE_NAME),
        }
    }

    /// Checks that both files exist.
    pub fn ensure_present(&self) -> Result<()> {
        for path in [&self.nodes, &self.names] {
            if !path.is_file() {
                return Err(ParseError::Io {
                    file: path.display().to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "dump file not found",
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn open_nodes(&self, options: ParseOptions) -> Result<NodeReader<BufReader<File>>> {
        DumpReader::open(&self.nodes, options)
    }

    pub fn open_names(&self, options: ParseOptions) -> Result<NameReader<BufReader<File>>> {
        DumpReader::open(&self.names, options)
    }
}
