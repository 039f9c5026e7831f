//! Triple emission from the tree index and name records.
//!
//! The emitter walks the tree in pre-order and produces, per taxon:
//! - `rdf:type` to the rank class
//! - `relation#taxId` with the numeric id
//! - `rdfs:subClassOf` to the parent (not for the root)
//! - one statement per name record, with the predicate picked by name class
//!
//! All statements of a taxon share its subject and each taxon is visited
//! once, so dropping repeats within a taxon removes every duplicate of the
//! pass.

use crate::triple::{Term, Triple};
use crate::vocab::{rdf, rdfs, relation, skos, taxon_iri, xsd, Vocabulary, DEFAULT_BASE_URI};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use taxtree_core::{NameClass, TaxonNode};
use taxtree_graph::{CancelToken, NameLookup, TaxonTree, Taxonomy};
use tracing::{debug, warn};

/// Default number of statements per archive batch.
pub const DEFAULT_EXPORT_BATCH_SIZE: usize = 100_000;

/// Export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Base IRI for rank classes and relations.
    pub base_uri: String,
    /// Statements per archive file.
    pub batch_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            batch_size: DEFAULT_EXPORT_BATCH_SIZE,
        }
    }
}

/// Counters collected while emitting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitReport {
    /// Taxa visited.
    pub nodes: u64,
    /// Statements emitted.
    pub triples: u64,
    /// Repeated statements that were dropped.
    pub duplicates_dropped: u64,
    /// Name statements that used the fallback predicate.
    pub fallback_predicates: u64,
}

/// Predicate for a name class, or `None` for classes without a mapping.
fn name_predicate(class: &NameClass, vocab: &Vocabulary) -> Option<String> {
    let iri = match class {
        NameClass::ScientificName => rdfs::LABEL.to_string(),
        NameClass::Synonym
        | NameClass::GenbankSynonym
        | NameClass::EquivalentName
        | NameClass::Anamorph
        | NameClass::Teleomorph
        | NameClass::GenbankAnamorph => skos::ALT_LABEL.to_string(),
        NameClass::Misspelling | NameClass::Misnomer => skos::HIDDEN_LABEL.to_string(),
        NameClass::CommonName | NameClass::GenbankCommonName | NameClass::BlastName => {
            vocab.relation(relation::COMMON_NAME)
        }
        NameClass::Acronym | NameClass::GenbankAcronym => vocab.relation(relation::ACRONYM),
        NameClass::Authority => vocab.relation(relation::AUTHORITY),
        NameClass::InPart => vocab.relation(relation::IN_PART),
        NameClass::Includes => vocab.relation(relation::INCLUDES),
        NameClass::TypeMaterial => vocab.relation(relation::TYPE_MATERIAL),
        NameClass::Other(_) => return None,
    };
    Some(iri)
}

/// Turns a tree and its names into triples.
pub struct TripleEmitter<'a, L: NameLookup + ?Sized> {
    tree: &'a TaxonTree,
    names: &'a L,
    vocab: Vocabulary,
    cancel: Option<CancelToken>,
}

impl<'a> TripleEmitter<'a, taxtree_graph::NameIndex> {
    /// Emitter over a loaded taxonomy snapshot.
    pub fn for_taxonomy(taxonomy: &'a Taxonomy, config: &ExportConfig) -> Self {
        Self::new(&taxonomy.tree, &taxonomy.names, config)
    }
}

impl<'a, L: NameLookup + ?Sized> TripleEmitter<'a, L> {
    pub fn new(tree: &'a TaxonTree, names: &'a L, config: &ExportConfig) -> Self {
        Self {
            tree,
            names,
            vocab: Vocabulary::new(config.base_uri.clone()),
            cancel: None,
        }
    }

    /// Stops emission once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Starts a fresh emission pass.
    pub fn emit(&self) -> TripleStream<'_, L> {
        TripleStream {
            nodes: Box::new(self.tree.preorder()),
            names: self.names,
            vocab: &self.vocab,
            cancel: self.cancel.clone(),
            pending: VecDeque::new(),
            seen: HashSet::new(),
            warned_classes: HashSet::new(),
            report: EmitReport::default(),
            cancelled: false,
        }
    }
}

/// Lazy stream of deduplicated triples in tree pre-order.
pub struct TripleStream<'a, L: NameLookup + ?Sized> {
    nodes: Box<dyn Iterator<Item = &'a TaxonNode> + 'a>,
    names: &'a L,
    vocab: &'a Vocabulary,
    cancel: Option<CancelToken>,
    /// Statements of the current taxon not yet handed out.
    pending: VecDeque<Triple>,
    /// Statements already produced for the current taxon.
    seen: HashSet<Triple>,
    warned_classes: HashSet<String>,
    report: EmitReport,
    cancelled: bool,
}

impl<'a, L: NameLookup + ?Sized> TripleStream<'a, L> {
    /// Counters so far; final once the stream is exhausted.
    pub fn report(&self) -> &EmitReport {
        &self.report
    }

    /// True if the stream ended because of cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    fn push(&mut self, triple: Triple) {
        if self.seen.contains(&triple) {
            self.report.duplicates_dropped += 1;
            debug!("Dropping duplicate statement: {}", triple);
            return;
        }
        self.seen.insert(triple.clone());
        self.pending.push_back(triple);
    }

    fn expand(&mut self, node: &TaxonNode) {
        self.seen.clear();
        self.report.nodes += 1;

        let subject = taxon_iri(node.id);
        self.push(Triple::new(
            subject.clone(),
            rdf::TYPE,
            Term::iri(self.vocab.rank_class(&node.rank)),
        ));
        self.push(Triple::new(
            subject.clone(),
            self.vocab.relation(relation::TAX_ID),
            Term::typed(node.id.to_string(), xsd::INTEGER),
        ));
        if !node.is_root() {
            self.push(Triple::new(
                subject.clone(),
                rdfs::SUB_CLASS_OF,
                Term::iri(taxon_iri(node.parent_id)),
            ));
        }

        let names = self.names;
        for record in names.names_of(node.id) {
            let predicate = match name_predicate(&record.name_class, self.vocab) {
                Some(predicate) => predicate,
                None => {
                    let class = record.name_class.as_str().to_string();
                    if self.warned_classes.insert(class.clone()) {
                        warn!("No predicate for name class '{}', using fallback", class);
                    }
                    self.report.fallback_predicates += 1;
                    self.vocab.relation(relation::NAME)
                }
            };
            self.push(Triple::new(
                subject.clone(),
                predicate,
                Term::literal(record.name.clone()),
            ));
        }
    }
}

impl<'a, L: NameLookup + ?Sized> Iterator for TripleStream<'a, L> {
    type Item = Triple;

    fn next(&mut self) -> Option<Triple> {
        loop {
            if let Some(triple) = self.pending.pop_front() {
                self.report.triples += 1;
                return Some(triple);
            }
            if self.cancelled {
                return None;
            }
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                self.cancelled = true;
                return None;
            }
            let node = self.nodes.next()?;
            self.expand(node);
        }
    }
}
