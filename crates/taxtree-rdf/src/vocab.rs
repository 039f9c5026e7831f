//! Vocabulary IRIs used in exported triples.
//!
//! Constants are organized by vocabulary:
//! - `rdf` - RDF vocabulary (http://www.w3.org/1999/02/22-rdf-syntax-ns#)
//! - `rdfs` - RDFS vocabulary (http://www.w3.org/2000/01/rdf-schema#)
//! - `skos` - SKOS vocabulary (http://www.w3.org/2004/02/skos/core#)
//! - `xsd` - XSD vocabulary (http://www.w3.org/2001/XMLSchema#)
//!
//! Rank classes and taxtree-specific relations live under a configurable base
//! IRI, see [`Vocabulary`].

use taxtree_core::TaxId;

/// Default base IRI for rank classes and relations.
pub const DEFAULT_BASE_URI: &str = "http://biokb.fraunhofer.de/taxtree/";

/// Prefix of taxon subject IRIs (OBO NCBITaxon).
pub const NCBI_TAXON_NS: &str = "http://purl.obolibrary.org/obo/NCBITaxon_";

/// RDF vocabulary constants
pub mod rdf {
    /// rdf:type IRI
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
}

/// RDFS vocabulary constants
pub mod rdfs {
    /// rdfs:subClassOf IRI
    pub const SUB_CLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";

    /// rdfs:label IRI
    pub const LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
}

/// SKOS vocabulary constants
pub mod skos {
    /// skos:altLabel IRI
    pub const ALT_LABEL: &str = "http://www.w3.org/2004/02/skos/core#altLabel";

    /// skos:hiddenLabel IRI
    pub const HIDDEN_LABEL: &str = "http://www.w3.org/2004/02/skos/core#hiddenLabel";
}

/// XSD vocabulary constants
pub mod xsd {
    /// xsd:integer IRI
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
}

/// Local names of relations under `<base>relation#`.
pub mod relation {
    pub const TAX_ID: &str = "taxId";
    pub const COMMON_NAME: &str = "commonName";
    pub const ACRONYM: &str = "acronym";
    pub const AUTHORITY: &str = "authority";
    pub const IN_PART: &str = "inPart";
    pub const INCLUDES: &str = "includes";
    pub const TYPE_MATERIAL: &str = "typeMaterial";
    /// Used for name classes without a dedicated predicate.
    pub const NAME: &str = "name";
}

/// Subject IRI of a taxon.
pub fn taxon_iri(id: TaxId) -> String {
    format!("{}{}", NCBI_TAXON_NS, id)
}

/// Converts a rank to a class local name: `no rank` -> `NoRank`.
pub fn rank_class_name(rank: &str) -> String {
    rank.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// IRIs derived from the export base IRI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    base_uri: String,
    node_ns: String,
    relation_ns: String,
}

impl Vocabulary {
    pub fn new(base_uri: impl Into<String>) -> Self {
        let mut base_uri = base_uri.into();
        if !base_uri.ends_with('/') && !base_uri.ends_with('#') {
            base_uri.push('/');
        }
        Self {
            node_ns: format!("{}node#", base_uri),
            relation_ns: format!("{}relation#", base_uri),
            base_uri,
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Class IRI for a rank.
    pub fn rank_class(&self, rank: &str) -> String {
        format!("{}{}", self.node_ns, rank_class_name(rank))
    }

    /// IRI of a relation local name.
    pub fn relation(&self, local: &str) -> String {
        format!("{}{}", self.relation_ns, local)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URI)
    }
}
