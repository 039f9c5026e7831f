//! Name records attached to taxa.
//!
//! Each taxon owns zero or more names from `names.dmp`. The name class says
//! what kind of name it is; the set of classes in the dump grows over time,
//! so unknown classes are kept verbatim instead of being rejected.

use crate::node::TaxId;
use serde::{Deserialize, Serialize};

/// The category of a name record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameClass {
    ScientificName,
    Synonym,
    CommonName,
    GenbankCommonName,
    EquivalentName,
    Includes,
    InPart,
    Misspelling,
    Misnomer,
    Authority,
    BlastName,
    Acronym,
    GenbankAcronym,
    GenbankSynonym,
    TypeMaterial,
    Anamorph,
    Teleomorph,
    GenbankAnamorph,
    /// A class this version does not know about, kept as written.
    Other(String),
}

impl NameClass {
    /// Parses the class column of `names.dmp`. Never fails.
    pub fn from_dump(s: &str) -> Self {
        match s.trim() {
            "scientific name" => Self::ScientificName,
            "synonym" => Self::Synonym,
            "common name" => Self::CommonName,
            "genbank common name" => Self::GenbankCommonName,
            "equivalent name" => Self::EquivalentName,
            "includes" => Self::Includes,
            "in-part" => Self::InPart,
            "misspelling" => Self::Misspelling,
            "misnomer" => Self::Misnomer,
            "authority" => Self::Authority,
            "blast name" => Self::BlastName,
            "acronym" => Self::Acronym,
            "genbank acronym" => Self::GenbankAcronym,
            "genbank synonym" => Self::GenbankSynonym,
            "type material" => Self::TypeMaterial,
            "anamorph" => Self::Anamorph,
            "teleomorph" => Self::Teleomorph,
            "genbank anamorph" => Self::GenbankAnamorph,
            other => Self::Other(other.to_string()),
        }
    }

    /// The class as written in the dump.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ScientificName => "scientific name",
            Self::Synonym => "synonym",
            Self::CommonName => "common name",
            Self::GenbankCommonName => "genbank common name",
            Self::EquivalentName => "equivalent name",
            Self::Includes => "includes",
            Self::InPart => "in-part",
            Self::Misspelling => "misspelling",
            Self::Misnomer => "misnomer",
            Self::Authority => "authority",
            Self::BlastName => "blast name",
            Self::Acronym => "acronym",
            Self::GenbankAcronym => "genbank acronym",
            Self::GenbankSynonym => "genbank synonym",
            Self::TypeMaterial => "type material",
            Self::Anamorph => "anamorph",
            Self::Teleomorph => "teleomorph",
            Self::GenbankAnamorph => "genbank anamorph",
            Self::Other(s) => s,
        }
    }

    /// True for classes this version recognises.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl std::fmt::Display for NameClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NameClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_dump(s))
    }
}

/// One row of `names.dmp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameRecord {
    /// The taxon this name belongs to.
    pub taxon_id: TaxId,
    /// The name itself (`name_txt`).
    pub name: String,
    /// Unique variant of the name, present only when `name` is ambiguous.
    pub unique_name: Option<String>,
    pub name_class: NameClass,
}

impl NameRecord {
    pub fn new(taxon_id: TaxId, name: impl Into<String>, name_class: NameClass) -> Self {
        Self {
            taxon_id,
            name: name.into(),
            unique_name: None,
            name_class,
        }
    }

    pub fn with_unique_name(mut self, unique_name: impl Into<String>) -> Self {
        self.unique_name = Some(unique_name.into());
        self
    }

    /// The unique name when set, else the plain name.
    pub fn display_name(&self) -> &str {
        self.unique_name.as_deref().unwrap_or(&self.name)
    }
}
