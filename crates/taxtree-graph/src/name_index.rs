//! Name index for fast lookups by taxon and by name pattern.
//!
//! Names are matched case-insensitively with SQL `LIKE` semantics: `%`
//! matches any run of characters and `_` exactly one (`\` escapes either).
//! A pattern without wildcards is an exact lookup. For wildcard patterns a
//! trigram inverted index narrows the candidates to names sharing the
//! pattern's longest literal run; candidates are then checked against the
//! full pattern.

use crate::store::{RowStore, StoreError};
use std::collections::HashMap;
use taxtree_core::{NameClass, NameRecord, TaxId};

/// Trigram length used by the inverted index.
const NGRAM_LEN: usize = 3;

/// Access to the names of a taxon.
pub trait NameLookup {
    /// All names of a taxon, in store order. Empty if it has none.
    fn names_of(&self, id: TaxId) -> &[NameRecord];
}

impl NameLookup for HashMap<TaxId, Vec<NameRecord>> {
    fn names_of(&self, id: TaxId) -> &[NameRecord] {
        self.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Char(char),
    AnyOne,
    AnyRun,
}

/// A parsed, lowercased name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    tokens: Vec<Token>,
}

impl NamePattern {
    /// Parses a `LIKE` pattern.
    pub fn parse(pattern: &str) -> Self {
        // Lowercased as a whole string, the same way names are indexed.
        let lower = pattern.to_lowercase();
        let mut tokens = Vec::new();
        let mut chars = lower.chars();
        while let Some(c) = chars.next() {
            let token = match c {
                '%' => Token::AnyRun,
                '_' => Token::AnyOne,
                '\\' => match chars.next() {
                    Some(escaped) => Token::Char(escaped),
                    None => Token::Char('\\'),
                },
                c => Token::Char(c),
            };
            // Consecutive runs are equivalent to one.
            if token == Token::AnyRun && tokens.last() == Some(&Token::AnyRun) {
                continue;
            }
            tokens.push(token);
        }
        Self { tokens }
    }

    /// The pattern without wildcards, if it has none.
    pub fn as_exact(&self) -> Option<String> {
        self.tokens
            .iter()
            .map(|t| match t {
                Token::Char(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    /// The longest run of literal characters.
    fn longest_literal(&self) -> String {
        let mut best = String::new();
        let mut current = String::new();
        for token in &self.tokens {
            match token {
                Token::Char(c) => current.push(*c),
                _ => {
                    if current.chars().count() > best.chars().count() {
                        best = std::mem::take(&mut current);
                    } else {
                        current.clear();
                    }
                }
            }
        }
        if current.chars().count() > best.chars().count() {
            best = current;
        }
        best
    }

    /// Matches an already lowercased text.
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let (mut t, mut p) = (0usize, 0usize);
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::AnyRun) => {
                    backtrack = Some((p, t));
                    p += 1;
                }
                Some(Token::AnyOne) => {
                    p += 1;
                    t += 1;
                }
                Some(Token::Char(c)) if *c == text[t] => {
                    p += 1;
                    t += 1;
                }
                _ => match backtrack {
                    // Let the last `%` absorb one more character.
                    Some((run_p, run_t)) => {
                        p = run_p + 1;
                        t = run_t + 1;
                        backtrack = Some((run_p, run_t + 1));
                    }
                    None => return false,
                },
            }
        }
        self.tokens[p..].iter().all(|t| *t == Token::AnyRun)
    }
}

/// In-memory index over all name records.
#[derive(Debug, Default, Clone)]
pub struct NameIndex {
    /// All records, grouped by taxon.
    entries: Vec<NameRecord>,
    /// Entry range of each taxon.
    by_taxon: HashMap<TaxId, (usize, usize)>,
    /// Distinct lowercased names.
    names: Vec<String>,
    /// Entries carrying each distinct name.
    name_entries: Vec<Vec<u32>>,
    /// Lowercased name -> distinct name id.
    exact_index: HashMap<String, u32>,
    /// Trigram -> sorted distinct name ids.
    ngram_index: HashMap<String, Vec<u32>>,
}

fn ngrams(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < NGRAM_LEN {
        return Vec::new();
    }
    chars.windows(NGRAM_LEN).map(|w| w.iter().collect()).collect()
}

fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

impl NameIndex {
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from name records. Records of one taxon keep their
    /// relative order.
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = NameRecord>,
    {
        let mut entries: Vec<NameRecord> = records.into_iter().collect();
        entries.sort_by_key(|r| r.taxon_id);

        let mut index = Self {
            entries: Vec::new(),
            ..Self::default()
        };

        let mut start = 0;
        for (i, record) in entries.iter().enumerate() {
            if i > 0 && entries[i - 1].taxon_id != record.taxon_id {
                index.by_taxon.insert(entries[i - 1].taxon_id, (start, i));
                start = i;
            }
            index.insert_name(&record.name, i as u32);
        }
        if let Some(last) = entries.last() {
            index.by_taxon.insert(last.taxon_id, (start, entries.len()));
        }

        index.entries = entries;
        index
    }

    /// Loads every name from the row store.
    pub fn load(store: &RowStore) -> Result<Self, StoreError> {
        let records = store.load_all_names().collect::<Result<Vec<_>, _>>()?;
        Ok(Self::build(records))
    }

    fn insert_name(&mut self, name: &str, entry: u32) {
        let lower = name.to_lowercase();
        if let Some(&name_id) = self.exact_index.get(&lower) {
            self.name_entries[name_id as usize].push(entry);
            return;
        }

        let name_id = self.names.len() as u32;
        for ngram in ngrams(&lower) {
            let ids = self.ngram_index.entry(ngram).or_default();
            // Name ids grow monotonically, so a repeated trigram is the last id.
            if ids.last() != Some(&name_id) {
                ids.push(name_id);
            }
        }
        self.exact_index.insert(lower.clone(), name_id);
        self.names.push(lower);
        self.name_entries.push(vec![entry]);
    }

    /// Distinct name ids whose name matches the pattern.
    fn matching_names(&self, pattern: &NamePattern) -> Vec<u32> {
        if let Some(exact) = pattern.as_exact() {
            return self.exact_index.get(&exact).copied().into_iter().collect();
        }

        let literal = ngrams(&pattern.longest_literal());
        let candidates: Vec<u32> = if literal.is_empty() {
            (0..self.names.len() as u32).collect()
        } else {
            let mut candidates: Option<Vec<u32>> = None;
            for ngram in &literal {
                let Some(ids) = self.ngram_index.get(ngram) else {
                    // If any n-gram has no matches, the pattern has no results
                    return Vec::new();
                };
                candidates = Some(match candidates {
                    None => ids.clone(),
                    Some(c) => intersect_sorted(&c, ids),
                });
            }
            candidates.unwrap_or_default()
        };

        candidates
            .into_iter()
            .filter(|&id| pattern.matches(&self.names[id as usize]))
            .collect()
    }

    /// Finds name records matching `pattern`, optionally of one class.
    ///
    /// Results are ordered by taxon id, then store order.
    pub fn find(&self, pattern: &NamePattern, class: Option<&NameClass>) -> Vec<&NameRecord> {
        let mut entries: Vec<u32> = self
            .matching_names(pattern)
            .into_iter()
            .flat_map(|id| self.name_entries[id as usize].iter().copied())
            .collect();
        entries.sort_unstable();

        entries
            .into_iter()
            .map(|e| &self.entries[e as usize])
            .filter(|r| class.map_or(true, |c| &r.name_class == c))
            .collect()
    }

    /// Taxa having at least one name matching `pattern`, ascending.
    pub fn find_taxa(&self, pattern: &NamePattern, class: Option<&NameClass>) -> Vec<TaxId> {
        let mut taxa: Vec<TaxId> = self
            .find(pattern, class)
            .into_iter()
            .map(|r| r.taxon_id)
            .collect();
        taxa.dedup();
        taxa
    }

    /// The scientific name of a taxon.
    pub fn scientific_name(&self, id: TaxId) -> Option<&str> {
        self.names_of(id)
            .iter()
            .find(|r| r.name_class == NameClass::ScientificName)
            .map(|r| r.name.as_str())
    }

    /// Number of name records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct names (case-insensitive).
    pub fn distinct_names(&self) -> usize {
        self.names.len()
    }
}

impl NameLookup for NameIndex {
    fn names_of(&self, id: TaxId) -> &[NameRecord] {
        match self.by_taxon.get(&id) {
            Some(&(start, end)) => &self.entries[start..end],
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> NameIndex {
        NameIndex::build(vec![
            NameRecord::new(9606, "Homo sapiens", NameClass::ScientificName),
            NameRecord::new(9605, "Homo", NameClass::ScientificName),
            NameRecord::new(9606, "human", NameClass::GenbankCommonName),
            NameRecord::new(10090, "Mus musculus", NameClass::ScientificName),
            NameRecord::new(10090, "house mouse", NameClass::GenbankCommonName),
            NameRecord::new(9606, "Homo sapiens Linnaeus, 1758", NameClass::Authority),
        ])
    }

    fn taxa(index: &NameIndex, pattern: &str) -> Vec<TaxId> {
        index.find_taxa(&NamePattern::parse(pattern), None)
    }

    #[test]
    fn test_pattern_matching() {
        let p = NamePattern::parse("homo%");
        assert!(p.matches("homo sapiens"));
        assert!(p.matches("homo"));
        assert!(!p.matches("a homo"));

        let p = NamePattern::parse("%us m%");
        assert!(p.matches("mus musculus"));
        assert!(!p.matches("house mouse"));

        let p = NamePattern::parse("h_man");
        assert!(p.matches("human"));
        assert!(!p.matches("hman"));

        let p = NamePattern::parse("100\\%");
        assert_eq!(p.as_exact().as_deref(), Some("100%"));
        assert!(p.matches("100%"));
    }

    #[test]
    fn test_backtracking_match() {
        let p = NamePattern::parse("%ab%ab");
        assert!(p.matches("xabyabab"));
        assert!(!p.matches("xabyab_"));
    }

    #[test]
    fn test_exact_lookup_is_case_insensitive() {
        let index = sample_index();
        assert_eq!(taxa(&index, "HOMO SAPIENS"), vec![9606]);
        assert_eq!(taxa(&index, "homo"), vec![9605]);
        assert!(taxa(&index, "hom").is_empty());
    }

    #[test]
    fn test_exact_lookup_with_final_sigma() {
        let index = NameIndex::build(vec![NameRecord::new(
            42,
            "ΟΔΟΣ",
            NameClass::CommonName,
        )]);
        assert_eq!(taxa(&index, "ΟΔΟΣ"), vec![42]);
        assert_eq!(taxa(&index, "ΟΔ%"), vec![42]);
    }

    #[test]
    fn test_wildcard_search() {
        let index = sample_index();
        assert_eq!(taxa(&index, "homo%"), vec![9605, 9606]);
        assert_eq!(taxa(&index, "%mouse%"), vec![10090]);
        assert_eq!(taxa(&index, "%"), vec![9605, 9606, 10090]);
        assert_eq!(taxa(&index, "h%"), vec![9605, 9606, 10090]);
        assert!(taxa(&index, "%zebra%").is_empty());
    }

    #[test]
    fn test_class_filter() {
        let index = sample_index();
        let pattern = NamePattern::parse("%homo%");
        let authority = index.find(&pattern, Some(&NameClass::Authority));
        assert_eq!(authority.len(), 1);
        assert_eq!(authority[0].name, "Homo sapiens Linnaeus, 1758");
    }

    #[test]
    fn test_names_of_taxon() {
        let index = sample_index();
        let names: Vec<&str> = index.names_of(9606).iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Homo sapiens", "human", "Homo sapiens Linnaeus, 1758"]);
        assert!(index.names_of(1).is_empty());
        assert_eq!(index.scientific_name(10090), Some("Mus musculus"));
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn test_hash_map_lookup() {
        let mut map = HashMap::new();
        map.insert(3, vec![NameRecord::new(3, "x", NameClass::Synonym)]);
        assert_eq!(map.names_of(3).len(), 1);
        assert!(map.names_of(4).is_empty());
    }
}
