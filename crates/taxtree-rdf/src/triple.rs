//! Triple model and Turtle statement formatting.
//!
//! Statements are written with full IRIs and no prefixes, one per line, so
//! every line of an export is a complete statement and files can be split
//! at any line.

use std::fmt;
use std::io::{self, Write};

/// Object of a triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    /// Plain string literal.
    Literal(String),
    /// Literal with a datatype IRI.
    Typed { value: String, datatype: String },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(value.into())
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Typed {
            value: value.into(),
            datatype: datatype.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", iri),
            Term::Literal(value) => write!(f, "\"{}\"", escape_turtle_string(value)),
            Term::Typed { value, datatype } => {
                write!(f, "\"{}\"^^<{}>", escape_turtle_string(value), datatype)
            }
        }
    }
}

/// One RDF statement. Subject and predicate are IRIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }

    /// Writes the statement and a trailing newline.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Escapes a string for a Turtle string literal.
pub fn escape_turtle_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_format() {
        let triple = Triple::new(
            "http://ex.org/a",
            "http://ex.org/p",
            Term::iri("http://ex.org/b"),
        );
        assert_eq!(
            triple.to_string(),
            "<http://ex.org/a> <http://ex.org/p> <http://ex.org/b> ."
        );

        let mut out = Vec::new();
        triple.write_to(&mut out).unwrap();
        assert!(out.ends_with(b" .\n"));
    }

    #[test]
    fn test_literals_are_escaped() {
        let term = Term::literal("say \"hi\"\tback\\slash\n");
        assert_eq!(term.to_string(), r#""say \"hi\"\tback\\slash\n""#);

        let typed = Term::typed("9606", "http://www.w3.org/2001/XMLSchema#integer");
        assert_eq!(
            typed.to_string(),
            "\"9606\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
    }
}
