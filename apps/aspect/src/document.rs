//! # Statement Documents
//!
//! JSON exchange format for statements:
//!
//! ```json
//! {
//!   "prefixes": { ":": "urn:samm:org.acme:1.0.0#" },
//!   "statements": [
//!     { "s": "urn:samm:org.acme:1.0.0#speed", "p": "...#type", "o": "...#Property" },
//!     { "s": "_:b0", "p": "...#preferredName", "o": { "value": "Speed", "lang": "en" } }
//!   ]
//! }
//! ```
//!
//! Nodes are strings: `_:label` is a blank node, anything else an IRI.
//! Literals are objects.

use aspect_core::{AspectError, Literal, MemoryStore, Statement, StatementSource, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of statements accepted in one document.
pub const MAX_DOCUMENT_STATEMENTS: usize = 1_000_000;

/// Blank node marker.
const BLANK_PREFIX: &str = "_:";

/// A literal object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonLiteral {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// Object position: a node or a literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonObject {
    Node(String),
    Literal(JsonLiteral),
}

/// One statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonStatement {
    pub s: String,
    pub p: String,
    pub o: JsonObject,
}

/// A whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementDocument {
    #[serde(default)]
    pub prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub statements: Vec<JsonStatement>,
}

fn node(text: &str) -> Result<Term, AspectError> {
    if text.is_empty() {
        return Err(AspectError::InvalidIdentifier("empty node".to_string()));
    }
    match text.strip_prefix(BLANK_PREFIX) {
        Some("") => Err(AspectError::InvalidIdentifier(text.to_string())),
        Some(label) => Ok(Term::blank(label)),
        None => Ok(Term::iri(text)),
    }
}

fn node_text(term: &Term) -> Result<String, AspectError> {
    match term {
        Term::Iri(iri) => Ok(iri.clone()),
        Term::Blank(label) => Ok(format!("{BLANK_PREFIX}{label}")),
        Term::Literal(lit) => Err(AspectError::SerializationError(format!(
            "literal \"{}\" in node position",
            lit.lexical
        ))),
    }
}

impl JsonStatement {
    /// Convert to a core statement.
    pub fn to_statement(&self) -> Result<Statement, AspectError> {
        if self.p.is_empty() || self.p.starts_with(BLANK_PREFIX) {
            return Err(AspectError::InvalidIdentifier(format!(
                "invalid predicate '{}'",
                self.p
            )));
        }
        let object = match &self.o {
            JsonObject::Node(text) => node(text)?,
            JsonObject::Literal(lit) => Term::Literal(Literal {
                lexical: lit.value.clone(),
                datatype: lit.datatype.clone(),
                language: lit.lang.clone(),
            }),
        };
        Ok(Statement::new(node(&self.s)?, self.p.clone(), object))
    }

    /// Convert from a core statement.
    pub fn from_statement(statement: &Statement) -> Result<Self, AspectError> {
        let o = match &statement.object {
            Term::Literal(lit) => JsonObject::Literal(JsonLiteral {
                value: lit.lexical.clone(),
                datatype: lit.datatype.clone(),
                lang: lit.language.clone(),
            }),
            other => JsonObject::Node(node_text(other)?),
        };
        Ok(Self {
            s: node_text(&statement.subject)?,
            p: statement.predicate.clone(),
            o,
        })
    }
}

impl StatementDocument {
    /// Parse a JSON document.
    pub fn parse(bytes: &[u8]) -> Result<Self, AspectError> {
        let document: Self = serde_json::from_slice(bytes)
            .map_err(|e| AspectError::DeserializationError(format!("Invalid document: {e}")))?;
        if document.statements.len() > MAX_DOCUMENT_STATEMENTS {
            return Err(AspectError::DeserializationError(format!(
                "Statement count {} exceeds maximum allowed {}",
                document.statements.len(),
                MAX_DOCUMENT_STATEMENTS
            )));
        }
        Ok(document)
    }

    /// Capture the content of any statement source.
    pub fn from_source<S: StatementSource + ?Sized>(source: &S) -> Result<Self, AspectError> {
        Ok(Self {
            prefixes: source.prefixes()?,
            statements: source
                .query(None, None, None)?
                .iter()
                .map(JsonStatement::from_statement)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Build an in-memory store.
    pub fn to_store(&self) -> Result<MemoryStore, AspectError> {
        let statements = self
            .statements
            .iter()
            .map(JsonStatement::to_statement)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MemoryStore::from_parts(statements, self.prefixes.clone()))
    }

    /// Pretty-printed JSON bytes.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, AspectError> {
        serde_json::to_vec_pretty(self).map_err(|e| AspectError::SerializationError(e.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
