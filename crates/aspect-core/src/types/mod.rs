//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the aspect-core linker:
//! - Statement representation (`Term`, `Literal`, `Statement`)
//! - Addressing (`ElementRef`, `Namespace`, `FileKey`)
//! - Load diagnostics (`Diagnostic`)
//! - Error types (`AspectError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and iterate in a stable order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ELEMENT HANDLES
// =============================================================================

/// Stable handle of a semantic element inside one cache scope's arena.
///
/// Handles survive identifier renames: a namespace rewrite changes the URN an
/// element is indexed under, never its `ElementRef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub u64);

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// STATEMENT COMPONENTS
// =============================================================================

/// A typed literal value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    /// Lexical form as written in the source.
    pub lexical: String,
    /// Datatype IRI, if the literal carried one.
    pub datatype: Option<String>,
    /// Language tag for `rdf:langString` literals.
    pub language: Option<String>,
}

impl Literal {
    /// Plain literal without datatype or language.
    #[must_use]
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    /// Literal with an explicit datatype IRI.
    #[must_use]
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    /// Language-tagged literal.
    #[must_use]
    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// Interpret the lexical form as an `xsd:boolean`.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        matches!(self.lexical.trim(), "true" | "1")
    }
}

/// One position of a statement: an IRI, a blank node or a literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal(Literal),
}

impl Term {
    /// Create an IRI term.
    #[must_use]
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    /// Create a blank node term.
    #[must_use]
    pub fn blank(label: impl Into<String>) -> Self {
        Self::Blank(label.into())
    }

    /// Create a plain literal term.
    #[must_use]
    pub fn literal(lexical: impl Into<String>) -> Self {
        Self::Literal(Literal::plain(lexical))
    }

    /// The IRI, if this term is one.
    #[must_use]
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// The literal, if this term is one.
    #[must_use]
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank(_))
    }

    /// Lexical view used for string-valued attributes (literal text or IRI).
    #[must_use]
    pub fn lexical(&self) -> &str {
        match self {
            Self::Iri(iri) => iri,
            Self::Blank(label) => label,
            Self::Literal(lit) => &lit.lexical,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::Blank(label) => write!(f, "_:{label}"),
            Self::Literal(lit) => match (&lit.datatype, &lit.language) {
                (_, Some(lang)) => write!(f, "\"{}\"@{lang}", lit.lexical),
                (Some(dt), None) => write!(f, "\"{}\"^^<{dt}>", lit.lexical),
                (None, None) => write!(f, "\"{}\"", lit.lexical),
            },
        }
    }
}

/// A subject-predicate-object fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Statement {
    /// Create a new statement.
    #[must_use]
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
}

// =============================================================================
// NAMESPACES & FILES
// =============================================================================

/// A versioned namespace, written `<namespace>:<version>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub version: String,
}

impl Namespace {
    /// Create a namespace from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parse `<namespace>:<version>`. The version is the part after the last `:`.
    pub fn parse(text: &str) -> Result<Self, AspectError> {
        let (name, version) = text
            .rsplit_once(':')
            .ok_or_else(|| AspectError::InvalidNamespace(text.to_string()))?;
        let namespace = Self::new(name, version);
        namespace.validate()?;
        Ok(namespace)
    }

    /// Reject namespaces that cannot form an identifier.
    pub fn validate(&self) -> Result<(), AspectError> {
        let bad = |s: &str| s.is_empty() || s.contains('#') || s.chars().any(char::is_whitespace);
        if bad(&self.name) || bad(&self.version) || self.version.contains(':') {
            return Err(AspectError::InvalidNamespace(self.to_string()));
        }
        Ok(())
    }

    /// Identifier prefix for elements of this namespace, e.g. `urn:samm:org.acme:1.0.0#`.
    #[must_use]
    pub fn iri_prefix(&self, scheme: &str) -> String {
        format!("{scheme}:{}:{}#", self.name, self.version)
    }

    /// Full identifier of an element in this namespace.
    #[must_use]
    pub fn urn(&self, scheme: &str, element_name: &str) -> String {
        format!("{}{element_name}", self.iri_prefix(scheme))
    }

    /// Namespace of an identifier `<scheme>:<namespace>:<version>#<name>`.
    #[must_use]
    pub fn of_urn(urn: &str, scheme: &str) -> Option<Self> {
        let rest = urn.strip_prefix(scheme)?.strip_prefix(':')?;
        let (head, _) = rest.split_once('#')?;
        let (name, version) = head.rsplit_once(':')?;
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(name, version))
    }

    /// Same namespace with a different version.
    #[must_use]
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self::new(self.name.clone(), version)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// A model file, written `<namespace>:<version>:<fileName>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileKey {
    pub namespace: Namespace,
    pub file_name: String,
}

impl FileKey {
    /// Create a file key.
    #[must_use]
    pub fn new(namespace: Namespace, file_name: impl Into<String>) -> Self {
        Self {
            namespace,
            file_name: file_name.into(),
        }
    }

    /// Parse `<namespace>:<version>:<fileName>`.
    pub fn parse(text: &str) -> Result<Self, AspectError> {
        let (head, file_name) = text
            .rsplit_once(':')
            .ok_or_else(|| AspectError::InvalidIdentifier(text.to_string()))?;
        if file_name.is_empty() {
            return Err(AspectError::InvalidIdentifier(text.to_string()));
        }
        Ok(Self::new(Namespace::parse(head)?, file_name))
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.file_name)
    }
}

/// Element name of an identifier: the fragment after `#`, else the last path segment.
#[must_use]
pub fn fragment(iri: &str) -> &str {
    if let Some((_, name)) = iri.rsplit_once('#') {
        return name;
    }
    iri.rsplit(['/', ':']).next().unwrap_or(iri)
}

// =============================================================================
// DIAGNOSTICS
// =============================================================================

/// A recoverable problem found while instantiating a file.
///
/// Diagnostics never abort a load; they mark the file as "has errors".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A reference with no statements and no element in any open file.
    UnresolvedReference { urn: String },
    /// A list chain missing a `first`/`rest` link, or looping back on itself.
    MalformedList { node: String },
    /// A subject whose declared type is not part of the vocabulary.
    UnknownType { subject: String, declared: String },
    /// The identifier is already defined by another open file; that definition wins.
    DuplicateIdentifier { urn: String, owner: String },
    /// `extends` chain that returns to its start.
    InheritanceCycle { urn: String },
}

impl Diagnostic {
    /// Whether this diagnostic makes the file count as erroneous.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::DuplicateIdentifier { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedReference { urn } => write!(f, "unresolved reference {urn}"),
            Self::MalformedList { node } => write!(f, "malformed list at {node}"),
            Self::UnknownType { subject, declared } => {
                write!(f, "{subject} declares unknown type {declared}")
            }
            Self::DuplicateIdentifier { urn, owner } => {
                write!(f, "{urn} is already defined by {owner}")
            }
            Self::InheritanceCycle { urn } => write!(f, "inheritance cycle through {urn}"),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the aspect-core linker.
///
/// Load problems are reported as `Diagnostic`s instead; an `AspectError` means
/// the requested operation did not happen at all.
#[derive(Debug, Error)]
pub enum AspectError {
    /// An identifier or file key does not follow the naming convention.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A namespace is not of the form `<namespace>:<version>`.
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// The file is not open in this session.
    #[error("File not open: {0}")]
    FileNotOpen(String),

    /// An operation needs a current file but none is active.
    #[error("No active file")]
    NoActiveFile,

    /// A rewrite would map two entries onto the same identifier.
    #[error("Rewrite conflict: {0}")]
    RewriteConflict(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The statement store rejected an operation.
    #[error("Store error: {0}")]
    StoreError(String),
}

// =============================================================================
// TESTS
// =============================================================================
