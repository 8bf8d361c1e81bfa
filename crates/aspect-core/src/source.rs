//! # Statement Sources
//!
//! The pattern-queryable statement interface the linker consumes, plus the
//! mutable store interface the namespace rewrite needs.
//!
//! `MemoryStore` is the in-memory implementation; the disk-backed one lives in
//! [`crate::storage`]. Both answer queries in `Statement` order.

use crate::{AspectError, Statement, Term};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// STATEMENT SOURCE TRAIT
// =============================================================================

/// Read side of a statement store.
///
/// `None` in a pattern position matches anything.
pub trait StatementSource {
    /// All statements matching the pattern.
    fn query(
        &self,
        subject: Option<&Term>,
        predicate: Option<&str>,
        object: Option<&Term>,
    ) -> Result<Vec<Statement>, AspectError>;

    /// Prefix table: alias -> namespace IRI.
    fn prefixes(&self) -> Result<BTreeMap<String, String>, AspectError>;

    /// Objects of `(subject, predicate, ?)` in statement order.
    fn objects(&self, subject: &Term, predicate: &str) -> Result<Vec<Term>, AspectError> {
        Ok(self
            .query(Some(subject), Some(predicate), None)?
            .into_iter()
            .map(|s| s.object)
            .collect())
    }

    /// First object of `(subject, predicate, ?)`.
    fn object(&self, subject: &Term, predicate: &str) -> Result<Option<Term>, AspectError> {
        Ok(self.objects(subject, predicate)?.into_iter().next())
    }

    /// Whether any statement has this subject.
    fn has_subject(&self, subject: &Term) -> Result<bool, AspectError> {
        Ok(!self.query(Some(subject), None, None)?.is_empty())
    }
}

// =============================================================================
// STATEMENT STORE TRAIT
// =============================================================================

/// One prefix table change inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixChange {
    pub alias: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// A set of changes applied all-or-nothing by [`StatementStore::apply_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub remove: Vec<Statement>,
    pub insert: Vec<Statement>,
    pub prefixes: Vec<PrefixChange>,
}

impl Batch {
    /// Check if the batch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.insert.is_empty() && self.prefixes.is_empty()
    }

    /// The batch that undoes this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            remove: self.insert.clone(),
            insert: self.remove.clone(),
            prefixes: self
                .prefixes
                .iter()
                .map(|c| PrefixChange {
                    alias: c.alias.clone(),
                    before: c.after.clone(),
                    after: c.before.clone(),
                })
                .collect(),
        }
    }
}

/// Write side of a statement store.
pub trait StatementStore: StatementSource {
    /// Insert a statement. Returns `false` if it was already present.
    fn insert(&mut self, statement: Statement) -> Result<bool, AspectError>;

    /// Remove a statement. Returns `false` if it was absent.
    fn remove(&mut self, statement: &Statement) -> Result<bool, AspectError>;

    /// Bind or rebind a prefix alias.
    fn set_prefix(&mut self, alias: &str, iri: &str) -> Result<(), AspectError>;

    /// Apply removals, then insertions, then prefix changes as one unit.
    ///
    /// On error the store must be unchanged.
    fn apply_batch(&mut self, batch: &Batch) -> Result<(), AspectError>;

    /// Total number of statements.
    fn len(&self) -> Result<usize, AspectError>;

    /// Every statement in order.
    fn statements(&self) -> Result<Vec<Statement>, AspectError> {
        self.query(None, None, None)
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Ordered in-memory statement store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    statements: BTreeSet<Statement>,
    by_subject: BTreeMap<Term, BTreeSet<Statement>>,
    prefixes: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from statements and prefixes.
    pub fn from_parts(
        statements: impl IntoIterator<Item = Statement>,
        prefixes: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut store = Self::new();
        for statement in statements {
            store.add(statement);
        }
        store.prefixes.extend(prefixes);
        store
    }

    /// Insert a statement (infallible version).
    pub fn add(&mut self, statement: Statement) -> bool {
        if !self.statements.insert(statement.clone()) {
            return false;
        }
        self.by_subject
            .entry(statement.subject.clone())
            .or_default()
            .insert(statement);
        true
    }

    /// Remove a statement (infallible version).
    pub fn discard(&mut self, statement: &Statement) -> bool {
        if !self.statements.remove(statement) {
            return false;
        }
        if let Some(set) = self.by_subject.get_mut(&statement.subject) {
            set.remove(statement);
            if set.is_empty() {
                self.by_subject.remove(&statement.subject);
            }
        }
        true
    }

    /// Iterate statements in order.
    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }

    fn matches(st: &Statement, predicate: Option<&str>, object: Option<&Term>) -> bool {
        predicate.is_none_or(|p| st.predicate == p) && object.is_none_or(|o| &st.object == o)
    }
}

impl StatementSource for MemoryStore {
    fn query(
        &self,
        subject: Option<&Term>,
        predicate: Option<&str>,
        object: Option<&Term>,
    ) -> Result<Vec<Statement>, AspectError> {
        let result = match subject {
            Some(s) => self
                .by_subject
                .get(s)
                .into_iter()
                .flatten()
                .filter(|st| Self::matches(st, predicate, object))
                .cloned()
                .collect(),
            None => self
                .statements
                .iter()
                .filter(|st| Self::matches(st, predicate, object))
                .cloned()
                .collect(),
        };
        Ok(result)
    }

    fn prefixes(&self) -> Result<BTreeMap<String, String>, AspectError> {
        Ok(self.prefixes.clone())
    }
}

impl StatementStore for MemoryStore {
    fn insert(&mut self, statement: Statement) -> Result<bool, AspectError> {
        Ok(self.add(statement))
    }

    fn remove(&mut self, statement: &Statement) -> Result<bool, AspectError> {
        Ok(self.discard(statement))
    }

    fn set_prefix(&mut self, alias: &str, iri: &str) -> Result<(), AspectError> {
        self.prefixes.insert(alias.to_string(), iri.to_string());
        Ok(())
    }

    fn apply_batch(&mut self, batch: &Batch) -> Result<(), AspectError> {
        // Nothing below can fail, so the batch is trivially atomic.
        for statement in &batch.remove {
            self.discard(statement);
        }
        for statement in &batch.insert {
            self.add(statement.clone());
        }
        for change in &batch.prefixes {
            match &change.after {
                Some(iri) => {
                    self.prefixes.insert(change.alias.clone(), iri.clone());
                }
                None => {
                    self.prefixes.remove(&change.alias);
                }
            }
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, AspectError> {
        Ok(self.statements.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================
