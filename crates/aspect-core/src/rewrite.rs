//! # Namespace Rewrite
//!
//! Moves every identifier of one namespace to another, in the statement store
//! and in the cache keys that index it, as one unit.
//!
//! The cache side is staged on a copy of the cache, so a conflict found on
//! either side leaves both untouched. Element handles are preserved: the same
//! `ElementRef`s answer under the new identifiers.

use crate::cache::{CacheScope, NamespaceCache};
use crate::source::{Batch, PrefixChange, StatementSource, StatementStore};
use crate::{AspectError, Namespace, Statement, Term};
use std::collections::BTreeSet;
use tracing::info;

/// Counts of a finished rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// Statements replaced in the store(s).
    pub statements: usize,
    /// Cache entries moved, over both scopes.
    pub elements: usize,
    /// Open files whose key moved to the new namespace.
    pub files: usize,
}

/// A planned namespace move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    from: Namespace,
    to: Namespace,
    from_prefix: String,
    to_prefix: String,
}

impl Rewrite {
    /// Plan a move from `from` to `to` under the identifier `scheme`.
    pub fn new(from: Namespace, to: Namespace, scheme: &str) -> Result<Self, AspectError> {
        from.validate()?;
        to.validate()?;
        Ok(Self {
            from_prefix: from.iri_prefix(scheme),
            to_prefix: to.iri_prefix(scheme),
            from,
            to,
        })
    }

    /// Plan a version bump of `namespace`.
    pub fn version(namespace: &Namespace, version: &str, scheme: &str) -> Result<Self, AspectError> {
        Self::new(namespace.clone(), namespace.with_version(version), scheme)
    }

    #[must_use]
    pub fn old_namespace(&self) -> &Namespace {
        &self.from
    }

    #[must_use]
    pub fn new_namespace(&self) -> &Namespace {
        &self.to
    }

    /// Whether source and target coincide.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// The rewritten form of `iri`, if it lies under the old namespace.
    #[must_use]
    pub fn map_iri(&self, iri: &str) -> Option<String> {
        iri.strip_prefix(&self.from_prefix)
            .map(|rest| format!("{}{rest}", self.to_prefix))
    }

    fn map_term(&self, term: &Term) -> Option<Term> {
        term.as_iri().and_then(|iri| self.map_iri(iri)).map(Term::Iri)
    }

    fn map_statement(&self, statement: &Statement) -> Option<Statement> {
        let subject = self.map_term(&statement.subject);
        let predicate = self.map_iri(&statement.predicate);
        let object = self.map_term(&statement.object);
        if subject.is_none() && predicate.is_none() && object.is_none() {
            return None;
        }
        Some(Statement {
            subject: subject.unwrap_or_else(|| statement.subject.clone()),
            predicate: predicate.unwrap_or_else(|| statement.predicate.clone()),
            object: object.unwrap_or_else(|| statement.object.clone()),
        })
    }

    /// The store changes this rewrite implies for `source`.
    ///
    /// Fails if a subject already defined under the new namespace would also
    /// receive rewritten statements. Only statements the batch really adds
    /// are listed in `insert`, so [`Batch::inverse`] never removes a statement
    /// the store held before.
    pub fn batch<S: StatementSource + ?Sized>(&self, source: &S) -> Result<Batch, AspectError> {
        let mut batch = Batch::default();
        if self.is_identity() {
            return Ok(batch);
        }
        let statements = source.query(None, None, None)?;
        let occupied: BTreeSet<&str> = statements
            .iter()
            .filter_map(|s| s.subject.as_iri())
            .filter(|iri| iri.starts_with(&self.to_prefix))
            .collect();

        let mut targets = Vec::new();
        for statement in &statements {
            let Some(rewritten) = self.map_statement(statement) else {
                continue;
            };
            if statement.subject != rewritten.subject
                && let Some(target) = rewritten.subject.as_iri()
                && occupied.contains(target)
            {
                return Err(AspectError::RewriteConflict(format!(
                    "{target} is already defined"
                )));
            }
            batch.remove.push(statement.clone());
            targets.push(rewritten);
        }

        let present: BTreeSet<&Statement> = statements.iter().collect();
        let removed: BTreeSet<&Statement> = batch.remove.iter().collect();
        let mut added = BTreeSet::new();
        for rewritten in targets {
            let kept = present.contains(&rewritten) && !removed.contains(&rewritten);
            if !kept && added.insert(rewritten.clone()) {
                batch.insert.push(rewritten);
            }
        }

        for (alias, iri) in source.prefixes()? {
            if let Some(after) = self.map_iri(&iri) {
                batch.prefixes.push(PrefixChange {
                    alias,
                    before: Some(iri),
                    after: Some(after),
                });
            }
        }
        Ok(batch)
    }

    /// A copy of `cache` with every key of the old namespace moved.
    ///
    /// Returns the staged cache, the number of entries moved and the number
    /// of file keys moved.
    pub fn stage(
        &self,
        cache: &NamespaceCache,
    ) -> Result<(NamespaceCache, usize, usize), AspectError> {
        let mut staged = cache.clone();
        if self.is_identity() {
            return Ok((staged, 0, 0));
        }
        let mut elements = 0;
        for scope in [CacheScope::Cached, CacheScope::Isolated] {
            elements += staged.rename_prefix(scope, &self.from_prefix, &self.to_prefix)?;
        }
        let files = staged.rename_file_namespace(&self.from, &self.to)?;
        Ok((staged, elements, files))
    }

    /// Rewrite one store and the cache as a unit.
    pub fn apply<S: StatementStore + ?Sized>(
        &self,
        store: &mut S,
        cache: &mut NamespaceCache,
    ) -> Result<RewriteReport, AspectError> {
        let batch = self.batch(&*store)?;
        let (staged, elements, files) = self.stage(cache)?;
        store.apply_batch(&batch)?;
        *cache = staged;
        let report = RewriteReport {
            statements: batch.remove.len(),
            elements,
            files,
        };
        self.log(&report);
        Ok(report)
    }

    pub(crate) fn log(&self, report: &RewriteReport) {
        info!(
            from = %self.from,
            to = %self.to,
            statements = report.statements,
            elements = report.elements,
            files = report.files,
            "namespace rewritten"
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::instantiator::Instantiator;
    use crate::primitives::RDF_TYPE;
    use crate::source::MemoryStore;
    use crate::{FileKey, Literal};

    const OLD: &str = "urn:samm:org.acme:1.0.0#";

    fn iri(local: &str) -> Term {
        Term::iri(format!("{OLD}{local}"))
    }

    /// Aspect with two properties sharing one characteristic.
    fn fleet_store(config: &ModelConfig) -> MemoryStore {
        let v = config.vocabulary();
        let ty = |s: &str, t: String| Statement::new(iri(s), RDF_TYPE, Term::iri(t));
        let statements = vec![
            ty("Fleet", v.samm("Aspect")),
            Statement::new(iri("Fleet"), v.samm("properties"), Term::blank("l1")),
            Statement::new(Term::blank("l1"), crate::primitives::RDF_FIRST, iri("speed")),
            Statement::new(Term::blank("l1"), crate::primitives::RDF_REST, Term::blank("l2")),
            Statement::new(Term::blank("l2"), crate::primitives::RDF_FIRST, iri("range")),
            Statement::new(
                Term::blank("l2"),
                crate::primitives::RDF_REST,
                Term::iri(crate::primitives::RDF_NIL),
            ),
            ty("speed", v.samm("Property")),
            Statement::new(iri("speed"), v.samm("characteristic"), iri("Metric")),
            ty("range", v.samm("Property")),
            Statement::new(iri("range"), v.samm("characteristic"), iri("Metric")),
            ty("Metric", v.samm("Characteristic")),
            Statement::new(
                iri("Metric"),
                v.samm("preferredName"),
                Term::Literal(Literal::lang("Metric", "en")),
            ),
        ];
        MemoryStore::from_parts(statements, [(":".to_string(), OLD.to_string())])
    }

    fn loaded(config: &ModelConfig) -> (MemoryStore, NamespaceCache) {
        let store = fleet_store(config);
        let mut cache = NamespaceCache::new();
        cache.open_file(FileKey::new(Namespace::new("org.acme", "1.0.0"), "Fleet.ttl"));
        Instantiator::new(&store, &mut cache, config, CacheScope::Cached)
            .expect("instantiator")
            .instantiate_all()
            .expect("load");
        (store, cache)
    }

    #[test]
    fn version_rewrite_moves_store_and_cache() {
        let config = ModelConfig::default();
        let (mut store, mut cache) = loaded(&config);
        let speed = cache
            .get(CacheScope::Cached, &format!("{OLD}speed"))
            .expect("speed");
        let before = cache.element(CacheScope::Cached, speed).cloned().expect("element");

        let rewrite = Rewrite::version(&Namespace::new("org.acme", "1.0.0"), "2.0.0", "urn:samm")
            .expect("plan");
        let report = rewrite.apply(&mut store, &mut cache).expect("rewrite");
        assert_eq!(report.files, 1);
        assert_eq!(report.elements, 4);

        for statement in store.iter() {
            for term in [&statement.subject, &statement.object] {
                assert!(!term.lexical().starts_with(OLD), "{term} left behind");
            }
        }
        assert_eq!(
            store.prefixes().expect("prefixes").get(":").map(String::as_str),
            Some("urn:samm:org.acme:2.0.0#")
        );

        let new_urn = "urn:samm:org.acme:2.0.0#speed";
        assert_eq!(cache.get(CacheScope::Cached, new_urn), Some(speed));
        assert_eq!(cache.get(CacheScope::Cached, &format!("{OLD}speed")), None);
        let after = cache.element(CacheScope::Cached, speed).expect("element");
        assert_eq!(after.urn, new_urn);
        assert_eq!(after.kind, before.kind);
        assert_eq!(after.preferred_names, before.preferred_names);
    }

    #[test]
    fn conflict_leaves_everything_untouched() {
        let config = ModelConfig::default();
        let (mut store, mut cache) = loaded(&config);
        let v = config.vocabulary();
        store.add(Statement::new(
            Term::iri("urn:samm:org.acme:2.0.0#speed"),
            RDF_TYPE,
            Term::iri(v.samm("Property")),
        ));
        let store_before = store.clone();
        let cache_before = cache.clone();

        let rewrite = Rewrite::version(&Namespace::new("org.acme", "1.0.0"), "2.0.0", "urn:samm")
            .expect("plan");
        let err = rewrite.apply(&mut store, &mut cache).expect_err("conflict");
        assert!(matches!(err, AspectError::RewriteConflict(_)));
        assert_eq!(store, store_before);
        assert_eq!(cache, cache_before);
    }

    #[test]
    fn inverse_keeps_statements_that_predate_the_batch() {
        let config = ModelConfig::default();
        let (mut store, _) = loaded(&config);
        let v = config.vocabulary();
        // An outside reference already pointing at the target namespace, and
        // one that will be rewritten into the same statement.
        let see = v.samm("see");
        store.add(Statement::new(
            Term::iri("urn:x#Doc"),
            see.clone(),
            Term::iri("urn:samm:org.acme:2.0.0#Fleet"),
        ));
        store.add(Statement::new(Term::iri("urn:x#Doc"), see, iri("Fleet")));
        let before = store.clone();

        let rewrite = Rewrite::version(&Namespace::new("org.acme", "1.0.0"), "2.0.0", "urn:samm")
            .expect("plan");
        let batch = rewrite.batch(&store).expect("batch");
        assert_eq!(batch.insert.len() + 1, batch.remove.len());
        assert!(
            batch
                .insert
                .iter()
                .all(|st| !before.iter().any(|existing| existing == st))
        );

        store.apply_batch(&batch).expect("apply");
        store.apply_batch(&batch.inverse()).expect("undo");
        assert_eq!(store, before);
    }

    #[test]
    fn identity_rewrite_is_a_noop() {
        let config = ModelConfig::default();
        let (mut store, mut cache) = loaded(&config);
        let ns = Namespace::new("org.acme", "1.0.0");
        let rewrite = Rewrite::new(ns.clone(), ns, "urn:samm").expect("plan");
        let report = rewrite.apply(&mut store, &mut cache).expect("rewrite");
        assert_eq!(report, RewriteReport::default());
    }

    #[test]
    fn unrelated_namespaces_are_not_touched() {
        let rewrite = Rewrite::new(
            Namespace::new("org.acme", "1.0.0"),
            Namespace::new("org.acme.fleet", "1.0.0"),
            "urn:samm",
        )
        .expect("plan");
        assert_eq!(
            rewrite.map_iri("urn:samm:org.acme:1.0.0#X").as_deref(),
            Some("urn:samm:org.acme.fleet:1.0.0#X")
        );
        assert_eq!(rewrite.map_iri("urn:samm:org.acme:1.0.1#X"), None);
        assert_eq!(rewrite.map_iri("urn:samm:org.acme.other:1.0.0#X"), None);
    }
}
