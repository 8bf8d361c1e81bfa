//! # Session Module
//!
//! The editing context: one [`NamespaceCache`] plus the statement store of
//! every open file. Every operation of the linker runs against a `Session`;
//! there is no global state, so independent sessions coexist.
//!
//! ## Storage Backends
//!
//! Each open file is backed by one of:
//! - `InMemory`: a [`MemoryStore`] (fast, volatile unless explicitly saved)
//! - `Persistent`: a [`RedbStore`] for disk-backed ACID storage

use crate::cache::{CacheScope, NamespaceCache};
use crate::config::ModelConfig;
use crate::element::{ElementTag, SemanticElement};
use crate::instantiator::{Instantiator, LoadReport};
use crate::mutation::{Mutation, MutationEngine, Origin, Removal};
use crate::rewrite::{Rewrite, RewriteReport};
use crate::source::{Batch, MemoryStore, StatementSource, StatementStore};
use crate::storage::RedbStore;
use crate::{AspectError, ElementRef, FileKey, Namespace, Statement, Term};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Statement store behind one open file.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbStore (database handle) cannot be safely cloned.

impl StorageBackend {
    /// Open a persistent backend at the given path.
    pub fn redb(path: impl AsRef<Path>) -> Result<Self, AspectError> {
        RedbStore::open(path).map(Self::Persistent)
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    fn store(&self) -> &dyn StatementStore {
        match self {
            Self::InMemory(store) => store,
            Self::Persistent(store) => store,
        }
    }

    fn store_mut(&mut self) -> &mut dyn StatementStore {
        match self {
            Self::InMemory(store) => store,
            Self::Persistent(store) => store,
        }
    }
}

impl StatementSource for StorageBackend {
    fn query(
        &self,
        subject: Option<&Term>,
        predicate: Option<&str>,
        object: Option<&Term>,
    ) -> Result<Vec<Statement>, AspectError> {
        self.store().query(subject, predicate, object)
    }

    fn prefixes(&self) -> Result<BTreeMap<String, String>, AspectError> {
        self.store().prefixes()
    }
}

impl StatementStore for StorageBackend {
    fn insert(&mut self, statement: Statement) -> Result<bool, AspectError> {
        self.store_mut().insert(statement)
    }

    fn remove(&mut self, statement: &Statement) -> Result<bool, AspectError> {
        self.store_mut().remove(statement)
    }

    fn set_prefix(&mut self, alias: &str, iri: &str) -> Result<(), AspectError> {
        self.store_mut().set_prefix(alias, iri)
    }

    fn apply_batch(&mut self, batch: &Batch) -> Result<(), AspectError> {
        self.store_mut().apply_batch(batch)
    }

    fn len(&self) -> Result<usize, AspectError> {
        self.store().len()
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// An editing session over a set of open model files.
#[derive(Debug, Default)]
pub struct Session {
    config: ModelConfig,
    cache: NamespaceCache,
    /// Store of every open file.
    stores: BTreeMap<FileKey, StorageBackend>,
}

impl Session {
    /// Create a new empty session with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a custom configuration.
    #[must_use]
    pub fn with_config(config: ModelConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Read access to the namespace cache.
    #[must_use]
    pub fn cache(&self) -> &NamespaceCache {
        &self.cache
    }

    /// The store behind an open file.
    #[must_use]
    pub fn store(&self, file: &FileKey) -> Option<&StorageBackend> {
        self.stores.get(file)
    }

    /// Open files in key order.
    pub fn files(&self) -> impl Iterator<Item = &FileKey> {
        self.stores.keys()
    }

    // =========================================================================
    // FILE LIFECYCLE
    // =========================================================================

    /// Open (or reopen) a file backed by `backend`, make it current and
    /// instantiate all its typed subjects into the cached scope.
    pub fn open_file(
        &mut self,
        file: FileKey,
        backend: StorageBackend,
    ) -> Result<LoadReport, AspectError> {
        file.namespace.validate()?;
        if self.stores.contains_key(&file) {
            self.close_file(&file)?;
        }
        self.cache.open_file(file.clone());
        let store = self.stores.entry(file).or_insert(backend);
        Instantiator::new(&*store, &mut self.cache, &self.config, CacheScope::Cached)?
            .instantiate_all()
    }

    /// Instantiate `source` into the isolated scope of `file`.
    ///
    /// The cached scope is left untouched; references into it are copied.
    pub fn preview<S: StatementSource + ?Sized>(
        &mut self,
        file: &FileKey,
        source: &S,
    ) -> Result<LoadReport, AspectError> {
        file.namespace.validate()?;
        self.cache.open_file(file.clone());
        self.cache.clear_registry(file, CacheScope::Isolated);
        Instantiator::new(source, &mut self.cache, &self.config, CacheScope::Isolated)?
            .instantiate_all()
    }

    /// Make an open file current.
    pub fn set_current(&mut self, file: &FileKey) -> Result<(), AspectError> {
        self.cache.set_current(file)
    }

    #[must_use]
    pub fn current(&self) -> Option<&FileKey> {
        self.cache.current()
    }

    /// Close a file: drop its store and every element only it indexed.
    ///
    /// Returns the number of elements dropped.
    pub fn close_file(&mut self, file: &FileKey) -> Result<usize, AspectError> {
        let dropped = self.cache.remove_file(file)?;
        self.stores.remove(file);
        info!(%file, dropped, "file closed");
        Ok(dropped)
    }

    /// Drop every file, store and element.
    pub fn reset(&mut self) {
        self.cache.reset_all();
        self.stores.clear();
    }

    // =========================================================================
    // PRODUCED GRAPH
    // =========================================================================

    /// Handle of an identifier in the cached scope.
    #[must_use]
    pub fn lookup(&self, urn: &str) -> Option<ElementRef> {
        self.cache.get(CacheScope::Cached, urn)
    }

    /// Element by identifier in the cached scope.
    #[must_use]
    pub fn get(&self, urn: &str) -> Option<&SemanticElement> {
        self.lookup(urn)
            .and_then(|id| self.cache.element(CacheScope::Cached, id))
    }

    /// Element by identifier, falling back to the isolated scope.
    #[must_use]
    pub fn get_either(&self, urn: &str) -> Option<&SemanticElement> {
        self.get(urn).or_else(|| {
            self.cache
                .get(CacheScope::Isolated, urn)
                .and_then(|id| self.cache.element(CacheScope::Isolated, id))
        })
    }

    /// Element by handle in the cached scope.
    #[must_use]
    pub fn element(&self, id: ElementRef) -> Option<&SemanticElement> {
        self.cache.element(CacheScope::Cached, id)
    }

    /// Every element of the cached scope in handle order.
    pub fn all(&self) -> impl Iterator<Item = (ElementRef, &SemanticElement)> {
        self.cache.graph(CacheScope::Cached).iter()
    }

    fn of_kind(&self, accept: impl Fn(ElementTag) -> bool) -> Vec<&SemanticElement> {
        self.all()
            .map(|(_, el)| el)
            .filter(|el| accept(el.tag()))
            .collect()
    }

    /// Concrete entities.
    #[must_use]
    pub fn entities(&self) -> Vec<&SemanticElement> {
        self.of_kind(|tag| tag == ElementTag::Entity)
    }

    #[must_use]
    pub fn abstract_entities(&self) -> Vec<&SemanticElement> {
        self.of_kind(|tag| tag == ElementTag::AbstractEntity)
    }

    /// Concrete properties.
    #[must_use]
    pub fn properties(&self) -> Vec<&SemanticElement> {
        self.of_kind(|tag| tag == ElementTag::Property)
    }

    #[must_use]
    pub fn abstract_properties(&self) -> Vec<&SemanticElement> {
        self.of_kind(|tag| tag == ElementTag::AbstractProperty)
    }

    /// Characteristics of every subtype.
    #[must_use]
    pub fn characteristics(&self) -> Vec<&SemanticElement> {
        self.of_kind(ElementTag::is_characteristic)
    }

    #[must_use]
    pub fn units(&self) -> Vec<&SemanticElement> {
        self.of_kind(|tag| tag == ElementTag::Unit)
    }

    #[must_use]
    pub fn events(&self) -> Vec<&SemanticElement> {
        self.of_kind(|tag| tag == ElementTag::Event)
    }

    #[must_use]
    pub fn entity_values(&self) -> Vec<&SemanticElement> {
        self.of_kind(|tag| tag == ElementTag::EntityValue)
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    fn origin(&self) -> Result<Origin, AspectError> {
        let file = self.cache.current().ok_or(AspectError::NoActiveFile)?;
        Ok(Origin::new(&file.namespace, &self.config.urn_scheme))
    }

    /// Point the matching slot of `element` at `new_ref`.
    pub fn update(&mut self, element: ElementRef, new_ref: ElementRef) -> Result<Mutation, AspectError> {
        let origin = self.origin()?;
        Ok(MutationEngine::update(
            self.cache.graph_mut(CacheScope::Cached),
            element,
            new_ref,
            &origin,
        ))
    }

    /// Remove every reference to `target` held by `element`.
    pub fn delete(&mut self, element: ElementRef, target: ElementRef) -> Result<Mutation, AspectError> {
        let origin = self.origin()?;
        Ok(MutationEngine::delete(
            self.cache.graph_mut(CacheScope::Cached),
            element,
            target,
            &origin,
        ))
    }

    /// Delete `target` from all its parents and drop it once unreferenced.
    pub fn remove_element(&mut self, target: ElementRef) -> Result<Removal, AspectError> {
        let origin = self.origin()?;
        let removal = MutationEngine::remove_element(
            self.cache.graph_mut(CacheScope::Cached),
            target,
            &origin,
        );
        if removal.removed {
            self.cache.unregister(CacheScope::Cached, target);
        }
        Ok(removal)
    }

    // =========================================================================
    // NAMESPACE REWRITE
    // =========================================================================

    /// Move `old` to `new` in every open store and in both cache scopes.
    ///
    /// All store batches are planned and the cache rename is staged before
    /// any store changes; if a store then fails to apply its batch, the
    /// stores already rewritten are rolled back.
    pub fn rewrite_namespace(
        &mut self,
        old: &Namespace,
        new: &Namespace,
    ) -> Result<RewriteReport, AspectError> {
        let rewrite = Rewrite::new(old.clone(), new.clone(), &self.config.urn_scheme)?;
        self.rewrite(&rewrite)
    }

    /// Move `namespace` to `new_version`.
    pub fn rewrite_version(
        &mut self,
        namespace: &Namespace,
        new_version: &str,
    ) -> Result<RewriteReport, AspectError> {
        let rewrite = Rewrite::version(namespace, new_version, &self.config.urn_scheme)?;
        self.rewrite(&rewrite)
    }

    fn rewrite(&mut self, rewrite: &Rewrite) -> Result<RewriteReport, AspectError> {
        if rewrite.is_identity() {
            return Ok(RewriteReport::default());
        }
        let mut batches = Vec::with_capacity(self.stores.len());
        for (file, store) in &self.stores {
            batches.push((file.clone(), rewrite.batch(store)?));
        }
        let (staged, elements, files) = rewrite.stage(&self.cache)?;

        let mut applied: Vec<(&FileKey, &Batch)> = Vec::new();
        for (file, batch) in &batches {
            let Some(store) = self.stores.get_mut(file) else {
                continue;
            };
            if let Err(e) = store.apply_batch(batch) {
                for (done, batch) in applied.into_iter().rev() {
                    if let Some(store) = self.stores.get_mut(done)
                        && let Err(undo) = store.apply_batch(&batch.inverse())
                    {
                        warn!(file = %done, error = %undo, "rollback of rewrite failed");
                    }
                }
                return Err(e);
            }
            applied.push((file, batch));
        }

        self.cache = staged;
        let moved: Vec<FileKey> = self
            .stores
            .keys()
            .filter(|key| &key.namespace == rewrite.old_namespace())
            .cloned()
            .collect();
        for key in moved {
            if let Some(store) = self.stores.remove(&key) {
                let target = FileKey::new(rewrite.new_namespace().clone(), key.file_name);
                self.stores.insert(target, store);
            }
        }

        let report = RewriteReport {
            statements: batches.iter().map(|(_, b)| b.remove.len()).sum(),
            elements,
            files,
        };
        rewrite.log(&report);
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;
    use crate::primitives::{RDF_FIRST, RDF_NIL, RDF_REST, RDF_TYPE};

    const NS: &str = "urn:samm:org.acme:1.0.0#";

    fn iri(local: &str) -> Term {
        Term::iri(format!("{NS}{local}"))
    }

    fn file(name: &str) -> FileKey {
        FileKey::new(Namespace::new("org.acme", "1.0.0"), name)
    }

    /// Entity `Vehicle` with property `speed` typed by predefined `samm-c:Text`.
    fn vehicle_store(config: &ModelConfig) -> MemoryStore {
        let v = config.vocabulary();
        MemoryStore::from_parts(
            [
                Statement::new(iri("Vehicle"), RDF_TYPE, Term::iri(v.samm("Entity"))),
                Statement::new(iri("Vehicle"), v.samm("properties"), Term::blank("l")),
                Statement::new(Term::blank("l"), RDF_FIRST, iri("speed")),
                Statement::new(Term::blank("l"), RDF_REST, Term::iri(RDF_NIL)),
                Statement::new(iri("speed"), RDF_TYPE, Term::iri(v.samm("Property"))),
                Statement::new(iri("speed"), v.samm("characteristic"), Term::iri(v.samm_c("Text"))),
            ],
            [(":".to_string(), NS.to_string())],
        )
    }

    fn opened() -> Session {
        let mut session = Session::new();
        let store = vehicle_store(session.config());
        let report = session
            .open_file(file("Vehicle.ttl"), StorageBackend::InMemory(store))
            .expect("open");
        assert!(!report.has_errors(), "{:?}", report.diagnostics);
        session
    }

    #[test]
    fn open_file_builds_typed_graph() {
        let session = opened();
        assert_eq!(session.entities().len(), 1);
        assert_eq!(session.properties().len(), 1);
        let text = session
            .get(&session.config().vocabulary().samm_c("Text"))
            .expect("predefined characteristic");
        assert!(text.predefined);
        assert!(text.external);
        assert_eq!(session.characteristics().len(), 1);
        assert!(session.cache().graph(CacheScope::Cached).backlink_violations().is_empty());
    }

    #[test]
    fn predefined_elements_are_immutable() {
        let mut session = opened();
        let text = session
            .lookup(&session.config().vocabulary().samm_c("Text"))
            .expect("text");
        let vehicle = session.lookup(&format!("{NS}Vehicle")).expect("vehicle");
        let before = session.element(text).cloned();
        assert_eq!(session.update(text, vehicle).expect("update"), Mutation::Immutable);
        assert_eq!(session.element(text).cloned(), before);
    }

    #[test]
    fn remove_element_unregisters() {
        let mut session = opened();
        let speed = session.lookup(&format!("{NS}speed")).expect("speed");
        let removal = session.remove_element(speed).expect("remove");
        assert!(removal.removed);
        assert!(session.get(&format!("{NS}speed")).is_none());
        let vehicle = session.get(&format!("{NS}Vehicle")).expect("vehicle");
        let ElementKind::Entity(entity) = &vehicle.kind else {
            return;
        };
        assert!(entity.properties.is_empty());
    }

    #[test]
    fn mutation_needs_a_current_file() {
        let mut session = Session::new();
        let err = session
            .update(ElementRef(0), ElementRef(1))
            .expect_err("no active file");
        assert!(matches!(err, AspectError::NoActiveFile));
    }

    #[test]
    fn preview_lands_in_isolated_scope() {
        let mut session = opened();
        let v = session.config().vocabulary();
        let draft = MemoryStore::from_parts(
            [
                Statement::new(iri("Draft"), RDF_TYPE, Term::iri(v.samm("Entity"))),
                Statement::new(iri("Draft"), v.samm("extends"), iri("Vehicle")),
            ],
            [],
        );
        let report = session.preview(&file("Draft.ttl"), &draft).expect("preview");
        assert!(!report.has_errors(), "{:?}", report.diagnostics);

        assert!(session.get(&format!("{NS}Draft")).is_none());
        assert!(session.get_either(&format!("{NS}Draft")).is_some());

        let copy = session
            .cache()
            .get(CacheScope::Isolated, &format!("{NS}Vehicle"))
            .expect("isolated copy");
        let original = session.lookup(&format!("{NS}Vehicle")).expect("original");
        let copy = session.cache().element(CacheScope::Isolated, copy).expect("copy");
        assert!(copy.external);
        assert!(!session.element(original).expect("original").external);
    }

    #[test]
    fn close_and_reset() {
        let mut session = opened();
        assert!(session.close_file(&file("Vehicle.ttl")).expect("close") > 0);
        assert!(session.all().next().is_none());
        assert!(session.close_file(&file("Vehicle.ttl")).is_err());

        let mut session = opened();
        session.reset();
        assert!(session.current().is_none());
        assert_eq!(session.files().count(), 0);
    }

    #[test]
    fn rewrite_version_moves_stores_and_elements() {
        let mut session = opened();
        let speed = session.lookup(&format!("{NS}speed")).expect("speed");
        let report = session
            .rewrite_version(&Namespace::new("org.acme", "1.0.0"), "2.0.0")
            .expect("rewrite");
        assert_eq!(report.elements, 2);
        assert_eq!(report.files, 1);

        let new_file = FileKey::new(Namespace::new("org.acme", "2.0.0"), "Vehicle.ttl");
        assert_eq!(session.current(), Some(&new_file));
        let store = session.store(&new_file).expect("store moved");
        assert!(
            store
                .statements()
                .expect("statements")
                .iter()
                .all(|s| !s.subject.lexical().starts_with(NS))
        );
        assert_eq!(session.lookup("urn:samm:org.acme:2.0.0#speed"), Some(speed));
        assert!(session.lookup(&format!("{NS}speed")).is_none());
    }
}
