//! # Namespace Cache
//!
//! Per-file registries of built elements, keyed by identifier.
//!
//! Two scopes exist: `Cached` is the authoritative graph, `Isolated` is used
//! for previews. Each scope has its own arena, so the scopes never share an
//! element. A file owns one registry per scope; an identifier is unique
//! within a scope across all files.

use crate::element::SemanticElement;
use crate::graph::ModelGraph;
use crate::types::fragment;
use crate::{AspectError, ElementRef, FileKey, Namespace};
use std::collections::{BTreeMap, BTreeSet};

/// Address space of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheScope {
    Cached,
    Isolated,
}

/// Identifier index of one file in one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    by_urn: BTreeMap<String, ElementRef>,
    /// Elements with a synthetic name.
    anonymous: BTreeSet<ElementRef>,
}

impl Registry {
    #[must_use]
    pub fn get(&self, urn: &str) -> Option<ElementRef> {
        self.by_urn.get(urn).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_urn.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_urn.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ElementRef)> {
        self.by_urn.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn anonymous(&self) -> &BTreeSet<ElementRef> {
        &self.anonymous
    }
}

/// Cache entry of one open file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    cached: Registry,
    isolated: Registry,
    has_errors: bool,
}

impl FileEntry {
    #[must_use]
    pub fn registry(&self, scope: CacheScope) -> &Registry {
        match scope {
            CacheScope::Cached => &self.cached,
            CacheScope::Isolated => &self.isolated,
        }
    }

    fn registry_mut(&mut self, scope: CacheScope) -> &mut Registry {
        match scope {
            CacheScope::Cached => &mut self.cached,
            CacheScope::Isolated => &mut self.isolated,
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }
}

/// The cache context. Passed explicitly to every operation that resolves
/// or mutates elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceCache {
    cached: ModelGraph,
    isolated: ModelGraph,
    files: BTreeMap<FileKey, FileEntry>,
    current: Option<FileKey>,
}

impl NamespaceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // FILES
    // =========================================================================

    /// Create an empty entry for `file` (if absent) and make it current.
    pub fn open_file(&mut self, file: FileKey) {
        self.files.entry(file.clone()).or_default();
        self.current = Some(file);
    }

    /// Make an already-open file current.
    pub fn set_current(&mut self, file: &FileKey) -> Result<(), AspectError> {
        if !self.files.contains_key(file) {
            return Err(AspectError::FileNotOpen(file.to_string()));
        }
        self.current = Some(file.clone());
        Ok(())
    }

    #[must_use]
    pub fn current(&self) -> Option<&FileKey> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn file(&self, file: &FileKey) -> Option<&FileEntry> {
        self.files.get(file)
    }

    pub fn files(&self) -> impl Iterator<Item = (&FileKey, &FileEntry)> {
        self.files.iter()
    }

    /// Flag a file as loaded with errors.
    pub fn mark_errors(&mut self, file: &FileKey) {
        if let Some(entry) = self.files.get_mut(file) {
            entry.has_errors = true;
        }
    }

    // =========================================================================
    // ARENAS
    // =========================================================================

    #[must_use]
    pub fn graph(&self, scope: CacheScope) -> &ModelGraph {
        match scope {
            CacheScope::Cached => &self.cached,
            CacheScope::Isolated => &self.isolated,
        }
    }

    pub fn graph_mut(&mut self, scope: CacheScope) -> &mut ModelGraph {
        match scope {
            CacheScope::Cached => &mut self.cached,
            CacheScope::Isolated => &mut self.isolated,
        }
    }

    #[must_use]
    pub fn element(&self, scope: CacheScope, id: ElementRef) -> Option<&SemanticElement> {
        self.graph(scope).get(id)
    }

    // =========================================================================
    // LOOKUP & REGISTRATION
    // =========================================================================

    /// Lookup in the current file's registry only.
    #[must_use]
    pub fn lookup(&self, scope: CacheScope, urn: &str) -> Option<ElementRef> {
        let current = self.current.as_ref()?;
        self.files.get(current)?.registry(scope).get(urn)
    }

    /// Lookup anywhere in the scope, current file first.
    #[must_use]
    pub fn get(&self, scope: CacheScope, urn: &str) -> Option<ElementRef> {
        self.lookup(scope, urn).or_else(|| {
            self.files
                .values()
                .find_map(|entry| entry.registry(scope).get(urn))
        })
    }

    /// Return the element registered under `urn`, or store `candidate`.
    ///
    /// An element registered by another file is adopted into the current
    /// file's registry; the candidate is dropped in that case.
    pub fn register_or_get(
        &mut self,
        scope: CacheScope,
        urn: &str,
        candidate: SemanticElement,
    ) -> Result<ElementRef, AspectError> {
        if let Some(existing) = self.get(scope, urn) {
            self.adopt(scope, urn, existing)?;
            return Ok(existing);
        }
        let mut candidate = candidate;
        candidate.urn = urn.to_string();
        let anonymous = candidate.anonymous;
        let id = self.graph_mut(scope).insert(candidate);
        let registry = self.current_registry_mut(scope)?;
        registry.by_urn.insert(urn.to_string(), id);
        if anonymous {
            registry.anonymous.insert(id);
        }
        Ok(id)
    }

    /// Register an anonymous element, suffixing a counter until its
    /// identifier is free in the scope.
    pub fn register_anonymous(
        &mut self,
        scope: CacheScope,
        mut candidate: SemanticElement,
    ) -> Result<ElementRef, AspectError> {
        let base_urn = candidate.urn.clone();
        let base_name = candidate.name.clone();
        let mut counter = 1u32;
        while self.get(scope, &candidate.urn).is_some() {
            counter = counter.saturating_add(1);
            candidate.urn = format!("{base_urn}{counter}");
            candidate.name = format!("{base_name}{counter}");
        }
        candidate.anonymous = true;
        let urn = candidate.urn.clone();
        self.register_or_get(scope, &urn, candidate)
    }

    /// Index an existing element under `urn` in the current file.
    pub fn adopt(
        &mut self,
        scope: CacheScope,
        urn: &str,
        id: ElementRef,
    ) -> Result<(), AspectError> {
        let registry = self.current_registry_mut(scope)?;
        registry.by_urn.entry(urn.to_string()).or_insert(id);
        Ok(())
    }

    /// An element already built by another open file.
    ///
    /// Searches the cached registries of every file except the current one;
    /// the isolated scope is never consulted.
    #[must_use]
    pub fn find_external(&self, urn: &str) -> Option<ElementRef> {
        self.external_owner(urn).map(|(_, id)| id)
    }

    /// Like [`Self::find_external`], also naming the owning file.
    #[must_use]
    pub fn external_owner(&self, urn: &str) -> Option<(&FileKey, ElementRef)> {
        self.find_in_other_files(CacheScope::Cached, urn)
    }

    /// First registry of another file in `scope` that indexes `urn`.
    #[must_use]
    pub fn find_in_other_files(
        &self,
        scope: CacheScope,
        urn: &str,
    ) -> Option<(&FileKey, ElementRef)> {
        self.files
            .iter()
            .filter(|(key, _)| Some(*key) != self.current.as_ref())
            .find_map(|(key, entry)| entry.registry(scope).get(urn).map(|id| (key, id)))
    }

    fn current_registry_mut(&mut self, scope: CacheScope) -> Result<&mut Registry, AspectError> {
        let current = self.current.as_ref().ok_or(AspectError::NoActiveFile)?;
        let entry = self
            .files
            .get_mut(current)
            .ok_or_else(|| AspectError::FileNotOpen(current.to_string()))?;
        Ok(entry.registry_mut(scope))
    }

    // =========================================================================
    // RENAMING
    // =========================================================================

    /// Move the slot `old` to `new` in every registry of the scope.
    ///
    /// Fails without changes if some registry already maps `new` to a
    /// different element. The element keeps its handle; its identifier and
    /// authored name follow the new key.
    pub fn rename_key(
        &mut self,
        scope: CacheScope,
        old: &str,
        new: &str,
    ) -> Result<bool, AspectError> {
        let mapping = BTreeMap::from([(old.to_string(), new.to_string())]);
        Ok(self.rename_keys(scope, &mapping)? > 0)
    }

    /// Move every key under `old_prefix` to the same key under `new_prefix`.
    /// Returns the number of elements renamed.
    pub fn rename_prefix(
        &mut self,
        scope: CacheScope,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<usize, AspectError> {
        let mapping: BTreeMap<String, String> = self
            .files
            .values()
            .flat_map(|entry| entry.registry(scope).by_urn.keys())
            .filter_map(|urn| {
                urn.strip_prefix(old_prefix)
                    .map(|rest| (urn.clone(), format!("{new_prefix}{rest}")))
            })
            .collect();
        self.rename_keys(scope, &mapping)
    }

    /// Apply a set of key moves as one unit.
    pub fn rename_keys(
        &mut self,
        scope: CacheScope,
        mapping: &BTreeMap<String, String>,
    ) -> Result<usize, AspectError> {
        // Validate everything before touching any registry.
        for (file, entry) in &self.files {
            let registry = entry.registry(scope);
            for (old, new) in mapping {
                let (Some(moving), Some(occupant)) = (registry.get(old), registry.get(new)) else {
                    continue;
                };
                if moving != occupant && !mapping.contains_key(new) {
                    return Err(AspectError::RewriteConflict(format!(
                        "{new} already exists in {file}"
                    )));
                }
            }
        }

        let mut renamed = BTreeSet::new();
        for entry in self.files.values_mut() {
            let registry = entry.registry_mut(scope);
            let moved: Vec<(String, ElementRef)> = mapping
                .iter()
                .filter_map(|(old, new)| registry.by_urn.remove(old).map(|id| (new.clone(), id)))
                .collect();
            for (new, id) in moved {
                registry.by_urn.insert(new, id);
                renamed.insert(id);
            }
        }

        let graph = self.graph_mut(scope);
        for id in &renamed {
            let Some(element) = graph.get_mut(*id) else {
                continue;
            };
            let Some(new) = mapping.get(&element.urn) else {
                continue;
            };
            if !element.anonymous {
                element.name = fragment(new).to_string();
            }
            element.urn.clone_from(new);
        }
        Ok(renamed.len())
    }

    /// Rename every file key of `old` to `new`.
    pub fn rename_file_namespace(
        &mut self,
        old: &Namespace,
        new: &Namespace,
    ) -> Result<usize, AspectError> {
        let moving: Vec<FileKey> = self
            .files
            .keys()
            .filter(|key| &key.namespace == old)
            .cloned()
            .collect();
        for key in &moving {
            let target = FileKey::new(new.clone(), key.file_name.clone());
            if self.files.contains_key(&target) {
                return Err(AspectError::RewriteConflict(format!(
                    "file {target} is already open"
                )));
            }
        }
        for key in &moving {
            if let Some(entry) = self.files.remove(key) {
                let target = FileKey::new(new.clone(), key.file_name.clone());
                if self.current.as_ref() == Some(key) {
                    self.current = Some(target.clone());
                }
                self.files.insert(target, entry);
            }
        }
        Ok(moving.len())
    }

    // =========================================================================
    // REMOVAL
    // =========================================================================

    /// Forget a file and collect elements no remaining file indexes.
    ///
    /// Returns the number of elements dropped across both scopes.
    pub fn remove_file(&mut self, file: &FileKey) -> Result<usize, AspectError> {
        if self.files.remove(file).is_none() {
            return Err(AspectError::FileNotOpen(file.to_string()));
        }
        if self.current.as_ref() == Some(file) {
            self.current = None;
        }
        Ok(self.collect(CacheScope::Cached) + self.collect(CacheScope::Isolated))
    }

    /// Empty one scope's registry of a file, e.g. before a fresh preview.
    pub fn clear_registry(&mut self, file: &FileKey, scope: CacheScope) -> usize {
        if let Some(entry) = self.files.get_mut(file) {
            *entry.registry_mut(scope) = Registry::default();
        }
        self.collect(scope)
    }

    /// Drop a single element from every registry of the scope.
    pub fn unregister(&mut self, scope: CacheScope, id: ElementRef) {
        for entry in self.files.values_mut() {
            let registry = entry.registry_mut(scope);
            registry.by_urn.retain(|_, r| *r != id);
            registry.anonymous.remove(&id);
        }
    }

    /// Drop everything: all files, both arenas, the current pointer.
    pub fn reset_all(&mut self) {
        self.files.clear();
        self.cached.clear();
        self.isolated.clear();
        self.current = None;
    }

    fn collect(&mut self, scope: CacheScope) -> usize {
        let retained: BTreeSet<ElementRef> = self
            .files
            .values()
            .flat_map(|entry| entry.registry(scope).by_urn.values().copied())
            .collect();
        let graph = self.graph_mut(scope);
        let unindexed: BTreeSet<ElementRef> = graph
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !retained.contains(id))
            .collect();
        graph.remove_set(&unindexed).len()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementKind, Entity, PropertyUse};

    fn file(name: &str) -> FileKey {
        FileKey::new(Namespace::new("org.acme", "1.0.0"), name)
    }

    fn entity(urn: &str) -> SemanticElement {
        SemanticElement::new(urn, fragment(urn), ElementKind::Entity(Entity::default()))
    }

    const E: &str = "urn:samm:org.acme:1.0.0#E";

    #[test]
    fn register_or_get_is_idempotent() {
        let mut cache = NamespaceCache::new();
        cache.open_file(file("A.ttl"));
        let first = cache
            .register_or_get(CacheScope::Cached, E, entity(E))
            .expect("register");
        let second = cache
            .register_or_get(CacheScope::Cached, E, entity(E))
            .expect("register");
        let mut other = entity(E);
        other.name = "Other".into();
        let third = cache
            .register_or_get(CacheScope::Cached, E, other)
            .expect("register");
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(cache.graph(CacheScope::Cached).len(), 1);
        assert_eq!(
            cache.element(CacheScope::Cached, first).expect("element").name,
            "E"
        );
    }

    #[test]
    fn registration_requires_a_current_file() {
        let mut cache = NamespaceCache::new();
        assert!(matches!(
            cache.register_or_get(CacheScope::Cached, E, entity(E)),
            Err(AspectError::NoActiveFile)
        ));
    }

    #[test]
    fn scopes_are_disjoint() {
        let mut cache = NamespaceCache::new();
        cache.open_file(file("A.ttl"));
        cache
            .register_or_get(CacheScope::Cached, E, entity(E))
            .expect("register");
        assert!(cache.get(CacheScope::Isolated, E).is_none());
        cache
            .register_or_get(CacheScope::Isolated, E, entity(E))
            .expect("register");
        assert_eq!(cache.graph(CacheScope::Isolated).len(), 1);
    }

    #[test]
    fn find_external_skips_current_file_and_isolated_scope() {
        let mut cache = NamespaceCache::new();
        cache.open_file(file("A.ttl"));
        let a = cache
            .register_or_get(CacheScope::Cached, E, entity(E))
            .expect("register");
        assert!(cache.find_external(E).is_none());

        cache.open_file(file("B.ttl"));
        assert_eq!(cache.find_external(E), Some(a));

        let iso = "urn:samm:org.acme:1.0.0#OnlyPreview";
        cache.set_current(&file("A.ttl")).expect("current");
        cache
            .register_or_get(CacheScope::Isolated, iso, entity(iso))
            .expect("register");
        cache.set_current(&file("B.ttl")).expect("current");
        assert!(cache.find_external(iso).is_none());
    }

    #[test]
    fn anonymous_names_are_made_unique() {
        let mut cache = NamespaceCache::new();
        cache.open_file(file("A.ttl"));
        let urn = "urn:samm:org.acme:1.0.0#speedTrait";
        let first = cache
            .register_anonymous(CacheScope::Cached, entity(urn))
            .expect("register");
        let second = cache
            .register_anonymous(CacheScope::Cached, entity(urn))
            .expect("register");
        assert_ne!(first, second);
        let el = cache.element(CacheScope::Cached, second).expect("element");
        assert_eq!(el.urn, format!("{urn}2"));
        assert!(el.anonymous);
        let registry = cache
            .file(&file("A.ttl"))
            .expect("file")
            .registry(CacheScope::Cached);
        assert_eq!(registry.anonymous().len(), 2);
    }

    #[test]
    fn rename_key_moves_slot_and_keeps_handle() {
        let mut cache = NamespaceCache::new();
        cache.open_file(file("A.ttl"));
        let id = cache
            .register_or_get(CacheScope::Cached, E, entity(E))
            .expect("register");
        let new = "urn:samm:org.acme:2.0.0#E";
        assert!(cache.rename_key(CacheScope::Cached, E, new).expect("rename"));
        assert!(cache.get(CacheScope::Cached, E).is_none());
        assert_eq!(cache.get(CacheScope::Cached, new), Some(id));
        assert_eq!(cache.element(CacheScope::Cached, id).expect("el").urn, new);
    }

    #[test]
    fn rename_key_conflict_changes_nothing() {
        let mut cache = NamespaceCache::new();
        cache.open_file(file("A.ttl"));
        let other = "urn:samm:org.acme:1.0.0#F";
        cache
            .register_or_get(CacheScope::Cached, E, entity(E))
            .expect("register");
        cache
            .register_or_get(CacheScope::Cached, other, entity(other))
            .expect("register");
        let before = cache.clone();
        assert!(cache.rename_key(CacheScope::Cached, E, other).is_err());
        assert_eq!(cache, before);
    }

    #[test]
    fn remove_file_collects_unindexed_elements() {
        let mut cache = NamespaceCache::new();
        cache.open_file(file("A.ttl"));
        let shared = cache
            .register_or_get(CacheScope::Cached, E, entity(E))
            .expect("register");
        let private_urn = "urn:samm:org.acme:1.0.0#Private";
        cache
            .register_or_get(CacheScope::Cached, private_urn, entity(private_urn))
            .expect("register");

        cache.open_file(file("B.ttl"));
        let user_urn = "urn:samm:org.acme:1.0.0#User";
        let user = cache
            .register_or_get(CacheScope::Cached, user_urn, entity(user_urn))
            .expect("register");
        cache.adopt(CacheScope::Cached, E, shared).expect("adopt");
        cache.graph_mut(CacheScope::Cached).set_kind(
            user,
            ElementKind::Entity(Entity {
                properties: vec![PropertyUse::plain(shared)],
                ..Entity::default()
            }),
        );

        let dropped = cache.remove_file(&file("A.ttl")).expect("remove");
        assert_eq!(dropped, 1);
        assert!(cache.graph(CacheScope::Cached).contains(shared));
        assert!(cache.remove_file(&file("A.ttl")).is_err());
    }

    #[test]
    fn reset_all_empties_everything() {
        let mut cache = NamespaceCache::new();
        cache.open_file(file("A.ttl"));
        cache
            .register_or_get(CacheScope::Cached, E, entity(E))
            .expect("register");
        cache.reset_all();
        assert!(cache.current().is_none());
        assert!(cache.graph(CacheScope::Cached).is_empty());
        assert_eq!(cache.files().count(), 0);
    }
}
