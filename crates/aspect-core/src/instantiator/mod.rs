//! # Instantiation Pipeline
//!
//! Builds typed elements from the statements of one file.
//!
//! Resolution of an identifier never recurses: it either returns the element
//! already registered under that identifier, or registers an empty shell of
//! the declared kind and queues a `Populate` item for it. Builders (see
//! `builders`) fill a shell by resolving its references the same way, so
//! self-referential and mutually-referential models terminate. The queue is
//! drained to a fixed point.
//!
//! Problems never abort a load; they become [`Diagnostic`]s in the
//! returned [`LoadReport`].

mod builders;

use crate::cache::{CacheScope, NamespaceCache};
use crate::config::ModelConfig;
use crate::element::{
    Characteristic, CharacteristicClass, CharacteristicTag, ElementKind, ElementTag, SemanticElement,
};
use crate::primitives::{MAX_DEFERRED_ITEMS, RDF_TYPE};
use crate::resolver::{ListResolution, Resolver};
use crate::source::StatementSource;
use crate::types::fragment;
use crate::vocabulary::Vocabulary;
use crate::{AspectError, Diagnostic, ElementRef, FileKey, Term};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

/// Outcome of instantiating a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub file: FileKey,
    pub scope: CacheScope,
    /// Elements indexed by the file after the load.
    pub elements: usize,
    /// Deferred items processed while draining the queue.
    pub deferred: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadReport {
    /// Number of diagnostics that count as errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Work postponed until the current builder returns.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    /// Fill the shell `id` from the statements of `subject`.
    Populate { id: ElementRef, subject: Term },
    /// Give untyped range bounds of `constraint` the data type of the
    /// base characteristic of `owner`.
    RangeBounds {
        constraint: ElementRef,
        owner: ElementRef,
    },
}

/// Single-use instantiation context over one statement source.
pub struct Instantiator<'a, S: StatementSource + ?Sized> {
    source: &'a S,
    cache: &'a mut NamespaceCache,
    config: &'a ModelConfig,
    vocab: Vocabulary,
    scope: CacheScope,
    file: FileKey,
    queue: VecDeque<Deferred>,
    /// Blank node label -> element built for it in this run.
    blanks: BTreeMap<String, ElementRef>,
    processed: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, S: StatementSource + ?Sized> Instantiator<'a, S> {
    /// Prepare an instantiation into the current file of `cache`.
    pub fn new(
        source: &'a S,
        cache: &'a mut NamespaceCache,
        config: &'a ModelConfig,
        scope: CacheScope,
    ) -> Result<Self, AspectError> {
        let file = cache.current().cloned().ok_or(AspectError::NoActiveFile)?;
        Ok(Self {
            source,
            cache,
            config,
            vocab: config.vocabulary(),
            scope,
            file,
            queue: VecDeque::new(),
            blanks: BTreeMap::new(),
            processed: 0,
            diagnostics: Vec::new(),
        })
    }

    /// Instantiate every typed named subject of the source.
    pub fn instantiate_all(mut self) -> Result<LoadReport, AspectError> {
        let mut subjects: Vec<String> = self
            .source
            .query(None, Some(RDF_TYPE), None)?
            .into_iter()
            .filter_map(|s| s.subject.as_iri().map(str::to_string))
            .collect();
        subjects.sort();
        subjects.dedup();
        for urn in &subjects {
            self.resolve_iri(urn, None)?;
        }
        self.drain()?;
        self.report_cycles();
        Ok(self.finish())
    }

    /// Instantiate one subject (and everything it reaches).
    pub fn instantiate(
        mut self,
        subject: &Term,
    ) -> Result<(Option<ElementRef>, LoadReport), AspectError> {
        let id = self.resolve(subject, None, None)?;
        self.drain()?;
        self.report_cycles();
        Ok((id, self.finish()))
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Resolve a reference to an element handle.
    ///
    /// `expected` is the kind the referencing slot accepts; it is used when
    /// the subject declares no type of its own. `owner` names anonymous
    /// elements. Literals resolve to `None`.
    fn resolve(
        &mut self,
        term: &Term,
        expected: Option<ElementTag>,
        owner: Option<ElementRef>,
    ) -> Result<Option<ElementRef>, AspectError> {
        match term {
            Term::Literal(_) => Ok(None),
            Term::Iri(urn) => self.resolve_iri(urn, expected),
            Term::Blank(label) => self.resolve_blank(label, term, expected, owner),
        }
    }

    fn resolve_iri(
        &mut self,
        urn: &str,
        expected: Option<ElementTag>,
    ) -> Result<Option<ElementRef>, AspectError> {
        if let Some(existing) = self.cache.lookup(self.scope, urn) {
            return Ok(Some(existing));
        }
        let subject = Term::iri(urn);
        if self.source.has_subject(&subject)? {
            return self.resolve_defined(urn, &subject, expected);
        }

        if let Some((_, existing)) = self.cache.find_in_other_files(self.scope, urn) {
            self.cache.adopt(self.scope, urn, existing)?;
            return Ok(Some(existing));
        }
        if self.scope == CacheScope::Isolated
            && let Some(shared) = self.cache.find_external(urn)
        {
            return self.copy_external(urn, shared).map(Some);
        }
        if self.config.is_predefined(urn) {
            return self.synthesize_predefined(urn, expected).map(Some);
        }

        let tag = expected.unwrap_or(ElementTag::Entity);
        let mut placeholder = SemanticElement::new(urn, fragment(urn), ElementKind::empty(tag));
        placeholder.external = true;
        placeholder.meta_model_version.clone_from(&self.config.meta_model_version);
        let id = self.cache.register_or_get(self.scope, urn, placeholder)?;
        self.diagnose(Diagnostic::UnresolvedReference {
            urn: urn.to_string(),
        });
        Ok(Some(id))
    }

    /// A subject with statements in the current source.
    fn resolve_defined(
        &mut self,
        urn: &str,
        subject: &Term,
        expected: Option<ElementTag>,
    ) -> Result<Option<ElementRef>, AspectError> {
        if let Some((owner, existing)) = self.cache.find_in_other_files(self.scope, urn) {
            let owner = owner.to_string();
            let placeholder = self
                .cache
                .element(self.scope, existing)
                .is_some_and(|el| el.external && !el.predefined);
            self.cache.adopt(self.scope, urn, existing)?;
            if !placeholder {
                self.diagnose(Diagnostic::DuplicateIdentifier {
                    urn: urn.to_string(),
                    owner,
                });
                return Ok(Some(existing));
            }
            // A file now defines what an earlier file could only reference.
            let Some(tag) = self.declared_tag(subject, expected)? else {
                return Ok(Some(existing));
            };
            let graph = self.cache.graph_mut(self.scope);
            graph.set_kind(existing, ElementKind::empty(tag));
            if let Some(el) = graph.get_mut(existing) {
                el.external = false;
            }
            debug!(urn, ?tag, "upgrading external placeholder");
            self.queue.push_back(Deferred::Populate {
                id: existing,
                subject: subject.clone(),
            });
            return Ok(Some(existing));
        }

        let Some(tag) = self.declared_tag(subject, expected)? else {
            return Ok(None);
        };
        let mut shell = SemanticElement::new(urn, fragment(urn), ElementKind::empty(tag));
        shell.predefined = self.config.is_predefined(urn);
        shell.meta_model_version.clone_from(&self.config.meta_model_version);
        let id = self.cache.register_or_get(self.scope, urn, shell)?;
        debug!(urn, ?tag, %id, "registered shell");
        self.queue.push_back(Deferred::Populate {
            id,
            subject: subject.clone(),
        });
        Ok(Some(id))
    }

    fn resolve_blank(
        &mut self,
        label: &str,
        term: &Term,
        expected: Option<ElementTag>,
        owner: Option<ElementRef>,
    ) -> Result<Option<ElementRef>, AspectError> {
        if let Some(id) = self.blanks.get(label) {
            return Ok(Some(*id));
        }
        let Some(tag) = self.declared_tag(term, expected)? else {
            return Ok(None);
        };
        let shell = self.anonymous_shell(owner, tag, None);
        let id = self.cache.register_anonymous(self.scope, shell)?;
        self.blanks.insert(label.to_string(), id);
        debug!(label, ?tag, %id, "registered anonymous shell");
        self.queue.push_back(Deferred::Populate {
            id,
            subject: term.clone(),
        });
        Ok(Some(id))
    }

    /// An unregistered anonymous element named after `owner` (or `base`).
    fn anonymous_shell(
        &self,
        owner: Option<ElementRef>,
        tag: ElementTag,
        base: Option<&str>,
    ) -> SemanticElement {
        let stem = base
            .map(str::to_string)
            .or_else(|| {
                owner
                    .and_then(|o| self.cache.element(self.scope, o))
                    .map(|el| el.name.clone())
            })
            .unwrap_or_default();
        let name = format!("{stem}{}", tag.anonymous_suffix());
        let urn = self.file.namespace.urn(&self.config.urn_scheme, &name);
        let mut shell = SemanticElement::new(urn, name, ElementKind::empty(tag));
        shell.meta_model_version.clone_from(&self.config.meta_model_version);
        shell
    }

    /// Kind of a subject from its type statements, falling back to `expected`.
    fn declared_tag(
        &mut self,
        subject: &Term,
        expected: Option<ElementTag>,
    ) -> Result<Option<ElementTag>, AspectError> {
        let mut types = self.source.objects(subject, RDF_TYPE)?;
        types.sort();
        for ty in &types {
            if let Some(tag) = ty.as_iri().and_then(|iri| self.vocab.classify_type(iri)) {
                return Ok(Some(tag));
            }
        }
        for ty in &types {
            if let Some(iri) = ty.as_iri()
                && self.is_entity_type(iri)?
            {
                return Ok(Some(ElementTag::EntityValue));
            }
        }
        if let Some(declared) = types.first() {
            self.diagnose(Diagnostic::UnknownType {
                subject: subject.lexical().to_string(),
                declared: declared.lexical().to_string(),
            });
            return Ok(expected.filter(|tag| *tag != ElementTag::EntityValue));
        }
        Ok(expected)
    }

    /// Whether `iri` names a user entity, built or not.
    fn is_entity_type(&self, iri: &str) -> Result<bool, AspectError> {
        let in_scope = self
            .cache
            .get(self.scope, iri)
            .and_then(|id| self.cache.element(self.scope, id));
        let shared = self
            .cache
            .find_external(iri)
            .and_then(|id| self.cache.element(CacheScope::Cached, id));
        let built = in_scope.or(shared).is_some_and(|el| el.tag().is_entity());
        if built {
            return Ok(true);
        }
        Ok(self
            .source
            .objects(&Term::iri(iri), RDF_TYPE)?
            .iter()
            .filter_map(|t| t.as_iri())
            .filter_map(|t| self.vocab.classify_type(t))
            .any(ElementTag::is_entity))
    }

    // =========================================================================
    // SYNTHESIS
    // =========================================================================

    /// Build a reserved-prefix element from built-in knowledge.
    fn synthesize_predefined(
        &mut self,
        urn: &str,
        expected: Option<ElementTag>,
    ) -> Result<ElementRef, AspectError> {
        let data_type = self.vocab.predefined_characteristic_type(urn);
        let tag = if self.vocab.is_scalar(urn) {
            ElementTag::Scalar
        } else if data_type.is_some() {
            ElementTag::Characteristic(CharacteristicTag::Characteristic)
        } else {
            expected.unwrap_or(ElementTag::Scalar)
        };
        let mut element = SemanticElement::new(urn, fragment(urn), ElementKind::empty(tag));
        element.predefined = true;
        element.external = true;
        element.meta_model_version.clone_from(&self.config.meta_model_version);
        let id = self.cache.register_or_get(self.scope, urn, element)?;
        if let Some(data_type) = data_type {
            let scalar = self.resolve_iri(&data_type, Some(ElementTag::Scalar))?;
            self.cache.graph_mut(self.scope).set_kind(
                id,
                ElementKind::Characteristic(Characteristic {
                    data_type: scalar,
                    class: CharacteristicClass::Plain,
                }),
            );
        }
        debug!(urn, ?tag, "synthesized predefined element");
        Ok(id)
    }

    /// Thin isolated-scope copy of an element built in the cached scope.
    fn copy_external(&mut self, urn: &str, shared: ElementRef) -> Result<ElementRef, AspectError> {
        let (tag, predefined) = self
            .cache
            .element(CacheScope::Cached, shared)
            .map(|el| (el.tag(), el.predefined))
            .unwrap_or((ElementTag::Entity, false));
        let mut copy = SemanticElement::new(urn, fragment(urn), ElementKind::empty(tag));
        copy.external = true;
        copy.predefined = predefined;
        copy.meta_model_version.clone_from(&self.config.meta_model_version);
        self.cache.register_or_get(self.scope, urn, copy)
    }

    // =========================================================================
    // QUEUE
    // =========================================================================

    fn drain(&mut self) -> Result<(), AspectError> {
        while let Some(item) = self.queue.pop_front() {
            self.processed = self.processed.saturating_add(1);
            if self.processed > MAX_DEFERRED_ITEMS {
                warn!(file = %self.file, "deferred queue limit reached");
                self.queue.clear();
                break;
            }
            match item {
                Deferred::Populate { id, subject } => self.populate(id, &subject)?,
                Deferred::RangeBounds { constraint, owner } => {
                    self.apply_range_bounds(constraint, owner);
                }
            }
        }
        debug!(file = %self.file, processed = self.processed, "deferred queue drained");
        Ok(())
    }

    // =========================================================================
    // HELPERS FOR BUILDERS
    // =========================================================================

    fn list(&mut self, head: &Term) -> Result<ListResolution, AspectError> {
        let resolution = Resolver::new(self.source, &self.vocab, self.config.max_list_length)
            .resolve_list(head)?;
        if resolution.malformed {
            self.diagnose(Diagnostic::MalformedList {
                node: head.lexical().to_string(),
            });
        }
        Ok(resolution)
    }

    fn nested_record(&self, subject: &Term) -> Result<Vec<(String, Term)>, AspectError> {
        Resolver::new(self.source, &self.vocab, self.config.max_list_length)
            .resolve_nested_record(subject)
    }

    fn diagnose(&mut self, diagnostic: Diagnostic) {
        warn!(file = %self.file, %diagnostic, "load diagnostic");
        self.diagnostics.push(diagnostic);
    }

    fn report_cycles(&mut self) {
        let Some(entry) = self.cache.file(&self.file) else {
            return;
        };
        let registry = entry.registry(self.scope);
        let cycles: Vec<String> = self
            .cache
            .graph(self.scope)
            .find_inheritance_cycles()
            .into_iter()
            .filter_map(|id| self.cache.element(self.scope, id))
            .filter(|el| registry.get(&el.urn).is_some())
            .map(|el| el.urn.clone())
            .collect();
        for urn in cycles {
            self.diagnose(Diagnostic::InheritanceCycle { urn });
        }
    }

    fn finish(self) -> LoadReport {
        let elements = self
            .cache
            .file(&self.file)
            .map(|entry| entry.registry(self.scope).len())
            .unwrap_or(0);
        let report = LoadReport {
            file: self.file.clone(),
            scope: self.scope,
            elements,
            deferred: self.processed,
            diagnostics: self.diagnostics,
        };
        if report.has_errors() {
            self.cache.mark_errors(&self.file);
        }
        info!(
            file = %report.file,
            scope = ?report.scope,
            elements = report.elements,
            errors = report.error_count(),
            "instantiation finished"
        );
        report
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::element::{BoundKind, Constraint, ConstraintTag, Entity, Property, Value};
    use crate::primitives::{RDF_FIRST, RDF_NIL, RDF_REST};
    use crate::source::MemoryStore;
    use crate::{Literal, Namespace, Statement};

    const NS: &str = "urn:samm:org.acme:1.0.0#";
    const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";

    fn iri(local: &str) -> Term {
        Term::iri(format!("{NS}{local}"))
    }

    fn vocab() -> Vocabulary {
        ModelConfig::default().vocabulary()
    }

    /// Statement builder.
    struct Model {
        store: MemoryStore,
    }

    impl Model {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
            }
        }

        fn typed(&mut self, local: &str, ty: String) -> &mut Self {
            self.store.add(Statement::new(iri(local), RDF_TYPE, Term::iri(ty)));
            self
        }

        fn fact(&mut self, subject: Term, predicate: String, object: Term) -> &mut Self {
            self.store.add(Statement::new(subject, predicate, object));
            self
        }

        /// `first`/`rest` chain over blank nodes `<label>0..n`.
        fn list(&mut self, label: &str, items: Vec<Term>) -> Term {
            let count = items.len();
            for (i, item) in items.into_iter().enumerate() {
                let node = Term::blank(format!("{label}{i}"));
                let rest = if i + 1 == count {
                    Term::iri(RDF_NIL)
                } else {
                    Term::blank(format!("{label}{}", i + 1))
                };
                self.store.add(Statement::new(node.clone(), RDF_FIRST, item));
                self.store.add(Statement::new(node, RDF_REST, rest));
            }
            if count == 0 {
                Term::iri(RDF_NIL)
            } else {
                Term::blank(format!("{label}0"))
            }
        }
    }

    fn load(cache: &mut NamespaceCache, file_name: &str, store: &MemoryStore) -> LoadReport {
        cache.open_file(FileKey::new(Namespace::new("org.acme", "1.0.0"), file_name));
        Instantiator::new(store, cache, &ModelConfig::default(), CacheScope::Cached)
            .expect("instantiator")
            .instantiate_all()
            .expect("load")
    }

    fn element<'c>(cache: &'c NamespaceCache, urn: &str) -> (ElementRef, &'c SemanticElement) {
        let id = cache.get(CacheScope::Cached, urn).expect("registered");
        (id, cache.element(CacheScope::Cached, id).expect("element"))
    }

    #[test]
    fn self_typed_entity_terminates() {
        let v = vocab();
        let mut m = Model::new();
        let props = m.list("l", vec![iri("p")]);
        m.typed("E", v.samm("Entity"))
            .fact(iri("E"), v.samm("properties"), props)
            .typed("p", v.samm("Property"))
            .fact(iri("p"), v.samm("characteristic"), iri("C"))
            .typed("C", v.samm("Characteristic"))
            .fact(iri("C"), v.samm("dataType"), iri("E"));

        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "E.ttl", &m.store);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

        let (e, el) = element(&cache, &format!("{NS}E"));
        let ElementKind::Entity(Entity { properties, .. }) = &el.kind else {
            panic!("not an entity");
        };
        let (_, p) = element(&cache, &format!("{NS}p"));
        assert_eq!(properties[0].property, cache.get(CacheScope::Cached, &p.urn).expect("p"));
        let ElementKind::Property(Property {
            characteristic: Some(c),
            ..
        }) = &p.kind
        else {
            panic!("property without characteristic");
        };
        let ElementKind::Characteristic(c) = &cache.element(CacheScope::Cached, *c).expect("c").kind
        else {
            panic!("not a characteristic");
        };
        assert_eq!(c.data_type, Some(e));
        assert!(cache.graph(CacheScope::Cached).backlink_violations().is_empty());
    }

    #[test]
    fn unresolved_reference_becomes_external_placeholder() {
        let v = vocab();
        let mut m = Model::new();
        let property = v.samm("Property");
        m.typed("p", property)
            .fact(iri("p"), v.samm("characteristic"), iri("Missing"));

        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "P.ttl", &m.store);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::UnresolvedReference {
                urn: format!("{NS}Missing")
            }]
        );
        let (_, missing) = element(&cache, &format!("{NS}Missing"));
        assert!(missing.external);
        assert!(missing.tag().is_characteristic());
        assert!(cache.file(&report.file).expect("file").has_errors());
    }

    #[test]
    fn duplicate_definition_first_loaded_wins() {
        let v = vocab();
        let mut first = Model::new();
        let entity = v.samm("Entity");
        first
            .typed("X", entity.clone())
            .fact(iri("X"), v.samm("preferredName"), Term::literal("first"));
        let mut second = Model::new();
        second
            .typed("X", entity)
            .fact(iri("X"), v.samm("preferredName"), Term::literal("second"));

        let mut cache = NamespaceCache::new();
        load(&mut cache, "A.ttl", &first.store);
        let report = load(&mut cache, "B.ttl", &second.store);
        assert!(matches!(
            report.diagnostics.as_slice(),
            [Diagnostic::DuplicateIdentifier { .. }]
        ));
        assert!(!report.has_errors());

        let (_, x) = element(&cache, &format!("{NS}X"));
        assert_eq!(x.preferred_names.get("").map(String::as_str), Some("first"));
        assert_eq!(report.elements, 1);
    }

    #[test]
    fn later_file_upgrades_placeholder_in_place() {
        let v = vocab();
        let mut referencing = Model::new();
        let property = v.samm("Property");
        referencing
            .typed("p", property)
            .fact(iri("p"), v.samm("characteristic"), iri("Shared"));
        let mut defining = Model::new();
        let characteristic = v.samm("Characteristic");
        defining
            .typed("Shared", characteristic)
            .fact(iri("Shared"), v.samm("dataType"), Term::iri(XSD_INT));

        let mut cache = NamespaceCache::new();
        load(&mut cache, "A.ttl", &referencing.store);
        let (placeholder, _) = element(&cache, &format!("{NS}Shared"));
        let report = load(&mut cache, "B.ttl", &defining.store);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

        let (shared, el) = element(&cache, &format!("{NS}Shared"));
        assert_eq!(shared, placeholder);
        assert!(!el.external);
        let ElementKind::Characteristic(c) = &el.kind else {
            panic!("not a characteristic");
        };
        let (int, _) = element(&cache, XSD_INT);
        assert_eq!(c.data_type, Some(int));
        assert!(el.parents.contains(&element(&cache, &format!("{NS}p")).0));
    }

    #[test]
    fn anonymous_property_use_refines_abstract_property() {
        let v = vocab();
        let mut m = Model::new();
        let (entity, abstract_property) = (v.samm("Entity"), v.samm("AbstractProperty"));
        let record = Term::blank("use");
        let props = m.list("l", vec![record.clone()]);
        let text = Term::iri(v.samm_c("Text"));
        m.typed("E", entity)
            .fact(iri("E"), v.samm("properties"), props)
            .fact(record.clone(), v.samm("extends"), iri("abstractSpeed"))
            .fact(record.clone(), v.samm("characteristic"), text)
            .fact(record, v.samm("optional"), Term::Literal(Literal::plain("true")))
            .typed("abstractSpeed", abstract_property);

        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "E.ttl", &m.store);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

        let (_, e) = element(&cache, &format!("{NS}E"));
        let ElementKind::Entity(Entity { properties, .. }) = &e.kind else {
            panic!("not an entity");
        };
        assert!(properties[0].optional);
        let (anonymous, el) = element(&cache, &format!("{NS}abstractSpeedProperty"));
        assert_eq!(properties[0].property, anonymous);
        assert!(el.anonymous);
        let (abstract_speed, _) = element(&cache, &format!("{NS}abstractSpeed"));
        let ElementKind::Property(p) = &el.kind else {
            panic!("not a property");
        };
        assert_eq!(p.extends, Some(abstract_speed));
        assert!(p.characteristic.is_some());
    }

    #[test]
    fn range_bounds_take_base_data_type() {
        let v = vocab();
        let mut m = Model::new();
        let (trait_ty, characteristic, range) = (
            v.samm_c("Trait"),
            v.samm("Characteristic"),
            v.samm_c("RangeConstraint"),
        );
        m.typed("T", trait_ty)
            .fact(iri("T"), v.samm_c("baseCharacteristic"), iri("C"))
            .fact(iri("T"), v.samm_c("constraint"), iri("K"))
            .typed("C", characteristic)
            .fact(iri("C"), v.samm("dataType"), Term::iri(XSD_INT))
            .typed("K", range)
            .fact(iri("K"), v.samm_c("minValue"), Term::literal("0"));

        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "T.ttl", &m.store);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

        let (_, k) = element(&cache, &format!("{NS}K"));
        let ElementKind::Constraint(Constraint::Range {
            min,
            max,
            lower_bound,
            upper_bound,
        }) = &k.kind
        else {
            panic!("not a range constraint");
        };
        assert_eq!(min.as_ref().and_then(|l| l.datatype.as_deref()), Some(XSD_INT));
        assert!(max.is_none());
        assert_eq!(*lower_bound, BoundKind::AtLeast);
        assert_eq!(*upper_bound, BoundKind::Open);
    }

    fn trait_with_blank_constraints(length_label: &str, range_label: &str) -> MemoryStore {
        let v = vocab();
        let mut m = Model::new();
        let (length, range) = (Term::blank(length_label), Term::blank(range_label));
        m.typed("T", v.samm_c("Trait"))
            .fact(iri("T"), v.samm_c("baseCharacteristic"), iri("C"))
            .fact(iri("T"), v.samm_c("constraint"), length.clone())
            .fact(iri("T"), v.samm_c("constraint"), range.clone())
            .fact(length.clone(), RDF_TYPE.to_string(), Term::iri(v.samm_c("LengthConstraint")))
            .fact(length, v.samm_c("maxValue"), Term::literal("8"))
            .fact(range.clone(), RDF_TYPE.to_string(), Term::iri(v.samm_c("RangeConstraint")))
            .fact(range, v.samm_c("minValue"), Term::literal("0"))
            .typed("C", v.samm("Characteristic"))
            .fact(iri("C"), v.samm("dataType"), Term::iri(XSD_INT));
        m.store
    }

    fn anonymous_urns(store: &MemoryStore) -> BTreeMap<ElementTag, String> {
        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "T.ttl", store);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        cache
            .graph(CacheScope::Cached)
            .iter()
            .filter(|(_, el)| el.anonymous)
            .map(|(_, el)| (el.tag(), el.urn.clone()))
            .collect()
    }

    #[test]
    fn anonymous_names_ignore_blank_labels() {
        let first = anonymous_urns(&trait_with_blank_constraints("a", "b"));
        let swapped = anonymous_urns(&trait_with_blank_constraints("b", "a"));
        assert_eq!(first.len(), 2);
        assert_eq!(first, swapped);
        assert_eq!(
            first.get(&ElementTag::Constraint(ConstraintTag::Length)),
            Some(&format!("{NS}TConstraint"))
        );
        assert_eq!(
            first.get(&ElementTag::Constraint(ConstraintTag::Range)),
            Some(&format!("{NS}TConstraint2"))
        );
    }

    #[test]
    fn entity_value_assigns_property_values() {
        let v = vocab();
        let mut m = Model::new();
        let (entity, property) = (v.samm("Entity"), v.samm("Property"));
        let props = m.list("l", vec![iri("speed")]);
        m.typed("Vehicle", entity)
            .fact(iri("Vehicle"), v.samm("properties"), props)
            .typed("speed", property)
            .typed("myCar", format!("{NS}Vehicle"))
            .fact(iri("myCar"), format!("{NS}speed"), Term::literal("120"));

        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "V.ttl", &m.store);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

        let (vehicle, _) = element(&cache, &format!("{NS}Vehicle"));
        let (speed, _) = element(&cache, &format!("{NS}speed"));
        let (_, my_car) = element(&cache, &format!("{NS}myCar"));
        let ElementKind::EntityValue(value) = &my_car.kind else {
            panic!("not an entity value");
        };
        assert_eq!(value.entity, Some(vehicle));
        assert_eq!(
            value.assignments,
            vec![(speed, Value::Literal(Literal::plain("120")))]
        );
    }

    #[test]
    fn malformed_list_is_reported_and_truncated() {
        let v = vocab();
        let mut m = Model::new();
        let (aspect, property) = (v.samm("Aspect"), v.samm("Property"));
        m.typed("A", aspect)
            .fact(iri("A"), v.samm("properties"), Term::blank("head"))
            .fact(Term::blank("head"), RDF_FIRST.to_string(), iri("p"))
            .typed("p", property);

        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "A.ttl", &m.store);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::MalformedList {
                node: "head".to_string()
            }]
        );
        let (_, a) = element(&cache, &format!("{NS}A"));
        let ElementKind::Aspect(aspect) = &a.kind else {
            panic!("not an aspect");
        };
        assert_eq!(aspect.properties.len(), 1);
    }

    #[test]
    fn inheritance_cycle_is_reported() {
        let v = vocab();
        let mut m = Model::new();
        let abstract_entity = v.samm("AbstractEntity");
        m.typed("A", abstract_entity.clone())
            .fact(iri("A"), v.samm("extends"), iri("B"))
            .typed("B", abstract_entity)
            .fact(iri("B"), v.samm("extends"), iri("A"));

        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "A.ttl", &m.store);
        assert!(report.has_errors());
        assert!(
            report
                .diagnostics
                .iter()
                .any(|d| matches!(d, Diagnostic::InheritanceCycle { .. }))
        );
    }

    #[test]
    fn unknown_type_falls_back_to_expected_kind() {
        let v = vocab();
        let mut m = Model::new();
        let property = v.samm("Property");
        m.typed("p", property)
            .fact(iri("p"), v.samm("characteristic"), iri("X"))
            .typed("X", format!("{NS}Nonsense"));

        let mut cache = NamespaceCache::new();
        let report = load(&mut cache, "P.ttl", &m.store);
        assert!(
            report
                .diagnostics
                .iter()
                .all(|d| matches!(d, Diagnostic::UnknownType { .. }))
        );
        assert!(report.has_errors());
        let (_, x) = element(&cache, &format!("{NS}X"));
        assert!(x.tag().is_characteristic());
    }

    #[test]
    fn instantiate_single_subject() {
        let v = vocab();
        let mut m = Model::new();
        let entity = v.samm("Entity");
        m.typed("E", entity.clone()).typed("Unrelated", entity);

        let mut cache = NamespaceCache::new();
        cache.open_file(FileKey::new(Namespace::new("org.acme", "1.0.0"), "E.ttl"));
        let config = ModelConfig::default();
        let (id, report) = Instantiator::new(&m.store, &mut cache, &config, CacheScope::Cached)
            .expect("instantiator")
            .instantiate(&iri("E"))
            .expect("load");
        assert!(id.is_some());
        assert_eq!(report.elements, 1);
        assert!(cache.get(CacheScope::Cached, &format!("{NS}Unrelated")).is_none());
    }

    #[test]
    fn needs_current_file() {
        let store = MemoryStore::new();
        let mut cache = NamespaceCache::new();
        let config = ModelConfig::default();
        assert!(matches!(
            Instantiator::new(&store, &mut cache, &config, CacheScope::Cached),
            Err(AspectError::NoActiveFile)
        ));
    }
}
