//! Type-specific builders.
//!
//! `populate` dispatches on the shell's tag with an exhaustive match; each
//! builder reads the subject's statements and resolves references through
//! the pipeline, which registers shells instead of recursing.

use super::{Deferred, Instantiator};
use crate::element::{
    Aspect, BoundKind, Characteristic, CharacteristicClass, CharacteristicTag, Constraint,
    ConstraintTag, ElementKind, ElementTag, Entity, EntityValue, Event, Operation, Property,
    PropertyUse, StructuredElement, Unit, Value,
};
use crate::primitives::{FIXED_POINT_TYPE, LENGTH_BOUND_TYPE, RANGE_BOUND_TYPE, RDF_TYPE};
use crate::resolver::{ListItem, PropertyModifiers, Resolver};
use crate::source::StatementSource;
use crate::types::fragment;
use crate::{AspectError, ElementRef, Literal, Term};
use std::collections::BTreeMap;
use tracing::debug;

/// Objects of one subject, grouped by predicate.
struct Facts {
    by_predicate: BTreeMap<String, Vec<Term>>,
}

impl Facts {
    fn first(&self, predicate: &str) -> Option<&Term> {
        self.by_predicate.get(predicate).and_then(|v| v.first())
    }

    fn all(&self, predicate: &str) -> &[Term] {
        self.by_predicate
            .get(predicate)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn text(&self, predicate: &str) -> Option<String> {
        self.first(predicate).map(|t| t.lexical().to_string())
    }

    fn literal(&self, predicate: &str) -> Option<Literal> {
        self.first(predicate).and_then(Term::as_literal).cloned()
    }
}

fn with_default_type(literal: Option<Literal>, datatype: &str) -> Option<Literal> {
    literal.map(|mut l| {
        if l.datatype.is_none() && l.language.is_none() {
            l.datatype = Some(datatype.to_string());
        }
        l
    })
}

impl<S: StatementSource + ?Sized> Instantiator<'_, S> {
    /// Fill the shell `id` from the statements of `subject`.
    pub(super) fn populate(&mut self, id: ElementRef, subject: &Term) -> Result<(), AspectError> {
        let Some(tag) = self.cache.graph(self.scope).tag(id) else {
            return Ok(());
        };
        let facts = self.facts(subject)?;
        self.describe(id, &facts);
        debug!(subject = %subject, ?tag, "building element");

        let kind = match tag {
            ElementTag::Aspect => ElementKind::Aspect(self.build_aspect(id, &facts)?),
            ElementTag::Property | ElementTag::AbstractProperty => ElementKind::Property(
                self.build_property(id, &facts, tag == ElementTag::AbstractProperty)?,
            ),
            ElementTag::Characteristic(c) => {
                ElementKind::Characteristic(self.build_characteristic(id, c, &facts)?)
            }
            ElementTag::Entity | ElementTag::AbstractEntity => ElementKind::Entity(
                self.build_entity(id, &facts, tag == ElementTag::AbstractEntity)?,
            ),
            ElementTag::EntityValue => {
                ElementKind::EntityValue(self.build_entity_value(id, subject, &facts)?)
            }
            ElementTag::Constraint(c) => ElementKind::Constraint(self.build_constraint(c, &facts)),
            ElementTag::Unit => ElementKind::Unit(self.build_unit(id, &facts)?),
            ElementTag::QuantityKind => ElementKind::QuantityKind,
            ElementTag::Operation => ElementKind::Operation(self.build_operation(id, &facts)?),
            ElementTag::Event => ElementKind::Event(self.build_event(id, &facts)?),
            ElementTag::Scalar => ElementKind::Scalar,
        };
        self.cache.graph_mut(self.scope).set_kind(id, kind);
        Ok(())
    }

    /// Type untyped range bounds from the owning trait's base data type.
    pub(super) fn apply_range_bounds(&mut self, constraint: ElementRef, owner: ElementRef) {
        let graph = self.cache.graph(self.scope);
        let base = match graph.get(owner).map(|el| &el.kind) {
            Some(ElementKind::Characteristic(Characteristic {
                class: CharacteristicClass::Trait { base, .. },
                ..
            })) => *base,
            _ => None,
        };
        let bound_type = base
            .and_then(|b| match graph.get(b).map(|el| &el.kind) {
                Some(ElementKind::Characteristic(c)) => c.data_type,
                _ => None,
            })
            .and_then(|dt| graph.get(dt))
            .filter(|el| el.tag() == ElementTag::Scalar)
            .map_or_else(|| RANGE_BOUND_TYPE.to_string(), |el| el.urn.clone());

        if let Some(el) = self.cache.graph_mut(self.scope).get_mut(constraint)
            && let ElementKind::Constraint(Constraint::Range { min, max, .. }) = &mut el.kind
        {
            for bound in [min, max].into_iter().flatten() {
                if bound.datatype.is_none() && bound.language.is_none() {
                    bound.datatype = Some(bound_type.clone());
                }
            }
        }
    }

    fn facts(&self, subject: &Term) -> Result<Facts, AspectError> {
        let resolver = Resolver::new(self.source, &self.vocab, self.config.max_list_length);
        let mut by_predicate: BTreeMap<String, Vec<Term>> = BTreeMap::new();
        for statement in resolver.ordered_statements(subject)? {
            by_predicate
                .entry(statement.predicate)
                .or_default()
                .push(statement.object);
        }
        Ok(Facts { by_predicate })
    }

    /// Shared attributes: names, descriptions, see-also.
    fn describe(&mut self, id: ElementRef, facts: &Facts) {
        let localized = |terms: &[Term]| -> BTreeMap<String, String> {
            terms
                .iter()
                .filter_map(Term::as_literal)
                .map(|l| (l.language.clone().unwrap_or_default(), l.lexical.clone()))
                .collect()
        };
        let preferred_names = localized(facts.all(&self.vocab.samm("preferredName")));
        let descriptions = localized(facts.all(&self.vocab.samm("description")));
        let see: Vec<String> = facts
            .all(&self.vocab.samm("see"))
            .iter()
            .map(|t| t.lexical().to_string())
            .collect();
        if let Some(el) = self.cache.graph_mut(self.scope).get_mut(id) {
            el.preferred_names = preferred_names;
            el.descriptions = descriptions;
            el.see = see;
        }
    }

    // =========================================================================
    // REFERENCE HELPERS
    // =========================================================================

    fn reference(
        &mut self,
        term: Option<&Term>,
        expected: ElementTag,
        owner: ElementRef,
    ) -> Result<Option<ElementRef>, AspectError> {
        match term {
            Some(term) => self.resolve(term, Some(expected), Some(owner)),
            None => Ok(None),
        }
    }

    fn references(
        &mut self,
        terms: &[Term],
        expected: ElementTag,
        owner: ElementRef,
    ) -> Result<Vec<ElementRef>, AspectError> {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            out.extend(self.resolve(term, Some(expected), Some(owner))?);
        }
        Ok(out)
    }

    fn reference_list(
        &mut self,
        head: Option<&Term>,
        expected: ElementTag,
        owner: ElementRef,
    ) -> Result<Vec<ElementRef>, AspectError> {
        let Some(head) = head else {
            return Ok(Vec::new());
        };
        let items: Vec<Term> = self
            .list(head)?
            .items
            .iter()
            .map(|item| item.term().clone())
            .collect();
        self.references(&items, expected, owner)
    }

    fn value(&mut self, term: &Term, owner: ElementRef) -> Result<Option<Value>, AspectError> {
        if let Term::Literal(literal) = term {
            return Ok(Some(Value::Literal(literal.clone())));
        }
        let is_list = Resolver::new(self.source, &self.vocab, self.config.max_list_length)
            .is_list(term)?;
        if is_list {
            let items: Vec<Term> = self.list(term)?.items.iter().map(|i| i.term().clone()).collect();
            return Ok(Some(Value::List(self.values(&items, owner)?)));
        }
        Ok(self
            .resolve(term, Some(ElementTag::EntityValue), Some(owner))?
            .map(Value::Element))
    }

    fn values(&mut self, terms: &[Term], owner: ElementRef) -> Result<Vec<Value>, AspectError> {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            out.extend(self.value(term, owner)?);
        }
        Ok(out)
    }

    fn value_list(
        &mut self,
        head: Option<&Term>,
        owner: ElementRef,
    ) -> Result<Vec<Value>, AspectError> {
        let Some(head) = head else {
            return Ok(Vec::new());
        };
        let items: Vec<Term> = self.list(head)?.items.iter().map(|i| i.term().clone()).collect();
        self.values(&items, owner)
    }

    /// Property uses of an aspect or entity list, records included.
    fn property_uses(
        &mut self,
        head: Option<&Term>,
        owner: ElementRef,
    ) -> Result<Vec<PropertyUse>, AspectError> {
        let Some(head) = head else {
            return Ok(Vec::new());
        };
        let mut uses = Vec::new();
        for item in self.list(head)?.items {
            match item {
                ListItem::Node(term) => {
                    if let Some(p) = self.resolve(&term, Some(ElementTag::Property), Some(owner))? {
                        uses.push(PropertyUse::plain(p));
                    }
                }
                ListItem::Modified(modifiers) => {
                    let property = match (&modifiers.property, &modifiers.extends) {
                        (Some(p), _) => {
                            self.resolve(p, Some(ElementTag::Property), Some(owner))?
                        }
                        (None, Some(extends)) => self.anonymous_property(&modifiers, extends)?,
                        (None, None) => None,
                    };
                    if let Some(property) = property {
                        uses.push(PropertyUse {
                            property,
                            optional: modifiers.optional,
                            not_in_payload: modifiers.not_in_payload,
                            payload_name: modifiers.payload_name,
                        });
                    }
                }
            }
        }
        Ok(uses)
    }

    /// Anonymous property refining an abstract one, declared inline in a
    /// property list.
    fn anonymous_property(
        &mut self,
        modifiers: &PropertyModifiers,
        extends: &Term,
    ) -> Result<Option<ElementRef>, AspectError> {
        let label = modifiers.node.lexical().to_string();
        if let Some(id) = self.blanks.get(&label) {
            return Ok(Some(*id));
        }
        let Some(abstract_property) = self.resolve(extends, Some(ElementTag::AbstractProperty), None)?
        else {
            return Ok(None);
        };
        let base = self
            .cache
            .element(self.scope, abstract_property)
            .map_or_else(|| fragment(extends.lexical()).to_string(), |el| el.name.clone());
        let shell = self.anonymous_shell(None, ElementTag::Property, Some(&base));
        let id = self.cache.register_anonymous(self.scope, shell)?;
        self.blanks.insert(label, id);
        let characteristic = self.reference(
            modifiers.characteristic.as_ref(),
            ElementTag::Characteristic(CharacteristicTag::Characteristic),
            id,
        )?;
        self.cache.graph_mut(self.scope).set_kind(
            id,
            ElementKind::Property(Property {
                is_abstract: false,
                characteristic,
                extends: Some(abstract_property),
                example_value: None,
            }),
        );
        debug!(%id, base, "anonymous property use");
        Ok(Some(id))
    }

    // =========================================================================
    // BUILDERS
    // =========================================================================

    fn build_aspect(&mut self, id: ElementRef, facts: &Facts) -> Result<Aspect, AspectError> {
        Ok(Aspect {
            properties: self.property_uses(facts.first(&self.vocab.samm("properties")), id)?,
            operations: self.reference_list(
                facts.first(&self.vocab.samm("operations")),
                ElementTag::Operation,
                id,
            )?,
            events: self.reference_list(
                facts.first(&self.vocab.samm("events")),
                ElementTag::Event,
                id,
            )?,
        })
    }

    fn build_property(
        &mut self,
        id: ElementRef,
        facts: &Facts,
        is_abstract: bool,
    ) -> Result<Property, AspectError> {
        let characteristic = self.reference(
            facts.first(&self.vocab.samm("characteristic")),
            ElementTag::Characteristic(CharacteristicTag::Characteristic),
            id,
        )?;
        let extends = self.reference(
            facts.first(&self.vocab.samm("extends")),
            ElementTag::AbstractProperty,
            id,
        )?;
        let example_value = match facts.first(&self.vocab.samm("exampleValue")) {
            Some(term) => self.value(term, id)?,
            None => None,
        };
        Ok(Property {
            is_abstract,
            characteristic,
            extends,
            example_value,
        })
    }

    fn build_characteristic(
        &mut self,
        id: ElementRef,
        tag: CharacteristicTag,
        facts: &Facts,
    ) -> Result<Characteristic, AspectError> {
        let characteristic = ElementTag::Characteristic(CharacteristicTag::Characteristic);
        let data_type = match facts.first(&self.vocab.samm("dataType")) {
            Some(term) => {
                let expected = match term.as_iri() {
                    Some(iri) if self.vocab.is_scalar(iri) => ElementTag::Scalar,
                    _ => ElementTag::Entity,
                };
                self.resolve(term, Some(expected), Some(id))?
            }
            None => None,
        };

        let mut class = CharacteristicClass::empty(tag);
        match &mut class {
            CharacteristicClass::Plain
            | CharacteristicClass::Code
            | CharacteristicClass::SingleEntity => {}
            CharacteristicClass::Trait { base, constraints } => {
                *base = self.reference(
                    facts.first(&self.vocab.samm_c("baseCharacteristic")),
                    characteristic,
                    id,
                )?;
                *constraints = self.references(
                    facts.all(&self.vocab.samm_c("constraint")),
                    ElementTag::Constraint(ConstraintTag::Constraint),
                    id,
                )?;
                for constraint in constraints.iter() {
                    self.queue.push_back(Deferred::RangeBounds {
                        constraint: *constraint,
                        owner: id,
                    });
                }
            }
            CharacteristicClass::Collection {
                element_characteristic,
                ..
            } => {
                *element_characteristic = self.reference(
                    facts.first(&self.vocab.samm_c("elementCharacteristic")),
                    characteristic,
                    id,
                )?;
            }
            CharacteristicClass::Either { left, right } => {
                *left = self.reference(facts.first(&self.vocab.samm_c("left")), characteristic, id)?;
                *right =
                    self.reference(facts.first(&self.vocab.samm_c("right")), characteristic, id)?;
            }
            CharacteristicClass::Enumeration { values } => {
                *values = self.value_list(facts.first(&self.vocab.samm_c("values")), id)?;
            }
            CharacteristicClass::State {
                values,
                default_value,
            } => {
                *values = self.value_list(facts.first(&self.vocab.samm_c("values")), id)?;
                *default_value = match facts.first(&self.vocab.samm_c("defaultValue")) {
                    Some(term) => self.value(term, id)?,
                    None => None,
                };
            }
            CharacteristicClass::StructuredValue {
                deconstruction_rule,
                elements,
            } => {
                *deconstruction_rule = facts
                    .text(&self.vocab.samm_c("deconstructionRule"))
                    .unwrap_or_default();
                if let Some(head) = facts.first(&self.vocab.samm_c("elements")) {
                    for item in self.list(head)?.items {
                        match item.term() {
                            Term::Literal(l) => {
                                elements.push(StructuredElement::Literal(l.lexical.clone()));
                            }
                            term => {
                                let term = term.clone();
                                if let Some(p) =
                                    self.resolve(&term, Some(ElementTag::Property), Some(id))?
                                {
                                    elements.push(StructuredElement::Property(p));
                                }
                            }
                        }
                    }
                }
            }
            CharacteristicClass::Quantifiable { unit, .. } => {
                *unit = self.reference(facts.first(&self.vocab.samm_c("unit")), ElementTag::Unit, id)?;
            }
        }
        Ok(Characteristic { data_type, class })
    }

    fn build_entity(
        &mut self,
        id: ElementRef,
        facts: &Facts,
        is_abstract: bool,
    ) -> Result<Entity, AspectError> {
        Ok(Entity {
            is_abstract,
            properties: self.property_uses(facts.first(&self.vocab.samm("properties")), id)?,
            extends: self.reference(
                facts.first(&self.vocab.samm("extends")),
                ElementTag::AbstractEntity,
                id,
            )?,
        })
    }

    fn build_entity_value(
        &mut self,
        id: ElementRef,
        subject: &Term,
        facts: &Facts,
    ) -> Result<EntityValue, AspectError> {
        let mut entity = None;
        for ty in facts.all(RDF_TYPE) {
            if let Some(iri) = ty.as_iri()
                && self.is_entity_type(iri)?
            {
                entity = self.resolve_iri(iri, Some(ElementTag::Entity))?;
                break;
            }
        }

        // Group by predicate, keeping first-seen order.
        let mut grouped: Vec<(String, Vec<Term>)> = Vec::new();
        for (predicate, object) in self.nested_record(subject)? {
            match grouped.iter_mut().find(|(p, _)| *p == predicate) {
                Some((_, objects)) => objects.push(object),
                None => grouped.push((predicate, vec![object])),
            }
        }

        let mut assignments = Vec::with_capacity(grouped.len());
        for (predicate, objects) in grouped {
            let Some(property) = self.resolve_iri(&predicate, Some(ElementTag::Property))? else {
                continue;
            };
            let mut values = self.values(&objects, id)?;
            let value = if values.len() == 1 {
                values.pop()
            } else {
                Some(Value::List(values))
            };
            if let Some(value) = value {
                assignments.push((property, value));
            }
        }
        Ok(EntityValue {
            entity,
            assignments,
        })
    }

    fn build_constraint(&self, tag: ConstraintTag, facts: &Facts) -> Constraint {
        let mut constraint = Constraint::empty(tag);
        match &mut constraint {
            Constraint::Plain => {}
            Constraint::Length { min, max } => {
                *min = with_default_type(facts.literal(&self.vocab.samm_c("minValue")), LENGTH_BOUND_TYPE);
                *max = with_default_type(facts.literal(&self.vocab.samm_c("maxValue")), LENGTH_BOUND_TYPE);
            }
            Constraint::Range {
                min,
                max,
                lower_bound,
                upper_bound,
            } => {
                *min = facts.literal(&self.vocab.samm_c("minValue"));
                *max = facts.literal(&self.vocab.samm_c("maxValue"));
                let bound = |predicate: &str| {
                    facts
                        .first(predicate)
                        .and_then(Term::as_iri)
                        .and_then(|iri| self.vocab.bound_kind(iri))
                };
                *lower_bound = bound(&self.vocab.samm_c("lowerBoundDefinition")).unwrap_or(
                    if min.is_some() {
                        BoundKind::AtLeast
                    } else {
                        BoundKind::Open
                    },
                );
                *upper_bound = bound(&self.vocab.samm_c("upperBoundDefinition")).unwrap_or(
                    if max.is_some() {
                        BoundKind::AtMost
                    } else {
                        BoundKind::Open
                    },
                );
            }
            Constraint::Encoding { value } | Constraint::RegularExpression { value } => {
                *value = facts.text(&self.vocab.samm("value"));
            }
            Constraint::FixedPoint { scale, integer } => {
                *scale = with_default_type(facts.literal(&self.vocab.samm_c("scale")), FIXED_POINT_TYPE);
                *integer =
                    with_default_type(facts.literal(&self.vocab.samm_c("integer")), FIXED_POINT_TYPE);
            }
            Constraint::Language { language_code } => {
                *language_code = facts.text(&self.vocab.samm_c("languageCode"));
            }
            Constraint::Locale { locale_code } => {
                *locale_code = facts.text(&self.vocab.samm_c("localeCode"));
            }
        }
        constraint
    }

    fn build_unit(&mut self, id: ElementRef, facts: &Facts) -> Result<Unit, AspectError> {
        Ok(Unit {
            symbol: facts.text(&self.vocab.unit("symbol")),
            code: facts.text(&self.vocab.unit("code")),
            reference_unit: self.reference(
                facts.first(&self.vocab.unit("referenceUnit")),
                ElementTag::Unit,
                id,
            )?,
            conversion_factor: facts.text(&self.vocab.unit("conversionFactor")),
            quantity_kinds: self.references(
                facts.all(&self.vocab.unit("quantityKind")),
                ElementTag::QuantityKind,
                id,
            )?,
        })
    }

    fn build_operation(&mut self, id: ElementRef, facts: &Facts) -> Result<Operation, AspectError> {
        Ok(Operation {
            input: self.reference_list(
                facts.first(&self.vocab.samm("input")),
                ElementTag::Property,
                id,
            )?,
            output: self.reference(
                facts.first(&self.vocab.samm("output")),
                ElementTag::Property,
                id,
            )?,
        })
    }

    fn build_event(&mut self, id: ElementRef, facts: &Facts) -> Result<Event, AspectError> {
        Ok(Event {
            parameters: self.reference_list(
                facts.first(&self.vocab.samm("parameters")),
                ElementTag::Property,
                id,
            )?,
        })
    }
}

