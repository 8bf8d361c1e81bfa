//! # Mutation Engine
//!
//! Structural edits of a built model graph.
//!
//! Every variant has an `update` and a `delete` handler, selected by an
//! exhaustive match; variants without structure get no-op handlers. Each
//! edit resynchronizes backlinks of the edited element before returning.
//!
//! Elements flagged external or predefined are immutable unless the request
//! originates from the namespace that defines them.

use crate::element::{
    CharacteristicClass, ElementKind, ElementTag, PropertyUse, SemanticElement, StructuredElement,
    Value, strip_value, strip_values,
};
use crate::graph::ModelGraph;
use crate::{ElementRef, Namespace};
use tracing::debug;

/// Outcome of a mutation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// The element changed.
    Applied,
    /// Nothing to do: no matching slot or reference.
    NoOp,
    /// Refused: the element is external or predefined for this origin.
    Immutable,
}

/// The namespace a mutation request comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    prefix: String,
}

impl Origin {
    /// Origin for edits made in the files of `namespace`.
    #[must_use]
    pub fn new(namespace: &Namespace, scheme: &str) -> Self {
        Self {
            prefix: namespace.iri_prefix(scheme),
        }
    }

    /// Whether `element` may be edited from this origin.
    #[must_use]
    pub fn may_edit(&self, element: &SemanticElement) -> bool {
        !(element.external || element.predefined) || element.urn.starts_with(&self.prefix)
    }
}

/// Result of [`MutationEngine::remove_element`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// Parents the reference was deleted from.
    pub detached_from: Vec<ElementRef>,
    /// Parents that refused the edit.
    pub refused_by: Vec<ElementRef>,
    /// The element left the arena.
    pub removed: bool,
}

/// Structural update/delete handlers.
pub struct MutationEngine;

impl MutationEngine {
    /// Point the slot of `element` that accepts the kind of `new_ref` at it.
    ///
    /// List slots append (once); singular slots are overwritten. A kind the
    /// element has no slot for is a no-op.
    pub fn update(
        graph: &mut ModelGraph,
        element: ElementRef,
        new_ref: ElementRef,
        origin: &Origin,
    ) -> Mutation {
        let Some(new_tag) = graph.tag(new_ref) else {
            return Mutation::NoOp;
        };
        let Some(el) = graph.get(element) else {
            return Mutation::NoOp;
        };
        if !origin.may_edit(el) {
            debug!(urn = %el.urn, "update refused on immutable element");
            return Mutation::Immutable;
        }

        // A property reaches scalars through its characteristic.
        if new_tag == ElementTag::Scalar
            && let ElementKind::Property(p) = &el.kind
        {
            let characteristic = p.characteristic;
            return match characteristic {
                Some(c) => Self::update(graph, c, new_ref, origin),
                None => Mutation::NoOp,
            };
        }

        let Some(el) = graph.get_mut(element) else {
            return Mutation::NoOp;
        };
        let changed = Self::update_kind(&mut el.kind, element, new_ref, new_tag);
        Self::finish(graph, element, changed)
    }

    /// Remove every structural reference to `target` from `element`.
    pub fn delete(
        graph: &mut ModelGraph,
        element: ElementRef,
        target: ElementRef,
        origin: &Origin,
    ) -> Mutation {
        let Some(el) = graph.get_mut(element) else {
            return Mutation::NoOp;
        };
        if !origin.may_edit(el) {
            debug!(urn = %el.urn, "delete refused on immutable element");
            return Mutation::Immutable;
        }
        let changed = Self::delete_kind(&mut el.kind, target);
        Self::finish(graph, element, changed)
    }

    /// Delete `target` from every parent, then drop it if nothing still
    /// references it.
    pub fn remove_element(graph: &mut ModelGraph, target: ElementRef, origin: &Origin) -> Removal {
        let mut removal = Removal::default();
        let parents = graph
            .get(target)
            .map(|el| el.parents.clone())
            .unwrap_or_default();
        for parent in parents.into_iter().filter(|p| *p != target) {
            match Self::delete(graph, parent, target, origin) {
                Mutation::Applied => removal.detached_from.push(parent),
                Mutation::Immutable => removal.refused_by.push(parent),
                Mutation::NoOp => {}
            }
        }
        // A self reference would otherwise keep the element alive.
        if graph.get(target).is_some_and(|el| el.references(target)) {
            Self::delete(graph, target, target, origin);
        }
        removal.removed = graph.remove_detached(target).is_some();
        removal
    }

    fn finish(graph: &mut ModelGraph, element: ElementRef, changed: bool) -> Mutation {
        if !changed {
            return Mutation::NoOp;
        }
        graph.sync_links(element);
        Mutation::Applied
    }

    // =========================================================================
    // UPDATE TABLE
    // =========================================================================

    fn update_kind(
        kind: &mut ElementKind,
        element: ElementRef,
        new_ref: ElementRef,
        new_tag: ElementTag,
    ) -> bool {
        fn set(slot: &mut Option<ElementRef>, value: ElementRef) -> bool {
            let changed = *slot != Some(value);
            *slot = Some(value);
            changed
        }
        fn push(list: &mut Vec<ElementRef>, value: ElementRef) -> bool {
            if list.contains(&value) {
                return false;
            }
            list.push(value);
            true
        }
        fn push_use(list: &mut Vec<PropertyUse>, value: ElementRef) -> bool {
            if list.iter().any(|u| u.property == value) {
                return false;
            }
            list.push(PropertyUse::plain(value));
            true
        }
        let is_characteristic = new_tag.is_characteristic();

        match kind {
            ElementKind::Aspect(a) => match new_tag {
                ElementTag::Property => push_use(&mut a.properties, new_ref),
                ElementTag::Operation => push(&mut a.operations, new_ref),
                ElementTag::Event => push(&mut a.events, new_ref),
                _ => false,
            },
            ElementKind::Property(p) => match new_tag {
                _ if is_characteristic => set(&mut p.characteristic, new_ref),
                ElementTag::AbstractProperty if new_ref != element => {
                    set(&mut p.extends, new_ref)
                }
                ElementTag::EntityValue => {
                    let value = Some(Value::Element(new_ref));
                    let changed = p.example_value != value;
                    p.example_value = value;
                    changed
                }
                _ => false,
            },
            ElementKind::Characteristic(c) => {
                if new_tag.is_type() {
                    return set(&mut c.data_type, new_ref);
                }
                match &mut c.class {
                    CharacteristicClass::Trait { base, constraints } => match new_tag {
                        _ if is_characteristic && new_ref != element => set(base, new_ref),
                        ElementTag::Constraint(_) => push(constraints, new_ref),
                        _ => false,
                    },
                    CharacteristicClass::Collection {
                        element_characteristic,
                        ..
                    } if is_characteristic => set(element_characteristic, new_ref),
                    CharacteristicClass::Either { left, right } if is_characteristic => {
                        if left.is_none() {
                            set(left, new_ref)
                        } else if *left != Some(new_ref) {
                            set(right, new_ref)
                        } else {
                            false
                        }
                    }
                    CharacteristicClass::Enumeration { values }
                    | CharacteristicClass::State { values, .. }
                        if new_tag == ElementTag::EntityValue =>
                    {
                        if values.contains(&Value::Element(new_ref)) {
                            false
                        } else {
                            values.push(Value::Element(new_ref));
                            true
                        }
                    }
                    CharacteristicClass::StructuredValue { elements, .. }
                        if new_tag == ElementTag::Property =>
                    {
                        elements.push(StructuredElement::Property(new_ref));
                        true
                    }
                    CharacteristicClass::Quantifiable { unit, .. } if new_tag == ElementTag::Unit => {
                        set(unit, new_ref)
                    }
                    CharacteristicClass::Plain
                    | CharacteristicClass::Code
                    | CharacteristicClass::SingleEntity
                    | CharacteristicClass::Collection { .. }
                    | CharacteristicClass::Either { .. }
                    | CharacteristicClass::Enumeration { .. }
                    | CharacteristicClass::State { .. }
                    | CharacteristicClass::StructuredValue { .. }
                    | CharacteristicClass::Quantifiable { .. } => false,
                }
            }
            ElementKind::Entity(e) => match new_tag {
                ElementTag::Property => push_use(&mut e.properties, new_ref),
                ElementTag::Entity | ElementTag::AbstractEntity if new_ref != element => {
                    set(&mut e.extends, new_ref)
                }
                _ => false,
            },
            ElementKind::EntityValue(v) => match new_tag {
                ElementTag::Entity => set(&mut v.entity, new_ref),
                _ => false,
            },
            ElementKind::Unit(u) => match new_tag {
                ElementTag::Unit if new_ref != element => set(&mut u.reference_unit, new_ref),
                ElementTag::QuantityKind => push(&mut u.quantity_kinds, new_ref),
                _ => false,
            },
            ElementKind::Operation(o) => match new_tag {
                ElementTag::Property => push(&mut o.input, new_ref),
                _ => false,
            },
            ElementKind::Event(e) => match new_tag {
                ElementTag::Property => push(&mut e.parameters, new_ref),
                _ => false,
            },
            ElementKind::Constraint(_) | ElementKind::QuantityKind | ElementKind::Scalar => false,
        }
    }

    // =========================================================================
    // DELETE TABLE
    // =========================================================================

    fn delete_kind(kind: &mut ElementKind, target: ElementRef) -> bool {
        fn clear(slot: &mut Option<ElementRef>, target: ElementRef) -> bool {
            if *slot == Some(target) {
                *slot = None;
                return true;
            }
            false
        }
        fn filter(list: &mut Vec<ElementRef>, target: ElementRef) -> bool {
            let before = list.len();
            list.retain(|r| *r != target);
            list.len() != before
        }
        fn filter_uses(list: &mut Vec<PropertyUse>, target: ElementRef) -> bool {
            let before = list.len();
            list.retain(|u| u.property != target);
            list.len() != before
        }

        match kind {
            ElementKind::Aspect(a) => {
                let mut changed = filter_uses(&mut a.properties, target);
                changed |= filter(&mut a.operations, target);
                changed |= filter(&mut a.events, target);
                changed
            }
            ElementKind::Property(p) => {
                let mut changed = clear(&mut p.characteristic, target);
                changed |= clear(&mut p.extends, target);
                changed |= strip_value(&mut p.example_value, target);
                changed
            }
            ElementKind::Characteristic(c) => {
                let mut changed = clear(&mut c.data_type, target);
                changed |= match &mut c.class {
                    CharacteristicClass::Plain
                    | CharacteristicClass::Code
                    | CharacteristicClass::SingleEntity => false,
                    CharacteristicClass::Trait { base, constraints } => {
                        clear(base, target) | filter(constraints, target)
                    }
                    CharacteristicClass::Collection {
                        element_characteristic,
                        ..
                    } => clear(element_characteristic, target),
                    CharacteristicClass::Either { left, right } => {
                        clear(left, target) | clear(right, target)
                    }
                    CharacteristicClass::Enumeration { values } => strip_values(values, target),
                    CharacteristicClass::State {
                        values,
                        default_value,
                    } => strip_values(values, target) | strip_value(default_value, target),
                    CharacteristicClass::StructuredValue { elements, .. } => {
                        let before = elements.len();
                        elements.retain(|e| *e != StructuredElement::Property(target));
                        elements.len() != before
                    }
                    CharacteristicClass::Quantifiable { unit, .. } => clear(unit, target),
                };
                changed
            }
            ElementKind::Entity(e) => {
                filter_uses(&mut e.properties, target) | clear(&mut e.extends, target)
            }
            ElementKind::EntityValue(v) => {
                let mut changed = clear(&mut v.entity, target);
                let before = v.assignments.len();
                v.assignments.retain_mut(|(property, value)| {
                    if *property == target {
                        return false;
                    }
                    let mut slot = Some(value.clone());
                    if strip_value(&mut slot, target) {
                        changed = true;
                        match slot {
                            Some(stripped) => *value = stripped,
                            None => return false,
                        }
                    }
                    true
                });
                changed || v.assignments.len() != before
            }
            ElementKind::Unit(u) => {
                clear(&mut u.reference_unit, target) | filter(&mut u.quantity_kinds, target)
            }
            ElementKind::Operation(o) => filter(&mut o.input, target) | clear(&mut o.output, target),
            ElementKind::Event(e) => filter(&mut e.parameters, target),
            ElementKind::Constraint(_) | ElementKind::QuantityKind | ElementKind::Scalar => false,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::element::{Characteristic, CharacteristicTag, ConstraintTag, Entity, Property};

    const NS: &str = "urn:samm:org.acme:1.0.0#";

    fn origin() -> Origin {
        Origin::new(&Namespace::new("org.acme", "1.0.0"), "urn:samm")
    }

    fn add(graph: &mut ModelGraph, name: &str, tag: ElementTag) -> ElementRef {
        graph.insert(SemanticElement::new(
            format!("{NS}{name}"),
            name,
            ElementKind::empty(tag),
        ))
    }

    fn trait_fields(graph: &ModelGraph, id: ElementRef) -> (Option<ElementRef>, Vec<ElementRef>) {
        match &graph.get(id).expect("trait").kind {
            ElementKind::Characteristic(Characteristic {
                class: CharacteristicClass::Trait { base, constraints },
                ..
            }) => (*base, constraints.clone()),
            other => panic!("not a trait: {other:?}"),
        }
    }

    #[test]
    fn update_selects_slot_by_kind() {
        let mut graph = ModelGraph::new();
        let t = add(&mut graph, "T", ElementTag::Characteristic(CharacteristicTag::Trait));
        let c = add(&mut graph, "C", ElementTag::Characteristic(CharacteristicTag::Characteristic));
        let k = add(&mut graph, "K", ElementTag::Constraint(ConstraintTag::Range));
        let s = add(&mut graph, "S", ElementTag::Scalar);
        let a = add(&mut graph, "A", ElementTag::Aspect);

        assert_eq!(MutationEngine::update(&mut graph, t, c, &origin()), Mutation::Applied);
        assert_eq!(MutationEngine::update(&mut graph, t, k, &origin()), Mutation::Applied);
        assert_eq!(MutationEngine::update(&mut graph, t, k, &origin()), Mutation::NoOp);
        assert_eq!(MutationEngine::update(&mut graph, t, a, &origin()), Mutation::NoOp);
        assert_eq!(trait_fields(&graph, t), (Some(c), vec![k]));

        assert_eq!(MutationEngine::update(&mut graph, t, s, &origin()), Mutation::Applied);
        assert!(graph.get(s).expect("s").parents.contains(&t));
        assert!(graph.backlink_violations().is_empty());
    }

    #[test]
    fn property_scalar_update_goes_through_characteristic() {
        let mut graph = ModelGraph::new();
        let p = add(&mut graph, "p", ElementTag::Property);
        let c = add(&mut graph, "C", ElementTag::Characteristic(CharacteristicTag::Characteristic));
        let s = add(&mut graph, "S", ElementTag::Scalar);
        MutationEngine::update(&mut graph, p, c, &origin());
        assert_eq!(MutationEngine::update(&mut graph, p, s, &origin()), Mutation::Applied);
        let ElementKind::Characteristic(ch) = &graph.get(c).expect("c").kind else {
            return;
        };
        assert_eq!(ch.data_type, Some(s));
    }

    #[test]
    fn delete_cascade_on_trait() {
        let mut graph = ModelGraph::new();
        let t = add(&mut graph, "T", ElementTag::Characteristic(CharacteristicTag::Trait));
        let c = add(&mut graph, "C", ElementTag::Characteristic(CharacteristicTag::Characteristic));
        let k1 = add(&mut graph, "K1", ElementTag::Constraint(ConstraintTag::Length));
        let k2 = add(&mut graph, "K2", ElementTag::Constraint(ConstraintTag::Range));
        let k3 = add(&mut graph, "K3", ElementTag::Constraint(ConstraintTag::Range));
        for r in [c, k1, k2] {
            MutationEngine::update(&mut graph, t, r, &origin());
        }

        assert_eq!(MutationEngine::delete(&mut graph, t, c, &origin()), Mutation::Applied);
        assert_eq!(trait_fields(&graph, t), (None, vec![k1, k2]));
        assert_eq!(MutationEngine::delete(&mut graph, t, k1, &origin()), Mutation::Applied);
        assert_eq!(trait_fields(&graph, t), (None, vec![k2]));
        assert_eq!(MutationEngine::delete(&mut graph, t, k3, &origin()), Mutation::NoOp);
        assert!(graph.get(c).expect("c").parents.is_empty());
        assert!(graph.get(k1).expect("k1").parents.is_empty());
        assert!(graph.backlink_violations().is_empty());
    }

    #[test]
    fn immutable_elements_are_left_alone() {
        let mut graph = ModelGraph::new();
        let mut external = SemanticElement::new(
            "urn:samm:org.other:1.0.0#Shared",
            "Shared",
            ElementKind::Entity(Entity::default()),
        );
        external.external = true;
        let e = graph.insert(external);
        let p = add(&mut graph, "p", ElementTag::Property);
        let before = graph.get(e).expect("e").clone();

        assert_eq!(MutationEngine::update(&mut graph, e, p, &origin()), Mutation::Immutable);
        assert_eq!(MutationEngine::delete(&mut graph, e, p, &origin()), Mutation::Immutable);
        assert_eq!(graph.get(e).expect("e"), &before);

        let owner = Origin::new(&Namespace::new("org.other", "1.0.0"), "urn:samm");
        assert_eq!(MutationEngine::update(&mut graph, e, p, &owner), Mutation::Applied);
    }

    #[test]
    fn remove_element_detaches_from_all_parents() {
        let mut graph = ModelGraph::new();
        let e = add(&mut graph, "E", ElementTag::Entity);
        let f = add(&mut graph, "F", ElementTag::Entity);
        let p = add(&mut graph, "p", ElementTag::Property);
        MutationEngine::update(&mut graph, e, p, &origin());
        MutationEngine::update(&mut graph, f, p, &origin());

        let removal = MutationEngine::remove_element(&mut graph, p, &origin());
        assert!(removal.removed);
        assert_eq!(removal.detached_from, vec![e, f]);
        assert!(!graph.contains(p));
        let ElementKind::Entity(entity) = &graph.get(e).expect("e").kind else {
            return;
        };
        assert!(entity.properties.is_empty());
        assert!(graph.backlink_violations().is_empty());
    }

    #[test]
    fn remove_element_keeps_element_with_immutable_parent() {
        let mut graph = ModelGraph::new();
        let p = add(&mut graph, "p", ElementTag::Property);
        let mut shared = SemanticElement::new(
            "urn:samm:org.other:1.0.0#Shared",
            "Shared",
            ElementKind::Entity(Entity {
                properties: vec![PropertyUse::plain(p)],
                ..Entity::default()
            }),
        );
        shared.external = true;
        let s = graph.insert(shared);

        let removal = MutationEngine::remove_element(&mut graph, p, &origin());
        assert!(!removal.removed);
        assert_eq!(removal.refused_by, vec![s]);
        assert!(graph.contains(p));
    }

    #[test]
    fn element_inside_reference_cycle_is_removable() {
        let mut graph = ModelGraph::new();
        let c = add(&mut graph, "C", ElementTag::Characteristic(CharacteristicTag::Characteristic));
        let e = add(&mut graph, "E", ElementTag::Entity);
        MutationEngine::update(&mut graph, c, e, &origin());
        let property = graph.insert(SemanticElement::new(
            format!("{NS}q"),
            "q",
            ElementKind::Property(Property {
                characteristic: Some(c),
                ..Property::default()
            }),
        ));
        MutationEngine::update(&mut graph, e, property, &origin());

        let removal = MutationEngine::remove_element(&mut graph, e, &origin());
        assert!(removal.removed);
        assert!(graph.backlink_violations().is_empty());
    }
}
