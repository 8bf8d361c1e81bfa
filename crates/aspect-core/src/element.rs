//! # Semantic Elements
//!
//! The typed node of an aspect model graph. A `SemanticElement` carries the
//! attributes every element shares; the variant-specific structure lives in
//! the closed `ElementKind` enum so every dispatch over it is exhaustive.
//!
//! Structural references are `ElementRef` handles into the scope's
//! [`crate::graph::ModelGraph`], never owned sub-trees: cycles are ordinary.

use crate::{ElementRef, Literal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// TAGS
// =============================================================================

/// Declared kind of an element, as read from its type statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementTag {
    Aspect,
    Property,
    AbstractProperty,
    Characteristic(CharacteristicTag),
    Entity,
    AbstractEntity,
    EntityValue,
    Constraint(ConstraintTag),
    Unit,
    QuantityKind,
    Operation,
    Event,
    Scalar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CharacteristicTag {
    Characteristic,
    Code,
    SingleEntity,
    Trait,
    Collection,
    List,
    Set,
    SortedSet,
    TimeSeries,
    Either,
    Enumeration,
    State,
    StructuredValue,
    Quantifiable,
    Measurement,
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConstraintTag {
    Constraint,
    Length,
    Range,
    Encoding,
    RegularExpression,
    FixedPoint,
    Language,
    Locale,
}

impl ElementTag {
    /// Suffix appended to an owner's name when naming an anonymous element.
    #[must_use]
    pub fn anonymous_suffix(self) -> &'static str {
        match self {
            Self::Aspect => "Aspect",
            Self::Property | Self::AbstractProperty => "Property",
            Self::Characteristic(c) => match c {
                CharacteristicTag::Trait => "Trait",
                CharacteristicTag::Either => "Either",
                CharacteristicTag::Enumeration => "Enumeration",
                CharacteristicTag::State => "State",
                CharacteristicTag::Collection
                | CharacteristicTag::List
                | CharacteristicTag::Set
                | CharacteristicTag::SortedSet
                | CharacteristicTag::TimeSeries => "Collection",
                _ => "Characteristic",
            },
            Self::Entity | Self::AbstractEntity => "Entity",
            Self::EntityValue => "Instance",
            Self::Constraint(_) => "Constraint",
            Self::Unit => "Unit",
            Self::QuantityKind => "QuantityKind",
            Self::Operation => "Operation",
            Self::Event => "Event",
            Self::Scalar => "Type",
        }
    }

    /// Whether an element of this kind can serve as a characteristic's data type.
    #[must_use]
    pub fn is_type(self) -> bool {
        matches!(self, Self::Scalar | Self::Entity | Self::AbstractEntity)
    }

    #[must_use]
    pub fn is_characteristic(self) -> bool {
        matches!(self, Self::Characteristic(_))
    }

    #[must_use]
    pub fn is_property(self) -> bool {
        matches!(self, Self::Property | Self::AbstractProperty)
    }

    #[must_use]
    pub fn is_entity(self) -> bool {
        matches!(self, Self::Entity | Self::AbstractEntity)
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// A value slot: literal, element (usually an `EntityValue`) or ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Literal(Literal),
    Element(ElementRef),
    List(Vec<Value>),
}

impl Value {
    fn collect_refs(&self, out: &mut Vec<ElementRef>) {
        match self {
            Self::Literal(_) => {}
            Self::Element(r) => out.push(*r),
            Self::List(items) => items.iter().for_each(|v| v.collect_refs(out)),
        }
    }

    /// Drop every reference to `target`. Returns whether anything changed.
    fn strip(&mut self, target: ElementRef) -> bool {
        match self {
            Self::Literal(_) => false,
            Self::Element(_) => false,
            Self::List(items) => {
                let before = items.len();
                items.retain(|v| !matches!(v, Self::Element(r) if *r == target));
                let mut changed = items.len() != before;
                for item in items.iter_mut() {
                    changed |= item.strip(target);
                }
                changed
            }
        }
    }

    fn references(&self, target: ElementRef) -> bool {
        match self {
            Self::Literal(_) => false,
            Self::Element(r) => *r == target,
            Self::List(items) => items.iter().any(|v| v.references(target)),
        }
    }
}

/// Use of a property inside an aspect or entity, with per-use modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUse {
    pub property: ElementRef,
    pub optional: bool,
    pub not_in_payload: bool,
    pub payload_name: Option<String>,
}

impl PropertyUse {
    /// A plain use without modifiers.
    #[must_use]
    pub fn plain(property: ElementRef) -> Self {
        Self {
            property,
            optional: false,
            not_in_payload: false,
            payload_name: None,
        }
    }
}

/// One part of a structured value's element list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuredElement {
    Literal(String),
    Property(ElementRef),
}

// =============================================================================
// VARIANTS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aspect {
    pub properties: Vec<PropertyUse>,
    pub operations: Vec<ElementRef>,
    pub events: Vec<ElementRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub is_abstract: bool,
    pub characteristic: Option<ElementRef>,
    /// The property this one refines.
    pub extends: Option<ElementRef>,
    pub example_value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    Collection,
    List,
    Set,
    SortedSet,
    TimeSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantifiableKind {
    Quantifiable,
    Measurement,
    Duration,
}

/// Characteristic subtype structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacteristicClass {
    Plain,
    Code,
    SingleEntity,
    Trait {
        base: Option<ElementRef>,
        constraints: Vec<ElementRef>,
    },
    Collection {
        kind: CollectionKind,
        element_characteristic: Option<ElementRef>,
    },
    Either {
        left: Option<ElementRef>,
        right: Option<ElementRef>,
    },
    Enumeration {
        values: Vec<Value>,
    },
    State {
        values: Vec<Value>,
        default_value: Option<Value>,
    },
    StructuredValue {
        deconstruction_rule: String,
        elements: Vec<StructuredElement>,
    },
    Quantifiable {
        kind: QuantifiableKind,
        unit: Option<ElementRef>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    /// Scalar or entity type of the characteristic.
    pub data_type: Option<ElementRef>,
    pub class: CharacteristicClass,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub is_abstract: bool,
    pub properties: Vec<PropertyUse>,
    pub extends: Option<ElementRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityValue {
    /// The entity this value instantiates.
    pub entity: Option<ElementRef>,
    /// Property -> value assignments in source order.
    pub assignments: Vec<(ElementRef, Value)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundKind {
    Open,
    AtLeast,
    GreaterThan,
    LessThan,
    AtMost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    Plain,
    Length {
        min: Option<Literal>,
        max: Option<Literal>,
    },
    Range {
        min: Option<Literal>,
        max: Option<Literal>,
        lower_bound: BoundKind,
        upper_bound: BoundKind,
    },
    Encoding {
        value: Option<String>,
    },
    RegularExpression {
        value: Option<String>,
    },
    FixedPoint {
        scale: Option<Literal>,
        integer: Option<Literal>,
    },
    Language {
        language_code: Option<String>,
    },
    Locale {
        locale_code: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub symbol: Option<String>,
    pub code: Option<String>,
    pub reference_unit: Option<ElementRef>,
    pub conversion_factor: Option<String>,
    pub quantity_kinds: Vec<ElementRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub input: Vec<ElementRef>,
    pub output: Option<ElementRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub parameters: Vec<ElementRef>,
}

/// Variant-specific structure of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Aspect(Aspect),
    Property(Property),
    Characteristic(Characteristic),
    Entity(Entity),
    EntityValue(EntityValue),
    Constraint(Constraint),
    Unit(Unit),
    QuantityKind,
    Operation(Operation),
    Event(Event),
    Scalar,
}

impl ElementKind {
    /// The thin, unpopulated structure for a tag.
    #[must_use]
    pub fn empty(tag: ElementTag) -> Self {
        match tag {
            ElementTag::Aspect => Self::Aspect(Aspect::default()),
            ElementTag::Property => Self::Property(Property::default()),
            ElementTag::AbstractProperty => Self::Property(Property {
                is_abstract: true,
                ..Property::default()
            }),
            ElementTag::Characteristic(c) => Self::Characteristic(Characteristic {
                data_type: None,
                class: CharacteristicClass::empty(c),
            }),
            ElementTag::Entity => Self::Entity(Entity::default()),
            ElementTag::AbstractEntity => Self::Entity(Entity {
                is_abstract: true,
                ..Entity::default()
            }),
            ElementTag::EntityValue => Self::EntityValue(EntityValue::default()),
            ElementTag::Constraint(c) => Self::Constraint(Constraint::empty(c)),
            ElementTag::Unit => Self::Unit(Unit::default()),
            ElementTag::QuantityKind => Self::QuantityKind,
            ElementTag::Operation => Self::Operation(Operation::default()),
            ElementTag::Event => Self::Event(Event::default()),
            ElementTag::Scalar => Self::Scalar,
        }
    }

    /// The tag this structure corresponds to.
    #[must_use]
    pub fn tag(&self) -> ElementTag {
        match self {
            Self::Aspect(_) => ElementTag::Aspect,
            Self::Property(p) if p.is_abstract => ElementTag::AbstractProperty,
            Self::Property(_) => ElementTag::Property,
            Self::Characteristic(c) => ElementTag::Characteristic(c.class.tag()),
            Self::Entity(e) if e.is_abstract => ElementTag::AbstractEntity,
            Self::Entity(_) => ElementTag::Entity,
            Self::EntityValue(_) => ElementTag::EntityValue,
            Self::Constraint(c) => ElementTag::Constraint(c.tag()),
            Self::Unit(_) => ElementTag::Unit,
            Self::QuantityKind => ElementTag::QuantityKind,
            Self::Operation(_) => ElementTag::Operation,
            Self::Event(_) => ElementTag::Event,
            Self::Scalar => ElementTag::Scalar,
        }
    }

    /// Every structural reference, in field order, duplicates included.
    #[must_use]
    pub fn structural_refs(&self) -> Vec<ElementRef> {
        let mut out = Vec::new();
        match self {
            Self::Aspect(a) => {
                out.extend(a.properties.iter().map(|u| u.property));
                out.extend(&a.operations);
                out.extend(&a.events);
            }
            Self::Property(p) => {
                out.extend(p.characteristic);
                out.extend(p.extends);
                if let Some(v) = &p.example_value {
                    v.collect_refs(&mut out);
                }
            }
            Self::Characteristic(c) => {
                out.extend(c.data_type);
                c.class.collect_refs(&mut out);
            }
            Self::Entity(e) => {
                out.extend(e.properties.iter().map(|u| u.property));
                out.extend(e.extends);
            }
            Self::EntityValue(v) => {
                out.extend(v.entity);
                for (property, value) in &v.assignments {
                    out.push(*property);
                    value.collect_refs(&mut out);
                }
            }
            Self::Unit(u) => {
                out.extend(u.reference_unit);
                out.extend(&u.quantity_kinds);
            }
            Self::Operation(o) => {
                out.extend(&o.input);
                out.extend(o.output);
            }
            Self::Event(e) => out.extend(&e.parameters),
            Self::Constraint(_) | Self::QuantityKind | Self::Scalar => {}
        }
        out
    }
}

impl CharacteristicClass {
    /// Unpopulated class for a characteristic tag.
    #[must_use]
    pub fn empty(tag: CharacteristicTag) -> Self {
        let collection = |kind| Self::Collection {
            kind,
            element_characteristic: None,
        };
        let quantifiable = |kind| Self::Quantifiable { kind, unit: None };
        match tag {
            CharacteristicTag::Characteristic => Self::Plain,
            CharacteristicTag::Code => Self::Code,
            CharacteristicTag::SingleEntity => Self::SingleEntity,
            CharacteristicTag::Trait => Self::Trait {
                base: None,
                constraints: Vec::new(),
            },
            CharacteristicTag::Collection => collection(CollectionKind::Collection),
            CharacteristicTag::List => collection(CollectionKind::List),
            CharacteristicTag::Set => collection(CollectionKind::Set),
            CharacteristicTag::SortedSet => collection(CollectionKind::SortedSet),
            CharacteristicTag::TimeSeries => collection(CollectionKind::TimeSeries),
            CharacteristicTag::Either => Self::Either {
                left: None,
                right: None,
            },
            CharacteristicTag::Enumeration => Self::Enumeration { values: Vec::new() },
            CharacteristicTag::State => Self::State {
                values: Vec::new(),
                default_value: None,
            },
            CharacteristicTag::StructuredValue => Self::StructuredValue {
                deconstruction_rule: String::new(),
                elements: Vec::new(),
            },
            CharacteristicTag::Quantifiable => quantifiable(QuantifiableKind::Quantifiable),
            CharacteristicTag::Measurement => quantifiable(QuantifiableKind::Measurement),
            CharacteristicTag::Duration => quantifiable(QuantifiableKind::Duration),
        }
    }

    #[must_use]
    pub fn tag(&self) -> CharacteristicTag {
        match self {
            Self::Plain => CharacteristicTag::Characteristic,
            Self::Code => CharacteristicTag::Code,
            Self::SingleEntity => CharacteristicTag::SingleEntity,
            Self::Trait { .. } => CharacteristicTag::Trait,
            Self::Collection { kind, .. } => match kind {
                CollectionKind::Collection => CharacteristicTag::Collection,
                CollectionKind::List => CharacteristicTag::List,
                CollectionKind::Set => CharacteristicTag::Set,
                CollectionKind::SortedSet => CharacteristicTag::SortedSet,
                CollectionKind::TimeSeries => CharacteristicTag::TimeSeries,
            },
            Self::Either { .. } => CharacteristicTag::Either,
            Self::Enumeration { .. } => CharacteristicTag::Enumeration,
            Self::State { .. } => CharacteristicTag::State,
            Self::StructuredValue { .. } => CharacteristicTag::StructuredValue,
            Self::Quantifiable { kind, .. } => match kind {
                QuantifiableKind::Quantifiable => CharacteristicTag::Quantifiable,
                QuantifiableKind::Measurement => CharacteristicTag::Measurement,
                QuantifiableKind::Duration => CharacteristicTag::Duration,
            },
        }
    }

    fn collect_refs(&self, out: &mut Vec<ElementRef>) {
        match self {
            Self::Plain | Self::Code | Self::SingleEntity => {}
            Self::Trait { base, constraints } => {
                out.extend(*base);
                out.extend(constraints);
            }
            Self::Collection {
                element_characteristic,
                ..
            } => out.extend(*element_characteristic),
            Self::Either { left, right } => {
                out.extend(*left);
                out.extend(*right);
            }
            Self::Enumeration { values } => values.iter().for_each(|v| v.collect_refs(out)),
            Self::State {
                values,
                default_value,
            } => {
                values.iter().for_each(|v| v.collect_refs(out));
                if let Some(v) = default_value {
                    v.collect_refs(out);
                }
            }
            Self::StructuredValue { elements, .. } => {
                out.extend(elements.iter().filter_map(|e| match e {
                    StructuredElement::Property(r) => Some(*r),
                    StructuredElement::Literal(_) => None,
                }));
            }
            Self::Quantifiable { unit, .. } => out.extend(*unit),
        }
    }
}

impl Constraint {
    /// Unpopulated constraint for a tag.
    #[must_use]
    pub fn empty(tag: ConstraintTag) -> Self {
        match tag {
            ConstraintTag::Constraint => Self::Plain,
            ConstraintTag::Length => Self::Length {
                min: None,
                max: None,
            },
            ConstraintTag::Range => Self::Range {
                min: None,
                max: None,
                lower_bound: BoundKind::Open,
                upper_bound: BoundKind::Open,
            },
            ConstraintTag::Encoding => Self::Encoding { value: None },
            ConstraintTag::RegularExpression => Self::RegularExpression { value: None },
            ConstraintTag::FixedPoint => Self::FixedPoint {
                scale: None,
                integer: None,
            },
            ConstraintTag::Language => Self::Language {
                language_code: None,
            },
            ConstraintTag::Locale => Self::Locale { locale_code: None },
        }
    }

    #[must_use]
    pub fn tag(&self) -> ConstraintTag {
        match self {
            Self::Plain => ConstraintTag::Constraint,
            Self::Length { .. } => ConstraintTag::Length,
            Self::Range { .. } => ConstraintTag::Range,
            Self::Encoding { .. } => ConstraintTag::Encoding,
            Self::RegularExpression { .. } => ConstraintTag::RegularExpression,
            Self::FixedPoint { .. } => ConstraintTag::FixedPoint,
            Self::Language { .. } => ConstraintTag::Language,
            Self::Locale { .. } => ConstraintTag::Locale,
        }
    }
}

// =============================================================================
// SEMANTIC ELEMENT
// =============================================================================

/// A node of the aspect model graph.
///
/// `parents`/`children` are the backlink lists; they are maintained by
/// [`crate::graph::ModelGraph::sync_links`] and must never be edited directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticElement {
    /// Global identifier, unique within a cache scope.
    pub urn: String,
    /// Short name (authored, or synthetic for anonymous elements).
    pub name: String,
    /// Meta-model version the element was read with.
    pub meta_model_version: String,
    /// Locale -> preferred name.
    pub preferred_names: BTreeMap<String, String>,
    /// Locale -> description.
    pub descriptions: BTreeMap<String, String>,
    /// See-also references.
    pub see: Vec<String>,
    /// Defining statements are not in the file that built this element.
    pub external: bool,
    /// No authored name; `name` is synthetic.
    pub anonymous: bool,
    /// Lies under the reserved predefined prefix.
    pub predefined: bool,
    pub parents: Vec<ElementRef>,
    pub children: Vec<ElementRef>,
    pub kind: ElementKind,
}

impl SemanticElement {
    /// Create an element with no structure beyond its kind.
    #[must_use]
    pub fn new(urn: impl Into<String>, name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            urn: urn.into(),
            name: name.into(),
            meta_model_version: String::new(),
            preferred_names: BTreeMap::new(),
            descriptions: BTreeMap::new(),
            see: Vec::new(),
            external: false,
            anonymous: false,
            predefined: false,
            parents: Vec::new(),
            children: Vec::new(),
            kind,
        }
    }

    #[must_use]
    pub fn tag(&self) -> ElementTag {
        self.kind.tag()
    }

    /// Whether this element holds any structural reference to `target`.
    #[must_use]
    pub fn references(&self, target: ElementRef) -> bool {
        self.kind.structural_refs().contains(&target)
    }
}

/// Remove `target` from value slots. Used by the mutation engine.
pub(crate) fn strip_value(slot: &mut Option<Value>, target: ElementRef) -> bool {
    match slot {
        Some(v) if v.references(target) => {
            if matches!(v, Value::Element(_)) {
                *slot = None;
                true
            } else {
                v.strip(target)
            }
        }
        _ => false,
    }
}

/// Remove `target` from a list of values. Used by the mutation engine.
pub(crate) fn strip_values(values: &mut Vec<Value>, target: ElementRef) -> bool {
    let before = values.len();
    values.retain(|v| !matches!(v, Value::Element(r) if *r == target));
    let mut changed = values.len() != before;
    for value in values.iter_mut() {
        changed |= value.strip(target);
    }
    changed
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_kind_roundtrips_tag() {
        let tags = [
            ElementTag::Aspect,
            ElementTag::Property,
            ElementTag::AbstractProperty,
            ElementTag::Characteristic(CharacteristicTag::Trait),
            ElementTag::Characteristic(CharacteristicTag::SortedSet),
            ElementTag::Characteristic(CharacteristicTag::Duration),
            ElementTag::Entity,
            ElementTag::AbstractEntity,
            ElementTag::EntityValue,
            ElementTag::Constraint(ConstraintTag::Range),
            ElementTag::Unit,
            ElementTag::QuantityKind,
            ElementTag::Operation,
            ElementTag::Event,
            ElementTag::Scalar,
        ];
        for tag in tags {
            assert_eq!(ElementKind::empty(tag).tag(), tag);
        }
    }

    #[test]
    fn structural_refs_cover_trait_fields() {
        let kind = ElementKind::Characteristic(Characteristic {
            data_type: Some(ElementRef(1)),
            class: CharacteristicClass::Trait {
                base: Some(ElementRef(2)),
                constraints: vec![ElementRef(3), ElementRef(4)],
            },
        });
        assert_eq!(
            kind.structural_refs(),
            vec![ElementRef(1), ElementRef(2), ElementRef(3), ElementRef(4)]
        );
    }

    #[test]
    fn strip_values_removes_nested_refs() {
        let mut values = vec![
            Value::Element(ElementRef(1)),
            Value::List(vec![Value::Element(ElementRef(1)), Value::Element(ElementRef(2))]),
            Value::Literal(Literal::plain("x")),
        ];
        assert!(strip_values(&mut values, ElementRef(1)));
        assert_eq!(
            values,
            vec![
                Value::List(vec![Value::Element(ElementRef(2))]),
                Value::Literal(Literal::plain("x")),
            ]
        );
        assert!(!strip_values(&mut values, ElementRef(9)));
    }

    #[test]
    fn strip_value_clears_direct_reference() {
        let mut slot = Some(Value::Element(ElementRef(5)));
        assert!(strip_value(&mut slot, ElementRef(5)));
        assert!(slot.is_none());
    }
}
