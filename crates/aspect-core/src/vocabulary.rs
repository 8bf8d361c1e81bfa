//! # Meta-Model Vocabulary
//!
//! Version-dependent IRIs of the aspect meta model and the classification of
//! declared types into [`ElementTag`]s.
//!
//! The vocabulary is split over four namespaces below the predefined prefix:
//! `meta-model` (samm), `characteristic` (samm-c), `entity` (samm-e) and `unit`.

use crate::element::{BoundKind, CharacteristicTag, ConstraintTag, ElementTag};
use crate::primitives::{
    RDF_LANG_STRING, RDF_NS, RDFS_NS, XSD_ANY_URI, XSD_BOOLEAN, XSD_DATE_TIME, XSD_NS, XSD_STRING,
};

/// One of the meta-model namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabNs {
    Samm,
    SammC,
    SammE,
    Unit,
}

/// Meta-model IRIs for one meta-model version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    samm: String,
    samm_c: String,
    samm_e: String,
    unit: String,
}

impl Vocabulary {
    /// Build the vocabulary below `predefined_prefix` for `version`.
    #[must_use]
    pub fn new(predefined_prefix: &str, version: &str) -> Self {
        let ns = |part: &str| format!("{predefined_prefix}{part}:{version}#");
        Self {
            samm: ns("meta-model"),
            samm_c: ns("characteristic"),
            samm_e: ns("entity"),
            unit: ns("unit"),
        }
    }

    /// `samm:<local>`
    #[must_use]
    pub fn samm(&self, local: &str) -> String {
        format!("{}{local}", self.samm)
    }

    /// `samm-c:<local>`
    #[must_use]
    pub fn samm_c(&self, local: &str) -> String {
        format!("{}{local}", self.samm_c)
    }

    /// `samm-e:<local>`
    #[must_use]
    pub fn samm_e(&self, local: &str) -> String {
        format!("{}{local}", self.samm_e)
    }

    /// `unit:<local>`
    #[must_use]
    pub fn unit(&self, local: &str) -> String {
        format!("{}{local}", self.unit)
    }

    /// Split a vocabulary IRI into its namespace and local name.
    #[must_use]
    pub fn split<'a>(&self, iri: &'a str) -> Option<(VocabNs, &'a str)> {
        [
            (VocabNs::Samm, &self.samm),
            (VocabNs::SammC, &self.samm_c),
            (VocabNs::SammE, &self.samm_e),
            (VocabNs::Unit, &self.unit),
        ]
        .into_iter()
        .find_map(|(ns, prefix)| iri.strip_prefix(prefix.as_str()).map(|local| (ns, local)))
    }

    /// Classify a declared type IRI. `None` means "not a meta-model class";
    /// such subjects may still be entity values of a user entity.
    #[must_use]
    pub fn classify_type(&self, type_iri: &str) -> Option<ElementTag> {
        use CharacteristicTag as C;
        use ConstraintTag as K;
        let (ns, local) = self.split(type_iri)?;
        let tag = match (ns, local) {
            (VocabNs::Samm, "Aspect") => ElementTag::Aspect,
            (VocabNs::Samm, "Property") => ElementTag::Property,
            (VocabNs::Samm, "AbstractProperty") => ElementTag::AbstractProperty,
            (VocabNs::Samm, "Characteristic") => ElementTag::Characteristic(C::Characteristic),
            (VocabNs::Samm, "Entity") => ElementTag::Entity,
            (VocabNs::Samm, "AbstractEntity") => ElementTag::AbstractEntity,
            (VocabNs::Samm, "Constraint") => ElementTag::Constraint(K::Constraint),
            (VocabNs::Samm, "Operation") => ElementTag::Operation,
            (VocabNs::Samm, "Event") => ElementTag::Event,
            (VocabNs::SammC, "Trait") => ElementTag::Characteristic(C::Trait),
            (VocabNs::SammC, "Collection") => ElementTag::Characteristic(C::Collection),
            (VocabNs::SammC, "List") => ElementTag::Characteristic(C::List),
            (VocabNs::SammC, "Set") => ElementTag::Characteristic(C::Set),
            (VocabNs::SammC, "SortedSet") => ElementTag::Characteristic(C::SortedSet),
            (VocabNs::SammC, "TimeSeries") => ElementTag::Characteristic(C::TimeSeries),
            (VocabNs::SammC, "Either") => ElementTag::Characteristic(C::Either),
            (VocabNs::SammC, "Enumeration") => ElementTag::Characteristic(C::Enumeration),
            (VocabNs::SammC, "State") => ElementTag::Characteristic(C::State),
            (VocabNs::SammC, "StructuredValue") => ElementTag::Characteristic(C::StructuredValue),
            (VocabNs::SammC, "Quantifiable") => ElementTag::Characteristic(C::Quantifiable),
            (VocabNs::SammC, "Measurement") => ElementTag::Characteristic(C::Measurement),
            (VocabNs::SammC, "Duration") => ElementTag::Characteristic(C::Duration),
            (VocabNs::SammC, "Code") => ElementTag::Characteristic(C::Code),
            (VocabNs::SammC, "SingleEntity") => ElementTag::Characteristic(C::SingleEntity),
            (VocabNs::SammC, "LengthConstraint") => ElementTag::Constraint(K::Length),
            (VocabNs::SammC, "RangeConstraint") => ElementTag::Constraint(K::Range),
            (VocabNs::SammC, "EncodingConstraint") => ElementTag::Constraint(K::Encoding),
            (VocabNs::SammC, "RegularExpressionConstraint") => {
                ElementTag::Constraint(K::RegularExpression)
            }
            (VocabNs::SammC, "FixedPointConstraint") => ElementTag::Constraint(K::FixedPoint),
            (VocabNs::SammC, "LanguageConstraint") => ElementTag::Constraint(K::Language),
            (VocabNs::SammC, "LocaleConstraint") => ElementTag::Constraint(K::Locale),
            (VocabNs::Unit, "Unit") => ElementTag::Unit,
            (VocabNs::Unit, "QuantityKind") => ElementTag::QuantityKind,
            _ => return None,
        };
        Some(tag)
    }

    /// Predicates that belong to the RDF/RDFS or meta-model vocabularies.
    #[must_use]
    pub fn is_builtin_predicate(&self, iri: &str) -> bool {
        iri.starts_with(RDF_NS) || iri.starts_with(RDFS_NS) || self.split(iri).is_some()
    }

    /// Bound kind individual of a range constraint.
    #[must_use]
    pub fn bound_kind(&self, iri: &str) -> Option<BoundKind> {
        match self.split(iri)? {
            (VocabNs::SammC, "AT_LEAST") => Some(BoundKind::AtLeast),
            (VocabNs::SammC, "GREATER_THAN") => Some(BoundKind::GreaterThan),
            (VocabNs::SammC, "AT_MOST") => Some(BoundKind::AtMost),
            (VocabNs::SammC, "LESS_THAN") => Some(BoundKind::LessThan),
            _ => None,
        }
    }

    /// Whether the identifier names a scalar type.
    #[must_use]
    pub fn is_scalar(&self, iri: &str) -> bool {
        iri.starts_with(XSD_NS) || iri == RDF_LANG_STRING || iri == self.samm("curie")
    }

    /// Data type of a predefined characteristic such as `samm-c:Text`.
    #[must_use]
    pub fn predefined_characteristic_type(&self, iri: &str) -> Option<String> {
        let (VocabNs::SammC, local) = self.split(iri)? else {
            return None;
        };
        let data_type = match local {
            "Text" | "MimeType" | "Locale" | "Language" => XSD_STRING.to_string(),
            "Boolean" => XSD_BOOLEAN.to_string(),
            "Timestamp" => XSD_DATE_TIME.to_string(),
            "MultiLanguageText" => RDF_LANG_STRING.to_string(),
            "ResourcePath" => XSD_ANY_URI.to_string(),
            "UnitReference" => self.samm("curie"),
            _ => return None,
        };
        Some(data_type)
    }
}
