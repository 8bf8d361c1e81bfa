//! # Blank-Node & List Resolver
//!
//! Turns blank-node substructures into values the builders consume:
//! - `first`/`rest` chains become ordered item lists
//! - property-use records (`[ samm:property :p ; samm:optional true ]`) become
//!   [`PropertyModifiers`]
//! - nested untyped blank nodes are flattened into `(predicate, value)` pairs
//!
//! Blank nodes also get a content signature that ignores their labels, so
//! callers can order sibling blank nodes the same way however they were
//! labelled.
//!
//! Every walk carries a visited set, so self-referential blank structures
//! terminate. A broken chain ends the walk and is reported as malformed.

use crate::primitives::{MAX_SIGNATURE_DEPTH, RDF_FIRST, RDF_NIL, RDF_REST, RDF_TYPE};
use crate::source::StatementSource;
use crate::vocabulary::Vocabulary;
use crate::{AspectError, Statement, Term};
use std::collections::BTreeSet;
use tracing::debug;

/// Per-use modifiers read from a property-use record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyModifiers {
    /// The record's own node.
    pub node: Term,
    /// Referenced property (`samm:property`).
    pub property: Option<Term>,
    pub optional: bool,
    pub not_in_payload: bool,
    pub payload_name: Option<String>,
    /// Abstract property refined by an anonymous use (`samm:extends`).
    pub extends: Option<Term>,
    /// Characteristic of an anonymous use.
    pub characteristic: Option<Term>,
}

/// One entry of a resolved list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    /// A plain reference or literal.
    Node(Term),
    /// A property-use record.
    Modified(PropertyModifiers),
}

impl ListItem {
    /// The term this item stands for (the record node for records).
    #[must_use]
    pub fn term(&self) -> &Term {
        match self {
            Self::Node(term) => term,
            Self::Modified(modifiers) => &modifiers.node,
        }
    }
}

/// Result of a list walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResolution {
    pub items: Vec<ListItem>,
    /// The chain was cut short (missing link, loop, or length limit).
    pub malformed: bool,
}

/// Resolver over one statement source.
pub struct Resolver<'a, S: StatementSource + ?Sized> {
    source: &'a S,
    vocab: &'a Vocabulary,
    max_list_length: usize,
}

impl<'a, S: StatementSource + ?Sized> Resolver<'a, S> {
    #[must_use]
    pub fn new(source: &'a S, vocab: &'a Vocabulary, max_list_length: usize) -> Self {
        Self {
            source,
            vocab,
            max_list_length,
        }
    }

    /// Whether `node` starts a `first`/`rest` chain.
    pub fn is_list(&self, node: &Term) -> Result<bool, AspectError> {
        if node.as_iri() == Some(RDF_NIL) {
            return Ok(true);
        }
        Ok(node.is_blank() && self.source.object(node, RDF_FIRST)?.is_some())
    }

    /// Walk the chain anchored at `head` into an ordered item list.
    pub fn resolve_list(&self, head: &Term) -> Result<ListResolution, AspectError> {
        let mut resolution = ListResolution::default();
        let mut visited = BTreeSet::new();
        let mut node = head.clone();
        loop {
            if node.as_iri() == Some(RDF_NIL) {
                break;
            }
            if !visited.insert(node.clone()) || resolution.items.len() >= self.max_list_length {
                resolution.malformed = true;
                break;
            }
            let Some(first) = self.source.object(&node, RDF_FIRST)? else {
                resolution.malformed = true;
                break;
            };
            resolution.items.push(self.item(first)?);
            let Some(rest) = self.source.object(&node, RDF_REST)? else {
                resolution.malformed = true;
                break;
            };
            node = rest;
        }
        if resolution.malformed {
            debug!(head = %head, items = resolution.items.len(), "list walk cut short");
        }
        Ok(resolution)
    }

    /// Plain terms of a list, discarding record structure.
    pub fn resolve_terms(&self, head: &Term) -> Result<(Vec<Term>, bool), AspectError> {
        let resolution = self.resolve_list(head)?;
        let terms = resolution
            .items
            .into_iter()
            .map(|item| match item {
                ListItem::Node(term) => term,
                ListItem::Modified(modifiers) => modifiers.node,
            })
            .collect();
        Ok((terms, resolution.malformed))
    }

    /// Flatten the attributes of a blank node into `(predicate, value)` pairs.
    ///
    /// Vocabulary predicates are skipped. List values expand into one pair
    /// per item; typed blank nodes are kept as values for the caller to
    /// instantiate; untyped blank nodes are expanded in place.
    pub fn resolve_nested_record(&self, blank: &Term) -> Result<Vec<(String, Term)>, AspectError> {
        let mut flat = Vec::new();
        let mut visited = BTreeSet::new();
        let mut pending = vec![blank.clone()];
        while let Some(node) = pending.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }
            let mut nested = Vec::new();
            for statement in self.ordered_statements(&node)? {
                if self.vocab.is_builtin_predicate(&statement.predicate) {
                    continue;
                }
                let object = statement.object;
                if self.is_list(&object)? {
                    let (items, _) = self.resolve_terms(&object)?;
                    flat.extend(items.into_iter().map(|t| (statement.predicate.clone(), t)));
                } else if object.is_blank() && !self.is_typed(&object)? {
                    nested.push(object);
                } else {
                    flat.push((statement.predicate, object));
                }
            }
            // Depth-first in signature order.
            pending.extend(nested.into_iter().rev());
        }
        Ok(flat)
    }

    /// Label-independent description of `term`.
    ///
    /// Named terms and literals describe themselves. A blank node is the
    /// sorted list of its outgoing statements, nested blank nodes described
    /// the same way; a node already on the walk path is written as `[]`.
    pub fn signature(&self, term: &Term) -> Result<String, AspectError> {
        let mut path = BTreeSet::new();
        self.signature_within(term, &mut path)
    }

    fn signature_within(
        &self,
        term: &Term,
        path: &mut BTreeSet<Term>,
    ) -> Result<String, AspectError> {
        if !term.is_blank() {
            return Ok(term.to_string());
        }
        if path.len() >= MAX_SIGNATURE_DEPTH {
            return Ok("[..]".to_string());
        }
        if !path.insert(term.clone()) {
            return Ok("[]".to_string());
        }
        let mut parts = Vec::new();
        for statement in self.source.query(Some(term), None, None)? {
            let object = self.signature_within(&statement.object, path)?;
            parts.push(format!("<{}> {object}", statement.predicate));
        }
        path.remove(term);
        parts.sort();
        Ok(format!("[{}]", parts.join("; ")))
    }

    /// Statements of `subject` ordered by predicate, then object signature.
    pub fn ordered_statements(&self, subject: &Term) -> Result<Vec<Statement>, AspectError> {
        let mut keyed = Vec::new();
        for statement in self.source.query(Some(subject), None, None)? {
            let key = self.signature(&statement.object)?;
            keyed.push((statement.predicate.clone(), key, statement));
        }
        keyed.sort();
        Ok(keyed.into_iter().map(|(_, _, statement)| statement).collect())
    }

    fn is_typed(&self, node: &Term) -> Result<bool, AspectError> {
        Ok(self.source.object(node, RDF_TYPE)?.is_some())
    }

    fn item(&self, first: Term) -> Result<ListItem, AspectError> {
        if !first.is_blank() {
            return Ok(ListItem::Node(first));
        }
        let property = self.source.object(&first, &self.vocab.samm("property"))?;
        let extends = self.source.object(&first, &self.vocab.samm("extends"))?;
        if property.is_none() && extends.is_none() {
            return Ok(ListItem::Node(first));
        }
        let flag = |local: &str| -> Result<bool, AspectError> {
            Ok(self
                .source
                .object(&first, &self.vocab.samm(local))?
                .and_then(|t| t.as_literal().map(crate::Literal::as_bool))
                .unwrap_or(false))
        };
        let optional = flag("optional")?;
        let not_in_payload = flag("notInPayload")?;
        let payload_name = self
            .source
            .object(&first, &self.vocab.samm("payloadName"))?
            .map(|t| t.lexical().to_string());
        let characteristic = self
            .source
            .object(&first, &self.vocab.samm("characteristic"))?;
        Ok(ListItem::Modified(PropertyModifiers {
            node: first,
            property,
            optional,
            not_in_payload,
            payload_name,
            extends,
            characteristic,
        }))
    }
}

// =============================================================================
// TESTS
// =============================================================================
