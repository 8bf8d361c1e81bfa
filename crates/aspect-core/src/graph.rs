//! # Model Graph
//!
//! Arena storage for the elements of one cache scope.
//!
//! Elements are addressed by `ElementRef`; structural fields hold handles, so
//! self-referential and mutually-referential models need no special casing.
//! All data structures use `BTreeMap` for deterministic ordering.
//!
//! ## Backlinks
//!
//! `children` of an element mirrors the distinct structural references of its
//! kind; `parents` is the inverse. [`ModelGraph::sync_links`] re-derives both
//! sides after every structural change and is the only writer of either list.

use crate::element::{ElementKind, ElementTag, SemanticElement};
use crate::primitives::MAX_INHERITANCE_DEPTH;
use crate::ElementRef;
use std::collections::{BTreeMap, BTreeSet};

/// Arena of semantic elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelGraph {
    /// Element storage: ElementRef -> SemanticElement
    elements: BTreeMap<ElementRef, SemanticElement>,
    /// Next available ElementRef
    next_ref: u64,
}

impl ModelGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an element and return its handle.
    ///
    /// Backlinks of the new element are synchronized immediately.
    pub fn insert(&mut self, element: SemanticElement) -> ElementRef {
        let id = ElementRef(self.next_ref);
        self.next_ref = self.next_ref.saturating_add(1);
        self.elements.insert(id, element);
        self.sync_links(id);
        id
    }

    #[must_use]
    pub fn get(&self, id: ElementRef) -> Option<&SemanticElement> {
        self.elements.get(&id)
    }

    /// Mutable access. Callers that change structure must call `sync_links`.
    pub fn get_mut(&mut self, id: ElementRef) -> Option<&mut SemanticElement> {
        self.elements.get_mut(&id)
    }

    #[must_use]
    pub fn contains(&self, id: ElementRef) -> bool {
        self.elements.contains_key(&id)
    }

    #[must_use]
    pub fn tag(&self, id: ElementRef) -> Option<ElementTag> {
        self.elements.get(&id).map(SemanticElement::tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (ElementRef, &SemanticElement)> {
        self.elements.iter().map(|(id, el)| (*id, el))
    }

    /// Drop every element.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Replace the structure of an element and resynchronize its backlinks.
    pub fn set_kind(&mut self, id: ElementRef, kind: ElementKind) -> bool {
        let Some(element) = self.elements.get_mut(&id) else {
            return false;
        };
        element.kind = kind;
        self.sync_links(id);
        true
    }

    /// Re-derive `owner.children` from its structure and patch the
    /// `parents` of every child that was added or removed.
    ///
    /// References to handles that are not in the arena are dropped from
    /// `children` so a link is never recorded against a missing element.
    pub fn sync_links(&mut self, owner: ElementRef) {
        let Some(element) = self.elements.get(&owner) else {
            return;
        };
        let mut seen = BTreeSet::new();
        let current: Vec<ElementRef> = element
            .kind
            .structural_refs()
            .into_iter()
            .filter(|r| self.elements.contains_key(r) && seen.insert(*r))
            .collect();
        let previous = element.children.clone();

        for removed in previous.iter().filter(|r| !seen.contains(r)) {
            if let Some(child) = self.elements.get_mut(removed) {
                child.parents.retain(|p| *p != owner);
            }
        }
        for added in &current {
            if let Some(child) = self.elements.get_mut(added)
                && !child.parents.contains(&owner)
            {
                child.parents.push(owner);
            }
        }
        if let Some(element) = self.elements.get_mut(&owner) {
            element.children = current;
        }
    }

    /// Remove an element that no other element references.
    ///
    /// Returns `None` (and keeps the element) while any parent remains.
    pub fn remove_detached(&mut self, id: ElementRef) -> Option<SemanticElement> {
        if self.elements.get(&id)?.parents.iter().any(|p| *p != id) {
            return None;
        }
        let removed = self.elements.remove(&id)?;
        for child in &removed.children {
            if let Some(child) = self.elements.get_mut(child) {
                child.parents.retain(|p| *p != id);
            }
        }
        Some(removed)
    }

    /// Remove a closed set of elements at once.
    ///
    /// Elements of the set that are still referenced from outside it are kept
    /// (together with everything they reach inside the set). Returns the
    /// handles actually removed.
    pub fn remove_set(&mut self, set: &BTreeSet<ElementRef>) -> Vec<ElementRef> {
        let mut doomed: BTreeSet<ElementRef> = set
            .iter()
            .copied()
            .filter(|id| self.elements.contains_key(id))
            .collect();
        // Rescue anything with a surviving parent, to a fixed point.
        loop {
            let rescued: Vec<ElementRef> = doomed
                .iter()
                .copied()
                .filter(|id| {
                    self.elements
                        .get(id)
                        .is_some_and(|el| el.parents.iter().any(|p| !doomed.contains(p)))
                })
                .collect();
            if rescued.is_empty() {
                break;
            }
            for id in rescued {
                doomed.remove(&id);
            }
        }
        for id in &doomed {
            if let Some(removed) = self.elements.remove(id) {
                for child in removed.children {
                    if let Some(child) = self.elements.get_mut(&child) {
                        child.parents.retain(|p| p != id);
                    }
                }
            }
        }
        doomed.into_iter().collect()
    }

    /// Pairs `(parent, child)` where the backlink lists disagree with structure.
    ///
    /// Empty for every graph produced by this crate.
    #[must_use]
    pub fn backlink_violations(&self) -> Vec<(ElementRef, ElementRef)> {
        let mut violations = Vec::new();
        for (id, element) in &self.elements {
            for child in element.kind.structural_refs() {
                match self.elements.get(&child) {
                    Some(c) if c.parents.contains(id) && element.children.contains(&child) => {}
                    _ => violations.push((*id, child)),
                }
            }
            for parent in &element.parents {
                let consistent = self
                    .elements
                    .get(parent)
                    .is_some_and(|p| p.kind.structural_refs().contains(id));
                if !consistent {
                    violations.push((*parent, *id));
                }
            }
        }
        violations.sort();
        violations.dedup();
        violations
    }

    /// The `extends` target of an entity or property.
    #[must_use]
    pub fn extends_of(&self, id: ElementRef) -> Option<ElementRef> {
        match &self.elements.get(&id)?.kind {
            ElementKind::Entity(e) => e.extends,
            ElementKind::Property(p) => p.extends,
            _ => None,
        }
    }

    /// Elements whose `extends` chain returns to themselves.
    ///
    /// The arena tolerates such cycles; they are a modeling error for the
    /// caller to report.
    #[must_use]
    pub fn find_inheritance_cycles(&self) -> Vec<ElementRef> {
        self.elements
            .keys()
            .copied()
            .filter(|start| {
                let mut current = self.extends_of(*start);
                let mut hops = 0usize;
                while let Some(next) = current {
                    if next == *start {
                        return true;
                    }
                    hops = hops.saturating_add(1);
                    if hops > MAX_INHERITANCE_DEPTH {
                        return false;
                    }
                    current = self.extends_of(next);
                }
                false
            })
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
