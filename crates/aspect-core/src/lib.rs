//! # aspect-core
//!
//! The statement-to-model linker for semantic aspect models.
//!
//! This crate turns a collection of subject-predicate-object statements into a
//! deduplicated, typed, cross-referencing element graph, and keeps that graph
//! consistent while it is edited:
//! - `resolver`: ordered lists and inline records encoded over blank nodes
//! - `cache`: per-file, per-scope identifier registries over one arena per scope
//! - `instantiator`: the build pipeline, driven by a deferred worklist
//! - `mutation`: exhaustive update/delete tables with backlink maintenance
//! - `rewrite`: all-or-nothing namespace and version moves
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - `BTreeMap`/`BTreeSet` only: iteration order is deterministic
//! - Every operation runs against an explicit [`Session`] or [`NamespaceCache`]
//! - Element variants form a closed enum; every dispatch over them is exhaustive

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod config;
pub mod element;
pub mod formats;
pub mod graph;
pub mod instantiator;
pub mod mutation;
pub mod primitives;
pub mod resolver;
pub mod rewrite;
pub mod session;
pub mod source;
pub mod storage;
pub mod types;
pub mod vocabulary;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{AspectError, Diagnostic, ElementRef, FileKey, Literal, Namespace, Statement, Term};

// =============================================================================
// RE-EXPORTS: Linker
// =============================================================================

pub use cache::{CacheScope, NamespaceCache};
pub use config::ModelConfig;
pub use element::{ElementKind, ElementTag, SemanticElement};
pub use graph::ModelGraph;
pub use instantiator::{Instantiator, LoadReport};
pub use mutation::{Mutation, MutationEngine, Origin, Removal};
pub use resolver::Resolver;
pub use rewrite::{Rewrite, RewriteReport};
pub use session::{Session, StorageBackend};
pub use source::{Batch, MemoryStore, StatementSource, StatementStore};
pub use storage::RedbStore;
pub use vocabulary::Vocabulary;

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    PersistenceHeader, StoreSnapshot, snapshot_from_bytes, store_from_bytes, store_to_bytes,
};
