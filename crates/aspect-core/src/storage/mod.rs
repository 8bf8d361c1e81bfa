//! # Storage Module
//!
//! Disk-backed statement storage.
//!
//! `RedbStore` implements [`crate::source::StatementStore`] on top of the redb
//! embedded database, so a batch of store changes commits or aborts as one
//! write transaction.

mod redb_store;

pub use redb_store::RedbStore;
