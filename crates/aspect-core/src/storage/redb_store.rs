//! # redb-backed Statement Store
//!
//! A disk-backed statement store using the redb embedded database.
//!
//! Statements are keyed by their postcard encoding. A multimap indexes them
//! by encoded subject, which is the access path of the instantiation
//! pipeline. Query results are sorted so they come back in `Statement`
//! order, exactly like [`crate::source::MemoryStore`].

use crate::source::{Batch, StatementSource, StatementStore};
use crate::{AspectError, Statement, Term};
use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    ReadableTableMetadata, TableDefinition, WriteTransaction,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for statements: postcard(Statement) -> ()
const STATEMENTS: TableDefinition<&[u8], ()> = TableDefinition::new("statements");

/// Subject index: postcard(Term) -> postcard(Statement)
const BY_SUBJECT: MultimapTableDefinition<&[u8], &[u8]> =
    MultimapTableDefinition::new("by_subject");

/// Table for the prefix table: alias -> namespace IRI
const PREFIXES: TableDefinition<&str, &str> = TableDefinition::new("prefixes");

fn store_err(e: impl std::fmt::Display) -> AspectError {
    AspectError::StoreError(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, AspectError> {
    postcard::to_allocvec(value).map_err(|e| AspectError::SerializationError(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Statement, AspectError> {
    postcard::from_bytes(bytes).map_err(|e| AspectError::DeserializationError(e.to_string()))
}

/// A disk-backed statement store.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a statement database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AspectError> {
        let db = Database::create(path.as_ref()).map_err(|e| AspectError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(store_err)?;
            let _ = write_txn.open_table(STATEMENTS).map_err(store_err)?;
            let _ = write_txn.open_multimap_table(BY_SUBJECT).map_err(store_err)?;
            let _ = write_txn.open_table(PREFIXES).map_err(store_err)?;
            write_txn.commit().map_err(store_err)?;
        }

        Ok(Self { db })
    }

    /// Give back the pages freed by earlier writes, e.g. after [`Self::replace_all`].
    pub fn compact(&mut self) -> Result<(), AspectError> {
        self.db.compact().map_err(store_err)?;
        Ok(())
    }

    /// Replace the whole content with `statements` and `prefixes`.
    pub fn replace_all(
        &mut self,
        statements: &[Statement],
        prefixes: &BTreeMap<String, String>,
    ) -> Result<(), AspectError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write_txn.open_table(STATEMENTS).map_err(store_err)?;
            table.retain(|_, ()| false).map_err(store_err)?;
            let mut index = write_txn.open_multimap_table(BY_SUBJECT).map_err(store_err)?;
            let subjects: Vec<Vec<u8>> = index
                .iter()
                .map_err(store_err)?
                .map(|entry| entry.map(|(key, _)| key.value().to_vec()).map_err(store_err))
                .collect::<Result<_, _>>()?;
            for subject in subjects {
                index.remove_all(subject.as_slice()).map_err(store_err)?;
            }
            let mut prefix_table = write_txn.open_table(PREFIXES).map_err(store_err)?;
            prefix_table.retain(|_, _| false).map_err(store_err)?;
        }
        for statement in statements {
            Self::insert_in(&write_txn, statement)?;
        }
        {
            let mut prefix_table = write_txn.open_table(PREFIXES).map_err(store_err)?;
            for (alias, iri) in prefixes {
                prefix_table
                    .insert(alias.as_str(), iri.as_str())
                    .map_err(store_err)?;
            }
        }
        write_txn.commit().map_err(store_err)?;
        Ok(())
    }

    fn insert_in(write_txn: &WriteTransaction, statement: &Statement) -> Result<bool, AspectError> {
        let key = encode(statement)?;
        let subject = encode(&statement.subject)?;
        let mut table = write_txn.open_table(STATEMENTS).map_err(store_err)?;
        if table.get(key.as_slice()).map_err(store_err)?.is_some() {
            return Ok(false);
        }
        table.insert(key.as_slice(), ()).map_err(store_err)?;
        let mut index = write_txn.open_multimap_table(BY_SUBJECT).map_err(store_err)?;
        index
            .insert(subject.as_slice(), key.as_slice())
            .map_err(store_err)?;
        Ok(true)
    }

    fn remove_in(write_txn: &WriteTransaction, statement: &Statement) -> Result<bool, AspectError> {
        let key = encode(statement)?;
        let subject = encode(&statement.subject)?;
        let mut table = write_txn.open_table(STATEMENTS).map_err(store_err)?;
        if table.remove(key.as_slice()).map_err(store_err)?.is_none() {
            return Ok(false);
        }
        let mut index = write_txn.open_multimap_table(BY_SUBJECT).map_err(store_err)?;
        index
            .remove(subject.as_slice(), key.as_slice())
            .map_err(store_err)?;
        Ok(true)
    }

    fn set_prefix_in(
        write_txn: &WriteTransaction,
        alias: &str,
        iri: Option<&str>,
    ) -> Result<(), AspectError> {
        let mut table = write_txn.open_table(PREFIXES).map_err(store_err)?;
        match iri {
            Some(iri) => {
                table.insert(alias, iri).map_err(store_err)?;
            }
            None => {
                table.remove(alias).map_err(store_err)?;
            }
        }
        Ok(())
    }
}

fn matches(statement: &Statement, predicate: Option<&str>, object: Option<&Term>) -> bool {
    predicate.is_none_or(|p| statement.predicate == p)
        && object.is_none_or(|o| &statement.object == o)
}

impl StatementSource for RedbStore {
    fn query(
        &self,
        subject: Option<&Term>,
        predicate: Option<&str>,
        object: Option<&Term>,
    ) -> Result<Vec<Statement>, AspectError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let mut result = Vec::new();
        match subject {
            Some(subject) => {
                let key = encode(subject)?;
                let index = read_txn.open_multimap_table(BY_SUBJECT).map_err(store_err)?;
                for entry in index.get(key.as_slice()).map_err(store_err)? {
                    let statement = decode(entry.map_err(store_err)?.value())?;
                    if matches(&statement, predicate, object) {
                        result.push(statement);
                    }
                }
            }
            None => {
                let table = read_txn.open_table(STATEMENTS).map_err(store_err)?;
                for entry in table.iter().map_err(store_err)? {
                    let (key, _) = entry.map_err(store_err)?;
                    let statement = decode(key.value())?;
                    if matches(&statement, predicate, object) {
                        result.push(statement);
                    }
                }
            }
        }
        result.sort();
        Ok(result)
    }

    fn prefixes(&self) -> Result<BTreeMap<String, String>, AspectError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(PREFIXES).map_err(store_err)?;
        let mut prefixes = BTreeMap::new();
        for entry in table.iter().map_err(store_err)? {
            let (alias, iri) = entry.map_err(store_err)?;
            prefixes.insert(alias.value().to_string(), iri.value().to_string());
        }
        Ok(prefixes)
    }
}

impl StatementStore for RedbStore {
    fn insert(&mut self, statement: Statement) -> Result<bool, AspectError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        let inserted = Self::insert_in(&write_txn, &statement)?;
        write_txn.commit().map_err(store_err)?;
        Ok(inserted)
    }

    fn remove(&mut self, statement: &Statement) -> Result<bool, AspectError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        let removed = Self::remove_in(&write_txn, statement)?;
        write_txn.commit().map_err(store_err)?;
        Ok(removed)
    }

    fn set_prefix(&mut self, alias: &str, iri: &str) -> Result<(), AspectError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        Self::set_prefix_in(&write_txn, alias, Some(iri))?;
        write_txn.commit().map_err(store_err)?;
        Ok(())
    }

    fn apply_batch(&mut self, batch: &Batch) -> Result<(), AspectError> {
        // An error drops the transaction uncommitted, which aborts it.
        let write_txn = self.db.begin_write().map_err(store_err)?;
        for statement in &batch.remove {
            Self::remove_in(&write_txn, statement)?;
        }
        for statement in &batch.insert {
            Self::insert_in(&write_txn, statement)?;
        }
        for change in &batch.prefixes {
            Self::set_prefix_in(&write_txn, &change.alias, change.after.as_deref())?;
        }
        write_txn.commit().map_err(store_err)?;
        Ok(())
    }

    fn len(&self) -> Result<usize, AspectError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(STATEMENTS).map_err(store_err)?;
        Ok(table.len().map_err(store_err)? as usize)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryStore, PrefixChange};
    use tempfile::tempdir;

    fn st(s: &str, p: &str, o: Term) -> Statement {
        Statement::new(Term::iri(s), p, o)
    }

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        assert!(store.insert(st("urn:a", "urn:p", Term::iri("urn:b"))).expect("insert"));
        assert!(!store.insert(st("urn:a", "urn:p", Term::iri("urn:b"))).expect("insert"));
        store.insert(st("urn:a", "urn:q", Term::literal("x"))).expect("insert");
        store.insert(st("urn:z", "urn:p", Term::blank("b0"))).expect("insert");
        assert_eq!(store.len().expect("len"), 3);

        let by_subject = store.query(Some(&Term::iri("urn:a")), None, None).expect("query");
        assert_eq!(by_subject.len(), 2);
        let exact = store
            .objects(&Term::iri("urn:a"), "urn:q")
            .expect("objects");
        assert_eq!(exact, vec![Term::literal("x")]);

        assert!(store.remove(&st("urn:a", "urn:q", Term::literal("x"))).expect("remove"));
        assert_eq!(store.query(Some(&Term::iri("urn:a")), None, None).expect("query").len(), 1);
    }

    #[test]
    fn answers_like_memory_store() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let mut memory = MemoryStore::new();
        for (s, p, o) in [
            ("urn:c", "urn:p", "urn:x"),
            ("urn:a", "urn:q", "urn:y"),
            ("urn:b", "urn:p", "urn:z"),
            ("urn:a", "urn:p", "urn:x"),
        ] {
            store.insert(st(s, p, Term::iri(o))).expect("insert");
            memory.add(st(s, p, Term::iri(o)));
        }
        assert_eq!(store.statements().expect("all"), memory.statements().expect("all"));
        assert_eq!(
            store.query(None, Some("urn:p"), None).expect("query"),
            memory.query(None, Some("urn:p"), None).expect("query")
        );
    }

    #[test]
    fn persistence() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("test.redb");
        {
            let mut store = RedbStore::open(&path).expect("open db");
            store.insert(st("urn:a", "urn:p", Term::iri("urn:b"))).expect("insert");
            store.set_prefix(":", "urn:samm:org.acme:1.0.0#").expect("prefix");
        }
        let store = RedbStore::open(&path).expect("reopen db");
        assert_eq!(store.len().expect("len"), 1);
        assert_eq!(
            store.prefixes().expect("prefixes").get(":").map(String::as_str),
            Some("urn:samm:org.acme:1.0.0#")
        );
    }

    #[test]
    fn batch_and_inverse() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store.insert(st("urn:a", "urn:p", Term::iri("urn:b"))).expect("insert");
        store.set_prefix(":", "urn:old#").expect("prefix");
        let before = store.statements().expect("all");

        let batch = Batch {
            remove: vec![st("urn:a", "urn:p", Term::iri("urn:b"))],
            insert: vec![st("urn:n", "urn:p", Term::iri("urn:b"))],
            prefixes: vec![PrefixChange {
                alias: ":".into(),
                before: Some("urn:old#".into()),
                after: Some("urn:new#".into()),
            }],
        };
        store.apply_batch(&batch).expect("apply");
        assert!(!store.has_subject(&Term::iri("urn:a")).expect("has"));
        assert!(store.has_subject(&Term::iri("urn:n")).expect("has"));

        store.apply_batch(&batch.inverse()).expect("undo");
        assert_eq!(store.statements().expect("all"), before);
        assert_eq!(
            store.prefixes().expect("prefixes").get(":").map(String::as_str),
            Some("urn:old#")
        );
    }

    #[test]
    fn replace_all_drops_previous_content() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store.insert(st("urn:a", "urn:p", Term::iri("urn:b"))).expect("insert");
        store.set_prefix("old", "urn:old#").expect("prefix");

        let prefixes = BTreeMap::from([("new".to_string(), "urn:new#".to_string())]);
        store
            .replace_all(&[st("urn:n", "urn:p", Term::iri("urn:b"))], &prefixes)
            .expect("replace");
        assert_eq!(store.len().expect("len"), 1);
        assert!(!store.has_subject(&Term::iri("urn:a")).expect("has"));
        assert_eq!(store.prefixes().expect("prefixes"), prefixes);

        store.compact().expect("compact");
        assert_eq!(store.len().expect("len"), 1);
        assert!(store.has_subject(&Term::iri("urn:n")).expect("has"));
    }
}
