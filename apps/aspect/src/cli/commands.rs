//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{AppConfig, Backend, StorageConfig};
use crate::document::StatementDocument;
use aspect_core::element::ConstraintTag;
use aspect_core::{
    AspectError, ElementTag, FileKey, LoadReport, MemoryStore, ModelConfig, Namespace, RedbStore,
    SemanticElement, Session, StatementSource, StatementStore, StorageBackend, store_from_bytes,
    store_to_bytes,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Resolved configuration for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub config: AppConfig,
    pub json_mode: bool,
}

impl Settings {
    fn model(&self) -> &ModelConfig {
        &self.config.model
    }

    fn storage(&self) -> &StorageConfig {
        &self.config.storage
    }
}

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a statement document (100 MB).
const MAX_DOCUMENT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size of a snapshot database file (500 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Extension given to file keys inferred from a path.
const MODEL_FILE_EXTENSION: &str = "ttl";

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), AspectError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| AspectError::IoError(format!("Cannot read file metadata: {e}")))?;

    if metadata.len() > max_size {
        return Err(AspectError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, AspectError> {
    let canonical = path.canonicalize().map_err(|e| {
        AspectError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(AspectError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, AspectError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        AspectError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(AspectError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| AspectError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(output: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(output).unwrap_or_default()
    );
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Instantiate a document and print a summary.
pub fn cmd_load(settings: &Settings, file: &Path, file_key: Option<&str>) -> Result<(), AspectError> {
    let (session, report) = load_document(settings, file, file_key)?;
    let kinds = kind_counts(&session);

    if settings.json_mode {
        let output = serde_json::json!({
            "file": report.file.to_string(),
            "elements": report.elements,
            "total_elements": session.all().count(),
            "deferred": report.deferred,
            "errors": report.error_count(),
            "diagnostics": report.diagnostics.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "kinds": kinds,
        });
        print_json(&output);
        return Ok(());
    }

    println!("Aspect Model Load");
    println!("=================");
    println!("File:        {}", report.file);
    println!("Elements:    {}", report.elements);
    println!("Deferred:    {}", report.deferred);
    print_diagnostics(&report);
    println!();
    println!("Kinds:");
    for (kind, count) in &kinds {
        println!("  {kind:<20} {count}");
    }

    Ok(())
}

// =============================================================================
// ELEMENTS COMMAND
// =============================================================================

/// List the elements of a document, optionally of one kind.
pub fn cmd_elements(
    settings: &Settings,
    file: &Path,
    file_key: Option<&str>,
    kind: Option<&str>,
) -> Result<(), AspectError> {
    let (session, _) = load_document(settings, file, file_key)?;
    let elements = select_elements(&session, kind)?;

    if settings.json_mode {
        let output: Vec<serde_json::Value> = elements
            .iter()
            .map(|el| {
                serde_json::json!({
                    "urn": el.urn,
                    "name": el.name,
                    "kind": kind_name(el.tag()),
                    "external": el.external,
                    "predefined": el.predefined,
                    "anonymous": el.anonymous,
                    "parents": el.parents.len(),
                    "children": el.children.len(),
                })
            })
            .collect();
        print_json(&serde_json::Value::Array(output));
        return Ok(());
    }

    for el in &elements {
        let mut flags = Vec::new();
        if el.external {
            flags.push("external");
        }
        if el.predefined {
            flags.push("predefined");
        }
        if el.anonymous {
            flags.push("anonymous");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("{:<20} {}{}", kind_name(el.tag()), el.urn, flags);
    }
    println!("{} elements", elements.len());

    Ok(())
}

// =============================================================================
// REWRITE COMMAND
// =============================================================================

/// Move a document to another namespace and write the result.
pub fn cmd_rewrite(
    settings: &Settings,
    file: &Path,
    file_key: Option<&str>,
    from: &str,
    to: &str,
    output: &Path,
) -> Result<(), AspectError> {
    let validated_output = validate_output_path(output)?;
    let from = Namespace::parse(from)?;
    let to = Namespace::parse(to)?;

    let (mut session, report) = load_document(settings, file, file_key)?;
    let rewrite = session.rewrite_namespace(&from, &to)?;

    let moved = if report.file.namespace == from {
        FileKey::new(to.clone(), report.file.file_name.clone())
    } else {
        report.file.clone()
    };
    let store = session
        .store(&moved)
        .ok_or_else(|| AspectError::FileNotOpen(moved.to_string()))?;
    let data = StatementDocument::from_source(store)?.to_json_pretty()?;
    std::fs::write(&validated_output, &data)
        .map_err(|e| AspectError::IoError(format!("Write file: {e}")))?;

    if settings.json_mode {
        let output = serde_json::json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "statements": rewrite.statements,
            "elements": rewrite.elements,
            "files": rewrite.files,
            "output": validated_output.to_string_lossy(),
        });
        print_json(&output);
        return Ok(());
    }

    println!("Rewrote {from} -> {to}");
    println!("  Statements: {}", rewrite.statements);
    println!("  Elements:   {}", rewrite.elements);
    println!("Wrote {} bytes to {:?}", data.len(), validated_output);

    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Persist a document into the configured backend.
pub fn cmd_import(settings: &Settings, file: &Path, file_key: Option<&str>) -> Result<(), AspectError> {
    let store = read_document(file)?;
    let key = resolve_file_key(file_key, file, &store, settings.model())?;

    // Instantiate once so a broken document is reported before it is stored.
    let mut session = Session::with_config(settings.model().clone());
    let report = session.open_file(key, StorageBackend::InMemory(store.clone()))?;

    let storage = settings.storage();
    let statements = store.statements()?;
    match storage.backend {
        Backend::File => {
            let data = store_to_bytes(&store)?;
            std::fs::write(&storage.database, &data)
                .map_err(|e| AspectError::IoError(format!("Write db: {e}")))?;
        }
        Backend::Redb => {
            let mut db = RedbStore::open(&storage.database)?;
            db.replace_all(&statements, &store.prefixes()?)?;
            db.compact()?;
        }
    }
    tracing::info!(
        database = %storage.database.display(),
        backend = %storage.backend,
        statements = statements.len(),
        "document imported"
    );

    if settings.json_mode {
        let output = serde_json::json!({
            "database": storage.database.to_string_lossy(),
            "backend": storage.backend.to_string(),
            "statements": statements.len(),
            "elements": report.elements,
            "errors": report.error_count(),
        });
        print_json(&output);
        return Ok(());
    }

    println!(
        "Imported {} statements into {:?} ({})",
        statements.len(),
        storage.database,
        storage.backend
    );
    print_diagnostics(&report);

    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Summarize the persisted store.
pub fn cmd_status(settings: &Settings) -> Result<(), AspectError> {
    let storage = settings.storage();
    let backend = open_persisted(storage)?;
    let statements = backend.statements()?;
    let prefixes = backend.prefixes()?;

    let mut session = Session::with_config(settings.model().clone());
    let report = if statements.is_empty() {
        None
    } else {
        let key = resolve_file_key(None, &storage.database, &backend, settings.model())?;
        Some(session.open_file(key, backend)?)
    };

    if settings.json_mode {
        let output = serde_json::json!({
            "database": storage.database.to_string_lossy(),
            "backend": storage.backend.to_string(),
            "statements": statements.len(),
            "prefixes": prefixes.len(),
            "file": report.as_ref().map(|r| r.file.to_string()),
            "elements": session.all().count(),
            "errors": report.as_ref().map_or(0, LoadReport::error_count),
        });
        print_json(&output);
        return Ok(());
    }

    println!("Aspect Store Status");
    println!("===================");
    println!("Database:   {:?}", storage.database);
    println!("Backend:    {}", storage.backend);
    println!();
    println!("Statements: {}", statements.len());
    println!("Prefixes:   {}", prefixes.len());
    match &report {
        Some(report) => {
            println!("File:       {}", report.file);
            println!("Elements:   {}", session.all().count());
            print_diagnostics(report);
        }
        None => println!("Store is empty"),
    }

    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Read and parse a statement document.
pub fn read_document(file: &Path) -> Result<MemoryStore, AspectError> {
    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_DOCUMENT_FILE_SIZE)?;
    let contents = std::fs::read(&validated_path)
        .map_err(|e| AspectError::IoError(format!("Read file: {e}")))?;
    tracing::info!(path = %validated_path.display(), "reading statement document");
    StatementDocument::parse(&contents)?.to_store()
}

/// Load a document into a fresh session.
pub fn load_document(
    settings: &Settings,
    file: &Path,
    file_key: Option<&str>,
) -> Result<(Session, LoadReport), AspectError> {
    let store = read_document(file)?;
    let key = resolve_file_key(file_key, file, &store, settings.model())?;
    let mut session = Session::with_config(settings.model().clone());
    let report = session.open_file(key, StorageBackend::InMemory(store))?;
    Ok((session, report))
}

/// The explicit file key, or one inferred from the first user identifier
/// in `source` and the stem of `path`.
pub fn resolve_file_key<S: StatementSource + ?Sized>(
    explicit: Option<&str>,
    path: &Path,
    source: &S,
    config: &ModelConfig,
) -> Result<FileKey, AspectError> {
    if let Some(text) = explicit {
        return FileKey::parse(text);
    }
    let namespace = source
        .query(None, None, None)?
        .iter()
        .filter_map(|s| s.subject.as_iri())
        .filter(|iri| !config.is_predefined(iri))
        .find_map(|iri| Namespace::of_urn(iri, &config.urn_scheme))
        .ok_or_else(|| {
            AspectError::InvalidNamespace(format!(
                "cannot infer the namespace of {}; pass --file-key",
                path.display()
            ))
        })?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AspectError::InvalidIdentifier(path.display().to_string()))?;
    Ok(FileKey::new(namespace, format!("{stem}.{MODEL_FILE_EXTENSION}")))
}

/// Open the persisted store of the configured backend.
pub fn open_persisted(storage: &StorageConfig) -> Result<StorageBackend, AspectError> {
    match storage.backend {
        Backend::Redb => StorageBackend::redb(&storage.database),
        Backend::File => {
            if !storage.database.exists() {
                return Ok(StorageBackend::default());
            }
            validate_file_size(&storage.database, MAX_SNAPSHOT_FILE_SIZE)?;
            let data = std::fs::read(&storage.database)
                .map_err(|e| AspectError::IoError(format!("Read db: {e}")))?;
            Ok(StorageBackend::InMemory(store_from_bytes(&data)?))
        }
    }
}

/// Elements of the requested kind.
pub fn select_elements<'s>(
    session: &'s Session,
    kind: Option<&str>,
) -> Result<Vec<&'s SemanticElement>, AspectError> {
    let elements = match kind.unwrap_or("all") {
        "all" => session.all().map(|(_, el)| el).collect(),
        "aspect" => session
            .all()
            .map(|(_, el)| el)
            .filter(|el| el.tag() == ElementTag::Aspect)
            .collect(),
        "entity" => session.entities(),
        "abstract-entity" => session.abstract_entities(),
        "property" => session.properties(),
        "abstract-property" => session.abstract_properties(),
        "characteristic" => session.characteristics(),
        "unit" => session.units(),
        "event" => session.events(),
        "entity-value" => session.entity_values(),
        other => {
            return Err(AspectError::InvalidIdentifier(format!(
                "Unknown kind: {other}. Use: all, aspect, entity, abstract-entity, property, \
                 abstract-property, characteristic, unit, event, entity-value"
            )));
        }
    };
    Ok(elements)
}

/// Display name of an element kind.
pub fn kind_name(tag: ElementTag) -> String {
    match tag {
        ElementTag::Characteristic(c) => format!("{c:?}"),
        ElementTag::Constraint(ConstraintTag::Constraint) => "Constraint".to_string(),
        ElementTag::Constraint(c) => format!("{c:?}Constraint"),
        other => format!("{other:?}"),
    }
}

fn kind_counts(session: &Session) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for (_, el) in session.all() {
        *counts.entry(kind_name(el.tag())).or_insert(0usize) += 1;
    }
    counts
}

fn print_diagnostics(report: &LoadReport) {
    println!(
        "Diagnostics: {} ({} errors)",
        report.diagnostics.len(),
        report.error_count()
    );
    for diagnostic in &report.diagnostics {
        println!("  - {diagnostic}");
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aspect_core::{Statement, Term};

    #[test]
    fn file_key_inferred_from_first_user_subject() {
        let store = MemoryStore::from_parts(
            [
                Statement::new(
                    Term::iri("urn:samm:org.eclipse.esmf.samm:characteristic:2.1.0#Text"),
                    "urn:p",
                    Term::literal("x"),
                ),
                Statement::new(
                    Term::iri("urn:samm:org.acme:1.0.0#Fleet"),
                    "urn:p",
                    Term::literal("y"),
                ),
            ],
            [],
        );
        let key = resolve_file_key(None, Path::new("models/Fleet.json"), &store, &ModelConfig::default())
            .expect("key");
        assert_eq!(key.to_string(), "org.acme:1.0.0:Fleet.ttl");

        let explicit = resolve_file_key(
            Some("org.other:2.0.0:Other.ttl"),
            Path::new("x.json"),
            &store,
            &ModelConfig::default(),
        )
        .expect("explicit");
        assert_eq!(explicit.namespace, Namespace::new("org.other", "2.0.0"));
    }

    #[test]
    fn file_key_needs_a_namespace() {
        let store = MemoryStore::new();
        assert!(
            resolve_file_key(None, Path::new("x.json"), &store, &ModelConfig::default()).is_err()
        );
    }

    #[test]
    fn kind_names() {
        use aspect_core::element::CharacteristicTag;
        assert_eq!(kind_name(ElementTag::Entity), "Entity");
        assert_eq!(kind_name(ElementTag::Characteristic(CharacteristicTag::Trait)), "Trait");
        assert_eq!(kind_name(ElementTag::Constraint(ConstraintTag::Range)), "RangeConstraint");
    }

    #[test]
    fn missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StorageConfig {
            backend: Backend::File,
            database: dir.path().join("none.db"),
        };
        let backend = open_persisted(&storage).expect("open");
        assert!(backend.statements().expect("statements").is_empty());
    }
}
