//! # Persistence Format
//!
//! Binary snapshot of a statement store.
//!
//! Format: Header (5 bytes) + postcard-serialized snapshot.
//! - 4 bytes: Magic ("AMDL")
//! - 1 byte: Version
//!
//! Sizes and the header are validated before the payload is deserialized.

use crate::source::{MemoryStore, StatementSource};
use crate::{AspectError, Statement, primitives};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed snapshot size.
///
/// Checked before deserialization so corrupted input cannot force a huge
/// allocation.
pub const MAX_SNAPSHOT_SIZE: usize = 500 * 1024 * 1024;

/// Size of the header, and so the smallest possible snapshot.
const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// Leading 5 bytes of every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Header for the format version this build writes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Reject foreign files and other format versions.
    pub fn validate(&self) -> Result<(), AspectError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(AspectError::DeserializationError(
                "Not a snapshot: bad magic".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(AspectError::DeserializationError(format!(
                "Snapshot version {} is not supported (this build reads {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [m0, m1, m2, m3] = self.magic;
        [m0, m1, m2, m3, self.version]
    }

    /// Split the header off `bytes`. Does not validate it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AspectError> {
        let Some((head, _)) = bytes.split_first_chunk::<HEADER_SIZE>() else {
            return Err(AspectError::DeserializationError(
                "Snapshot header truncated".to_string(),
            ));
        };
        let [m0, m1, m2, m3, version] = *head;
        Ok(Self {
            magic: [m0, m1, m2, m3],
            version,
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Serializable content of a statement store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Statements in order.
    pub statements: Vec<Statement>,
    /// Prefix table in alias order.
    pub prefixes: BTreeMap<String, String>,
}

impl StoreSnapshot {
    /// Capture any statement source.
    pub fn capture<S: StatementSource + ?Sized>(source: &S) -> Result<Self, AspectError> {
        Ok(Self {
            statements: source.query(None, None, None)?,
            prefixes: source.prefixes()?,
        })
    }
}

impl From<StoreSnapshot> for MemoryStore {
    fn from(snapshot: StoreSnapshot) -> Self {
        MemoryStore::from_parts(snapshot.statements, snapshot.prefixes)
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Encode the content of `source` as a snapshot. Performs no I/O.
pub fn store_to_bytes<S: StatementSource + ?Sized>(source: &S) -> Result<Vec<u8>, AspectError> {
    let header = PersistenceHeader::new();
    let snapshot = StoreSnapshot::capture(source)?;
    let payload = postcard::to_stdvec(&snapshot)
        .map_err(|e| AspectError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Decode a snapshot after checking its size and header.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<StoreSnapshot, AspectError> {
    if bytes.len() < HEADER_SIZE {
        return Err(AspectError::DeserializationError(
            format!("Snapshot of {} bytes is shorter than its header", bytes.len()),
        ));
    }
    if bytes.len() > MAX_SNAPSHOT_SIZE {
        return Err(AspectError::DeserializationError(format!(
            "Snapshot of {} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_SIZE..).unwrap_or_default();
    postcard::from_bytes(payload).map_err(|e| {
        AspectError::DeserializationError(format!("Failed to deserialize snapshot: {e}"))
    })
}

/// Deserialize a snapshot straight into an in-memory store.
pub fn store_from_bytes(bytes: &[u8]) -> Result<MemoryStore, AspectError> {
    snapshot_from_bytes(bytes).map(MemoryStore::from)
}

// =============================================================================
// TESTS
// =============================================================================
