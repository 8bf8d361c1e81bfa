//! # Innate Primitives
//!
//! Hardcoded constants for the aspect-core linker: the fixed RDF/XSD
//! vocabulary, persistence header bytes and the computational bounds every
//! walk respects.
//!
//! Version-dependent meta-model IRIs live in [`crate::vocabulary`].

// =============================================================================
// RDF / XSD VOCABULARY
// =============================================================================

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
pub const XSD_ANY_URI: &str = "http://www.w3.org/2001/XMLSchema#anyURI";
pub const XSD_NON_NEGATIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#nonNegativeInteger";
pub const XSD_POSITIVE_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#positiveInteger";

/// Canonical numeric type for length bounds.
pub const LENGTH_BOUND_TYPE: &str = XSD_NON_NEGATIVE_INTEGER;

/// Canonical numeric type for fixed-point scale and integer digits.
pub const FIXED_POINT_TYPE: &str = XSD_POSITIVE_INTEGER;

/// Fallback numeric type for range bounds whose characteristic has no scalar type.
pub const RANGE_BOUND_TYPE: &str = XSD_DECIMAL;

// =============================================================================
// IDENTIFIER CONVENTION DEFAULTS
// =============================================================================

/// Default identifier scheme: `<scheme>:<namespace>:<version>#<ElementName>`.
pub const DEFAULT_URN_SCHEME: &str = "urn:samm";

/// Default reserved prefix of predefined (vocabulary-supplied) elements.
pub const DEFAULT_PREDEFINED_PREFIX: &str = "urn:samm:org.eclipse.esmf.samm:";

/// Default meta-model version.
pub const DEFAULT_META_MODEL_VERSION: &str = "2.1.0";

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Magic bytes for the store snapshot header.
///
/// - File Header = Magic Bytes ("AMDL") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"AMDL";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// COMPUTATIONAL BOUNDS
// =============================================================================

/// Default upper bound on the number of items a single list walk returns.
pub const DEFAULT_MAX_LIST_LENGTH: usize = 10_000;

/// Upper bound on deferred work items drained during one instantiation.
///
/// Every item either links an existing element or creates a new one, so a
/// well-formed load stays far below this; hitting it means a store that keeps
/// growing under the pipeline.
pub const MAX_DEFERRED_ITEMS: usize = 1_000_000;

/// Upper bound on `extends` hops followed during cycle detection.
pub const MAX_INHERITANCE_DEPTH: usize = 256;

/// Blank-node nesting described by a content signature; deeper nodes are
/// written as `[..]`.
pub const MAX_SIGNATURE_DEPTH: usize = 32;
