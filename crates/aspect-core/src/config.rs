//! # Model Configuration
//!
//! Settings that shape how identifiers and vocabulary are interpreted.
//! The binary deserializes this from the `[model]` table of its TOML file;
//! library callers usually take `ModelConfig::default()`.

use crate::primitives::{
    DEFAULT_MAX_LIST_LENGTH, DEFAULT_META_MODEL_VERSION, DEFAULT_PREDEFINED_PREFIX,
    DEFAULT_URN_SCHEME,
};
use crate::vocabulary::Vocabulary;
use serde::{Deserialize, Serialize};

/// Configuration of a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Meta-model version selecting the vocabulary IRIs.
    pub meta_model_version: String,
    /// Identifier prefix reserved for predefined elements.
    pub predefined_prefix: String,
    /// Scheme used for element identifiers.
    pub urn_scheme: String,
    /// Maximum number of items a single list walk may return.
    pub max_list_length: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            meta_model_version: DEFAULT_META_MODEL_VERSION.to_string(),
            predefined_prefix: DEFAULT_PREDEFINED_PREFIX.to_string(),
            urn_scheme: DEFAULT_URN_SCHEME.to_string(),
            max_list_length: DEFAULT_MAX_LIST_LENGTH,
        }
    }
}

impl ModelConfig {
    /// Build the vocabulary for this configuration.
    #[must_use]
    pub fn vocabulary(&self) -> Vocabulary {
        Vocabulary::new(&self.predefined_prefix, &self.meta_model_version)
    }

    /// Whether an identifier lies under the reserved predefined prefix.
    #[must_use]
    pub fn is_predefined(&self, urn: &str) -> bool {
        urn.starts_with(&self.predefined_prefix)
            || urn.starts_with(crate::primitives::XSD_NS)
            || urn.starts_with(crate::primitives::RDF_NS)
    }
}
