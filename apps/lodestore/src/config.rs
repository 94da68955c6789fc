//! # Configuration
//!
//! Refactoring and similarity tables read from `lodestore.toml`.
//!
//! ```toml
//! [refactoring]
//! entries = [
//!     { source = "Customer#surname", target = "Customer#last_name" },
//!     { source = "Customer#fax" },
//! ]
//!
//! [similarity]
//! threshold = 0.75
//!
//! [[similarity.types]]
//! source = "u32"
//! target = "u64"
//! score = 0.9
//! ```
//!
//! An entry without `target` marks a deleted type or member.

use lodestore_core::primitives::DEFAULT_SIMILARITY_THRESHOLD;
use lodestore_core::{LodestoreError, RefactoringMapping, TypeSimilarity};
use serde::Deserialize;
use std::path::Path;

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LodestoreConfig {
    #[serde(default)]
    pub refactoring: RefactoringConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefactoringConfig {
    #[serde(default)]
    pub entries: Vec<RefactoringEntry>,
}

/// One `source -> target` entry; no target means deletion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefactoringEntry {
    pub source: String,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimilarityConfig {
    /// Minimum score for a similarity match.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default)]
    pub types: Vec<TypeScore>,
}

fn default_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            types: Vec::new(),
        }
    }
}

/// Similarity of two member type names.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeScore {
    pub source: String,
    pub target: String,
    pub score: f64,
}

impl LodestoreConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, LodestoreError> {
        toml::from_str(content).map_err(|e| LodestoreError::ConfigError(e.to_string()))
    }

    /// Load the configuration at `path`, or defaults if no file exists there.
    pub fn load(path: &Path) -> Result<Self, LodestoreError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| LodestoreError::ConfigError(format!("Cannot read file metadata: {e}")))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(LodestoreError::ConfigError(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LodestoreError::ConfigError(format!("Read {}: {e}", path.display())))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(
            path = %path.display(),
            entries = config.refactoring.entries.len(),
            type_scores = config.similarity.types.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// The refactoring table described by `[refactoring]`.
    #[must_use]
    pub fn refactoring_mapping(&self) -> RefactoringMapping {
        self.refactoring
            .entries
            .iter()
            .map(|entry| (entry.source.clone(), entry.target.clone()))
            .collect()
    }

    /// The type similarity table described by `[[similarity.types]]`.
    #[must_use]
    pub fn type_similarity(&self) -> TypeSimilarity {
        let mut table = TypeSimilarity::new();
        for score in &self.similarity.types {
            table.insert(&score.source, &score.target, score.score);
        }
        table
    }
}

// =============================================================================
// TESTS
// =============================================================================
