//! Operation registry: which operations this server executes, and where
//! their outputs come from

pub mod feed;

pub use feed::{parse_feed, OperationEntry, Provenance, ResultMapping};

use crate::error::{ChoreoError, Result};
use slog::{info, Logger};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Immutable set of supported operations with their result mappings
///
/// Built once at startup and shared behind an `Arc`; there is no way to
/// mutate it after construction.
#[derive(Clone, Debug, Default)]
pub struct OperationRegistry {
    /// Fully qualified names (`<kind>::<member>`)
    supported: HashSet<String>,
    /// Explicit result mappings by fully qualified name
    provenance: HashMap<String, ResultMapping>,
}

impl OperationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from parsed feed entries
    pub fn from_entries(entries: impl IntoIterator<Item = OperationEntry>) -> Self {
        let mut supported = HashSet::new();
        let mut provenance = HashMap::new();
        for entry in entries {
            let name = entry.operation_name();
            if let Some(mapping) = entry.mapping {
                provenance.insert(name.clone(), mapping);
            }
            supported.insert(name);
        }
        Self {
            supported,
            provenance,
        }
    }

    /// Build a registry from feed text
    pub fn from_feed(content: &str, logger: &Logger) -> Self {
        let registry = Self::from_entries(parse_feed(content, logger));
        info!(logger, "Operation registry loaded"; "operations" => registry.len());
        registry
    }

    /// Build a registry from a feed file
    pub fn from_file(path: impl AsRef<Path>, logger: &Logger) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChoreoError::Config(format!("cannot read operation feed {}: {}", path.display(), e))
        })?;
        Ok(Self::from_feed(&content, logger))
    }

    /// Check if the fully qualified operation is supported
    pub fn is_supported(&self, name: &str) -> bool {
        self.supported.contains(name)
    }

    /// Result mapping of the operation, or the implicit `{out=return}`
    pub fn provenance_of(&self, name: &str) -> ResultMapping {
        self.provenance
            .get(name)
            .cloned()
            .unwrap_or_else(ResultMapping::implicit)
    }

    /// Whether the operation declares an explicit result mapping
    pub fn has_explicit_mapping(&self, name: &str) -> bool {
        self.provenance.contains_key(name)
    }

    /// Get the number of supported operations
    pub fn len(&self) -> usize {
        self.supported.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.supported.is_empty()
    }

    /// List all supported operation names
    pub fn list_operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.supported.iter().cloned().collect();
        names.sort();
        names
    }
}
