//! Module definitions and catalog seeds
//!
//! Handles parsing catalog seed files (TOML or JSON) and single-module
//! `module.toml` manifests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::module::registry::error::CatalogError;

/// Static definition of a feature module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    /// Stable, human-readable key (unique, immutable)
    pub key: String,
    /// Display name
    pub name: String,
    /// Category tag (e.g. "finance", "clinical")
    #[serde(default)]
    pub category: String,
    /// Mandatory modules (e.g. the home dashboard) set this to false
    #[serde(default = "default_true", alias = "canDisable")]
    pub can_disable: bool,
    /// Keys that must be active for this module to be active
    #[serde(default, alias = "dependsOn")]
    pub depends_on: BTreeSet<String>,
    /// Optional human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ModuleDefinition {
    /// Create a disableable definition with no dependencies
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            category: String::new(),
            can_disable: true,
            depends_on: BTreeSet::new(),
            description: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Mark the module as mandatory (cannot be disabled)
    pub fn mandatory(mut self) -> Self {
        self.can_disable = false;
        self
    }

    /// Load a single-module manifest (`module.toml`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&contents).map_err(|e| CatalogError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// A versioned set of module definitions
///
/// The catalog is only a list; consistency (unique keys, known
/// dependencies, no cycles) is enforced when a `DependencyGraph` is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCatalog {
    /// Operator-assigned revision; reloads must not go backwards
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
}

impl ModuleCatalog {
    pub fn new(revision: u64, modules: Vec<ModuleDefinition>) -> Self {
        Self { revision, modules }
    }

    /// Parse a TOML seed (`revision = N` plus `[[modules]]` tables)
    pub fn from_toml_str(contents: &str) -> Result<Self, CatalogError> {
        toml::from_str(contents).map_err(|e| CatalogError::Parse {
            path: "<toml>".to_string(),
            message: e.to_string(),
        })
    }

    /// Parse a JSON seed (`{"revision": N, "modules": [...]}`)
    pub fn from_json_str(contents: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(contents).map_err(|e| CatalogError::Parse {
            path: "<json>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load a seed file; `.json` files are parsed as JSON, anything else as TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        };

        parsed.map_err(|e| match e {
            CatalogError::Parse { message, .. } => CatalogError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Look up a definition by key
    pub fn get(&self, key: &str) -> Option<&ModuleDefinition> {
        self.modules.iter().find(|m| m.key == key)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Serialize back to the TOML seed format
    pub fn to_toml_string(&self) -> Result<String, CatalogError> {
        toml::to_string_pretty(self).map_err(|e| CatalogError::Parse {
            path: "<toml>".to_string(),
            message: e.to_string(),
        })
    }
}
