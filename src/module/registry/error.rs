//! Catalog construction errors
//!
//! All of these are fatal: an engine refuses to serve with a catalog that
//! produced one.

use thiserror::Error;

/// Errors raised while loading or validating a module catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Module {module} depends on unknown module {dependency}")]
    UnknownDependency { module: String, dependency: String },

    #[error("Duplicate module key: {0}")]
    DuplicateKey(String),

    #[error("Module {0} depends on itself")]
    SelfDependency(String),

    #[error("Invalid module definition {key}: {}", .errors.join("; "))]
    InvalidDefinition { key: String, errors: Vec<String> },

    #[error("Catalog revision {offered} is older than the loaded revision {current}")]
    StaleRevision { current: u64, offered: u64 },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}
