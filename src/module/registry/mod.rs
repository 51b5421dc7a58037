//! Module catalog and dependency graph
//!
//! Handles catalog seeds, directory discovery, and dependency graph construction.

pub mod dependencies;
pub mod discovery;
pub mod error;
pub mod manifest;

pub use dependencies::DependencyGraph;
pub use discovery::CatalogDiscovery;
pub use error::CatalogError;
pub use manifest::{ModuleCatalog, ModuleDefinition};
