//! Catalog discovery
//!
//! Builds a catalog from a directory: an optional `catalog.toml` at the root
//! (revision and any inline `[[modules]]`) plus one `module.toml` per
//! subdirectory. Unlike a seed file, nothing is skipped: any unreadable or
//! malformed manifest rejects the whole directory.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::module::registry::error::CatalogError;
use crate::module::registry::manifest::{ModuleCatalog, ModuleDefinition};

/// Catalog directory scanner
pub struct CatalogDiscovery {
    /// Base directory to scan
    catalog_dir: PathBuf,
}

impl CatalogDiscovery {
    /// Create a new scanner for `catalog_dir`
    pub fn new<P: AsRef<Path>>(catalog_dir: P) -> Self {
        Self {
            catalog_dir: catalog_dir.as_ref().to_path_buf(),
        }
    }

    /// Load a catalog from a seed file or a manifest directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ModuleCatalog, CatalogError> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::new(path).discover()
        } else {
            ModuleCatalog::from_file(path)
        }
    }

    /// Discover all module definitions in the directory
    pub fn discover(&self) -> Result<ModuleCatalog, CatalogError> {
        info!("Discovering module definitions in {:?}", self.catalog_dir);

        let io_error = |path: &Path| {
            let path = path.display().to_string();
            move |source: std::io::Error| CatalogError::Io { path, source }
        };

        let root_manifest = self.catalog_dir.join("catalog.toml");
        let mut catalog = if root_manifest.is_file() {
            ModuleCatalog::from_file(&root_manifest)?
        } else {
            ModuleCatalog::default()
        };

        let entries = fs::read_dir(&self.catalog_dir).map_err(io_error(&self.catalog_dir))?;

        let mut module_dirs = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_error(&self.catalog_dir))?.path();
            if path.is_dir() {
                module_dirs.push(path);
            }
        }
        // Directory iteration order is platform dependent
        module_dirs.sort();

        for dir in module_dirs {
            let manifest_path = dir.join("module.toml");
            if !manifest_path.exists() {
                debug!("No module.toml found in {:?}, skipping", dir);
                continue;
            }

            let definition = ModuleDefinition::from_file(&manifest_path)?;
            debug!("Discovered module {} in {:?}", definition.key, dir);
            catalog.modules.push(definition);
        }

        info!(
            "Discovered {} module definitions (revision {})",
            catalog.len(),
            catalog.revision
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_module(root: &Path, dir: &str, contents: &str) {
        let module_dir = root.join(dir);
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(module_dir.join("module.toml"), contents).unwrap();
    }

    #[test]
    fn test_discover_root_and_module_manifests() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("catalog.toml"),
            "revision = 7\n\n[[modules]]\nkey = \"dashboard\"\nname = \"Dashboard\"\ncan_disable = false\n",
        )
        .unwrap();
        write_module(temp.path(), "patients", "key = \"patients\"\nname = \"Patients\"\n");
        write_module(
            temp.path(),
            "billing",
            "key = \"billing\"\nname = \"Billing\"\ndepends_on = [\"patients\"]\n",
        );
        fs::create_dir_all(temp.path().join("assets")).unwrap();

        let catalog = CatalogDiscovery::new(temp.path()).discover().unwrap();
        assert_eq!(catalog.revision, 7);
        let keys: Vec<_> = catalog.modules.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["dashboard", "billing", "patients"]);
    }

    #[test]
    fn test_malformed_manifest_rejects_directory() {
        let temp = tempfile::tempdir().unwrap();
        write_module(temp.path(), "crm", "name = \"CRM\"\n");

        let result = CatalogDiscovery::new(temp.path()).discover();
        assert!(matches!(result, Err(CatalogError::Parse { .. })));
    }

    #[test]
    fn test_load_accepts_file_or_directory() {
        let temp = tempfile::tempdir().unwrap();
        write_module(temp.path(), "crm", "key = \"crm\"\nname = \"CRM\"\n");
        let seed = temp.path().join("seed.json");
        fs::write(&seed, r#"{"revision": 2, "modules": [{"key": "crm", "name": "CRM"}]}"#).unwrap();

        assert_eq!(CatalogDiscovery::load(temp.path()).unwrap().len(), 1);
        assert_eq!(CatalogDiscovery::load(&seed).unwrap().revision, 2);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let temp = tempfile::tempdir().unwrap();
        let result = CatalogDiscovery::new(temp.path().join("absent")).discover();
        assert!(matches!(result, Err(CatalogError::Io { .. })));
    }
}
