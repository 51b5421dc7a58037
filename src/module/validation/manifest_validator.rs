//! Module definition validation
//!
//! Validates individual module definitions for key format and required fields.
//! Cross-definition checks (duplicates, unknown keys, cycles) live in the
//! dependency graph builder.

use tracing::{debug, warn};

use crate::module::registry::manifest::ModuleDefinition;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Definition is valid
    Valid,
    /// Definition is invalid with specific errors
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Definition validator
pub struct DefinitionValidator {
    /// Maximum key length
    max_key_len: usize,
    /// Maximum display name length
    max_name_len: usize,
}

impl DefinitionValidator {
    /// Create a new definition validator
    pub fn new() -> Self {
        Self {
            max_key_len: 64,
            max_name_len: 128,
        }
    }

    /// Validate a module definition
    pub fn validate(&self, definition: &ModuleDefinition) -> ValidationResult {
        let mut errors = Vec::new();

        if !self.is_valid_key(&definition.key) {
            errors.push(format!(
                "Invalid module key: {:?} (must be 1-{} alphanumeric characters, dashes or underscores, starting alphanumeric)",
                definition.key, self.max_key_len
            ));
        }

        if definition.name.trim().is_empty() {
            errors.push("Module name cannot be empty".to_string());
        } else if definition.name.chars().count() > self.max_name_len {
            errors.push(format!(
                "Module name exceeds {} characters",
                self.max_name_len
            ));
        }

        if !definition.category.is_empty() && !self.is_valid_key(&definition.category) {
            errors.push(format!("Invalid category tag: {:?}", definition.category));
        }

        if let Err(dep_errors) = self.validate_dependencies(definition) {
            errors.extend(dep_errors);
        }

        if errors.is_empty() {
            debug!("Definition validation passed for module: {}", definition.key);
            ValidationResult::Valid
        } else {
            warn!(
                "Definition validation failed for module {}: {:?}",
                definition.key, errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    /// Validate key format
    #[inline]
    pub fn is_valid_key(&self, key: &str) -> bool {
        if key.is_empty() || key.len() > self.max_key_len {
            return false;
        }

        // Must start with alphanumeric
        if !key.chars().next().map_or(false, |c| c.is_ascii_alphanumeric()) {
            return false;
        }

        key.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Validate dependency keys (self-dependency is reported by the graph builder)
    fn validate_dependencies(&self, definition: &ModuleDefinition) -> Result<(), Vec<String>> {
        let errors: Vec<String> = definition
            .depends_on
            .iter()
            .filter(|dep| !self.is_valid_key(dep))
            .map(|dep| format!("Invalid dependency key: {:?}", dep))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for DefinitionValidator {
    fn default() -> Self {
        Self::new()
    }
}
