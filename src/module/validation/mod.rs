//! Module validation framework
//!
//! Provides per-definition validation for catalog seeds.

pub mod manifest_validator;

pub use manifest_validator::{DefinitionValidator, ValidationResult};
