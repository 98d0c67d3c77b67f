//! JSON Schema validation of assembled elements.
//!
//! The element schema (JSON Schema Draft 7) is embedded at compile time from
//! `schemas/kordiam-element.json`. It restates the structural rules of the
//! element endpoint: typed ids, `{date, time}` schedules, and at least one
//! task, publication or group.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use kordiam_importer::validation::ElementValidator;
//!
//! let validator = ElementValidator::new()?;
//! assert!(validator.is_valid(&json!({ "title": "A", "groups": [5] })));
//! assert!(!validator.is_valid(&json!({ "title": "A" })));
//! ```

use serde_json::Value;

use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::models::Element;

/// Embedded element schema source.
pub const ELEMENT_SCHEMA: &str = include_str!("../../schemas/kordiam-element.json");

/// Compiled element schema, built once per run.
pub struct ElementValidator {
    validator: jsonschema::Validator,
}

impl ElementValidator {
    pub fn new() -> ConfigResult<Self> {
        let schema: Value = serde_json::from_str(ELEMENT_SCHEMA)?;
        let validator = jsonschema::draft7::new(&schema).map_err(|e| ConfigError::InvalidSetting {
            name: "element schema",
            message: e.to_string(),
        })?;
        Ok(Self { validator })
    }

    pub fn is_valid(&self, data: &Value) -> bool {
        self.validator.is_valid(data)
    }

    /// Validate a wire-form element.
    pub fn validate_value(&self, data: &Value) -> Result<(), ValidationError> {
        let errors: Vec<String> = self.validator.iter_errors(data).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Schema { errors })
        }
    }

    pub fn validate(&self, element: &Element) -> Result<(), ValidationError> {
        self.validate_value(&element.to_value())
    }
}
