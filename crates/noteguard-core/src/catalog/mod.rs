//! Catalog documents: fallback strategies and trigger rules loaded from
//! YAML or JSON.
//!
//! Documents are checked against the embedded JSON schema first, then each
//! entry is shape-validated. Loading fails on the first malformed entry so
//! bad catalogs never reach evaluation.

mod defaults;
mod schema;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::fallback::FallbackStrategy;
use crate::trigger::TriggerRule;

pub use defaults::{default_rules, default_strategies};
pub use schema::validate_catalog_schema;

/// Errors raised while registering or loading catalog entries.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Invalid strategy '{id}': {reason}")]
    InvalidStrategy { id: String, reason: String },

    #[error("Invalid rule '{id}': {reason}")]
    InvalidRule { id: String, reason: String },

    #[error("Invalid service key: '{0}'")]
    InvalidServiceKey(String),

    #[error("Catalog failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

lazy_static! {
    /// Strategy and rule identifiers
    static ref ID_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$").unwrap();

    static ref WEBHOOK_URL_PATTERN: Regex = Regex::new(r"^https?://[^\s/]+\S*$").unwrap();
}

pub(crate) fn is_valid_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

pub(crate) fn is_valid_webhook_url(url: &str) -> bool {
    WEBHOOK_URL_PATTERN.is_match(url)
}

/// A set of strategies and rules as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub strategies: Vec<FallbackStrategy>,

    #[serde(default)]
    pub rules: Vec<TriggerRule>,
}

impl CatalogDocument {
    /// The built-in strategies and rules.
    pub fn builtin() -> Self {
        Self {
            strategies: default_strategies(),
            rules: default_rules(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Load a file, choosing the format by extension (`.json` or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, CatalogError> {
        validate_catalog_schema(&value).map_err(CatalogError::Schema)?;

        let document: CatalogDocument = serde_json::from_value(value)?;
        document.validate()?;
        Ok(document)
    }

    /// Shape-validate every entry and reject duplicate ids.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = std::collections::HashSet::new();
        for strategy in &self.strategies {
            strategy.validate()?;
            if !seen.insert(strategy.id.as_str()) {
                return Err(CatalogError::DuplicateId(strategy.id.clone()));
            }
        }

        seen.clear();
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(CatalogError::DuplicateId(rule.id.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_YAML: &str = r#"
strategies:
  - id: high-error-rate
    name: High error rate
    priority: 1
    conditions:
      - type: error_rate
        operator: gte
        threshold: 0.3
    actions:
      - type: switch_to_recommended
    recovery_actions:
      - type: restore_original
    cooldown_ms: 600000
rules:
  - id: long-note
    name: Analyze long notes
    priority: 3
    conditions:
      - type: content_length
        operator: greater_than
        value: 500
    actions:
      - type: analyze_note
        parameters:
          depth: full
"#;

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("S1"));
        assert!(is_valid_id("high-error_rate.v2"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("-leading"));
        assert!(!is_valid_id("has space"));
    }

    #[test]
    fn test_webhook_urls() {
        assert!(is_valid_webhook_url("https://hooks.example.com/a?b=c"));
        assert!(is_valid_webhook_url("http://localhost:8080"));
        assert!(!is_valid_webhook_url("ftp://example.com"));
        assert!(!is_valid_webhook_url("https://"));
    }

    #[test]
    fn test_load_yaml_catalog() {
        let doc = CatalogDocument::from_yaml(CATALOG_YAML).unwrap();
        assert_eq!(doc.strategies.len(), 1);
        assert_eq!(doc.rules.len(), 1);
        assert_eq!(doc.rules[0].actions[0].str_param("depth"), Some("full"));
        assert!(doc.rules[0].enabled);
    }

    #[test]
    fn test_schema_violation_reported() {
        let yaml = r#"
strategies:
  - id: S1
    name: Missing conditions
    priority: 1
    actions: []
    cooldown_ms: 1000
"#;
        let err = CatalogDocument::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::Schema(ref errors) if !errors.is_empty()));
    }

    #[test]
    fn test_shape_violation_reported() {
        let yaml = CATALOG_YAML.replace("priority: 3", "priority: 30");
        let err = CatalogDocument::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRule { .. } | CatalogError::Schema(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut doc = CatalogDocument::from_yaml(CATALOG_YAML).unwrap();
        doc.rules.push(doc.rules[0].clone());
        assert!(matches!(doc.validate(), Err(CatalogError::DuplicateId(_))));
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let doc = CatalogDocument::builtin();
        assert!(!doc.strategies.is_empty());
        assert!(!doc.rules.is_empty());
        doc.validate().unwrap();

        let value = serde_json::to_value(&doc).unwrap();
        assert!(validate_catalog_schema(&value).is_ok());
    }

    #[test]
    fn test_json_round_trip_through_loader() {
        let json = serde_json::to_string(&CatalogDocument::builtin()).unwrap();
        let doc = CatalogDocument::from_json(&json).unwrap();
        assert_eq!(doc, CatalogDocument::builtin());
    }

    #[test]
    fn test_demo_catalog_loads() {
        let doc = CatalogDocument::from_yaml(include_str!("../../../../demos/catalog.yaml")).unwrap();
        let ids: Vec<&str> = doc.strategies.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["provider-down", "openai-errors", "slow-model"]);
        assert_eq!(doc.rules.len(), 3);
    }
}
