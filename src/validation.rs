use crate::error::ServiceError;
use crate::model::{Config, ConfigGroup, LabeledConfig};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use validator::Validate;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("identifier pattern is valid"));

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Validates a configuration submitted for creation
    pub fn validate_config(config: &Config) -> Result<(), ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        Self::validate_identifier("name", &config.name)?;
        Self::validate_identifier("version", &config.version)?;

        if config.parameters.keys().any(|key| key.trim().is_empty()) {
            return Err(ServiceError::Validation(
                "parameter keys cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_labeled(entry: &LabeledConfig) -> Result<(), ServiceError> {
        Self::validate_config(&entry.configuration)?;

        if entry
            .labels
            .iter()
            .any(|(key, value)| key.trim().is_empty() || value.trim().is_empty())
        {
            return Err(ServiceError::Validation(
                "labels cannot have empty keys or values".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates a configuration group submitted for creation
    pub fn validate_group(group: &ConfigGroup) -> Result<(), ServiceError> {
        group
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        Self::validate_identifier("name", &group.name)?;
        Self::validate_identifier("version", &group.version)?;

        let mut seen = HashSet::new();
        for entry in &group.configurations {
            Self::validate_labeled(entry)?;
            if !seen.insert((&entry.configuration.name, &entry.configuration.version)) {
                return Err(ServiceError::Validation(format!(
                    "configuration {}/{} appears more than once",
                    entry.configuration.name, entry.configuration.version
                )));
            }
        }

        Ok(())
    }

    /// Validates `name` and `version` path segments
    pub fn validate_path(name: &str, version: &str) -> Result<(), ServiceError> {
        Self::validate_identifier("name", name)?;
        Self::validate_identifier("version", version)
    }

    fn validate_identifier(field: &str, value: &str) -> Result<(), ServiceError> {
        if IDENTIFIER.is_match(value) {
            Ok(())
        } else {
            Err(ServiceError::Validation(format!(
                "{} can only contain alphanumeric characters, dots, hyphens, and underscores",
                field
            )))
        }
    }
}

/// Parse a `key:value;key2:value2` label filter.
///
/// A missing or blank filter yields an empty map, which matches everything.
pub fn parse_label_query(raw: Option<&str>) -> Result<HashMap<String, String>, ServiceError> {
    let mut labels = HashMap::new();
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(labels);
    };

    for pair in raw.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once(':').ok_or_else(|| {
            ServiceError::InvalidRequest(
                "invalid labels format, expected key:value;key2:value2".to_string(),
            )
        })?;

        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "invalid labels format, empty key or value".to_string(),
            ));
        }
        labels.insert(key.to_string(), value.to_string());
    }

    Ok(labels)
}
