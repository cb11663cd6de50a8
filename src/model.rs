use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub id: String,
    #[validate(length(min = 1, max = 128, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "version is required"))]
    pub version: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledConfig {
    #[serde(default)]
    pub id: String,
    pub configuration: Config,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ConfigGroup {
    #[serde(default)]
    pub id: String,
    #[validate(length(min = 1, max = 128, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "version is required"))]
    pub version: String,
    #[serde(default)]
    pub configurations: Vec<LabeledConfig>,
}

fn ensure_id(id: &mut String) {
    if id.is_empty() {
        *id = Uuid::new_v4().to_string();
    }
}

impl Config {
    pub fn assign_id(&mut self) {
        self.id = Uuid::new_v4().to_string();
    }
}

impl LabeledConfig {
    pub fn ensure_ids(&mut self) {
        ensure_id(&mut self.id);
        ensure_id(&mut self.configuration.id);
    }

    /// True when every `(key, value)` in `query` is present on this entry.
    pub fn matches_labels(&self, query: &HashMap<String, String>) -> bool {
        query
            .iter()
            .all(|(key, value)| self.labels.get(key) == Some(value))
    }
}

impl ConfigGroup {
    pub fn ensure_ids(&mut self) {
        ensure_id(&mut self.id);
        for entry in &mut self.configurations {
            entry.ensure_ids();
        }
    }

    pub fn contains_config(&self, name: &str, version: &str) -> bool {
        self.configurations
            .iter()
            .any(|entry| entry.configuration.name == name && entry.configuration.version == version)
    }

    /// Returns false when an entry with the same config name and version exists.
    pub fn add_config(&mut self, mut entry: LabeledConfig) -> bool {
        if self.contains_config(&entry.configuration.name, &entry.configuration.version) {
            return false;
        }
        entry.ensure_ids();
        self.configurations.push(entry);
        true
    }

    pub fn remove_config(&mut self, entry_id: &str) -> bool {
        let before = self.configurations.len();
        self.configurations.retain(|entry| entry.id != entry_id);
        before != self.configurations.len()
    }

    pub fn configs_matching(&self, query: &HashMap<String, String>) -> Vec<LabeledConfig> {
        self.configurations
            .iter()
            .filter(|entry| entry.matches_labels(query))
            .cloned()
            .collect()
    }

    /// Drop every entry matching `query`. Returns how many were removed.
    pub fn remove_matching(&mut self, query: &HashMap<String, String>) -> usize {
        let before = self.configurations.len();
        self.configurations.retain(|entry| !entry.matches_labels(query));
        before - self.configurations.len()
    }
}
