//! Settings persisted as TOML, addressed by dotted keys.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// A TOML settings file. Missing files read as empty.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/luals/settings.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("luals").join("settings.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Value> {
        if !self.path.exists() {
            return Ok(Value::Object(Map::new()));
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid TOML in {}", self.path.display()))
    }

    pub fn save(&self, settings: &Value) -> Result<()> {
        let text = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(get_key(&self.load()?, key))
    }

    /// Set `key`; a `null` value removes it.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut settings = self.load()?;
        set_key(&mut settings, key, value);
        self.save(&settings)
    }
}

/// Look up a dotted key.
pub fn get_key(root: &Value, key: &str) -> Option<Value> {
    key.split('.')
        .try_fold(root, |node, part| node.get(part))
        .cloned()
}

/// Write a dotted key, creating intermediate tables.
pub fn set_key(root: &mut Value, key: &str, value: Value) {
    let mut parts: Vec<&str> = key.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };

    let mut node = root;
    for part in parts {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map
            .entry(part)
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        if value.is_null() {
            map.remove(last);
        } else {
            map.insert(last.to_string(), value);
        }
    }
}
