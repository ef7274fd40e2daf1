//! Launch configuration of a language server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How to spawn and initialize a language server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspServerConfig {
    /// Server identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Language IDs (document selector).
    #[serde(default)]
    pub language_ids: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Sent as `initializationOptions`.
    #[serde(default)]
    pub init_options: serde_json::Value,
}

impl LspServerConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command: Vec::new(),
            language_ids: Vec::new(),
            env: HashMap::new(),
            init_options: serde_json::Value::Null,
        }
    }

    pub fn command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.command = std::iter::once(program.into()).chain(args).collect();
        self
    }

    pub fn language_ids(mut self, ids: Vec<&str>) -> Self {
        self.language_ids = ids.into_iter().map(String::from).collect();
        self
    }

    pub fn init_options(mut self, options: serde_json::Value) -> Self {
        self.init_options = options;
        self
    }

    pub fn handles_language(&self, language_id: &str) -> bool {
        self.language_ids.iter().any(|id| id == language_id)
    }
}
