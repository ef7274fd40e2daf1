//! Answers server requests, extending the `Lua` configuration in dev-library mode.

use crate::config::Config;
use crate::host::Host;
use crate::neodev::TypeStubs;
use async_trait::async_trait;
use luals_lsp::ServerRequestHandler;
use lsp_types::{ConfigurationItem, ConfigurationParams};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const CONFIGURATION: &str = "workspace/configuration";
const LUA_SECTION: &str = "Lua";

pub struct LibraryMiddleware {
    host: Arc<dyn Host>,
    config: Config,
    stubs: Arc<TypeStubs>,
}

impl LibraryMiddleware {
    pub fn new(host: Arc<dyn Host>, config: Config, stubs: Arc<TypeStubs>) -> Self {
        Self {
            host,
            config,
            stubs,
        }
    }

    async fn configuration(&self, params: ConfigurationParams) -> Value {
        let mut result = self.host.workspace_configuration(&params.items).await;
        if !self.config.nvim_lua_dev().await {
            return result;
        }

        let mut paths = Vec::new();
        if let Some(runtime) = self.host.runtime_lua_dir().await {
            paths.push(runtime.to_string_lossy().into_owned());
        }
        if let Some(types) = self.stubs.types_path().await {
            paths.push(types.to_string_lossy().into_owned());
        }

        if !add_library_paths(&params.items, &mut result, &paths) {
            debug!("Configuration answer left unchanged");
        }
        result
    }
}

#[async_trait]
impl ServerRequestHandler for LibraryMiddleware {
    async fn handle(&self, method: &str, params: Value) -> Option<Value> {
        if method != CONFIGURATION {
            return None;
        }
        let params: ConfigurationParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                debug!("Malformed {} params: {}", CONFIGURATION, e);
                return None;
            }
        };
        Some(self.configuration(params).await)
    }
}

/// Append `paths` to `workspace.library` of the `Lua` entry of a
/// configuration answer, skipping those already listed.
///
/// Returns false when the answer does not have the expected shape, in which
/// case it is untouched.
pub fn add_library_paths(items: &[ConfigurationItem], result: &mut Value, paths: &[String]) -> bool {
    let Some(index) = items
        .iter()
        .position(|item| item.section.as_deref() == Some(LUA_SECTION))
    else {
        return false;
    };
    let Some(entry) = result.as_array_mut().and_then(|entries| entries.get_mut(index)) else {
        return false;
    };
    let Some(entry) = entry.as_object_mut() else {
        return false;
    };

    let workspace = entry
        .entry("workspace")
        .or_insert_with(|| Value::Object(Default::default()));
    let Some(workspace) = workspace.as_object_mut() else {
        return false;
    };
    let library = workspace
        .entry("library")
        .or_insert_with(|| Value::Array(Vec::new()));
    if library.is_null() {
        *library = Value::Array(Vec::new());
    }
    let Some(library) = library.as_array_mut() else {
        return false;
    };

    for path in paths {
        if !library.iter().any(|entry| entry.as_str() == Some(path.as_str())) {
            library.push(Value::String(path.clone()));
        }
    }
    true
}
