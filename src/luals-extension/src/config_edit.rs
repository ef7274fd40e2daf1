//! `lua.config` edits requested by the server through `$/command`.

use crate::host::Host;
use luals_lsp::{LspClient, notification_handler};
use lsp_types::Url;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const COMMAND_NOTIFICATION: &str = "$/command";
pub const LUA_CONFIG: &str = "lua.config";

/// Params of `$/command`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandParams {
    pub command: String,
    #[serde(default)]
    pub data: Vec<ConfigEdit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    /// Append to a list.
    Add,
    /// Replace the value.
    Set,
    /// Set one property of a map.
    Prop,
    #[serde(other)]
    Unknown,
}

/// One configuration change.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigEdit {
    pub key: String,
    pub action: EditAction,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub prop: Option<String>,
    #[serde(default)]
    pub global: bool,
    /// Document the edit came from; a malformed URI only drops this edit's scope.
    #[serde(default)]
    pub uri: Option<String>,
}

impl ConfigEdit {
    fn document(&self) -> Option<Url> {
        let raw = self.uri.as_deref()?;
        match Url::parse(raw) {
            Ok(uri) => Some(uri),
            Err(e) => {
                warn!("Ignoring malformed uri {:?} of {} edit: {}", raw, self.key, e);
                None
            }
        }
    }
}

/// Apply `edits` in order. Returns how many were written.
///
/// Every edit reads the current value again, so two `prop` edits on the same
/// key never share a stale map.
pub async fn apply_edits(host: &dyn Host, edits: &[ConfigEdit]) -> usize {
    let mut applied = 0;

    for edit in edits {
        let document = edit.document();
        let scope = document
            .as_ref()
            .filter(|uri| host.workspace_folder(uri).is_some());

        let value = match edit.action {
            EditAction::Add => {
                let mut list = match host.get_config(&edit.key, scope).await {
                    Some(Value::Array(list)) => list,
                    _ => Vec::new(),
                };
                list.push(edit.value.clone());
                Value::Array(list)
            }
            EditAction::Set => edit.value.clone(),
            EditAction::Prop => {
                let Some(prop) = &edit.prop else {
                    warn!("Ignoring prop edit of {} without a property", edit.key);
                    continue;
                };
                let mut map = match host.get_config(&edit.key, scope).await {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                map.insert(prop.clone(), edit.value.clone());
                Value::Object(map)
            }
            EditAction::Unknown => {
                warn!("Ignoring unknown lua.config action for {}", edit.key);
                continue;
            }
        };

        match host
            .update_config(&edit.key, value, edit.global, scope)
            .await
        {
            Ok(()) => applied += 1,
            Err(e) => warn!("Failed to update {}: {}", edit.key, e),
        }
    }

    applied
}

/// Handle `$/command` notifications of `client`.
pub async fn attach(host: Arc<dyn Host>, client: &LspClient) {
    client
        .on_notification(
            COMMAND_NOTIFICATION,
            notification_handler(move |params| {
                let host = host.clone();
                async move {
                    let params: CommandParams = match serde_json::from_value(params) {
                        Ok(params) => params,
                        Err(e) => {
                            debug!("Ignoring malformed $/command: {}", e);
                            return;
                        }
                    };
                    if params.command != LUA_CONFIG {
                        return;
                    }
                    let applied = apply_edits(host.as_ref(), &params.data).await;
                    debug!("Applied {}/{} lua.config edits", applied, params.data.len());
                }
            }),
        )
        .await;
}
