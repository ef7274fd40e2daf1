//! Capabilities the extension needs from the editor.

use crate::Result;
use async_trait::async_trait;
use lsp_types::{ConfigurationItem, Url};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Something that can be torn down on restart or deactivation.
#[async_trait]
pub trait Disposable: Send + Sync {
    async fn dispose(&self) -> Result<()>;
}

#[async_trait]
impl<T: Disposable + ?Sized> Disposable for Arc<T> {
    async fn dispose(&self) -> Result<()> {
        (**self).dispose().await
    }
}

/// A status bar entry owned by the extension.
pub trait StatusBarItem: Send + Sync {
    fn show(&self);
    fn hide(&self);
    fn set_text(&self, text: &str);
    /// Toggle the busy indicator next to the text.
    fn set_progress(&self, busy: bool);
}

/// The editor as seen by the extension.
///
/// Configuration keys are dotted paths (`sumneko-lua`, `Lua.workspace.library`).
/// A `scope` of `None` reads or writes the global configuration; a resource
/// URI selects the workspace folder containing it.
#[async_trait]
pub trait Host: Send + Sync {
    /// Current value of a configuration key, if set.
    async fn get_config(&self, key: &str, scope: Option<&Url>) -> Option<Value>;

    /// Write a configuration key. `global` targets the user settings instead
    /// of the workspace settings.
    async fn update_config(
        &self,
        key: &str,
        value: Value,
        global: bool,
        scope: Option<&Url>,
    ) -> Result<()>;

    /// Default answer to a `workspace/configuration` request.
    async fn workspace_configuration(&self, items: &[ConfigurationItem]) -> Value;

    /// Workspace folder containing `uri`.
    fn workspace_folder(&self, uri: &Url) -> Option<PathBuf>;

    /// Root handed to the server on initialize.
    fn workspace_root(&self) -> Option<PathBuf>;

    async fn show_info(&self, message: &str);
    async fn show_error(&self, message: &str);
    /// Longer, dismissable text such as tooltips.
    async fn show_notification(&self, content: &str);

    /// Yes/no question; `false` when the user dismisses it.
    async fn confirm(&self, message: &str) -> bool;

    /// Let the user pick one of `items`; returns the chosen index.
    async fn quick_pick(&self, items: &[String]) -> Option<usize>;

    fn create_status_bar_item(&self) -> Arc<dyn StatusBarItem>;

    /// Make `name` invokable by the user until the returned handle is disposed.
    fn register_command(&self, name: &str) -> Box<dyn Disposable>;

    /// Editor runtime path entries (plugin directories).
    async fn runtime_paths(&self) -> Vec<PathBuf>;

    /// The editor's own Lua sources (`$VIMRUNTIME/lua`).
    async fn runtime_lua_dir(&self) -> Option<PathBuf>;

    /// User configuration directory (`stdpath('config')`).
    async fn user_config_dir(&self) -> Option<PathBuf>;

    /// True when the editor is a pre-release build.
    async fn is_prerelease(&self) -> bool;

    /// Private storage of the extension.
    fn storage_dir(&self) -> PathBuf;
}
