//! Terminal implementation of the extension host.

use crate::settings::{SettingsFile, get_key};
use async_trait::async_trait;
use luals_extension::host::{Disposable, Host, StatusBarItem};
use luals_extension::{ExtensionError, Result};
use lsp_types::ConfigurationItem;
use parking_lot::Mutex;
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Editor environment the terminal host pretends to have.
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    /// Runtime path entries offered by `add-library`.
    pub paths: Vec<PathBuf>,
    /// `$VIMRUNTIME`.
    pub vimruntime: Option<PathBuf>,
    /// Editor configuration directory.
    pub config_dir: Option<PathBuf>,
    pub nightly: bool,
}

pub struct TerminalHost {
    user: SettingsFile,
    workspace: Option<SettingsFile>,
    root: Option<PathBuf>,
    storage: PathBuf,
    runtime: Runtime,
    assume_yes: bool,
    commands: Arc<Mutex<Vec<String>>>,
}

impl TerminalHost {
    pub fn new(user: SettingsFile, storage: PathBuf) -> Self {
        Self {
            user,
            workspace: None,
            root: None,
            storage,
            runtime: Runtime::default(),
            assume_yes: false,
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use `root` as the workspace, with settings in `<root>/.luals/settings.toml`.
    pub fn with_workspace(mut self, root: PathBuf) -> Self {
        self.workspace = Some(SettingsFile::new(root.join(".luals").join("settings.toml")));
        self.root = Some(root);
        self
    }

    pub fn with_runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = runtime;
        self
    }

    /// Answer every confirmation with yes.
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    /// Commands registered by the extension and not yet disposed.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    fn read(&self, file: &SettingsFile, key: &str) -> Option<Value> {
        match file.load() {
            Ok(settings) => get_key(&settings, key),
            Err(e) => {
                warn!("{:#}", e);
                None
            }
        }
    }
}

async fn read_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        Some(line.trim().to_string())
    })
    .await
    .ok()
    .flatten()
}

#[async_trait]
impl Host for TerminalHost {
    async fn get_config(&self, key: &str, _scope: Option<&Url>) -> Option<Value> {
        let workspace = self
            .workspace
            .as_ref()
            .and_then(|file| self.read(file, key));
        workspace.or_else(|| self.read(&self.user, key))
    }

    async fn update_config(
        &self,
        key: &str,
        value: Value,
        global: bool,
        _scope: Option<&Url>,
    ) -> Result<()> {
        let file = match (&self.workspace, global) {
            (Some(workspace), false) => workspace,
            _ => &self.user,
        };
        file.set(key, value)
            .map_err(|e| ExtensionError::ConfigUpdate {
                key: key.to_string(),
                message: format!("{:#}", e),
            })?;
        debug!("Updated {} in {}", key, file.path().display());
        Ok(())
    }

    async fn workspace_configuration(&self, items: &[ConfigurationItem]) -> Value {
        let mut result = Vec::with_capacity(items.len());
        for item in items {
            let value = match &item.section {
                Some(section) => self.get_config(section, item.scope_uri.as_ref()).await,
                None => None,
            };
            result.push(value.unwrap_or(Value::Null));
        }
        Value::Array(result)
    }

    fn workspace_folder(&self, uri: &Url) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        let path = uri.to_file_path().ok()?;
        path.starts_with(root).then(|| root.clone())
    }

    fn workspace_root(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    async fn show_info(&self, message: &str) {
        println!("{}", message);
    }

    async fn show_error(&self, message: &str) {
        eprintln!("error: {}", message);
    }

    async fn show_notification(&self, content: &str) {
        println!("{}", content);
    }

    async fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            info!("{} (assuming yes)", message);
            return true;
        }
        print!("{} [y/N] ", message);
        let _ = std::io::stdout().flush();
        matches!(
            read_line().await.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("y" | "yes")
        )
    }

    async fn quick_pick(&self, items: &[String]) -> Option<usize> {
        for (index, item) in items.iter().enumerate() {
            println!("{:>3}. {}", index + 1, item.trim_start());
        }
        print!("Select [1-{}]: ", items.len());
        let _ = std::io::stdout().flush();
        let choice: usize = read_line().await?.parse().ok()?;
        (1..=items.len()).contains(&choice).then(|| choice - 1)
    }

    fn create_status_bar_item(&self) -> Arc<dyn StatusBarItem> {
        Arc::new(LogStatusBar::default())
    }

    fn register_command(&self, name: &str) -> Box<dyn Disposable> {
        self.commands.lock().push(name.to_string());
        Box::new(Registration {
            name: name.to_string(),
            commands: self.commands.clone(),
        })
    }

    async fn runtime_paths(&self) -> Vec<PathBuf> {
        self.runtime.paths.clone()
    }

    async fn runtime_lua_dir(&self) -> Option<PathBuf> {
        self.runtime.vimruntime.as_ref().map(|dir| dir.join("lua"))
    }

    async fn user_config_dir(&self) -> Option<PathBuf> {
        self.runtime.config_dir.clone()
    }

    async fn is_prerelease(&self) -> bool {
        self.runtime.nightly
    }

    fn storage_dir(&self) -> PathBuf {
        self.storage.clone()
    }
}

struct Registration {
    name: String,
    commands: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Disposable for Registration {
    async fn dispose(&self) -> Result<()> {
        self.commands.lock().retain(|name| name != &self.name);
        Ok(())
    }
}

/// Status bar that logs what an editor would display.
#[derive(Default)]
struct LogStatusBar {
    state: Mutex<(bool, String)>,
}

impl StatusBarItem for LogStatusBar {
    fn show(&self) {
        self.state.lock().0 = true;
    }

    fn hide(&self) {
        self.state.lock().0 = false;
    }

    fn set_text(&self, text: &str) {
        let mut state = self.state.lock();
        if state.0 && state.1 != text {
            info!(target: "luals::status", "{}", text);
        }
        state.1 = text.to_string();
    }

    fn set_progress(&self, busy: bool) {
        debug!(target: "luals::status", "busy: {}", busy);
    }
}
