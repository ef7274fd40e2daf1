//! The `luals.*` commands.

use crate::ctx::Ctx;
use luals_lsp::UpdateReport;
use luals_lsp::downloader::packages::LUA_LS_NAME;
use serde_json::{Value, json};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info};

pub const COMMAND_PREFIX: &str = "luals.";

/// Key edited by `insertNvimLuaPluginLibrary`.
const WORKSPACE_LIBRARY: &str = "Lua.workspace.library";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Install,
    Update,
    Version,
    Restart,
    ShowTooltip,
    InsertNvimLuaPluginLibrary,
    DownloadNvimLuaTypes,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::Install,
        Command::Update,
        Command::Version,
        Command::Restart,
        Command::ShowTooltip,
        Command::InsertNvimLuaPluginLibrary,
        Command::DownloadNvimLuaTypes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Install => "install",
            Command::Update => "update",
            Command::Version => "version",
            Command::Restart => "restart",
            Command::ShowTooltip => "showTooltip",
            Command::InsertNvimLuaPluginLibrary => "insertNvimLuaPluginLibrary",
            Command::DownloadNvimLuaTypes => "downloadNvimLuaTypes",
        }
    }

    /// Name as registered with the host.
    pub fn full_name(self) -> String {
        format!("{}{}", COMMAND_PREFIX, self.name())
    }

    /// Accepts both `version` and `luals.version`.
    pub fn from_name(name: &str) -> Option<Command> {
        let name = name.strip_prefix(COMMAND_PREFIX).unwrap_or(name);
        Command::ALL.into_iter().find(|command| command.name() == name)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", COMMAND_PREFIX, self.name())
    }
}

pub async fn install(ctx: &Ctx) {
    info!("installing {}...", LUA_LS_NAME);
    match ctx.installer().install().await {
        Ok(version) => info!("{} installed: {}", LUA_LS_NAME, version),
        Err(e) => {
            error!("failed to install: {}", e);
            ctx.host()
                .show_error(&format!("Failed to install {}: {}", LUA_LS_NAME, e))
                .await;
        }
    }
}

pub async fn update(ctx: &Ctx) {
    info!("updating {}...", LUA_LS_NAME);
    let Some(report) = ctx.ensure_updated(false).await else {
        return;
    };
    info!("{} update: {}", LUA_LS_NAME, report);

    let host = ctx.host();
    match report {
        UpdateReport::UpToDate { version } => {
            host.show_info(&format!("{} is up to date ({})", LUA_LS_NAME, version))
                .await
        }
        UpdateReport::Updated { to, .. } => {
            host.show_info(&format!("{} updated to {}", LUA_LS_NAME, to))
                .await
        }
        UpdateReport::Declined => {
            host.show_info(&format!("{} update cancelled", LUA_LS_NAME))
                .await
        }
        UpdateReport::Skipped { reason } => {
            host.show_info(&format!("{} update skipped: {}", LUA_LS_NAME, reason))
                .await
        }
        UpdateReport::RestartFailed { to, message, .. } => {
            host.show_error(&format!(
                "{} updated to {} but failed to restart: {}",
                LUA_LS_NAME, to, message
            ))
            .await
        }
        UpdateReport::Error { message, .. } => {
            host.show_error(&format!("Failed to update {}: {}", LUA_LS_NAME, message))
                .await
        }
    }
}

pub async fn version(ctx: &Ctx) {
    let version = ctx
        .get_current_version()
        .await
        .unwrap_or_else(|| "unknown version".to_string());
    ctx.host().show_info(&version).await;
}

pub async fn show_tooltip(ctx: &Ctx) {
    ctx.host().show_notification(&ctx.bar_tooltip()).await;
}

/// Offer the `lua/` directories of runtime path entries for `Lua.workspace.library`.
pub async fn insert_nvim_lua_plugin_library(ctx: &Ctx) {
    let host = ctx.host();
    let mut library: Vec<Value> = match host.get_config(WORKSPACE_LIBRARY, None).await {
        Some(Value::Array(library)) => library,
        _ => Vec::new(),
    };
    let listed = |path: &PathBuf| {
        library
            .iter()
            .any(|entry| entry.as_str() == Some(path.to_string_lossy().as_ref()))
    };

    let paths: Vec<PathBuf> = host
        .runtime_paths()
        .await
        .into_iter()
        .map(|entry| entry.join("lua"))
        .filter(|path| !listed(path) && path.exists())
        .collect();
    if paths.is_empty() {
        return;
    }

    let runtime = host.runtime_lua_dir().await;
    let user_config = host.user_config_dir().await.map(|dir| dir.join("lua"));
    let labels: Vec<String> = paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let name = if Some(path) == runtime.as_ref() {
                format!(
                    "{} (auto added if luals.enableNvimLuaDev is true )",
                    path.display()
                )
            } else if Some(path) == user_config.as_ref() {
                format!("{} (not recommended)", path.display())
            } else {
                path.parent()
                    .and_then(|plugin| plugin.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            };
            if index < 9 { format!(" {}", name) } else { name }
        })
        .collect();

    let Some(path) = host
        .quick_pick(&labels)
        .await
        .and_then(|index| paths.get(index))
    else {
        return;
    };

    library.push(json!(path.to_string_lossy()));
    if let Err(e) = host
        .update_config(WORKSPACE_LIBRARY, Value::Array(library), false, None)
        .await
    {
        error!("Failed to update {}: {}", WORKSPACE_LIBRARY, e);
        host.show_error(&e.to_string()).await;
    }
}

pub async fn download_nvim_lua_types(ctx: &Ctx) {
    match ctx.stubs().download_types().await {
        Ok(path) => {
            ctx.host()
                .show_info(&format!("Downloaded Neovim Lua types to {}", path.display()))
                .await;
        }
        Err(e) => {
            error!("Failed to download Neovim Lua types: {:?}", e);
            ctx.host()
                .show_error(&format!("Failed to download Neovim Lua types: {}", e))
                .await;
        }
    }
}
