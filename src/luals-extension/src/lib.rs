//! lua-language-server extension, independent of any particular editor.
//!
//! The editor is reached only through the [`Host`] trait. On top of it this
//! crate provides:
//! - The installer workflow (prompt policy, update checks, server command line)
//! - The language client session with its configuration middleware
//! - Status bar and `lua.config` notifications from the server
//! - The `luals.*` command surface and activation/restart

pub mod commands;
pub mod config;
pub mod config_edit;
pub mod ctx;
pub mod extension;
pub mod host;
pub mod middleware;
pub mod neodev;
pub mod session;
pub mod status;

#[cfg(test)]
mod test_support;

pub use commands::Command;
pub use config::{Config, Locale, PromptPolicy, Settings};
pub use ctx::Ctx;
pub use extension::Extension;
pub use host::{Disposable, Host, StatusBarItem};
pub use session::{ProcessLauncher, ServerLauncher, SessionState, Subscriptions};

use luals_lsp::LspError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error(transparent)]
    Lsp(#[from] LspError),
    #[error("Failed to update configuration {key}: {message}")]
    ConfigUpdate { key: String, message: String },
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Extension is not active")]
    NotActive,
    #[error("Host error: {0}")]
    Host(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtensionError>;
