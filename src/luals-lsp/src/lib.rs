//! Installer and language client plumbing for lua-language-server.
//!
//! Provides:
//! - Locating the server binary (custom path or managed install)
//! - Downloading and extracting platform archives from GitHub releases
//! - Version records and update checks against a release channel
//! - A stdio JSON-RPC client with notification and server-request dispatch

pub mod client;
pub mod downloader;
pub mod server_config;

pub use client::{
    LspClient, LspClientConfig, NotificationHandler, ProcessLauncher, ServerLauncher,
    ServerRequestHandler, notification_handler,
};
pub use downloader::{
    Archiver, Channel, EnsureInstalled, InstallPrompt, PlatformPackage, Repository,
    ServerInstaller, UpdateReport, VersionCheck,
};
pub use server_config::LspServerConfig;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LspError {
    #[error("LSP server not found: {0}")]
    ServerNotFound(String),
    #[error("Failed to start LSP server: {0}")]
    StartFailed(String),
    #[error("LSP communication error: {0}")]
    Communication(String),
    #[error("No package available for platform {0}")]
    UnsupportedPlatform(String),
    #[error("Failed to extract archive: {0}")]
    Extraction(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Timeout waiting for LSP response")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, LspError>;
