//! HTTP client and GitHub API types for the installer.

use crate::{LspError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = concat!("luals/", env!("CARGO_PKG_VERSION"));

/// GitHub REST API root.
pub const GITHUB_API: &str = "https://api.github.com";

/// Default timeout for HTTP requests. Archives are large, so this is generous.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Create an HTTP client with proper configuration
pub fn create_http_client() -> std::result::Result<Client, String> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(DEFAULT_TIMEOUT)
        .tcp_nodelay(true)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))
}

/// GitHub release API response.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    pub assets: Vec<GitHubAsset>,
}

/// GitHub release asset.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Stream `url` into the file at `path`.
pub async fn download_file(client: &Client, url: &str, path: &Path) -> Result<()> {
    use futures::StreamExt;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LspError::Communication(format!("Failed to download: {}", e)))?;

    if !response.status().is_success() {
        return Err(LspError::Communication(format!(
            "Download of {} failed with status: {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut file = fs::File::create(path).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| LspError::Communication(format!("Failed to read chunk: {}", e)))?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if total_size > 10 * 1024 * 1024 {
        info!("Downloaded {:.1} MB", total_size as f64 / (1024.0 * 1024.0));
    }

    Ok(())
}
