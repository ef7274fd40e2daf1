//! Neovim Lua API type stubs from `folke/neodev.nvim`.

use crate::host::Host;
use crate::Result;
use luals_lsp::{Archiver, LspError};
use luals_lsp::downloader::{archive, http};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

pub const NEODEV_ARCHIVE_URL: &str =
    "https://codeload.github.com/folke/neodev.nvim/tar.gz/refs/heads/main";

/// Downloads and locates the type stubs under `<storage>/neodev/types`.
pub struct TypeStubs {
    host: Arc<dyn Host>,
    archive_url: String,
    client: reqwest::Client,
}

impl TypeStubs {
    pub fn new(host: Arc<dyn Host>) -> Result<Self> {
        let client = http::create_http_client().map_err(LspError::Communication)?;
        Ok(Self {
            host,
            archive_url: NEODEV_ARCHIVE_URL.to_string(),
            client,
        })
    }

    pub fn with_archive_url(mut self, url: impl Into<String>) -> Self {
        self.archive_url = url.into();
        self
    }

    fn types_root(&self) -> PathBuf {
        self.host.storage_dir().join("neodev").join("types")
    }

    /// `nightly` stubs for pre-release editors, `stable` otherwise.
    async fn channel(&self) -> &'static str {
        if self.host.is_prerelease().await {
            "nightly"
        } else {
            "stable"
        }
    }

    /// Stub directory for the running editor, if downloaded.
    pub async fn types_path(&self) -> Option<PathBuf> {
        let path = self.types_root().join(self.channel().await);
        path.is_dir().then_some(path)
    }

    /// Fetch the stubs, replacing any previous download. Returns the types root.
    pub async fn download_types(&self) -> Result<PathBuf> {
        let storage = self.host.storage_dir();
        fs::create_dir_all(&storage).await?;
        let work_dir = tempfile::Builder::new()
            .prefix(".neodev-")
            .tempdir_in(&storage)?;

        info!("Downloading Neovim Lua types from {}", self.archive_url);
        let archive_path = work_dir.path().join("neodev.tar.gz");
        http::download_file(&self.client, &self.archive_url, &archive_path).await?;

        let extracted = work_dir.path().join("extracted");
        archive::extract(Archiver::TarGzip, &archive_path, &extracted).await?;
        let types = find_types_dir(&extracted).await?;

        let root = self.types_root();
        if fs::try_exists(&root).await? {
            fs::remove_dir_all(&root).await?;
        }
        if let Some(parent) = root.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&types, &root).await?;

        info!("Neovim Lua types installed at {:?}", root);
        Ok(root)
    }
}

/// The tarball holds a single `<repo>-<branch>/` directory.
async fn find_types_dir(extracted: &Path) -> Result<PathBuf> {
    let mut entries = fs::read_dir(extracted).await?;
    while let Some(entry) = entries.next_entry().await? {
        let candidate = entry.path().join("types");
        if candidate.is_dir() {
            return Ok(candidate);
        }
    }
    Err(LspError::Extraction(
        "neodev archive does not contain a types directory".to_string(),
    )
    .into())
}
