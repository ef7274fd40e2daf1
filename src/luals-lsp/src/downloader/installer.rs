//! Server installer: resolves, downloads, and updates the server binary.

use crate::client::LspClient;
use crate::{LspError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::archive;
use super::http::{GITHUB_API, GitHubRelease, create_http_client, download_file};
use super::packages::platform_key;
use super::types::{
    Channel, EnsureInstalled, PlatformPackage, Repository, UpdateReport, VERSION_FILE,
    VersionCheck,
};

/// Asks the user before a download starts.
#[async_trait]
pub trait InstallPrompt: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Installer for a server released as platform archives on GitHub.
pub struct ServerInstaller {
    name: String,
    /// Root directory; the server lives in `<base_dir>/<name>`.
    base_dir: PathBuf,
    packages: HashMap<&'static str, PlatformPackage>,
    repository: Repository,
    custom_path: Option<PathBuf>,
    platform: String,
    api_base: String,
    client: reqwest::Client,
}

impl ServerInstaller {
    /// Create an installer storing servers under `base_dir`.
    pub fn new(
        name: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        packages: HashMap<&'static str, PlatformPackage>,
        repository: Repository,
        custom_path: Option<PathBuf>,
    ) -> Result<Self> {
        let client = create_http_client()
            .map_err(|e| LspError::Communication(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            base_dir: base_dir.into(),
            packages,
            repository,
            custom_path: custom_path.filter(|p| !p.as_os_str().is_empty()),
            platform: platform_key(),
            api_base: GITHUB_API.to_string(),
            client,
        })
    }

    /// Use another GitHub API root (enterprise mirrors, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Pretend to run on another platform.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Directory of the managed install.
    pub fn install_dir(&self) -> PathBuf {
        self.base_dir.join(&self.name)
    }

    fn package(&self) -> Result<&PlatformPackage> {
        self.packages
            .get(self.platform.as_str())
            .ok_or_else(|| LspError::UnsupportedPlatform(self.platform.clone()))
    }

    /// Where the binary is expected, whether or not it exists.
    pub fn binary_path(&self) -> Option<PathBuf> {
        if let Some(custom) = &self.custom_path {
            return Some(custom.clone());
        }
        self.package()
            .ok()
            .map(|package| self.install_dir().join(&package.executable))
    }

    /// Path of the binary if it exists on disk.
    pub fn path(&self) -> Option<PathBuf> {
        self.binary_path().filter(|p| p.is_file())
    }

    /// Release tag recorded by the last managed install.
    pub async fn installed_version(&self) -> Option<String> {
        if self.custom_path.is_some() {
            return None;
        }
        let record = self.install_dir().join(VERSION_FILE);
        let version = fs::read_to_string(&record).await.ok()?;
        let version = version.trim();
        (!version.is_empty()).then(|| version.to_string())
    }

    /// Make sure the binary is available, downloading it if allowed.
    pub async fn ensure_installed(
        &self,
        prompt_always: bool,
        allow_download: bool,
        prompt: &dyn InstallPrompt,
    ) -> Result<EnsureInstalled> {
        if let Some(path) = self.path() {
            debug!("{} already installed at {:?}", self.name, path);
            return Ok(EnsureInstalled {
                available: true,
                installed: false,
            });
        }

        if !allow_download {
            info!("{} is not installed and downloads are disabled", self.name);
            return Ok(EnsureInstalled {
                available: false,
                installed: false,
            });
        }

        if let Some(custom) = &self.custom_path {
            warn!(
                "Custom path {:?} for {} does not exist, not downloading",
                custom, self.name
            );
            return Ok(EnsureInstalled {
                available: false,
                installed: false,
            });
        }

        if prompt_always {
            let message = format!("{} is not installed. Install it now?", self.name);
            if !prompt.confirm(&message).await {
                info!("Install of {} declined", self.name);
                return Ok(EnsureInstalled {
                    available: false,
                    installed: false,
                });
            }
        }

        self.install().await?;
        Ok(EnsureInstalled {
            available: self.path().is_some(),
            installed: true,
        })
    }

    /// Download and install the release of the configured channel.
    pub async fn install(&self) -> Result<String> {
        let release = self.fetch_release().await?;
        self.install_release(&release).await
    }

    /// Compare the installed version with the release channel.
    pub async fn check_version(&self) -> VersionCheck {
        self.compare_versions().await.0
    }

    async fn compare_versions(&self) -> (VersionCheck, Option<GitHubRelease>) {
        let Some(current) = self.installed_version().await else {
            return (VersionCheck::Unknown, None);
        };

        match self.fetch_release().await {
            Ok(release) if release.tag_name == current => (
                VersionCheck::Same { version: current },
                Some(release),
            ),
            Ok(release) => (
                VersionCheck::Different {
                    current_version: current,
                    latest_version: release.tag_name.clone(),
                },
                Some(release),
            ),
            Err(e) => {
                warn!("Failed to look up {} release: {}", self.name, e);
                (VersionCheck::Unknown, None)
            }
        }
    }

    /// Check for a newer release and install it, stopping `client` around the swap.
    pub async fn ensure_updated(
        &self,
        prompt_always: bool,
        allow_download: bool,
        client: Option<&LspClient>,
        prompt: &dyn InstallPrompt,
    ) -> UpdateReport {
        let (check, release) = self.compare_versions().await;
        let (current, release) = match (check, release) {
            (VersionCheck::Same { version }, _) => return UpdateReport::UpToDate { version },
            (VersionCheck::Different { current_version, .. }, Some(release)) => {
                (current_version, release)
            }
            _ => {
                return UpdateReport::Skipped {
                    reason: "installed version is unknown".to_string(),
                };
            }
        };

        if !allow_download {
            return UpdateReport::Skipped {
                reason: "downloads are disabled".to_string(),
            };
        }

        if prompt_always {
            let message = format!(
                "{} {} is available (installed: {}). Update now?",
                self.name, release.tag_name, current
            );
            if !prompt.confirm(&message).await {
                return UpdateReport::Declined;
            }
        }

        self.reinstall_around(current, client, &release).await
    }

    async fn reinstall_around(
        &self,
        current: String,
        client: Option<&LspClient>,
        release: &GitHubRelease,
    ) -> UpdateReport {
        if let Some(client) = client {
            if let Err(e) = client.shutdown().await {
                warn!("Failed to stop {} before updating: {}", self.name, e);
            }
        }

        let installed = self.install_release(release).await;

        // Restart on the old binary as well when the install failed.
        let restarted = match client {
            Some(client) => match client.restart().await {
                Ok(_) => client.did_change_configuration().await,
                Err(e) => Err(e),
            },
            None => Ok(()),
        };

        match (installed, restarted) {
            (Ok(to), Ok(())) => UpdateReport::Updated { from: current, to },
            (Ok(to), Err(e)) => UpdateReport::RestartFailed {
                from: current,
                to,
                message: e.to_string(),
            },
            (Err(e), restarted) => {
                if let Err(restart) = restarted {
                    warn!("Failed to restart {} after a failed update: {}", self.name, restart);
                }
                UpdateReport::from_error(&e)
            }
        }
    }

    async fn install_release(&self, release: &GitHubRelease) -> Result<String> {
        let package = self.package()?;
        let asset = release
            .assets
            .iter()
            .find(|a| package.platform_filename.is_match(&a.name))
            .ok_or_else(|| {
                LspError::ServerNotFound(format!(
                    "No asset of {} matches {} (available: {:?})",
                    release.tag_name,
                    package.platform_filename,
                    release.assets.iter().map(|a| &a.name).collect::<Vec<_>>()
                ))
            })?;

        fs::create_dir_all(&self.base_dir).await?;
        let work_dir = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&self.base_dir)?;

        info!("Downloading {} {} ({})", self.name, release.tag_name, asset.name);
        let archive_path = work_dir.path().join(&asset.name);
        download_file(&self.client, &asset.browser_download_url, &archive_path).await?;

        let staging = work_dir.path().join("staging");
        archive::extract(package.archiver, &archive_path, &staging).await?;

        let executable = staging.join(&package.executable);
        if !executable.is_file() {
            return Err(LspError::ServerNotFound(format!(
                "{} missing from {}",
                package.executable, asset.name
            )));
        }
        make_executable(&executable).await?;
        fs::write(staging.join(VERSION_FILE), &release.tag_name).await?;

        let install_dir = self.install_dir();
        if fs::try_exists(&install_dir).await? {
            fs::remove_dir_all(&install_dir).await?;
        }
        fs::rename(&staging, &install_dir).await?;

        info!(
            "Installed {} {} at {:?}",
            self.name, release.tag_name, install_dir
        );
        Ok(release.tag_name.clone())
    }

    /// Fetch the release of the configured channel.
    pub async fn fetch_release(&self) -> Result<GitHubRelease> {
        let url = match &self.repository.channel {
            Channel::Latest => format!(
                "{}/repos/{}/releases/latest",
                self.api_base, self.repository.repo
            ),
            Channel::Tag(tag) => format!(
                "{}/repos/{}/releases/tags/{}",
                self.api_base, self.repository.repo, tag
            ),
        };

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| LspError::Communication(format!("Failed to fetch release: {}", e)))?;

        if !response.status().is_success() {
            return Err(LspError::Communication(format!(
                "GitHub API returned status {} for {}",
                response.status(),
                url
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LspError::Communication(format!("Failed to parse release JSON: {}", e)))
    }
}

async fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).await?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).await?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
