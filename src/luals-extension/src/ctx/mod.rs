//! Per-activation context: installer workflow and the language client session.

use crate::config::Config;
use crate::config_edit;
use crate::host::Host;
use crate::middleware::LibraryMiddleware;
use crate::neodev::TypeStubs;
use crate::session::{ClientSubscription, ServerLauncher, SessionState, Subscriptions};
use crate::status::StatusChannel;
use crate::Result;
use async_trait::async_trait;
use luals_lsp::downloader::packages::{LUA_LS_NAME, packages, repository};
use luals_lsp::{
    InstallPrompt, LspClient, LspServerConfig, ServerInstaller, UpdateReport, VersionCheck,
};
use parking_lot::Mutex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Confirms downloads through the host.
struct HostPrompt<'a>(&'a dyn Host);

#[async_trait]
impl InstallPrompt for HostPrompt<'_> {
    async fn confirm(&self, message: &str) -> bool {
        self.0.confirm(message).await
    }
}

pub struct Ctx {
    host: Arc<dyn Host>,
    pub config: Config,
    installer: ServerInstaller,
    stubs: Arc<TypeStubs>,
    launcher: Arc<dyn ServerLauncher>,
    subscriptions: Arc<Subscriptions>,
    client: RwLock<Option<Arc<LspClient>>>,
    status: Mutex<Option<Arc<StatusChannel>>>,
    state: Mutex<SessionState>,
}

impl Ctx {
    /// Build the context from the current configuration.
    pub async fn new(
        host: Arc<dyn Host>,
        subscriptions: Arc<Subscriptions>,
        launcher: Arc<dyn ServerLauncher>,
    ) -> Result<Self> {
        let config = Config::new(host.clone());
        let installer = ServerInstaller::new(
            LUA_LS_NAME,
            host.storage_dir(),
            packages(),
            repository(&config.version().await),
            config.custom_path().await.map(PathBuf::from),
        )?;
        Self::with_installer(host, subscriptions, launcher, installer)
    }

    pub fn with_installer(
        host: Arc<dyn Host>,
        subscriptions: Arc<Subscriptions>,
        launcher: Arc<dyn ServerLauncher>,
        installer: ServerInstaller,
    ) -> Result<Self> {
        let stubs = Arc::new(TypeStubs::new(host.clone())?);
        Ok(Self {
            config: Config::new(host.clone()),
            host,
            installer,
            stubs,
            launcher,
            subscriptions,
            client: RwLock::new(None),
            status: Mutex::new(None),
            state: Mutex::new(SessionState::Uninitialized),
        })
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn installer(&self) -> &ServerInstaller {
        &self.installer
    }

    pub fn stubs(&self) -> &Arc<TypeStubs> {
        &self.stubs
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        &self.subscriptions
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    pub async fn client(&self) -> Option<Arc<LspClient>> {
        self.client.read().await.clone()
    }

    /// Last tooltip reported by the server, empty before the first report.
    pub fn bar_tooltip(&self) -> String {
        self.status
            .lock()
            .as_ref()
            .map(|status| status.tooltip())
            .unwrap_or_default()
    }

    /// Server executable and arguments, if the binary exists.
    pub async fn resolve_bin(&self) -> Option<(PathBuf, Vec<String>)> {
        let bin = self.installer.path()?;

        // The executable lives in `<server>/bin/`.
        let server_dir = bin
            .parent()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."));

        let settings = self.config.settings().await;
        let mut args = vec![
            "-E".to_string(),
            server_dir
                .join("bin")
                .join("main.lua")
                .to_string_lossy()
                .into_owned(),
            format!("--locale={}", settings.locale),
        ];
        args.extend(self.config.misc_parameters().await);
        if !settings.log_path.is_empty() {
            args.push(format!("--logpath={}", settings.log_path));
        }

        Some((bin, args))
    }

    /// Make sure the server binary exists. Errors are reported, not returned.
    pub async fn ensure_installed(&self) -> bool {
        let prompt = self.config.prompt().await;
        let result = self
            .installer
            .ensure_installed(
                prompt.prompt_always(),
                prompt.allow_download(),
                &HostPrompt(self.host.as_ref()),
            )
            .await;

        match result {
            Ok(result) => {
                info!("ensure_installed() result: {:?}", result);
                result.available
            }
            Err(e) => {
                error!("Failed to install {}: {:?}", LUA_LS_NAME, e);
                self.host
                    .show_error(&format!("Failed to install {}: {}", LUA_LS_NAME, e))
                    .await;
                false
            }
        }
    }

    /// Check for a server update.
    ///
    /// Automatic checks honor `checkOnStartup` and the prompt policy; a manual
    /// check always allows the download and always asks first. Returns `None`
    /// when the check was skipped.
    pub async fn ensure_updated(&self, auto: bool) -> Option<UpdateReport> {
        info!("Check update (auto: {})", auto);
        let (prompt_always, allow_download) = if auto {
            if !self.config.check_on_startup().await {
                info!("Skip update check, config `checkOnStartup` is disabled.");
                return None;
            }
            let prompt = self.config.prompt().await;
            (prompt.prompt_always(), prompt.allow_download())
        } else {
            (true, true)
        };

        let client = self.client().await;
        let report = self
            .installer
            .ensure_updated(
                prompt_always,
                allow_download,
                client.as_deref(),
                &HostPrompt(self.host.as_ref()),
            )
            .await;
        info!("ensure_updated() result: {}", report);

        if let UpdateReport::Error { trace, .. } = &report {
            error!("error stacktrace: {}", trace.join("\n  caused by: "));
        }
        Some(report)
    }

    /// Installed server version, if known.
    pub async fn get_current_version(&self) -> Option<String> {
        match self.installer.check_version().await {
            VersionCheck::Different {
                current_version, ..
            } => Some(current_version),
            VersionCheck::Same { version } => Some(version),
            VersionCheck::Unknown => None,
        }
    }

    /// Configure a client for the resolved binary.
    pub async fn create_client(&self) -> Option<LspClient> {
        let (command, args) = self.resolve_bin().await?;
        info!("command: {}", command.display());
        info!("args: {:?}", args);

        let server = LspServerConfig::new("luals", "Sumneko Lua Language Server")
            .command(command.to_string_lossy(), args)
            .language_ids(vec!["lua"])
            .init_options(json!({ "changeConfiguration": true }));
        let middleware = LibraryMiddleware::new(
            self.host.clone(),
            self.config.clone(),
            self.stubs.clone(),
        );

        let mut client = LspClient::new(server)
            .with_request_handler(Arc::new(middleware))
            .with_launcher(self.launcher.clone());
        if let Some(root) = self.host.workspace_root() {
            client = client.with_root(&root);
        }
        Some(client)
    }

    /// Start a session. Returns false when there is no binary to run.
    pub async fn start_server(&self) -> Result<bool> {
        let Some(client) = self.create_client().await else {
            return Ok(false);
        };
        let client = Arc::new(client);
        self.set_state(SessionState::Starting);
        self.subscriptions
            .push(Box::new(ClientSubscription(client.clone())));

        self.activate_command(&client).await;
        self.activate_status_bar(&client).await;

        let started = async {
            client.start().await?;
            client.initialize().await?;
            client.did_change_configuration().await
        }
        .await;
        if let Err(e) = started {
            self.set_state(SessionState::Stopped);
            return Err(e.into());
        }

        *self.client.write().await = Some(client);
        self.set_state(SessionState::Ready);
        Ok(true)
    }

    async fn activate_status_bar(&self, client: &LspClient) {
        let status = Arc::new(StatusChannel::new(self.host.create_status_bar_item()));
        status.attach(client).await;
        self.subscriptions.push(Box::new(status.clone()));
        *self.status.lock() = Some(status);
    }

    async fn activate_command(&self, client: &LspClient) {
        config_edit::attach(self.host.clone(), client).await;
    }

    pub fn on_buffer_enter(&self, language_id: &str) {
        if let Some(status) = self.status.lock().as_ref() {
            status.on_buffer_enter(language_id);
        }
    }

    /// Shut the session down outside of a restart.
    pub async fn stop(&self) -> Result<()> {
        let client = self.client.write().await.take();
        self.set_state(SessionState::Stopped);
        if let Some(client) = client {
            client.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
