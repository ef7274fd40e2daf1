//! Activation, restart and command dispatch.

use crate::commands::{self, Command};
use crate::ctx::Ctx;
use crate::host::Host;
use crate::session::{ProcessLauncher, ServerLauncher, SessionState, Subscriptions};
use crate::{ExtensionError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// The extension as loaded by one host.
pub struct Extension {
    host: Arc<dyn Host>,
    launcher: Arc<dyn ServerLauncher>,
    subscriptions: Arc<Subscriptions>,
    ctx: RwLock<Option<Arc<Ctx>>>,
    /// Bumped on restart; an activation started under an older value stops.
    generation: AtomicU64,
}

impl Extension {
    pub fn new(host: Arc<dyn Host>) -> Arc<Self> {
        Self::with_launcher(host, Arc::new(ProcessLauncher))
    }

    pub fn with_launcher(host: Arc<dyn Host>, launcher: Arc<dyn ServerLauncher>) -> Arc<Self> {
        Arc::new(Self {
            host,
            launcher,
            subscriptions: Arc::new(Subscriptions::new()),
            ctx: RwLock::new(None),
            generation: AtomicU64::new(0),
        })
    }

    /// Context of the current activation, if enabled.
    pub async fn ctx(&self) -> Option<Arc<Ctx>> {
        self.ctx.read().await.clone()
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        &self.subscriptions
    }

    fn superseded(&self, generation: u64) -> bool {
        let current = self.generation.load(Ordering::SeqCst);
        if current != generation {
            debug!(
                "Activation {} superseded by {}, stopping",
                generation, current
            );
            return true;
        }
        false
    }

    pub async fn activate(&self) -> Result<()> {
        let generation = self.generation.load(Ordering::SeqCst);
        info!("activating luals...");

        let ctx = Arc::new(
            Ctx::new(
                self.host.clone(),
                self.subscriptions.clone(),
                self.launcher.clone(),
            )
            .await?,
        );
        if !ctx.config.enabled().await {
            info!("luals is disabled");
            return Ok(());
        }
        if self.superseded(generation) {
            return Ok(());
        }

        *self.ctx.write().await = Some(ctx.clone());
        for command in Command::ALL {
            self.subscriptions
                .push(self.host.register_command(&command.full_name()));
        }

        if !ctx.ensure_installed().await || self.superseded(generation) {
            return Ok(());
        }

        match ctx.start_server().await {
            Ok(true) => {}
            Ok(false) => {
                info!("lua-language-server binary not found, not starting");
                return Ok(());
            }
            Err(e) => {
                error!("Failed to start lua-language-server: {}", e);
                self.host
                    .show_error(&format!("Failed to start lua-language-server: {}", e))
                    .await;
                return Ok(());
            }
        }
        if self.superseded(generation) {
            // The restart that superseded us already disposed the subscriptions.
            ctx.stop().await?;
            return Ok(());
        }

        ctx.ensure_updated(true).await;
        info!("Activated luals.");
        Ok(())
    }

    /// Run a registered command by name, with or without the `luals.` prefix.
    pub async fn execute_command(&self, name: &str) -> Result<()> {
        let command =
            Command::from_name(name).ok_or_else(|| ExtensionError::UnknownCommand(name.into()))?;
        let ctx = self.ctx().await.ok_or(ExtensionError::NotActive)?;
        debug!("Executing {}", command);

        match command {
            Command::Install => commands::install(&ctx).await,
            Command::Update => commands::update(&ctx).await,
            Command::Version => commands::version(&ctx).await,
            Command::Restart => return self.restart().await,
            Command::ShowTooltip => commands::show_tooltip(&ctx).await,
            Command::InsertNvimLuaPluginLibrary => {
                commands::insert_nvim_lua_plugin_library(&ctx).await
            }
            Command::DownloadNvimLuaTypes => commands::download_nvim_lua_types(&ctx).await,
        }
        Ok(())
    }

    /// Tear down everything and activate again.
    pub async fn restart(&self) -> Result<()> {
        self.host
            .show_info("Reloading sumneko lua-language-server...")
            .await;

        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(ctx) = self.ctx.write().await.take() {
            ctx.set_state(SessionState::Restarting);
        }
        let failures = self.subscriptions.dispose_all().await;
        if failures > 0 {
            error!("{} subscriptions failed to dispose", failures);
        }

        self.activate().await?;

        self.host
            .show_info("Reloaded sumneko lua-language-server")
            .await;
        Ok(())
    }

    pub async fn on_buffer_enter(&self, language_id: &str) {
        if let Some(ctx) = self.ctx().await {
            ctx.on_buffer_enter(language_id);
        }
    }

    /// Dispose everything registered by the current activation.
    pub async fn deactivate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(ctx) = self.ctx.write().await.take() {
            ctx.set_state(SessionState::Stopped);
        }
        self.subscriptions.dispose_all().await;
    }
}
