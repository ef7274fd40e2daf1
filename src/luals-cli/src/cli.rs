//! Command-line arguments and dispatch.

use crate::host::{Runtime, TerminalHost};
use crate::settings::SettingsFile;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use luals_extension::commands;
use luals_extension::{Ctx, Extension, ProcessLauncher, SessionState, Subscriptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "luals",
    version,
    about = "Install, update and run lua-language-server"
)]
pub struct Cli {
    /// Settings file (default: <config dir>/luals/settings.toml)
    #[arg(long, global = true, env = "LUALS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where servers and type stubs are stored (default: <data dir>/luals)
    #[arg(long, global = true, env = "LUALS_STORAGE")]
    pub storage: Option<PathBuf>,

    /// Workspace root; workspace settings live in <root>/.luals/settings.toml
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Editor runtime path entry (repeatable)
    #[arg(long = "runtime-path", global = true)]
    pub runtime_paths: Vec<PathBuf>,

    /// Editor runtime directory
    #[arg(long, global = true, env = "VIMRUNTIME")]
    pub vimruntime: Option<PathBuf>,

    /// Use the type stubs of pre-release editors
    #[arg(long, global = true)]
    pub nightly: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Download and install the configured release
    Install,
    /// Check for a newer release and install it
    Update,
    /// Print the installed server version
    Version,
    /// Print the command line used to start the server
    Command,
    /// Start a session and keep it running until Ctrl-C
    Run,
    /// Download the Neovim Lua type stubs
    DownloadTypes,
    /// Add the lua/ directory of a runtime path entry to Lua.workspace.library
    AddLibrary,
}

impl Cli {
    pub fn build_host(&self) -> Result<TerminalHost> {
        let settings = match &self.config {
            Some(path) => path.clone(),
            None => SettingsFile::default_path()
                .context("Cannot determine the configuration directory; pass --config")?,
        };
        let storage = match &self.storage {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .context("Cannot determine the data directory; pass --storage")?
                .join("luals"),
        };
        let runtime = Runtime {
            paths: self.runtime_paths.clone(),
            vimruntime: self.vimruntime.clone(),
            config_dir: dirs::config_dir().map(|dir| dir.join("nvim")),
            nightly: self.nightly,
        };

        let mut host = TerminalHost::new(SettingsFile::new(settings), storage)
            .with_runtime(runtime)
            .assume_yes(self.yes);
        if let Some(root) = &self.workspace {
            host = host.with_workspace(root.clone());
        }
        Ok(host)
    }
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let host = Arc::new(cli.build_host()?);

    if cli.command == Commands::Run {
        return run_session(host).await;
    }

    let ctx = Ctx::new(
        host,
        Arc::new(Subscriptions::new()),
        Arc::new(ProcessLauncher),
    )
    .await
    .context("Failed to set up luals")?;

    match cli.command {
        Commands::Install => commands::install(&ctx).await,
        Commands::Update => commands::update(&ctx).await,
        Commands::Version => commands::version(&ctx).await,
        Commands::DownloadTypes => commands::download_nvim_lua_types(&ctx).await,
        Commands::AddLibrary => commands::insert_nvim_lua_plugin_library(&ctx).await,
        Commands::Command => print_command(&ctx).await?,
        Commands::Run => {}
    }
    Ok(())
}

async fn print_command(ctx: &Ctx) -> Result<()> {
    let Some((command, args)) = ctx.resolve_bin().await else {
        bail!("lua-language-server is not installed; run `luals install`");
    };
    println!("{} {}", command.display(), args.join(" "));
    Ok(())
}

async fn run_session(host: Arc<TerminalHost>) -> Result<()> {
    let extension = Extension::new(host);
    extension.activate().await?;

    let Some(ctx) = extension.ctx().await else {
        bail!("luals is disabled (sumneko-lua.enable = false)");
    };
    if ctx.state() != SessionState::Ready {
        bail!("lua-language-server is not running");
    }
    let Some(client) = ctx.client().await else {
        bail!("lua-language-server is not running");
    };

    info!("lua-language-server running, press Ctrl-C to stop");
    let mut alive = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = alive.tick() => {
                if !client.is_server_alive() {
                    info!("lua-language-server exited");
                    break;
                }
            }
        }
    }

    extension.deactivate().await;
    Ok(())
}
