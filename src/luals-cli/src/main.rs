//! luals - install, update and run lua-language-server from the terminal.

use anyhow::Result;
use clap::Parser;

use luals_cli::{Cli, dispatch, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_file.as_deref(), cli.verbose)?;

    dispatch(cli).await
}
