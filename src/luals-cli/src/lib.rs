//! Headless host for the lua-language-server extension.
//!
//! Settings come from a TOML file, messages go to the terminal, and every
//! `luals.*` command is available as a subcommand.

pub mod cli;
pub mod host;
pub mod logging;
pub mod settings;

pub use cli::{Cli, Commands, dispatch};
pub use host::{Runtime, TerminalHost};
pub use settings::SettingsFile;
