//! Installer for servers published as GitHub release archives.

pub mod archive;
pub mod http;
pub mod installer;
pub mod packages;
pub mod types;

pub use installer::{InstallPrompt, ServerInstaller};
pub use types::{
    Archiver, Channel, EnsureInstalled, PlatformPackage, Repository, UpdateReport, VersionCheck,
};
