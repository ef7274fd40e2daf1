//! Types for the server installer.

use regex::Regex;
use std::fmt;

/// Name of the file holding the installed release tag.
pub const VERSION_FILE: &str = ".version";

/// Archive format of a release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archiver {
    Zip,
    TarGzip,
}

/// Release asset description for one platform.
#[derive(Debug, Clone)]
pub struct PlatformPackage {
    /// Pattern the release asset name must match.
    pub platform_filename: Regex,
    /// How the asset is packed.
    pub archiver: Archiver,
    /// Path of the executable relative to the install directory.
    pub executable: String,
}

/// Which release to follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Latest,
    Tag(String),
}

impl Channel {
    /// `"latest"` follows the newest release, anything else pins a tag.
    pub fn from_version(version: &str) -> Self {
        if version == "latest" {
            Self::Latest
        } else {
            Self::Tag(version.to_string())
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Tag(tag) => write!(f, "tag/{tag}"),
        }
    }
}

/// GitHub repository the server is released from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// GitHub owner/repo.
    pub repo: String,
    pub channel: Channel,
}

/// Result of [`ServerInstaller::ensure_installed`](super::ServerInstaller::ensure_installed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsureInstalled {
    /// The binary resolves after the call.
    pub available: bool,
    /// A download happened during the call.
    pub installed: bool,
}

/// Installed version compared to the release channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    Same {
        version: String,
    },
    Different {
        current_version: String,
        latest_version: String,
    },
    Unknown,
}

/// Outcome of an update check. Errors are carried, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReport {
    UpToDate { version: String },
    Updated { from: String, to: String },
    /// The new version is installed but the client did not come back up.
    RestartFailed { from: String, to: String, message: String },
    Declined,
    Skipped { reason: String },
    Error { message: String, trace: Vec<String> },
}

impl UpdateReport {
    /// Build an error report from an error and its source chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }
        Self::Error {
            message: err.to_string(),
            trace,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate { version } => write!(f, "up to date ({version})"),
            Self::Updated { from, to } => write!(f, "updated {from} -> {to}"),
            Self::RestartFailed { from, to, message } => {
                write!(f, "updated {from} -> {to}, restart failed: {message}")
            }
            Self::Declined => f.write_str("update declined"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Error { message, .. } => write!(f, "error: {message}"),
        }
    }
}
