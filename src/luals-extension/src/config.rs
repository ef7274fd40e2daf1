//! The `sumneko-lua` configuration section.

use crate::host::Host;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Root section of the extension settings.
pub const SECTION: &str = "sumneko-lua";

/// Extra command line arguments for the server.
pub const MISC_PARAMETERS: &str = "Lua.misc.parameters";

/// Whether the user is asked before downloads, and whether downloads happen at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawPrompt")]
pub enum PromptPolicy {
    #[default]
    Always,
    Never,
    NeverDownload,
}

impl PromptPolicy {
    pub fn prompt_always(self) -> bool {
        self == PromptPolicy::Always
    }

    pub fn allow_download(self) -> bool {
        self != PromptPolicy::NeverDownload
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrompt {
    Flag(bool),
    Word(String),
}

impl TryFrom<RawPrompt> for PromptPolicy {
    type Error = String;

    fn try_from(raw: RawPrompt) -> Result<Self, Self::Error> {
        match raw {
            RawPrompt::Flag(true) => Ok(PromptPolicy::Always),
            RawPrompt::Flag(false) => Ok(PromptPolicy::Never),
            RawPrompt::Word(word) if word == "neverDownload" => Ok(PromptPolicy::NeverDownload),
            RawPrompt::Word(word) => Err(format!("invalid prompt policy: {}", word)),
        }
    }
}

/// Language of server messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Locale {
    #[default]
    EnUs,
    PtBr,
    ZhCn,
    ZhTw,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Locale::EnUs => "en-us",
            Locale::PtBr => "pt-br",
            Locale::ZhCn => "zh-cn",
            Locale::ZhTw => "zh-tw",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the `sumneko-lua` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub enable: bool,

    #[serde(default)]
    pub prompt: PromptPolicy,

    #[serde(default)]
    pub locale: Locale,

    /// Server log directory; empty leaves the server default.
    #[serde(default)]
    pub log_path: String,

    /// Add the editor runtime and type stubs to the server library.
    #[serde(default)]
    pub enable_nvim_lua_dev: bool,

    #[serde(default = "default_true")]
    pub check_on_startup: bool,

    /// `latest` or a release tag.
    #[serde(default = "default_version")]
    pub version: String,

    /// Server binary to use instead of the managed install.
    #[serde(default)]
    pub custom_path: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "latest".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable: true,
            prompt: PromptPolicy::default(),
            locale: Locale::default(),
            log_path: String::new(),
            enable_nvim_lua_dev: false,
            check_on_startup: true,
            version: default_version(),
            custom_path: None,
        }
    }
}

impl Settings {
    /// Parse a section value; anything malformed yields the defaults.
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Settings::default(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Invalid {} configuration, using defaults: {}", SECTION, e);
                Settings::default()
            }),
        }
    }
}

/// Read-through accessor: every getter consults the host again.
#[derive(Clone)]
pub struct Config {
    host: Arc<dyn Host>,
}

impl Config {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    pub async fn settings(&self) -> Settings {
        Settings::from_value(self.host.get_config(SECTION, None).await)
    }

    pub async fn enabled(&self) -> bool {
        self.settings().await.enable
    }

    pub async fn prompt(&self) -> PromptPolicy {
        self.settings().await.prompt
    }

    pub async fn locale(&self) -> Locale {
        self.settings().await.locale
    }

    pub async fn log_path(&self) -> String {
        self.settings().await.log_path
    }

    pub async fn nvim_lua_dev(&self) -> bool {
        self.settings().await.enable_nvim_lua_dev
    }

    pub async fn check_on_startup(&self) -> bool {
        self.settings().await.check_on_startup
    }

    pub async fn version(&self) -> String {
        self.settings().await.version
    }

    pub async fn custom_path(&self) -> Option<String> {
        self.settings().await.custom_path.filter(|p| !p.is_empty())
    }

    /// `Lua.misc.parameters`, ignoring non-string entries.
    pub async fn misc_parameters(&self) -> Vec<String> {
        match self.host.get_config(MISC_PARAMETERS, None).await {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}
