//! LSP client implementation.

mod config;
#[cfg(test)]
pub(crate) mod loopback;
mod process;

pub use config::LspClientConfig;
pub use process::ProcessLauncher;

use crate::{LspError, LspServerConfig, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use lsp_types::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::AsyncWrite;
use tokio::process::Child;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;

/// Handler for a server notification. Handlers run in arrival order.
pub type NotificationHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`NotificationHandler`].
pub fn notification_handler<F, Fut>(f: F) -> NotificationHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)))
}

/// Answers requests the server sends to the client.
#[async_trait]
pub trait ServerRequestHandler: Send + Sync {
    /// Returns the result, or `None` when the method is not handled.
    async fn handle(&self, method: &str, params: Value) -> Option<Value>;
}

/// Connects a client to its server. [`LspClient::start`] goes through it.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(&self, client: &LspClient) -> Result<()>;
}

pub(crate) type Writer = Box<dyn AsyncWrite + Send + Unpin>;
pub(crate) type SharedWriter = Arc<Mutex<Option<Writer>>>;
pub(crate) type PendingRequests = Arc<RwLock<HashMap<u64, mpsc::Sender<Value>>>>;
pub(crate) type NotificationHandlers = Arc<RwLock<HashMap<String, NotificationHandler>>>;

/// LSP client for communicating with a language server.
pub struct LspClient {
    pub(crate) config: LspServerConfig,
    pub(crate) client_config: LspClientConfig,
    pub(crate) process: Mutex<Option<Child>>,
    pub(crate) writer: SharedWriter,
    pub(crate) request_id: AtomicU64,
    pub(crate) pending_requests: PendingRequests,
    pub(crate) root_uri: Option<Url>,
    pub(crate) initialized: AtomicBool,
    /// Flag indicating if the server process has crashed or stopped.
    pub(crate) server_alive: Arc<AtomicBool>,
    pub(crate) notification_handlers: NotificationHandlers,
    pub(crate) request_handler: Option<Arc<dyn ServerRequestHandler>>,
    pub(crate) launcher: Arc<dyn ServerLauncher>,
    /// Shutdown signal sender for the response reader task.
    pub(crate) shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    /// Reader task of the current connection.
    pub(crate) reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl LspClient {
    /// Create a new LSP client with default configuration.
    pub fn new(config: LspServerConfig) -> Self {
        Self::with_client_config(config, LspClientConfig::default())
    }

    /// Create a new LSP client with custom client configuration.
    pub fn with_client_config(config: LspServerConfig, client_config: LspClientConfig) -> Self {
        Self {
            config,
            client_config,
            process: Mutex::new(None),
            writer: Arc::new(Mutex::new(None)),
            request_id: AtomicU64::new(1),
            pending_requests: Arc::new(RwLock::new(HashMap::new())),
            root_uri: None,
            initialized: AtomicBool::new(false),
            server_alive: Arc::new(AtomicBool::new(false)),
            notification_handlers: Arc::new(RwLock::new(HashMap::new())),
            request_handler: None,
            launcher: Arc::new(ProcessLauncher),
            shutdown_tx: Mutex::new(None),
            reader_task: Mutex::new(None),
        }
    }

    /// Set the workspace root for this client.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.root_uri = Url::from_file_path(root).ok();
        self
    }

    /// Answer server-to-client requests with `handler`.
    pub fn with_request_handler(mut self, handler: Arc<dyn ServerRequestHandler>) -> Self {
        self.request_handler = Some(handler);
        self
    }

    /// Connect through `launcher` instead of spawning the configured command.
    pub fn with_launcher(mut self, launcher: Arc<dyn ServerLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn config(&self) -> &LspServerConfig {
        &self.config
    }

    /// Register the handler for a notification method, replacing any previous one.
    pub async fn on_notification(&self, method: impl Into<String>, handler: NotificationHandler) {
        self.notification_handlers
            .write()
            .await
            .insert(method.into(), handler);
    }

    /// Check if the server process is still alive.
    pub fn is_server_alive(&self) -> bool {
        self.server_alive.load(Ordering::SeqCst)
    }

    /// True once the initialize handshake completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_server_alive(&self) -> Result<()> {
        if !self.server_alive.load(Ordering::SeqCst) {
            return Err(LspError::Communication(
                "LSP server has crashed or is not running".into(),
            ));
        }
        Ok(())
    }

    /// Send a request to the LSP server.
    pub async fn request<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R> {
        self.ensure_server_alive()?;

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let (tx, mut rx) = mpsc::channel(1);
        self.pending_requests.write().await.insert(id, tx);

        if let Err(e) = self.send_message(&request).await {
            self.pending_requests.write().await.remove(&id);
            return Err(e);
        }

        let timeout_result =
            tokio::time::timeout(self.client_config.request_timeout, rx.recv()).await;
        self.pending_requests.write().await.remove(&id);

        let response = match timeout_result {
            Ok(Some(response)) => response,
            Ok(None) => {
                return Err(LspError::Communication(
                    "Response channel closed unexpectedly".into(),
                ));
            }
            Err(_) => {
                warn!(
                    "LSP request '{}' (id={}) timed out after {:?}",
                    method, id, self.client_config.request_timeout
                );
                return Err(LspError::Timeout);
            }
        };

        if let Some(error) = response.get("error") {
            return Err(LspError::Communication(error.to_string()));
        }

        let result = response.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| e.into())
    }

    /// Send a notification to the LSP server.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });

        self.send_message(&notification).await
    }

    /// Tell the server its settings changed so it pulls them again.
    pub async fn did_change_configuration(&self) -> Result<()> {
        self.notify(
            "workspace/didChangeConfiguration",
            json!({ "settings": Value::Null }),
        )
        .await
    }
}
