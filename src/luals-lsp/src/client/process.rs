//! LSP server process management and message transport.

use crate::{LspError, Result};
use async_trait::async_trait;
use lsp_types::*;
use serde_json::{Value, json};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    LspClient, NotificationHandlers, PendingRequests, ServerLauncher, ServerRequestHandler,
    SharedWriter,
};

/// Server requests answered with `null` when no handler takes them.
const NULL_RESULT_METHODS: &[&str] = &[
    "window/workDoneProgress/create",
    "client/registerCapability",
    "client/unregisterCapability",
];

/// JSON-RPC "method not found".
const METHOD_NOT_FOUND: i64 = -32601;

/// Spawns the configured command and talks to it over stdio.
pub struct ProcessLauncher;

#[async_trait]
impl ServerLauncher for ProcessLauncher {
    async fn launch(&self, client: &LspClient) -> Result<()> {
        client.spawn().await
    }
}

impl LspClient {
    /// Connect to the server through the configured launcher.
    pub async fn start(&self) -> Result<()> {
        let launcher = self.launcher.clone();
        launcher.launch(self).await
    }

    /// Start the LSP server process.
    pub async fn spawn(&self) -> Result<()> {
        let Some((program, args)) = self.config.command.split_first() else {
            return Err(LspError::StartFailed("No command specified".into()));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| LspError::StartFailed(format!("Failed to spawn {}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::StartFailed("Failed to get stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::StartFailed("Failed to get stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let name = self.config.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] {}", name, line);
                }
            });
        }

        self.connect(stdout, stdin).await;
        *self.process.lock().await = Some(child);

        info!("Started LSP server: {}", self.config.name);
        Ok(())
    }

    /// Attach to a server over already open streams and start reading from it.
    pub async fn connect<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        // The previous reader must be gone before it can touch the new connection's state.
        self.stop_reader().await;

        *self.writer.lock().await = Some(Box::new(writer));
        self.server_alive.store(true, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let dispatcher = Dispatcher {
            pending: self.pending_requests.clone(),
            handlers: self.notification_handlers.clone(),
            request_handler: self.request_handler.clone(),
            writer: self.writer.clone(),
        };
        let server_alive = self.server_alive.clone();
        let read_timeout = self.client_config.read_timeout;
        let max_content_length = self.client_config.max_content_length;

        let task = tokio::spawn(async move {
            read_messages(
                BufReader::new(reader),
                dispatcher,
                shutdown_rx,
                read_timeout,
                max_content_length,
            )
            .await;
            server_alive.store(false, Ordering::SeqCst);
        });
        *self.reader_task.lock().await = Some(task);
    }

    /// Signal the reader task and wait for it to exit.
    async fn stop_reader(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
        let Some(mut task) = self.reader_task.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(self.client_config.shutdown_timeout, &mut task)
            .await
            .is_err()
        {
            warn!("Response reader did not stop in time, aborting it");
            task.abort();
            let _ = task.await;
        }
    }

    /// Run the initialize handshake.
    #[allow(deprecated)] // root_uri is deprecated but still widely used
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: self.root_uri.clone(),
            capabilities: ClientCapabilities {
                workspace: Some(WorkspaceClientCapabilities {
                    configuration: Some(true),
                    did_change_configuration: Some(DynamicRegistrationClientCapabilities {
                        dynamic_registration: Some(false),
                    }),
                    ..Default::default()
                }),
                text_document: Some(TextDocumentClientCapabilities {
                    synchronization: Some(TextDocumentSyncClientCapabilities {
                        dynamic_registration: Some(false),
                        will_save: Some(false),
                        will_save_wait_until: Some(false),
                        did_save: Some(true),
                    }),
                    ..Default::default()
                }),
                window: Some(WindowClientCapabilities {
                    work_done_progress: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            initialization_options: if self.config.init_options.is_null() {
                None
            } else {
                Some(self.config.init_options.clone())
            },
            client_info: Some(ClientInfo {
                name: "luals".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        };

        let result: InitializeResult = self.request("initialize", params).await?;
        self.notify("initialized", InitializedParams {}).await?;

        self.initialized.store(true, Ordering::SeqCst);
        info!("LSP server initialized: {}", self.config.name);
        Ok(result)
    }

    /// Shutdown the LSP server.
    pub async fn shutdown(&self) -> Result<()> {
        if self.is_server_alive() {
            let shutdown_result = tokio::time::timeout(
                self.client_config.shutdown_timeout,
                self.request::<Value, Value>("shutdown", Value::Null),
            )
            .await;

            match shutdown_result {
                Ok(Ok(_)) => {
                    let _ = self.notify("exit", Value::Null).await;
                }
                Ok(Err(e)) => warn!("Shutdown request failed: {}", e),
                Err(_) => warn!("Shutdown request timed out"),
            }
        }

        self.stop_reader().await;
        self.server_alive.store(false, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        *self.writer.lock().await = None;

        if let Some(mut process) = self.process.lock().await.take() {
            let _ = process.kill().await;
        }
        self.pending_requests.write().await.clear();

        info!("LSP server shutdown: {}", self.config.name);
        Ok(())
    }

    /// Stop the server if it runs, then start and initialize it again.
    pub async fn restart(&self) -> Result<InitializeResult> {
        self.shutdown().await?;
        self.start().await?;
        self.initialize().await
    }

    pub(super) async fn send_message(&self, message: &Value) -> Result<()> {
        write_message(&self.writer, message).await?;
        debug!(
            "Sent LSP message: {}",
            message.get("method").unwrap_or(&serde_json::Value::Null)
        );
        Ok(())
    }
}

/// Write one framed message.
pub(crate) async fn write_message(writer: &SharedWriter, message: &Value) -> Result<()> {
    let content = serde_json::to_string(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", content.len());

    let mut writer = writer.lock().await;
    let Some(writer) = writer.as_mut() else {
        return Err(LspError::Communication("Server not started".into()));
    };
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(content.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Routes incoming messages to pending requests and handlers.
pub(crate) struct Dispatcher {
    pub(crate) pending: PendingRequests,
    pub(crate) handlers: NotificationHandlers,
    pub(crate) request_handler: Option<Arc<dyn ServerRequestHandler>>,
    pub(crate) writer: SharedWriter,
}

impl Dispatcher {
    pub(crate) async fn dispatch(&self, mut message: Value) {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = message.get("id").cloned();
        let params = message
            .get_mut("params")
            .map(Value::take)
            .unwrap_or(Value::Null);

        match (id, method) {
            (Some(id), Some(method)) => self.answer(id, method, params),
            (Some(id), None) => {
                let Some(id) = id.as_u64() else {
                    debug!("Ignoring response with foreign id {}", id);
                    return;
                };
                let tx = self.pending.write().await.remove(&id);
                if let Some(tx) = tx {
                    if tx.send(message).await.is_err() {
                        debug!("Failed to deliver response {}: receiver dropped", id);
                    }
                }
            }
            (None, Some(method)) => {
                let handler = self.handlers.read().await.get(&method).cloned();
                match handler {
                    Some(handler) => handler(params).await,
                    None => debug!("Unhandled notification {}", method),
                }
            }
            (None, None) => warn!("Ignoring malformed LSP message"),
        }
    }

    /// Server requests are answered on their own task so the reader keeps draining.
    fn answer(&self, id: Value, method: String, params: Value) {
        let handler = self.request_handler.clone();
        let writer = self.writer.clone();

        tokio::spawn(async move {
            let result = match &handler {
                Some(handler) => handler.handle(&method, params).await,
                None => None,
            };
            let result =
                result.or_else(|| NULL_RESULT_METHODS.contains(&method.as_str()).then_some(Value::Null));

            let reply = match result {
                Some(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                None => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": METHOD_NOT_FOUND,
                        "message": format!("Unhandled method {}", method)
                    }
                }),
            };
            if let Err(e) = write_message(&writer, &reply).await {
                warn!("Failed to answer server request {}: {}", method, e);
            }
        });
    }
}

/// Read messages until EOF, a fatal error, or a shutdown signal.
pub(crate) async fn read_messages<R: AsyncBufRead + Unpin>(
    mut reader: R,
    dispatcher: Dispatcher,
    mut shutdown_rx: mpsc::Receiver<()>,
    read_timeout: Duration,
    max_content_length: usize,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Response reader received shutdown signal");
                break;
            }
            result = read_single_message(&mut reader, read_timeout, max_content_length) => {
                match result {
                    Ok(Some(message)) => dispatcher.dispatch(message).await,
                    Ok(None) => {
                        debug!("LSP server closed stdout (EOF)");
                        break;
                    }
                    Err(e) if e.contains("timeout") => {
                        warn!("Timeout reading LSP message, continuing...");
                    }
                    Err(e) => {
                        error!("Error reading LSP message: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let mut pending = dispatcher.pending.write().await;
    if !pending.is_empty() {
        warn!(
            "Cleaning up {} pending requests due to reader exit",
            pending.len()
        );
        pending.clear();
    }
}

/// Read a single framed message.
pub(crate) async fn read_single_message<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    read_timeout: Duration,
    max_content_length: usize,
) -> std::result::Result<Option<Value>, String> {
    let mut content_length: usize = 0;

    loop {
        let mut line = String::new();
        match tokio::time::timeout(read_timeout, reader.read_line(&mut line)).await {
            Ok(Ok(0)) => return Ok(None),
            Ok(Ok(_)) => {
                if line == "\r\n" || line == "\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.trim().eq_ignore_ascii_case("content-length") {
                        content_length = value
                            .trim()
                            .parse()
                            .map_err(|e| format!("Invalid Content-Length: {}", e))?;
                        if content_length > max_content_length {
                            return Err(format!(
                                "Content-Length {} exceeds maximum allowed {}",
                                content_length, max_content_length
                            ));
                        }
                    }
                }
            }
            Ok(Err(e)) => return Err(format!("IO error reading headers: {}", e)),
            Err(_) => return Err("timeout reading headers".to_string()),
        }
    }

    if content_length == 0 {
        return Err("Invalid message: no Content-Length header".to_string());
    }

    let mut content = vec![0u8; content_length];
    match tokio::time::timeout(read_timeout, reader.read_exact(&mut content)).await {
        Ok(Ok(_)) => serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| format!("JSON parse error: {}", e)),
        Ok(Err(e)) => Err(format!("IO error reading content: {}", e)),
        Err(_) => Err("timeout reading content".to_string()),
    }
}

