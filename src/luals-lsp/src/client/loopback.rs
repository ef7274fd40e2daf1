//! In-memory language server for tests.

use super::process::read_single_message;
use super::{LspClient, ServerLauncher};
use crate::{LspError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};

/// Answers `initialize`, `shutdown` and `$/ping`; counts connections.
#[derive(Default)]
pub(crate) struct Loopback {
    launches: AtomicUsize,
    /// Launches past this count fail.
    limit: Option<usize>,
}

impl Loopback {
    pub(crate) fn failing_after(launches: usize) -> Self {
        Self {
            launches: AtomicUsize::new(0),
            limit: Some(launches),
        }
    }

    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerLauncher for Loopback {
    async fn launch(&self, client: &LspClient) -> Result<()> {
        let launched = self.launches.fetch_add(1, Ordering::SeqCst);
        if self.limit.is_some_and(|limit| launched >= limit) {
            return Err(LspError::StartFailed("loopback server unavailable".into()));
        }

        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        client.connect(client_read, client_write).await;

        tokio::spawn(async move {
            let (server_read, mut server_write) = tokio::io::split(server_io);
            let mut server_read = BufReader::new(server_read);
            while let Ok(Some(message)) =
                read_single_message(&mut server_read, Duration::from_secs(5), 1024 * 1024).await
            {
                if message["method"] == "exit" {
                    break;
                }
                let Some(id) = message.get("id") else {
                    continue;
                };
                let result = match message["method"].as_str() {
                    Some("initialize") => json!({ "capabilities": {} }),
                    Some("$/ping") => json!({ "pong": true }),
                    _ => Value::Null,
                };
                let body = json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string();
                let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
                if server_write.write_all(frame.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }
}
