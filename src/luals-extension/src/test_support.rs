//! In-memory host and language server for tests.

use crate::host::{Disposable, Host, StatusBarItem};
use crate::session::ServerLauncher;
use crate::{ExtensionError, Result};
use async_trait::async_trait;
use luals_lsp::LspClient;
use lsp_types::{ConfigurationItem, Url};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Message {
    Info(String),
    Error(String),
    Notification(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BarState {
    pub visible: bool,
    pub text: String,
    pub progress: bool,
}

#[derive(Default)]
pub(crate) struct FakeStatusBar {
    state: Mutex<BarState>,
}

impl FakeStatusBar {
    pub fn state(&self) -> BarState {
        self.state.lock().clone()
    }
}

impl StatusBarItem for FakeStatusBar {
    fn show(&self) {
        self.state.lock().visible = true;
    }

    fn hide(&self) {
        self.state.lock().visible = false;
    }

    fn set_text(&self, text: &str) {
        self.state.lock().text = text.to_string();
    }

    fn set_progress(&self, busy: bool) {
        self.state.lock().progress = busy;
    }
}

/// A recorded configuration write.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Update {
    pub key: String,
    pub value: Value,
    pub global: bool,
    pub scope: Option<Url>,
}

pub(crate) struct FakeHost {
    global: Mutex<Value>,
    workspace: Mutex<Value>,
    folder: Option<PathBuf>,
    storage: PathBuf,
    messages: Mutex<Vec<Message>>,
    updates: Mutex<Vec<Update>>,
    confirm_answer: AtomicBool,
    confirms: AtomicUsize,
    pick: Mutex<Option<usize>>,
    picked_from: Mutex<Vec<String>>,
    pub bar: Arc<FakeStatusBar>,
    commands: Arc<Mutex<Vec<String>>>,
    failing_command: Mutex<Option<String>>,
    dispose_attempts: Arc<AtomicUsize>,
    runtime_paths: Mutex<Vec<PathBuf>>,
    runtime_lua: Mutex<Option<PathBuf>>,
    user_config: Mutex<Option<PathBuf>>,
    prerelease: AtomicBool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            global: Mutex::new(json!({})),
            workspace: Mutex::new(json!({})),
            folder: None,
            storage: std::env::temp_dir().join("luals-fake-host"),
            messages: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            confirm_answer: AtomicBool::new(true),
            confirms: AtomicUsize::new(0),
            pick: Mutex::new(None),
            picked_from: Mutex::new(Vec::new()),
            bar: Arc::new(FakeStatusBar::default()),
            commands: Arc::new(Mutex::new(Vec::new())),
            failing_command: Mutex::new(None),
            dispose_attempts: Arc::new(AtomicUsize::new(0)),
            runtime_paths: Mutex::new(Vec::new()),
            runtime_lua: Mutex::new(None),
            user_config: Mutex::new(None),
            prerelease: AtomicBool::new(false),
        }
    }

    pub fn with_storage(mut self, storage: impl Into<PathBuf>) -> Self {
        self.storage = storage.into();
        self
    }

    pub fn with_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Set a global configuration key.
    pub fn set(&self, key: &str, value: Value) {
        set_path(&mut *self.global.lock(), key, value);
    }

    pub fn global(&self, key: &str) -> Option<Value> {
        get_path(&self.global.lock(), key)
    }

    pub fn workspace(&self, key: &str) -> Option<Value> {
        get_path(&self.workspace.lock(), key)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn updates(&self) -> Vec<Update> {
        self.updates.lock().clone()
    }

    pub fn answer_confirm(&self, answer: bool) {
        self.confirm_answer.store(answer, Ordering::SeqCst);
    }

    pub fn confirms(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }

    pub fn answer_pick(&self, index: Option<usize>) {
        *self.pick.lock() = index;
    }

    pub fn picked_from(&self) -> Vec<String> {
        self.picked_from.lock().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Make disposing the registration of `name` fail.
    pub fn fail_dispose_of(&self, name: &str) {
        *self.failing_command.lock() = Some(name.to_string());
    }

    pub fn dispose_attempts(&self) -> usize {
        self.dispose_attempts.load(Ordering::SeqCst)
    }

    pub fn set_runtime(
        &self,
        paths: Vec<PathBuf>,
        runtime_lua: Option<PathBuf>,
        user_config: Option<PathBuf>,
    ) {
        *self.runtime_paths.lock() = paths;
        *self.runtime_lua.lock() = runtime_lua;
        *self.user_config.lock() = user_config;
    }

    pub fn set_prerelease(&self, prerelease: bool) {
        self.prerelease.store(prerelease, Ordering::SeqCst);
    }
}

fn get_path(root: &Value, key: &str) -> Option<Value> {
    let mut node = root;
    for part in key.split('.') {
        node = node.get(part)?;
    }
    Some(node.clone())
}

fn set_path(root: &mut Value, key: &str, value: Value) {
    let parts: Vec<&str> = key.split('.').collect();
    let mut node = root;
    for part in &parts[..parts.len() - 1] {
        if !node.get(*part).is_some_and(Value::is_object) {
            node[*part] = Value::Object(Map::new());
        }
        node = &mut node[*part];
    }
    node[parts[parts.len() - 1]] = value;
}

struct CommandRegistration {
    name: String,
    commands: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl Disposable for CommandRegistration {
    async fn dispose(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExtensionError::Host(format!("cannot unregister {}", self.name)));
        }
        self.commands.lock().retain(|name| name != &self.name);
        Ok(())
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn get_config(&self, key: &str, _scope: Option<&Url>) -> Option<Value> {
        self.workspace(key).or_else(|| self.global(key))
    }

    async fn update_config(
        &self,
        key: &str,
        value: Value,
        global: bool,
        scope: Option<&Url>,
    ) -> Result<()> {
        if global {
            set_path(&mut *self.global.lock(), key, value.clone());
        } else {
            set_path(&mut *self.workspace.lock(), key, value.clone());
        }
        self.updates.lock().push(Update {
            key: key.to_string(),
            value,
            global,
            scope: scope.cloned(),
        });
        Ok(())
    }

    async fn workspace_configuration(&self, items: &[ConfigurationItem]) -> Value {
        let mut result = Vec::new();
        for item in items {
            let value = match &item.section {
                Some(section) => self.get_config(section, None).await,
                None => None,
            };
            result.push(value.unwrap_or(Value::Null));
        }
        Value::Array(result)
    }

    fn workspace_folder(&self, uri: &Url) -> Option<PathBuf> {
        let folder = self.folder.as_ref()?;
        let path = uri.to_file_path().ok()?;
        path.starts_with(folder).then(|| folder.clone())
    }

    fn workspace_root(&self) -> Option<PathBuf> {
        self.folder.clone()
    }

    async fn show_info(&self, message: &str) {
        self.messages.lock().push(Message::Info(message.to_string()));
    }

    async fn show_error(&self, message: &str) {
        self.messages.lock().push(Message::Error(message.to_string()));
    }

    async fn show_notification(&self, content: &str) {
        self.messages
            .lock()
            .push(Message::Notification(content.to_string()));
    }

    async fn confirm(&self, _message: &str) -> bool {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        self.confirm_answer.load(Ordering::SeqCst)
    }

    async fn quick_pick(&self, items: &[String]) -> Option<usize> {
        *self.picked_from.lock() = items.to_vec();
        *self.pick.lock()
    }

    fn create_status_bar_item(&self) -> Arc<dyn StatusBarItem> {
        self.bar.clone()
    }

    fn register_command(&self, name: &str) -> Box<dyn Disposable> {
        self.commands.lock().push(name.to_string());
        let fail = self.failing_command.lock().as_deref() == Some(name);
        Box::new(CommandRegistration {
            name: name.to_string(),
            commands: self.commands.clone(),
            attempts: self.dispose_attempts.clone(),
            fail,
        })
    }

    async fn runtime_paths(&self) -> Vec<PathBuf> {
        self.runtime_paths.lock().clone()
    }

    async fn runtime_lua_dir(&self) -> Option<PathBuf> {
        self.runtime_lua.lock().clone()
    }

    async fn user_config_dir(&self) -> Option<PathBuf> {
        self.user_config.lock().clone()
    }

    async fn is_prerelease(&self) -> bool {
        self.prerelease.load(Ordering::SeqCst)
    }

    fn storage_dir(&self) -> PathBuf {
        self.storage.clone()
    }
}

/// Connects clients to an in-memory server that answers the lifecycle requests.
#[derive(Default)]
pub(crate) struct FakeServer {
    launches: AtomicUsize,
    /// Sent to the client right after `initialized`.
    after_init: Mutex<Vec<Value>>,
}

impl FakeServer {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn send_after_init(&self, method: &str, params: Value) {
        self.after_init
            .lock()
            .push(json!({ "jsonrpc": "2.0", "method": method, "params": params }));
    }
}

#[async_trait]
impl ServerLauncher for FakeServer {
    async fn launch(&self, client: &LspClient) -> luals_lsp::Result<()> {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (read, write) = tokio::io::split(client_io);
        client.connect(read, write).await;
        tokio::spawn(serve(server_io, self.after_init.lock().clone()));
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn serve(io: DuplexStream, after_init: Vec<Value>) {
    let (read, mut write) = tokio::io::split(io);
    let mut read = BufReader::new(read);

    while let Some(message) = read_frame(&mut read).await {
        let reply = match message["method"].as_str() {
            Some("initialize") => Some(json!({ "capabilities": {} })),
            Some("shutdown") => Some(Value::Null),
            Some("initialized") => {
                for notification in &after_init {
                    write_frame(&mut write, notification).await;
                }
                None
            }
            Some("exit") => break,
            _ => None,
        };
        if let (Some(result), Some(id)) = (reply, message.get("id")) {
            write_frame(
                &mut write,
                &json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            )
            .await;
        }
    }
}

async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Value> {
    let mut length = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        if line == "\r\n" {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            length = value.trim().parse().ok()?;
        }
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.ok()?;
    serde_json::from_slice(&body).ok()
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) {
    let body = message.to_string();
    let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
    let _ = writer.write_all(frame.as_bytes()).await;
    let _ = writer.flush().await;
}

const RELEASE_PATH: &str = "/repos/LuaLS/lua-language-server/releases/latest";

fn server_tarball() -> Vec<u8> {
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::default(),
    ));
    for (name, data, mode) in [
        ("bin/lua-language-server", &b"#!/bin/sh\n"[..], 0o755),
        ("bin/main.lua", &b"-- entry\n"[..], 0o644),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Serve release `tag`; the asset download answers with `asset_status`.
pub(crate) async fn mount_release(server: &MockServer, tag: &str, asset_status: u16) {
    Mock::given(method("GET"))
        .and(path(RELEASE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": tag,
            "assets": [{
                "name": format!("lua-language-server-{}-linux-x64.tar.gz", tag),
                "browser_download_url": format!("{}/download/linux.tar.gz", server.uri())
            }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/linux.tar.gz"))
        .respond_with(ResponseTemplate::new(asset_status).set_body_bytes(server_tarball()))
        .mount(server)
        .await;
}
