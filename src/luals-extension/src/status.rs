//! Status bar driven by the server's `$/status/*` notifications.

use crate::Result;
use crate::host::{Disposable, StatusBarItem};
use async_trait::async_trait;
use luals_lsp::{LspClient, notification_handler};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Marker the server puts in front of the text while it is busy.
pub const SPIN_MARKER: &str = "$(loading~spin)";

pub const SHOW: &str = "$/status/show";
pub const HIDE: &str = "$/status/hide";
pub const REPORT: &str = "$/status/report";

/// Params of `$/status/report`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportParams {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tooltip: String,
}

/// What the bar displays for a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    pub text: String,
    pub progress: bool,
}

pub fn parse_report_text(text: &str) -> StatusText {
    StatusText {
        text: text.replacen(SPIN_MARKER, "", 1),
        progress: text.contains(SPIN_MARKER),
    }
}

/// Status bar state for one session.
pub struct StatusChannel {
    bar: Arc<dyn StatusBarItem>,
    /// Set by `$/status/hide`; buffer switches keep the bar hidden.
    keep_hidden: AtomicBool,
    tooltip: Mutex<String>,
    disposed: AtomicBool,
}

impl StatusChannel {
    pub fn new(bar: Arc<dyn StatusBarItem>) -> Self {
        Self {
            bar,
            keep_hidden: AtomicBool::new(false),
            tooltip: Mutex::new(String::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn show(&self) {
        self.keep_hidden.store(false, Ordering::SeqCst);
        self.bar.show();
    }

    pub fn hide(&self) {
        self.keep_hidden.store(true, Ordering::SeqCst);
        self.bar.hide();
    }

    pub fn report(&self, params: ReportParams) {
        let status = parse_report_text(&params.text);
        self.bar.set_text(&status.text);
        self.bar.set_progress(status.progress);
        *self.tooltip.lock() = params.tooltip;
    }

    /// Last tooltip reported by the server.
    pub fn tooltip(&self) -> String {
        self.tooltip.lock().clone()
    }

    pub fn on_buffer_enter(&self, language_id: &str) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if language_id == "lua" && !self.keep_hidden.load(Ordering::SeqCst) {
            self.bar.show();
        } else {
            self.bar.hide();
        }
    }

    /// Route the status notifications of `client` to this channel.
    pub async fn attach(self: &Arc<Self>, client: &LspClient) {
        let channel = self.clone();
        client
            .on_notification(
                SHOW,
                notification_handler(move |_| {
                    let channel = channel.clone();
                    async move { channel.show() }
                }),
            )
            .await;

        let channel = self.clone();
        client
            .on_notification(
                HIDE,
                notification_handler(move |_| {
                    let channel = channel.clone();
                    async move { channel.hide() }
                }),
            )
            .await;

        let channel = self.clone();
        client
            .on_notification(
                REPORT,
                notification_handler(move |params: Value| {
                    let channel = channel.clone();
                    async move {
                        match serde_json::from_value::<ReportParams>(params) {
                            Ok(params) => channel.report(params),
                            Err(e) => debug!("Ignoring malformed status report: {}", e),
                        }
                    }
                }),
            )
            .await;
    }
}

#[async_trait]
impl Disposable for StatusChannel {
    async fn dispose(&self) -> Result<()> {
        self.disposed.store(true, Ordering::SeqCst);
        self.bar.hide();
        Ok(())
    }
}
