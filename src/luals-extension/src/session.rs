//! Session lifecycle: state, launching, and the subscriptions torn down on restart.

use crate::Result;
use crate::host::Disposable;
use async_trait::async_trait;
use luals_lsp::LspClient;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

pub use luals_lsp::{ProcessLauncher, ServerLauncher};

/// Lifecycle of the language client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Ready,
    Restarting,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Restarting => "restarting",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Everything registered during one activation.
#[derive(Default)]
pub struct Subscriptions {
    items: Mutex<Vec<Box<dyn Disposable>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: Box<dyn Disposable>) {
        self.items.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Dispose every subscription, in registration order.
    ///
    /// A failing disposal is logged and does not stop the others. Returns the
    /// number of failures.
    pub async fn dispose_all(&self) -> usize {
        let items = std::mem::take(&mut *self.items.lock());
        let total = items.len();
        let mut failures = 0;

        for (index, item) in items.into_iter().enumerate() {
            if let Err(e) = item.dispose().await {
                failures += 1;
                error!("Failed to dispose subscription {}: {}", index, e);
            }
        }

        debug!("Disposed {} subscriptions ({} failed)", total, failures);
        failures
    }
}

/// Shuts the client down when disposed.
pub(crate) struct ClientSubscription(pub(crate) Arc<LspClient>);

#[async_trait]
impl Disposable for ClientSubscription {
    async fn dispose(&self) -> Result<()> {
        self.0.shutdown().await?;
        Ok(())
    }
}
