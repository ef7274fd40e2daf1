//! Client timeouts and limits.

use std::time::Duration;

/// Maximum allowed content length of one message (10MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Limits applied by [`LspClient`](super::LspClient).
#[derive(Debug, Clone)]
pub struct LspClientConfig {
    /// How long a request waits for its response.
    pub request_timeout: Duration,
    /// How long reading one header line or body may take.
    pub read_timeout: Duration,
    /// How long the `shutdown` request may take before the process is killed.
    pub shutdown_timeout: Duration,
    pub max_content_length: usize,
}

impl Default for LspClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
            max_content_length: MAX_CONTENT_LENGTH,
        }
    }
}

impl LspClientConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
