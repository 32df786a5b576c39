use std::time::Duration;

/// Environment variable overriding the configured service base URL.
pub const BASE_URL_ENV: &str = "SHOWRUNNER_API_BASE_URL";

/// Runtime configuration describing how to reach the catalog and score services.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Root URL shared by the catalog and score endpoints.
    pub base_url: String,
    /// Upper bound of a single request.
    pub call_timeout: Duration,
}

impl HttpConfig {
    /// Construct a configuration from an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            call_timeout: Duration::from_secs(5),
        }
    }

    /// Bound every call to `call_timeout`.
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Replace the base URL with the environment override when it is set.
    pub fn with_env_override(mut self) -> Self {
        if let Some(base_url) = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            self.base_url = base_url;
        }
        self
    }
}
