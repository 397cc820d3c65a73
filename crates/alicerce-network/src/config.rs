//! Network stack configuration

use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Configuration shared by every request of an HTTP network stack.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base URL that relative endpoint paths are resolved against
    pub base_url: Option<Url>,

    /// Request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Headers added to every request (endpoint headers take precedence)
    pub default_headers: HashMap<String, String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 10,
            default_headers: HashMap::new(),
        }
    }
}

impl NetworkConfig {
    /// Create a configuration resolving endpoints against `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url: Some(base_url),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Loads configuration from:
    /// - `ALICERCE_BASE_URL`: Base URL for relative endpoints
    /// - `ALICERCE_TIMEOUT`: Request timeout in seconds
    /// - `ALICERCE_CONNECT_TIMEOUT`: Connection timeout in seconds
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if `ALICERCE_BASE_URL` is set but isn't a valid URL.
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self, url::ParseError> {
        use std::env;

        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(base_url) = env::var("ALICERCE_BASE_URL") {
            config.base_url = Some(Url::parse(&base_url)?);
        }

        if let Ok(timeout_str) = env::var("ALICERCE_TIMEOUT")
            && let Ok(timeout_secs) = timeout_str.parse::<u64>()
        {
            config.timeout = Duration::from_secs(timeout_secs);
        }

        if let Ok(timeout_str) = env::var("ALICERCE_CONNECT_TIMEOUT")
            && let Ok(timeout_secs) = timeout_str.parse::<u64>()
        {
            config.connect_timeout = Duration::from_secs(timeout_secs);
        }

        Ok(config)
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host
    pub fn with_pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Add a header sent with every request
    pub fn with_default_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }
}
