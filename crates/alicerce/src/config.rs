//! Configuration for the fetch orchestrator

/// Configuration of a [`Store`](crate::Store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Remove the persisted payload of a resource when a payload fails to decode
    pub evict_on_decode_failure: bool,

    /// Refresh the persisted payload from the network after serving a cache hit
    /// (`PersistenceThenNetwork` only)
    pub refresh_in_background: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            evict_on_decode_failure: true,
            refresh_in_background: true,
        }
    }
}

impl StoreConfig {
    /// Create configuration from environment variables
    ///
    /// Loads configuration from:
    /// - `ALICERCE_EVICT_ON_DECODE_FAILURE`: `true` or `false`
    /// - `ALICERCE_REFRESH_IN_BACKGROUND`: `true` or `false`
    ///
    /// Unset or unparseable variables keep their default value.
    #[cfg(feature = "env")]
    pub fn from_env() -> Self {
        use std::env;

        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(value) = env::var("ALICERCE_EVICT_ON_DECODE_FAILURE")
            && let Ok(evict) = value.parse::<bool>()
        {
            config.evict_on_decode_failure = evict;
        }

        if let Ok(value) = env::var("ALICERCE_REFRESH_IN_BACKGROUND")
            && let Ok(refresh) = value.parse::<bool>()
        {
            config.refresh_in_background = refresh;
        }

        config
    }

    /// Set whether undecodable payloads are evicted from persistence
    pub fn with_evict_on_decode_failure(mut self, evict: bool) -> Self {
        self.evict_on_decode_failure = evict;
        self
    }

    /// Set whether cache hits trigger a background network refresh
    pub fn with_refresh_in_background(mut self, refresh: bool) -> Self {
        self.refresh_in_background = refresh;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();

        assert!(config.evict_on_decode_failure);
        assert!(config.refresh_in_background);
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::default()
            .with_evict_on_decode_failure(false)
            .with_refresh_in_background(false);

        assert!(!config.evict_on_decode_failure);
        assert!(!config.refresh_in_background);
    }

    #[cfg(feature = "env")]
    #[test]
    fn test_config_from_env_variables() {
        temp_env::with_vars(
            [
                ("ALICERCE_EVICT_ON_DECODE_FAILURE", Some("false")),
                ("ALICERCE_REFRESH_IN_BACKGROUND", Some("not-a-bool")),
            ],
            || {
                let config = StoreConfig::from_env();

                assert!(!config.evict_on_decode_failure);
                assert!(config.refresh_in_background);
            },
        );
    }
}
