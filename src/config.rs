use serde::{Deserialize, Serialize};

use crate::utils::get_env_with_prefix;

/// Main configuration for a Lernwerk application
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub billing: BillingConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

/// Billing and webhook settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BillingConfig {
    /// Shared secret used to verify webhook signatures.
    ///
    /// Loaded from `LERNWERK_WEBHOOK_SECRET`. Kept as a plain string here so
    /// the config stays serializable; wrap it in a `SecretString` at the
    /// point of use (the webhook handler does this on construction).
    #[serde(default)]
    pub webhook_secret: String,
    /// Maximum accepted age of a webhook signature timestamp, in seconds.
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_seconds: u64,
}

/// Generation collaborator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// TTL for cached generation responses, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Maximum number of cached generation responses.
    #[serde(default = "default_cache_entries")]
    pub cache_max_entries: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            billing: BillingConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            signature_tolerance_seconds: default_signature_tolerance(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl(),
            cache_max_entries: default_cache_entries(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

fn default_signature_tolerance() -> u64 {
    300
}

fn default_cache_ttl() -> u64 {
    3600 // 1 hour, matches the upstream response cache
}

fn default_cache_entries() -> u64 {
    10_000
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.billing.webhook_secret = secret.into();
        self
    }

    pub fn with_signature_tolerance_seconds(mut self, seconds: u64) -> Self {
        self.config.billing.signature_tolerance_seconds = seconds;
        self
    }

    pub fn with_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.generation.cache_ttl_seconds = seconds;
        self
    }

    pub fn with_cache_max_entries(mut self, entries: u64) -> Self {
        self.config.generation.cache_max_entries = entries;
        self
    }

    /// Load configuration from environment variables with LERNWERK_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(secret) = get_env_with_prefix("WEBHOOK_SECRET") {
            self.config.billing.webhook_secret = secret;
        }
        if let Some(tolerance) = get_env_with_prefix("SIGNATURE_TOLERANCE_SECONDS") {
            if let Ok(t) = tolerance.parse() {
                self.config.billing.signature_tolerance_seconds = t;
            }
        }
        if let Some(ttl) = get_env_with_prefix("CACHE_TTL_SECONDS") {
            if let Ok(t) = ttl.parse() {
                self.config.generation.cache_ttl_seconds = t;
            }
        }
        if let Some(entries) = get_env_with_prefix("CACHE_MAX_ENTRIES") {
            if let Ok(e) = entries.parse() {
                self.config.generation.cache_max_entries = e;
            }
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid:
    /// - Invalid log level
    /// - Zero signature tolerance
    /// - Zero cache capacity
    pub fn build(self) -> crate::error::Result<Config> {
        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(crate::error::LernwerkError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.billing.signature_tolerance_seconds == 0 {
            return Err(crate::error::LernwerkError::bad_request(
                "Webhook signature tolerance must be greater than 0",
            ));
        }

        if self.config.generation.cache_max_entries == 0 {
            return Err(crate::error::LernwerkError::bad_request(
                "Generation cache capacity must be greater than 0",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.billing.signature_tolerance_seconds, 300);
        assert_eq!(config.generation.cache_ttl_seconds, 3600);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_log_level("debug")
            .with_webhook_secret("whsec_test")
            .with_cache_ttl_seconds(60)
            .build()
            .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.billing.webhook_secret, "whsec_test");
        assert_eq!(config.generation.cache_ttl_seconds, 60);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = ConfigBuilder::new().with_log_level("verbose").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_tolerance_rejected() {
        let result = ConfigBuilder::new()
            .with_signature_tolerance_seconds(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_cache_capacity_rejected() {
        let result = ConfigBuilder::new().with_cache_max_entries(0).build();
        assert!(result.is_err());
    }
}
