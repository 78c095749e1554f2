//! Engine configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted length for generated codes and tokens.
///
/// 22 symbols from the 64-symbol alphabet carry 132 bits of entropy.
pub const MIN_TOKEN_LENGTH: usize = 22;

/// Longest accepted lifetime, ten years.
pub const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Lifetimes and generation parameters for the OAuth engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime in seconds
    pub authorization_code_lifetime_secs: i64,
    /// Access token lifetime in seconds, reported as `expires_in`
    pub access_token_lifetime_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_lifetime_secs: i64,
    /// Number of characters in an authorization code
    pub code_length: usize,
    /// Number of characters in access and refresh tokens
    pub token_length: usize,
    /// Upper bound on the `state` parameter
    pub max_state_length: usize,
    /// Identity returned by the fixed user resolver
    pub demo_user_id: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime_secs: 600, // 10 minutes
            access_token_lifetime_secs: 3600,      // 1 hour
            refresh_token_lifetime_secs: 2_592_000, // 30 days
            code_length: 32,
            token_length: 64,
            max_state_length: 256,
            demo_user_id: "demo-user".to_string(),
        }
    }
}

impl OAuthConfig {
    /// Parse a JSON configuration document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lifetimes = [
            (
                "authorization_code_lifetime_secs",
                self.authorization_code_lifetime_secs,
            ),
            ("access_token_lifetime_secs", self.access_token_lifetime_secs),
            ("refresh_token_lifetime_secs", self.refresh_token_lifetime_secs),
        ];
        for (key, secs) in lifetimes {
            if secs < 0 {
                return Err(invalid(key, "lifetime must not be negative"));
            }
            if secs > MAX_LIFETIME_SECS {
                return Err(invalid(
                    key,
                    format!("lifetime must not exceed {} seconds", MAX_LIFETIME_SECS),
                ));
            }
        }

        for (key, len) in [
            ("code_length", self.code_length),
            ("token_length", self.token_length),
        ] {
            if len < MIN_TOKEN_LENGTH {
                return Err(invalid(
                    key,
                    format!("must be at least {} characters", MIN_TOKEN_LENGTH),
                ));
            }
        }

        if self.max_state_length == 0 {
            return Err(invalid("max_state_length", "must be greater than zero"));
        }

        if self.demo_user_id.is_empty() {
            return Err(invalid("demo_user_id", "must not be empty"));
        }

        Ok(())
    }

    pub fn authorization_code_lifetime(&self) -> Duration {
        Duration::seconds(self.authorization_code_lifetime_secs)
    }

    pub fn access_token_lifetime(&self) -> Duration {
        Duration::seconds(self.access_token_lifetime_secs)
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        Duration::seconds(self.refresh_token_lifetime_secs)
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}
