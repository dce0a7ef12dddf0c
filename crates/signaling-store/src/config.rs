//! Store configuration.
//!
//! Loaded from environment variables. The Redis URL may embed
//! credentials and is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default fixed call duration in seconds; a call record and its
/// state share this lifetime.
pub const DEFAULT_CALL_DURATION_SECONDS: u64 = 90;

/// Default Hawk session duration in seconds. All identity/session
/// association keys expire together after this long.
pub const DEFAULT_HAWK_SESSION_DURATION_SECONDS: u64 = 3600;

/// Default grace period during which a deleted-room marker survives,
/// so syncing clients can observe the deletion.
pub const DEFAULT_ROOMS_DELETED_TTL_SECONDS: u64 = 7 * 24 * 3600;

/// Default presence window for a room participant; a participant that
/// does not refresh within this window stops counting toward
/// capacity.
pub const DEFAULT_ROOM_PARTICIPANT_TTL_SECONDS: u64 = 300;

/// Default length of generated room tokens (characters).
pub const DEFAULT_ROOM_TOKEN_SIZE: usize = 8;

/// Signaling store configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Redis connection URL. Protected by `SecretString` to prevent
    /// accidental logging of embedded credentials.
    pub redis_url: SecretString,

    /// Fixed TTL applied to call records (default: 90).
    pub call_duration_seconds: u64,

    /// TTL applied to Hawk session association keys (default: 3600).
    pub hawk_session_duration_seconds: u64,

    /// Retention of deleted-room markers (default: 7 days).
    pub rooms_deleted_ttl_seconds: u64,

    /// Presence window for room participants (default: 300).
    pub room_participant_ttl_seconds: u64,

    /// Length of generated room tokens (default: 8).
    pub room_token_size: usize,
}

/// Custom Debug implementation that redacts the connection URL.
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("redis_url", &"[REDACTED]")
            .field("call_duration_seconds", &self.call_duration_seconds)
            .field(
                "hawk_session_duration_seconds",
                &self.hawk_session_duration_seconds,
            )
            .field("rooms_deleted_ttl_seconds", &self.rooms_deleted_ttl_seconds)
            .field(
                "room_participant_ttl_seconds",
                &self.room_participant_ttl_seconds,
            )
            .field("room_token_size", &self.room_token_size)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl StoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let call_duration_seconds =
            parse_var(vars, "CALL_DURATION_SECONDS", DEFAULT_CALL_DURATION_SECONDS)?;

        let hawk_session_duration_seconds = parse_var(
            vars,
            "HAWK_SESSION_DURATION_SECONDS",
            DEFAULT_HAWK_SESSION_DURATION_SECONDS,
        )?;

        let rooms_deleted_ttl_seconds = parse_var(
            vars,
            "ROOMS_DELETED_TTL_SECONDS",
            DEFAULT_ROOMS_DELETED_TTL_SECONDS,
        )?;

        let room_participant_ttl_seconds = parse_var(
            vars,
            "ROOM_PARTICIPANT_TTL_SECONDS",
            DEFAULT_ROOM_PARTICIPANT_TTL_SECONDS,
        )?;

        let room_token_size = parse_var(vars, "ROOM_TOKEN_SIZE", DEFAULT_ROOM_TOKEN_SIZE)?;

        Ok(StoreConfig {
            redis_url,
            call_duration_seconds,
            hawk_session_duration_seconds,
            rooms_deleted_ttl_seconds,
            room_participant_ttl_seconds,
            room_token_size,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "REDIS_URL".to_string(),
            "redis://localhost:6379".to_string(),
        )])
    }

    #[test]
    fn from_vars_success_with_defaults() {
        let config = StoreConfig::from_vars(&base_vars()).expect("config should load");

        assert_eq!(config.redis_url.expose_secret(), "redis://localhost:6379");
        assert_eq!(config.call_duration_seconds, DEFAULT_CALL_DURATION_SECONDS);
        assert_eq!(
            config.hawk_session_duration_seconds,
            DEFAULT_HAWK_SESSION_DURATION_SECONDS
        );
        assert_eq!(
            config.rooms_deleted_ttl_seconds,
            DEFAULT_ROOMS_DELETED_TTL_SECONDS
        );
        assert_eq!(
            config.room_participant_ttl_seconds,
            DEFAULT_ROOM_PARTICIPANT_TTL_SECONDS
        );
        assert_eq!(config.room_token_size, DEFAULT_ROOM_TOKEN_SIZE);
    }

    #[test]
    fn from_vars_missing_redis_url() {
        let err = StoreConfig::from_vars(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "REDIS_URL"));
    }

    #[test]
    fn from_vars_overrides() {
        let mut vars = base_vars();
        vars.insert("CALL_DURATION_SECONDS".to_string(), "120".to_string());
        vars.insert("ROOM_TOKEN_SIZE".to_string(), "12".to_string());

        let config = StoreConfig::from_vars(&vars).expect("config should load");
        assert_eq!(config.call_duration_seconds, 120);
        assert_eq!(config.room_token_size, 12);
    }

    #[test]
    fn from_vars_rejects_garbage() {
        let mut vars = base_vars();
        vars.insert(
            "HAWK_SESSION_DURATION_SECONDS".to_string(),
            "not-a-number".to_string(),
        );

        let err = StoreConfig::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn debug_redacts_redis_url() {
        let mut vars = base_vars();
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:password@localhost:6379".to_string(),
        );
        let config = StoreConfig::from_vars(&vars).expect("config should load");

        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("password"));
    }
}
