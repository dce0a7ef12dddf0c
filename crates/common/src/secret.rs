//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. Use `SecretString` for any
//! value that must never reach a log line: the Redis connection URL
//! (which may embed credentials), HMAC secrets, and session keys.
//!
//! `SecretString` implements `Debug` with redaction, so a struct that
//! derives `Debug` and holds one cannot leak it via `{:?}` or tracing.
//! Reading the value requires an explicit `expose_secret()` call, and
//! the backing memory is zeroized on drop.

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let secret = SecretString::from("redis://:hunter2@localhost:6379");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn expose_secret_returns_inner_value() {
        let secret = SecretString::from("session-key");
        assert_eq!(secret.expose_secret(), "session-key");
    }
}
