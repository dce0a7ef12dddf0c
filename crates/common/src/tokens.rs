//! URL-safe tokens and HMAC-derived identities.
//!
//! Every store key that refers to a user or a shareable resource goes
//! through this module: room and call-url tokens are random URL-safe
//! strings, and user/session identities are HMAC-SHA256 digests of the
//! raw identifier keyed by a deployment secret, so the raw identity
//! never appears in the store.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Token generation failure.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The system CSPRNG could not produce bytes.
    #[error("system random number generator failed")]
    Rng,
}

/// Generate a random URL-safe token of `size` characters.
///
/// The alphabet is `[a-zA-Z0-9_-]` (base64 URL-safe, no padding),
/// matching the tokens any existing deployment already has in its
/// store, so old and new tokens are interchangeable.
///
/// # Errors
///
/// Returns [`TokenError::Rng`] if the system CSPRNG fails.
pub fn generate_token(size: usize) -> Result<String, TokenError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; size];
    rng.fill(&mut bytes).map_err(|_| TokenError::Rng)?;

    // base64 of n bytes is at least n characters, so the truncation
    // always yields a full-length token.
    let mut token = URL_SAFE_NO_PAD.encode(&bytes);
    token.truncate(size);
    Ok(token)
}

/// Derive the pseudonymous identity used in store keys.
///
/// HMAC-SHA256 of `value` keyed by `secret`, hex-encoded. The same
/// `(secret, value)` pair always maps to the same identity, which is
/// what makes it usable as the join key between a user and their
/// rooms, calls, and push subscriptions.
#[must_use]
pub fn hmac_id(secret: &[u8], value: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, value.as_bytes());
    hex::encode(tag.as_ref())
}
