//! Shared utilities for the signaling services.
//!
//! - [`secret`] - wrapper types that keep credentials out of logs
//! - [`tokens`] - URL-safe random tokens and HMAC-derived identities

pub mod secret;
pub mod tokens;
