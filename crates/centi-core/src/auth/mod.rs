//! Credential provider contract for remote sync.
//!
//! The core never implements the OAuth handshake itself. Client shells own
//! that flow and expose it through [`CredentialProvider`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::unix_timestamp_millis;

const EXPIRY_SKEW_MS: i64 = 5 * 60 * 1000;

/// A bearer token for the remote blob store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    /// Expiry timestamp (Unix ms)
    pub expires_at: i64,
}

impl AccessToken {
    /// Whether the token is expired or within the refresh skew window.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at - EXPIRY_SKEW_MS <= unix_timestamp_millis()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credential provider is not configured for this build.")]
    NotConfigured,
    #[error("Auth provider error: {0}")]
    Provider(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Source of remote-store credentials.
///
/// `valid_token` returning `Ok(None)` means "not signed in" and is not an
/// error; callers treat it as a silent skip.
#[allow(async_fn_in_trait)]
pub trait CredentialProvider {
    /// A currently valid token, refreshing transparently if the provider can.
    async fn valid_token(&self) -> AuthResult<Option<AccessToken>>;

    /// Obtain a fresh token; `force` bypasses any cached value.
    async fn refresh_token(&self, force: bool) -> AuthResult<Option<AccessToken>>;

    /// Drop the stored credential; the user must re-authenticate.
    async fn invalidate(&self) -> AuthResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_redacts_secret() {
        let token = AccessToken {
            token: "secret-access-token".to_string(),
            expires_at: 1_700_000_000_000,
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-access-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn token_expiry_applies_skew() {
        let live = AccessToken {
            token: "t".to_string(),
            expires_at: unix_timestamp_millis() + EXPIRY_SKEW_MS * 2,
        };
        assert!(!live.is_expired());

        let near_expiry = AccessToken {
            token: "t".to_string(),
            expires_at: unix_timestamp_millis() + EXPIRY_SKEW_MS / 2,
        };
        assert!(near_expiry.is_expired());
    }
}
