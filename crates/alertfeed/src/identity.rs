//! Anonymous identity.
//!
//! A session is a bare opaque token with no profile behind it. It is only used
//! to authorize store operations and is never written onto an alert.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Opaque anonymous session token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token issued by an identity provider.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Something that can hand out anonymous sessions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Establish a new anonymous session.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot issue a session.
    async fn establish_anonymous_session(&self) -> Result<SessionToken>;
}

/// Mints sessions locally without contacting any service.
#[derive(Debug, Default)]
pub struct AnonymousIdentity {
    issued: AtomicU64,
}

impl AnonymousIdentity {
    /// Create a new local identity provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for AnonymousIdentity {
    async fn establish_anonymous_session(&self) -> Result<SessionToken> {
        let serial = self.issued.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .ok_or_else(|| Error::identity("system clock out of range"))?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&serial.to_le_bytes());
        let token = hasher.finalize().to_hex().to_string();

        debug!("Issued anonymous session #{}", serial);
        Ok(SessionToken(token))
    }
}

/// Establish a session, logging and swallowing failures.
///
/// The rest of the system proceeds without a session; store operations may
/// then be refused with a permission error.
pub async fn establish_session(provider: &dyn IdentityProvider) -> Option<SessionToken> {
    match provider.establish_anonymous_session().await {
        Ok(token) => Some(token),
        Err(e) => {
            warn!("Anonymous sign-in failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingIdentity;

    #[async_trait]
    impl IdentityProvider for FailingIdentity {
        async fn establish_anonymous_session(&self) -> Result<SessionToken> {
            Err(Error::identity("offline"))
        }
    }

    #[tokio::test]
    async fn test_anonymous_identity_issues_distinct_tokens() {
        let identity = AnonymousIdentity::new();
        let a = identity.establish_anonymous_session().await.unwrap();
        let b = identity.establish_anonymous_session().await.unwrap();

        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_establish_session_swallows_failure() {
        crate::logging::init_test_logging();
        assert!(establish_session(&FailingIdentity).await.is_none());
        assert!(establish_session(&AnonymousIdentity::new()).await.is_some());
    }

    #[test]
    fn test_session_token_debug_is_redacted() {
        let token = SessionToken::new("secret-token");
        assert_eq!(format!("{token:?}"), "SessionToken(..)");
    }
}
