//! Access credentials and their per-provider cache.
//!
//! Every provider owns one [`CredentialCache`]. Only the authenticate step
//! writes it and only sign-out clears it. Callers that arrive while a consent
//! prompt is pending share its outcome instead of starting a second one.

use crate::errors::AuthError;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Token expiry buffer (1 minute). Tokens this close to expiry count as lapsed.
pub const TOKEN_EXPIRY_BUFFER_SECONDS: i64 = 60;

/// Lifetime assumed when the identity provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;

/// Access token with metadata.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The token string.
    pub token: SecretString,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// Expiration time.
    pub expires_at: DateTime<Utc>,

    /// Scopes granted.
    pub scopes: Vec<String>,
}

impl AccessToken {
    /// Creates a new access token.
    pub fn new(
        token: impl Into<String>,
        token_type: impl Into<String>,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            token: SecretString::new(token.into()),
            token_type: token_type.into(),
            expires_at,
            scopes,
        }
    }

    /// Creates a bearer token from an `expires_in` lifetime in seconds.
    pub fn bearer(token: impl Into<String>, expires_in: Option<i64>, scope: Option<&str>) -> Self {
        let lifetime = expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECONDS);
        let scopes = scope
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        Self::new(
            token,
            "Bearer",
            Utc::now() + Duration::seconds(lifetime),
            scopes,
        )
    }

    /// Checks if the token is expired, including the safety buffer.
    pub fn is_expired(&self) -> bool {
        let threshold = self.expires_at - Duration::seconds(TOKEN_EXPIRY_BUFFER_SECONDS);
        Utc::now() >= threshold
    }

    /// Returns the authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.token.expose_secret())
    }
}

/// Outcome of the most recent consent attempt, guarded by the consent gate.
#[derive(Default)]
struct ConsentOutcome {
    attempts: u64,
    failure: Option<AuthError>,
}

/// Cached credential plus the gate that coalesces consent prompts.
#[derive(Default)]
pub struct CredentialCache {
    token: RwLock<Option<AccessToken>>,
    consent: Mutex<ConsentOutcome>,
    attempts: AtomicU64,
}

impl CredentialCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached credential if it has not lapsed.
    pub async fn current(&self) -> Option<AccessToken> {
        self.token
            .read()
            .await
            .as_ref()
            .filter(|t| !t.is_expired())
            .cloned()
    }

    /// Returns a usable credential or the reason there is none.
    pub async fn require(&self) -> Result<AccessToken, AuthError> {
        match self.token.read().await.as_ref() {
            Some(token) if !token.is_expired() => Ok(token.clone()),
            Some(_) => Err(AuthError::Expired(
                "access token has expired; authenticate again".to_string(),
            )),
            None => Err(AuthError::Expired(
                "no access token; authenticate first".to_string(),
            )),
        }
    }

    /// Whether any credential was ever stored (expired or not).
    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Returns the cached credential, running `consent` only when none is usable.
    ///
    /// Callers that queue on the consent gate while another caller's prompt is
    /// pending take that prompt's outcome: its credential on success, its
    /// error on failure. Only a caller arriving after the attempt settled
    /// starts a new prompt.
    pub async fn get_or_authenticate<F, Fut>(&self, consent: F) -> Result<AccessToken, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, AuthError>>,
    {
        if let Some(token) = self.current().await {
            return Ok(token);
        }

        let observed = self.attempts.load(Ordering::Acquire);
        let mut outcome = self.consent.lock().await;

        if let Some(token) = self.current().await {
            debug!("Reusing credential obtained by a concurrent consent flow");
            return Ok(token);
        }

        if outcome.attempts != observed {
            if let Some(error) = outcome.failure.clone() {
                debug!(error = %error, "Sharing failure of a concurrent consent flow");
                return Err(error);
            }
            if let Some(token) = self.token.read().await.clone() {
                return Ok(token);
            }
        }

        let result = consent().await;

        outcome.attempts += 1;
        outcome.failure = result.as_ref().err().cloned();
        self.attempts.store(outcome.attempts, Ordering::Release);

        let token = result?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Clears the cached credential, returning what was stored.
    pub async fn clear(&self) -> Option<AccessToken> {
        self.token.write().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_access_token_expiry() {
        let expires_at = Utc::now() + Duration::hours(1);
        let token = AccessToken::new("test_token", "Bearer", expires_at, vec![]);
        assert!(!token.is_expired());

        let expired = Utc::now() - Duration::hours(1);
        let token = AccessToken::new("test_token", "Bearer", expired, vec![]);
        assert!(token.is_expired());

        let nearly = Utc::now() + Duration::seconds(10);
        let token = AccessToken::new("test_token", "Bearer", nearly, vec![]);
        assert!(token.is_expired());
    }

    #[test]
    fn test_bearer_scopes() {
        let token = AccessToken::bearer("abc", Some(3599), Some("a b"));
        assert_eq!(token.scopes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(token.authorization_header(), "Bearer abc");
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn test_require_distinguishes_missing_and_expired() {
        let cache = CredentialCache::new();
        assert!(matches!(cache.require().await, Err(AuthError::Expired(m)) if m.contains("no access token")));

        cache
            .get_or_authenticate(|| async {
                Ok(AccessToken::new("t", "Bearer", Utc::now() - Duration::hours(1), vec![]))
            })
            .await
            .unwrap();
        assert!(matches!(cache.require().await, Err(AuthError::Expired(m)) if m.contains("expired")));
        assert!(cache.has_token().await);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_consent() {
        let cache = Arc::new(CredentialCache::new());
        let prompts = Arc::new(AtomicUsize::new(0));

        let run = |cache: Arc<CredentialCache>, prompts: Arc<AtomicUsize>| async move {
            cache
                .get_or_authenticate(move || async move {
                    prompts.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok(AccessToken::bearer("shared", None, None))
                })
                .await
        };

        let (a, b) = tokio::join!(
            run(cache.clone(), prompts.clone()),
            run(cache.clone(), prompts.clone())
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let cache = Arc::new(CredentialCache::new());
        let prompts = Arc::new(AtomicUsize::new(0));

        let run = |cache: Arc<CredentialCache>, prompts: Arc<AtomicUsize>| async move {
            cache
                .get_or_authenticate(move || async move {
                    prompts.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Err(AuthError::Cancelled)
                })
                .await
        };

        let (a, b, c) = tokio::join!(
            run(cache.clone(), prompts.clone()),
            run(cache.clone(), prompts.clone()),
            run(cache.clone(), prompts.clone())
        );

        assert!(matches!(a, Err(AuthError::Cancelled)));
        assert!(matches!(b, Err(AuthError::Cancelled)));
        assert!(matches!(c, Err(AuthError::Cancelled)));
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_later_caller_prompts_again_after_failure() {
        let cache = CredentialCache::new();

        let first = cache
            .get_or_authenticate(|| async { Err(AuthError::Denied("no".into())) })
            .await;
        let second = cache
            .get_or_authenticate(|| async { Ok(AccessToken::bearer("retry", None, None)) })
            .await;

        assert!(first.is_err());
        assert_eq!(second.unwrap().token.expose_secret(), "retry");
    }

    #[tokio::test]
    async fn test_failed_consent_leaves_cache_empty() {
        let cache = CredentialCache::new();
        let result = cache
            .get_or_authenticate(|| async { Err(AuthError::Denied("no".into())) })
            .await;

        assert!(matches!(result, Err(AuthError::Denied(_))));
        assert!(cache.current().await.is_none());
        assert!(cache.clear().await.is_none());
    }
}
