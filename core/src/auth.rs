use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("not signed in")]
    SignedOut,
    #[error("identity provider failed to issue a token: {0}")]
    Provider(String),
}

/// A bearer token handed out by the identity provider.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl IssuedToken {
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() + Duration::minutes(1) >= exp,
            None => false,
        }
    }
}

/// Source of ID tokens. The identity provider SDK sits behind this seam so
/// the chat and speech clients can run against a fixed token in tests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn issue(&self) -> Result<IssuedToken>;
}

/// Provider for a token supplied up front (configuration, environment).
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn issue(&self) -> Result<IssuedToken> {
        Ok(IssuedToken {
            token: self.token.clone(),
            expires_at: None,
        })
    }
}

/// The signed-in user's credentials, passed explicitly to every client that
/// talks to the backend.
#[derive(Clone)]
pub struct AuthContext {
    provider: Option<Arc<dyn TokenProvider>>,
    cached: Arc<RwLock<Option<IssuedToken>>>,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider: Some(provider),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            provider: None,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_static_token(token: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticTokenProvider::new(token)))
    }

    pub fn is_signed_in(&self) -> bool {
        self.provider.is_some()
    }

    /// Current bearer token, or `None` when nobody is signed in.
    pub async fn bearer(&self) -> Result<Option<String>, AuthError> {
        let Some(provider) = self.provider.as_ref() else {
            return Ok(None);
        };
        if let Some(token) = self.cached.read().as_ref() {
            if !token.needs_refresh() {
                return Ok(Some(token.token.clone()));
            }
        }
        let issued = provider
            .issue()
            .await
            .map_err(|err| AuthError::Provider(err.to_string()))?;
        tracing::debug!(expires_at = ?issued.expires_at, "refreshed id token");
        let token = issued.token.clone();
        *self.cached.write() = Some(issued);
        Ok(Some(token))
    }

    pub async fn require_bearer(&self) -> Result<String, AuthError> {
        self.bearer().await?.ok_or(AuthError::SignedOut)
    }

    /// Drop the cached token so the next request asks the provider again.
    pub fn invalidate(&self) {
        self.cached.write().take();
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}
