//! GCP Authentication
//!
//! Bearer tokens for API calls come from one of two places: the user
//! credential resolved by [`CredentialProvider`](super::provider::CredentialProvider),
//! or Application Default Credentials (service account key, gcloud ADC,
//! metadata server) through `gcp_auth`.

use super::credentials::Credential;
use super::oauth::AuthError;
use anyhow::{Context, Result};
use gcp_auth::TokenProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

pub fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

/// Application Default Credentials holder with token caching
#[derive(Clone)]
pub struct AdcCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl AdcCredentials {
    /// Initialize the ADC provider chain
    pub async fn new() -> Result<Self, AuthError> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| AuthError::ApplicationDefault(e.to_string()))?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached ADC token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;

        let token_str = token.as_str().to_string();

        // gcp_auth refreshes on its own; we only need a conservative local TTL
        let ttl = DEFAULT_TOKEN_TTL;
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New ADC token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }
}

/// Source of the bearer token attached to every API request.
///
/// Shared read-only by all concurrent fetches of a run.
#[derive(Clone)]
pub enum Authorizer {
    /// OAuth user credential, fixed for the run
    User(Arc<Credential>),
    /// Application Default Credentials
    ApplicationDefault(AdcCredentials),
    /// Fixed bearer token (`--access-token`)
    Static(Arc<str>),
}

impl Authorizer {
    pub fn user(credential: Credential) -> Self {
        Authorizer::User(Arc::new(credential))
    }

    pub fn fixed(token: &str) -> Self {
        Authorizer::Static(Arc::from(token))
    }

    /// Current bearer token
    pub async fn token(&self) -> Result<String> {
        match self {
            Authorizer::User(credential) => {
                if credential.expired() {
                    // No re-authentication mid-run; the API will say 401
                    tracing::debug!("User credential has expired during the run");
                }
                Ok(credential.token.clone())
            }
            Authorizer::ApplicationDefault(adc) => adc.get_token().await,
            Authorizer::Static(token) => Ok(token.to_string()),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Authorizer::User(_) => "user OAuth credential",
            Authorizer::ApplicationDefault(_) => "application default credentials",
            Authorizer::Static(_) => "static access token",
        }
    }
}
