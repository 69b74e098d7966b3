//! Credential Provider
//!
//! Resolves one usable user credential per run: from the cache when it is
//! still valid, by refreshing an expired one, or through interactive consent
//! as a last resort. Whatever is obtained from the network is written back to
//! the cache for the next run.

use super::credentials::{Credential, CredentialCache};
use super::oauth::{AuthError, OAuthBackend};

/// States of the acquisition flow
#[derive(Debug)]
pub enum AuthState {
    /// Nothing usable in hand
    NoCred,
    /// Loaded from the cache, not yet classified
    Cached(Credential),
    /// Expired with a refresh token
    Expired(Credential),
    /// Freshly refreshed, not yet persisted
    Refreshed(Credential),
    /// Interactive consent required
    Interactive,
    /// Usable credential
    Ready(Credential),
    /// Acquisition failed; fatal for the run
    Failed(AuthError),
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::NoCred => "NO_CRED",
            AuthState::Cached(_) => "CACHED",
            AuthState::Expired(_) => "EXPIRED",
            AuthState::Refreshed(_) => "REFRESHED",
            AuthState::Interactive => "INTERACTIVE",
            AuthState::Ready(_) => "READY",
            AuthState::Failed(_) => "FAILED",
        }
    }
}

/// Drives [`AuthState`] from `NO_CRED` to `READY` or `FAILED`
pub struct CredentialProvider<B: OAuthBackend> {
    cache: CredentialCache,
    backend: B,
}

impl<B: OAuthBackend> CredentialProvider<B> {
    pub fn new(cache: CredentialCache, backend: B) -> Self {
        Self { cache, backend }
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Run the state machine to completion
    pub async fn acquire(&self) -> Result<Credential, AuthError> {
        let mut trace = Vec::new();
        self.acquire_traced(&mut trace).await
    }

    /// Like [`acquire`](Self::acquire), recording every state visited
    pub async fn acquire_traced(
        &self,
        trace: &mut Vec<&'static str>,
    ) -> Result<Credential, AuthError> {
        let mut state = AuthState::NoCred;
        let mut cache_consulted = false;

        loop {
            trace.push(state.name());
            tracing::debug!("Credential state: {}", state.name());

            state = match state {
                AuthState::NoCred if !cache_consulted => {
                    cache_consulted = true;
                    self.load_cached()
                }
                AuthState::NoCred => AuthState::Interactive,
                AuthState::Cached(credential) => classify(credential),
                AuthState::Expired(credential) => self.refresh(credential).await,
                AuthState::Refreshed(credential) => {
                    self.persist(&credential);
                    AuthState::Ready(credential)
                }
                AuthState::Interactive => self.login().await,
                AuthState::Ready(credential) => {
                    tracing::info!("Credential ready");
                    return Ok(credential);
                }
                AuthState::Failed(err) => {
                    tracing::error!("Could not obtain credentials: {}", err);
                    return Err(err);
                }
            };
        }
    }

    fn load_cached(&self) -> AuthState {
        tracing::info!("Loading cached credential from {:?}", self.cache.path());
        match self.cache.load() {
            Ok(Some(credential)) => {
                tracing::info!("Cached credential loaded");
                AuthState::Cached(credential)
            }
            Ok(None) => {
                tracing::info!("No cached credential");
                AuthState::NoCred
            }
            Err(e) => {
                tracing::warn!("Ignoring cached credential: {}", e);
                AuthState::NoCred
            }
        }
    }

    async fn refresh(&self, credential: Credential) -> AuthState {
        tracing::info!("Cached credential expired, refreshing access token");
        match self.backend.refresh(&credential).await {
            Ok(refreshed) => {
                tracing::info!("Access token refreshed");
                AuthState::Refreshed(refreshed)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}. Falling back to interactive login", e);
                AuthState::NoCred
            }
        }
    }

    async fn login(&self) -> AuthState {
        match self.backend.login().await {
            Ok(credential) => {
                tracing::info!("Interactive login complete");
                self.persist(&credential);
                AuthState::Ready(credential)
            }
            Err(e) => AuthState::Failed(e),
        }
    }

    /// Best-effort write-back; a failure only costs a login next run
    fn persist(&self, credential: &Credential) {
        match self.cache.store(credential) {
            Ok(()) => tracing::info!("Credential saved to {:?}", self.cache.path()),
            Err(e) => tracing::warn!(
                "Could not save credential ({}); you may need to log in again next run",
                e
            ),
        }
    }
}

fn classify(credential: Credential) -> AuthState {
    if credential.valid() {
        AuthState::Ready(credential)
    } else if credential.can_refresh() {
        AuthState::Expired(credential)
    } else {
        tracing::info!("Cached credential is unusable and cannot be refreshed");
        AuthState::NoCred
    }
}
