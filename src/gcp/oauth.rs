//! OAuth2 installed-application flow
//!
//! Interactive consent through the browser with a loopback redirect, code
//! exchange, and refresh-token grants against Google's token endpoint.

use super::credentials::{Credential, CREDENTIAL_FORMAT_VERSION};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use url::Url;
use uuid::Uuid;

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Why a credential could not be produced
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("client secret file {} not found", .path.display())]
    ClientSecretsMissing { path: PathBuf },

    #[error("invalid client secret file {}: {reason}", .path.display())]
    ClientSecretsInvalid { path: PathBuf, reason: String },

    #[error("failed to start local redirect listener: {0}")]
    ListenerBind(#[source] std::io::Error),

    #[error("consent redirect failed: {0}")]
    Redirect(String),

    #[error("consent was denied: {0}")]
    ConsentDenied(String),

    #[error("state parameter mismatch in consent redirect")]
    StateMismatch,

    #[error("timed out after {0:?} waiting for consent")]
    ConsentTimeout(Duration),

    #[error("token endpoint request failed: {0}")]
    TokenRequest(#[from] reqwest::Error),

    #[error("token endpoint rejected the request ({status}): {error}")]
    TokenRejected { status: u16, error: String },

    #[error("credential has no refresh token")]
    NoRefreshToken,

    #[error("application default credentials unavailable: {0}")]
    ApplicationDefault(String),
}

/// Refresh and interactive-login operations used by the credential provider
#[async_trait]
pub trait OAuthBackend: Send + Sync {
    /// Exchange the credential's refresh token for a new access token
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;

    /// Run the interactive consent flow
    async fn login(&self) -> Result<Credential, AuthError>;
}

/// OAuth client identity from the client-secret file
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// Google ships client secrets wrapped in an `installed` or `web` section
#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::ClientSecretsMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(AuthError::ClientSecretsInvalid {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        Self::parse(&content).map_err(|reason| AuthError::ClientSecretsInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Installed-app OAuth flow backed by Google's endpoints
pub struct InstalledAppFlow {
    http: reqwest::Client,
    client_secrets_path: PathBuf,
    scopes: Vec<String>,
    consent_timeout: Duration,
}

impl InstalledAppFlow {
    pub fn new(
        client_secrets_path: PathBuf,
        scopes: Vec<String>,
        consent_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gcp-inventory/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            client_secrets_path,
            scopes,
            consent_timeout,
        })
    }

    async fn request_token(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthError> {
        tracing::debug!("POST {}", token_uri);

        let response = self.http.post(token_uri).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Security: only the OAuth error code/description, never the raw body
            let error = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("{}: {}", e.error, desc),
                    None => e.error,
                })
                .unwrap_or_else(|_| "unexpected response".to_string());
            return Err(AuthError::TokenRejected {
                status: status.as_u16(),
                error,
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::TokenRejected {
            status: status.as_u16(),
            error: format!("malformed token response: {}", e),
        })
    }

    /// Run the consent flow with the redirect served on `listener`.
    ///
    /// `present` receives the consent URL; it is expected to get the user (or
    /// a browser) to open it. The wait is bounded by the consent timeout.
    pub async fn login_on<F>(&self, listener: TcpListener, present: F) -> Result<Credential, AuthError>
    where
        F: FnOnce(&Url) + Send,
    {
        tracing::info!(
            "Starting OAuth consent flow, client secrets at {:?}",
            self.client_secrets_path
        );
        let secrets = ClientSecrets::load(&self.client_secrets_path)?;

        let port = listener
            .local_addr()
            .map_err(AuthError::ListenerBind)?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let state = Uuid::new_v4().to_string();
        let auth_url = authorization_url(&secrets, &redirect_uri, &self.scopes, &state)?;

        present(&auth_url);
        tracing::info!("Waiting for consent redirect on {}", redirect_uri);

        let code = tokio::time::timeout(self.consent_timeout, accept_redirect(listener, &state))
            .await
            .map_err(|_| AuthError::ConsentTimeout(self.consent_timeout))??;

        tracing::info!("Consent granted, exchanging authorization code");
        self.exchange_code(&secrets, &code, &redirect_uri).await
    }

    async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        let response = self
            .request_token(
                &secrets.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                    ("redirect_uri", redirect_uri),
                ],
            )
            .await?;

        let scopes = match &response.scope {
            Some(scope) => split_scopes(scope),
            None => self.scopes.clone(),
        };

        Ok(Credential {
            version: CREDENTIAL_FORMAT_VERSION,
            token: response.access_token,
            expiry: response
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            refresh_token: response.refresh_token,
            scopes,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
        })
    }
}

#[async_trait]
impl OAuthBackend for InstalledAppFlow {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NoRefreshToken)?;

        let response = self
            .request_token(
                &credential.token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", credential.client_id.as_str()),
                    ("client_secret", credential.client_secret.as_str()),
                ],
            )
            .await?;

        Ok(Credential {
            version: CREDENTIAL_FORMAT_VERSION,
            token: response.access_token,
            expiry: response
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            // Google only rotates the refresh token occasionally
            refresh_token: response
                .refresh_token
                .or_else(|| credential.refresh_token.clone()),
            scopes: response
                .scope
                .as_deref()
                .map(split_scopes)
                .unwrap_or_else(|| credential.scopes.clone()),
            token_uri: credential.token_uri.clone(),
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
        })
    }

    async fn login(&self) -> Result<Credential, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(AuthError::ListenerBind)?;

        self.login_on(listener, |auth_url| {
            println!("--------------------------------------------------------------");
            println!("Complete the sign-in in your browser. Open this URL:");
            println!();
            println!("{}", auth_url);
            println!();
            println!("--------------------------------------------------------------");
        })
        .await
    }
}

/// Build the consent URL the user opens in a browser
pub fn authorization_url(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> Result<Url, AuthError> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scopes.join(" ").as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| AuthError::Redirect(format!("invalid auth_uri: {}", e)))
}

/// Interpret the request target of a redirect hitting the loopback listener.
///
/// Returns `Ok(None)` for requests that are not the OAuth redirect (a browser
/// asking for `/favicon.ico`, say).
pub fn parse_redirect_target(target: &str, expected_state: &str) -> Result<Option<String>, AuthError> {
    let url = Url::parse(&format!("http://127.0.0.1{}", target))
        .map_err(|e| AuthError::Redirect(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if code.is_none() && error.is_none() {
        return Ok(None);
    }
    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    if let Some(error) = error {
        return Err(AuthError::ConsentDenied(error));
    }
    Ok(code)
}

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    outcome: mpsc::Sender<Result<String, AuthError>>,
}

/// Serve the loopback listener until the OAuth redirect arrives.
///
/// Each connection is handled on its own, so a browser's idle preconnect
/// cannot hold up the redirect. The server is shut down gracefully when this
/// future completes or is dropped.
async fn accept_redirect(listener: TcpListener, expected_state: &str) -> Result<String, AuthError> {
    let (outcome_tx, mut outcome_rx) = mpsc::channel(1);
    let app = Router::new()
        .fallback(handle_redirect)
        .with_state(RedirectState {
            expected_state: Arc::from(expected_state),
            outcome: outcome_tx,
        });

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = server.await {
            tracing::warn!("Redirect listener stopped: {}", e);
        }
    });
    let _shutdown = shutdown_tx;

    match outcome_rx.recv().await {
        Some(outcome) => outcome,
        None => Err(AuthError::Redirect("redirect listener stopped".to_string())),
    }
}

async fn handle_redirect(State(state): State<RedirectState>, uri: Uri) -> (StatusCode, &'static str) {
    tracing::debug!("Redirect listener request for {}", uri.path());
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());

    let outcome = parse_redirect_target(target, &state.expected_state);
    let reply = match &outcome {
        Ok(Some(_)) => (StatusCode::OK, "Authentication complete. You may close this window."),
        Ok(None) => (StatusCode::NOT_FOUND, "Not found."),
        Err(_) => (StatusCode::BAD_REQUEST, "Authentication failed. Check the terminal."),
    };

    if let Some(outcome) = outcome.transpose() {
        // Only the first redirect counts
        let _ = state.outcome.try_send(outcome);
    }
    reply
}

fn split_scopes(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> ClientSecrets {
        ClientSecrets::parse(
            r#"{"installed": {"client_id": "id-123", "client_secret": "s3cret",
                "redirect_uris": ["http://localhost"]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_installed_secrets_defaults_uris() {
        let secrets = secrets();
        assert_eq!(secrets.client_id, "id-123");
        assert_eq!(secrets.auth_uri, GOOGLE_AUTH_URI);
        assert_eq!(secrets.token_uri, GOOGLE_TOKEN_URI);
    }

    #[test]
    fn test_parse_web_secrets() {
        let secrets = ClientSecrets::parse(
            r#"{"web": {"client_id": "w", "client_secret": "x", "token_uri": "http://t/token"}}"#,
        )
        .unwrap();
        assert_eq!(secrets.token_uri, "http://t/token");
    }

    #[test]
    fn test_parse_rejects_unknown_layout() {
        assert!(ClientSecrets::parse(r#"{"other": {}}"#).is_err());
        assert!(ClientSecrets::parse("not json").is_err());
    }

    #[test]
    fn test_missing_secrets_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientSecrets::load(&dir.path().join("client_secrets.json")).unwrap_err();
        assert!(matches!(err, AuthError::ClientSecretsMissing { .. }));
    }

    #[test]
    fn test_authorization_url_params() {
        let url = authorization_url(
            &secrets(),
            "http://127.0.0.1:8085/",
            &["a".to_string(), "b".to_string()],
            "xyz",
        )
        .unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "id-123");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8085/");
        assert_eq!(pairs["scope"], "a b");
        assert_eq!(pairs["state"], "xyz");
        assert_eq!(pairs["access_type"], "offline");
    }

    #[test]
    fn test_redirect_with_code() {
        let code = parse_redirect_target("/?state=abc&code=4%2F0AY", "abc").unwrap();
        assert_eq!(code.as_deref(), Some("4/0AY"));
    }

    #[test]
    fn test_redirect_ignores_unrelated_paths() {
        assert!(parse_redirect_target("/favicon.ico", "abc").unwrap().is_none());
    }

    #[test]
    fn test_redirect_state_mismatch() {
        let err = parse_redirect_target("/?state=evil&code=c", "abc").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn test_redirect_access_denied() {
        let err = parse_redirect_target("/?state=abc&error=access_denied", "abc").unwrap_err();
        assert!(matches!(err, AuthError::ConsentDenied(ref e) if e == "access_denied"));
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_redirect() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            // Speculative preconnect that never sends a request
            let _idle = tokio::net::TcpStream::connect(addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            reqwest::get(format!("http://{}/?state=abc&code=good", addr))
                .await
                .unwrap()
                .status()
        });

        let code = tokio::time::timeout(Duration::from_secs(2), accept_redirect(listener, "abc"))
            .await
            .expect("redirect was not processed")
            .unwrap();
        assert_eq!(code, "good");
        assert_eq!(browser.await.unwrap(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unrelated_request_keeps_listening() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let favicon = reqwest::get(format!("http://{}/favicon.ico", addr)).await.unwrap();
            assert_eq!(favicon.status(), reqwest::StatusCode::NOT_FOUND);
            reqwest::get(format!("http://{}/?state=abc&error=access_denied", addr))
                .await
                .unwrap()
                .status()
        });

        let err = tokio::time::timeout(Duration::from_secs(2), accept_redirect(listener, "abc"))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, AuthError::ConsentDenied(_)));
        assert_eq!(browser.await.unwrap(), reqwest::StatusCode::BAD_REQUEST);
    }
}
