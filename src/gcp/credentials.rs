//! User credential record and its single-slot file cache.
//!
//! The cache holds one JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "token": "ya29...",
//!   "expiry": "2026-01-01T00:00:00Z",
//!   "refresh_token": "1//0g...",
//!   "scopes": ["https://www.googleapis.com/auth/cloud-platform"],
//!   "token_uri": "https://oauth2.googleapis.com/token",
//!   "client_id": "...apps.googleusercontent.com",
//!   "client_secret": "..."
//! }
//! ```
//!
//! A missing file means "nothing cached". Anything unreadable, unparsable or
//! carrying another `version` is reported as [`CacheError`] so the caller can
//! log it and carry on as if the file were absent.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Format version written into every cache file
pub const CREDENTIAL_FORMAT_VERSION: u32 = 1;

/// Treat tokens as expired this long before their real expiry
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth2 user credential
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub version: u32,
    pub token: String,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
}

// Security: never print token material
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("version", &self.version)
            .field("expiry", &self.expiry)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scopes", &self.scopes)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Whether the access token is past (or within the skew of) its expiry
    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry - ChronoDuration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    /// Usable right now without any network call
    pub fn valid(&self) -> bool {
        self.valid_at(Utc::now())
    }

    pub fn valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && !self.expired_at(now)
    }

    /// Expired, but a refresh token is on hand
    pub fn can_refresh(&self) -> bool {
        self.expired() && self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Failure to read the cached credential
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt credential file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("credential file {} has format version {found}, expected {expected}", .path.display())]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Just the version field, so a version mismatch is reported even when the rest of
/// the document no longer matches [`Credential`]
#[derive(Deserialize)]
struct VersionHeader {
    version: Option<u32>,
}

/// File-backed store holding at most one credential
#[derive(Debug, Clone)]
pub struct CredentialCache {
    path: PathBuf,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached credential. `Ok(None)` when no file exists.
    pub fn load(&self) -> Result<Option<Credential>, CacheError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let header: VersionHeader =
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let found = header.version.unwrap_or(0);
        if found != CREDENTIAL_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: self.path.clone(),
                found,
                expected: CREDENTIAL_FORMAT_VERSION,
            });
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Replace the cached credential. Writes a sibling temp file and renames
    /// it over the target so a crash never leaves half a document behind.
    pub fn store(&self, credential: &Credential) -> Result<(), CacheError> {
        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let content = serde_json::to_vec_pretty(credential)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = open_private(&tmp_path).map_err(write_err)?;
            file.write_all(&content).map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }
        std::fs::rename(&tmp_path, &self.path).map_err(write_err)?;

        tracing::debug!("Credential cached at {:?}", self.path);
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
