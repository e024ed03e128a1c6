//! Multi-identity session store.
//!
//! Credentials are keyed by identity handle and kept in insertion order; the
//! most recently written identity becomes the default. Every mutation rewrites
//! the whole session file. Write failures are logged and the in-memory copy
//! stays authoritative for the rest of the run.

mod persist;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Canonical PDS for new and unauthenticated sessions.
pub const DEFAULT_PDS: &str = "https://bsky.social";

fn default_pds() -> String {
    DEFAULT_PDS.to_string()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("credentials for {0} carry an access token but no DID")]
    MissingDid(String),
    #[error("no stored session for {0}")]
    UnknownIdentity(String),
}

/// One account's tokens and server, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "accessJwt", default)]
    pub access_jwt: Option<String>,
    #[serde(rename = "refreshJwt", default)]
    pub refresh_jwt: Option<String>,
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default = "default_pds")]
    pub pds_url: String,
}

impl Credentials {
    /// Placeholder used when no identity is available.
    pub fn unauthenticated() -> Self {
        Self {
            access_jwt: None,
            refresh_jwt: None,
            did: None,
            handle: None,
            pds_url: default_pds(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_jwt.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn validate(&self, identity: &str) -> Result<(), SessionError> {
        if self.is_authenticated() && self.did.as_deref().is_none_or(str::is_empty) {
            return Err(SessionError::MissingDid(identity.to_string()));
        }
        Ok(())
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    /// Oldest first; the last entry is the most recently added.
    entries: Vec<(String, Credentials)>,
    default: Option<String>,
}

impl SessionState {
    fn position(&self, identity: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == identity)
    }

    fn get(&self, identity: &str) -> Option<&Credentials> {
        self.entries
            .iter()
            .find(|(key, _)| key == identity)
            .map(|(_, creds)| creds)
    }

    fn most_recent(&self) -> Option<String> {
        self.entries.last().map(|(key, _)| key.clone())
    }
}

/// Listing entry for [`SessionStore::identities`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub identity: String,
    pub did: Option<String>,
    pub pds_url: String,
    pub authenticated: bool,
    pub is_default: bool,
}

pub struct SessionStore {
    path: PathBuf,
    state: Mutex<SessionState>,
}

impl SessionStore {
    /// Load the store from `path`. A missing file is an empty store; an
    /// unreadable or malformed one is logged and treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match persist::read_sessions(&path) {
            Ok(entries) => {
                if !entries.is_empty() {
                    tracing::info!(
                        count = entries.len(),
                        path = %path.display(),
                        "Loaded sessions"
                    );
                }
                entries
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to load sessions: {e:#}");
                Vec::new()
            }
        };

        let entries: Vec<_> = entries
            .into_iter()
            .filter(|(identity, creds)| match creds.validate(identity) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Dropping stored session: {e}");
                    false
                }
            })
            .collect();

        let default = entries.last().map(|(key, _)| key.clone());
        Self {
            path,
            state: Mutex::new(SessionState { entries, default }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Credentials for `identity`, or for the default identity when `None`.
    ///
    /// Unknown identities resolve to [`Credentials::unauthenticated`].
    pub async fn resolve(&self, identity: Option<&str>) -> Credentials {
        let state = self.state.lock().await;
        let target = identity
            .filter(|id| !id.is_empty())
            .or(state.default.as_deref());
        target
            .and_then(|id| state.get(id))
            .cloned()
            .unwrap_or_else(Credentials::unauthenticated)
    }

    /// Store credentials, make `identity` the default and persist.
    pub async fn put(&self, identity: &str, credentials: Credentials) -> Result<(), SessionError> {
        credentials.validate(identity)?;

        let mut state = self.state.lock().await;
        if let Some(idx) = state.position(identity) {
            state.entries.remove(idx);
        }
        state.entries.push((identity.to_string(), credentials));
        state.default = Some(identity.to_string());
        self.persist(&state).await;
        Ok(())
    }

    /// Replace the credentials of a stored identity in place. Order and the
    /// default identity are left as they are.
    pub async fn update(
        &self,
        identity: &str,
        credentials: Credentials,
    ) -> Result<(), SessionError> {
        credentials.validate(identity)?;

        let mut state = self.state.lock().await;
        let Some(idx) = state.position(identity) else {
            return Err(SessionError::UnknownIdentity(identity.to_string()));
        };
        state.entries[idx].1 = credentials;
        self.persist(&state).await;
        Ok(())
    }

    /// Drop `identity`. Returns whether it was present.
    pub async fn remove(&self, identity: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(idx) = state.position(identity) else {
            return false;
        };
        state.entries.remove(idx);
        if state.default.as_deref() == Some(identity) {
            state.default = state.most_recent();
        }
        self.persist(&state).await;
        true
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.state.lock().await.position(identity).is_some()
    }

    pub async fn default_identity(&self) -> Option<String> {
        self.state.lock().await.default.clone()
    }

    pub async fn identities(&self) -> Vec<IdentitySummary> {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .map(|(identity, creds)| IdentitySummary {
                identity: identity.clone(),
                did: creds.did.clone(),
                pds_url: creds.pds_url.clone(),
                authenticated: creds.is_authenticated(),
                is_default: state.default.as_deref() == Some(identity.as_str()),
            })
            .collect()
    }

    /// Write the whole collection; failures are logged, never raised.
    async fn persist(&self, state: &SessionState) {
        if let Err(e) = persist::write_sessions(&self.path, &state.entries).await {
            tracing::warn!(
                path = %self.path.display(),
                "Failed to save sessions, keeping them in memory only: {e:#}"
            );
        }
    }
}
