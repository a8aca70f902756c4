//! Shared credential context.
//!
//! One [`CredentialContext`] is shared by reference between every session and
//! command in the process. The account id and session token always move as a
//! [`Credentials`] pair, so readers never observe half of an update.

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// An account id and session token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub account_id: String,
    pub session_token: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            session_token: session_token.into(),
        }
    }

    /// Session token shortened for logs.
    pub fn token_preview(&self) -> String {
        let prefix: String = self.session_token.chars().take(8).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("session_token", &self.token_preview())
            .finish()
    }
}

/// Project and repository a commit session targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
}

#[derive(Debug, Default)]
struct ContextState {
    credentials: Option<Credentials>,
    hints: RepoHints,
}

/// Process-wide holder of the active account and repository hints.
#[derive(Debug, Default)]
pub struct CredentialContext {
    state: RwLock<ContextState>,
}

impl CredentialContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context pre-loaded with credentials.
    pub fn with_credentials(credentials: Credentials) -> Self {
        let ctx = Self::new();
        ctx.set_credentials(credentials);
        ctx
    }

    /// Replace the active credentials.
    pub fn set_credentials(&self, credentials: Credentials) {
        info!(
            account = %credentials.account_id,
            token = %credentials.token_preview(),
            "credentials saved"
        );
        self.state.write().credentials = Some(credentials);
    }

    /// Update repository hints. `None` leaves the stored value unchanged.
    pub fn set_repo_hints(&self, project_id: Option<String>, repository_id: Option<String>) {
        let mut state = self.state.write();
        if project_id.is_some() {
            state.hints.project_id = project_id;
        }
        if repository_id.is_some() {
            state.hints.repository_id = repository_id;
        }
    }

    /// Drop credentials and hints, e.g. after the server rejects the session.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.credentials = None;
        state.hints = RepoHints::default();
        info!("credentials cleared");
    }

    /// Snapshot of the active credentials.
    pub fn credentials(&self) -> Option<Credentials> {
        self.state.read().credentials.clone()
    }

    /// Snapshot of the repository hints.
    pub fn repo_hints(&self) -> RepoHints {
        self.state.read().hints.clone()
    }

    pub fn has_credentials(&self) -> bool {
        self.state.read().credentials.is_some()
    }
}
