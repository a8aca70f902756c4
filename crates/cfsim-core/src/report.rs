//! Session states and end-of-run reports.
//!
//! Reports are what the CLI prints: final state, counters, elapsed time and
//! the terminal error, if any.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::SimMode;
use crate::error::CoreError;

// ── Protocol session ─────────────────────────────────────────

/// Protocol session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Connecting,
    Registering,
    FetchingApiKey,
    Subscribing,
    Active,
    Disconnecting,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Registering => "registering",
            Self::FetchingApiKey => "fetching-api-key",
            Self::Subscribing => "subscribing",
            Self::Active => "active",
            Self::Disconnecting => "disconnecting",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one protocol session.
#[derive(Debug)]
pub struct SessionReport {
    pub account_id: String,
    pub mode: SimMode,
    pub state: SessionState,
    pub count: u32,
    pub target: u32,
    pub elapsed: Duration,
    pub channel_id: Option<String>,
    /// Terminal error; partial counts are still valid when set.
    pub error: Option<CoreError>,
}

impl SessionReport {
    /// Report for a session that never got to run.
    pub fn not_started(account_id: impl Into<String>, mode: SimMode, target: u32, error: CoreError) -> Self {
        Self {
            account_id: account_id.into(),
            mode,
            state: SessionState::Failed,
            count: 0,
            target,
            elapsed: Duration::ZERO,
            channel_id: None,
            error: Some(error),
        }
    }

    /// Closed with the target reached and no error.
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Closed && self.error.is_none() && self.count >= self.target
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}/{} in {:.1}s",
            self.account_id,
            self.mode,
            self.state,
            self.count,
            self.target,
            self.elapsed.as_secs_f64()
        )?;
        if let Some(err) = &self.error {
            write!(f, " ({err})")?;
        }
        Ok(())
    }
}

/// Outcome of a batch run, in account order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub sessions: Vec<SessionReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.sessions.len() - self.succeeded()
    }

    pub fn total_count(&self) -> u64 {
        self.sessions.iter().map(|s| u64::from(s.count)).sum()
    }
}

// ── Commit session ───────────────────────────────────────────

/// Commit session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitState {
    FetchingRepo,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchingRepo => "fetching-repo",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one commit session.
#[derive(Debug)]
pub struct CommitReport {
    pub account_id: String,
    pub state: CommitState,
    pub count: u32,
    pub max_commits: u32,
    pub repo_full_name: Option<String>,
    pub branch: Option<String>,
    pub elapsed: Duration,
    pub error: Option<CoreError>,
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] commit {}: {}/{} in {:.1}s",
            self.account_id,
            self.state,
            self.count,
            self.max_commits,
            self.elapsed.as_secs_f64()
        )?;
        if let Some(repo) = &self.repo_full_name {
            write!(f, " on {repo}")?;
        }
        if let Some(err) = &self.error {
            write!(f, " ({err})")?;
        }
        Ok(())
    }
}
