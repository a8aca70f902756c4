//! Session orchestrator: fans out protocol sessions and awaits them.
//!
//! Each session runs on its own task. A failing session never cancels its
//! siblings; its terminal error lands in the batch report instead. All
//! sessions share one parent stop token, so [`Orchestrator::stop_all`]
//! performs an orderly shutdown of everything still running.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::SimMode;
use crate::credentials::Credentials;
use crate::error::CoreError;
use crate::pacing::seeded_rng;
use crate::pool::SourceFilePool;
use crate::protocol::{ProtocolSession, SessionOptions, SessionResources};
use crate::report::{BatchReport, SessionReport};

const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Derive the seed of the `index`-th session from the master seed.
fn session_seed(master: Option<u64>, index: usize) -> Option<u64> {
    master.map(|seed| seed ^ SEED_STRIDE.wrapping_mul(index as u64 + 1))
}

#[derive(Debug)]
pub struct Orchestrator {
    resources: SessionResources,
    default_source_dir: PathBuf,
    seed: Option<u64>,
    stop: CancellationToken,
}

impl Orchestrator {
    /// `default_source_dir` is scanned for comment sessions started without
    /// an explicit source directory.
    pub fn new(resources: SessionResources, default_source_dir: PathBuf, seed: Option<u64>) -> Self {
        Self {
            resources,
            default_source_dir,
            seed,
            stop: CancellationToken::new(),
        }
    }

    /// Stop every running session. Sessions started afterwards stop
    /// immediately as well.
    pub fn stop_all(&self) {
        info!("stopping all sessions");
        self.stop.cancel();
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    fn prepare(
        &self,
        credentials: Credentials,
        mode: SimMode,
        target: u32,
        source_dir: Option<&Path>,
        index: usize,
    ) -> ProtocolSession {
        let seed = session_seed(self.seed, index);

        let pool = match mode {
            SimMode::Comment => {
                let root = source_dir.unwrap_or(self.default_source_dir.as_path());
                SourceFilePool::scan(root, &mut seeded_rng(seed))
            }
            SimMode::Completion => SourceFilePool::default(),
        };

        let options = SessionOptions {
            credentials,
            mode,
            target,
            pool,
            seed,
        };
        ProtocolSession::new(options, self.resources.clone()).with_stop_token(self.stop.child_token())
    }

    /// Run one session to completion.
    #[instrument(skip(self, credentials, source_dir), fields(account = %credentials.account_id))]
    pub async fn run_one(
        &self,
        credentials: Credentials,
        mode: SimMode,
        target: u32,
        source_dir: Option<&Path>,
    ) -> SessionReport {
        self.prepare(credentials, mode, target, source_dir, 0)
            .run()
            .await
    }

    /// Run one session per account concurrently and wait for all of them.
    ///
    /// Reports come back in account order.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if `accounts` is empty.
    #[instrument(skip(self, accounts, source_dir), fields(accounts = accounts.len()))]
    pub async fn run_batch(
        &self,
        accounts: Vec<Credentials>,
        mode: SimMode,
        target: u32,
        source_dir: Option<&Path>,
    ) -> Result<BatchReport, CoreError> {
        if accounts.is_empty() {
            return Err(CoreError::Configuration("no accounts to run".to_owned()));
        }

        let started = Instant::now();
        info!(%mode, target, "starting batch");

        let mut account_ids = Vec::with_capacity(accounts.len());
        let mut handles = Vec::with_capacity(accounts.len());
        for (index, credentials) in accounts.into_iter().enumerate() {
            account_ids.push(credentials.account_id.clone());
            let session = self.prepare(credentials, mode, target, source_dir, index);
            handles.push(tokio::spawn(session.run()));
        }

        let sessions = join_all(handles)
            .await
            .into_iter()
            .zip(account_ids)
            .map(|(joined, account_id)| {
                joined.unwrap_or_else(|e| {
                    error!(account = %account_id, error = %e, "session task aborted");
                    SessionReport::not_started(
                        account_id,
                        mode,
                        target,
                        CoreError::Session(format!("session task aborted: {e}")),
                    )
                })
            })
            .collect();

        let report = BatchReport {
            sessions,
            elapsed: started.elapsed(),
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            total = report.total_count(),
            "batch finished"
        );
        Ok(report)
    }
}
