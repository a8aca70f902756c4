use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use cfsim_core::{
    CommitOptions, Credentials, Engine, EngineConfig, SimMode, load_accounts,
    write_accounts_template,
};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "cfsim", about = "Simulated editor clients for the CodeFree gateway")]
pub struct Cli {
    /// Working directory holding `.cfsim/`
    #[arg(short, long, global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Config file (defaults to `.cfsim/config.yaml`)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Seed for reproducible runs
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct AccountArgs {
    #[arg(long)]
    pub account_id: String,

    #[arg(long)]
    pub session_token: String,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// `completion` or `comment`
    #[arg(short, long, default_value_t = SimMode::Completion)]
    pub mode: SimMode,

    /// Responses to count per session (defaults to the mode's limit)
    #[arg(long)]
    pub max: Option<u32>,

    /// Source directory sampled in comment mode
    #[arg(long)]
    pub src: Option<PathBuf>,
}

impl SessionArgs {
    fn target(&self) -> u32 {
        self.max.unwrap_or_else(|| self.mode.max_target())
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one simulated client
    Run {
        #[command(flatten)]
        account: AccountArgs,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Run one simulated client per account in a list, concurrently
    Batch {
        /// Account list, one `accountId,sessionToken` per line
        #[arg(short, long)]
        accounts: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Commit synthetic changes to a repository
    Commit {
        #[command(flatten)]
        account: AccountArgs,

        #[arg(long, default_value = "")]
        project_id: String,

        #[arg(long, default_value = "")]
        repository_id: String,

        /// Repository file to rewrite
        #[arg(long)]
        file: Option<String>,

        /// Number of commits
        #[arg(long)]
        max: Option<u32>,
    },

    /// Write an account list template
    Template {
        #[arg(short, long, default_value = "accounts.txt")]
        output: PathBuf,
    },
}

impl Cli {
    /// Working directory and log directory name for this invocation.
    pub fn log_context(&self) -> (PathBuf, Option<&'static str>) {
        let command = match self.command {
            Commands::Run { .. } => Some("run"),
            Commands::Batch { .. } => Some("batch"),
            Commands::Commit { .. } => Some("commit"),
            Commands::Template { .. } => None,
        };
        (self.dir.clone(), command)
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig::builder()
            .work_dir(self.dir.clone())
            .config_file(self.config.clone())
            .seed(self.seed)
            .build()
    }

    pub async fn run(self) -> Result<()> {
        if let Commands::Template { output } = &self.command {
            return write_template(output);
        }

        let engine = Engine::new(self.engine_config())
            .await
            .context("failed to initialize engine")?;
        stop_on_ctrl_c(&engine);

        match self.command {
            Commands::Run { account, session } => {
                let credentials = Credentials::new(account.account_id, account.session_token);
                let report = engine
                    .run(credentials, session.mode, session.target(), session.src.as_deref())
                    .await;
                println!("{report}");
                if !report.is_success() {
                    bail!("session did not complete");
                }
            }
            Commands::Batch { accounts, session } => {
                let accounts = load_accounts(&accounts)
                    .with_context(|| format!("failed to read accounts from {}", accounts.display()))?;
                if accounts.is_empty() {
                    bail!("no valid accounts found");
                }
                info!(accounts = accounts.len(), mode = %session.mode, "starting batch");

                let batch = engine
                    .batch(accounts, session.mode, session.target(), session.src.as_deref())
                    .await?;
                for report in &batch.sessions {
                    println!("{report}");
                }
                println!(
                    "{} succeeded, {} failed, {} responses in {:.1}s",
                    batch.succeeded(),
                    batch.failed(),
                    batch.total_count(),
                    batch.elapsed.as_secs_f64()
                );
                if batch.failed() > 0 {
                    bail!("{} session(s) did not complete", batch.failed());
                }
            }
            Commands::Commit {
                account,
                project_id,
                repository_id,
                file,
                max,
            } => {
                let options = CommitOptions {
                    credentials: Credentials::new(account.account_id, account.session_token),
                    project_id,
                    repository_id,
                    file_path: file,
                    max_commits: max,
                    seed: None,
                };
                let report = engine.commit(options).await?;
                println!("{report}");
                if report.error.is_some() {
                    bail!("commit session failed");
                }
            }
            Commands::Template { .. } => {}
        }
        Ok(())
    }
}

fn write_template(output: &Path) -> Result<()> {
    write_accounts_template(output)
        .with_context(|| format!("failed to write template to {}", output.display()))?;
    println!("account template written to {}", output.display());
    Ok(())
}

/// Ctrl-C stops every running session gracefully.
fn stop_on_ctrl_c(engine: &Engine) {
    let stop = engine.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping sessions");
            stop.cancel();
        }
    });
}
