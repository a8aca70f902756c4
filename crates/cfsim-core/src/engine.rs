//! Core simulation engine.
//!
//! The [`Engine`] is the main entry point for all cfsim-core operations. It
//! owns the loaded configuration, the prompt manager, the shared credential
//! context and the session orchestrator, and exposes one method per CLI
//! workflow.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cfsim_pm::PromptManager;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::capture::{CaptureReceiver, CapturedCredentials};
use crate::commit::{CommitOptions, CommitSession};
use crate::config::{EngineConfig, SimConfig, SimMode, load_sim_config};
use crate::credentials::{CredentialContext, Credentials};
use crate::error::CoreError;
use crate::orchestrator::Orchestrator;
use crate::protocol::SessionResources;
use crate::report::{BatchReport, CommitReport, SessionReport};
use crate::transport::{Connector, WsConnector};

/// Core engine that drives all simulation workflows.
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use cfsim_core::{Credentials, Engine, EngineConfig, SimMode};
///
/// # async fn example() -> Result<(), cfsim_core::CoreError> {
/// let config = EngineConfig::builder()
///     .work_dir(PathBuf::from("."))
///     .build();
///
/// let engine = Engine::new(config).await?;
/// let report = engine
///     .run(Credentials::new("186812", "token"), SimMode::Completion, 10, None)
///     .await;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    sim_config: Arc<SimConfig>,
    prompts: Arc<PromptManager>,
    credentials: Arc<CredentialContext>,
    orchestrator: Orchestrator,
}

impl Engine {
    /// Create an engine that talks to the gateway over WebSocket.
    ///
    /// Loads `.cfsim/config.yaml` (or the configured file) and any template
    /// override directories.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Yaml` if the config file is invalid.
    /// Returns `CoreError::Template` if an override template fails to load.
    #[instrument(skip_all)]
    pub async fn new(config: EngineConfig) -> Result<Self, CoreError> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Create an engine that opens channels through `connector`.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::new`].
    pub fn with_connector(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, CoreError> {
        info!(work_dir = %config.work_dir().display(), "initializing engine");

        let sim_config = Arc::new(load_sim_config(&config.config_path())?);
        let prompts = Arc::new(load_prompts(&config, &sim_config)?);
        let credentials = Arc::new(CredentialContext::new());

        let resources = SessionResources {
            config: Arc::clone(&sim_config),
            prompts: Arc::clone(&prompts),
            credentials: Arc::clone(&credentials),
            connector,
        };
        let source_dir = default_source_dir(&config, &sim_config);
        debug!(source_dir = %source_dir.display(), "default comment source directory");
        let orchestrator = Orchestrator::new(resources, source_dir, config.seed());

        Ok(Self {
            config,
            sim_config,
            prompts,
            credentials,
            orchestrator,
        })
    }

    /// Run one protocol session for `credentials`, which also become the
    /// active account of the shared credential context.
    pub async fn run(
        &self,
        credentials: Credentials,
        mode: SimMode,
        target: u32,
        source_dir: Option<&Path>,
    ) -> SessionReport {
        self.credentials.set_credentials(credentials.clone());
        self.orchestrator
            .run_one(credentials, mode, target, source_dir)
            .await
    }

    /// Run one protocol session per account concurrently.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if `accounts` is empty.
    pub async fn batch(
        &self,
        accounts: Vec<Credentials>,
        mode: SimMode,
        target: u32,
        source_dir: Option<&Path>,
    ) -> Result<BatchReport, CoreError> {
        self.orchestrator
            .run_batch(accounts, mode, target, source_dir)
            .await
    }

    /// Run one commit session.
    ///
    /// Empty project or repository ids are filled from the repository hints
    /// of the credential context.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Transport` if the HTTP client cannot be built.
    pub async fn commit(&self, mut options: CommitOptions) -> Result<CommitReport, CoreError> {
        let hints = self.credentials.repo_hints();
        if options.project_id.is_empty() {
            options.project_id = hints.project_id.unwrap_or_default();
        }
        if options.repository_id.is_empty() {
            options.repository_id = hints.repository_id.unwrap_or_default();
        }
        if options.seed.is_none() {
            options.seed = self.config.seed();
        }

        self.credentials.set_credentials(options.credentials.clone());
        let session = CommitSession::new(
            options,
            &self.sim_config,
            Arc::clone(&self.prompts),
            Arc::clone(&self.credentials),
        )?;
        Ok(session.run().await)
    }

    /// Wait for a captured login and make it the active account.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::AuthExpired` if nothing is captured in time.
    pub async fn await_login(
        &self,
        receiver: CaptureReceiver,
        timeout: Duration,
    ) -> Result<CapturedCredentials, CoreError> {
        receiver.apply_to(&self.credentials, timeout).await
    }

    /// Stop every running protocol session.
    pub fn stop_all(&self) {
        self.orchestrator.stop_all();
    }

    /// Token that stops every protocol session when cancelled.
    pub fn stop_token(&self) -> CancellationToken {
        self.orchestrator.stop_token()
    }

    pub fn credentials(&self) -> &Arc<CredentialContext> {
        &self.credentials
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sim_config(&self) -> &SimConfig {
        &self.sim_config
    }

    pub fn prompts(&self) -> &PromptManager {
        &self.prompts
    }
}

fn resolve(work_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        work_dir.join(path)
    }
}

/// CLI override, then `sourceDir` from config, then `<work_dir>/src`.
fn default_source_dir(config: &EngineConfig, sim: &SimConfig) -> PathBuf {
    let work_dir = config.work_dir();
    config
        .source_dir()
        .or(sim.source_dir.as_deref())
        .map_or_else(|| work_dir.join("src"), |dir| resolve(work_dir, dir))
}

/// Built-ins, then `templates.include`, then `.cfsim/templates`. Later
/// directories override earlier ones.
fn load_prompts(config: &EngineConfig, sim: &SimConfig) -> Result<PromptManager, CoreError> {
    let mut prompts = PromptManager::new()?;

    let mut dirs: Vec<PathBuf> = sim
        .templates
        .include
        .iter()
        .map(|dir| resolve(config.work_dir(), dir))
        .collect();
    let local = config.cfsim_dir().join("templates");
    if local.is_dir() {
        dirs.push(local);
    }

    for dir in dirs {
        info!(dir = %dir.display(), "loading template overrides");
        prompts.load_dir(&dir)?;
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use cfsim_pm::COMMIT_MESSAGE;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::capture::capture_channel;
    use crate::protocol::testing::{Gateway, Log, serve};
    use crate::report::{CommitState, SessionState};
    use crate::transport::testing::{MemoryConnector, memory_channel};

    fn write_config(dir: &Path, yaml: &str) {
        let cfsim = dir.join(".cfsim");
        fs::create_dir_all(&cfsim).expect("should create .cfsim");
        fs::write(cfsim.join("config.yaml"), yaml).expect("should write config");
    }

    fn engine(dir: &Path, connector: Arc<dyn Connector>) -> Engine {
        let config = EngineConfig::builder()
            .work_dir(dir.to_path_buf())
            .seed(Some(5))
            .build();
        Engine::with_connector(config, connector).expect("should create engine")
    }

    #[tokio::test]
    async fn test_should_create_engine_with_defaults() {
        let engine = Engine::new(
            EngineConfig::builder()
                .work_dir(PathBuf::from("/tmp/nonexistent-cfsim"))
                .build(),
        )
        .await
        .expect("engine creation should succeed");

        assert_eq!(engine.sim_config().commit.max_commits, 8);
        assert!(!engine.credentials().has_credentials());
        assert!(engine.prompts().list_templates().contains(&COMMIT_MESSAGE));
    }

    #[test]
    fn test_should_load_template_overrides() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let templates = dir.path().join(".cfsim/templates/commit");
        fs::create_dir_all(&templates).expect("should create templates dir");
        fs::write(templates.join("message.j2"), "chore: touch {{ file_path }}")
            .expect("should write template");

        let engine = engine(dir.path(), Arc::new(MemoryConnector::default()));
        let rendered = engine
            .prompts()
            .render(COMMIT_MESSAGE, &json!({ "repo_full_name": "a/b", "file_path": "README.md" }))
            .expect("should render");

        assert_eq!(rendered, "chore: touch README.md");
    }

    #[test]
    fn test_should_resolve_source_dir_precedence() {
        let sim = SimConfig {
            source_dir: Some(PathBuf::from("code")),
            ..SimConfig::default()
        };
        let plain = EngineConfig::builder().work_dir(PathBuf::from("/w")).build();
        let overridden = EngineConfig::builder()
            .work_dir(PathBuf::from("/w"))
            .source_dir("/elsewhere")
            .build();

        assert_eq!(default_source_dir(&plain, &SimConfig::default()), PathBuf::from("/w/src"));
        assert_eq!(default_source_dir(&plain, &sim), PathBuf::from("/w/code"));
        assert_eq!(default_source_dir(&overridden, &sim), PathBuf::from("/elsewhere"));
    }

    #[tokio::test]
    async fn test_should_run_session_and_record_account() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        write_config(
            dir.path(),
            "pacing:\n  requestDelay: { min: 0.0, max: 0.0 }\n  warmup: 0.0\nclient:\n  platform: linux-x64\n",
        );
        let (channel, peer) = memory_channel();
        let log: Log = Arc::default();
        tokio::spawn(serve(Gateway::default(), peer, Arc::clone(&log)));

        let engine = engine(dir.path(), Arc::new(MemoryConnector::new(vec![channel])));
        let report = engine
            .run(Credentials::new("1001", "tok"), SimMode::Completion, 2, None)
            .await;

        assert_eq!(report.state, SessionState::Closed);
        assert_eq!(report.count, 2);
        assert_eq!(
            engine.credentials().credentials().map(|c| c.account_id),
            Some("1001".to_owned())
        );
    }

    #[tokio::test]
    async fn test_should_commit_with_captured_repo_hints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositoryDetail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "code": 0, "data": { "repoFullName": "team/repo" } }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("should create temp dir");
        write_config(
            dir.path(),
            &format!(
                "pacing:\n  commitDelay: {{ min: 0.0, max: 0.0 }}\ncommit:\n  repositoryDetailUrl: {0}/repositoryDetail\n  commitFilesUrl: {0}/commitFiles\n",
                server.uri()
            ),
        );
        let engine = engine(dir.path(), Arc::new(MemoryConnector::default()));

        let (tx, rx) = capture_channel();
        tx.send(CapturedCredentials {
            credentials: Credentials::new("1001", "tok"),
            project_id: Some("p1".to_owned()),
            repository_id: Some("77".to_owned()),
        })
        .expect("should send capture");
        engine
            .await_login(rx, Duration::from_secs(1))
            .await
            .expect("should apply capture");

        let options = CommitOptions::builder()
            .credentials(Credentials::new("1001", "tok"))
            .project_id("")
            .repository_id("")
            .max_commits(2)
            .build();
        let report = engine.commit(options).await.expect("commit should run");

        assert_eq!(report.state, CommitState::Done);
        assert_eq!(report.count, 2);
        server.verify().await;
    }
}
