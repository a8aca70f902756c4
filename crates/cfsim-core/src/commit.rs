//! Commit session: repeated synthetic file commits over HTTP.
//!
//! One repository-detail fetch resolves the repository name and default
//! branch; then each iteration posts a multipart `commitFiles` request with
//! freshly rendered content until `max_commits` attempts have been counted.
//! A configurable "filtered" result code counts as a consumed attempt.

use std::sync::Arc;

use cfsim_pm::{COMMIT_CONTENT_PREFIX, COMMIT_MESSAGE, PromptManager};
use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::multipart::Form;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use typed_builder::TypedBuilder;

use crate::config::{CommitConfig, SimConfig};
use crate::credentials::{CredentialContext, Credentials};
use crate::error::CoreError;
use crate::pacing::{DelayRange, SimRng, seeded_rng};
use crate::report::{CommitReport, CommitState};

const TITLES: &[&str] = &["项目文档", "README", "开发文档", "使用说明", "项目说明"];

/// Per-run commit parameters. Unset values fall back to the `commit` section
/// of the configuration.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CommitOptions {
    pub credentials: Credentials,

    #[builder(setter(into))]
    pub project_id: String,

    #[builder(setter(into))]
    pub repository_id: String,

    #[builder(default, setter(strip_option, into))]
    pub file_path: Option<String>,

    #[builder(default, setter(strip_option))]
    pub max_commits: Option<u32>,

    #[builder(default, setter(strip_option))]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
struct Repository {
    full_name: String,
    branch: String,
}

// ── Wire shapes ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryDetail {
    #[serde(default)]
    repo_full_name: Option<String>,
    #[serde(default)]
    default_branch_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryPart<'a> {
    repo_id: &'a str,
    repo_full_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BranchPart<'a> {
    branch_name: &'a str,
    need_review: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileChange<'a> {
    file_type: u8,
    file_path: &'a str,
    file_content: String,
    file_commit_message: String,
}

/// Newlines become a literal `\n` before JSON encoding.
fn escape_newlines(content: &str) -> String {
    content.replace('\n', "\\n")
}

// ── Session ──────────────────────────────────────────────────

/// One simulated repository contributor.
#[derive(Debug)]
pub struct CommitSession {
    client: reqwest::Client,
    config: CommitConfig,
    delay: DelayRange,
    prompts: Arc<PromptManager>,
    context: Arc<CredentialContext>,
    rng: SimRng,

    credentials: Credentials,
    project_id: String,
    repository_id: String,
    file_path: String,
    max_commits: u32,

    state: CommitState,
    count: u32,
    repository: Option<Repository>,
}

impl CommitSession {
    /// Create a commit session.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Transport` if the HTTP client cannot be built.
    pub fn new(
        options: CommitOptions,
        config: &SimConfig,
        prompts: Arc<PromptManager>,
        context: Arc<CredentialContext>,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cfsim/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            delay: config.pacing.commit_delay,
            prompts,
            context,
            rng: seeded_rng(options.seed),
            file_path: options
                .file_path
                .unwrap_or_else(|| config.commit.file_path.clone()),
            max_commits: options.max_commits.unwrap_or(config.commit.max_commits),
            config: config.commit.clone(),
            credentials: options.credentials,
            project_id: options.project_id,
            repository_id: options.repository_id,
            state: CommitState::FetchingRepo,
            count: 0,
            repository: None,
        })
    }

    /// Fetch repository metadata, then commit until done or failed.
    #[instrument(skip_all, fields(account = %self.credentials.account_id, repository = %self.repository_id))]
    pub async fn run(mut self) -> CommitReport {
        let started = Instant::now();
        let result = self.drive().await;
        let elapsed = started.elapsed();

        self.state = match &result {
            Ok(()) => CommitState::Done,
            Err(_) => CommitState::Failed,
        };
        match &result {
            Ok(()) => info!(
                count = self.count,
                elapsed_secs = elapsed.as_secs_f64(),
                "commit session done"
            ),
            Err(e) => warn!(count = self.count, error = %e, "commit session failed"),
        }

        let (repo_full_name, branch) = match self.repository {
            Some(repo) => (Some(repo.full_name), Some(repo.branch)),
            None => (None, None),
        };
        CommitReport {
            account_id: self.credentials.account_id,
            state: self.state,
            count: self.count,
            max_commits: self.max_commits,
            repo_full_name,
            branch,
            elapsed,
            error: result.err(),
        }
    }

    async fn drive(&mut self) -> Result<(), CoreError> {
        if self.max_commits == 0 {
            return Err(CoreError::Configuration(
                "max commits must be at least 1".to_owned(),
            ));
        }
        if self.project_id.is_empty() || self.repository_id.is_empty() {
            return Err(CoreError::Configuration(
                "project id and repository id are required".to_owned(),
            ));
        }

        self.state = CommitState::FetchingRepo;
        let repository = self.fetch_repository().await?;
        info!(repo = %repository.full_name, branch = %repository.branch, "repository resolved");
        self.repository = Some(repository.clone());

        self.state = CommitState::Committing;
        while self.count < self.max_commits {
            self.commit_once(&repository).await?;

            if self.count < self.max_commits {
                let delay = self.delay.sample(&mut self.rng);
                debug!(delay_ms = delay.as_millis() as u64, "waiting before next commit");
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    fn identity_headers(&self) -> Result<HeaderMap, CoreError> {
        let value = |v: &str| {
            HeaderValue::from_str(v)
                .map_err(|e| CoreError::Configuration(format!("invalid header value: {e}")))
        };
        let mut headers = HeaderMap::new();
        headers.insert("projectid", value(&self.project_id)?);
        headers.insert("sessionid", value(&self.credentials.session_token)?);
        headers.insert("userid", value(&self.credentials.account_id)?);
        Ok(headers)
    }

    /// Clear shared credentials on 401; reject other non-success statuses.
    fn check_status(&self, status: StatusCode, call: &str) -> Result<(), CoreError> {
        if status == StatusCode::UNAUTHORIZED {
            warn!(call, "unauthorized, clearing credentials");
            self.context.clear();
            return Err(CoreError::AuthExpired(format!("{call} returned 401")));
        }
        if !status.is_success() {
            return Err(CoreError::Transport(format!("{call} returned HTTP {status}")));
        }
        Ok(())
    }

    async fn fetch_repository(&self) -> Result<Repository, CoreError> {
        let response = self
            .client
            .get(&self.config.repository_detail_url)
            .headers(self.identity_headers()?)
            .header(ACCEPT, "application/json")
            .query(&[("repositoryId", self.repository_id.as_str())])
            .send()
            .await?;
        self.check_status(response.status(), "repositoryDetail")?;

        let body: ApiResponse<RepositoryDetail> = response.json().await?;
        if body.code != 0 {
            return Err(CoreError::ApplicationRejected {
                code: body.code,
                msg: body.msg.unwrap_or_default(),
            });
        }

        let detail = body.data.ok_or_else(|| {
            CoreError::Configuration("repository detail has no data".to_owned())
        })?;
        let full_name = detail
            .repo_full_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                CoreError::Configuration("repository detail has no repoFullName".to_owned())
            })?;
        let branch = detail
            .default_branch_name
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| self.config.fallback_branch.clone());

        Ok(Repository { full_name, branch })
    }

    fn render_content(&mut self) -> Result<String, CoreError> {
        let templates = self.prompts.templates_with_prefix(COMMIT_CONTENT_PREFIX);
        let Some(name) = templates.choose(&mut self.rng) else {
            return Err(CoreError::Configuration(
                "no commit content templates available".to_owned(),
            ));
        };

        let version = format!(
            "{}.{}.{}",
            self.rng.gen_range(1..=9),
            self.rng.gen_range(0..=9),
            self.rng.gen_range(0..=99)
        );
        let title = TITLES.choose(&mut self.rng).copied().unwrap_or(TITLES[0]);
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let content = self.prompts.render(
            name,
            &json!({ "title": title, "timestamp": timestamp, "version": version }),
        )?;
        let marker = format!(
            "\n\n<!-- commit-{}-{} -->",
            self.count + 1,
            chrono::Utc::now().timestamp()
        );
        Ok(content + &marker)
    }

    fn build_form(&mut self, repository: &Repository) -> Result<Form, CoreError> {
        let content = self.render_content()?;
        let message = self.prompts.render(
            COMMIT_MESSAGE,
            &json!({ "repo_full_name": repository.full_name, "file_path": self.file_path }),
        )?;

        let repository_json = serde_json::to_string(&RepositoryPart {
            repo_id: &self.repository_id,
            repo_full_name: &repository.full_name,
        })?;
        let branch_json = serde_json::to_string(&BranchPart {
            branch_name: &repository.branch,
            need_review: 0,
        })?;
        let files_json = serde_json::to_string(&[FileChange {
            file_type: 0,
            file_path: &self.file_path,
            file_content: escape_newlines(&content),
            file_commit_message: message,
        }])?;

        Ok(Form::new()
            .text("operationType", self.config.operation_type.clone())
            .text("repository", repository_json)
            .text("branch", branch_json)
            .text("files", files_json))
    }

    async fn commit_once(&mut self, repository: &Repository) -> Result<(), CoreError> {
        let form = self.build_form(repository)?;
        info!(attempt = self.count + 1, max = self.max_commits, "committing file");

        let response = self
            .client
            .post(&self.config.commit_files_url)
            .headers(self.identity_headers()?)
            .multipart(form)
            .send()
            .await?;
        self.check_status(response.status(), "commitFiles")?;

        let body: ApiResponse<serde_json::Value> = response.json().await?;
        match body.code {
            0 => {
                self.count += 1;
                info!(count = self.count, max = self.max_commits, "commit accepted");
                Ok(())
            }
            code if code == self.config.filtered_code => {
                self.count += 1;
                warn!(
                    count = self.count,
                    code,
                    msg = body.msg.as_deref().unwrap_or_default(),
                    "commit filtered, attempt still counted"
                );
                Ok(())
            }
            code => Err(CoreError::ApplicationRejected {
                code,
                msg: body.msg.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer) -> SimConfig {
        let mut config = SimConfig::default();
        config.commit.repository_detail_url = format!("{}/repositoryDetail", server.uri());
        config.commit.commit_files_url = format!("{}/commitFiles", server.uri());
        config.pacing.commit_delay = DelayRange::ZERO;
        config
    }

    fn session(server: &MockServer, max: u32, context: Arc<CredentialContext>) -> CommitSession {
        let options = CommitOptions::builder()
            .credentials(Credentials::new("1001", "tok"))
            .project_id("p1")
            .repository_id("77")
            .max_commits(max)
            .seed(3)
            .build();
        CommitSession::new(
            options,
            &config(server),
            Arc::new(PromptManager::new().expect("should create prompt manager")),
            context,
        )
        .expect("should create session")
    }

    fn context() -> Arc<CredentialContext> {
        Arc::new(CredentialContext::with_credentials(Credentials::new(
            "1001", "tok",
        )))
    }

    async fn mount_repository(server: &MockServer, data: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/repositoryDetail"))
            .and(query_param("repositoryId", "77"))
            .and(header("projectid", "p1"))
            .and(header("sessionid", "tok"))
            .and(header("userid", "1001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": data })))
            .mount(server)
            .await;
    }

    fn commit_reply(code: i64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "code": code, "msg": "ok" }))
    }

    #[test]
    fn test_should_escape_newlines_literally() {
        assert_eq!(escape_newlines("# A\n\nB"), "# A\\n\\nB");
    }

    #[test]
    fn test_should_parse_repository_response_without_data() {
        let response: ApiResponse<RepositoryDetail> =
            serde_json::from_str(r#"{"code":401,"msg":"expired"}"#).expect("should parse");
        assert_eq!(response.code, 401);
        assert!(response.data.is_none());

        let response: ApiResponse<RepositoryDetail> =
            serde_json::from_str(r#"{"code":0,"data":{"repoFullName":"team/app"}}"#)
                .expect("should parse");
        let detail = response.data.expect("should carry data");
        assert_eq!(detail.repo_full_name.as_deref(), Some("team/app"));
        assert!(detail.default_branch_name.is_none());
    }

    #[test]
    fn test_should_encode_parts_compactly_in_order() {
        let repo = serde_json::to_string(&RepositoryPart {
            repo_id: "77",
            repo_full_name: "team/repo",
        })
        .expect("should encode");
        let branch = serde_json::to_string(&BranchPart {
            branch_name: "main",
            need_review: 0,
        })
        .expect("should encode");
        let files = serde_json::to_string(&[FileChange {
            file_type: 0,
            file_path: "README.md",
            file_content: escape_newlines("a\nb"),
            file_commit_message: "更新文件 team/repo/README.md".to_owned(),
        }])
        .expect("should encode");

        assert_eq!(repo, r#"{"repoId":"77","repoFullName":"team/repo"}"#);
        assert_eq!(branch, r#"{"branchName":"main","needReview":0}"#);
        assert_eq!(
            files,
            r#"[{"fileType":0,"filePath":"README.md","fileContent":"a\\nb","fileCommitMessage":"更新文件 team/repo/README.md"}]"#
        );
    }

    #[tokio::test]
    async fn test_should_render_unique_content_with_marker() {
        let server = MockServer::start().await;
        let mut session = session(&server, 3, context());

        let first = session.render_content().expect("should render");
        session.count = 1;
        let second = session.render_content().expect("should render");

        assert!(first.contains("\n\n<!-- commit-1-"));
        assert!(second.contains("\n\n<!-- commit-2-"));
        assert!(first.starts_with('#'));
        assert!(TITLES.iter().any(|t| first.contains(t)));
    }

    #[tokio::test]
    async fn test_should_finish_after_max_successful_commits() {
        let server = MockServer::start().await;
        mount_repository(
            &server,
            json!({ "repoFullName": "team/repo", "defaultBranchName": "main" }),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .and(header("projectid", "p1"))
            .and(body_string_contains("name=\"operationType\""))
            .and(body_string_contains(r#"{"repoId":"77","repoFullName":"team/repo"}"#))
            .and(body_string_contains(r#"{"branchName":"main","needReview":0}"#))
            .and(body_string_contains(r#""fileType":0,"filePath":"README.md""#))
            .and(body_string_contains(r"\\n"))
            .and(body_string_contains("更新文件 team/repo/README.md"))
            .respond_with(commit_reply(0))
            .expect(3)
            .mount(&server)
            .await;

        let report = session(&server, 3, context()).run().await;

        assert_eq!(report.state, CommitState::Done);
        assert_eq!(report.count, 3);
        assert!(report.error.is_none());
        assert_eq!(report.repo_full_name.as_deref(), Some("team/repo"));
        assert_eq!(report.branch.as_deref(), Some("main"));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_should_clear_credentials_on_unauthorized_commit() {
        let server = MockServer::start().await;
        mount_repository(&server, json!({ "repoFullName": "team/repo" })).await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(commit_reply(0))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let ctx = context();
        let report = session(&server, 3, Arc::clone(&ctx)).run().await;

        assert_eq!(report.state, CommitState::Failed);
        assert_eq!(report.count, 1);
        assert!(matches!(report.error, Some(CoreError::AuthExpired(_))));
        assert!(!ctx.has_credentials());
    }

    #[tokio::test]
    async fn test_should_count_filtered_commits() {
        let server = MockServer::start().await;
        mount_repository(&server, json!({ "repoFullName": "team/repo" })).await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(commit_reply(0))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(commit_reply(2928))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(commit_reply(0))
            .mount(&server)
            .await;

        let report = session(&server, 5, context()).run().await;

        assert_eq!(report.state, CommitState::Done);
        assert_eq!(report.count, 5);
    }

    #[tokio::test]
    async fn test_should_fall_back_to_default_branch() {
        let server = MockServer::start().await;
        mount_repository(&server, json!({ "repoFullName": "team/repo" })).await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .and(body_string_contains(r#"{"branchName":"master","needReview":0}"#))
            .respond_with(commit_reply(0))
            .expect(1)
            .mount(&server)
            .await;

        let report = session(&server, 1, context()).run().await;

        assert_eq!(report.state, CommitState::Done);
        assert_eq!(report.branch.as_deref(), Some("master"));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_should_stop_on_rejected_commit() {
        let server = MockServer::start().await;
        mount_repository(&server, json!({ "repoFullName": "team/repo" })).await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(commit_reply(5001))
            .expect(1)
            .mount(&server)
            .await;

        let report = session(&server, 4, context()).run().await;

        assert_eq!(report.state, CommitState::Failed);
        assert_eq!(report.count, 0);
        assert!(matches!(
            report.error,
            Some(CoreError::ApplicationRejected { code: 5001, .. })
        ));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_should_fail_before_committing_on_unauthorized_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositoryDetail"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(commit_reply(0))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = context();
        let report = session(&server, 3, Arc::clone(&ctx)).run().await;

        assert_eq!(report.state, CommitState::Failed);
        assert_eq!(report.count, 0);
        assert!(report.repo_full_name.is_none());
        assert!(!ctx.has_credentials());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_should_never_commit_without_repository_name() {
        let server = MockServer::start().await;
        mount_repository(&server, json!({ "defaultBranchName": "main" })).await;
        Mock::given(method("POST"))
            .and(path("/commitFiles"))
            .respond_with(commit_reply(0))
            .expect(0)
            .mount(&server)
            .await;

        let report = session(&server, 2, context()).run().await;

        assert_eq!(report.state, CommitState::Failed);
        assert!(matches!(report.error, Some(CoreError::Configuration(_))));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_should_reject_zero_max_commits() {
        let server = MockServer::start().await;
        let report = session(&server, 0, context()).run().await;

        assert_eq!(report.state, CommitState::Failed);
        assert!(matches!(report.error, Some(CoreError::Configuration(_))));
    }
}
