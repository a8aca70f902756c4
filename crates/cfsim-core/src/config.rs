//! Configuration types for cfsim-core.
//!
//! This module defines [`EngineConfig`] (CLI-level overrides) and
//! [`SimConfig`] (from `.cfsim/config.yaml`) with all sub-configuration
//! types. CLI values in `EngineConfig` take precedence over the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use cfsim_proto::messages::{
    APP_GROUP_ID, CHAT_PROTOCOL_VERSION, ClientInfo, PROTOCOL_VERSION, SUBSCRIPTION_GROUP_ID,
};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::CoreError;
use crate::pacing::{DelayRange, MAX_DELAY_SECS};

/// Upper bound on completions per session.
pub const MAX_COMPLETIONS: u32 = 2000;

/// Upper bound on comment requests per session.
pub const MAX_COMMENTS: u32 = 20;

// ── Engine Configuration (CLI-level) ─────────────────────────

/// Engine configuration provided by the CLI layer.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use cfsim_core::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .work_dir(PathBuf::from("/tmp/sim"))
///     .seed(Some(7))
///     .build();
/// assert_eq!(config.config_path(), PathBuf::from("/tmp/sim/.cfsim/config.yaml"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct EngineConfig {
    /// Directory holding `.cfsim/`.
    work_dir: PathBuf,

    /// Explicit config file, instead of `.cfsim/config.yaml`.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    config_file: Option<PathBuf>,

    /// Seed for all random choices; entropy when absent.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,

    /// Source directory for comment mode (takes precedence over config.yaml).
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    source_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Returns the working directory.
    pub fn work_dir(&self) -> &PathBuf {
        &self.work_dir
    }

    /// Returns the RNG seed, if set.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Returns the source directory override, if set.
    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    /// Returns the `.cfsim` directory path.
    pub fn cfsim_dir(&self) -> PathBuf {
        self.work_dir.join(".cfsim")
    }

    /// Returns the config file to load.
    pub fn config_path(&self) -> PathBuf {
        self.config_file
            .clone()
            .unwrap_or_else(|| self.cfsim_dir().join("config.yaml"))
    }
}

// ── Simulation mode ──────────────────────────────────────────

/// What a protocol session simulates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimMode {
    /// Inline code completion requests.
    #[default]
    Completion,
    /// Code-comment chat requests over real source files.
    Comment,
}

impl SimMode {
    /// Largest target count a session in this mode accepts.
    pub fn max_target(self) -> u32 {
        match self {
            Self::Completion => MAX_COMPLETIONS,
            Self::Comment => MAX_COMMENTS,
        }
    }

    /// Check a requested target against this mode's bounds.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if `target` is zero or above the limit.
    pub fn validate_target(self, target: u32) -> Result<u32, CoreError> {
        if target == 0 || target > self.max_target() {
            return Err(CoreError::Configuration(format!(
                "{self} target must be between 1 and {}, got {target}",
                self.max_target()
            )));
        }
        Ok(target)
    }
}

impl fmt::Display for SimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion => f.write_str("completion"),
            Self::Comment => f.write_str("comment"),
        }
    }
}

impl FromStr for SimMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "completion" => Ok(Self::Completion),
            "comment" => Ok(Self::Comment),
            other => Err(CoreError::Configuration(format!("unknown mode: {other}"))),
        }
    }
}

// ── Simulation Configuration (.cfsim/config.yaml) ────────────

/// Simulation settings, deserialized from `.cfsim/config.yaml`.
///
/// All fields have serde defaults so a missing or partial file yields a
/// working configuration aimed at the public gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimConfig {
    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub commit: CommitConfig,

    /// Source directory sampled in comment mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,

    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// Peer channel endpoint and protocol identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    #[serde(default = "default_channel_url")]
    pub url: String,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    #[serde(default = "default_chat_protocol_version")]
    pub chat_protocol_version: String,

    #[serde(default = "default_app_group_id")]
    pub app_group_id: String,

    #[serde(default = "default_subscription_group_id")]
    pub subscription_group_id: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: default_channel_url(),
            protocol_version: default_protocol_version(),
            chat_protocol_version: default_chat_protocol_version(),
            app_group_id: default_app_group_id(),
            subscription_group_id: default_subscription_group_id(),
        }
    }
}

/// Synthetic editor identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_client_type")]
    pub client_type: String,

    #[serde(default = "default_client_version")]
    pub client_version: String,

    #[serde(default = "default_protocol_version")]
    pub plugin_version: String,

    #[serde(default = "default_chat_protocol_version")]
    pub chat_plugin_version: String,

    /// Platform tag such as `linux-x64`; detected from the host when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// File name reported with completion requests.
    #[serde(default = "default_target_filename")]
    pub target_filename: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_type: default_client_type(),
            client_version: default_client_version(),
            plugin_version: default_protocol_version(),
            chat_plugin_version: default_chat_protocol_version(),
            platform: None,
            target_filename: default_target_filename(),
        }
    }
}

impl ClientConfig {
    /// Platform tag, configured or detected.
    pub fn platform_tag(&self) -> String {
        self.platform.clone().unwrap_or_else(detect_platform)
    }

    /// Client identity block; chat requests report the chat plugin version.
    pub fn client_info(&self, platform: &str, chat: bool) -> ClientInfo {
        ClientInfo {
            client_type: self.client_type.clone(),
            client_version: self.client_version.clone(),
            client_platform: platform.to_owned(),
            git_urls: Vec::new(),
            plugin_version: if chat {
                self.chat_plugin_version.clone()
            } else {
                self.plugin_version.clone()
            },
        }
    }
}

/// Delays and periods, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingConfig {
    /// Wait between a counted response and the next request.
    #[serde(default = "default_request_delay")]
    pub request_delay: DelayRange,

    /// Wait before the first generation request once the session is active.
    #[serde(default = "default_warmup")]
    pub warmup: f64,

    /// Client heartbeat period.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: f64,

    /// Wait between commits.
    #[serde(default = "default_commit_delay")]
    pub commit_delay: DelayRange,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            request_delay: default_request_delay(),
            warmup: default_warmup(),
            heartbeat_interval: default_heartbeat_interval(),
            commit_delay: default_commit_delay(),
        }
    }
}

impl PacingConfig {
    /// No waiting anywhere; heartbeat period kept as configured.
    pub fn immediate() -> Self {
        Self {
            request_delay: DelayRange::ZERO,
            warmup: 0.0,
            commit_delay: DelayRange::ZERO,
            ..Self::default()
        }
    }

    /// Check every value is finite and within `0..=MAX_DELAY_SECS`, ranges
    /// are ordered, and the heartbeat period is positive.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_secs("pacing.warmup", self.warmup)?;
        check_secs("pacing.heartbeatInterval", self.heartbeat_interval)?;
        if self.heartbeat_interval <= 0.0 {
            return Err(CoreError::Configuration(
                "pacing.heartbeatInterval must be positive".to_owned(),
            ));
        }
        check_range("pacing.requestDelay", &self.request_delay)?;
        check_range("pacing.commitDelay", &self.commit_delay)
    }
}

fn check_secs(field: &str, value: f64) -> Result<(), CoreError> {
    if (0.0..=MAX_DELAY_SECS).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::Configuration(format!(
            "{field} must be between 0 and {MAX_DELAY_SECS} seconds, got {value}"
        )))
    }
}

fn check_range(field: &str, range: &DelayRange) -> Result<(), CoreError> {
    check_secs(&format!("{field}.min"), range.min)?;
    check_secs(&format!("{field}.max"), range.max)?;
    if range.min > range.max {
        return Err(CoreError::Configuration(format!(
            "{field}.min must not exceed {field}.max"
        )));
    }
    Ok(())
}

/// Commit workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitConfig {
    #[serde(default = "default_repository_detail_url")]
    pub repository_detail_url: String,

    #[serde(default = "default_commit_files_url")]
    pub commit_files_url: String,

    /// Repository file rewritten by each commit.
    #[serde(default = "default_commit_file_path")]
    pub file_path: String,

    #[serde(default = "default_max_commits")]
    pub max_commits: u32,

    /// Result code meaning the commit was filtered but still consumed.
    #[serde(default = "default_filtered_code")]
    pub filtered_code: i64,

    /// Branch used when the repository reports none.
    #[serde(default = "default_fallback_branch")]
    pub fallback_branch: String,

    #[serde(default = "default_operation_type")]
    pub operation_type: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            repository_detail_url: default_repository_detail_url(),
            commit_files_url: default_commit_files_url(),
            file_path: default_commit_file_path(),
            max_commits: default_max_commits(),
            filtered_code: default_filtered_code(),
            fallback_branch: default_fallback_branch(),
            operation_type: default_operation_type(),
        }
    }
}

/// Template override directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatesConfig {
    /// Directories searched (in order) for `.j2` overrides.
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

// ── Default value functions for serde ────────────────────────

fn default_channel_url() -> String {
    "wss://www.srdcloud.cn/websocket/peerAppgw".to_owned()
}

fn default_protocol_version() -> String {
    PROTOCOL_VERSION.to_owned()
}

fn default_chat_protocol_version() -> String {
    CHAT_PROTOCOL_VERSION.to_owned()
}

fn default_app_group_id() -> String {
    APP_GROUP_ID.to_owned()
}

fn default_subscription_group_id() -> String {
    SUBSCRIPTION_GROUP_ID.to_owned()
}

fn default_client_type() -> String {
    "vscode".to_owned()
}

fn default_client_version() -> String {
    "1.106.0-insider".to_owned()
}

fn default_target_filename() -> String {
    "simulator.js".to_owned()
}

fn default_request_delay() -> DelayRange {
    DelayRange::new(0.5, 2.5)
}

fn default_warmup() -> f64 {
    1.0
}

fn default_heartbeat_interval() -> f64 {
    10.0
}

fn default_commit_delay() -> DelayRange {
    DelayRange::new(1.0, 3.0)
}

fn default_repository_detail_url() -> String {
    "https://www.srdcloud.cn/api/codebackend/codecenter/repository/v1/repositoryDetail".to_owned()
}

fn default_commit_files_url() -> String {
    "https://www.srdcloud.cn/api/codebackend/codecenter/gitclient/v1/commitFiles".to_owned()
}

fn default_commit_file_path() -> String {
    "README.md".to_owned()
}

fn default_max_commits() -> u32 {
    8
}

fn default_filtered_code() -> i64 {
    2928
}

fn default_fallback_branch() -> String {
    "master".to_owned()
}

fn default_operation_type() -> String {
    "4".to_owned()
}

/// Platform tag for the host, in the editor's naming scheme.
pub fn detect_platform() -> String {
    platform_tag(std::env::consts::OS, std::env::consts::ARCH)
}

fn platform_tag(os: &str, arch: &str) -> String {
    match os {
        "macos" if arch.contains("arm") || arch == "aarch64" => "macos-arm64".to_owned(),
        "macos" => "macos-x64".to_owned(),
        "windows" => "windows-x64".to_owned(),
        "linux" => "linux-x64".to_owned(),
        _ => format!("{os}-{arch}"),
    }
}

// ── Config loading ───────────────────────────────────────────

/// Load [`SimConfig`] from a YAML file.
///
/// If the file does not exist, returns the default configuration.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
/// Returns `CoreError::Configuration` if a pacing value is out of range.
pub fn load_sim_config(config_path: &Path) -> Result<SimConfig, CoreError> {
    if !config_path.exists() {
        return Ok(SimConfig::default());
    }
    let content = std::fs::read_to_string(config_path)?;
    if content.trim().is_empty() {
        return Ok(SimConfig::default());
    }
    let config: SimConfig = serde_yaml::from_str(&content)?;
    config.pacing.validate()?;
    Ok(config)
}
