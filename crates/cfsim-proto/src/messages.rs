//! Typed context and payload shapes for outbound messages.
//!
//! Field names follow the peer gateway's camelCase contract. The
//! `messages` block inside generation payloads keeps the snake_case keys the
//! model service expects (`max_new_tokens`, `stop_words`, `sub_service`).

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Protocol version sent with channel and completion messages.
pub const PROTOCOL_VERSION: &str = "2.0.0";

/// Protocol version sent with chat messages.
pub const CHAT_PROTOCOL_VERSION: &str = "2.1.0";

/// Application group the channel registers under.
pub const APP_GROUP_ID: &str = "aicode";

/// Notification group joined after the api key is issued.
pub const SUBSCRIPTION_GROUP_ID: &str = "aicode/comment/undefined";

/// Message context. Only the fields a given kind needs are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Repeats the envelope's kind, as the gateway expects.
    #[builder(setter(into))]
    pub message_name: String,

    #[serde(rename = "appGId", default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub app_group_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub req_id: Option<String>,

    /// Account identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub invoker_id: Option<String>,

    /// Session token, or a per-dialog session id for chat requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub group_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub api_key: Option<String>,
}

/// Synthetic editor identity attached to api-key and generation payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub client_type: String,
    pub client_version: String,
    pub client_platform: String,
    pub git_urls: Vec<String>,
    pub plugin_version: String,
}

/// `GetUserApiKey` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyRequest<'a> {
    #[serde(flatten)]
    pub client: &'a ClientInfo,
}

/// Payload wrapper shared by `CodeGenRequest` and `CodeChatRequest`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest<'a, M> {
    #[serde(flatten)]
    pub client: &'a ClientInfo,
    pub messages: M,
}

/// Completion request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeGenMessages {
    pub language: String,
    pub filename: String,
    pub prefix: String,
    pub suffix: String,
    pub max_new_tokens: u32,
    pub stop_words: Vec<String>,
}

/// Chat request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChatMessages {
    pub max_new_tokens: u32,
    pub sub_service: String,
    pub prompts: Vec<Prompt>,
    #[serde(rename = "dialogId")]
    pub dialog_id: String,
    #[serde(rename = "questionType")]
    pub question_type: String,
    #[serde(rename = "parentReqId")]
    pub parent_req_id: String,
    #[serde(rename = "kbId")]
    pub kb_id: String,
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<PromptFile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_items: Option<Vec<serde_json::Value>>,
}

impl Prompt {
    /// A system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_owned(),
            content: content.into(),
            files: None,
            work_items: None,
        }
    }

    /// A user turn quoting the given files.
    pub fn user(content: impl Into<String>, files: Vec<PromptFile>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
            files: Some(files),
            work_items: Some(Vec::new()),
        }
    }
}

/// A file attached to a user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFile {
    pub path: String,
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// `UserActivityNotify` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    pub client: ActivityClient,
    pub activity_type: String,
    pub service: String,
    pub lines: f64,
    pub count: u32,
}

/// Client block inside an activity report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityClient {
    pub platform: String,
    #[serde(rename = "type")]
    pub client_type: String,
    pub version: String,
    pub plugin_version: String,
    pub git_url: String,
    pub git_urls: Vec<String>,
    pub project_name: String,
}

impl ActivityClient {
    pub fn from_client(client: &ClientInfo, project_name: impl Into<String>) -> Self {
        Self {
            platform: client.client_platform.clone(),
            client_type: client.client_type.clone(),
            version: client.client_version.clone(),
            plugin_version: client.plugin_version.clone(),
            git_url: String::new(),
            git_urls: Vec::new(),
            project_name: project_name.into(),
        }
    }
}

/// Whether a `CodeChatRequest_resp` payload marks the end of the stream.
///
/// The gateway sends `isEnd: 1`; a boolean `true` is accepted too.
pub fn is_terminal_chunk(payload: Option<&serde_json::Value>) -> bool {
    match payload.and_then(|p| p.get("isEnd")) {
        Some(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
        Some(serde_json::Value::Bool(b)) => *b,
        _ => false,
    }
}
