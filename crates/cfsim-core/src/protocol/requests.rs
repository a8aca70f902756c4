//! Outbound message construction.

use cfsim_pm::{COMMENT_CODE_BLOCK, COMMENT_SYSTEM, COMMENT_USER, PromptManager};
use cfsim_proto::messages::{
    ActivityClient, ActivityReport, ApiKeyRequest, ClientInfo, CodeChatMessages, CodeGenMessages,
    Context, GenerationRequest, Prompt, PromptFile,
};
use cfsim_proto::{Envelope, MessageKind};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::json;

use crate::config::SimConfig;
use crate::credentials::Credentials;
use crate::error::CoreError;
use crate::pacing::SimRng;
use crate::pool::SourceFile;

/// Prefix/suffix pairs a completion request is built around.
const CODE_VARIATIONS: &[(&str, &str)] = &[
    ("const name = '", "';\nconsole.log(name);"),
    ("function hello() {\n  return '", "';\n}"),
    ("let count = ", ";\ncount++;"),
    ("if (true) {\n  console.log('", "');\n}"),
    ("const arr = [1, 2, ", "];\narr.push(4);"),
    (
        "class MyClass {\n  constructor() {\n    this.value = '",
        "';\n  }\n}",
    ),
    (
        "async function getData() {\n  const response = '",
        "';\n  return response;\n}",
    ),
    ("const obj = {\n  key: '", "',\n  method() {}\n};"),
];

/// Tokens spliced onto the prefix.
const CODE_WORDS: &[&str] = &[
    "hello", "world", "test", "code", "data", "value", "result", "item", "name", "id", "user",
    "admin", "config", "setting", "option", "param",
];

const COMPLETION_LANGUAGE: &str = "javascript";
const COMPLETION_MAX_TOKENS: u32 = 256;
const COMMENT_MAX_TOKENS: u32 = 4096;
const COMMENT_SUB_SERVICE: &str = "codecomment";
const ACTIVITY_SERVICE: &str = "codegen";
const ACTIVITY_PROJECT: &str = "code-free";

/// Activity type reported after a counted completion.
pub(crate) const ACTIVITY_COMPLETION: &str = "code_display";

/// Activity type reported after a counted comment.
pub(crate) const ACTIVITY_COMMENT: &str = "chat_gen_code";

/// Fresh request id. Drawn from the session RNG so seeded runs repeat.
pub(crate) fn new_id(rng: &mut SimRng) -> String {
    uuid::Builder::from_random_bytes(rng.r#gen())
        .into_uuid()
        .to_string()
}

/// Builds every message one session sends.
#[derive(Debug, Clone)]
pub(crate) struct RequestFactory {
    credentials: Credentials,
    protocol_version: String,
    chat_protocol_version: String,
    app_group_id: String,
    subscription_group_id: String,
    filename: String,
    client: ClientInfo,
    chat_client: ClientInfo,
}

impl RequestFactory {
    pub(crate) fn new(credentials: Credentials, config: &SimConfig, platform: &str) -> Self {
        Self {
            credentials,
            protocol_version: config.channel.protocol_version.clone(),
            chat_protocol_version: config.channel.chat_protocol_version.clone(),
            app_group_id: config.channel.app_group_id.clone(),
            subscription_group_id: config.channel.subscription_group_id.clone(),
            filename: config.client.target_filename.clone(),
            client: config.client.client_info(platform, false),
            chat_client: config.client.client_info(platform, true),
        }
    }

    pub(crate) fn register(&self) -> Result<Envelope, CoreError> {
        let kind = MessageKind::RegisterChannel;
        let context = Context::builder()
            .message_name(kind.as_str())
            .app_group_id(self.app_group_id.as_str())
            .invoker_id(self.credentials.account_id.as_str())
            .session_id(self.credentials.session_token.as_str())
            .version(self.protocol_version.as_str())
            .build();
        Ok(Envelope::new(kind, Some(&context), None::<&()>)?)
    }

    pub(crate) fn api_key_request(&self, rng: &mut SimRng) -> Result<Envelope, CoreError> {
        let kind = MessageKind::GetUserApiKey;
        let context = Context::builder()
            .message_name(kind.as_str())
            .req_id(new_id(rng))
            .invoker_id(self.credentials.account_id.as_str())
            .session_id(self.credentials.session_token.as_str())
            .version(self.protocol_version.as_str())
            .build();
        let payload = ApiKeyRequest {
            client: &self.client,
        };
        Ok(Envelope::new(kind, Some(&context), Some(&payload))?)
    }

    pub(crate) fn subscribe(&self, rng: &mut SimRng) -> Result<Envelope, CoreError> {
        let kind = MessageKind::SubscribeChannelGroup;
        let context = Context::builder()
            .message_name(kind.as_str())
            .invoker_id(self.credentials.account_id.as_str())
            .group_id(self.subscription_group_id.as_str())
            .req_id(new_id(rng))
            .version(self.protocol_version.as_str())
            .build();
        Ok(Envelope::new(kind, Some(&context), None::<&()>)?)
    }

    /// A completion request around a random code variation.
    pub(crate) fn completion(&self, api_key: &str, rng: &mut SimRng) -> Result<Envelope, CoreError> {
        let kind = MessageKind::CodeGenRequest;
        let (prefix, suffix) = CODE_VARIATIONS
            .choose(rng)
            .copied()
            .unwrap_or(CODE_VARIATIONS[0]);
        let word = CODE_WORDS.choose(rng).copied().unwrap_or(CODE_WORDS[0]);

        let context = Context::builder()
            .message_name(kind.as_str())
            .req_id(new_id(rng))
            .invoker_id(self.credentials.account_id.as_str())
            .session_id(self.credentials.session_token.as_str())
            .version(self.protocol_version.as_str())
            .api_key(api_key)
            .build();
        let payload = GenerationRequest {
            client: &self.client,
            messages: CodeGenMessages {
                language: COMPLETION_LANGUAGE.to_owned(),
                filename: self.filename.clone(),
                prefix: format!("{prefix}{word}"),
                suffix: suffix.to_owned(),
                max_new_tokens: COMPLETION_MAX_TOKENS,
                stop_words: vec!["\n".to_owned()],
            },
        };
        Ok(Envelope::new(kind, Some(&context), Some(&payload))?)
    }

    /// A code-comment chat turn quoting `file`.
    pub(crate) fn comment(
        &self,
        api_key: &str,
        file: &SourceFile,
        prompts: &PromptManager,
        rng: &mut SimRng,
    ) -> Result<Envelope, CoreError> {
        let kind = MessageKind::CodeChatRequest;
        let code_block = prompts.render(
            COMMENT_CODE_BLOCK,
            &json!({ "language": file.language, "content": file.content }),
        )?;
        let user = prompts.render(COMMENT_USER, &json!({ "code_block": code_block }))?;
        let system = prompts.render(COMMENT_SYSTEM, &json!({}))?;

        let context = Context::builder()
            .message_name(kind.as_str())
            .req_id(new_id(rng))
            .invoker_id(self.credentials.account_id.as_str())
            .session_id(new_id(rng))
            .version(self.chat_protocol_version.as_str())
            .api_key(api_key)
            .build();
        let payload = GenerationRequest {
            client: &self.chat_client,
            messages: CodeChatMessages {
                max_new_tokens: COMMENT_MAX_TOKENS,
                sub_service: COMMENT_SUB_SERVICE.to_owned(),
                prompts: vec![
                    Prompt::system(system),
                    Prompt::user(
                        user,
                        vec![PromptFile {
                            path: file.path.display().to_string(),
                            text: code_block,
                            start_line: 0,
                            end_line: file.line_count(),
                        }],
                    ),
                ],
                dialog_id: new_id(rng),
                question_type: "newAsk".to_owned(),
                parent_req_id: String::new(),
                kb_id: String::new(),
            },
        };
        Ok(Envelope::new(kind, Some(&context), Some(&payload))?)
    }

    /// Telemetry sent after each counted response.
    pub(crate) fn activity(
        &self,
        api_key: &str,
        activity_type: &str,
        rng: &mut SimRng,
    ) -> Result<Envelope, CoreError> {
        let kind = MessageKind::UserActivityNotify;
        let context = Context::builder()
            .message_name(kind.as_str())
            .req_id(new_id(rng))
            .invoker_id(self.credentials.account_id.as_str())
            .version(self.protocol_version.as_str())
            .api_key(api_key)
            .build();
        let payload = ActivityReport {
            client: ActivityClient::from_client(&self.client, ACTIVITY_PROJECT),
            activity_type: activity_type.to_owned(),
            service: ACTIVITY_SERVICE.to_owned(),
            lines: rng.r#gen::<f64>() * 2.0,
            count: 1,
        };
        Ok(Envelope::new(kind, Some(&context), Some(&payload))?)
    }
}
