use std::fmt;

use serde::{Deserialize, Serialize};

/// Message kinds recognized on the peer channel.
///
/// Anything the catalog does not know is preserved verbatim in
/// [`MessageKind::Other`] so it can be logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    RegisterChannel,
    RegisterChannelResp,
    GetUserApiKey,
    GetUserApiKeyResp,
    SubscribeChannelGroup,
    SubscribeChannelGroupResp,
    CodeGenRequest,
    CodeGenRequestResp,
    CodeChatRequest,
    CodeChatRequestResp,
    UserActivityNotify,
    ServerHeartbeat,
    ServerHeartbeatResponse,
    ClientHeartbeat,
    ClientHeartbeatResponse,
    Other(String),
}

impl MessageKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::RegisterChannel => "RegisterChannel",
            Self::RegisterChannelResp => "RegisterChannel_resp",
            Self::GetUserApiKey => "GetUserApiKey",
            Self::GetUserApiKeyResp => "GetUserApiKey_resp",
            Self::SubscribeChannelGroup => "SubscribeChannelGroup",
            Self::SubscribeChannelGroupResp => "SubscribeChannelGroup_resp",
            Self::CodeGenRequest => "CodeGenRequest",
            Self::CodeGenRequestResp => "CodeGenRequest_resp",
            Self::CodeChatRequest => "CodeChatRequest",
            Self::CodeChatRequestResp => "CodeChatRequest_resp",
            Self::UserActivityNotify => "UserActivityNotify",
            Self::ServerHeartbeat => "ServerHeartbeat",
            Self::ServerHeartbeatResponse => "ServerHeartbeatResponse",
            Self::ClientHeartbeat => "ClientHeartbeat",
            Self::ClientHeartbeatResponse => "ClientHeartbeatResponse",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for MessageKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "RegisterChannel" => Self::RegisterChannel,
            "RegisterChannel_resp" => Self::RegisterChannelResp,
            "GetUserApiKey" => Self::GetUserApiKey,
            "GetUserApiKey_resp" => Self::GetUserApiKeyResp,
            "SubscribeChannelGroup" => Self::SubscribeChannelGroup,
            "SubscribeChannelGroup_resp" => Self::SubscribeChannelGroupResp,
            "CodeGenRequest" => Self::CodeGenRequest,
            "CodeGenRequest_resp" => Self::CodeGenRequestResp,
            "CodeChatRequest" => Self::CodeChatRequest,
            "CodeChatRequest_resp" => Self::CodeChatRequestResp,
            "UserActivityNotify" => Self::UserActivityNotify,
            "ServerHeartbeat" => Self::ServerHeartbeat,
            "ServerHeartbeatResponse" => Self::ServerHeartbeatResponse,
            "ClientHeartbeat" => Self::ClientHeartbeat,
            "ClientHeartbeatResponse" => Self::ClientHeartbeatResponse,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for MessageKind {
    fn from(name: &str) -> Self {
        Self::from(name.to_owned())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_reply_names_with_resp_suffix() {
        assert_eq!(
            MessageKind::from("RegisterChannel_resp"),
            MessageKind::RegisterChannelResp
        );
        assert_eq!(MessageKind::CodeChatRequestResp.as_str(), "CodeChatRequest_resp");
    }

    #[test]
    fn test_should_preserve_unknown_kind_names() {
        let kind = MessageKind::from("BroadcastNotice");
        assert_eq!(kind, MessageKind::Other("BroadcastNotice".to_owned()));
        assert_eq!(String::from(kind), "BroadcastNotice");
    }

    #[test]
    fn test_should_serialize_as_plain_string() {
        let json = serde_json::to_value(MessageKind::ClientHeartbeat).expect("should serialize");
        assert_eq!(json, "ClientHeartbeat");

        let kind: MessageKind =
            serde_json::from_value(serde_json::json!("ServerHeartbeat")).expect("should parse");
        assert_eq!(kind, MessageKind::ServerHeartbeat);
    }
}
