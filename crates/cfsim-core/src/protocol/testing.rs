//! Scripted peer gateway for session tests.

use std::sync::Arc;

use cfsim_proto::{Envelope, MessageKind};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::transport::testing::PeerEnd;

pub(crate) type Log = Arc<Mutex<Vec<Envelope>>>;

/// Scripted peer gateway.
#[derive(Clone)]
pub(crate) struct Gateway {
    pub api_key: Option<&'static str>,
    pub answer: bool,
    pub chunks: usize,
    pub chatter: bool,
    pub hang_up_after: Option<usize>,
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            api_key: Some("api-key-1"),
            answer: true,
            chunks: 0,
            chatter: false,
            hang_up_after: None,
        }
    }
}

pub(crate) fn reply(kind: MessageKind, context: Option<Value>, payload: Option<Value>) -> String {
    Envelope {
        kind,
        context,
        payload,
    }
    .encode()
    .expect("should encode")
}

pub(crate) async fn serve(gateway: Gateway, mut peer: PeerEnd, log: Log) {
    let mut generations = 0;

    while let Some(frame) = peer.outbound.next().await {
        let envelope = Envelope::decode(&frame).expect("client frames should decode");
        let kind = envelope.kind.clone();
        log.lock().push(envelope);

        let replies = match kind {
            MessageKind::RegisterChannel => {
                let mut out = vec![reply(
                    MessageKind::RegisterChannelResp,
                    Some(json!({ "channelId": "ch-1" })),
                    None,
                )];
                if gateway.chatter {
                    out.push("definitely not json".to_owned());
                    out.push(reply(MessageKind::ServerHeartbeat, None, None));
                }
                out
            }
            MessageKind::GetUserApiKey => {
                let payload = match gateway.api_key {
                    Some(key) => json!({ "apiKey": key }),
                    None => json!({}),
                };
                vec![reply(MessageKind::GetUserApiKeyResp, None, Some(payload))]
            }
            MessageKind::SubscribeChannelGroup => {
                // Unwrapped JSON is accepted as well.
                vec![r#"{"messageName":"SubscribeChannelGroup_resp","context":null,"payload":null}"#.to_owned()]
            }
            MessageKind::CodeGenRequest | MessageKind::CodeChatRequest => {
                generations += 1;
                if gateway.hang_up_after.is_some_and(|n| generations > n) {
                    return;
                }
                if !gateway.answer {
                    Vec::new()
                } else if kind == MessageKind::CodeGenRequest {
                    vec![reply(
                        MessageKind::CodeGenRequestResp,
                        None,
                        Some(json!({ "answer": "world" })),
                    )]
                } else {
                    let mut out: Vec<String> = (0..gateway.chunks)
                        .map(|i| {
                            reply(
                                MessageKind::CodeChatRequestResp,
                                None,
                                Some(json!({ "answer": format!("part {i}"), "isEnd": 0 })),
                            )
                        })
                        .collect();
                    out.push(reply(
                        MessageKind::CodeChatRequestResp,
                        None,
                        Some(json!({ "answer": "", "isEnd": 1 })),
                    ));
                    out
                }
            }
            _ => Vec::new(),
        };

        for frame in replies {
            if peer.inbound.unbounded_send(Ok(frame)).is_err() {
                return;
            }
        }
    }
}
