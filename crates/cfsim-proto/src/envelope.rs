//! Envelope codec.
//!
//! Outbound frames are always wrapped in [`ENVELOPE_START`] / [`ENVELOPE_END`].
//! Inbound frames are accepted either wrapped or as raw JSON, since the
//! server omits the wrapper on some frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;
use crate::kind::MessageKind;

/// Literal marker opening every outbound frame.
pub const ENVELOPE_START: &str = "<WBChannel>";

/// Literal marker closing every outbound frame.
pub const ENVELOPE_END: &str = "</WBChannel>";

/// One decoded channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind, serialized as `messageName`.
    #[serde(rename = "messageName")]
    pub kind: MessageKind,

    /// Routing and identity fields.
    #[serde(default)]
    pub context: Option<Value>,

    /// Kind-specific body.
    #[serde(default)]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Create an envelope with neither context nor payload.
    pub fn bare(kind: MessageKind) -> Self {
        Self {
            kind,
            context: None,
            payload: None,
        }
    }

    /// Create an envelope from serializable context and payload values.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::Encode` if either part fails to serialize.
    pub fn new<C, P>(
        kind: MessageKind,
        context: Option<&C>,
        payload: Option<&P>,
    ) -> Result<Self, ProtoError>
    where
        C: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        let context = context.map(|c| to_part(&kind, c)).transpose()?;
        let payload = payload.map(|p| to_part(&kind, p)).transpose()?;

        Ok(Self {
            kind,
            context,
            payload,
        })
    }

    /// Serialize to JSON and wrap in the envelope markers.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::Encode` if the body cannot be serialized.
    pub fn encode(&self) -> Result<String, ProtoError> {
        let body = serde_json::to_string(self).map_err(|source| ProtoError::Encode {
            kind: self.kind.to_string(),
            source,
        })?;
        Ok(format!("{ENVELOPE_START}{body}{ENVELOPE_END}"))
    }

    /// Parse a frame, stripping the envelope markers when both are present.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::Malformed` if the frame is not a JSON message body.
    pub fn decode(frame: &str) -> Result<Self, ProtoError> {
        let body = frame
            .strip_prefix(ENVELOPE_START)
            .and_then(|rest| rest.strip_suffix(ENVELOPE_END))
            .unwrap_or(frame);

        serde_json::from_str(body).map_err(|e| ProtoError::Malformed(e.to_string()))
    }

    /// Look up a string field in the context.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        field_str(self.context.as_ref(), key)
    }

    /// Look up a string field in the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        field_str(self.payload.as_ref(), key)
    }

    /// Look up a raw field in the payload.
    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(key))
    }
}

fn field_str<'a>(part: Option<&'a Value>, key: &str) -> Option<&'a str> {
    part.and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn to_part<T: Serialize + ?Sized>(kind: &MessageKind, part: &T) -> Result<Value, ProtoError> {
    serde_json::to_value(part).map_err(|source| ProtoError::Encode {
        kind: kind.to_string(),
        source,
    })
}
