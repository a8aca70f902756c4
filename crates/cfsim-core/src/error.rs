use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("authentication expired: {0}")]
    AuthExpired(String),

    #[error("rejected by server (code {code}): {msg}")]
    ApplicationRejected { code: i64, msg: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("template error: {0}")]
    Template(#[from] cfsim_pm::PmError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<cfsim_proto::ProtoError> for CoreError {
    fn from(e: cfsim_proto::ProtoError) -> Self {
        match e {
            cfsim_proto::ProtoError::Malformed(msg) => Self::MalformedMessage(msg),
            other => Self::Session(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CoreError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
