//! Core engine for cfsim.
//!
//! Simulates editor clients of the CodeFree gateway. A [`ProtocolSession`]
//! drives one peer channel through registration, api-key fetch and
//! subscription, then issues completion or comment requests until its target
//! is reached. A [`CommitSession`] performs a bounded series of synthetic
//! repository commits over HTTP. The [`Engine`] ties configuration,
//! templates and the shared [`CredentialContext`] together.

mod accounts;
mod capture;
mod commit;
mod config;
mod credentials;
mod engine;
mod error;
mod orchestrator;
mod pacing;
mod pool;
mod protocol;
mod report;
mod transport;

pub use accounts::{load_accounts, parse_accounts, write_accounts_template};
pub use capture::{CaptureReceiver, CaptureSender, CapturedCredentials, capture_channel};
pub use commit::{CommitOptions, CommitSession};
pub use config::{
    ChannelConfig, ClientConfig, CommitConfig, EngineConfig, MAX_COMMENTS, MAX_COMPLETIONS,
    PacingConfig, SimConfig, SimMode, TemplatesConfig, detect_platform, load_sim_config,
};
pub use credentials::{CredentialContext, Credentials, RepoHints};
pub use engine::Engine;
pub use error::CoreError;
pub use orchestrator::Orchestrator;
pub use pacing::{DelayRange, SimRng, seeded_rng};
pub use pool::{SourceFile, SourceFilePool, language_for};
pub use protocol::{ProtocolSession, SessionOptions, SessionResources};
pub use report::{BatchReport, CommitReport, CommitState, SessionReport, SessionState};
pub use transport::{Channel, Connector, FrameSink, FrameStream, WsConnector};
