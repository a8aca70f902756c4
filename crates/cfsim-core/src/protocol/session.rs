//! Protocol session state machine.
//!
//! A session walks `Connecting → Registering → FetchingApiKey → Subscribing →
//! Active`, then alternates request, response and delay until its counter
//! reaches the target. At most one generation request is in flight at a
//! time; the heartbeat task and server heartbeat replies run beside it.
//!
//! Teardown always stops the heartbeat before closing the channel. Sessions
//! that reached `Active` (or were asked to stop) pass through
//! `Disconnecting` to `Closed`; anything that fails earlier ends `Failed`.

use std::sync::Arc;
use std::time::Duration;

use cfsim_pm::PromptManager;
use cfsim_proto::messages::is_terminal_chunk;
use cfsim_proto::{Envelope, MessageKind};
use futures::{SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use typed_builder::TypedBuilder;

use super::heartbeat::{self, Heartbeat, Outbox, send_envelope};
use super::requests::{ACTIVITY_COMMENT, ACTIVITY_COMPLETION, RequestFactory};
use crate::config::{SimConfig, SimMode};
use crate::credentials::{CredentialContext, Credentials};
use crate::error::CoreError;
use crate::pacing::{SimRng, secs, seeded_rng};
use crate::pool::SourceFilePool;
use crate::report::{SessionReport, SessionState};
use crate::transport::{Channel, Connector, FrameStream};

/// Collaborators shared by every session an engine starts.
#[derive(Clone)]
pub struct SessionResources {
    pub config: Arc<SimConfig>,
    pub prompts: Arc<PromptManager>,
    pub credentials: Arc<CredentialContext>,
    pub connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for SessionResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResources")
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

/// Per-session parameters.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SessionOptions {
    pub credentials: Credentials,

    #[builder(default)]
    pub mode: SimMode,

    /// Number of counted responses after which the session disconnects.
    pub target: u32,

    /// Files sampled by comment requests.
    #[builder(default)]
    pub pool: SourceFilePool,

    #[builder(default, setter(strip_option))]
    pub seed: Option<u64>,
}

enum Next {
    Continue,
    RequestAfter(Duration),
    Finish,
}

/// One simulated editor client.
pub struct ProtocolSession {
    credentials: Credentials,
    mode: SimMode,
    target: u32,
    pool: SourceFilePool,
    resources: SessionResources,
    requests: RequestFactory,
    rng: SimRng,
    stop: CancellationToken,

    state: SessionState,
    count: u32,
    in_flight: bool,
    channel_id: Option<String>,
    api_key: Option<String>,
}

impl ProtocolSession {
    pub fn new(options: SessionOptions, resources: SessionResources) -> Self {
        let platform = resources.config.client.platform_tag();
        let requests = RequestFactory::new(options.credentials.clone(), &resources.config, &platform);

        Self {
            credentials: options.credentials,
            mode: options.mode,
            target: options.target,
            pool: options.pool,
            resources,
            requests,
            rng: seeded_rng(options.seed),
            stop: CancellationToken::new(),
            state: SessionState::Connecting,
            count: 0,
            in_flight: false,
            channel_id: None,
            api_key: None,
        }
    }

    /// Use `token` as this session's stop signal.
    pub fn with_stop_token(mut self, token: CancellationToken) -> Self {
        self.stop = token;
        self
    }

    /// Token that stops the session when cancelled.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run to completion and report. Never panics on protocol or transport
    /// errors; they end up in [`SessionReport::error`].
    #[instrument(skip_all, fields(account = %self.credentials.account_id, mode = %self.mode))]
    pub async fn run(mut self) -> SessionReport {
        let started = Instant::now();
        let result = self.drive().await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => info!(
                count = self.count,
                target = self.target,
                elapsed_secs = elapsed.as_secs_f64(),
                "session finished"
            ),
            Err(e) => warn!(
                state = %self.state,
                count = self.count,
                error = %e,
                "session ended with error"
            ),
        }

        SessionReport {
            account_id: self.credentials.account_id,
            mode: self.mode,
            state: self.state,
            count: self.count,
            target: self.target,
            elapsed,
            channel_id: self.channel_id,
            error: result.err(),
        }
    }

    fn enter(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    fn preflight(&self) -> Result<(), CoreError> {
        self.mode.validate_target(self.target)?;
        if self.mode == SimMode::Comment && self.pool.is_empty() {
            return Err(CoreError::Configuration(
                "comment mode needs at least one source file".to_owned(),
            ));
        }
        self.resources.config.pacing.validate()
    }

    async fn drive(&mut self) -> Result<(), CoreError> {
        if let Err(e) = self.preflight() {
            self.enter(SessionState::Failed);
            return Err(e);
        }

        let connector = Arc::clone(&self.resources.connector);
        let channel = match connector.connect(&self.resources.config.channel.url).await {
            Ok(channel) => channel,
            Err(e) => {
                self.enter(SessionState::Failed);
                return Err(e);
            }
        };
        info!("channel open");

        let Channel { sink, mut stream } = channel;
        let outbox = heartbeat::outbox(sink);
        let mut beat = None;

        let result = self.exchange(&outbox, &mut stream, &mut beat).await;

        let graceful = result.is_ok() || self.state == SessionState::Active;
        if graceful {
            self.enter(SessionState::Disconnecting);
        }
        let cleanup = shutdown(&outbox, beat).await;
        self.enter(if graceful {
            SessionState::Closed
        } else {
            SessionState::Failed
        });

        result.and(cleanup)
    }

    async fn exchange(
        &mut self,
        outbox: &Outbox,
        stream: &mut FrameStream,
        beat: &mut Option<Heartbeat>,
    ) -> Result<(), CoreError> {
        let stop = self.stop.clone();
        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut armed = false;

        send_envelope(outbox, &self.requests.register()?).await?;
        self.enter(SessionState::Registering);

        loop {
            tokio::select! {
                biased;

                () = stop.cancelled() => {
                    info!("stop requested");
                    return Ok(());
                }

                frame = stream.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(CoreError::MalformedMessage(msg))) => {
                            warn!(error = %msg, "dropping undecodable frame");
                            continue;
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            return Err(CoreError::Transport("channel closed by peer".to_owned()));
                        }
                    };
                    match self.handle_frame(&frame, outbox, beat).await? {
                        Next::Continue => {}
                        Next::RequestAfter(delay) => {
                            timer.as_mut().reset(Instant::now() + delay);
                            armed = true;
                        }
                        Next::Finish => return Ok(()),
                    }
                }

                () = &mut timer, if armed => {
                    armed = false;
                    self.send_generation(outbox).await?;
                }
            }
        }
    }

    async fn handle_frame(
        &mut self,
        frame: &str,
        outbox: &Outbox,
        beat: &mut Option<Heartbeat>,
    ) -> Result<Next, CoreError> {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return Ok(Next::Continue);
            }
        };
        debug!(kind = %envelope.kind, state = %self.state, "received");

        match &envelope.kind {
            MessageKind::ServerHeartbeat => {
                send_envelope(outbox, &Envelope::bare(MessageKind::ServerHeartbeatResponse))
                    .await?;
            }
            MessageKind::RegisterChannelResp if self.state == SessionState::Registering => {
                self.channel_id = envelope.context_str("channelId").map(str::to_owned);
                info!(channel_id = ?self.channel_id, "channel registered");
                let request = self.requests.api_key_request(&mut self.rng)?;
                send_envelope(outbox, &request).await?;
                self.enter(SessionState::FetchingApiKey);
            }
            MessageKind::GetUserApiKeyResp if self.state == SessionState::FetchingApiKey => {
                return self.activate(&envelope, outbox, beat).await;
            }
            MessageKind::SubscribeChannelGroupResp => info!("channel group subscribed"),
            MessageKind::CodeGenRequestResp if self.awaiting(SimMode::Completion) => {
                return self.record_response(outbox).await;
            }
            MessageKind::CodeChatRequestResp if self.awaiting(SimMode::Comment) => {
                if is_terminal_chunk(envelope.payload.as_ref()) {
                    return self.record_response(outbox).await;
                }
                debug!(
                    answer = envelope.payload_str("answer").unwrap_or_default(),
                    "comment chunk"
                );
            }
            MessageKind::ClientHeartbeatResponse => {}
            other => debug!(kind = %other, state = %self.state, "ignoring message"),
        }
        Ok(Next::Continue)
    }

    fn awaiting(&self, mode: SimMode) -> bool {
        self.state == SessionState::Active && self.mode == mode && self.in_flight
    }

    async fn activate(
        &mut self,
        envelope: &Envelope,
        outbox: &Outbox,
        beat: &mut Option<Heartbeat>,
    ) -> Result<Next, CoreError> {
        let Some(api_key) = envelope.payload_str("apiKey").map(str::to_owned) else {
            warn!("no api key issued, session token is likely expired");
            self.resources.credentials.clear();
            return Err(CoreError::AuthExpired(
                "GetUserApiKey_resp carried no apiKey".to_owned(),
            ));
        };
        info!("api key acquired");

        let subscribe = self.requests.subscribe(&mut self.rng)?;
        send_envelope(outbox, &subscribe).await?;
        self.enter(SessionState::Subscribing);

        let pacing = &self.resources.config.pacing;
        *beat = Some(Heartbeat::spawn(
            Arc::clone(outbox),
            secs(pacing.heartbeat_interval),
        ));
        let warmup = secs(pacing.warmup);

        self.api_key = Some(api_key);
        self.enter(SessionState::Active);
        Ok(Next::RequestAfter(warmup))
    }

    async fn record_response(&mut self, outbox: &Outbox) -> Result<Next, CoreError> {
        self.in_flight = false;
        self.count += 1;
        info!(count = self.count, target = self.target, "response counted");

        let activity = match self.mode {
            SimMode::Completion => ACTIVITY_COMPLETION,
            SimMode::Comment => ACTIVITY_COMMENT,
        };
        if let Some(api_key) = self.api_key.as_deref() {
            let notify = self.requests.activity(api_key, activity, &mut self.rng)?;
            if let Err(e) = send_envelope(outbox, &notify).await {
                warn!(error = %e, "activity notification not sent");
            }
        }

        if self.count >= self.target {
            info!(count = self.count, "target reached");
            return Ok(Next::Finish);
        }
        let delay = self.resources.config.pacing.request_delay.sample(&mut self.rng);
        debug!(delay_ms = delay.as_millis() as u64, "next request scheduled");
        Ok(Next::RequestAfter(delay))
    }

    async fn send_generation(&mut self, outbox: &Outbox) -> Result<(), CoreError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(CoreError::Session(
                "generation request before api key".to_owned(),
            ));
        };

        let envelope = match self.mode {
            SimMode::Completion => self.requests.completion(api_key, &mut self.rng)?,
            SimMode::Comment => {
                let file = self.pool.pick(&mut self.rng)?;
                debug!(file = %file.path.display(), language = file.language, "source picked");
                self.requests
                    .comment(api_key, &file, &self.resources.prompts, &mut self.rng)?
            }
        };

        info!(
            request = self.count + 1,
            target = self.target,
            mode = %self.mode,
            "sending request"
        );
        send_envelope(outbox, &envelope).await?;
        self.in_flight = true;
        Ok(())
    }
}

impl std::fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("credentials", &self.credentials)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("count", &self.count)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Stop the heartbeat, then close the channel. Close errors are logged only.
async fn shutdown(outbox: &Outbox, beat: Option<Heartbeat>) -> Result<(), CoreError> {
    let stopped = match beat {
        Some(beat) => beat.stop().await,
        None => Ok(()),
    };
    if let Err(e) = outbox.lock().await.close().await {
        debug!(error = %e, "error while closing channel");
    }
    info!("channel closed");
    stopped
}
