//! Hand-off point for credentials harvested by a login collaborator.
//!
//! The collaborator (a browser watching real login traffic) gets a
//! [`CaptureSender`] and may deliver at most one [`CapturedCredentials`];
//! the core waits on the matching [`CaptureReceiver`] and applies the result
//! to the shared [`CredentialContext`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::credentials::{CredentialContext, Credentials};
use crate::error::CoreError;

/// Credentials observed during a login, plus optional repository hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedCredentials {
    pub credentials: Credentials,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
}

/// Producer side; consumed by the single send.
#[derive(Debug)]
pub struct CaptureSender {
    tx: oneshot::Sender<CapturedCredentials>,
}

impl CaptureSender {
    /// Deliver the captured credentials.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Session` if the receiver has already gone away.
    pub fn send(self, captured: CapturedCredentials) -> Result<(), CoreError> {
        self.tx
            .send(captured)
            .map_err(|_| CoreError::Session("credential receiver dropped".to_owned()))
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct CaptureReceiver {
    rx: oneshot::Receiver<CapturedCredentials>,
}

impl CaptureReceiver {
    /// Wait for the capture, then store it in `context`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::AuthExpired` if nothing arrives within `timeout` or
    /// the sender is dropped without sending.
    pub async fn apply_to(
        self,
        context: &CredentialContext,
        timeout: Duration,
    ) -> Result<CapturedCredentials, CoreError> {
        let captured = match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(captured)) => captured,
            Ok(Err(_)) => {
                warn!("credential capture ended without a result");
                return Err(CoreError::AuthExpired(
                    "login finished without capturing credentials".to_owned(),
                ));
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "credential capture timed out");
                return Err(CoreError::AuthExpired(
                    "timed out waiting for login".to_owned(),
                ));
            }
        };

        info!(account = %captured.credentials.account_id, "credentials captured");
        context.set_credentials(captured.credentials.clone());
        context.set_repo_hints(captured.project_id.clone(), captured.repository_id.clone());
        Ok(captured)
    }
}

/// Create a capture channel holding at most one event.
pub fn capture_channel() -> (CaptureSender, CaptureReceiver) {
    let (tx, rx) = oneshot::channel();
    (CaptureSender { tx }, CaptureReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_apply_captured_credentials_and_hints() {
        let ctx = CredentialContext::new();
        ctx.set_repo_hints(Some("old-project".to_owned()), None);

        let (tx, rx) = capture_channel();
        tx.send(CapturedCredentials {
            credentials: Credentials::new("1001", "tok"),
            project_id: None,
            repository_id: Some("77".to_owned()),
        })
        .expect("should send");

        let captured = rx
            .apply_to(&ctx, Duration::from_secs(1))
            .await
            .expect("should apply");

        assert_eq!(captured.credentials.account_id, "1001");
        assert_eq!(ctx.credentials(), Some(Credentials::new("1001", "tok")));
        let hints = ctx.repo_hints();
        assert_eq!(hints.project_id.as_deref(), Some("old-project"));
        assert_eq!(hints.repository_id.as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn test_should_fail_when_sender_dropped() {
        let ctx = CredentialContext::new();
        let (tx, rx) = capture_channel();
        drop(tx);

        let err = rx
            .apply_to(&ctx, Duration::from_secs(1))
            .await
            .expect_err("should fail");
        assert!(matches!(err, CoreError::AuthExpired(_)));
        assert!(!ctx.has_credentials());
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_time_out_without_capture() {
        let ctx = CredentialContext::new();
        let (_tx, rx) = capture_channel();

        let err = rx
            .apply_to(&ctx, Duration::from_secs(300))
            .await
            .expect_err("should time out");
        assert!(matches!(err, CoreError::AuthExpired(msg) if msg.contains("timed out")));
    }
}
