//! Client heartbeat and the shared outbound half.

use std::sync::Arc;
use std::time::Duration;

use cfsim_proto::{Envelope, MessageKind};
use futures::SinkExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::transport::FrameSink;

/// Outbound half shared by the request loop and the heartbeat.
pub(crate) type Outbox = Arc<Mutex<FrameSink>>;

pub(crate) fn outbox(sink: FrameSink) -> Outbox {
    Arc::new(Mutex::new(sink))
}

/// Encode and send one envelope.
pub(crate) async fn send_envelope(outbox: &Outbox, envelope: &Envelope) -> Result<(), CoreError> {
    let frame = envelope.encode()?;
    outbox.lock().await.send(frame).await?;
    debug!(kind = %envelope.kind, "sent");
    Ok(())
}

/// Periodic `ClientHeartbeat` sender running beside the request loop.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Send a heartbeat now and then every `period`. A send failure ends the
    /// heartbeat only.
    pub(crate) fn spawn(outbox: Outbox, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let beat = Envelope::bare(MessageKind::ClientHeartbeat);
            loop {
                if let Err(e) = send_envelope(&outbox, &beat).await {
                    warn!(error = %e, "heartbeat stopped");
                    break;
                }
                tokio::time::sleep(period).await;
            }
        });
        Self { handle }
    }

    /// Cancel the task and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Session` if the task failed for a reason other than
    /// cancellation.
    pub(crate) async fn stop(self) -> Result<(), CoreError> {
        self.handle.abort();
        match self.handle.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(CoreError::Session(format!("heartbeat task failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::transport::testing::memory_channel;

    fn heartbeats(frames: &[String]) -> usize {
        frames
            .iter()
            .filter_map(|f| Envelope::decode(f).ok())
            .filter(|e| e.kind == MessageKind::ClientHeartbeat)
            .count()
    }

    fn drain(rx: &mut futures::channel::mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = rx.try_next() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_beat_every_period() {
        let (channel, mut peer) = memory_channel();
        let heartbeat = Heartbeat::spawn(outbox(channel.sink), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(heartbeats(&drain(&mut peer.outbound)), 3);

        heartbeat.stop().await.expect("should stop cleanly");
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_not_beat_after_stop() {
        let (channel, mut peer) = memory_channel();
        let heartbeat = Heartbeat::spawn(outbox(channel.sink), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        heartbeat.stop().await.expect("should stop cleanly");
        let before = drain(&mut peer.outbound).len();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(before, 1);
        assert!(drain(&mut peer.outbound).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_exit_quietly_on_send_failure() {
        let (channel, peer) = memory_channel();
        drop(peer);

        let heartbeat = Heartbeat::spawn(outbox(channel.sink), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(heartbeat.handle.is_finished());
        heartbeat.stop().await.expect("finished task should stop cleanly");
    }

    #[tokio::test]
    async fn test_should_send_encoded_envelope() {
        let (channel, mut peer) = memory_channel();
        let outbox = outbox(channel.sink);

        send_envelope(&outbox, &Envelope::bare(MessageKind::ServerHeartbeatResponse))
            .await
            .expect("should send");

        let frame = peer.outbound.next().await.expect("should receive");
        assert!(frame.starts_with("<WBChannel>"));
        assert_eq!(
            Envelope::decode(&frame).expect("should decode").kind,
            MessageKind::ServerHeartbeatResponse
        );
    }
}
