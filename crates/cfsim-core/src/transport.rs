//! Channel transport.
//!
//! A [`Channel`] is a pair of boxed text-frame halves so sessions can run
//! over a real WebSocket ([`WsConnector`]) or an in-memory pipe in tests.

use std::pin::Pin;

use futures::future::{self, BoxFuture};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

use crate::error::CoreError;

/// Outbound half: accepts text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = CoreError> + Send>>;

/// Inbound half: yields text frames until the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, CoreError>> + Send>>;

/// An open bidirectional channel.
pub struct Channel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

/// Opens channels to the peer gateway.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Channel, CoreError>>;
}

/// WebSocket connector (TLS via rustls with webpki roots).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Channel, CoreError>> {
        Box::pin(async move {
            info!(url, "connecting channel");
            let (ws, response) = connect_async(url).await?;
            debug!(status = %response.status(), "channel handshake complete");

            let (sink, stream) = ws.split();
            let sink = sink
                .with(|frame: String| future::ready(Ok::<_, WsError>(Message::Text(frame))))
                .sink_map_err(CoreError::from);
            let stream = stream.filter_map(|msg| future::ready(text_frame(msg)));

            Ok(Channel {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

/// Keep text payloads; control frames are handled by tungstenite itself.
fn text_frame(msg: Result<Message, WsError>) -> Option<Result<String, CoreError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => Some(
            String::from_utf8(bytes).map_err(|e| CoreError::MalformedMessage(e.to_string())),
        ),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Ok(Message::Close(frame)) => {
            debug!(?frame, "close frame received");
            None
        }
        Err(e) => Some(Err(e.into())),
    }
}
