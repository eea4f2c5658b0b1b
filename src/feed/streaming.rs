//! Server-push feed over a long-lived `text/event-stream` connection.
//!
//! The session token travels as a query parameter because the push channel
//! cannot carry custom headers. Every `message` event holds the full current
//! message list, never a delta.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sse::SseDecoder;
use super::{FeedEvent, FeedTransport, FeedUpdate, Sequencer, TransportHandle};
use crate::backend::ChatBackend;
use crate::config::TransportMode;
use crate::error::ChatError;
use crate::session::SessionTokenManager;

/// Why a single connection ended.
enum StreamEnd {
    /// Connection failed or closed; reconnect after the backoff.
    Failed(ChatError),
    /// Nobody is listening any more.
    SinkClosed,
}

/// Keeps one event stream open, reconnecting after `backoff` forever.
pub struct StreamingTransport {
    backend: Arc<dyn ChatBackend>,
    session: Arc<SessionTokenManager>,
    backoff: Duration,
    seq: Arc<Sequencer>,
}

impl StreamingTransport {
    pub fn new(backend: Arc<dyn ChatBackend>, session: Arc<SessionTokenManager>, backoff: Duration) -> Self {
        Self {
            backend,
            session,
            backoff,
            seq: Arc::new(Sequencer::new()),
        }
    }

    async fn connect_once(&self, sink: &mpsc::Sender<FeedEvent>) -> StreamEnd {
        let token = match self.session.ensure().await {
            Ok(token) => token,
            Err(e) => return StreamEnd::Failed(e),
        };

        let mut stream = match self.backend.open_stream(token.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                if matches!(e, ChatError::AuthExpired { .. }) {
                    self.session.mark_expired(&token);
                }
                return StreamEnd::Failed(e);
            }
        };
        info!("feed stream connected");

        let mut decoder = SseDecoder::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return StreamEnd::Failed(e),
            };
            for event in decoder.push(&chunk) {
                if !event.is_message() {
                    debug!(event = ?event.event, "ignoring non-message stream event");
                    continue;
                }
                let ev = FeedEvent {
                    seq: self.seq.next(),
                    mode: TransportMode::Streaming,
                    update: FeedUpdate::Payload(event.data),
                };
                if sink.send(ev).await.is_err() {
                    return StreamEnd::SinkClosed;
                }
            }
        }

        StreamEnd::Failed(ChatError::Network {
            url: "feed stream".into(),
            detail: "stream closed by server".into(),
        })
    }
}

impl FeedTransport for StreamingTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Streaming
    }

    fn start(self: Box<Self>, sink: mpsc::Sender<FeedEvent>, cancel: CancellationToken) -> TransportHandle {
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                let end = tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    end = self.connect_once(&sink) => end,
                };

                let error = match end {
                    StreamEnd::SinkClosed => break,
                    StreamEnd::Failed(e) => e,
                };
                warn!(
                    error = %error,
                    backoff_ms = self.backoff.as_millis() as u64,
                    "feed stream closed, reconnecting after backoff"
                );
                let ev = FeedEvent {
                    seq: self.seq.next(),
                    mode: TransportMode::Streaming,
                    update: FeedUpdate::Failed(error),
                };
                if sink.send(ev).await.is_err() {
                    break;
                }

                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.backoff) => {}
                }
            }
            debug!("streaming transport stopped");
        });
        TransportHandle::new(cancel, task)
    }
}
