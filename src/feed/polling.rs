//! Interval polling of the JSON feed endpoint.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{FeedEvent, FeedTransport, FeedUpdate, Sequencer, TransportHandle};
use crate::backend::ChatBackend;
use crate::config::TransportMode;
use crate::error::ChatError;
use crate::session::SessionTokenManager;

/// Fetches the full feed every `interval`.
///
/// Each tick spawns its own request so a slow response never delays the
/// schedule; responses may therefore arrive out of order and carry the
/// sequence number assigned when they were issued.
pub struct PollingTransport {
    backend: Arc<dyn ChatBackend>,
    session: Arc<SessionTokenManager>,
    interval: Duration,
    authenticated: bool,
    seq: Arc<Sequencer>,
}

impl PollingTransport {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        session: Arc<SessionTokenManager>,
        interval: Duration,
        authenticated: bool,
    ) -> Self {
        Self {
            backend,
            session,
            interval,
            authenticated,
            seq: Arc::new(Sequencer::new()),
        }
    }
}

impl FeedTransport for PollingTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Polling
    }

    fn start(self: Box<Self>, sink: mpsc::Sender<FeedEvent>, cancel: CancellationToken) -> TransportHandle {
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if sink.is_closed() {
                    break;
                }

                let seq = self.seq.next();
                let backend = Arc::clone(&self.backend);
                let session = Arc::clone(&self.session);
                let sink = sink.clone();
                let cancel = loop_cancel.clone();
                let authenticated = self.authenticated;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = poll_once(backend, session, authenticated, seq, sink) => {}
                    }
                });
            }
            debug!("polling transport stopped");
        });
        TransportHandle::new(cancel, task)
    }
}

/// One fetch cycle: obtain a token if needed, fetch, report.
async fn poll_once(
    backend: Arc<dyn ChatBackend>,
    session: Arc<SessionTokenManager>,
    authenticated: bool,
    seq: u64,
    sink: mpsc::Sender<FeedEvent>,
) {
    let token = if authenticated {
        match session.ensure().await {
            Ok(token) => Some(token),
            Err(e) => {
                // No valid token: skip the authenticated fetch this cycle.
                send(&sink, seq, FeedUpdate::Failed(e)).await;
                return;
            }
        }
    } else {
        None
    };

    let update = match backend.fetch_feed(token.clone()).await {
        Ok(raw) => FeedUpdate::Payload(raw),
        Err(e) => {
            if let (ChatError::AuthExpired { .. }, Some(token)) = (&e, &token) {
                session.mark_expired(token);
            }
            FeedUpdate::Failed(e)
        }
    };
    send(&sink, seq, update).await;
}

async fn send(sink: &mpsc::Sender<FeedEvent>, seq: u64, update: FeedUpdate) {
    let event = FeedEvent {
        seq,
        mode: TransportMode::Polling,
        update,
    };
    if sink.send(event).await.is_err() {
        debug!(seq, "feed receiver dropped, discarding poll result");
    }
}
