//! # Feed synchronization
//!
//! Two transports deliver the authoritative message list:
//!
//! 1. **Polling** ([`PollingTransport`]) fetches the full JSON feed on a fixed
//!    interval.
//! 2. **Streaming** ([`StreamingTransport`]) holds a server-sent-events
//!    connection open and reconnects after a fixed backoff.
//!
//! Both implement [`FeedTransport`] and push [`FeedEvent`]s into a channel
//! consumed by the [`FeedSynchronizer`], which is agnostic to the transport.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (tx, mut rx) = tokio::sync::mpsc::channel(FEED_CHANNEL_CAP);
//! let handle = transport.start(tx, CancellationToken::new());
//! synchronizer.run(&mut rx).await;
//! handle.stop();
//! ```

pub mod polling;
pub mod sse;
pub mod streaming;
pub mod synchronizer;

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TransportMode;
use crate::error::ChatError;

pub use polling::PollingTransport;
pub use sse::{SseDecoder, SseEvent};
pub use streaming::StreamingTransport;
pub use synchronizer::{FeedSynchronizer, SyncOutcome, SESSION_EXPIRED_NOTICE};

/// Capacity of the transport → synchronizer channel.
pub const FEED_CHANNEL_CAP: usize = 64;

/// What a single request or pushed event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    /// Raw feed payload (a JSON array), not yet parsed.
    Payload(String),
    Failed(ChatError),
}

/// A transport result stamped with the sequence number of the request that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub seq: u64,
    pub mode: TransportMode,
    pub update: FeedUpdate,
}

/// Monotonic request counter. The first number handed out is 1.
#[derive(Debug, Default)]
pub struct Sequencer(AtomicU64);

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A source of feed updates.
pub trait FeedTransport: Send {
    fn mode(&self) -> TransportMode;

    /// Spawn the delivery loop. Events go to `sink` until `cancel` fires or
    /// the receiving side is dropped.
    fn start(self: Box<Self>, sink: mpsc::Sender<FeedEvent>, cancel: CancellationToken) -> TransportHandle;
}

/// Running transport task.
#[derive(Debug)]
pub struct TransportHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TransportHandle {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        // A panicking transport has nothing left to clean up.
        let _ = self.task.await;
    }
}
