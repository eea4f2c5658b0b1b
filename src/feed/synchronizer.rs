//! Applies transport events to the rendered view.
//!
//! ## Guarantees
//! - Stale results are dropped: an event whose sequence number is not above
//!   the highest one applied never overrides newer state.
//! - Unchanged polling payloads are skipped before parsing.
//! - No error stops the synchronizer; failures are logged and the next event
//!   is processed normally.
//! - An expired session shows a persistent notice until a fresh token is in
//!   place and a new payload has been applied.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{FeedEvent, FeedUpdate};
use crate::color::ColorAssigner;
use crate::config::TransportMode;
use crate::error::{ChatError, ErrorKind};
use crate::gate::MessageActionGate;
use crate::models::{parse_feed, ChatMessage};
use crate::render::{render, Reconciler, RenderOutcome, Surface};
use crate::session::{SessionTokenManager, TokenState};

pub const SESSION_EXPIRED_NOTICE: &str = "Session expired, please refresh.";

/// Consecutive failures after which logging escalates from `warn` to `error`.
const ESCALATE_AFTER: u32 = 5;

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Rendered(RenderOutcome),
    /// Polling payload identical to the last one; not parsed.
    Unchanged,
    /// Older than state already applied.
    Stale,
    Failed(ErrorKind),
}

pub struct FeedSynchronizer<S: Surface> {
    session: Arc<SessionTokenManager>,
    gate: Arc<MessageActionGate>,
    colors: ColorAssigner,
    reconciler: Reconciler,
    surface: S,
    messages: Vec<ChatMessage>,
    last_payload: Option<String>,
    highest_applied: Option<u64>,
    notice: Option<String>,
    consecutive_failures: u32,
}

impl<S: Surface> FeedSynchronizer<S> {
    pub fn new(
        session: Arc<SessionTokenManager>,
        gate: Arc<MessageActionGate>,
        colors: ColorAssigner,
        reconciler: Reconciler,
        surface: S,
    ) -> Self {
        Self {
            session,
            gate,
            colors,
            reconciler,
            surface,
            messages: Vec::new(),
            last_payload: None,
            highest_applied: None,
            notice: None,
            consecutive_failures: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Process events until every sender is gone.
    pub async fn run(&mut self, rx: &mut mpsc::Receiver<FeedEvent>) {
        while let Some(event) = rx.recv().await {
            self.apply(event);
        }
        debug!("feed channel closed, synchronizer exiting");
    }

    pub fn apply(&mut self, event: FeedEvent) -> SyncOutcome {
        match event.update {
            FeedUpdate::Payload(raw) => self.apply_payload(event.seq, event.mode, raw),
            FeedUpdate::Failed(err) => self.apply_failure(event.seq, err),
        }
    }

    fn apply_payload(&mut self, seq: u64, mode: TransportMode, raw: String) -> SyncOutcome {
        if self.highest_applied.is_some_and(|h| seq <= h) {
            debug!(seq, highest = self.highest_applied, "discarding stale feed result");
            return SyncOutcome::Stale;
        }

        let notice = self.session_notice();
        if mode == TransportMode::Polling
            && self.last_payload.as_deref() == Some(raw.as_str())
            && notice == self.notice
        {
            self.highest_applied = Some(seq);
            self.consecutive_failures = 0;
            return SyncOutcome::Unchanged;
        }

        let messages = match parse_feed(&raw) {
            Ok(messages) => messages,
            Err(e) => return self.apply_failure(seq, e),
        };

        self.highest_applied = Some(seq);
        self.consecutive_failures = 0;
        self.last_payload = Some(raw);
        self.messages = messages;
        self.notice = notice;
        SyncOutcome::Rendered(self.redraw())
    }

    fn apply_failure(&mut self, seq: u64, err: ChatError) -> SyncOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let kind = err.kind();

        if self.consecutive_failures >= ESCALATE_AFTER {
            error!(
                error = %err,
                kind = %kind,
                seq,
                consecutive_failures = self.consecutive_failures,
                "feed sync failed repeatedly, will retry next cycle"
            );
        } else {
            warn!(error = %err, kind = %kind, seq, "feed sync failed, will retry next cycle");
        }

        if err.is_sticky() {
            let notice = self.session_notice();
            if notice != self.notice {
                self.notice = notice;
                self.redraw();
            }
        }
        SyncOutcome::Failed(kind)
    }

    /// Notice implied by the current token state.
    fn session_notice(&self) -> Option<String> {
        match self.session.state() {
            TokenState::Expired | TokenState::Invalid => Some(SESSION_EXPIRED_NOTICE.to_string()),
            _ => None,
        }
    }

    fn redraw(&mut self) -> RenderOutcome {
        let authorized = self.gate.authorized_ids(&self.messages);
        let view = render(&self.messages, &authorized, &self.colors, self.notice.as_deref());
        self.reconciler.reconcile(&mut self.surface, view)
    }
}
