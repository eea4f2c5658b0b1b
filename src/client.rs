//! The session object tying the backend, token manager, transports, gate and
//! reconciler together.
//!
//! One [`ChatClient`] owns the only [`SessionTokenManager`]; every transport
//! and gate it hands out shares that manager, so a token rejected by one
//! request is re-acquired once for all of them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{ChatBackend, HttpBackend};
use crate::color::{ColorAssigner, ColorStrategy};
use crate::config::{ClientConfig, TransportMode};
use crate::error::ChatError;
use crate::feed::{
    polling::PollingTransport, streaming::StreamingTransport, FeedSynchronizer, FeedTransport,
    FEED_CHANNEL_CAP,
};
use crate::gate::MessageActionGate;
use crate::models::{parse_feed, ChatMessage, ChatRequest, IdentityProof, SendRequest};
use crate::render::{Reconciler, Surface};
use crate::session::SessionTokenManager;

pub struct ChatClient {
    config: ClientConfig,
    backend: Arc<dyn ChatBackend>,
    session: Arc<SessionTokenManager>,
}

impl ChatClient {
    /// Start building a client aimed at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ChatClientBuilder {
        ChatClientBuilder::new(base_url)
    }

    /// Start from an already loaded configuration.
    pub fn from_config(config: ClientConfig) -> ChatClientBuilder {
        ChatClientBuilder {
            config,
            backend: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionTokenManager> {
        &self.session
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Ask the server for this client's identity proof.
    ///
    /// A failure is not an error for the caller: without a proof the client
    /// simply owns nothing and no edit/delete controls are offered.
    pub async fn identify(&self) -> Option<IdentityProof> {
        match self.backend.fetch_identity().await {
            Ok(proof) if !proof.as_str().is_empty() => Some(proof),
            Ok(_) => {
                warn!("server returned an empty identity proof, message controls disabled");
                None
            }
            Err(e) => {
                warn!(error = %e, "identity lookup failed, message controls disabled");
                None
            }
        }
    }

    /// Gate built from a fresh identity lookup.
    pub async fn action_gate(&self) -> MessageActionGate {
        let identity = self.identify().await;
        self.gate_with(identity)
    }

    pub fn gate_with(&self, identity: Option<IdentityProof>) -> MessageActionGate {
        MessageActionGate::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.session),
            identity,
            self.config.nick.clone(),
        )
    }

    /// Transport for the configured mode.
    pub fn transport(&self) -> Box<dyn FeedTransport> {
        match self.config.mode {
            TransportMode::Polling => Box::new(PollingTransport::new(
                Arc::clone(&self.backend),
                Arc::clone(&self.session),
                self.config.poll_interval,
                self.config.feed_requires_auth,
            )),
            TransportMode::Streaming => Box::new(StreamingTransport::new(
                Arc::clone(&self.backend),
                Arc::clone(&self.session),
                self.config.reconnect_backoff,
            )),
        }
    }

    /// Post a new message as `nick`.
    pub async fn send(&self, nick: &str, text: &str) -> Result<(), ChatError> {
        let nick = nick.trim();
        let text = text.trim();
        if nick.is_empty() || text.is_empty() {
            return Err(ChatError::InvalidInput(
                "Please enter both a nickname and a message.".into(),
            ));
        }

        let ip = self.backend.fetch_public_ip().await?;
        let body = SendRequest {
            chat_request: ChatRequest {
                nick: nick.to_string(),
                msg: text.to_string(),
                ip,
            },
        };
        self.backend.send_message(body).await?;
        info!(nick, "message sent");
        Ok(())
    }

    /// One-shot fetch of the current feed.
    pub async fn fetch_messages(&self) -> Result<Vec<ChatMessage>, ChatError> {
        let token = if self.config.feed_requires_auth {
            Some(self.session.ensure().await?)
        } else {
            None
        };
        match self.backend.fetch_feed(token.clone()).await {
            Ok(raw) => parse_feed(&raw),
            Err(e) => {
                if let (ChatError::AuthExpired { .. }, Some(token)) = (&e, &token) {
                    self.session.mark_expired(token);
                }
                Err(e)
            }
        }
    }

    /// Look up a single message by id in the current feed.
    pub async fn find_message(&self, id: &str) -> Result<ChatMessage, ChatError> {
        self.fetch_messages()
            .await?
            .into_iter()
            .find(|m| m.id.as_str() == id)
            .ok_or_else(|| ChatError::InvalidInput(format!("no message with id {id}")))
    }

    /// Keep `surface` in sync with the feed until `cancel` fires.
    ///
    /// Returns the surface so callers can inspect what was drawn last.
    pub async fn run<S: Surface>(&self, surface: S, cancel: CancellationToken) -> S {
        let gate = Arc::new(self.action_gate().await);
        let mut sync = FeedSynchronizer::new(
            Arc::clone(&self.session),
            gate,
            ColorAssigner::new(self.config.color_strategy),
            Reconciler::new(self.config.scroll_tolerance),
            surface,
        );

        let (tx, mut rx) = mpsc::channel(FEED_CHANNEL_CAP);
        let transport = self.transport();
        info!(mode = %transport.mode(), base_url = %self.config.base_url, "starting feed sync");
        let handle = transport.start(tx, cancel.child_token());

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = sync.run(&mut rx) => {}
        }
        handle.shutdown().await;
        info!("feed sync stopped");
        sync.into_surface()
    }
}

/// Builder for [`ChatClient`].
///
/// # Example
/// ```rust,ignore
/// let client = ChatClient::builder("https://chat.example")
///     .mode(TransportMode::Streaming)
///     .reconnect_backoff(Duration::from_secs(5))
///     .build()?;
/// ```
pub struct ChatClientBuilder {
    config: ClientConfig,
    backend: Option<Arc<dyn ChatBackend>>,
}

impl ChatClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(base_url),
            backend: None,
        }
    }

    /// Use `backend` instead of the HTTP backend built from the config.
    pub fn backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn mode(mut self, mode: TransportMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Override the feed polling interval (default 1 s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Override the stream reconnect delay (default 3 s).
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.config.reconnect_backoff = backoff;
        self
    }

    /// Override the TCP connect timeout (default 3 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Override the per-request timeout (default 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn nick(mut self, nick: impl Into<String>) -> Self {
        self.config.nick = Some(nick.into());
        self
    }

    pub fn color_strategy(mut self, strategy: ColorStrategy) -> Self {
        self.config.color_strategy = strategy;
        self
    }

    pub fn feed_requires_auth(mut self, required: bool) -> Self {
        self.config.feed_requires_auth = required;
        self
    }

    /// Validate the configuration and construct the client.
    ///
    /// # Errors
    /// Returns [`ChatError::Config`] when the configuration is invalid.
    pub fn build(self) -> Result<ChatClient, ChatError> {
        self.config.validate()?;
        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(self.config.clone())) as Arc<dyn ChatBackend>,
        };
        let session = Arc::new(SessionTokenManager::new(Arc::clone(&backend)));
        Ok(ChatClient {
            config: self.config,
            backend,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, FakeBackend};
    use crate::render::{ScrollMetrics, ViewModel};

    fn client_with(fake: &Arc<FakeBackend>) -> ChatClient {
        ChatClient::builder("https://chat.test")
            .backend(Arc::clone(fake) as Arc<dyn ChatBackend>)
            .poll_interval(Duration::from_millis(500))
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct LastView(Option<ViewModel>);

    impl Surface for LastView {
        fn metrics(&self) -> ScrollMetrics {
            ScrollMetrics::default()
        }
        fn draw(&mut self, view: &ViewModel) {
            self.0 = Some(view.clone());
        }
        fn scroll_to_bottom(&mut self) {}
    }

    #[test]
    fn builder_rejects_bad_base_url() {
        let result = ChatClient::builder("ftp://nope").build();
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn builder_overrides_apply() {
        let client = ChatClient::builder("http://localhost:7619")
            .mode(TransportMode::Streaming)
            .reconnect_backoff(Duration::from_secs(9))
            .request_timeout(Duration::from_secs(2))
            .nick("kitty")
            .build()
            .unwrap();
        assert_eq!(client.config().mode, TransportMode::Streaming);
        assert_eq!(client.config().reconnect_backoff, Duration::from_secs(9));
        assert_eq!(client.config().request_timeout, Duration::from_secs(2));
        assert_eq!(client.config().nick.as_deref(), Some("kitty"));
        assert_eq!(client.transport().mode(), TransportMode::Streaming);
    }

    #[tokio::test]
    async fn send_rejects_blank_fields_without_network() {
        let fake = Arc::new(FakeBackend::new());
        let client = client_with(&fake);
        assert!(matches!(client.send("  ", "hi").await, Err(ChatError::InvalidInput(_))));
        assert!(matches!(client.send("kitty", "\n").await, Err(ChatError::InvalidInput(_))));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn send_posts_trimmed_message_with_public_ip() {
        let fake = Arc::new(FakeBackend::new());
        fake.set_public_ip(Ok("203.0.113.9".into()));
        let client = client_with(&fake);
        client.send(" kitty ", " hello ").await.unwrap();

        let sent = fake.calls().into_iter().find_map(|c| match c {
            Call::Send(body) => Some(body),
            _ => None,
        });
        let body = sent.expect("send call recorded");
        assert_eq!(body.chat_request.nick, "kitty");
        assert_eq!(body.chat_request.msg, "hello");
        assert_eq!(body.chat_request.ip, "203.0.113.9");
    }

    #[tokio::test]
    async fn send_fails_when_public_ip_unavailable() {
        let fake = Arc::new(FakeBackend::new());
        let client = client_with(&fake);
        assert!(matches!(client.send("kitty", "hi").await, Err(ChatError::Network { .. })));
        assert!(!fake.calls().iter().any(|c| matches!(c, Call::Send(_))));
    }

    #[tokio::test]
    async fn identify_failure_disables_controls() {
        let fake = Arc::new(FakeBackend::new());
        let client = client_with(&fake);
        assert!(client.identify().await.is_none());
        assert!(client.action_gate().await.identity().is_none());
    }

    #[tokio::test]
    async fn find_message_by_id() {
        let fake = Arc::new(FakeBackend::new());
        fake.push_feed(Ok(r#"[{"nick":"a","id":"x1","msg":"hi"},{"nick":"b","id":"x2","msg":"yo"}]"#.into()));
        fake.push_feed(Ok("[]".into()));
        let client = client_with(&fake);
        assert_eq!(client.find_message("x2").await.unwrap().nick, "b");
        assert!(matches!(client.find_message("x2").await, Err(ChatError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn authenticated_fetch_marks_rejected_token_expired() {
        let fake = Arc::new(FakeBackend::new());
        fake.push_token(Ok("t1".into()));
        fake.push_feed(Err(ChatError::from_status(401, "feed")));
        let client = ChatClient::builder("https://chat.test")
            .backend(Arc::clone(&fake) as Arc<dyn ChatBackend>)
            .feed_requires_auth(true)
            .build()
            .unwrap();
        assert!(client.fetch_messages().await.is_err());
        assert!(!client.session().is_valid());
        assert_eq!(fake.calls()[1], Call::Feed { token: Some("t1".into()) });
    }

    #[tokio::test(start_paused = true)]
    async fn run_draws_feed_until_cancelled() {
        let fake = Arc::new(FakeBackend::new());
        fake.set_identity(Ok(IdentityProof::new("h1")));
        fake.set_feed_fallback(Ok(r#"[{"nick":"a","id":"h1","msg":"mine"},{"nick":"b","id":"h2","msg":"theirs"}]"#.into()));
        let client = client_with(&fake);

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            stopper.cancel();
        });

        let surface = client.run(LastView::default(), cancel).await;
        let view = surface.0.expect("at least one draw");
        assert_eq!(view.messages.len(), 2);
        assert!(view.messages[0].actions.any());
        assert!(!view.messages[1].actions.any());
    }
}
