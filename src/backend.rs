//! HTTP access to the chat server.
//!
//! [`ChatBackend`] is the seam between the sync logic and the network. The
//! production implementation, [`HttpBackend`], speaks JSON over `reqwest`;
//! tests substitute in-memory fakes.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::models::{
    DeleteRequest, EditRequest, IdentityProof, IpHashResponse, PublicIpResponse, SendRequest,
    SessionToken, TokenResponse,
};

/// Raw body chunks of a server-push response.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ChatError>>;

/// Every call the client makes against the chat server.
///
/// Non-2xx statuses map through [`ChatError::from_status`], so 401/403
/// surface as `AuthExpired`.
pub trait ChatBackend: Send + Sync {
    /// `GET session_token` → the `sessionToken` field, possibly empty.
    fn fetch_token(&self) -> BoxFuture<'_, Result<String, ChatError>>;

    /// `GET ip_hash` → identity proof.
    fn fetch_identity(&self) -> BoxFuture<'_, Result<IdentityProof, ChatError>>;

    /// `GET public_ip` → the client's public address.
    fn fetch_public_ip(&self) -> BoxFuture<'_, Result<String, ChatError>>;

    /// `GET feed` → raw payload text, unparsed.
    fn fetch_feed(&self, token: Option<SessionToken>) -> BoxFuture<'_, Result<String, ChatError>>;

    /// `GET stream?token=…` → body chunks of the event stream.
    fn open_stream(&self, token: SessionToken) -> BoxFuture<'_, Result<ByteStream, ChatError>>;

    fn send_message(&self, body: SendRequest) -> BoxFuture<'_, Result<(), ChatError>>;

    fn edit_message(&self, body: EditRequest) -> BoxFuture<'_, Result<(), ChatError>>;

    fn delete_message(&self, body: DeleteRequest) -> BoxFuture<'_, Result<(), ChatError>>;
}

/// `reqwest`-backed [`ChatBackend`].
pub struct HttpBackend {
    config: ClientConfig,
    client: reqwest::Client,
    /// No total timeout: stream bodies stay open indefinitely.
    stream_client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Self {
        // Builder failures only happen in broken TLS environments; fall back to
        // default clients instead of panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        let stream_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_default();

        Self {
            config,
            client,
            stream_client,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// URL of the event stream for `token`.
    pub fn stream_url(&self, token: &SessionToken) -> Result<reqwest::Url, ChatError> {
        let base = self.config.resolve(&self.config.endpoints.stream);
        reqwest::Url::parse_with_params(&base, &[("token", token.as_str())])
            .map_err(|e| ChatError::Config(format!("stream endpoint {base:?}: {e}")))
    }

    async fn send_checked(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ChatError> {
        let resp = request.send().await.map_err(|e| transport_error(url, e))?;
        let status = resp.status();
        debug!(url, status = status.as_u16(), "chat server responded");
        if !status.is_success() {
            return Err(ChatError::from_status(status.as_u16(), url));
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String, context: &str) -> Result<T, ChatError> {
        let resp = self.send_checked(&url, self.client.get(&url)).await?;
        let bytes = resp.bytes().await.map_err(|e| transport_error(&url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ChatError::parse(context, e))
    }

    async fn post_json<B: Serialize>(&self, url: String, body: &B) -> Result<(), ChatError> {
        self.send_checked(&url, self.client.post(&url).json(body)).await?;
        Ok(())
    }
}

/// reqwest embeds the full request URL in its error text; the stream URL
/// carries the session token, so it is dropped before the error is kept.
fn transport_error(url: &str, err: reqwest::Error) -> ChatError {
    ChatError::network(url, err.without_url())
}

impl ChatBackend for HttpBackend {
    fn fetch_token(&self) -> BoxFuture<'_, Result<String, ChatError>> {
        async move {
            let url = self.config.resolve(&self.config.endpoints.session_token);
            let resp: TokenResponse = self.get_json(url, "session token").await?;
            Ok(resp.session_token)
        }
        .boxed()
    }

    fn fetch_identity(&self) -> BoxFuture<'_, Result<IdentityProof, ChatError>> {
        async move {
            let url = self.config.resolve(&self.config.endpoints.ip_hash);
            let resp: IpHashResponse = self.get_json(url, "ip hash").await?;
            Ok(IdentityProof::new(resp.hashed_ip))
        }
        .boxed()
    }

    fn fetch_public_ip(&self) -> BoxFuture<'_, Result<String, ChatError>> {
        async move {
            let url = self.config.resolve(&self.config.endpoints.public_ip);
            let resp: PublicIpResponse = self.get_json(url, "public ip").await?;
            Ok(resp.ip)
        }
        .boxed()
    }

    fn fetch_feed(&self, token: Option<SessionToken>) -> BoxFuture<'_, Result<String, ChatError>> {
        async move {
            let url = self.config.resolve(&self.config.endpoints.feed);
            let mut request = self
                .client
                .get(&url)
                .header(reqwest::header::CACHE_CONTROL, "no-store")
                .header(reqwest::header::PRAGMA, "no-cache");
            if let Some(token) = &token {
                request = request.header(reqwest::header::AUTHORIZATION, token.as_str());
            }
            let resp = self.send_checked(&url, request).await?;
            resp.text().await.map_err(|e| transport_error(&url, e))
        }
        .boxed()
    }

    fn open_stream(&self, token: SessionToken) -> BoxFuture<'_, Result<ByteStream, ChatError>> {
        async move {
            let url = self.stream_url(&token)?;
            // The token is in the query string; log the endpoint only.
            let label = self.config.resolve(&self.config.endpoints.stream);
            let request = self
                .stream_client
                .get(url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .header(reqwest::header::CACHE_CONTROL, "no-store");
            let resp = self.send_checked(&label, request).await?;

            let stream = resp
                .bytes_stream()
                .map(move |chunk| chunk.map(|b| b.to_vec()).map_err(|e| transport_error(&label, e)));
            Ok(stream.boxed())
        }
        .boxed()
    }

    fn send_message(&self, body: SendRequest) -> BoxFuture<'_, Result<(), ChatError>> {
        async move {
            let url = self.config.resolve(&self.config.endpoints.send);
            self.post_json(url, &body).await
        }
        .boxed()
    }

    fn edit_message(&self, body: EditRequest) -> BoxFuture<'_, Result<(), ChatError>> {
        async move {
            let url = self.config.resolve(&self.config.endpoints.edit);
            self.post_json(url, &body).await
        }
        .boxed()
    }

    fn delete_message(&self, body: DeleteRequest) -> BoxFuture<'_, Result<(), ChatError>> {
        async move {
            let url = self.config.resolve(&self.config.endpoints.delete);
            self.post_json(url, &body).await
        }
        .boxed()
    }
}
