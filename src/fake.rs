//! In-memory [`ChatBackend`] with scripted answers.
//!
//! Every call is recorded so tests can assert on request order and bodies.
//! Unscripted calls fail with a `Network` error.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{stream, FutureExt, StreamExt};
use tokio::time::Instant;

use crate::backend::{ByteStream, ChatBackend};
use crate::error::ChatError;
use crate::models::{DeleteRequest, EditRequest, IdentityProof, SendRequest, SessionToken};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Token,
    Identity,
    PublicIp,
    Feed { token: Option<String> },
    Stream { token: String },
    Send(SendRequest),
    Edit(EditRequest),
    Delete(DeleteRequest),
}

/// How one `open_stream` call behaves.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Connection attempt fails.
    Fail(ChatError),
    /// Yields the chunks, then the server closes the stream.
    Chunks(Vec<Vec<u8>>),
    /// Yields the chunks, then stays open without further data.
    ChunksThenHang(Vec<Vec<u8>>),
}

struct FeedReply {
    delay: Duration,
    result: Result<String, ChatError>,
}

#[derive(Default)]
struct Script {
    tokens: VecDeque<Result<String, ChatError>>,
    feeds: VecDeque<FeedReply>,
    feed_fallback: Option<Result<String, ChatError>>,
    streams: VecDeque<StreamScript>,
    identity: Option<Result<IdentityProof, ChatError>>,
    public_ip: Option<Result<String, ChatError>>,
    mutations: VecDeque<Result<(), ChatError>>,
}

#[derive(Default)]
pub struct FakeBackend {
    script: Mutex<Script>,
    log: Mutex<Vec<(Instant, Call)>>,
}

fn unscripted(what: &str) -> ChatError {
    ChatError::Network {
        url: format!("fake://{what}"),
        detail: "no scripted answer".into(),
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut guard = self.script.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn record(&self, call: Call) {
        let mut guard = self.log.lock().unwrap_or_else(|e| e.into_inner());
        guard.push((Instant::now(), call));
    }

    pub fn push_token(&self, answer: Result<String, ChatError>) {
        self.with_script(|s| s.tokens.push_back(answer));
    }

    pub fn push_feed(&self, answer: Result<String, ChatError>) {
        self.push_feed_delayed(Duration::ZERO, answer);
    }

    pub fn push_feed_delayed(&self, delay: Duration, answer: Result<String, ChatError>) {
        self.with_script(|s| s.feeds.push_back(FeedReply { delay, result: answer }));
    }

    /// Answer used once the scripted feed queue is empty.
    pub fn set_feed_fallback(&self, answer: Result<String, ChatError>) {
        self.with_script(|s| s.feed_fallback = Some(answer));
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.with_script(|s| s.streams.push_back(script));
    }

    pub fn set_identity(&self, answer: Result<IdentityProof, ChatError>) {
        self.with_script(|s| s.identity = Some(answer));
    }

    pub fn set_public_ip(&self, answer: Result<String, ChatError>) {
        self.with_script(|s| s.public_ip = Some(answer));
    }

    /// Queue the outcome of the next send/edit/delete. Defaults to success.
    pub fn push_mutation(&self, answer: Result<(), ChatError>) {
        self.with_script(|s| s.mutations.push_back(answer));
    }

    pub fn calls(&self) -> Vec<Call> {
        let guard = self.log.lock().unwrap_or_else(|e| e.into_inner());
        guard.iter().map(|(_, c)| c.clone()).collect()
    }

    /// When each `open_stream` call was made.
    pub fn stream_open_times(&self) -> Vec<Instant> {
        let guard = self.log.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .filter(|(_, c)| matches!(c, Call::Stream { .. }))
            .map(|(at, _)| *at)
            .collect()
    }

    fn next_mutation(&self) -> Result<(), ChatError> {
        self.with_script(|s| s.mutations.pop_front().unwrap_or(Ok(())))
    }
}

impl ChatBackend for FakeBackend {
    fn fetch_token(&self) -> BoxFuture<'_, Result<String, ChatError>> {
        self.record(Call::Token);
        let answer = self.with_script(|s| s.tokens.pop_front());
        async move { answer.unwrap_or_else(|| Err(unscripted("token"))) }.boxed()
    }

    fn fetch_identity(&self) -> BoxFuture<'_, Result<IdentityProof, ChatError>> {
        self.record(Call::Identity);
        let answer = self.with_script(|s| s.identity.clone());
        async move { answer.unwrap_or_else(|| Err(unscripted("identity"))) }.boxed()
    }

    fn fetch_public_ip(&self) -> BoxFuture<'_, Result<String, ChatError>> {
        self.record(Call::PublicIp);
        let answer = self.with_script(|s| s.public_ip.clone());
        async move { answer.unwrap_or_else(|| Err(unscripted("public ip"))) }.boxed()
    }

    fn fetch_feed(&self, token: Option<SessionToken>) -> BoxFuture<'_, Result<String, ChatError>> {
        self.record(Call::Feed {
            token: token.map(|t| t.as_str().to_string()),
        });
        let reply = self.with_script(|s| {
            s.feeds.pop_front().unwrap_or_else(|| FeedReply {
                delay: Duration::ZERO,
                result: s.feed_fallback.clone().unwrap_or_else(|| Err(unscripted("feed"))),
            })
        });
        async move {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            reply.result
        }
        .boxed()
    }

    fn open_stream(&self, token: SessionToken) -> BoxFuture<'_, Result<ByteStream, ChatError>> {
        self.record(Call::Stream {
            token: token.as_str().to_string(),
        });
        let script = self.with_script(|s| s.streams.pop_front());
        async move {
            let opened: Result<ByteStream, ChatError> = match script {
                None => Err(unscripted("stream")),
                Some(StreamScript::Fail(e)) => Err(e),
                Some(StreamScript::Chunks(chunks)) => {
                    Ok(stream::iter(chunks.into_iter().map(Ok::<Vec<u8>, ChatError>)).boxed())
                }
                Some(StreamScript::ChunksThenHang(chunks)) => Ok(stream::iter(
                    chunks.into_iter().map(Ok::<Vec<u8>, ChatError>),
                )
                .chain(stream::pending())
                .boxed()),
            };
            opened
        }
        .boxed()
    }

    fn send_message(&self, body: SendRequest) -> BoxFuture<'_, Result<(), ChatError>> {
        self.record(Call::Send(body));
        let answer = self.next_mutation();
        async move { answer }.boxed()
    }

    fn edit_message(&self, body: EditRequest) -> BoxFuture<'_, Result<(), ChatError>> {
        self.record(Call::Edit(body));
        let answer = self.next_mutation();
        async move { answer }.boxed()
    }

    fn delete_message(&self, body: DeleteRequest) -> BoxFuture<'_, Result<(), ChatError>> {
        self.record(Call::Delete(body));
        let answer = self.next_mutation();
        async move { answer }.boxed()
    }
}
