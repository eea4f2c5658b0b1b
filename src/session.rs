//! # Session Token Manager
//!
//! Owns the opaque bearer token used by authenticated requests.
//!
//! ```text
//! NoToken -> Requesting -> Valid -> (Expired | Invalid) -> Requesting
//! ```
//!
//! Expiry is detected reactively: a token is presumed valid until a request
//! authenticated with it comes back 401/403 and the caller reports it via
//! [`SessionTokenManager::mark_expired`].
//!
//! At most one acquisition is in flight. Callers arriving while one runs wait
//! for it and share its outcome instead of issuing another request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::ChatBackend;
use crate::error::ChatError;
use crate::models::SessionToken;

/// Observable lifecycle of the session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Requesting,
    Valid(SessionToken),
    /// The server rejected the token on an authenticated request.
    Expired,
    /// The token endpoint answered 2xx but handed out an empty token.
    Invalid,
}

impl TokenState {
    pub fn name(&self) -> &'static str {
        match self {
            TokenState::NoToken    => "no_token",
            TokenState::Requesting => "requesting",
            TokenState::Valid(_)   => "valid",
            TokenState::Expired    => "expired",
            TokenState::Invalid    => "invalid",
        }
    }
}

pub struct SessionTokenManager {
    backend: Arc<dyn ChatBackend>,
    state: RwLock<TokenState>,
    /// Completed acquisitions; bumped while `last_outcome` is still locked.
    attempts: AtomicU64,
    /// Serialises acquisitions and holds the most recent outcome.
    last_outcome: Mutex<Option<Result<SessionToken, ChatError>>>,
}

impl SessionTokenManager {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            state: RwLock::new(TokenState::NoToken),
            attempts: AtomicU64::new(0),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn state(&self) -> TokenState {
        self.state.read().map(|s| s.clone()).unwrap_or(TokenState::NoToken)
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.state(), TokenState::Valid(_))
    }

    /// The token if one is currently valid.
    pub fn current(&self) -> Option<SessionToken> {
        match self.state() {
            TokenState::Valid(token) => Some(token),
            _ => None,
        }
    }

    fn set_state(&self, next: TokenState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = next;
        }
    }

    /// Current token, acquiring a fresh one first when not `Valid`.
    pub async fn ensure(&self) -> Result<SessionToken, ChatError> {
        match self.current() {
            Some(token) => Ok(token),
            None => self.acquire_with(true).await,
        }
    }

    /// Request a new token from the server.
    ///
    /// If another acquisition completes while this caller waits for the lock,
    /// its outcome is returned without issuing a second request.
    pub async fn acquire(&self) -> Result<SessionToken, ChatError> {
        self.acquire_with(false).await
    }

    /// `reuse_valid`: a token that became valid before the lock was taken is
    /// returned instead of fetching another one.
    async fn acquire_with(&self, reuse_valid: bool) -> Result<SessionToken, ChatError> {
        let seen = self.attempts.load(Ordering::Acquire);
        let mut last_outcome = self.last_outcome.lock().await;
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(outcome) = last_outcome.as_ref() {
                return outcome.clone();
            }
        }
        if reuse_valid {
            if let Some(token) = self.current() {
                return Ok(token);
            }
        }

        let previous = self.state();
        self.set_state(TokenState::Requesting);

        let outcome = match self.backend.fetch_token().await {
            Ok(raw) if raw.trim().is_empty() => {
                warn!("session token endpoint returned an empty token");
                self.set_state(TokenState::Invalid);
                Err(ChatError::parse("session token", "empty sessionToken"))
            }
            Ok(raw) => {
                let token = SessionToken::new(raw);
                self.set_state(TokenState::Valid(token.clone()));
                info!(from = previous.name(), "session token acquired");
                Ok(token)
            }
            Err(e) => {
                // Failure leaves the manager where it was; retry happens on the next cycle.
                let restored = match previous {
                    TokenState::Requesting => TokenState::NoToken,
                    other => other,
                };
                warn!(error = %e, state = restored.name(), "session token acquisition failed");
                self.set_state(restored);
                Err(e)
            }
        };

        *last_outcome = Some(outcome.clone());
        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Report that `token` was rejected by the server.
    ///
    /// Ignored unless `token` is still the current token, so a late failure
    /// from a request made with a rotated-out token cannot expire a fresh one.
    /// Returns whether the state changed.
    pub fn mark_expired(&self, token: &SessionToken) -> bool {
        let Ok(mut guard) = self.state.write() else {
            return false;
        };
        match &*guard {
            TokenState::Valid(current) if current == token => {
                *guard = TokenState::Expired;
                warn!("session token rejected by server, marked expired");
                true
            }
            _ => false,
        }
    }
}
