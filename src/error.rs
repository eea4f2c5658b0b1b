//! Crate-level error type.
//!
//! Every fallible operation in the crate returns [`ChatError`]. The enum is
//! `Clone` because a single token acquisition outcome is shared by every
//! caller that waited on it.

use thiserror::Error;

/// Coarse classification used to decide how a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never produced an HTTP response.
    NetworkFailure,
    /// Non-2xx response unrelated to authentication.
    ServerError,
    /// The server rejected the session credential (401/403).
    AuthExpired,
    /// The response body was not the expected shape.
    ParseError,
    /// Rejected locally before anything was sent.
    Local,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NetworkFailure => "network_failure",
            ErrorKind::ServerError    => "server_error",
            ErrorKind::AuthExpired    => "auth_expired",
            ErrorKind::ParseError     => "parse_error",
            ErrorKind::Local          => "local",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// A TCP/TLS-level failure, timeout, or broken response body.
    #[error("network failure reaching {url}: {detail}")]
    Network { url: String, detail: String },

    /// The server replied with a non-2xx status other than 401/403.
    #[error("HTTP {status} from {url}")]
    Server { status: u16, url: String },

    /// The server refused the session token.
    #[error("session token rejected (HTTP {status} from {url})")]
    AuthExpired { status: u16, url: String },

    /// A payload could not be decoded.
    #[error("malformed payload in {context}: {detail}")]
    Parse { context: String, detail: String },

    /// Caller-supplied input failed validation.
    #[error("{0}")]
    InvalidInput(String),

    /// The client does not own the message it tried to mutate.
    #[error("not permitted to modify message {0}")]
    NotPermitted(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ChatError {
    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        match status {
            401 | 403 => ChatError::AuthExpired { status, url },
            _ => ChatError::Server { status, url },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Network { .. } => ErrorKind::NetworkFailure,
            ChatError::Server { .. } => ErrorKind::ServerError,
            ChatError::AuthExpired { .. } => ErrorKind::AuthExpired,
            ChatError::Parse { .. } => ErrorKind::ParseError,
            ChatError::InvalidInput(_) | ChatError::NotPermitted(_) | ChatError::Config(_) => {
                ErrorKind::Local
            }
        }
    }

    /// Only an expired session survives across sync cycles.
    pub fn is_sticky(&self) -> bool {
        self.kind() == ErrorKind::AuthExpired
    }

    pub(crate) fn network(url: &str, err: impl std::fmt::Display) -> Self {
        ChatError::Network {
            url: url.to_string(),
            detail: err.to_string(),
        }
    }

    pub(crate) fn parse(context: &str, err: impl std::fmt::Display) -> Self {
        ChatError::Parse {
            context: context.to_string(),
            detail: err.to_string(),
        }
    }
}
