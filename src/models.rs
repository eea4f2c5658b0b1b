//! Chat data model and the JSON shapes exchanged with the chat server.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ChatError;

// ---------------------------------------------------------------------------
// Identifiers and credentials
// ---------------------------------------------------------------------------

/// Server-assigned message identifier.
///
/// The feed may carry ids as JSON numbers or as strings (`"0x1f3a"`); both are
/// kept verbatim as text so that they can be echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => MessageId(s),
            Raw::Number(n) => MessageId(n.to_string()),
        })
    }
}

/// Opaque bearer credential handed out by the session-token endpoint.
///
/// `Debug` never prints the token value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionToken(<{} chars>)", self.0.len())
    }
}

/// Hashed client IP issued by the server; proves authorship of earlier messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProof(String);

impl IdentityProof {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Point in time as the server reported it; rendered verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Text(String),
    Epoch(serde_json::Number),
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Text(String::new())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timestamp::Text(s) => f.write_str(s),
            Timestamp::Epoch(n) => write!(f, "{n}"),
        }
    }
}

/// One entry of the chat feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub nick: String,
    pub id: MessageId,
    #[serde(rename = "msg")]
    pub text: String,
    #[serde(default)]
    pub timestamp: Timestamp,
    /// Owner identity hash, when the server publishes it separately from the id.
    #[serde(default, alias = "ownerHash", skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl ChatMessage {
    /// Value compared against the client's [`IdentityProof`].
    ///
    /// Falls back to the message id: the chat server uses the author's hashed
    /// IP as the id when no separate owner field is published.
    pub fn owner_identity(&self) -> &str {
        self.owner.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Parse a full feed payload (a JSON array of messages).
pub fn parse_feed(raw: &str) -> Result<Vec<ChatMessage>, ChatError> {
    serde_json::from_str(raw).map_err(|e| ChatError::parse("feed", e))
}

// ---------------------------------------------------------------------------
// Wire request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpHashResponse {
    pub hashed_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicIpResponse {
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub nick: String,
    pub msg: String,
    pub ip: String,
}

/// Body of the send endpoint: `{"chatRequest": {nick, msg, ip}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub chat_request: ChatRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub msg_id: MessageId,
    pub session_token: String,
    pub ip: String,
    pub new_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub msg_id: MessageId,
    pub session_token: String,
    pub ip: String,
}
