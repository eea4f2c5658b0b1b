//! Client configuration: endpoints, timing, and display options.
//!
//! Defaults point at the public chat server. A TOML file may override any
//! subset of fields; CLI flags are applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::ColorStrategy;
use crate::error::ChatError;

pub const DEFAULT_BASE_URL: &str = "https://kittycrypto.ddns.net:7619";
pub const DEFAULT_PUBLIC_IP_URL: &str = "https://api64.ipify.org?format=json";

/// How feed updates are delivered. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Polling,
    Streaming,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Polling   => write!(f, "polling"),
            TransportMode::Streaming => write!(f, "streaming"),
        }
    }
}

/// Endpoint locations. Relative paths are resolved against `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub feed: String,
    pub session_token: String,
    pub stream: String,
    pub send: String,
    pub edit: String,
    pub delete: String,
    pub ip_hash: String,
    pub public_ip: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            feed: "/chat.json".into(),
            session_token: "/session-token".into(),
            stream: "/chat/stream".into(),
            send: "/chat".into(),
            edit: "/edit-message".into(),
            delete: "/delete-message".into(),
            ip_hash: "/get-ip/sha256".into(),
            public_ip: DEFAULT_PUBLIC_IP_URL.into(),
        }
    }
}

/// Full client configuration.
///
/// Durations are written in TOML as milliseconds (`poll_interval_ms = 1000`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub endpoints: Endpoints,
    pub mode: TransportMode,
    /// Send `Authorization: <token>` on feed polls.
    pub feed_requires_auth: bool,
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    #[serde(rename = "reconnect_backoff_ms", with = "millis")]
    pub reconnect_backoff: Duration,
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,
    /// Pixels from the bottom that still count as "at bottom".
    pub scroll_tolerance: u32,
    pub color_strategy: ColorStrategy,
    /// When set, edit/delete also require the message nick to match.
    pub nick: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            endpoints: Endpoints::default(),
            mode: TransportMode::Polling,
            feed_requires_auth: false,
            poll_interval: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            scroll_tolerance: 8,
            color_strategy: ColorStrategy::Hashed,
            nick: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ChatError> {
        let cfg: ClientConfig = toml::from_str(text).map_err(|e| ChatError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ChatError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ChatError::Config(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        let timings = [
            ("poll_interval_ms", self.poll_interval),
            ("reconnect_backoff_ms", self.reconnect_backoff),
            ("connect_timeout_ms", self.connect_timeout),
            ("request_timeout_ms", self.request_timeout),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, d)| d.is_zero()) {
            return Err(ChatError::Config(format!("{name} must be > 0")));
        }
        Ok(())
    }

    /// Resolve an endpoint: absolute URLs pass through, paths join `base_url`.
    pub fn resolve(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
