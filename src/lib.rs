//! # chatline
//!
//! Client-side synchronization for a small public chat room: keeps a local
//! view of the authoritative message feed current over interval polling or a
//! server-push stream, manages the short-lived session token the server
//! requires, decides which messages the client may edit or delete, and
//! redraws only when the feed actually changed.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use chatline::{ChatClient, TransportMode};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = ChatClient::builder("https://chat.example")
//!     .mode(TransportMode::Streaming)
//!     .build()?;
//! let surface = chatline::terminal::TerminalSurface::stdout(40);
//! client.run(surface, CancellationToken::new()).await;
//! ```

pub mod backend;
pub mod cli;
pub mod client;
pub mod color;
pub mod config;
pub mod error;
pub mod fake;
pub mod feed;
pub mod gate;
pub mod models;
pub mod render;
pub mod session;
pub mod terminal;

pub use backend::{ChatBackend, HttpBackend};
pub use client::{ChatClient, ChatClientBuilder};
pub use color::{Color, ColorAssigner, ColorStrategy};
pub use config::{ClientConfig, TransportMode};
pub use error::{ChatError, ErrorKind};
pub use feed::{FeedEvent, FeedSynchronizer, FeedTransport, FeedUpdate, SyncOutcome};
pub use gate::{Actions, MessageActionGate};
pub use models::{ChatMessage, MessageId, SessionToken};
pub use render::{render, Reconciler, Surface, ViewModel};
pub use session::{SessionTokenManager, TokenState};
