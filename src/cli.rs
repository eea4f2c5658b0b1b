use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::color::ColorStrategy;
use crate::config::{ClientConfig, TransportMode};
use crate::error::ChatError;

#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(version)]
#[command(about = "Terminal client for a polling or streaming chat feed")]
pub struct Args {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Chat server base URL (overrides the config file)
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Follow the chat feed in the terminal
    Watch {
        /// Feed transport: polling or streaming
        #[arg(long, value_enum)]
        mode: Option<TransportMode>,

        /// Polling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Nickname color scheme
        #[arg(long, value_enum)]
        colors: Option<ColorStrategy>,

        /// Only offer controls on messages posted under this nickname
        #[arg(long)]
        nick: Option<String>,

        /// Send the session token with feed polls
        #[arg(long)]
        auth: bool,
    },

    /// Post a message
    Send {
        #[arg(long, short)]
        nick: String,

        message: String,
    },

    /// Replace the text of one of your messages
    Edit {
        id: String,

        text: String,

        #[arg(long)]
        nick: Option<String>,
    },

    /// Delete one of your messages
    Delete {
        id: String,

        #[arg(long)]
        nick: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Print the color assigned to a nickname
    Color {
        nick: String,

        #[arg(default_value = "")]
        id: String,

        #[arg(long, value_enum, default_value_t = ColorStrategy::Hashed)]
        strategy: ColorStrategy,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Load the config file (if any) and apply command-line overrides.
pub fn resolve_config(args: &Args) -> Result<ClientConfig, ChatError> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(server) = &args.server {
        config.base_url = server.clone();
    }

    match &args.command {
        Command::Watch {
            mode,
            interval_ms,
            colors,
            nick,
            auth,
        } => {
            if let Some(mode) = mode {
                config.mode = *mode;
            }
            if let Some(ms) = interval_ms {
                config.poll_interval = std::time::Duration::from_millis(*ms);
            }
            if let Some(colors) = colors {
                config.color_strategy = *colors;
            }
            if nick.is_some() {
                config.nick = nick.clone();
            }
            if *auth {
                config.feed_requires_auth = true;
            }
        }
        Command::Edit { nick, .. } | Command::Delete { nick, .. } => {
            if nick.is_some() {
                config.nick = nick.clone();
            }
        }
        Command::Send { .. } | Command::Color { .. } | Command::Completions { .. } => {}
    }

    config.validate()?;
    Ok(config)
}
