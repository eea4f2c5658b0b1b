use std::io::{self, BufRead, Write};

use clap::{CommandFactory, Parser};
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatline::cli::{resolve_config, Args, Command};
use chatline::color::ColorAssigner;
use chatline::error::ChatError;
use chatline::gate::DeleteOutcome;
use chatline::models::ChatMessage;
use chatline::terminal::TerminalSurface;
use chatline::ChatClient;

/// Rows assumed for the terminal view when `LINES` is not exported.
const DEFAULT_ROWS: u32 = 40;

fn terminal_rows() -> u32 {
    std::env::var("LINES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_ROWS)
}

fn confirm_delete(msg: &ChatMessage) -> bool {
    print!("Delete message {} (\"{}\")? [y/N] ", msg.id, msg.text);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatline=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Args::command(), "chatline", &mut io::stdout());
            return Ok(());
        }
        Command::Color { nick, id, strategy } => {
            let color = ColorAssigner::new(*strategy).color_for(nick, id);
            let (r, g, b) = color.to_rgb();
            println!("{} {}", nick.truecolor(r, g, b).bold(), color.css());
            return Ok(());
        }
        _ => {}
    }

    let config = resolve_config(&args)?;
    let client = ChatClient::from_config(config).build()?;

    match args.command {
        Command::Watch { .. } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });
            client.run(TerminalSurface::stdout(terminal_rows()), cancel).await;
        }
        Command::Send { nick, message } => {
            client.send(&nick, &message).await?;
            println!("{}", "Message sent.".green());
        }
        Command::Edit { id, text, .. } => {
            let gate = client.action_gate().await;
            let msg = client.find_message(&id).await?;
            let mut draft = gate.begin_edit(&msg).ok_or(ChatError::NotPermitted(id))?;
            draft.set_text(text);
            gate.submit_edit(&draft).await?;
            println!("{}", "Edit requested.".green());
        }
        Command::Delete { id, yes, .. } => {
            let gate = client.action_gate().await;
            let msg = client.find_message(&id).await?;
            match gate.delete(&msg, |m| yes || confirm_delete(m)).await? {
                DeleteOutcome::Requested => println!("{}", "Delete requested.".green()),
                DeleteOutcome::Cancelled => info!(msg_id = %msg.id, "delete cancelled"),
            }
        }
        Command::Color { .. } | Command::Completions { .. } => {}
    }

    Ok(())
}
