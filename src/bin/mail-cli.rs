#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for sending mail over SMTP and reading unseen mail over IMAP

use anyhow::Context;
use clap::{Parser, Subcommand};
use email_provider::{EmailClient, IncomingMessage, MailConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mail-cli")]
#[command(about = "Send mail over SMTP and read unseen mail over IMAP")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Send a plain-text message
    SendText {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long, default_value = "")]
        subject: String,

        /// Message body
        body: String,
    },

    /// Send a JPEG file as an attachment
    SendImage {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long, default_value = "")]
        subject: String,

        /// Path to the JPEG image
        path: PathBuf,
    },

    /// List unseen messages in INBOX (marks them as read)
    Unread,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    email_provider::install_default_provider();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = MailConfig::from_env()?;
    let client = EmailClient::from_config(&config);

    match &args.command {
        Command::SendText {
            from,
            to,
            subject,
            body,
        } => {
            client.send_text(from, to, subject, body).await?;
            println!("Sent to {to}");
        }
        Command::SendImage {
            from,
            to,
            subject,
            path,
        } => {
            let jpeg = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            client.send_image(from, to, subject, &jpeg).await?;
            println!("Sent {} to {to}", path.display());
        }
        Command::Unread => {
            cmd_unread(&client, &args).await?;
        }
    }

    Ok(())
}

async fn cmd_unread(client: &EmailClient, args: &Args) -> anyhow::Result<()> {
    let messages = client.unread_messages().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else {
        print_message_table(&messages);
    }

    Ok(())
}

fn print_message_table(messages: &[IncomingMessage]) {
    if messages.is_empty() {
        println!("No unread messages.");
        return;
    }

    let header = format!("{:<6} {:<20} {:<30} {}", "Seq", "Date", "From", "Subject");
    println!("{header}");
    println!("{}", "-".repeat(100));

    for msg in messages {
        let date = msg
            .date
            .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{:<6} {:<20} {:<30} {}",
            msg.sequence,
            date,
            truncate(msg.from.as_deref().unwrap_or("-"), 28),
            truncate(msg.subject.as_deref().unwrap_or(""), 40),
        );
    }

    println!("\n{} message(s)", messages.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
