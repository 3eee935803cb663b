//! # wirelink
//!
//! Command line front end for the wirelink transport: run the configured
//! listeners, or send a single message and optionally wait for the reply.

#![deny(unsafe_code)]

mod endpoints;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use wirelink_settings::TransportSettings;
use wirelink_transport::address::resolve_target;
use wirelink_transport::{ChannelFactory, FactoryConfig, Message, factories_from_settings};

use crate::endpoints::{ReplyEndpoint, ServeEndpoints, render_payload};

/// Duplex message channels over `WebSocket`.
#[derive(Parser, Debug)]
#[command(name = "wirelink", about = "Duplex message channels over WebSocket")]
struct Cli {
    /// Settings file (defaults to `~/.wirelink/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured listeners until interrupted.
    Listen {
        /// Send every received message back to its sender.
        #[arg(long)]
        echo: bool,
    },
    /// Connect, send one message, and exit.
    Send {
        /// Target, e.g. `http://127.0.0.1:8080`.
        uri: String,

        /// Function id byte.
        #[arg(long, default_value_t = 1)]
        func_id: u8,

        /// Exchange id.
        #[arg(long, default_value_t = 0)]
        xid: u32,

        /// Wait for one reply and print it.
        #[arg(long)]
        wait_reply: bool,

        /// How long to wait for the reply, in milliseconds.
        #[arg(long, default_value_t = 5_000)]
        reply_timeout_ms: u64,

        /// Message payload (UTF-8).
        payload: String,
    },
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_settings(path: Option<PathBuf>) -> Result<TransportSettings> {
    let path = path.unwrap_or_else(wirelink_settings::settings_path);
    wirelink_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

async fn listen(settings: &TransportSettings, echo: bool) -> Result<()> {
    let factories = factories_from_settings(settings);
    if factories.is_empty() {
        bail!("no protocol registered; enable registerHttp or registerHttps");
    }

    let endpoints = Arc::new(ServeEndpoints::new(echo));
    for factory in &factories {
        factory
            .activate(endpoints.clone())
            .await
            .with_context(|| format!("Failed to activate {} factory", factory.protocol()))?;
        tracing::info!(
            protocol = %factory.protocol(),
            port = factory.listening_port(factory.protocol()),
            "factory ready"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("Shutting down");

    for factory in &factories {
        factory.deactivate().await;
    }
    Ok(())
}

async fn send(
    settings: &TransportSettings,
    uri: &str,
    message: Message,
    reply_timeout: Option<Duration>,
) -> Result<()> {
    let protocol = resolve_target(uri)?.protocol;
    let mut config = FactoryConfig::from_settings(settings, protocol);
    config.listener.enabled = false;
    let factory = ChannelFactory::new(config);

    let (endpoint, reply) = ReplyEndpoint::new();
    let channel = factory.get_connection(endpoint, uri).await?;
    channel.send_message(&message).await?;
    tracing::info!(func_id = message.func_id, xid = message.xid, %uri, "message sent");

    if let Some(wait) = reply_timeout {
        let received = tokio::time::timeout(wait, reply)
            .await
            .with_context(|| format!("No reply within {}ms", wait.as_millis()))?
            .context("Channel closed before a reply arrived")?;
        println!(
            "funcId={} xid={} payload={}",
            received.func_id,
            received.xid,
            render_payload(&received.payload)
        );
    }

    channel.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);
    let settings = load_settings(cli.config)?;

    match cli.command {
        Command::Listen { echo } => listen(&settings, echo).await,
        Command::Send {
            uri,
            func_id,
            xid,
            wait_reply,
            reply_timeout_ms,
            payload,
        } => {
            let message = Message::new(func_id, xid, payload.into_bytes());
            let reply_timeout = wait_reply.then(|| Duration::from_millis(reply_timeout_ms));
            send(&settings, &uri, message, reply_timeout).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_listen() {
        let cli = Cli::try_parse_from(["wirelink", "listen", "--echo", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::Listen { echo: true }));
    }

    #[test]
    fn parses_send_with_defaults() {
        let cli = Cli::try_parse_from(["wirelink", "send", "http://127.0.0.1:9000", "abc"]).unwrap();
        let Command::Send {
            uri,
            func_id,
            xid,
            wait_reply,
            payload,
            ..
        } = cli.command
        else {
            panic!("expected send");
        };
        assert_eq!(uri, "http://127.0.0.1:9000");
        assert_eq!(func_id, 1);
        assert_eq!(xid, 0);
        assert!(!wait_reply);
        assert_eq!(payload, "abc");
    }

    #[test]
    fn rejects_out_of_range_func_id() {
        assert!(
            Cli::try_parse_from(["wirelink", "send", "--func-id", "300", "http://h:1", "x"])
                .is_err()
        );
    }

    #[test]
    fn settings_file_is_applied() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"httpPort": 9100, "registerHttps": false}}"#).unwrap();
        let settings = load_settings(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(settings.http_port, 9100);
        assert!(!settings.register_https);
    }

    #[test]
    fn bad_settings_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_settings(Some(file.path().to_path_buf())).is_err());
    }
}
