use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use client::BinaryRole;
use color_eyre::eyre::{self, Context};
use futures::StreamExt;
use playgodot::{ClientConfig, DEFAULT_WAIT_TIMEOUT, Godot, Protocol};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(about = "Drive a running Godot game")]
struct Args {
    /// Configuration file; the user configuration directory is searched when
    /// not given.
    #[clap(short, long)]
    config: Option<PathBuf>,

    #[clap(long)]
    host: Option<String>,

    #[clap(short, long)]
    port: Option<u16>,

    /// Speak the binary protocol instead of JSON-RPC over WebSocket.
    #[clap(long)]
    binary: bool,

    /// Whether to listen for the engine or dial out to it (binary protocol).
    #[clap(long, value_enum)]
    role: Option<Role>,

    /// Request timeout in seconds.
    #[clap(short, long)]
    timeout: Option<f64>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call a remote method and print the result as JSON.
    Call {
        method: String,

        /// Parameters as a JSON object.
        #[clap(long)]
        params: Option<String>,
    },
    /// Wait for a node to exist and print its description.
    WaitNode {
        path: String,

        /// How long to wait, in seconds.
        #[clap(long)]
        wait: Option<f64>,
    },
    /// Print notifications until the connection closes.
    Watch {
        /// Only print notifications with this name.
        event: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Listen,
    Connect,
}

impl From<Role> for BinaryRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Listen => BinaryRole::Listen,
            Role::Connect => BinaryRole::Connect,
        }
    }
}

impl Args {
    /// Defaults, then the configuration file, then the environment, then
    /// flags.
    fn client_config(&self) -> eyre::Result<ClientConfig> {
        let config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .wrap_err_with(|| format!("loading configuration from {}", path.display()))?,
            None => ClientConfig::load_or_default().wrap_err("loading default configuration")?,
        };
        let mut config = config
            .with_env_overrides()
            .wrap_err("applying environment overrides")?;

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if self.binary {
            config.protocol = Protocol::Binary;
        }
        if let Some(role) = self.role {
            config.binary_role = role.into();
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout =
                seconds(timeout).wrap_err_with(|| format!("invalid timeout {timeout}"))?;
        }
        Ok(config)
    }
}

fn seconds(value: f64) -> eyre::Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| eyre::eyre!(e))
}

fn init_logging() {
    if std::io::stderr().is_terminal() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .json()
            .init();
    }
}

fn print_json(value: &Value) -> eyre::Result<()> {
    let text = serde_json::to_string_pretty(value).wrap_err("formatting result")?;
    println!("{text}");
    Ok(())
}

#[tracing::instrument(skip(godot))]
async fn call(godot: &Godot, method: &str, params: Option<&str>) -> eyre::Result<()> {
    let params = params
        .map(serde_json::from_str::<Value>)
        .transpose()
        .wrap_err("parsing --params as JSON")?;
    let result = godot
        .client()
        .call(method, params)
        .await
        .wrap_err_with(|| format!("calling {method}"))?;
    print_json(&result)
}

#[tracing::instrument(skip(godot))]
async fn wait_node(godot: &Godot, path: &str, wait: Option<f64>) -> eyre::Result<()> {
    let timeout = match wait {
        Some(wait) => seconds(wait).wrap_err_with(|| format!("invalid wait {wait}"))?,
        None => DEFAULT_WAIT_TIMEOUT,
    };
    let node = godot
        .wait_for_node(path, timeout)
        .await
        .wrap_err_with(|| format!("waiting for {path}"))?;
    print_json(node.data())
}

#[tracing::instrument(skip(godot))]
async fn watch(godot: &Godot, event: Option<&str>) -> eyre::Result<()> {
    let client = godot.client();
    let events = match event {
        Some(name) => client.subscribe(name),
        None => client.subscribe_all(),
    }
    .wrap_err("subscribing to notifications")?;

    let mut events = std::pin::pin!(events.into_stream());
    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    tracing::debug!("connection closed");
                    break;
                };
                let line = serde_json::json!({
                    "name": event.name,
                    "payload": event.payload,
                });
                println!("{line}");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted");
                break;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install().context("installing color_eyre")?;
    init_logging();

    let args = Args::parse();
    let config = args.client_config()?;
    tracing::debug!(url = %config.url(), "connecting");
    let godot = Godot::connect(config).await.context("connecting to game")?;

    let outcome = match &args.command {
        Command::Call { method, params } => call(&godot, method, params.as_deref()).await,
        Command::WaitNode { path, wait } => wait_node(&godot, path, *wait).await,
        Command::Watch { event } => watch(&godot, event.as_deref()).await,
    };

    godot.disconnect().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_configuration_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "host = \"10.0.0.2\"\nport = 7000\nrequest_timeout = 2.0\n").unwrap();

        let args = Args::try_parse_from([
            "playgodot",
            "--config",
            path.to_str().unwrap(),
            "--binary",
            "--role",
            "connect",
            "--timeout",
            "0.5",
            "call",
            "get_tree",
        ])
        .unwrap();
        let config = args.client_config().unwrap();

        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port(), 7000);
        assert_eq!(config.protocol, Protocol::Binary);
        assert_eq!(config.binary_role, BinaryRole::Connect);
        assert_eq!(config.request_timeout, Duration::from_millis(500));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let args = Args::try_parse_from(["playgodot", "--timeout=-1", "watch"]).unwrap();
        assert!(args.client_config().is_err());
    }

    #[test]
    fn call_params_are_optional() {
        let args = Args::try_parse_from(["playgodot", "call", "pause"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Call { ref method, params: None } if method == "pause"
        ));
    }
}
