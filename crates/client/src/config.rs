//! Client configuration
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Durations are written as fractional seconds:
//!
//! ```toml
//! host = "127.0.0.1"
//! protocol = "binary"
//! binary_role = "connect"
//! request_timeout = 2.5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Default port of the text protocol.
pub const DEFAULT_TEXT_PORT: u16 = 9999;

/// Default port of the binary protocol.
pub const DEFAULT_BINARY_PORT: u16 = 6007;

const ENV_HOST: &str = "PLAYGODOT_HOST";
const ENV_PORT: &str = "PLAYGODOT_PORT";
const ENV_PROTOCOL: &str = "PLAYGODOT_PROTOCOL";

/// Which wire protocol to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// JSON-RPC over WebSocket.
    #[default]
    Text,
    /// Length-prefixed Godot Variant messages over TCP.
    Binary,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Text => DEFAULT_TEXT_PORT,
            Protocol::Binary => DEFAULT_BINARY_PORT,
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "websocket" | "ws" => Ok(Protocol::Text),
            "binary" | "tcp" => Ok(Protocol::Binary),
            other => Err(ClientError::Config(format!("unknown protocol '{other}'"))),
        }
    }
}

/// Who opens the TCP connection in binary mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryRole {
    /// Listen on `host:port`; the engine dials in (`--remote-debug`).
    #[default]
    Listen,
    /// Dial out to an engine listening on `host:port`.
    Connect,
}

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    /// Port to use; the protocol's default port when unset.
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub binary_role: BinaryRole,
    #[serde(with = "seconds")]
    pub connect_timeout: Duration,
    /// Timeout applied by [`Client::call`](crate::Client::call).
    #[serde(with = "seconds")]
    pub request_timeout: Duration,
    /// Largest incoming binary frame accepted before the connection is dropped.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            protocol: Protocol::default(),
            binary_role: BinaryRole::default(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_frame_size: wire::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// The effective port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// `ws://host:port` or `tcp://host:port`.
    pub fn url(&self) -> String {
        match self.protocol {
            Protocol::Text => format!("ws://{}:{}", self.host, self.port()),
            Protocol::Binary => format!("tcp://{}:{}", self.host, self.port()),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ClientError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ClientError::Config(format!("parsing configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("reading {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&contents)
    }

    /// Where the configuration file lives when none is given explicitly.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("playgodot").join("config.toml"))
    }

    /// Load the default configuration file, falling back to defaults when it
    /// does not exist.
    pub fn load_or_default() -> Result<Self, ClientError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply `PLAYGODOT_HOST`, `PLAYGODOT_PORT` and `PLAYGODOT_PROTOCOL`.
    pub fn with_env_overrides(self) -> Result<Self, ClientError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            let port = port
                .parse()
                .map_err(|e| ClientError::Config(format!("{ENV_PORT}={port}: {e}")))?;
            self.port = Some(port);
        }
        if let Some(protocol) = lookup(ENV_PROTOCOL) {
            self.protocol = protocol.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host must not be empty".to_string()));
        }
        if self.max_frame_size == 0 {
            return Err(ClientError::Config(
                "max_frame_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
