//! Request/response client for a running Godot instance.
//!
//! A [`Client`] owns at most one connection at a time. Each connection runs
//! two background tasks: a writer that drains a queue of encoded requests
//! into the transport, and a receive loop that decodes incoming frames and
//! either completes the matching pending call or hands the frame to event
//! subscribers.
//!
//! ```ignore
//! use client::{Client, ClientConfig};
//! use serde_json::json;
//!
//! let client = Client::new(ClientConfig::load_or_default()?.with_env_overrides()?);
//! client.connect().await?;
//!
//! let tree = client.call("get_tree", None).await?;
//! let visible = client
//!     .call("get_property", Some(json!({"path": "/root/Main/Button", "property": "visible"})))
//!     .await?;
//!
//! client.disconnect().await;
//! ```

mod client;
mod config;
mod connection;
mod correlator;
mod error;
mod events;
mod receive_loop;

pub mod testing;

pub use client::Client;
pub use config::{BinaryRole, ClientConfig, DEFAULT_BINARY_PORT, DEFAULT_TEXT_PORT, Protocol};
pub use error::ClientError;
pub use events::{Event, EventReceiver};
