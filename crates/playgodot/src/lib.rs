//! Automate and test running Godot games.
//!
//! [`Godot`] wraps a [`Client`] with the calls a test needs: finding nodes,
//! reading and writing properties, simulating input, waiting for things to
//! happen and taking screenshots.
//!
//! ```ignore
//! use playgodot::{ClientConfig, Godot, DEFAULT_WAIT_TIMEOUT};
//!
//! let godot = Godot::connect(ClientConfig::default()).await?;
//! let button = godot.wait_for_node("/root/Main/StartButton", DEFAULT_WAIT_TIMEOUT).await?;
//! godot.input().click_node(button.path(), Default::default()).await?;
//! godot.wait_for_signal("game_started", None, Duration::from_secs(10)).await?;
//! ```

mod error;
mod godot;
mod input;
mod node;
mod screenshot;
pub mod wait;

pub use client::{Client, ClientConfig, ClientError, Event, EventReceiver, Protocol};
pub use error::{Error, Result};
pub use godot::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT, Godot};
pub use input::{
    DEFAULT_DRAG_DURATION, DEFAULT_GESTURE_DURATION, DEFAULT_TYPING_DELAY, Input, KeyCombo,
    MouseButton,
};
pub use node::Node;
pub use screenshot::ImageComparator;
