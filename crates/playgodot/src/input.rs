//! Simulated input
//!
//! Every method here is one call; the remote injects the events. Durations
//! are sent as fractional seconds.

use std::time::Duration;

use client::Client;
use serde_json::{Value, json};

use crate::error::{Error, Result};

/// Default length of a drag.
pub const DEFAULT_DRAG_DURATION: Duration = Duration::from_millis(500);

/// Default length of a swipe or pinch.
pub const DEFAULT_GESTURE_DURATION: Duration = Duration::from_millis(300);

/// Default pause between keystrokes of `type_text`.
pub const DEFAULT_TYPING_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn as_str(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// A key with its modifiers, e.g. `ctrl+shift+s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub key: String,
    pub modifiers: Vec<String>,
}

impl std::str::FromStr for KeyCombo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let key = parts.pop().unwrap_or_default();
        if key.is_empty() || parts.iter().any(|m| m.is_empty()) {
            return Err(Error::InvalidKey(s.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            modifiers: parts.into_iter().map(str::to_string).collect(),
        })
    }
}

/// Input simulation for one connection.
#[derive(Debug, Clone)]
pub struct Input {
    client: Client,
}

impl Input {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, method: &str, params: Value) -> Result<()> {
        self.client.call(method, Some(params)).await?;
        Ok(())
    }

    // Mouse

    pub async fn click(&self, x: f64, y: f64, button: MouseButton) -> Result<()> {
        self.send(
            "click",
            json!({ "x": x, "y": y, "button": button.as_str() }),
        )
        .await
    }

    /// Click the centre of the node at `path`.
    pub async fn click_node(&self, path: &str, button: MouseButton) -> Result<()> {
        self.send(
            "click_node",
            json!({ "path": path, "button": button.as_str() }),
        )
        .await
    }

    pub async fn double_click(&self, x: f64, y: f64) -> Result<()> {
        self.send("double_click", json!({ "x": x, "y": y })).await
    }

    pub async fn double_click_node(&self, path: &str) -> Result<()> {
        self.send("double_click_node", json!({ "path": path })).await
    }

    pub async fn right_click(&self, x: f64, y: f64) -> Result<()> {
        self.click(x, y, MouseButton::Right).await
    }

    pub async fn right_click_node(&self, path: &str) -> Result<()> {
        self.click_node(path, MouseButton::Right).await
    }

    pub async fn move_mouse(&self, x: f64, y: f64) -> Result<()> {
        self.send("move_mouse", json!({ "x": x, "y": y })).await
    }

    pub async fn drag(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        duration: Duration,
    ) -> Result<()> {
        self.send(
            "drag",
            json!({
                "from_x": from.0,
                "from_y": from.1,
                "to_x": to.0,
                "to_y": to.1,
                "duration": duration.as_secs_f64(),
            }),
        )
        .await
    }

    /// Drag from one node to another.
    pub async fn drag_node(&self, from_path: &str, to_path: &str, duration: Duration) -> Result<()> {
        self.send(
            "drag_node",
            json!({
                "from_path": from_path,
                "to_path": to_path,
                "duration": duration.as_secs_f64(),
            }),
        )
        .await
    }

    // Keyboard

    /// Press `key` while holding `modifiers`.
    pub async fn press_key(&self, key: &str, modifiers: &[&str]) -> Result<()> {
        self.send(
            "press_key",
            json!({ "key": key, "modifiers": modifiers }),
        )
        .await
    }

    /// Press a combination written as `modifier+...+key`, e.g. `ctrl+s`.
    pub async fn press_combo(&self, combo: &str) -> Result<()> {
        let combo: KeyCombo = combo.parse()?;
        let modifiers: Vec<&str> = combo.modifiers.iter().map(String::as_str).collect();
        self.press_key(&combo.key, &modifiers).await
    }

    pub async fn type_text(&self, text: &str, delay: Duration) -> Result<()> {
        self.send(
            "type_text",
            json!({ "text": text, "delay": delay.as_secs_f64() }),
        )
        .await
    }

    // Input map actions

    pub async fn press_action(&self, action: &str) -> Result<()> {
        self.send("press_action", json!({ "action": action })).await
    }

    pub async fn hold_action(&self, action: &str, duration: Duration) -> Result<()> {
        self.send(
            "hold_action",
            json!({ "action": action, "duration": duration.as_secs_f64() }),
        )
        .await
    }

    pub async fn release_action(&self, action: &str) -> Result<()> {
        self.send("release_action", json!({ "action": action })).await
    }

    // Touch

    pub async fn tap(&self, x: f64, y: f64) -> Result<()> {
        self.send("tap", json!({ "x": x, "y": y })).await
    }

    pub async fn swipe(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        duration: Duration,
    ) -> Result<()> {
        self.send(
            "swipe",
            json!({
                "from_x": from.0,
                "from_y": from.1,
                "to_x": to.0,
                "to_y": to.1,
                "duration": duration.as_secs_f64(),
            }),
        )
        .await
    }

    /// Pinch around `center`; `scale` below 1 pinches in, above 1 out.
    pub async fn pinch(&self, center: (f64, f64), scale: f64, duration: Duration) -> Result<()> {
        self.send(
            "pinch",
            json!({
                "center_x": center.0,
                "center_y": center.1,
                "scale": scale,
                "duration": duration.as_secs_f64(),
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_combos() {
        let combo: KeyCombo = "ctrl+s".parse().unwrap();
        assert_eq!(combo.key, "s");
        assert_eq!(combo.modifiers, vec!["ctrl"]);

        let combo: KeyCombo = "space".parse().unwrap();
        assert_eq!(combo.key, "space");
        assert!(combo.modifiers.is_empty());

        let combo: KeyCombo = "ctrl + shift + z".parse().unwrap();
        assert_eq!(combo.modifiers, vec!["ctrl", "shift"]);
    }

    #[test]
    fn reject_empty_parts() {
        for bad in ["", "ctrl+", "+s", "ctrl++s"] {
            assert!(
                matches!(bad.parse::<KeyCombo>(), Err(Error::InvalidKey(_))),
                "{bad:?} should not parse"
            );
        }
    }
}
