use serde_json::Value;

use crate::error::Result;
use crate::godot::Godot;
use crate::wait::Truthy;

/// A node in the running game's scene tree.
///
/// Holds the description the remote returned when the node was looked up;
/// property reads and calls always go to the remote.
#[derive(Debug, Clone)]
pub struct Node {
    godot: Godot,
    path: String,
    data: Value,
}

impl Node {
    pub(crate) fn new(godot: Godot, path: String, data: Value) -> Self {
        Self { godot, path, data }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The description returned by the lookup.
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    /// The node's class, e.g. `Button`.
    pub fn class(&self) -> Option<&str> {
        self.data.get("class").and_then(Value::as_str)
    }

    pub async fn get(&self, property: &str) -> Result<Value> {
        self.godot.get_property(&self.path, property).await
    }

    pub async fn set(&self, property: &str, value: Value) -> Result<()> {
        self.godot.set_property(&self.path, property, value).await
    }

    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.godot.call(&self.path, method, args).await
    }

    /// Whether the node still exists.
    pub async fn exists(&self) -> Result<bool> {
        self.godot.node_exists(&self.path).await
    }
}

impl Truthy for Node {
    fn is_truthy(&self) -> bool {
        true
    }
}
