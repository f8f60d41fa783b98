use std::time::Duration;

use client::{Client, ClientConfig, ClientError};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::input::Input;
use crate::node::Node;
use crate::wait;

/// How long `wait_for_node` and `wait_for_visible` wait by default.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between two attempts of a polling wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Extra time a server-side wait gets locally, so the remote reports its own
/// timeout before ours fires.
const SERVER_WAIT_GRACE: Duration = Duration::from_secs(5);

/// Automation handle for one running game.
///
/// Cheap to clone; clones share the connection.
#[derive(Debug, Clone)]
pub struct Godot {
    client: Client,
}

impl Godot {
    /// Connect to an already running game.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Client::new(config);
        client.connect().await?;
        Ok(Self::from_client(client))
    }

    /// Wrap a client. It does not need to be connected yet.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }

    /// Mouse, keyboard, action and touch input.
    pub fn input(&self) -> Input {
        Input::new(self.client.clone())
    }

    async fn call_raw(&self, method: &str, params: Option<Value>) -> Result<Value> {
        Ok(self.client.call(method, params).await?)
    }

    // Nodes

    /// Look up the node at `path`.
    ///
    /// Fails with [`ClientError::NotFound`] when the remote reports no such
    /// node.
    pub async fn get_node(&self, path: &str) -> Result<Node> {
        let data = self
            .call_raw("get_node", Some(json!({ "path": path })))
            .await?;
        if data.is_null() {
            return Err(ClientError::NotFound {
                path: path.to_string(),
            }
            .into());
        }
        Ok(Node::new(self.clone(), path.to_string(), data))
    }

    pub async fn get_property(&self, path: &str, property: &str) -> Result<Value> {
        let result = self
            .call_raw(
                "get_property",
                Some(json!({ "path": path, "property": property })),
            )
            .await?;
        Ok(field(result, "value"))
    }

    pub async fn set_property(&self, path: &str, property: &str, value: Value) -> Result<()> {
        self.call_raw(
            "set_property",
            Some(json!({ "path": path, "property": property, "value": value })),
        )
        .await?;
        Ok(())
    }

    /// Call `method` on the node at `path` and return its return value.
    pub async fn call(&self, path: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let result = self
            .call_raw(
                "call_method",
                Some(json!({ "path": path, "method": method, "args": args })),
            )
            .await?;
        Ok(field(result, "value"))
    }

    pub async fn node_exists(&self, path: &str) -> Result<bool> {
        let result = self
            .call_raw("node_exists", Some(json!({ "path": path })))
            .await?;
        Ok(result
            .get("exists")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Nodes whose path matches `pattern` (`*` wildcards allowed).
    pub async fn query_nodes(&self, pattern: &str) -> Result<Vec<Node>> {
        let result = self
            .call_raw("query_nodes", Some(json!({ "pattern": pattern })))
            .await?;

        let Value::Array(nodes) = field(result, "nodes") else {
            return Ok(Vec::new());
        };
        nodes
            .into_iter()
            .map(|data| {
                let path = data
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::unexpected("query_nodes", "node without a path"))?
                    .to_string();
                Ok(Node::new(self.clone(), path, data))
            })
            .collect()
    }

    pub async fn count_nodes(&self, pattern: &str) -> Result<u64> {
        let result = self
            .call_raw("count_nodes", Some(json!({ "pattern": pattern })))
            .await?;
        Ok(result.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    // Scenes and game state

    /// The scene tree, as the remote describes it.
    pub async fn get_tree(&self) -> Result<Value> {
        self.call_raw("get_tree", None).await
    }

    /// Resource path of the current scene, empty when there is none.
    pub async fn get_current_scene(&self) -> Result<String> {
        let result = self.call_raw("get_current_scene", None).await?;
        Ok(result
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    pub async fn change_scene(&self, scene_path: &str) -> Result<()> {
        self.call_raw("change_scene", Some(json!({ "path": scene_path })))
            .await?;
        Ok(())
    }

    pub async fn reload_scene(&self) -> Result<()> {
        self.call_raw("reload_scene", None).await?;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.call_raw("pause", None).await?;
        Ok(())
    }

    pub async fn unpause(&self) -> Result<()> {
        self.call_raw("unpause", None).await?;
        Ok(())
    }

    /// Scale game time: 1.0 is normal speed, 0.5 half speed.
    pub async fn set_time_scale(&self, scale: f64) -> Result<()> {
        self.call_raw("set_time_scale", Some(json!({ "scale": scale })))
            .await?;
        Ok(())
    }

    // Waiting

    /// Poll `check` until it returns a truthy value.
    pub async fn wait_for<T, F, Fut>(
        &self,
        timeout: Duration,
        interval: Duration,
        check: F,
    ) -> Result<T>
    where
        T: wait::Truthy,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        wait::wait_for("condition", timeout, interval, check).await
    }

    /// Poll `check` until it returns `expected`.
    pub async fn wait_until_eq<T, F, Fut>(
        &self,
        timeout: Duration,
        interval: Duration,
        expected: &T,
        check: F,
    ) -> Result<T>
    where
        T: PartialEq,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        wait::wait_until_eq("condition", timeout, interval, expected, check).await
    }

    /// Wait until the node at `path` exists.
    pub async fn wait_for_node(&self, path: &str, timeout: Duration) -> Result<Node> {
        let operation = format!("waiting for node '{path}'");
        wait::wait_for(&operation, timeout, DEFAULT_POLL_INTERVAL, move || {
            self.get_node(path)
        })
        .await
    }

    /// Wait until the node at `path` has `visible == true`.
    pub async fn wait_for_visible(&self, path: &str, timeout: Duration) -> Result<()> {
        let operation = format!("waiting for '{path}' to be visible");
        wait::wait_until_eq(
            &operation,
            timeout,
            DEFAULT_POLL_INTERVAL,
            &Value::Bool(true),
            move || self.get_property(path, "visible"),
        )
        .await?;
        Ok(())
    }

    /// Wait for `signal` to be emitted, optionally only by `source`.
    ///
    /// The wait happens on the remote side. It is given `timeout`; locally
    /// the call gets a few more seconds so the remote's own timeout is the
    /// one reported.
    pub async fn wait_for_signal(
        &self,
        signal: &str,
        source: Option<&str>,
        timeout: Duration,
    ) -> Result<Value> {
        let mut params = json!({
            "signal": signal,
            "timeout": timeout.as_millis() as u64,
        });
        if let Some(source) = source {
            params["source"] = json!(source);
        }

        Ok(self
            .client
            .send("wait_signal", Some(params), timeout + SERVER_WAIT_GRACE)
            .await?)
    }

    /// Wait for `count` rendered frames.
    pub async fn wait_frames(&self, count: u64) -> Result<()> {
        self.call_raw("wait_frames", Some(json!({ "count": count })))
            .await?;
        Ok(())
    }

    /// Wait for `seconds` of game time.
    pub async fn wait_seconds(&self, seconds: f64) -> Result<()> {
        let timeout = self.client.config().request_timeout
            + Duration::try_from_secs_f64(seconds).unwrap_or_default();
        self.client
            .send("wait_seconds", Some(json!({ "seconds": seconds })), timeout)
            .await?;
        Ok(())
    }
}

/// `result[name]`, or `Null` when the result is not an object or lacks it.
fn field(mut result: Value, name: &str) -> Value {
    result
        .get_mut(name)
        .map(Value::take)
        .unwrap_or(Value::Null)
}
