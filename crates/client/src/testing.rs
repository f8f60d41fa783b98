//! A scripted stand-in for the Godot side of a connection.
//!
//! [`StubRemote`] decodes each incoming request, records it, and answers
//! according to a handler closure. It can also push notifications and close
//! the connection on demand.
//!
//! ```ignore
//! use client::testing::{Reply, connect_stub};
//! use client::Protocol;
//!
//! let (client, remote) = connect_stub(Protocol::Text, |request| match request.method.as_str() {
//!     "get_property" => Reply::Result(json!({"value": 42})),
//!     _ => Reply::Error { code: None, message: "unknown method".into() },
//! })
//! .await;
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wire::testing::{MemoryTransport, websocket_pair};
use wire::{Frame, Request, RequestId, Transport, WireCodec};

use crate::client::Client;
use crate::config::{ClientConfig, Protocol};

/// How the stub answers one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with a result.
    Result(Value),
    /// Answer with an error.
    Error {
        code: Option<i64>,
        message: String,
    },
    /// Never answer.
    Silent,
    /// Answer after a delay, without holding up other requests.
    Delayed(Duration, Box<Reply>),
    /// Close the connection instead of answering.
    Close,
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            code: None,
            message: message.into(),
        }
    }

    pub fn delayed(delay: Duration, reply: Reply) -> Self {
        Reply::Delayed(delay, Box::new(reply))
    }
}

/// The remote end of an in-memory connection.
pub struct StubRemote {
    requests: Arc<Mutex<Vec<Request>>>,
    outbox: mpsc::UnboundedSender<Frame>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StubRemote {
    /// Serve `transport`, answering each request with `handler`.
    pub fn spawn<F>(transport: impl Transport, codec: WireCodec, mut handler: F) -> Self
    where
        F: FnMut(&Request) -> Reply + Send + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (outbox, mut outbox_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let requests = Arc::clone(&requests);
            let outbox = outbox.clone();
            let cancel = cancel.clone();
            async move {
                let (mut sink, mut stream) = transport.into_split();
                loop {
                    tokio::select! {
                        biased;
                        Some(frame) = outbox_rx.recv() => {
                            let payload = match codec.encode_frame(&frame) {
                                Ok(payload) => payload,
                                Err(e) => {
                                    tracing::warn!(error = %e, "stub could not encode frame");
                                    continue;
                                }
                            };
                            if sink.send(payload).await.is_err() {
                                break;
                            }
                        }
                        _ = cancel.cancelled() => break,
                        next = stream.next() => {
                            let Some(Ok(payload)) = next else { break };
                            let request = match codec.decode_request(&payload) {
                                Ok(request) => request,
                                Err(e) => {
                                    tracing::warn!(error = %e, "stub received undecodable request");
                                    continue;
                                }
                            };
                            let reply = handler(&request);
                            let id = request.id;
                            requests
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .push(request);
                            dispatch(id, reply, &outbox, &cancel);
                        }
                    }
                }
                tracing::debug!("stub remote closing");
                let _ = sink.close().await;
            }
        });

        Self {
            requests,
            outbox,
            cancel,
            handle,
        }
    }

    /// Push a notification to the client.
    pub fn notify(&self, name: &str, payload: Option<Value>) {
        let _ = self.outbox.send(Frame::Notification {
            name: name.to_string(),
            payload,
        });
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Methods received so far, in arrival order.
    pub fn methods(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.method).collect()
    }

    /// Close the connection from the remote side and wait until it is closed.
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

fn dispatch(
    id: RequestId,
    reply: Reply,
    outbox: &mpsc::UnboundedSender<Frame>,
    cancel: &CancellationToken,
) {
    match reply {
        Reply::Result(result) => {
            let _ = outbox.send(Frame::Response { id, result });
        }
        Reply::Error { code, message } => {
            let _ = outbox.send(Frame::ResponseError { id, code, message });
        }
        Reply::Silent => {}
        Reply::Close => cancel.cancel(),
        Reply::Delayed(delay, reply) => {
            let outbox = outbox.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                dispatch(id, *reply, &outbox, &cancel);
            });
        }
    }
}

/// Connect a client for `protocol` to a stub remote over an in-memory
/// transport.
pub async fn connect_stub<F>(protocol: Protocol, handler: F) -> (Client, StubRemote)
where
    F: FnMut(&Request) -> Reply + Send + 'static,
{
    connect_stub_with(
        ClientConfig {
            protocol,
            ..ClientConfig::default()
        },
        handler,
    )
    .await
}

/// Like [`connect_stub`] with a full configuration.
pub async fn connect_stub_with<F>(config: ClientConfig, handler: F) -> (Client, StubRemote)
where
    F: FnMut(&Request) -> Reply + Send + 'static,
{
    let protocol = config.protocol;
    let client = Client::new(config);

    let remote = match protocol {
        Protocol::Text => {
            let (local, remote) = websocket_pair().await;
            client.connect_with(local);
            StubRemote::spawn(remote, WireCodec::json_rpc(), handler)
        }
        Protocol::Binary => {
            let (local, remote) = MemoryTransport::pair();
            client.connect_with(local);
            StubRemote::spawn(remote, WireCodec::variant(), handler)
        }
    };

    (client, remote)
}
