//! One live connection: transport halves, correlator and background tasks.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wire::{FrameSink, Request, Transport, WireCodec};

use crate::correlator::{CloseReason, Completion, Correlator};
use crate::error::ClientError;
use crate::events::{EventReceiver, EventRegistry};
use crate::receive_loop;

/// Frames queued for the writer task before `send` has to wait.
const OUTGOING_CAPACITY: usize = 64;

/// How long closing the sink may take during shutdown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// A frame handed to the writer task, acknowledged once it has been written.
struct Outgoing {
    payload: Bytes,
    ack: oneshot::Sender<Result<(), CloseReason>>,
}

pub(crate) struct Connection {
    codec: WireCodec,
    correlator: Arc<Correlator>,
    events: Arc<EventRegistry>,
    outgoing: mpsc::Sender<Outgoing>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Cancelled once both tasks have been joined.
    stopped: CancellationToken,
}

impl Connection {
    /// Split `transport` and start the writer task and the receive loop.
    pub(crate) fn start(transport: impl Transport, codec: WireCodec) -> Self {
        let (sink, stream) = transport.into_split();
        let correlator = Arc::new(Correlator::new());
        let events = Arc::new(EventRegistry::new());
        let cancel = CancellationToken::new();
        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);

        let writer = spawn_writer_task(
            sink,
            outgoing_rx,
            Arc::clone(&correlator),
            cancel.clone(),
        );
        let reader = receive_loop::spawn(
            stream,
            codec,
            Arc::clone(&correlator),
            Arc::clone(&events),
            cancel.clone(),
        );

        Self {
            codec,
            correlator,
            events,
            outgoing,
            cancel,
            tasks: Mutex::new(vec![reader, writer]),
            stopped: CancellationToken::new(),
        }
    }

    /// Whether the connection can still carry requests.
    pub(crate) fn is_open(&self) -> bool {
        !self.correlator.is_closed() && !self.cancel.is_cancelled()
    }

    pub(crate) fn pending_requests(&self) -> usize {
        self.correlator.len()
    }

    pub(crate) fn subscribe(&self, name: &str) -> EventReceiver {
        self.events.subscribe(name)
    }

    pub(crate) fn subscribe_all(&self) -> EventReceiver {
        self.events.subscribe_all()
    }

    fn close_reason(&self) -> CloseReason {
        self.correlator
            .close_reason()
            .unwrap_or(CloseReason::Disconnected)
    }

    /// Issue one request and wait for its single outcome.
    pub(crate) async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let mut pending = self.correlator.register()?;
        let id = pending.id();

        let request = Request::new(id, method, params);
        let payload = self
            .codec
            .encode_request(&request)
            .map_err(ClientError::Encode)?;
        tracing::debug!(id, %method, "sending request");

        let outcome = tokio::time::timeout(timeout, async {
            let (ack, written) = oneshot::channel();
            if self.outgoing.send(Outgoing { payload, ack }).await.is_err() {
                return Completion::Closed(self.close_reason());
            }
            match written.await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => return Completion::Closed(reason),
                Err(_) => return Completion::Closed(self.close_reason()),
            }
            pending.wait().await
        })
        .await;

        match outcome {
            Ok(Completion::Success(result)) => {
                tracing::debug!(id, elapsed = ?pending.elapsed(), "request completed");
                Ok(result)
            }
            Ok(Completion::Remote { code, message }) => Err(ClientError::Remote {
                method: method.to_string(),
                code,
                message,
            }),
            Ok(Completion::Closed(reason)) => Err(reason.to_error()),
            Err(_) => {
                tracing::debug!(id, %method, ?timeout, "request timed out");
                Err(ClientError::RequestTimeout {
                    operation: method.to_string(),
                    timeout,
                })
            }
        }
        // `pending` is dropped here; if it never completed it is deregistered.
    }

    /// Fail pending requests, stop both tasks and wait for them to finish.
    ///
    /// Safe to call more than once and from several callers at the same time.
    pub(crate) async fn shutdown(&self) {
        let failed = self.correlator.fail_all(CloseReason::Disconnected);
        if failed > 0 {
            tracing::debug!(failed, "failed pending requests on disconnect");
        }
        self.cancel.cancel();

        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if tasks.is_empty() {
            // Another caller took the handles; wait for it to finish joining.
            self.stopped.cancelled().await;
            return;
        }

        let _stopped = self.stopped.clone().drop_guard();
        for handle in tasks {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "connection task panicked");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_writer_task(
    mut sink: FrameSink,
    mut outgoing: mpsc::Receiver<Outgoing>,
    correlator: Arc<Correlator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Outgoing { payload, ack } = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("writer task cancelled");
                    break;
                }
                next = outgoing.recv() => match next {
                    Some(next) => next,
                    None => break,
                },
            };

            let len = payload.len();
            let written = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("writer task cancelled mid-write");
                    break;
                }
                written = sink.send(payload) => written,
            };

            match written {
                Ok(()) => {
                    tracing::trace!(len, "frame written");
                    let _ = ack.send(Ok(()));
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to write frame");
                    let reason = CloseReason::Transport(e.to_string());
                    correlator.fail_all(reason.clone());
                    let _ = ack.send(Err(reason));
                    cancel.cancel();
                    break;
                }
            }
        }

        match tokio::time::timeout(CLOSE_GRACE, sink.close()).await {
            Ok(Ok(())) => tracing::debug!("transport closed"),
            Ok(Err(e)) => tracing::debug!(error = %e, "error closing transport"),
            Err(_) => tracing::debug!("timed out closing transport"),
        }
    })
}
