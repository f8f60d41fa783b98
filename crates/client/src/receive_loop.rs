//! The background task that reads frames and routes them.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wire::{CodecError, Frame, FrameStream, TransportError, WireCodec};

use crate::correlator::{CloseReason, Correlator};
use crate::events::{Event, EventRegistry};

/// Spawn the receive loop for one connection.
///
/// The task ends exactly once, when the stream ends, a frame cannot be
/// decoded, or `cancel` fires. On the way out it fails every pending
/// request, ends every event subscription and cancels `cancel` so the rest
/// of the connection shuts down too.
pub(crate) fn spawn(
    stream: FrameStream,
    codec: WireCodec,
    correlator: Arc<Correlator>,
    events: Arc<EventRegistry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = run(stream, codec, &correlator, &events, &cancel).await;

        let failed = correlator.fail_all(reason.clone());
        events.close();
        cancel.cancel();
        tracing::debug!(%reason, failed, "receive loop stopped");
    })
}

async fn run(
    mut stream: FrameStream,
    codec: WireCodec,
    correlator: &Correlator,
    events: &EventRegistry,
    cancel: &CancellationToken,
) -> CloseReason {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("receive loop cancelled");
                return CloseReason::Disconnected;
            }
            next = stream.next() => next,
        };

        let payload = match next {
            Some(Ok(payload)) => payload,
            Some(Err(TransportError::Codec(e))) if !matches!(e, CodecError::Io(_)) => {
                tracing::error!(error = %e, "invalid framing from remote");
                return CloseReason::Malformed(e.to_string());
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "transport error");
                return CloseReason::Transport(e.to_string());
            }
            None => {
                tracing::debug!("transport closed");
                return CloseReason::RemoteClosed;
            }
        };

        match codec.decode(&payload) {
            Ok(frame) => route(frame, correlator, events),
            Err(e) => {
                tracing::error!(error = %e, len = payload.len(), "could not decode frame");
                return CloseReason::Malformed(e.to_string());
            }
        }
    }
}

fn route(frame: Frame, correlator: &Correlator, events: &EventRegistry) {
    match frame {
        Frame::Response { id, result } => {
            tracing::debug!(id, "received response");
            if !correlator.resolve(id, result) {
                tracing::debug!(id, "dropping response for unknown or abandoned request");
            }
        }
        Frame::ResponseError { id, code, message } => {
            tracing::debug!(id, ?code, %message, "received error response");
            if !correlator.reject(id, code, message) {
                tracing::debug!(id, "dropping error for unknown or abandoned request");
            }
        }
        Frame::Notification { name, payload } => {
            let delivered = events.dispatch(Event {
                name: name.clone(),
                payload,
            });
            tracing::debug!(%name, delivered, "received notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use serde_json::json;

    fn stream_of(items: Vec<Result<Bytes, TransportError>>) -> FrameStream {
        Box::pin(stream::iter(items))
    }

    fn encode(frame: Frame) -> Result<Bytes, TransportError> {
        Ok(WireCodec::json_rpc().encode_frame(&frame).unwrap())
    }

    #[tokio::test]
    async fn routes_responses_and_notifications() {
        let correlator = Arc::new(Correlator::new());
        let events = Arc::new(EventRegistry::new());
        let mut pending = correlator.register().unwrap();
        let mut ready = events.subscribe("ready");

        let stream = stream_of(vec![
            encode(Frame::Notification {
                name: "ready".to_string(),
                payload: None,
            }),
            encode(Frame::Response {
                id: pending.id(),
                result: json!(42),
            }),
        ]);
        let reason = run(
            stream,
            WireCodec::json_rpc(),
            &correlator,
            &events,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(reason, CloseReason::RemoteClosed);
        assert_eq!(ready.recv().await.unwrap().name, "ready");
        assert!(matches!(
            pending.wait().await,
            crate::correlator::Completion::Success(v) if v == json!(42)
        ));
    }

    #[tokio::test]
    async fn undecodable_frame_is_fatal() {
        let correlator = Arc::new(Correlator::new());
        let events = Arc::new(EventRegistry::new());

        let stream = stream_of(vec![
            Ok(Bytes::from_static(b"not json")),
            encode(Frame::Response {
                id: 1,
                result: json!(1),
            }),
        ]);
        let reason = run(
            stream,
            WireCodec::json_rpc(),
            &correlator,
            &events,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(reason, CloseReason::Malformed(_)));
    }

    #[tokio::test]
    async fn oversized_frame_is_malformed_but_io_error_is_transport() {
        let correlator = Arc::new(Correlator::new());
        let events = Arc::new(EventRegistry::new());

        let too_large = TransportError::Codec(CodecError::FrameTooLarge { size: 10, max: 1 });
        let reason = run(
            stream_of(vec![Err(too_large)]),
            WireCodec::variant(),
            &correlator,
            &events,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(reason, CloseReason::Malformed(_)));

        let reset = TransportError::Codec(CodecError::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        let reason = run(
            stream_of(vec![Err(reset)]),
            WireCodec::variant(),
            &correlator,
            &events,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(reason, CloseReason::Transport(_)));
    }

    #[tokio::test]
    async fn spawned_loop_fails_pending_and_closes_events() {
        let correlator = Arc::new(Correlator::new());
        let events = Arc::new(EventRegistry::new());
        let cancel = CancellationToken::new();
        let mut pending = correlator.register().unwrap();
        let mut all = events.subscribe_all();

        spawn(
            stream_of(vec![]),
            WireCodec::json_rpc(),
            Arc::clone(&correlator),
            Arc::clone(&events),
            cancel.clone(),
        )
        .await
        .unwrap();

        assert!(matches!(
            pending.wait().await,
            crate::correlator::Completion::Closed(CloseReason::RemoteClosed)
        ));
        assert!(all.recv().await.is_none());
        assert!(cancel.is_cancelled());
    }
}
