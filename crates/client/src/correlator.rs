//! Tracking pending requests and matching responses
//!
//! When a call is made it registers here and receives a fresh id. When a
//! response arrives it is matched by id and handed to the waiting caller.
//! Each entry is completed exactly once: whoever removes it from the map
//! (the receive loop, the caller's timeout or cancellation, or the
//! connection closing) is the only one who can complete it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use wire::RequestId;

use crate::error::ClientError;

/// Why a connection stopped carrying requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// The local side disconnected.
    Disconnected,
    /// The remote side closed the connection.
    RemoteClosed,
    /// The transport failed.
    Transport(String),
    /// The remote side sent a frame that could not be decoded.
    Malformed(String),
}

impl CloseReason {
    /// The error a pending or future call observes for this closure.
    pub(crate) fn to_error(&self) -> ClientError {
        match self {
            CloseReason::Malformed(detail) => ClientError::MalformedFrame(detail.clone()),
            other => ClientError::ConnectionClosed {
                reason: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Disconnected => write!(f, "client disconnected"),
            CloseReason::RemoteClosed => write!(f, "remote closed the connection"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
            CloseReason::Malformed(e) => write!(f, "malformed frame: {e}"),
        }
    }
}

/// The single outcome of a pending request.
#[derive(Debug)]
pub(crate) enum Completion {
    /// The remote returned a result.
    Success(Value),
    /// The remote reported an error.
    Remote { code: Option<i64>, message: String },
    /// The connection closed first.
    Closed(CloseReason),
}

struct State {
    next_id: RequestId,
    pending: HashMap<RequestId, oneshot::Sender<Completion>>,
    closed: Option<CloseReason>,
}

/// Id allocator and table of in-flight requests for one connection.
pub(crate) struct Correlator {
    state: Mutex<State>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self::starting_at(1)
    }

    fn starting_at(next_id: RequestId) -> Self {
        Self {
            state: Mutex::new(State {
                next_id,
                pending: HashMap::new(),
                closed: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next id and register a pending request for it.
    ///
    /// Fails once the correlator has been closed, so no request can be left
    /// waiting on a connection that will never answer.
    pub(crate) fn register(self: &Arc<Self>) -> Result<PendingRequest, ClientError> {
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut state = self.lock();
            if let Some(reason) = &state.closed {
                return Err(reason.to_error());
            }

            // Skip 0 and any id that is still in flight after a wraparound.
            let mut id = state.next_id;
            while id == 0 || state.pending.contains_key(&id) {
                id = id.wrapping_add(1);
            }
            state.next_id = id.wrapping_add(1);
            state.pending.insert(id, tx);
            id
        };

        Ok(PendingRequest {
            id,
            created: Instant::now(),
            rx,
            correlator: Arc::clone(self),
            done: false,
        })
    }

    /// Complete request `id` with a result.
    ///
    /// Returns `false` if there is no such pending request, or its caller has
    /// already given up on it.
    pub(crate) fn resolve(&self, id: RequestId, result: Value) -> bool {
        self.complete(id, Completion::Success(result))
    }

    /// Complete request `id` with a remote error.
    pub(crate) fn reject(&self, id: RequestId, code: Option<i64>, message: String) -> bool {
        self.complete(id, Completion::Remote { code, message })
    }

    fn complete(&self, id: RequestId, completion: Completion) -> bool {
        let Some(tx) = self.lock().pending.remove(&id) else {
            return false;
        };
        tx.send(completion).is_ok()
    }

    /// Remove request `id` without completing it.
    pub(crate) fn forget(&self, id: RequestId) {
        self.lock().pending.remove(&id);
    }

    /// Complete every pending request with `reason` and refuse new ones.
    ///
    /// Only the first call has an effect. Returns the number of requests
    /// that were failed.
    pub(crate) fn fail_all(&self, reason: CloseReason) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock();
            if state.closed.is_some() {
                return 0;
            }
            state.closed = Some(reason.clone());
            state.pending.drain().map(|(_, tx)| tx).collect()
        };

        let count = drained.len();
        for tx in drained {
            let _ = tx.send(Completion::Closed(reason.clone()));
        }
        count
    }

    /// Why the correlator was closed, if it was.
    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        self.lock().closed.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    /// Number of requests currently awaiting a response.
    pub(crate) fn len(&self) -> usize {
        self.lock().pending.len()
    }
}

/// One outstanding call.
///
/// Dropping it before it completed (timeout, cancellation of the caller)
/// deregisters it from the correlator.
pub(crate) struct PendingRequest {
    id: RequestId,
    created: Instant,
    rx: oneshot::Receiver<Completion>,
    correlator: Arc<Correlator>,
    done: bool,
}

impl PendingRequest {
    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    /// Time since the request was registered.
    pub(crate) fn elapsed(&self) -> std::time::Duration {
        self.created.elapsed()
    }

    /// Wait for the request to be completed.
    pub(crate) async fn wait(&mut self) -> Completion {
        let completion = match (&mut self.rx).await {
            Ok(completion) => completion,
            // The sender only disappears without sending if the correlator
            // itself was dropped.
            Err(_) => Completion::Closed(CloseReason::Disconnected),
        };
        self.done = true;
        completion
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.done {
            self.correlator.forget(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_across_threads() {
        let correlator = Arc::new(Correlator::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let correlator = Arc::clone(&correlator);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| {
                            let pending = correlator.register().unwrap();
                            let id = pending.id();
                            std::mem::forget(pending);
                            id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} handed out twice");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[tokio::test]
    async fn resolve_completes_once() {
        let correlator = Arc::new(Correlator::new());
        let mut pending = correlator.register().unwrap();
        let id = pending.id();

        assert!(correlator.resolve(id, json!(42)));
        assert!(!correlator.resolve(id, json!(43)));
        assert!(!correlator.reject(id, None, "late".to_string()));

        assert!(matches!(pending.wait().await, Completion::Success(v) if v == json!(42)));
        assert_eq!(correlator.len(), 0);
    }

    #[tokio::test]
    async fn reject_carries_code_and_message() {
        let correlator = Arc::new(Correlator::new());
        let mut pending = correlator.register().unwrap();

        correlator.reject(pending.id(), Some(-1), "no such node".to_string());

        assert!(matches!(
            pending.wait().await,
            Completion::Remote { code: Some(-1), message } if message == "no such node"
        ));
    }

    #[test]
    fn unknown_id_is_dropped() {
        let correlator = Correlator::new();
        assert!(!correlator.resolve(99, Value::Null));
    }

    #[test]
    fn dropping_pending_request_deregisters_it() {
        let correlator = Arc::new(Correlator::new());
        let pending = correlator.register().unwrap();
        let id = pending.id();
        assert_eq!(correlator.len(), 1);

        drop(pending);

        assert_eq!(correlator.len(), 0);
        assert!(!correlator.resolve(id, Value::Null));
    }

    #[tokio::test]
    async fn fail_all_completes_everything_and_closes() {
        let correlator = Arc::new(Correlator::new());
        let mut first = correlator.register().unwrap();
        let mut second = correlator.register().unwrap();

        assert_eq!(correlator.fail_all(CloseReason::RemoteClosed), 2);
        assert_eq!(correlator.fail_all(CloseReason::Disconnected), 0);

        for pending in [&mut first, &mut second] {
            assert!(matches!(
                pending.wait().await,
                Completion::Closed(CloseReason::RemoteClosed)
            ));
        }
        assert_eq!(correlator.close_reason(), Some(CloseReason::RemoteClosed));
        assert!(matches!(
            correlator.register(),
            Err(ClientError::ConnectionClosed { .. })
        ));
    }

    #[test]
    fn wraparound_skips_ids_still_pending() {
        let correlator = Arc::new(Correlator::starting_at(RequestId::MAX));

        let last = correlator.register().unwrap();
        assert_eq!(last.id(), RequestId::MAX);

        let wrapped = correlator.register().unwrap();
        assert_eq!(wrapped.id(), 1);

        {
            let mut state = correlator.lock();
            state.next_id = RequestId::MAX;
        }
        let skipped = correlator.register().unwrap();
        assert_eq!(skipped.id(), 2);
    }

    #[test]
    fn malformed_close_maps_to_malformed_error() {
        let reason = CloseReason::Malformed("bad prefix".to_string());
        assert!(matches!(reason.to_error(), ClientError::MalformedFrame(_)));
    }
}
