//! Logical message types shared by both wire codecs.
//!
//! A [`Request`] is what the client sends. A [`Frame`] is what a codec
//! produces from incoming bytes: either the answer to a request, identified
//! by its id, or an unsolicited [`Frame::Notification`].

use serde_json::Value;

/// Identifier used to correlate a request with its response.
pub type RequestId = u64;

/// Read a request id echoed back by the remote.
///
/// Godot's JSON parser turns every number into a float, so an id sent as
/// `1` may come back as `1.0`. Integral floats in range are accepted.
pub(crate) fn request_id_of(value: &Value) -> Option<RequestId> {
    if let Some(id) = value.as_u64() {
        return Some(id);
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64).then_some(f as u64)
}

/// An outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id, unique within one connection.
    pub id: RequestId,
    /// Remote method name.
    pub method: String,
    /// Method parameters, usually an object.
    pub params: Option<Value>,
}

impl Request {
    /// Create a new request.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// A decoded incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Successful answer to request `id`.
    Response {
        /// Id of the request this answers.
        id: RequestId,
        /// The result value (`Null` when the remote sent none).
        result: Value,
    },
    /// Failed answer to request `id`.
    ResponseError {
        /// Id of the request this answers.
        id: RequestId,
        /// Optional numeric error code.
        code: Option<i64>,
        /// Human readable error message.
        message: String,
    },
    /// Unsolicited event pushed by the remote side.
    Notification {
        /// Event name.
        name: String,
        /// Optional event payload.
        payload: Option<Value>,
    },
}

impl Frame {
    /// The request id this frame answers, if it is a response.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Frame::Response { id, .. } | Frame::ResponseError { id, .. } => Some(*id),
            Frame::Notification { .. } => None,
        }
    }
}
