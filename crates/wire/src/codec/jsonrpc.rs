//! Textual JSON-RPC style codec.
//!
//! Used over a message-oriented socket, so one message is always one frame:
//! ```text
//! request:      {"jsonrpc":"2.0","id":1,"method":"get_node","params":{...}}
//! response:     {"id":1,"result":...}
//! error:        {"id":1,"error":{"code":-32000,"message":"..."}}
//! notification: {"method":"name","params":...}  or  {"event":"name","payload":...}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;
use crate::frame::{Frame, Request, RequestId, request_id_of};

/// Protocol version tag carried by every outgoing message.
pub const PROTOCOL_TAG: &str = "2.0";

const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'static str,
    id: RequestId,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Deserialize)]
struct IncomingRequest {
    id: RequestId,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// Codec for the textual protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcCodec;

impl JsonRpcCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }

    /// Encode a request. Absent or empty-object params are omitted.
    pub fn encode_request(&self, request: &Request) -> Result<Bytes, CodecError> {
        let params = request
            .params
            .as_ref()
            .filter(|p| !matches!(p, Value::Object(m) if m.is_empty()) && !p.is_null());

        let wire = WireRequest {
            jsonrpc: PROTOCOL_TAG,
            id: request.id,
            method: &request.method,
            params,
        };
        serde_json::to_vec(&wire)
            .map(Bytes::from)
            .map_err(CodecError::JsonSerialize)
    }

    /// Decode one incoming message.
    pub fn decode(&self, payload: &[u8]) -> Result<Frame, CodecError> {
        let value: Value = serde_json::from_slice(payload).map_err(CodecError::JsonDeserialize)?;
        let Value::Object(mut object) = value else {
            return Err(CodecError::Malformed("message is not a JSON object".to_string()));
        };

        match object.get("id") {
            Some(Value::Null) | None => decode_notification(object),
            Some(id) => {
                let id = request_id_of(id)
                    .ok_or_else(|| CodecError::Malformed(format!("invalid request id {id}")))?;

                if let Some(error) = object.remove("error") {
                    let (code, message) = decode_error(error);
                    Ok(Frame::ResponseError { id, code, message })
                } else {
                    let result = object.remove("result").unwrap_or(Value::Null);
                    Ok(Frame::Response { id, result })
                }
            }
        }
    }

    /// Encode a frame the way the remote side would send it.
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes, CodecError> {
        let mut object = Map::new();
        object.insert("jsonrpc".to_string(), Value::from(PROTOCOL_TAG));

        match frame {
            Frame::Response { id, result } => {
                object.insert("id".to_string(), Value::from(*id));
                object.insert("result".to_string(), result.clone());
            }
            Frame::ResponseError { id, code, message } => {
                let mut error = Map::new();
                if let Some(code) = code {
                    error.insert("code".to_string(), Value::from(*code));
                }
                error.insert("message".to_string(), Value::from(message.as_str()));
                object.insert("id".to_string(), Value::from(*id));
                object.insert("error".to_string(), Value::Object(error));
            }
            Frame::Notification { name, payload } => {
                object.insert("method".to_string(), Value::from(name.as_str()));
                if let Some(payload) = payload {
                    object.insert("params".to_string(), payload.clone());
                }
            }
        }

        serde_json::to_vec(&Value::Object(object))
            .map(Bytes::from)
            .map_err(CodecError::JsonSerialize)
    }

    /// Decode a request the way the remote side would receive it.
    pub fn decode_request(&self, payload: &[u8]) -> Result<Request, CodecError> {
        let incoming: IncomingRequest =
            serde_json::from_slice(payload).map_err(CodecError::JsonDeserialize)?;
        Ok(Request {
            id: incoming.id,
            method: incoming.method,
            params: incoming.params,
        })
    }
}

fn decode_notification(mut object: Map<String, Value>) -> Result<Frame, CodecError> {
    let (name, payload) = if let Some(Value::String(name)) = object.remove("method") {
        (name, object.remove("params"))
    } else if let Some(Value::String(name)) = object.remove("event") {
        let payload = object.remove("payload").or_else(|| object.remove("data"));
        (name, payload)
    } else {
        return Err(CodecError::Malformed(
            "message has neither an id nor an event name".to_string(),
        ));
    };

    Ok(Frame::Notification {
        name,
        payload: payload.filter(|p| !p.is_null()),
    })
}

fn decode_error(error: Value) -> (Option<i64>, String) {
    match error {
        Value::String(message) => (None, message),
        Value::Object(error) => {
            let code = error.get("code").and_then(error_code);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_ERROR)
                .to_string();
            (code, message)
        }
        other => (None, other.to_string()),
    }
}

/// Error codes can arrive as floats for the same reason ids can.
fn error_code(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        let f = value.as_f64()?;
        (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
    })
}
