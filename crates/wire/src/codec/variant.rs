//! Godot Variant payload codec for the binary debugger protocol.
//!
//! Each length-delimited frame carries one Variant-encoded `Array`. Messages
//! sent to the engine are `[name, data]`; messages from the engine are
//! `[name, thread_id, data]` (older engines omit the thread id). Calls and
//! their answers travel as:
//! ```text
//! ["playgodot:request",  [id, method, params]]
//! ["playgodot:response", tid, [id, result]]
//! ["playgodot:error",    tid, [id, code, message]]
//! ```
//! Every other message is surfaced as a notification named by its first
//! element.
//!
//! Values are mapped onto `serde_json::Value` so both codecs hand the same
//! result type to callers. Vectors decode to `{"x", "y"[, "z"]}` objects and
//! packed arrays to plain arrays.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::{Map, Number, Value};

use crate::error::CodecError;
use crate::frame::{Frame, Request, RequestId, request_id_of};

/// Message name of an outgoing call.
pub const REQUEST_MESSAGE: &str = "playgodot:request";
/// Message name of a successful answer.
pub const RESPONSE_MESSAGE: &str = "playgodot:response";
/// Message name of a failed answer.
pub const ERROR_MESSAGE: &str = "playgodot:error";

const TYPE_MASK: u32 = 0xFF;
const FLAG_64: u32 = 1 << 16;
const COUNT_MASK: u32 = 0x7FFF_FFFF;

/// Deepest container nesting accepted when decoding, as in the engine.
const MAX_DEPTH: usize = 512;

const NIL: u32 = 0;
const BOOL: u32 = 1;
const INT: u32 = 2;
const FLOAT: u32 = 3;
const STRING: u32 = 4;
const VECTOR2: u32 = 5;
const VECTOR3: u32 = 9;
const STRING_NAME: u32 = 21;
const DICTIONARY: u32 = 27;
const ARRAY: u32 = 28;
const PACKED_BYTE_ARRAY: u32 = 29;
const PACKED_INT32_ARRAY: u32 = 30;
const PACKED_INT64_ARRAY: u32 = 31;
const PACKED_FLOAT32_ARRAY: u32 = 32;
const PACKED_FLOAT64_ARRAY: u32 = 33;
const PACKED_STRING_ARRAY: u32 = 34;

// Typed container headers (2 bits per element kind).
const CONTAINER_TYPE_NONE: u32 = 0;
const CONTAINER_TYPE_BUILTIN: u32 = 1;

/// Thread id reported in frames produced by [`VariantCodec::encode_frame`].
const MAIN_THREAD_ID: i64 = 1;

/// Codec for Variant-encoded debugger messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariantCodec;

impl VariantCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }

    /// Encode a request as a `[REQUEST_MESSAGE, [id, method, params]]` message.
    pub fn encode_request(&self, request: &Request) -> Result<Bytes, CodecError> {
        let params = match &request.params {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params) => params.clone(),
        };
        let message = Value::Array(vec![
            Value::from(REQUEST_MESSAGE),
            Value::Array(vec![
                Value::from(request.id),
                Value::from(request.method.as_str()),
                params,
            ]),
        ]);
        encode_value(&message)
    }

    /// Decode one incoming message payload.
    pub fn decode(&self, payload: &[u8]) -> Result<Frame, CodecError> {
        let (name, data) = split_message(decode_value(payload)?)?;

        match name.as_str() {
            RESPONSE_MESSAGE => {
                let mut fields = into_fields(data, 2, RESPONSE_MESSAGE)?.into_iter();
                let id = request_id(fields.next())?;
                let result = fields.next().unwrap_or(Value::Null);
                Ok(Frame::Response { id, result })
            }
            ERROR_MESSAGE => {
                let mut fields = into_fields(data, 3, ERROR_MESSAGE)?.into_iter();
                let id = request_id(fields.next())?;
                let code = fields.next().and_then(|c| c.as_i64());
                let message = match fields.next() {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                Ok(Frame::ResponseError { id, code, message })
            }
            _ => Ok(Frame::Notification {
                name,
                payload: Some(data).filter(|d| !d.is_null()),
            }),
        }
    }

    /// Encode a frame the way the engine would send it.
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes, CodecError> {
        let (name, data) = match frame {
            Frame::Response { id, result } => (
                RESPONSE_MESSAGE.to_string(),
                Value::Array(vec![Value::from(*id), result.clone()]),
            ),
            Frame::ResponseError { id, code, message } => (
                ERROR_MESSAGE.to_string(),
                Value::Array(vec![
                    Value::from(*id),
                    code.map(Value::from).unwrap_or(Value::Null),
                    Value::from(message.as_str()),
                ]),
            ),
            Frame::Notification { name, payload } => {
                (name.clone(), payload.clone().unwrap_or(Value::Null))
            }
        };

        encode_value(&Value::Array(vec![
            Value::from(name),
            Value::from(MAIN_THREAD_ID),
            data,
        ]))
    }

    /// Decode a request the way the engine would receive it.
    pub fn decode_request(&self, payload: &[u8]) -> Result<Request, CodecError> {
        let (name, data) = split_message(decode_value(payload)?)?;
        if name != REQUEST_MESSAGE {
            return Err(CodecError::Malformed(format!(
                "expected {REQUEST_MESSAGE}, got {name}"
            )));
        }

        let mut fields = into_fields(data, 3, REQUEST_MESSAGE)?.into_iter();
        let id = request_id(fields.next())?;
        let method = match fields.next() {
            Some(Value::String(method)) => method,
            other => {
                return Err(CodecError::Malformed(format!(
                    "request method is not a string: {other:?}"
                )));
            }
        };
        let params = fields.next().filter(|p| !p.is_null());

        Ok(Request { id, method, params })
    }
}

fn split_message(message: Value) -> Result<(String, Value), CodecError> {
    let Value::Array(parts) = message else {
        return Err(CodecError::Malformed("message is not an array".to_string()));
    };

    let len = parts.len();
    if !(2..=3).contains(&len) {
        return Err(CodecError::Malformed(format!(
            "message has {len} elements, expected 2 or 3"
        )));
    }

    let mut parts = parts.into_iter();
    let Some(Value::String(name)) = parts.next() else {
        return Err(CodecError::Malformed("message name is not a string".to_string()));
    };
    // `[name, thread_id, data]` or `[name, data]`: data is always last.
    let data = parts.last().unwrap_or(Value::Null);
    Ok((name, data))
}

fn into_fields(data: Value, min: usize, message: &str) -> Result<Vec<Value>, CodecError> {
    match data {
        Value::Array(fields) if fields.len() >= min => Ok(fields),
        other => Err(CodecError::Malformed(format!(
            "{message} data must be an array of at least {min} elements, got {other}"
        ))),
    }
}

fn request_id(value: Option<Value>) -> Result<RequestId, CodecError> {
    value
        .as_ref()
        .and_then(request_id_of)
        .ok_or_else(|| CodecError::Malformed(format!("invalid request id {value:?}")))
}

/// Encode a JSON value as a Godot Variant.
pub fn encode_value(value: &Value) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    write_value(&mut buf, value)?;
    Ok(buf.freeze())
}

/// Decode a Godot Variant into a JSON value.
pub fn decode_value(payload: &[u8]) -> Result<Value, CodecError> {
    let mut reader = Reader::new(payload);
    reader.value()
}

fn write_value(buf: &mut BytesMut, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::Null => buf.put_u32_le(NIL),
        Value::Bool(b) => {
            buf.put_u32_le(BOOL);
            buf.put_u32_le(u32::from(*b));
        }
        Value::Number(n) => write_number(buf, n)?,
        Value::String(s) => {
            buf.put_u32_le(STRING);
            write_string(buf, s);
        }
        Value::Array(items) => {
            buf.put_u32_le(ARRAY);
            buf.put_u32_le(container_len(items.len())?);
            for item in items {
                write_value(buf, item)?;
            }
        }
        Value::Object(map) => {
            buf.put_u32_le(DICTIONARY);
            buf.put_u32_le(container_len(map.len())?);
            for (key, item) in map {
                buf.put_u32_le(STRING);
                write_string(buf, key);
                write_value(buf, item)?;
            }
        }
    }
    Ok(())
}

fn write_number(buf: &mut BytesMut, n: &Number) -> Result<(), CodecError> {
    if let Some(i) = n.as_i64() {
        if let Ok(small) = i32::try_from(i) {
            buf.put_u32_le(INT);
            buf.put_i32_le(small);
        } else {
            buf.put_u32_le(INT | FLAG_64);
            buf.put_i64_le(i);
        }
    } else if n.is_u64() {
        return Err(CodecError::Unencodable(format!(
            "{n} does not fit a 64-bit signed integer"
        )));
    } else if let Some(f) = n.as_f64() {
        buf.put_u32_le(FLOAT | FLAG_64);
        buf.put_f64_le(f);
    }
    Ok(())
}

fn write_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, padding(s.len()));
}

fn container_len(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len)
        .ok()
        .filter(|len| *len <= COUNT_MASK)
        .ok_or_else(|| CodecError::Unencodable(format!("container of {len} elements")))
}

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(needed)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::Truncated {
                offset: self.pos,
                needed,
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.array().map(i32::from_le_bytes)
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        self.array().map(i64::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32, CodecError> {
        self.array().map(f32::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        self.array().map(f64::from_le_bytes)
    }

    fn real(&mut self, wide: bool) -> Result<Value, CodecError> {
        let f = if wide { self.f64()? } else { f64::from(self.f32()?) };
        Ok(Value::from(f))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| CodecError::Malformed(format!("invalid UTF-8 in string: {e}")))?
            .to_string();
        self.take(padding(len))?;
        Ok(s)
    }

    /// Skip the element type description of a typed container.
    fn container_type(&mut self, kind: u32) -> Result<(), CodecError> {
        match kind {
            CONTAINER_TYPE_NONE => {}
            CONTAINER_TYPE_BUILTIN => {
                self.u32()?;
            }
            _ => {
                self.string()?;
            }
        }
        Ok(())
    }

    fn value(&mut self) -> Result<Value, CodecError> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::Malformed(format!(
                "containers nested deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let value = self.value_inner();
        self.depth -= 1;
        value
    }

    fn value_inner(&mut self) -> Result<Value, CodecError> {
        let header = self.u32()?;
        let wide = header & FLAG_64 != 0;

        match header & TYPE_MASK {
            NIL => Ok(Value::Null),
            BOOL => Ok(Value::Bool(self.u32()? != 0)),
            INT if wide => Ok(Value::from(self.i64()?)),
            INT => Ok(Value::from(self.i32()?)),
            FLOAT => self.real(wide),
            STRING | STRING_NAME => Ok(Value::String(self.string()?)),
            VECTOR2 => {
                let mut v = Map::new();
                v.insert("x".to_string(), self.real(wide)?);
                v.insert("y".to_string(), self.real(wide)?);
                Ok(Value::Object(v))
            }
            VECTOR3 => {
                let mut v = Map::new();
                v.insert("x".to_string(), self.real(wide)?);
                v.insert("y".to_string(), self.real(wide)?);
                v.insert("z".to_string(), self.real(wide)?);
                Ok(Value::Object(v))
            }
            DICTIONARY => {
                self.container_type((header >> 16) & 0b11)?;
                self.container_type((header >> 18) & 0b11)?;
                let count = self.u32()? & COUNT_MASK;
                let mut map = Map::new();
                for _ in 0..count {
                    let key = match self.value()? {
                        Value::String(key) => key,
                        other => other.to_string(),
                    };
                    let item = self.value()?;
                    map.insert(key, item);
                }
                Ok(Value::Object(map))
            }
            ARRAY => {
                self.container_type((header >> 16) & 0b11)?;
                let count = self.u32()? & COUNT_MASK;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.value()?);
                }
                Ok(Value::Array(items))
            }
            PACKED_BYTE_ARRAY => {
                let len = self.u32()? as usize;
                let bytes = self.take(len)?;
                let items = bytes.iter().map(|b| Value::from(*b)).collect();
                self.take(padding(len))?;
                Ok(Value::Array(items))
            }
            PACKED_INT32_ARRAY => self.packed(|r| r.i32().map(Value::from)),
            PACKED_INT64_ARRAY => self.packed(|r| r.i64().map(Value::from)),
            PACKED_FLOAT32_ARRAY => self.packed(|r| r.real(false)),
            PACKED_FLOAT64_ARRAY => self.packed(|r| r.real(true)),
            PACKED_STRING_ARRAY => self.packed(|r| r.string().map(Value::String)),
            other => Err(CodecError::UnsupportedVariant(other)),
        }
    }

    fn packed(
        &mut self,
        mut element: impl FnMut(&mut Self) -> Result<Value, CodecError>,
    ) -> Result<Value, CodecError> {
        let count = self.u32()? as usize;
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(element(self)?);
        }
        Ok(Value::Array(items))
    }
}
