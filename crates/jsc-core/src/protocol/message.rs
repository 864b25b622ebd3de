//! The three message shapes that share one line-delimited JSON stream.
//!
//! Classification is structural, not tagged:
//!
//! | keys present                    | shape        |
//! |---------------------------------|--------------|
//! | `method` + `params`             | Call         |
//! | `result` and/or `error`         | Response     |
//! | `id: null` + one stream key     | Notification |

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::FrameError;
use super::error::RpcError;

/// Byte stream carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
    Stdin,
}

impl Stream {
    pub const ALL: [Stream; 3] = [Stream::Stdout, Stream::Stderr, Stream::Stdin];

    /// JSON key used on the wire.
    pub fn key(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
            Stream::Stdin => "stdin",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub result: Value,
    pub error: Option<RpcError>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn err(id: u64, error: RpcError) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(error),
        }
    }

    /// Tagged view: application error vs result value.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub stream: Stream,
    pub data: String,
}

impl Notification {
    pub fn new(stream: Stream, data: impl Into<String>) -> Self {
        Self {
            stream,
            data: data.into(),
        }
    }
}

/// One wire unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call(Call),
    Response(Response),
    Notification(Notification),
}

impl Message {
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        match self {
            Message::Call(call) => {
                obj.insert("id".into(), Value::from(call.id));
                obj.insert("method".into(), Value::from(call.method.clone()));
                obj.insert("params".into(), call.params.clone());
            }
            Message::Response(resp) => {
                obj.insert("id".into(), Value::from(resp.id));
                obj.insert("result".into(), resp.result.clone());
                let error = match &resp.error {
                    Some(err) => serde_json::json!({"code": err.code, "message": err.message}),
                    None => Value::Null,
                };
                obj.insert("error".into(), error);
            }
            Message::Notification(notif) => {
                obj.insert("id".into(), Value::Null);
                obj.insert(notif.stream.key().into(), Value::from(notif.data.clone()));
            }
        }
        Value::Object(obj)
    }

    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let Value::Object(mut obj) = value else {
            return Err(FrameError::Shape("message is not a JSON object".into()));
        };

        if obj.contains_key("method") {
            let id = take_id(&mut obj)?;
            let method = match obj.remove("method") {
                Some(Value::String(m)) => m,
                _ => return Err(FrameError::Shape("call method must be a string".into())),
            };
            let params = obj
                .remove("params")
                .ok_or_else(|| FrameError::Shape(format!("call {method} has no params")))?;
            return Ok(Message::Call(Call { id, method, params }));
        }

        if obj.contains_key("result") || obj.contains_key("error") {
            let id = take_id(&mut obj)?;
            let result = obj.remove("result").unwrap_or(Value::Null);
            let error = match obj.remove("error") {
                None | Some(Value::Null) => None,
                Some(err) => Some(
                    serde_json::from_value::<RpcError>(err)
                        .map_err(|e| FrameError::Shape(format!("malformed error object: {e}")))?,
                ),
            };
            return Ok(Message::Response(Response { id, result, error }));
        }

        match obj.remove("id") {
            Some(Value::Null) => {}
            _ => {
                return Err(FrameError::Shape(
                    "message is neither call, response nor notification".into(),
                ));
            }
        }
        let mut found = Stream::ALL
            .into_iter()
            .filter_map(|stream| obj.remove(stream.key()).map(|data| (stream, data)));
        let (stream, data) = found
            .next()
            .ok_or_else(|| FrameError::Shape("notification carries no stream".into()))?;
        if found.next().is_some() {
            return Err(FrameError::Shape(
                "notification carries more than one stream".into(),
            ));
        }
        match data {
            Value::String(data) => Ok(Message::Notification(Notification { stream, data })),
            _ => Err(FrameError::Shape(format!(
                "{} payload must be a string",
                stream.key()
            ))),
        }
    }
}

fn take_id(obj: &mut Map<String, Value>) -> Result<u64, FrameError> {
    obj.remove("id")
        .and_then(|id| id.as_u64())
        .ok_or_else(|| FrameError::Shape("id must be a non-negative integer".into()))
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Message::from_value(value).map_err(de::Error::custom)
    }
}

impl From<Call> for Message {
    fn from(call: Call) -> Self {
        Message::Call(call)
    }
}

impl From<Response> for Message {
    fn from(resp: Response) -> Self {
        Message::Response(resp)
    }
}

impl From<Notification> for Message {
    fn from(notif: Notification) -> Self {
        Message::Notification(notif)
    }
}
