// Line-delimited JSON messages exchanged over the control socket.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error message sent back for a line that is not valid JSON.
pub const INVALID_JSON: &str = "Invalid JSON";

/// Name carried by selection-change events.
pub const SELECTION_EVENT: &str = "selection";

/// A client request. `id` is echoed verbatim and may be any JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Request {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self { id: id.into(), method: method.into(), params }
    }
}

/// The reply to exactly one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self { id, ok: true, result: Some(result), error: None }
    }

    pub fn error(id: Value, message: impl Into<String>) -> Self {
        Self { id, ok: false, result: None, error: Some(message.into()) }
    }

    pub fn invalid_json() -> Self {
        Self::error(Value::Null, INVALID_JSON)
    }
}

/// An unsolicited push from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub event: String,
    pub data: Option<String>,
}

impl Event {
    pub fn selection(data: Option<String>) -> Self {
        Self { event: SELECTION_EVENT.to_string(), data }
    }

    pub fn is_selection(&self) -> bool {
        self.event == SELECTION_EVENT
    }
}

/// Anything a client may read from the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerMessage {
    Event(Event),
    Response(Response),
}

/// How the server should treat one decoded request line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A dispatchable request.
    Request { id: Value, method: String, params: Value },
    /// Valid JSON without a `method`; ignored without a response.
    Ignored,
    /// Not JSON at all.
    Malformed,
}

impl Frame {
    /// Decode one request line. Params are left as raw JSON so the
    /// dispatcher can reject non-object params with the request id intact.
    pub fn decode(line: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<Value>(line) else {
            return Self::Malformed;
        };
        let Value::Object(mut object) = value else {
            return Self::Ignored;
        };
        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Self::Ignored,
        };
        let id = object.remove("id").unwrap_or(Value::Null);
        let params = object.remove("params").unwrap_or(Value::Null);
        Self::Request { id, method, params }
    }
}
