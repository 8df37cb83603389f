//! JSON-RPC 1.0 message shapes.
//!
//! Every message is a JSON object. Requests carry `method`, `params`, `id`;
//! responses carry `result`, `error`, `id`. A server-initiated call is any
//! inbound object with a `method`; its `id` is null for pure notifications.

use serde_json::{Value, json};

use super::RpcError;

/// An outbound request.
#[derive(Clone, Debug)]
pub struct Request {
    pub id: u64,
    pub method: &'static str,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Vec<Value>) -> Self {
        Request { id, method, params }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "method": self.method,
            "params": self.params,
        })
    }
}

/// Builds the wire reply to a server-initiated call.
pub fn response_json(id: &Value, result: Value, error: Value) -> Value {
    json!({
        "id": id,
        "result": result,
        "error": error,
    })
}

/// A classified inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A reply to one of our requests.
    Response {
        id: u64,
        result: Value,
        error: Value,
    },
    /// A server-initiated call or notification.
    Call {
        id: Value,
        method: String,
        params: Vec<Value>,
    },
}

impl Inbound {
    /// Splits an inbound object into response vs server call. A message with
    /// a `method` is a call regardless of its id; anything else must carry
    /// the id of a pending request plus a `result`/`error` pair.
    pub fn classify(message: Value) -> Result<Inbound, RpcError> {
        let Value::Object(object) = message else {
            return Err(RpcError::parsing(format!(
                "inbound message is not an object: {message}"
            )));
        };

        if let Some(method) = object.get("method").and_then(Value::as_str) {
            let method = method.to_string();
            let params = match object.get("params") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(params)) => params.clone(),
                Some(other) => {
                    return Err(RpcError::parsing(format!(
                        "params of {method} is not an array: {other}"
                    )));
                }
            };
            let id = object.get("id").cloned().unwrap_or(Value::Null);
            return Ok(Inbound::Call { id, method, params });
        }

        let id = object
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::parsing("response is missing a numeric id"))?;
        if !object.contains_key("result") && !object.contains_key("error") {
            return Err(RpcError::parsing(format!(
                "response {id} carries neither result nor error"
            )));
        }
        Ok(Inbound::Response {
            id,
            result: object.get("result").cloned().unwrap_or(Value::Null),
            error: object.get("error").cloned().unwrap_or(Value::Null),
        })
    }
}
