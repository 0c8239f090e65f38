//! Wire message shapes and inbound classification.
//!
//! Outbound commands are `{id, method, params}`. Inbound messages carry
//! either an `id` (a command response, routed to the correlator) or a
//! `method` with no `id` (a notification, routed to the event router).
//! Anything else is malformed and reported as a [`ClientError::Format`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// An outbound command frame.
#[derive(Clone, Debug, Serialize)]
pub struct OutboundCommand {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// Error object attached to a failed command response. Only `message` is
/// guaranteed on the wire.
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A classified inbound message.
#[derive(Debug)]
pub enum Inbound {
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<RemoteError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

/// Structured decode of one raw frame.
pub fn classify(raw: &str) -> Result<Inbound, ClientError> {
    let json: Value = serde_json::from_str(raw)
        .map_err(|err| ClientError::format(format!("not valid JSON: {err}")))?;

    if let Some(id) = json.get("id").and_then(Value::as_u64) {
        // An error field that is present but undecodable must not demote the
        // response to a bare success.
        let error = match json.get("error") {
            Some(raw) => Some(serde_json::from_value(raw.clone()).map_err(|err| {
                ClientError::format(format!("malformed error object: {err}"))
            })?),
            None => None,
        };
        return Ok(Inbound::Response {
            id,
            result: json.get("result").cloned(),
            error,
        });
    }

    if let Some(method) = json.get("method").and_then(Value::as_str) {
        let params = json.get("params").cloned().unwrap_or(Value::Null);
        return Ok(Inbound::Notification {
            method: method.to_string(),
            params,
        });
    }

    Err(ClientError::format("payload has neither id nor method"))
}
