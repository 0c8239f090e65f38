//! Typed notification payloads and the handlers that feed the aggregators.
//!
//! Each known notification kind gets a serde struct with explicit required
//! fields; a payload that fails to decode is logged and dropped without
//! disturbing the dispatch loop or subsequent notifications.

use std::collections::HashMap;
use std::sync::Arc;

use console_tap::{ConsoleCalledParams, ConsoleTap, ExceptionThrownParams, RemoteObject};
use network_tap::{NetworkTap, TapEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::router::NotificationHandler;

pub const CONSOLE_API_CALLED: &str = "Runtime.consoleAPICalled";
pub const EXCEPTION_THROWN: &str = "Runtime.exceptionThrown";
pub const REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";
pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";
pub const LOADING_FINISHED: &str = "Network.loadingFinished";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSentParams {
    request_id: String,
    request: RequestPayload,
    #[serde(default)]
    wall_time: Option<f64>,
    timestamp: f64,
    #[serde(rename = "type", default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestPayload {
    url: String,
    method: String,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseReceivedParams {
    request_id: String,
    response: ResponsePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePayload {
    status: i64,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(default)]
    encoded_data_length: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFinishedParams {
    request_id: String,
    #[serde(default)]
    encoded_data_length: u64,
}

/// Routes console-call and exception notifications into the console tap.
pub struct ConsoleRoute {
    tap: Arc<ConsoleTap>,
}

impl ConsoleRoute {
    pub fn new(tap: Arc<ConsoleTap>) -> Self {
        Self { tap }
    }
}

impl NotificationHandler for ConsoleRoute {
    fn on_notification(&self, method: &str, params: &Value) {
        match method {
            CONSOLE_API_CALLED => {
                match serde_json::from_value::<ConsoleCalledParams>(params.clone()) {
                    Ok(payload) => {
                        self.tap.ingest_console_call(payload);
                    }
                    Err(err) => drop_malformed(method, &err),
                }
            }
            EXCEPTION_THROWN => {
                match serde_json::from_value::<ExceptionThrownParams>(params.clone()) {
                    Ok(payload) => {
                        self.tap.ingest_exception(payload);
                    }
                    Err(err) => drop_malformed(method, &err),
                }
            }
            _ => {}
        }
    }
}

/// Routes the three request-lifecycle notifications into the network tap.
pub struct NetworkRoute {
    tap: Arc<NetworkTap>,
}

impl NetworkRoute {
    pub fn new(tap: Arc<NetworkTap>) -> Self {
        Self { tap }
    }
}

impl NotificationHandler for NetworkRoute {
    fn on_notification(&self, method: &str, params: &Value) {
        let event = match method {
            REQUEST_WILL_BE_SENT => {
                match serde_json::from_value::<RequestWillBeSentParams>(params.clone()) {
                    Ok(payload) => TapEvent::RequestWillBeSent {
                        request_id: payload.request_id,
                        url: payload.request.url,
                        method: payload.request.method,
                        headers: payload.request.headers,
                        category: payload.category,
                        // Wall-clock seconds when present, monotonic seconds
                        // otherwise; either way stored as milliseconds.
                        timestamp: payload.wall_time.unwrap_or(payload.timestamp) * 1_000.0,
                    },
                    Err(err) => return drop_malformed(method, &err),
                }
            }
            RESPONSE_RECEIVED => {
                match serde_json::from_value::<ResponseReceivedParams>(params.clone()) {
                    Ok(payload) => TapEvent::ResponseReceived {
                        request_id: payload.request_id,
                        status: payload.response.status,
                        headers: payload.response.headers,
                        byte_size: payload.response.encoded_data_length,
                    },
                    Err(err) => return drop_malformed(method, &err),
                }
            }
            LOADING_FINISHED => {
                match serde_json::from_value::<LoadingFinishedParams>(params.clone()) {
                    Ok(payload) => TapEvent::LoadingFinished {
                        request_id: payload.request_id,
                        byte_size: payload.encoded_data_length,
                    },
                    Err(err) => return drop_malformed(method, &err),
                }
            }
            _ => return,
        };
        self.tap.apply(event);
    }
}

fn drop_malformed(method: &str, err: &serde_json::Error) {
    debug!(target: "cdp-session", method, %err, "malformed notification dropped");
}

/// Flatten a `Runtime.getProperties` result into `(name, preview)` pairs for
/// console enrichment. Accessor-only and internal descriptors carry no value
/// and are skipped.
pub fn property_pairs(result: &Value) -> Vec<(String, String)> {
    #[derive(Debug, Deserialize)]
    struct PropertyDescriptor {
        name: String,
        #[serde(default)]
        value: Option<RemoteObject>,
    }

    let Some(items) = result.get("result").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            serde_json::from_value::<PropertyDescriptor>(item.clone()).ok()
        })
        .filter_map(|descriptor| {
            descriptor
                .value
                .map(|value| (descriptor.name, value.preview()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use network_tap::RequestStage;
    use serde_json::json;

    #[test]
    fn network_route_applies_full_lifecycle_from_wire_payloads() {
        let tap = Arc::new(NetworkTap::new());
        let router = Router::new();
        router.register(
            REQUEST_WILL_BE_SENT,
            Arc::new(NetworkRoute::new(tap.clone())),
        );
        router.register(RESPONSE_RECEIVED, Arc::new(NetworkRoute::new(tap.clone())));
        router.register(LOADING_FINISHED, Arc::new(NetworkRoute::new(tap.clone())));

        router.dispatch(
            REQUEST_WILL_BE_SENT,
            &json!({
                "requestId": "r9",
                "request": {
                    "url": "https://x/api",
                    "method": "POST",
                    "headers": { "accept": "application/json" }
                },
                "timestamp": 12.5,
                "wallTime": 1700000000.5,
                "type": "XHR"
            }),
        );
        router.dispatch(
            RESPONSE_RECEIVED,
            &json!({
                "requestId": "r9",
                "response": { "status": 201, "headers": { "x-id": "1" } }
            }),
        );
        router.dispatch(
            LOADING_FINISHED,
            &json!({ "requestId": "r9", "encodedDataLength": 88 }),
        );

        let record = tap.get("r9").expect("record");
        assert_eq!(record.url, "https://x/api");
        assert_eq!(record.method, "POST");
        assert_eq!(record.status, Some(201));
        assert_eq!(record.byte_size, Some(88));
        assert_eq!(record.category.as_deref(), Some("XHR"));
        assert_eq!(record.stage, RequestStage::Completed);
        assert_eq!(record.timestamp, 1_700_000_000_500.0);
    }

    #[test]
    fn malformed_network_payload_is_dropped_without_effect() {
        let tap = Arc::new(NetworkTap::new());
        let route = NetworkRoute::new(tap.clone());
        route.on_notification(REQUEST_WILL_BE_SENT, &json!({ "nope": true }));
        assert!(tap.is_empty());
    }

    #[test]
    fn console_route_handles_both_notification_kinds() {
        let tap = Arc::new(ConsoleTap::new());
        let route = ConsoleRoute::new(tap.clone());

        route.on_notification(
            CONSOLE_API_CALLED,
            &json!({
                "type": "log",
                "args": [ { "type": "string", "value": "boot" } ],
                "timestamp": 1.0
            }),
        );
        route.on_notification(
            EXCEPTION_THROWN,
            &json!({
                "timestamp": 2.0,
                "exceptionDetails": { "text": "Uncaught ReferenceError" }
            }),
        );

        let entries = tap.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "boot");
        assert_eq!(entries[1].text, "Uncaught ReferenceError");
    }

    #[test]
    fn property_pairs_skip_valueless_descriptors() {
        let pairs = property_pairs(&json!({
            "result": [
                { "name": "status", "value": { "type": "string", "value": "ok" } },
                { "name": "count", "value": { "type": "number", "value": 3 } },
                { "name": "getter" }
            ]
        }));
        assert_eq!(
            pairs,
            vec![
                ("status".to_string(), "ok".to_string()),
                ("count".to_string(), "3".to_string())
            ]
        );
    }
}
