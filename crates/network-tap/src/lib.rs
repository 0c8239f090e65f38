//! Network request table assembled from devtools notifications.
//!
//! A request is observed as up to three notifications (start, response,
//! finish) that share a server-assigned correlation key and may arrive in any
//! order. The tap keeps one record per key for the lifetime of the session and
//! merges each notification into it with last-writer-wins field semantics, so
//! re-delivery of an already-seen notification never duplicates a record or
//! accumulates sizes.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Assembly stage of a request record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RequestStage {
    Started,
    ResponseReceived,
    Completed,
}

/// One network request, keyed by the server-assigned correlation id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub url: String,
    pub method: String,
    pub status: Option<i64>,
    pub category: Option<String>,
    pub byte_size: Option<u64>,
    /// Start-event time in milliseconds: epoch millis when the notification
    /// carried a wall clock, otherwise its monotonic timestamp scaled to
    /// milliseconds. Provisional records fall back to creation time.
    pub timestamp: f64,
    pub request_headers: Option<HashMap<String, String>>,
    pub response_headers: Option<HashMap<String, String>>,
    pub stage: RequestStage,
}

/// Notifications understood by the tap, already lifted out of their wire
/// encoding by the caller.
#[derive(Clone, Debug)]
pub enum TapEvent {
    RequestWillBeSent {
        request_id: String,
        url: String,
        method: String,
        headers: Option<HashMap<String, String>>,
        category: Option<String>,
        timestamp: f64,
    },
    ResponseReceived {
        request_id: String,
        status: i64,
        headers: Option<HashMap<String, String>>,
        byte_size: Option<u64>,
    },
    LoadingFinished {
        request_id: String,
        byte_size: u64,
    },
}

impl TapEvent {
    pub fn request_id(&self) -> &str {
        match self {
            TapEvent::RequestWillBeSent { request_id, .. }
            | TapEvent::ResponseReceived { request_id, .. }
            | TapEvent::LoadingFinished { request_id, .. } => request_id,
        }
    }
}

/// In-memory request table scoped to one session. Records are never evicted.
pub struct NetworkTap {
    records: DashMap<String, RequestRecord>,
    // First-seen key order; snapshots replay it so the table is stable.
    order: Mutex<Vec<String>>,
}

impl NetworkTap {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Merge one notification into the table per the lifecycle rules.
    pub fn apply(&self, event: TapEvent) {
        match event {
            TapEvent::RequestWillBeSent {
                request_id,
                url,
                method,
                headers,
                category,
                timestamp,
            } => self.apply_start(request_id, url, method, headers, category, timestamp),
            TapEvent::ResponseReceived {
                request_id,
                status,
                headers,
                byte_size,
            } => self.apply_response(request_id, status, headers, byte_size),
            TapEvent::LoadingFinished {
                request_id,
                byte_size,
            } => self.apply_finish(request_id, byte_size),
        }
    }

    fn apply_start(
        &self,
        request_id: String,
        url: String,
        method: String,
        headers: Option<HashMap<String, String>>,
        category: Option<String>,
        timestamp: f64,
    ) {
        match self.records.get_mut(&request_id) {
            None => {
                let record = RequestRecord {
                    id: request_id.clone(),
                    url,
                    method,
                    status: None,
                    category,
                    byte_size: None,
                    timestamp,
                    request_headers: headers,
                    response_headers: None,
                    stage: RequestStage::Started,
                };
                self.insert_record(request_id, record);
            }
            Some(mut entry) => {
                let record = entry.value_mut();
                // The url is an identity field: back-fill while unknown, or
                // rewrite freely before a response has pinned the record.
                if record.url.is_empty() || record.stage == RequestStage::Started {
                    record.url = url;
                }
                record.method = method;
                record.request_headers = headers;
                record.category = category;
                record.timestamp = timestamp;
                // Status and response headers belong to the response
                // notification; a late start never disturbs them, and the
                // stage never moves backwards.
            }
        }
    }

    fn apply_response(
        &self,
        request_id: String,
        status: i64,
        headers: Option<HashMap<String, String>>,
        byte_size: Option<u64>,
    ) {
        match self.records.get_mut(&request_id) {
            None => {
                // Observed before the start notification: create a
                // provisional record so the fields have somewhere to land.
                let record = RequestRecord {
                    id: request_id.clone(),
                    url: String::new(),
                    method: "GET".to_string(),
                    status: Some(status),
                    category: None,
                    byte_size,
                    timestamp: epoch_millis(),
                    request_headers: None,
                    response_headers: headers,
                    stage: RequestStage::ResponseReceived,
                };
                self.insert_record(request_id, record);
            }
            Some(mut entry) => {
                let record = entry.value_mut();
                record.status = Some(status);
                record.response_headers = headers;
                if byte_size.is_some() {
                    record.byte_size = byte_size;
                }
                if record.stage == RequestStage::Started {
                    record.stage = RequestStage::ResponseReceived;
                }
            }
        }
    }

    fn apply_finish(&self, request_id: String, byte_size: u64) {
        match self.records.get_mut(&request_id) {
            None => {
                debug!(
                    target: "network-tap",
                    request_id = %request_id,
                    "finish notification with no record; ignored"
                );
            }
            Some(mut entry) => {
                let record = entry.value_mut();
                record.byte_size = Some(byte_size);
                if record.stage == RequestStage::ResponseReceived {
                    record.stage = RequestStage::Completed;
                }
            }
        }
    }

    fn insert_record(&self, request_id: String, record: RequestRecord) {
        self.records.insert(request_id.clone(), record);
        self.order.lock().push(request_id);
    }

    /// Current view of the table in first-seen order, optionally filtered by
    /// resource category.
    pub fn snapshot(&self, category: Option<&str>) -> Vec<RequestRecord> {
        let order = self.order.lock();
        order
            .iter()
            .filter_map(|key| self.records.get(key).map(|entry| entry.value().clone()))
            .filter(|record| match category {
                Some(wanted) => record.category.as_deref() == Some(wanted),
                None => true,
            })
            .collect()
    }

    pub fn get(&self, request_id: &str) -> Option<RequestRecord> {
        self.records
            .get(request_id)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for NetworkTap {
    fn default() -> Self {
        Self::new()
    }
}

fn epoch_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(id: &str, url: &str, method: &str) -> TapEvent {
        TapEvent::RequestWillBeSent {
            request_id: id.to_string(),
            url: url.to_string(),
            method: method.to_string(),
            headers: None,
            category: Some("Document".to_string()),
            timestamp: 1_000.0,
        }
    }

    fn response(id: &str, status: i64, byte_size: Option<u64>) -> TapEvent {
        TapEvent::ResponseReceived {
            request_id: id.to_string(),
            status,
            headers: Some(HashMap::from([(
                "content-type".to_string(),
                "text/html".to_string(),
            )])),
            byte_size,
        }
    }

    fn finish(id: &str, byte_size: u64) -> TapEvent {
        TapEvent::LoadingFinished {
            request_id: id.to_string(),
            byte_size,
        }
    }

    #[test]
    fn canonical_order_completes_record() {
        let tap = NetworkTap::new();
        tap.apply(start("r1", "https://x", "GET"));
        tap.apply(response("r1", 200, None));
        tap.apply(finish("r1", 4567));

        let record = tap.get("r1").expect("record");
        assert_eq!(record.stage, RequestStage::Completed);
        assert_eq!(record.url, "https://x");
        assert_eq!(record.status, Some(200));
        assert_eq!(record.byte_size, Some(4567));
    }

    #[test]
    fn response_before_start_creates_provisional_record() {
        let tap = NetworkTap::new();
        tap.apply(response("r1", 200, None));

        let record = tap.get("r1").expect("record");
        assert_eq!(record.stage, RequestStage::ResponseReceived);
        assert_eq!(record.method, "GET");
        assert!(record.url.is_empty());
        assert!(record.timestamp > 0.0);
    }

    #[test]
    fn late_start_backfills_without_disturbing_response_fields() {
        let tap = NetworkTap::new();
        tap.apply(response("r1", 200, None));
        tap.apply(start("r1", "https://x", "POST"));

        let record = tap.get("r1").expect("record");
        assert_eq!(record.stage, RequestStage::ResponseReceived);
        assert_eq!(record.url, "https://x");
        assert_eq!(record.method, "POST");
        assert_eq!(record.status, Some(200));
        assert!(record.response_headers.is_some());
    }

    #[test]
    fn finish_without_record_is_ignored() {
        let tap = NetworkTap::new();
        tap.apply(finish("ghost", 10));
        assert!(tap.is_empty());
    }

    #[test]
    fn finish_in_started_sets_size_but_not_completed() {
        let tap = NetworkTap::new();
        tap.apply(start("r1", "https://x", "GET"));
        tap.apply(finish("r1", 500));

        let record = tap.get("r1").expect("record");
        assert_eq!(record.stage, RequestStage::Started);
        assert_eq!(record.byte_size, Some(500));
    }

    #[test]
    fn double_finish_is_idempotent() {
        let tap = NetworkTap::new();
        tap.apply(start("r1", "https://x", "GET"));
        tap.apply(response("r1", 200, None));
        tap.apply(finish("r1", 500));
        tap.apply(finish("r1", 500));

        let record = tap.get("r1").expect("record");
        assert_eq!(record.byte_size, Some(500));
        assert_eq!(tap.len(), 1);
    }

    #[test]
    fn sizeless_duplicate_response_keeps_finished_size() {
        let tap = NetworkTap::new();
        tap.apply(start("r1", "https://x", "GET"));
        tap.apply(response("r1", 200, None));
        tap.apply(finish("r1", 4567));
        tap.apply(response("r1", 200, None));

        let record = tap.get("r1").expect("record");
        assert_eq!(record.byte_size, Some(4567));
        assert_eq!(record.stage, RequestStage::Completed);
    }

    #[test]
    fn snapshot_filters_by_category() {
        let tap = NetworkTap::new();
        tap.apply(start("r1", "https://x/a", "GET"));
        tap.apply(TapEvent::RequestWillBeSent {
            request_id: "r2".to_string(),
            url: "https://x/b".to_string(),
            method: "GET".to_string(),
            headers: None,
            category: Some("XHR".to_string()),
            timestamp: 2_000.0,
        });

        let all = tap.snapshot(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "r1");
        assert_eq!(all[1].id, "r2");

        let xhr = tap.snapshot(Some("XHR"));
        assert_eq!(xhr.len(), 1);
        assert_eq!(xhr[0].id, "r2");
    }
}
