//! Console log assembled from devtools notifications.
//!
//! Two notification kinds feed the log: direct console API calls and uncaught
//! exceptions. Entries are append-only and kept in arrival order for the
//! lifetime of the session; the only permitted mutation is a one-shot preview
//! enrichment that replaces an entry's text with a flattened property summary
//! once its referenced remote object has been resolved.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Maximum number of properties rendered into an enrichment summary.
const MAX_PREVIEW_PROPERTIES: usize = 5;

/// Severity of a console entry, mirroring the console API call type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConsoleKind {
    Log,
    Warn,
    Error,
    Info,
    Debug,
    Other(String),
}

impl ConsoleKind {
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "log" => ConsoleKind::Log,
            "warning" | "warn" => ConsoleKind::Warn,
            "error" => ConsoleKind::Error,
            "info" => ConsoleKind::Info,
            "debug" => ConsoleKind::Debug,
            other => ConsoleKind::Other(other.to_string()),
        }
    }
}

/// Which notification kind produced an entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConsoleOrigin {
    ConsoleApi,
    Exception,
}

/// One console entry. Immutable after creation apart from the enrichment
/// pass, which may rewrite `text` exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub id: String,
    pub kind: ConsoleKind,
    pub timestamp: f64,
    pub text: String,
    pub origin: ConsoleOrigin,
    pub source_line: Option<u64>,
    pub source_url: Option<String>,
    /// Remote object handle of the first unresolved argument, if any.
    pub object_handle: Option<String>,
    enriched: bool,
}

impl ConsoleEntry {
    pub fn is_enriched(&self) -> bool {
        self.enriched
    }
}

/// A value as described on the wire: a primitive with an inline value, or a
/// remote object carrying a description and/or a handle.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type", default)]
    pub object_type: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
}

impl RemoteObject {
    /// Best-effort text rendering: primitive value, then description, then a
    /// structural placeholder.
    pub fn preview(&self) -> String {
        if let Some(value) = &self.value {
            return match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
        if let Some(description) = &self.description {
            return description.clone();
        }
        format!("[{}]", self.object_type)
    }
}

/// Payload of a console API call notification.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleCalledParams {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<RemoteObject>,
    pub timestamp: f64,
}

/// Payload of an uncaught exception notification.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrownParams {
    pub timestamp: f64,
    pub exception_details: ExceptionDetails,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub text: String,
    #[serde(default)]
    pub line_number: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

/// Append-only console store scoped to one session.
pub struct ConsoleTap {
    entries: Mutex<Vec<ConsoleEntry>>,
}

impl ConsoleTap {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Record a console API call. Returns the id assigned to the entry.
    pub fn ingest_console_call(&self, params: ConsoleCalledParams) -> String {
        let text = params
            .args
            .iter()
            .map(RemoteObject::preview)
            .collect::<Vec<_>>()
            .join(" ");
        let object_handle = params
            .args
            .iter()
            .find(|arg| arg.value.is_none() && arg.object_id.is_some())
            .and_then(|arg| arg.object_id.clone());

        let entry = ConsoleEntry {
            id: entry_id(),
            kind: ConsoleKind::from_wire(&params.kind),
            timestamp: params.timestamp,
            text,
            origin: ConsoleOrigin::ConsoleApi,
            source_line: None,
            source_url: None,
            object_handle,
            enriched: false,
        };
        self.push(entry)
    }

    /// Record an uncaught exception. Kind is forced to `Error`.
    pub fn ingest_exception(&self, params: ExceptionThrownParams) -> String {
        let details = params.exception_details;
        let entry = ConsoleEntry {
            id: entry_id(),
            kind: ConsoleKind::Error,
            timestamp: params.timestamp,
            text: details.text,
            origin: ConsoleOrigin::Exception,
            source_line: details.line_number,
            source_url: details.url,
            object_handle: details.exception.and_then(|ex| ex.object_id),
            enriched: false,
        };
        self.push(entry)
    }

    fn push(&self, entry: ConsoleEntry) -> String {
        let id = entry.id.clone();
        self.entries.lock().push(entry);
        id
    }

    /// Entries in original arrival order.
    pub fn snapshot(&self) -> Vec<ConsoleEntry> {
        self.entries.lock().clone()
    }

    /// Pure projection by kind; never reorders.
    pub fn snapshot_filtered(&self, kind: &ConsoleKind) -> Vec<ConsoleEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| &entry.kind == kind)
            .cloned()
            .collect()
    }

    /// Entry ids still carrying an unresolved object handle, paired with the
    /// handle. Feed these through the command interface and hand the resolved
    /// properties back to [`ConsoleTap::enrich`].
    pub fn pending_handles(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| !entry.enriched)
            .filter_map(|entry| {
                entry
                    .object_handle
                    .clone()
                    .map(|handle| (entry.id.clone(), handle))
            })
            .collect()
    }

    /// Replace an entry's text with a flattened `{key: value, …}` summary,
    /// bounded to a small number of properties. A second call on the same
    /// entry is a no-op, and entry order is never disturbed. Returns whether
    /// the entry was rewritten.
    pub fn enrich(&self, entry_id: &str, properties: &[(String, String)]) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.iter_mut().find(|entry| entry.id == entry_id) else {
            debug!(target: "console-tap", entry_id, "enrich for unknown entry; ignored");
            return false;
        };
        if entry.enriched {
            return false;
        }

        let mut parts: Vec<String> = properties
            .iter()
            .take(MAX_PREVIEW_PROPERTIES)
            .map(|(key, value)| format!("{key}: {value}"))
            .collect();
        if properties.len() > MAX_PREVIEW_PROPERTIES {
            parts.push("…".to_string());
        }
        entry.text = format!("{{{}}}", parts.join(", "));
        entry.enriched = true;
        true
    }

    /// Mark an entry's handle as resolved without rewriting its text. Used
    /// when a resolution attempt yielded no usable properties, so the entry
    /// stops showing up in [`ConsoleTap::pending_handles`].
    pub fn settle(&self, entry_id: &str) {
        if let Some(entry) = self
            .entries
            .lock()
            .iter_mut()
            .find(|entry| entry.id == entry_id)
        {
            entry.enriched = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ConsoleTap {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique entry id: wall-clock millis plus a random suffix, so bursts that
/// share a timestamp still get distinct ids.
fn entry_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{millis}-{:08x}", rand::random::<u32>())
}
