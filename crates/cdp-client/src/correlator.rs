//! Command/response correlation.
//!
//! Every outbound command gets a session-unique, monotonically increasing id
//! and a single-resolution completion slot. An inbound message with a
//! matching id resolves the slot exactly once; timeout and channel closure
//! remove the slot so a late duplicate response cannot re-resolve it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ClientError;

pub type CommandOutcome = Result<Value, ClientError>;

struct PendingCommand {
    method: String,
    issued_at: Instant,
    completion: oneshot::Sender<CommandOutcome>,
}

/// Tracks outstanding commands for one session.
pub struct Correlator {
    next_id: AtomicU64,
    pending: DashMap<u64, PendingCommand>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate the next id and register a completion slot for it. The slot
    /// is registered before anything is sent so a fast response cannot race
    /// the registration.
    pub fn register(&self, method: &str) -> (u64, oneshot::Receiver<CommandOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCommand {
                method: method.to_string(),
                issued_at: Instant::now(),
                completion: tx,
            },
        );
        (id, rx)
    }

    /// Resolve the command with the given id. Ids with no registered slot
    /// (already timed out, already resolved, or never ours) are dropped.
    pub fn complete(&self, id: u64, outcome: CommandOutcome) {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                debug!(
                    target: "cdp-session",
                    id,
                    method = %entry.method,
                    elapsed_ms = entry.issued_at.elapsed().as_millis() as u64,
                    "command resolved"
                );
                let _ = entry.completion.send(outcome);
            }
            None => {
                debug!(target: "cdp-session", id, "response for unknown command id dropped");
            }
        }
    }

    /// Unregister the listener for a command, typically after its timeout
    /// fired. A response arriving later is treated as unknown.
    pub fn abandon(&self, id: u64) {
        self.pending.remove(&id);
    }

    /// Fail every outstanding command with the given error. Used when the
    /// channel closes so callers observe deterministic termination instead of
    /// hanging until their timeouts.
    pub fn fail_all(&self, error: ClientError) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.pending.remove(&id) {
                let _ = entry.completion.send(Err(error.clone()));
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}
