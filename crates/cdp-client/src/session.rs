//! Session composition: one transport, one correlator, one router, two
//! aggregators, all scoped to a single target connection.
//!
//! The dispatch loop is the only consumer of inbound frames and processes
//! them strictly in arrival order. Callers suspend in `invoke` (waiting for a
//! matched response or timeout) and in the fixed collection windows; the loop
//! itself never blocks on either.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use console_tap::{ConsoleEntry, ConsoleKind, ConsoleTap};
use network_tap::{NetworkTap, RequestRecord};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::correlator::Correlator;
use crate::error::ClientError;
use crate::notifications::{
    self, ConsoleRoute, NetworkRoute, CONSOLE_API_CALLED, EXCEPTION_THROWN, LOADING_FINISHED,
    REQUEST_WILL_BE_SENT, RESPONSE_RECEIVED,
};
use crate::router::Router;
use crate::transport::{Transport, WebSocketTransport};
use crate::wire::{self, Inbound, OutboundCommand};

/// One connection to one debuggable target.
pub struct Session {
    transport: Arc<dyn Transport>,
    correlator: Arc<Correlator>,
    router: Arc<Router>,
    console: Arc<ConsoleTap>,
    network: Arc<NetworkTap>,
    cfg: ClientConfig,
    shutdown: CancellationToken,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    console_routed: AtomicBool,
    network_routed: AtomicBool,
}

impl Session {
    /// Open a WebSocket channel to the target's debugger endpoint and start
    /// the dispatch loop.
    pub async fn connect(ws_url: &str, cfg: ClientConfig) -> Result<Arc<Self>, ClientError> {
        let transport = WebSocketTransport::connect(ws_url, cfg.event_buffer).await?;
        Ok(Self::with_transport(Arc::new(transport), cfg))
    }

    /// Build a session over an already-established transport. Used by tests
    /// and embedders that bring their own channel.
    pub fn with_transport(transport: Arc<dyn Transport>, cfg: ClientConfig) -> Arc<Self> {
        let session = Arc::new(Self {
            transport,
            correlator: Arc::new(Correlator::new()),
            router: Arc::new(Router::new()),
            console: Arc::new(ConsoleTap::new()),
            network: Arc::new(NetworkTap::new()),
            cfg,
            shutdown: CancellationToken::new(),
            dispatch_task: Mutex::new(None),
            console_routed: AtomicBool::new(false),
            network_routed: AtomicBool::new(false),
        });

        // The loop owns only what it needs, so dropping the last external
        // handle to the session is not kept alive by its own task.
        let task = tokio::spawn(dispatch_loop(
            Arc::clone(&session.transport),
            Arc::clone(&session.correlator),
            Arc::clone(&session.router),
            session.shutdown.clone(),
        ));
        *session.dispatch_task.lock() = Some(task);
        session
    }

    /// Issue one command and await its correlated outcome: the remote result,
    /// the remote error, or a timeout. Exactly one of the three occurs, and a
    /// late duplicate response cannot re-resolve the call. Any number of
    /// invocations may be outstanding concurrently.
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let (id, completion) = self.correlator.register(method);
        let frame = serde_json::to_string(&OutboundCommand {
            id,
            method: method.to_string(),
            params,
        })
        .map_err(|err| ClientError::format(format!("command encode failed: {err}")))?;

        if let Err(err) = self.transport.send(frame).await {
            self.correlator.abandon(id);
            return Err(err);
        }

        let window = self.cfg.command_timeout();
        match timeout(window, completion).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::transport("completion slot dropped")),
            Err(_) => {
                self.correlator.abandon(id);
                Err(ClientError::CommandTimeout {
                    method: method.to_string(),
                    duration: window,
                })
            }
        }
    }

    /// Enable a protocol domain (`{domain}.enable`).
    pub async fn enable_domain(&self, domain: &str) -> Result<(), ClientError> {
        self.invoke(&format!("{domain}.enable"), json!({})).await?;
        Ok(())
    }

    /// Collect console entries for a fixed window: register the console
    /// routes, enable the producing domains, suspend, and return the log in
    /// arrival order.
    pub async fn collect_console(
        &self,
        window: Duration,
    ) -> Result<Vec<ConsoleEntry>, ClientError> {
        self.ensure_console_routes();
        self.enable_domain("Runtime").await?;
        self.enable_domain("Log").await?;
        sleep(window).await;
        Ok(self.console.snapshot())
    }

    /// Like [`Session::collect_console`], projected to one entry kind. The
    /// projection never reorders.
    pub async fn collect_console_filtered(
        &self,
        window: Duration,
        kind: &ConsoleKind,
    ) -> Result<Vec<ConsoleEntry>, ClientError> {
        self.collect_console(window).await?;
        Ok(self.console.snapshot_filtered(kind))
    }

    /// Collect the network request table for a fixed window, optionally
    /// filtered by resource category.
    pub async fn collect_network(
        &self,
        window: Duration,
        category: Option<&str>,
    ) -> Result<Vec<RequestRecord>, ClientError> {
        self.ensure_network_routes();
        self.enable_domain("Network").await?;
        sleep(window).await;
        Ok(self.network.snapshot(category))
    }

    /// Enrich collected console entries whose arguments were remote object
    /// handles: resolve each handle's properties over the command interface
    /// and rewrite the entry text with a bounded summary. Safe to repeat;
    /// already-enriched entries are skipped. Returns how many entries were
    /// rewritten.
    pub async fn resolve_console_previews(&self) -> Result<usize, ClientError> {
        let mut rewritten = 0;
        for (entry_id, handle) in self.console.pending_handles() {
            let result = self
                .invoke(
                    "Runtime.getProperties",
                    json!({ "objectId": handle, "ownProperties": true }),
                )
                .await?;
            let pairs = notifications::property_pairs(&result);
            if !pairs.is_empty() && self.console.enrich(&entry_id, &pairs) {
                rewritten += 1;
            } else {
                // Nothing usable came back; settle the handle so repeat
                // passes stop re-issuing the command for this entry.
                self.console.settle(&entry_id);
            }
        }
        Ok(rewritten)
    }

    /// Tear the session down: stop the dispatch loop, close the channel,
    /// reject every outstanding command, and drop handler registrations.
    /// Aggregator data is discarded with the session; consume it first.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.transport.close().await;
        self.correlator
            .fail_all(ClientError::transport("session closed"));
        self.router.clear();

        let task = self.dispatch_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Direct access to the console store (already-collected entries).
    pub fn console(&self) -> &ConsoleTap {
        &self.console
    }

    /// Direct access to the network table (already-collected records).
    pub fn network(&self) -> &NetworkTap {
        &self.network
    }

    /// Register additional notification handlers on this session.
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn outstanding_commands(&self) -> usize {
        self.correlator.outstanding()
    }

    fn ensure_console_routes(&self) {
        if self.console_routed.swap(true, Ordering::SeqCst) {
            return;
        }
        let route: Arc<dyn crate::router::NotificationHandler> =
            Arc::new(ConsoleRoute::new(Arc::clone(&self.console)));
        self.router.register(CONSOLE_API_CALLED, Arc::clone(&route));
        self.router.register(EXCEPTION_THROWN, route);
    }

    fn ensure_network_routes(&self) {
        if self.network_routed.swap(true, Ordering::SeqCst) {
            return;
        }
        let route: Arc<dyn crate::router::NotificationHandler> =
            Arc::new(NetworkRoute::new(Arc::clone(&self.network)));
        self.router.register(REQUEST_WILL_BE_SENT, Arc::clone(&route));
        self.router.register(RESPONSE_RECEIVED, Arc::clone(&route));
        self.router.register(LOADING_FINISHED, route);
    }
}

async fn dispatch_loop(
    transport: Arc<dyn Transport>,
    correlator: Arc<Correlator>,
    router: Arc<Router>,
    shutdown: CancellationToken,
) {
    debug!(target: "cdp-session", "dispatch loop entered");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                break;
            }
            raw = transport.next() => {
                match raw {
                    Some(raw) => route_raw(&correlator, &router, &raw),
                    None => {
                        warn!(target: "cdp-session", "channel closed; rejecting outstanding commands");
                        correlator.fail_all(ClientError::transport("channel closed"));
                        break;
                    }
                }
            }
        }
    }
    debug!(target: "cdp-session", "dispatch loop exited");
}

/// Classify one inbound frame and hand it to the correlator or the router.
/// Malformed frames are logged and dropped; one bad notification must not
/// poison the ones that follow.
fn route_raw(correlator: &Correlator, router: &Router, raw: &str) {
    match wire::classify(raw) {
        Ok(Inbound::Response { id, result, error }) => {
            let outcome = match error {
                Some(remote) => Err(ClientError::Protocol {
                    code: remote.code,
                    message: remote.message,
                    data: remote.data,
                }),
                None => Ok(result.unwrap_or(Value::Null)),
            };
            correlator.complete(id, outcome);
        }
        Ok(Inbound::Notification { method, params }) => {
            router.dispatch(&method, &params);
        }
        Err(err) => {
            debug!(target: "cdp-session", %err, "inbound frame dropped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.dispatch_task.lock().take() {
            task.abort();
        }
    }
}
