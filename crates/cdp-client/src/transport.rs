//! Duplex channel to one debuggable target.
//!
//! The transport owns exactly one persistent connection and exposes the
//! minimal surface the engine needs: send a raw frame, await the next inbound
//! frame, close. Correlating responses and dispatching notifications happen
//! above this layer.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::ClientError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// One persistent duplex channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one raw outbound frame.
    async fn send(&self, raw: String) -> Result<(), ClientError>;

    /// Await the next inbound frame. `None` means the channel has closed and
    /// no further frames will arrive.
    async fn next(&self) -> Option<String>;

    /// Close the channel. Idempotent.
    async fn close(&self);
}

/// WebSocket transport over the target's debugger endpoint.
pub struct WebSocketTransport {
    writer: Mutex<WsSink>,
    inbound: Mutex<mpsc::Receiver<String>>,
    reader_task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Connect to a `ws://` debugger endpoint.
    pub async fn connect(ws_url: &str, buffer: usize) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(ws_url).await.map_err(|err| {
            ClientError::transport(format!("connect to {ws_url} failed: {err}"))
        })?;
        info!(target: "cdp-transport", url = %ws_url, "channel established");

        let (writer, reader) = stream.split();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let reader_task = tokio::spawn(Self::read_loop(reader, tx));

        Ok(Self {
            writer: Mutex::new(writer),
            inbound: Mutex::new(rx),
            reader_task,
        })
    }

    async fn read_loop(mut reader: WsSource, tx: mpsc::Sender<String>) {
        while let Some(frame) = reader.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!(target: "cdp-transport", "non-utf8 binary frame dropped");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    info!(target: "cdp-transport", "channel closed by remote");
                    break;
                }
                Ok(_) => continue,
                Err(err) => {
                    warn!(target: "cdp-transport", %err, "channel read failed");
                    break;
                }
            };

            if tx.send(text).await.is_err() {
                // Dispatch loop is gone; nothing left to deliver to.
                break;
            }
        }
        // Dropping `tx` ends the inbound stream, which the session observes
        // as channel closure.
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, raw: String) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(raw))
            .await
            .map_err(|err| ClientError::transport(format!("send failed: {err}")))
    }

    async fn next(&self) -> Option<String> {
        let mut inbound = self.inbound.lock().await;
        inbound.recv().await
    }

    async fn close(&self) {
        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer.close().await {
                debug!(target: "cdp-transport", %err, "close handshake failed");
            }
        }
        self.reader_task.abort();
        self.inbound.lock().await.close();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// In-memory transport made of two paired endpoints, for tests and embedding.
/// Frames sent on one endpoint arrive on the other.
pub struct PairedTransport {
    tx: Mutex<Option<mpsc::Sender<String>>>,
    rx: Mutex<mpsc::Receiver<String>>,
}

impl PairedTransport {
    /// Build two connected endpoints.
    pub fn pair(buffer: usize) -> (PairedTransport, PairedTransport) {
        let (a_tx, a_rx) = mpsc::channel(buffer.max(1));
        let (b_tx, b_rx) = mpsc::channel(buffer.max(1));
        (
            PairedTransport {
                tx: Mutex::new(Some(a_tx)),
                rx: Mutex::new(b_rx),
            },
            PairedTransport {
                tx: Mutex::new(Some(b_tx)),
                rx: Mutex::new(a_rx),
            },
        )
    }
}

#[async_trait]
impl Transport for PairedTransport {
    async fn send(&self, raw: String) -> Result<(), ClientError> {
        let guard = self.tx.lock().await;
        let tx = guard
            .as_ref()
            .ok_or_else(|| ClientError::transport("channel closed"))?;
        tx.send(raw)
            .await
            .map_err(|_| ClientError::transport("peer endpoint dropped"))
    }

    async fn next(&self) -> Option<String> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    async fn close(&self) {
        // Dropping the sender ends the peer's inbound stream; closing the
        // receiver ends ours once buffered frames drain.
        self.tx.lock().await.take();
        self.rx.lock().await.close();
    }
}
