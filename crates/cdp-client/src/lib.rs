//! Client engine for a remote-debugging wire protocol.
//!
//! One session owns one persistent duplex channel to a debuggable target. It
//! multiplexes many logical operations over that channel: commands are
//! correlated to their responses by a session-unique id with a per-command
//! timeout, while unsolicited notifications are routed by method name into
//! aggregators that reassemble them into a console log ([`console_tap`]) and
//! a network request table ([`network_tap`]), tolerating out-of-order
//! delivery and malformed payloads without failing the session.

pub mod config;
pub mod correlator;
pub mod error;
pub mod notifications;
pub mod router;
pub mod session;
pub mod targets;
pub mod transport;
pub mod wire;

pub use config::ClientConfig;
pub use error::ClientError;
pub use session::Session;
pub use targets::{TargetDescriptor, TargetDirectory};
pub use transport::{PairedTransport, Transport, WebSocketTransport};

// Aggregator types embedders consume alongside the session.
pub use console_tap::{ConsoleEntry, ConsoleKind, ConsoleOrigin};
pub use network_tap::{NetworkTap, RequestRecord, RequestStage};
