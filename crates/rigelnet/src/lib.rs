//! A custom reliable-UDP wire protocol: fixed header framing, a handshake
//! with passphrase validation, heartbeats/timeouts, and retransmission of
//! reliable segments. Local in-process connections bypass sockets entirely.

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod packet;
pub mod telemetry;
pub mod transport;

pub use config::NetConfig;
pub use connection::{Connection, ConnectionPhase, RetransmitPredicate};
pub use error::NetError;
pub use event::{ConnectAttemptFailedReason, NetEvent};
pub use packet::{DisconnectReason, Packet, PacketFlags, PacketType};
pub use telemetry::{Telemetry, TelemetryWindow};
pub use transport::{local_pair, NetTransport, Recipient};
