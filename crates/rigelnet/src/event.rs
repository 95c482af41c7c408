//! Connection-level occurrences, drained once per `update()` call.
//! Grounded on `RN_Event`'s variant set.

use crate::packet::DisconnectReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttemptFailedReason {
    Error,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// A client attempted a handshake with the wrong passphrase.
    /// `client_index` is absent on the client side of the connection.
    BadPassphrase {
        client_index: Option<u32>,
        incorrect_passphrase: String,
    },
    /// Emitted on the client side when a connection attempt did not succeed.
    ConnectAttemptFailed { reason: ConnectAttemptFailedReason },
    /// Handshake completed successfully.
    Connected { client_index: Option<u32> },
    /// The connection ended, gracefully or otherwise.
    Disconnected {
        client_index: Option<u32>,
        reason: DisconnectReason,
        message: String,
    },
}

/// Accumulates events during a transport's `update()` pass for the caller
/// to drain afterwards, mirroring `rn_detail::EventFactory`.
#[derive(Default)]
pub(crate) struct EventQueue {
    events: std::collections::VecDeque<NetEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: NetEvent) {
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<NetEvent> {
        self.events.drain(..).collect()
    }
}
