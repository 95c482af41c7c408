//! Per-peer connection state machine: phase, reliability bookkeeping,
//! RTT estimate, and timeout/heartbeat deadlines.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::config::NetConfig;
use crate::packet::{Packet, PacketFlags, PacketType, PROTOCOL_MAGIC};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Receives `(attempt_count, elapsed_since_first_send, rtt_estimate)` for a
/// still-unacked reliable segment and decides whether to resend it now.
pub type RetransmitPredicate = Box<dyn Fn(u32, Duration, Duration) -> bool>;

pub(crate) struct PendingReliable {
    pub sequence: u32,
    pub encoded: Vec<u8>,
    pub first_sent: Instant,
    pub last_sent: Instant,
    pub attempt_count: u32,
}

/// Per-peer connection state, named `Connection` in the distilled spec.
pub struct Connection {
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub passphrase: String,
    /// Local in-process connections bypass sockets and are excluded from telemetry.
    pub is_local: bool,
    pub phase: ConnectionPhase,
    pub client_index: Option<u32>,

    next_send_sequence: u32,
    last_accepted_reliable_seq: Option<u32>,
    pub(crate) send_window: VecDeque<PendingReliable>,

    pub rtt_estimate: Duration,
    pub last_heard: Instant,
    pub next_heartbeat_deadline: Instant,
    pub timeout_deadline: Instant,
}

impl Connection {
    pub fn new(local_addr: SocketAddr, remote_addr: SocketAddr, passphrase: String, is_local: bool, config: &NetConfig, now: Instant) -> Self {
        Self {
            local_addr,
            remote_addr,
            passphrase,
            is_local,
            phase: ConnectionPhase::Disconnected,
            client_index: None,
            next_send_sequence: 0,
            last_accepted_reliable_seq: None,
            send_window: VecDeque::new(),
            rtt_estimate: Duration::from_millis(100),
            last_heard: now,
            next_heartbeat_deadline: now + config.heartbeat_interval,
            timeout_deadline: now + config.timeout,
        }
    }

    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.next_send_sequence;
        self.next_send_sequence = self.next_send_sequence.wrapping_add(1);
        seq
    }

    pub fn mark_heard(&mut self, now: Instant, config: &NetConfig) {
        self.last_heard = now;
        self.timeout_deadline = now + config.timeout;
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        now >= self.timeout_deadline
    }

    pub fn should_send_heartbeat(&self, now: Instant) -> bool {
        now >= self.next_heartbeat_deadline
    }

    pub fn reset_heartbeat_deadline(&mut self, now: Instant, config: &NetConfig) {
        self.next_heartbeat_deadline = now + config.heartbeat_interval;
    }

    /// Accepts a reliable packet's sequence number if and only if it is
    /// strictly newer than the last one accepted; older or equal sequences
    /// are protocol-level duplicates and must be discarded without side effects.
    pub fn accept_reliable_sequence(&mut self, sequence: u32) -> bool {
        let is_new = match self.last_accepted_reliable_seq {
            None => true,
            Some(last) => sequence.wrapping_sub(last) != 0 && (sequence.wrapping_sub(last) as i32) > 0,
        };
        if is_new {
            self.last_accepted_reliable_seq = Some(sequence);
        }
        is_new
    }

    pub fn queue_reliable(&mut self, packet_type: PacketType, payload: Vec<u8>, now: Instant) -> Packet {
        let sequence = self.next_sequence();
        let packet = Packet {
            sequence,
            packet_type,
            flags: PacketFlags::RELIABLE,
            ack_ceiling: 0,
            ack_bitmap: 0,
            payload,
        };
        let encoded = packet.encode();
        debug_assert_eq!(u32::from_le_bytes(encoded[4..8].try_into().unwrap()), sequence);
        debug_assert!(encoded.len() >= 4 && PROTOCOL_MAGIC != 0);
        self.send_window.push_back(PendingReliable {
            sequence,
            encoded,
            first_sent: now,
            last_sent: now,
            attempt_count: 1,
        });
        packet
    }

    pub fn acknowledge_up_to(&mut self, ack_ceiling: u32) {
        self.send_window
            .retain(|p| ack_ceiling.wrapping_sub(p.sequence) as i32 <= 0);
    }

    /// Returns the encoded bytes of every still-unacked reliable segment
    /// whose retransmit predicate says to resend now.
    pub fn due_retransmits(&mut self, now: Instant, predicate: &RetransmitPredicate) -> Vec<Vec<u8>> {
        let rtt = self.rtt_estimate;
        let mut due = Vec::new();
        for pending in self.send_window.iter_mut() {
            let elapsed = now.duration_since(pending.first_sent);
            if predicate(pending.attempt_count, elapsed, rtt) {
                pending.attempt_count += 1;
                pending.last_sent = now;
                due.push(pending.encoded.clone());
            }
        }
        due
    }
}

/// The default retransmit predicate: resend every `2*rtt`, uncapped attempts.
pub fn default_retransmit_predicate() -> RetransmitPredicate {
    Box::new(|_attempt, elapsed, rtt| elapsed >= rtt.saturating_mul(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn duplicate_reliable_sequences_are_rejected() {
        let cfg = NetConfig::default();
        let mut c = Connection::new(addr(), addr(), "p".into(), true, &cfg, Instant::now());
        assert!(c.accept_reliable_sequence(5));
        assert!(!c.accept_reliable_sequence(5));
        assert!(!c.accept_reliable_sequence(3));
        assert!(c.accept_reliable_sequence(6));
    }

    #[test]
    fn ack_ceiling_drains_send_window() {
        let cfg = NetConfig::default();
        let mut c = Connection::new(addr(), addr(), "p".into(), true, &cfg, Instant::now());
        c.queue_reliable(PacketType::Data, vec![1], Instant::now());
        c.queue_reliable(PacketType::Data, vec![2], Instant::now());
        assert_eq!(c.send_window.len(), 2);
        c.acknowledge_up_to(1);
        assert_eq!(c.send_window.len(), 1);
    }
}
