//! The compose/receive surface: handshake, reliability, heartbeats, and
//! RPC dispatch over a socket or an in-process loopback link.

use std::collections::VecDeque;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;

use hashbrown::HashMap;
use tracing::{debug, instrument, warn};

use crate::config::NetConfig;
use crate::connection::{default_retransmit_predicate, Connection, ConnectionPhase, RetransmitPredicate};
use crate::error::NetError;
use crate::event::{ConnectAttemptFailedReason, NetEvent};
use crate::packet::{ConnectPayload, DisconnectPayload, DisconnectReason, Packet, PacketFlags, PacketType};
use crate::telemetry::{Telemetry, TelemetryWindow};

/// Who a composed message should be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Single(u32),
    All,
    Server,
}

type RpcHandler = Box<dyn FnMut(Option<u32>, &[u8]) -> Result<(), NetError>>;

enum Medium {
    Udp(UdpSocket),
    /// In-process loopback, bypassing sockets entirely; excluded from telemetry.
    Local {
        outgoing: std::sync::mpsc::Sender<Vec<u8>>,
        incoming: std::sync::mpsc::Receiver<Vec<u8>>,
    },
}

/// A loopback link pair for same-process client/server testing, matching
/// RigelNet's "local" connections.
pub fn local_pair() -> ((std::sync::mpsc::Sender<Vec<u8>>, std::sync::mpsc::Receiver<Vec<u8>>), (std::sync::mpsc::Sender<Vec<u8>>, std::sync::mpsc::Receiver<Vec<u8>>)) {
    let (tx_ab, rx_ab) = std::sync::mpsc::channel();
    let (tx_ba, rx_ba) = std::sync::mpsc::channel();
    ((tx_ab, rx_ba), (tx_ba, rx_ab))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Server,
    Client,
}

/// UDP transport: server accepts up to `max_clients` clients, or a client
/// connects to exactly one server.
pub struct NetTransport {
    role: Role,
    config: NetConfig,
    passphrase: String,
    medium: Medium,
    local_addr: SocketAddr,
    /// Server: client_index -> Connection. Client: a single entry under index 0.
    connections: HashMap<u32, Connection>,
    addr_to_index: HashMap<SocketAddr, u32>,
    next_client_index: u32,
    events: VecDeque<NetEvent>,
    telemetry: TelemetryWindow,
    retransmit_predicate: RetransmitPredicate,
    rpc_handlers: HashMap<u32, RpcHandler>,
}

const CLIENT_SLOT: u32 = 0;
const PLACEHOLDER_ADDR: &str = "0.0.0.0:0";

impl NetTransport {
    /// Binds a UDP server socket and waits for `Connect` handshakes.
    pub fn bind_server<A: ToSocketAddrs>(addr: A, passphrase: impl Into<String>, config: NetConfig) -> Result<Self, NetError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            role: Role::Server,
            config,
            passphrase: passphrase.into(),
            medium: Medium::Udp(socket),
            local_addr,
            connections: HashMap::new(),
            addr_to_index: HashMap::new(),
            next_client_index: 0,
            events: VecDeque::new(),
            telemetry: TelemetryWindow::new(120),
            retransmit_predicate: default_retransmit_predicate(),
            rpc_handlers: HashMap::new(),
        })
    }

    /// Binds an ephemeral UDP client socket and sends a `Connect` handshake.
    pub fn connect_client<A: ToSocketAddrs>(server_addr: A, passphrase: impl Into<String>, config: NetConfig) -> Result<Self, NetError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;
        let remote_addr = server_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| NetError::IllegalMessage("no resolvable server address".into()))?;
        socket.connect(remote_addr)?;
        let passphrase = passphrase.into();

        let mut this = Self {
            role: Role::Client,
            config: config.clone(),
            passphrase: passphrase.clone(),
            medium: Medium::Udp(socket),
            local_addr,
            connections: HashMap::new(),
            addr_to_index: HashMap::new(),
            next_client_index: 0,
            events: VecDeque::new(),
            telemetry: TelemetryWindow::new(config.telemetry_window),
            retransmit_predicate: default_retransmit_predicate(),
            rpc_handlers: HashMap::new(),
        };
        let now = Instant::now();
        let mut conn = Connection::new(local_addr, remote_addr, passphrase.clone(), false, &this.config, now);
        conn.phase = ConnectionPhase::Connecting;
        this.connections.insert(CLIENT_SLOT, conn);
        this.send_connect(now)?;
        Ok(this)
    }

    /// Wires two transports together via an in-process loopback link
    /// bypassing sockets entirely (never counted in telemetry).
    pub fn local_pair(passphrase: impl Into<String>, config: NetConfig) -> (Self, Self) {
        let passphrase = passphrase.into();
        let (server_link, client_link) = local_pair();
        let placeholder: SocketAddr = PLACEHOLDER_ADDR.parse().unwrap();

        let mut server = Self {
            role: Role::Server,
            config: config.clone(),
            passphrase: passphrase.clone(),
            medium: Medium::Local {
                outgoing: server_link.0,
                incoming: server_link.1,
            },
            local_addr: placeholder,
            connections: HashMap::new(),
            addr_to_index: HashMap::new(),
            next_client_index: 0,
            events: VecDeque::new(),
            telemetry: TelemetryWindow::new(config.telemetry_window),
            retransmit_predicate: default_retransmit_predicate(),
            rpc_handlers: HashMap::new(),
        };
        let mut client = Self {
            role: Role::Client,
            config: config.clone(),
            passphrase: passphrase.clone(),
            medium: Medium::Local {
                outgoing: client_link.0,
                incoming: client_link.1,
            },
            local_addr: placeholder,
            connections: HashMap::new(),
            addr_to_index: HashMap::new(),
            next_client_index: 0,
            events: VecDeque::new(),
            telemetry: TelemetryWindow::new(config.telemetry_window),
            retransmit_predicate: default_retransmit_predicate(),
            rpc_handlers: HashMap::new(),
        };

        let now = Instant::now();
        let mut conn = Connection::new(placeholder, placeholder, passphrase, true, &client.config, now);
        conn.phase = ConnectionPhase::Connecting;
        client.connections.insert(CLIENT_SLOT, conn);
        client.send_connect(now).expect("loopback send cannot fail");
        (server, client)
    }

    pub fn register_handler(&mut self, rpc_id: u32, handler: impl FnMut(Option<u32>, &[u8]) -> Result<(), NetError> + 'static) {
        self.rpc_handlers.insert(rpc_id, Box::new(handler));
    }

    fn send_connect(&mut self, now: Instant) -> Result<(), NetError> {
        let payload = ConnectPayload {
            passphrase: self.passphrase.clone(),
            protocol_version: crate::packet::PROTOCOL_VERSION,
        }
        .encode();
        let conn = self.connections.get_mut(&CLIENT_SLOT).unwrap();
        let sequence = conn.next_sequence();
        let packet = Packet {
            sequence,
            packet_type: PacketType::Connect,
            flags: PacketFlags::empty(),
            ack_ceiling: 0,
            ack_bitmap: 0,
            payload,
        };
        self.send_raw(&packet.encode(), conn.remote_addr, conn.is_local)?;
        conn.reset_heartbeat_deadline(now, &self.config);
        Ok(())
    }

    fn send_raw(&self, bytes: &[u8], addr: SocketAddr, is_local: bool) -> Result<(), NetError> {
        match &self.medium {
            Medium::Udp(socket) => {
                socket.send_to(bytes, addr)?;
            }
            Medium::Local { outgoing, .. } => {
                debug_assert!(is_local);
                outgoing
                    .send(bytes.to_vec())
                    .map_err(|_| NetError::IllegalMessage("loopback peer is gone".into()))?;
            }
        }
        Ok(())
    }

    fn recv_raw(&self) -> Option<(Vec<u8>, SocketAddr)> {
        match &self.medium {
            Medium::Udp(socket) => {
                let mut buf = vec![0u8; 65536];
                match socket.recv_from(&mut buf) {
                    Ok((n, addr)) => {
                        buf.truncate(n);
                        Some((buf, addr))
                    }
                    Err(_) => None,
                }
            }
            Medium::Local { incoming, .. } => {
                incoming.try_recv().ok().map(|bytes| {
                    let placeholder: SocketAddr = PLACEHOLDER_ADDR.parse().unwrap();
                    (bytes, placeholder)
                })
            }
        }
    }

    fn is_local_medium(&self) -> bool {
        matches!(self.medium, Medium::Local { .. })
    }

    /// Receives and dispatches everything currently pending, then sends
    /// heartbeats/retransmits as needed. Non-blocking: loops until the
    /// medium would block, never sleeps.
    #[instrument(skip(self))]
    pub fn update(&mut self) -> Vec<NetEvent> {
        let now = Instant::now();
        while let Some((bytes, addr)) = self.recv_raw() {
            if let Err(e) = self.handle_incoming(&bytes, addr, now) {
                debug!(error = %e, "dropped malformed packet");
            }
        }
        self.check_timeouts(now);
        self.send_heartbeats_and_retransmits(now);
        self.events.drain(..).collect()
    }

    fn check_timeouts(&mut self, now: Instant) {
        let mut timed_out = Vec::new();
        for (&idx, conn) in self.connections.iter() {
            if conn.phase != ConnectionPhase::Disconnected && conn.is_timed_out(now) {
                timed_out.push(idx);
            }
        }
        for idx in timed_out {
            if let Some(mut conn) = self.connections.remove(&idx) {
                conn.phase = ConnectionPhase::Disconnected;
                self.addr_to_index.remove(&conn.remote_addr);
                let client_index = matches!(self.role, Role::Server).then_some(idx);
                self.events.push_back(NetEvent::Disconnected {
                    client_index,
                    reason: DisconnectReason::TimedOut,
                    message: "no packet heard before timeout".into(),
                });
            }
        }
    }

    fn send_heartbeats_and_retransmits(&mut self, now: Instant) {
        let predicate = &self.retransmit_predicate;
        let is_local = self.is_local_medium();
        let mut outgoing = Vec::new();
        for conn in self.connections.values_mut() {
            if conn.phase != ConnectionPhase::Connected {
                continue;
            }
            for bytes in conn.due_retransmits(now, predicate) {
                outgoing.push((bytes, conn.remote_addr));
            }
            if conn.should_send_heartbeat(now) {
                let packet = Packet {
                    sequence: conn.next_sequence(),
                    packet_type: PacketType::Heartbeat,
                    flags: PacketFlags::empty(),
                    ack_ceiling: 0,
                    ack_bitmap: 0,
                    payload: Vec::new(),
                };
                outgoing.push((packet.encode(), conn.remote_addr));
                conn.reset_heartbeat_deadline(now, &self.config);
            }
        }
        for (bytes, addr) in outgoing {
            let _ = self.send_raw(&bytes, addr, is_local);
        }
    }

    fn handle_incoming(&mut self, bytes: &[u8], addr: SocketAddr, now: Instant) -> Result<(), NetError> {
        let packet = Packet::decode(bytes)?;
        self.telemetry_note_download(bytes.len());

        match self.role {
            Role::Server => self.handle_incoming_server(packet, addr, now),
            Role::Client => self.handle_incoming_client(packet, now),
        }
    }

    fn telemetry_note_download(&mut self, bytes: usize) {
        if self.is_local_medium() {
            return;
        }
        self.telemetry.push(Telemetry {
            upload_byte_count: 0,
            download_byte_count: bytes as u64,
        });
    }

    fn handle_incoming_server(&mut self, packet: Packet, addr: SocketAddr, now: Instant) -> Result<(), NetError> {
        if packet.packet_type == PacketType::Connect {
            let payload = ConnectPayload::decode(&packet.payload)?;
            if payload.passphrase != self.passphrase {
                self.events.push_back(NetEvent::BadPassphrase {
                    client_index: None,
                    incorrect_passphrase: payload.passphrase,
                });
                let reply = Packet {
                    sequence: 0,
                    packet_type: PacketType::Disconnect,
                    flags: PacketFlags::empty(),
                    ack_ceiling: 0,
                    ack_bitmap: 0,
                    payload: DisconnectPayload {
                        reason: DisconnectReason::Error,
                        message: "bad passphrase".into(),
                    }
                    .encode(),
                };
                self.send_raw(&reply.encode(), addr, self.is_local_medium())?;
                return Ok(());
            }

            let client_index = self
                .addr_to_index
                .get(&addr)
                .copied()
                .unwrap_or_else(|| {
                    let idx = self.next_client_index;
                    self.next_client_index += 1;
                    idx
                });
            let is_local = self.is_local_medium();
            let mut conn = Connection::new(self.local_addr, addr, self.passphrase.clone(), is_local, &self.config, now);
            conn.phase = ConnectionPhase::Connected;
            conn.client_index = Some(client_index);
            conn.mark_heard(now, &self.config);
            self.connections.insert(client_index, conn);
            self.addr_to_index.insert(addr, client_index);

            let response_payload = client_index.to_le_bytes().to_vec();
            let seq_packet = {
                let conn = self.connections.get_mut(&client_index).unwrap();
                Packet {
                    sequence: conn.next_sequence(),
                    packet_type: PacketType::ConnectResponse,
                    flags: PacketFlags::empty(),
                    ack_ceiling: 0,
                    ack_bitmap: 0,
                    payload: response_payload,
                }
            };
            self.send_raw(&seq_packet.encode(), addr, is_local)?;
            self.events.push_back(NetEvent::Connected {
                client_index: Some(client_index),
            });
            return Ok(());
        }

        let Some(&client_index) = self.addr_to_index.get(&addr) else {
            warn!(%addr, "packet from unknown peer, dropping");
            return Ok(());
        };
        self.dispatch_established(client_index, packet, now)
    }

    fn handle_incoming_client(&mut self, packet: Packet, now: Instant) -> Result<(), NetError> {
        let conn = self
            .connections
            .get_mut(&CLIENT_SLOT)
            .ok_or(NetError::NotConnected)?;

        if conn.phase == ConnectionPhase::Connecting {
            match packet.packet_type {
                PacketType::ConnectResponse => {
                    let client_index = u32::from_le_bytes(packet.payload[0..4].try_into().unwrap());
                    conn.phase = ConnectionPhase::Connected;
                    conn.client_index = Some(client_index);
                    conn.mark_heard(now, &self.config);
                    self.events.push_back(NetEvent::Connected { client_index: None });
                    return Ok(());
                }
                PacketType::Disconnect => {
                    let disc = DisconnectPayload::decode(&packet.payload)?;
                    conn.phase = ConnectionPhase::Disconnected;
                    let reason = match disc.reason {
                        DisconnectReason::TimedOut => ConnectAttemptFailedReason::TimedOut,
                        _ => ConnectAttemptFailedReason::Error,
                    };
                    self.events.push_back(NetEvent::ConnectAttemptFailed { reason });
                    return Ok(());
                }
                _ => return Ok(()), // not yet connected; ignore anything else
            }
        }

        self.dispatch_established(CLIENT_SLOT, packet, now)
    }

    fn dispatch_established(&mut self, index: u32, packet: Packet, now: Instant) -> Result<(), NetError> {
        let is_local = self.is_local_medium();
        let remote_addr = {
            let conn = self.connections.get_mut(&index).ok_or(NetError::NotConnected)?;
            conn.mark_heard(now, &self.config);
            conn.acknowledge_up_to(packet.ack_ceiling);
            conn.remote_addr
        };

        match packet.packet_type {
            PacketType::Heartbeat => Ok(()),
            PacketType::Disconnect => {
                let disc = DisconnectPayload::decode(&packet.payload)?;
                if let Some(mut conn) = self.connections.remove(&index) {
                    conn.phase = ConnectionPhase::Disconnected;
                    self.addr_to_index.remove(&conn.remote_addr);
                }
                let client_index = matches!(self.role, Role::Server).then_some(index);
                self.events.push_back(NetEvent::Disconnected {
                    client_index,
                    reason: disc.reason,
                    message: disc.message,
                });
                Ok(())
            }
            PacketType::Data | PacketType::DataMore | PacketType::DataTail => {
                if packet.is_reliable() {
                    let accepted = self
                        .connections
                        .get_mut(&index)
                        .map(|c| c.accept_reliable_sequence(packet.sequence))
                        .unwrap_or(false);
                    if !accepted {
                        return Ok(()); // duplicate, discard silently
                    }
                }
                if packet.payload.len() < 4 {
                    return Err(NetError::IllegalMessage("RPC payload too short".into()));
                }
                let rpc_id = u32::from_le_bytes(packet.payload[0..4].try_into().unwrap());
                let args = &packet.payload[4..];
                let sender = matches!(self.role, Role::Server).then_some(index);
                if let Some(handler) = self.rpc_handlers.get_mut(&rpc_id) {
                    handler(sender, args)?;
                } else {
                    warn!(rpc_id, "no handler registered, dropping RPC");
                }
                let _ = remote_addr;
                Ok(())
            }
            PacketType::Connect | PacketType::ConnectResponse => Ok(()), // already handshaked; ignore
        }
    }

    /// Sends a fully-serialized RPC payload to `recipient`.
    pub fn send_rpc(&mut self, recipient: Recipient, rpc_id: u32, args: &[u8], reliable: bool) -> Result<(), NetError> {
        let mut payload = Vec::with_capacity(4 + args.len());
        payload.extend_from_slice(&rpc_id.to_le_bytes());
        payload.extend_from_slice(args);

        let targets: Vec<u32> = match recipient {
            Recipient::Single(idx) => vec![idx],
            Recipient::Server => vec![CLIENT_SLOT],
            Recipient::All => self.connections.keys().copied().collect(),
        };

        let is_local = self.is_local_medium();
        for idx in targets {
            let Some(conn) = self.connections.get_mut(&idx) else {
                continue;
            };
            if conn.phase != ConnectionPhase::Connected {
                continue;
            }
            let addr = conn.remote_addr;
            let packet = if reliable {
                conn.queue_reliable(PacketType::Data, payload.clone(), Instant::now())
            } else {
                Packet {
                    sequence: conn.next_sequence(),
                    packet_type: PacketType::Data,
                    flags: PacketFlags::empty(),
                    ack_ceiling: 0,
                    ack_bitmap: 0,
                    payload: payload.clone(),
                }
            };
            let encoded = packet.encode();
            if !is_local {
                self.telemetry.push(Telemetry {
                    upload_byte_count: encoded.len() as u64,
                    download_byte_count: 0,
                });
            }
            self.send_raw(&encoded, addr, is_local)?;
        }
        Ok(())
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.total()
    }

    pub fn is_connected(&self, client_index: u32) -> bool {
        self.connections
            .get(&client_index)
            .map(|c| c.phase == ConnectionPhase::Connected)
            .unwrap_or(false)
    }

    pub fn connected_client_indices(&self) -> Vec<u32> {
        self.connections
            .iter()
            .filter(|(_, c)| c.phase == ConnectionPhase::Connected)
            .map(|(&i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_handshake_with_correct_passphrase_connects() {
        let (mut server, mut client) = NetTransport::local_pair("right", NetConfig::default());

        let server_events = server.update();
        assert!(server_events
            .iter()
            .any(|e| matches!(e, NetEvent::Connected { .. })));

        let client_events = client.update();
        assert!(client_events
            .iter()
            .any(|e| matches!(e, NetEvent::Connected { .. })));

        assert!(client.is_connected(CLIENT_SLOT));
    }

    #[test]
    fn loopback_handshake_with_wrong_passphrase_fails_for_both_sides() {
        let (server_link, client_link) = local_pair();
        let placeholder: SocketAddr = PLACEHOLDER_ADDR.parse().unwrap();
        let config = NetConfig::default();

        let mut server = NetTransport {
            role: Role::Server,
            config: config.clone(),
            passphrase: "right".into(),
            medium: Medium::Local {
                outgoing: server_link.0,
                incoming: server_link.1,
            },
            local_addr: placeholder,
            connections: HashMap::new(),
            addr_to_index: HashMap::new(),
            next_client_index: 0,
            events: VecDeque::new(),
            telemetry: TelemetryWindow::new(config.telemetry_window),
            retransmit_predicate: default_retransmit_predicate(),
            rpc_handlers: HashMap::new(),
        };
        let mut client = NetTransport {
            role: Role::Client,
            config: config.clone(),
            passphrase: "wrong".into(),
            medium: Medium::Local {
                outgoing: client_link.0,
                incoming: client_link.1,
            },
            local_addr: placeholder,
            connections: HashMap::new(),
            addr_to_index: HashMap::new(),
            next_client_index: 0,
            events: VecDeque::new(),
            telemetry: TelemetryWindow::new(config.telemetry_window),
            retransmit_predicate: default_retransmit_predicate(),
            rpc_handlers: HashMap::new(),
        };
        let now = Instant::now();
        let mut conn = Connection::new(placeholder, placeholder, "wrong".into(), true, &client.config, now);
        conn.phase = ConnectionPhase::Connecting;
        client.connections.insert(CLIENT_SLOT, conn);
        client.send_connect(now).unwrap();

        let server_events = server.update();
        assert!(server_events
            .iter()
            .any(|e| matches!(e, NetEvent::BadPassphrase { .. })));
        assert!(!server_events.iter().any(|e| matches!(e, NetEvent::Connected { .. })));

        let client_events = client.update();
        assert!(client_events.iter().any(|e| matches!(
            e,
            NetEvent::ConnectAttemptFailed {
                reason: ConnectAttemptFailedReason::Error
            }
        )));
        assert!(!client.is_connected(CLIENT_SLOT));
    }
}
