use std::time::Duration;

use rigelnet::{NetConfig, NetTransport, Recipient};
use tracing::info;

pub fn run(passphrase: &str) {
    let config = NetConfig::default();
    let (server, client) = NetTransport::local_pair(passphrase, config);

    // A handful of steps is enough for the loopback medium to deliver the
    // handshake and the RPC; a real UDP deployment would loop on `update()`
    // from the main step loop indefinitely.
    let mut server = server;
    let mut client = client;
    if let Err(e) = client.send_rpc(Recipient::Server, 1, b"hello from the client", true) {
        info!(error = %e, "send failed before the handshake completed");
    }

    for step in 0..5 {
        for event in client.update() {
            info!(step, side = "client", ?event, "net event");
        }
        for event in server.update() {
            info!(step, side = "server", ?event, "net event");
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    info!(
        server_connected = server.connected_client_indices().len(),
        client_connected = client.is_connected(0),
        "net demo finished"
    );
}
