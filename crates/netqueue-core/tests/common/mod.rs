//! Loopback fixtures shared by the node tests.

#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use netqueue_core::{
    DispatchPolicy, MsgType, NodeConfig, Origin, Peer, PeerId, PeerSet, QueueClient, QueueServer,
    Result, Telemetry, Wait,
};

/// Generous bound for anything that should happen promptly on loopback.
pub const STEP: Wait = Wait::Timeout(Duration::from_secs(5));

pub fn config() -> NodeConfig {
    NodeConfig { hostname: "127.0.0.1".to_string(), port: 0, ..NodeConfig::default() }
}

pub fn bound_server() -> QueueServer {
    let mut server = QueueServer::new(config()).unwrap();
    server.bind("127.0.0.1", 0).unwrap();
    server
}

pub fn port(server: &QueueServer) -> u16 {
    server.local_addr().unwrap().port()
}

/// Connect a fresh client to `server` and accept it.
pub fn join(server: &mut QueueServer, client: QueueClient) -> (QueueClient, PeerId) {
    let mut client = client;
    client.connect("127.0.0.1", port(server)).unwrap();

    let before: Vec<PeerId> = server.peers().ids().collect();
    assert_eq!(server.accept_connections(STEP).unwrap(), 1);
    let id = server.peers().ids().find(|id| !before.contains(id)).unwrap();
    (client, id)
}

/// Bound server with one connected client; the CONN exchange is complete.
pub fn connected_pair() -> (QueueServer, QueueClient, PeerId) {
    let mut server = bound_server();
    let (mut client, id) = join(&mut server, QueueClient::new(config()).unwrap());

    server_expect(&mut server, MsgType::Conn).unwrap();
    client_expect(&mut client, MsgType::Conn).unwrap();
    (server, client, id)
}

/// Poll until a frame of `expected` type has been serviced.
pub fn server_expect(server: &mut QueueServer, expected: MsgType) -> Result<()> {
    for _ in 0..10 {
        if server.poll(STEP)? == Some(expected) {
            return Ok(());
        }
    }
    panic!("server never serviced {expected}");
}

pub fn client_expect(client: &mut QueueClient, expected: MsgType) -> Result<()> {
    for _ in 0..10 {
        if client.poll(STEP)? == Some(expected) {
            return Ok(());
        }
    }
    panic!("client never serviced {expected}");
}

/// Telemetry that records what it saw.
#[derive(Debug, Clone, Default)]
pub struct Recorder(pub Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Telemetry for Recorder {
    fn on_status(&mut self, origin: Origin, status: &str) {
        self.0.lock().unwrap().push(format!("status {origin} {status}"));
    }

    fn on_pong(&mut self, origin: Origin) {
        self.0.lock().unwrap().push(format!("pong {origin}"));
    }
}

/// Round robin, but a peer only takes work once it reported `ready`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusGate;

impl DispatchPolicy for StatusGate {
    fn choose(&mut self, peers: &mut PeerSet) -> Option<PeerId> {
        peers.rotate()
    }

    fn is_ready(&self, peer: &Peer) -> bool {
        peer.status() == Some("ready")
    }
}
