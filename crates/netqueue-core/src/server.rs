//! Server end of a queue: a listener plus any number of child links.
//!
//! Two reactors are kept apart: one watches the listening socket for new
//! children, the other watches established peers. Each peer is registered
//! under its arena slot, so a readiness token maps straight back to a
//! [`PeerId`].
//!
//! Responses from every child land in one inbound queue. Jobs go out either to
//! every peer or to the single peer the [`DispatchPolicy`] picks.

use std::{
    collections::VecDeque,
    io,
    net::{SocketAddr, ToSocketAddrs},
};

use mio::{
    Interest, Token,
    net::{TcpListener, TcpStream},
};
use netqueue_proto::{Message, MsgType};
use tracing::{debug, info, warn};

use crate::{
    Item,
    config::NodeConfig,
    connection::{Connection, Inbound},
    error::{QueueError, Result},
    hooks::{LogTelemetry, Origin, Telemetry},
    outgoing::Outgoing,
    peers::{Peer, PeerId, PeerSet},
    policy::{DispatchPolicy, RoundRobin},
    reactor::Reactor,
    state::{Lifecycle, ServerState, require},
    wait::{Budget, Wait},
};

const LISTENER: Token = Token(0);

/// Where [`QueueServer::put_to`] delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every connected peer
    All,
    /// One specific peer
    Peer(PeerId),
}

/// Server end of a networked queue.
pub struct QueueServer {
    state: ServerState,
    config: NodeConfig,
    listener: Option<TcpListener>,
    accept_reactor: Reactor,
    peer_reactor: Reactor,
    peers: PeerSet,
    inbound: VecDeque<Item>,
    last_serviced: Option<PeerId>,
    policy: Box<dyn DispatchPolicy>,
    telemetry: Box<dyn Telemetry>,
}

impl QueueServer {
    /// Create an unbound server using round-robin dispatch.
    pub fn new(config: NodeConfig) -> Result<Self> {
        Ok(Self {
            state: ServerState::Inactive,
            accept_reactor: Reactor::new(config.event_capacity)?,
            peer_reactor: Reactor::new(config.event_capacity)?,
            config,
            listener: None,
            peers: PeerSet::new(),
            inbound: VecDeque::new(),
            last_serviced: None,
            policy: Box::new(RoundRobin),
            telemetry: Box::new(LogTelemetry),
        })
    }

    /// Replace the dispatch policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl DispatchPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Observer for STATUS and PONG frames from children.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: impl Telemetry + 'static) -> Self {
        self.telemetry = Box::new(telemetry);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Configuration this server was built with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Connected children.
    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Look up one child.
    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    /// Items received but not yet taken.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.listener {
            Some(listener) => Ok(listener.local_addr()?),
            None => Err(QueueError::StateMismatch {
                operation: "query address",
                state: self.state.name(),
            }),
        }
    }

    /// Open the listening socket.
    pub fn bind(&mut self, host: &str, port: u16) -> Result<()> {
        require(self.state, &[ServerState::Inactive], "bind")?;

        let mut listener = Self::listen(host, port)?;
        self.accept_reactor.register(&mut listener, LISTENER, Interest::READABLE)?;
        info!(addr = ?listener.local_addr().ok(), "listening");

        self.listener = Some(listener);
        self.state = ServerState::Ready;
        Ok(())
    }

    fn listen(host: &str, port: u16) -> Result<TcpListener> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpListener::bind(addr) {
                Ok(listener) => return Ok(listener),
                Err(err) => {
                    debug!(%addr, error = %err, "bind attempt failed");
                    last_err = Some(err);
                },
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{host}:{port} resolved to no addresses"),
                )
            })
            .into())
    }

    /// Accept new children, waiting up to `wait` for the first one.
    ///
    /// Every connection already pending is taken in one sweep. Returns how
    /// many were accepted, zero if the wait ran out.
    pub fn accept_connections(&mut self, wait: Wait) -> Result<usize> {
        require(self.state, &[ServerState::Ready, ServerState::Connected], "accept")?;

        let mut budget = Budget::new(wait);
        loop {
            let accepted = self.accept_pending()?;
            if accepted > 0 {
                return Ok(accepted);
            }
            match budget.next_wait() {
                Some(slice) => self.accept_reactor.wait(slice)?,
                None => return Ok(0),
            };
        }
    }

    fn accept_pending(&mut self) -> Result<usize> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(0);
        };

        let mut incoming = Vec::new();
        loop {
            match listener.accept() {
                Ok(pair) => incoming.push(pair),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) => {},
                Err(err) => return Err(err.into()),
            }
        }

        let accepted = incoming.len();
        for (stream, addr) in incoming {
            let id = self.adopt(stream)?;
            info!(peer = %id, %addr, "child connected");
            self.state = ServerState::Connected;
        }
        Ok(accepted)
    }

    fn adopt(&mut self, stream: TcpStream) -> Result<PeerId> {
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "could not disable Nagle");
        }

        let conn = Connection::new(stream, &self.config);
        let id = self.peers.insert_with(|id| Peer::new(id, conn));

        let registered = match self.peers.get_mut(id) {
            Some(peer) => {
                self.peer_reactor.register(peer.conn_mut(), id.token(), Interest::READABLE)
            },
            None => Ok(()),
        };
        if let Err(err) = registered {
            self.peers.remove(id);
            return Err(err.into());
        }
        Ok(id)
    }

    /// Wait for any child to become readable, then service one frame from it.
    ///
    /// Children with complete frames already buffered are serviced first,
    /// without waiting. Returns the type of the frame serviced, or `None` if
    /// nothing was ready.
    pub fn poll(&mut self, wait: Wait) -> Result<Option<MsgType>> {
        require(self.state, &[ServerState::Connected], "poll")?;

        if let Some(id) = self.buffered_peer() {
            return self.service(id);
        }

        let mut failed = Vec::new();
        for ready in self.peer_reactor.wait(wait)? {
            let Some(id) = self.peers.id_for_token(ready.token) else {
                continue;
            };
            let Some(peer) = self.peers.get_mut(id) else {
                continue;
            };
            if let Err(err) = pump(peer.conn_mut(), ready.readable, ready.writable) {
                failed.push((id, err));
            }
        }
        for (id, err) in failed {
            warn!(peer = %id, error = %err, "child link failed");
            self.drop_peer(id);
        }

        match self.buffered_peer() {
            Some(id) => self.service(id),
            None => Ok(None),
        }
    }

    /// Next peer with something to service, scanning from just after the one
    /// serviced last so a chatty child cannot starve the rest.
    fn buffered_peer(&self) -> Option<PeerId> {
        let ids: Vec<PeerId> = self.peers.ids().collect();
        let start = self
            .last_serviced
            .and_then(|last| ids.iter().position(|id| *id == last))
            .map_or(0, |pos| pos + 1);

        ids.iter()
            .cycle()
            .skip(start)
            .take(ids.len())
            .copied()
            .find(|id| self.peers.get(*id).is_some_and(|peer| peer.conn().has_input()))
    }

    fn has_buffered(&self) -> bool {
        self.peers.iter().any(|peer| peer.conn().has_input())
    }

    fn service(&mut self, id: PeerId) -> Result<Option<MsgType>> {
        self.last_serviced = Some(id);
        let Some(peer) = self.peers.get_mut(id) else {
            return Ok(None);
        };

        let frame = match peer.conn_mut().next_frame() {
            Ok(Inbound::Frame(frame)) => frame,
            Ok(Inbound::Pending) => return Ok(None),
            Ok(Inbound::Closed) => {
                warn!(peer = %id, "child closed the connection without DISCONN");
                self.drop_peer(id);
                return Ok(None);
            },
            Err(QueueError::UnrecognizedMessageType(raw)) => {
                warn!(peer = %id, msg_type = raw, "dropping frame of unknown type");
                return Ok(None);
            },
            Err(err) => {
                warn!(peer = %id, error = %err, "dropping child after bad read");
                self.drop_peer(id);
                return Ok(None);
            },
        };

        let msg_type = frame.msg_type();
        match Message::from_frame(&frame) {
            Ok(message) => self.handle(id, message)?,
            Err(err) => warn!(peer = %id, %msg_type, error = %err, "dropping undecodable frame"),
        }
        Ok(Some(msg_type))
    }

    fn handle(&mut self, id: PeerId, message: Message) -> Result<()> {
        debug!(peer = %id, msg_type = %message.msg_type(), "frame from child");
        match message {
            Message::Conn => self.reply(id, Message::Conn)?,
            Message::Disconn => {
                info!(peer = %id, "child disconnected");
                self.drop_peer(id);
            },
            Message::Status(status) => {
                if let Some(peer) = self.peers.get_mut(id) {
                    peer.set_status(status.clone());
                }
                self.telemetry.on_status(Origin::Peer(id), &status);
            },
            Message::Ping => self.reply(id, Message::Pong)?,
            Message::Pong => self.telemetry.on_pong(Origin::Peer(id)),
            Message::Enqueue(items) => self.inbound.push_back(items),
        }
        Ok(())
    }

    /// Protocol reply to one child. A child that cannot be written to is
    /// dropped rather than failing the poll.
    fn reply(&mut self, id: PeerId, message: Message) -> Result<()> {
        let wire = message.encode()?;
        if let Err(err) = self.send_to(id, &wire) {
            warn!(peer = %id, error = %err, "reply failed");
            self.drop_peer(id);
        }
        Ok(())
    }

    fn drop_peer(&mut self, id: PeerId) {
        if let Some(mut peer) = self.peers.remove(id) {
            if let Err(err) = self.peer_reactor.deregister(peer.conn_mut()) {
                debug!(peer = %id, error = %err, "deregister failed");
            }
            peer.conn().shutdown();
        }
        if self.peers.is_empty() && self.state == ServerState::Connected {
            info!("last child left");
            self.state = ServerState::Ready;
        }
    }

    /// Take the oldest item, failing with [`QueueError::Empty`] if none
    /// arrives within `wait`.
    pub fn get(&mut self, wait: Wait) -> Result<Item> {
        self.get_or_none(wait)?.ok_or(QueueError::Empty)
    }

    /// Take the oldest item, or `None` if none arrives within `wait`.
    pub fn get_or_none(&mut self, wait: Wait) -> Result<Option<Item>> {
        let mut budget = Budget::new(wait);
        loop {
            require(self.state, &[ServerState::Connected], "get")?;
            if let Some(item) = self.inbound.pop_front() {
                return Ok(Some(item));
            }
            if self.has_buffered() {
                self.poll(Wait::Immediate)?;
                continue;
            }
            match budget.next_wait() {
                Some(slice) => self.poll(slice)?,
                None => return Ok(None),
            };
        }
    }

    /// Poll once without waiting, then take everything queued.
    pub fn get_all(&mut self) -> Result<Vec<Item>> {
        require(self.state, &[ServerState::Connected], "get")?;
        self.poll(Wait::Immediate)?;
        while self.state == ServerState::Connected && self.has_buffered() {
            self.poll(Wait::Immediate)?;
        }
        Ok(self.inbound.drain(..).collect())
    }

    /// Send to the peer the dispatch policy picks.
    ///
    /// Fails with [`QueueError::Full`] if there are no peers, the policy
    /// picks none, or the pick does not become ready within `wait`.
    pub fn put(&mut self, message: impl Into<Outgoing>, wait: Wait) -> Result<()> {
        require(self.state, &[ServerState::Ready, ServerState::Connected], "put")?;
        if self.peers.is_empty() {
            return Err(QueueError::full("no connected peers"));
        }
        let target = self
            .policy
            .choose(&mut self.peers)
            .ok_or_else(|| QueueError::full("dispatch policy chose no peer"))?;
        self.put_to(message, Target::Peer(target), wait)
    }

    /// Send to every peer.
    pub fn put_all(&mut self, message: impl Into<Outgoing>) -> Result<()> {
        self.put_to(message, Target::All, Wait::Immediate)
    }

    /// Send to `target`.
    ///
    /// A broadcast writes to every peer regardless of readiness; peers that
    /// cannot be written to are dropped. A single peer must report ready
    /// through the policy: `Wait::Immediate` checks once, longer waits keep
    /// polling until it does or the wait runs out.
    pub fn put_to(
        &mut self,
        message: impl Into<Outgoing>,
        target: Target,
        wait: Wait,
    ) -> Result<()> {
        require(self.state, &[ServerState::Ready, ServerState::Connected], "put")?;
        let wire = message.into().into_wire()?;

        let id = match target {
            Target::All => {
                let ids: Vec<PeerId> = self.peers.ids().collect();
                for id in ids {
                    if let Err(err) = self.send_to(id, &wire) {
                        warn!(peer = %id, error = %err, "broadcast to child failed");
                        self.drop_peer(id);
                    }
                }
                return Ok(());
            },
            Target::Peer(id) => id,
        };

        let mut budget = Budget::new(wait);
        loop {
            let Some(peer) = self.peers.get(id) else {
                return Err(QueueError::full(format!("{id} is not connected")));
            };
            if self.policy.is_ready(peer) {
                break;
            }
            if matches!(wait, Wait::Immediate) {
                return Err(QueueError::full(format!("{id} is not ready")));
            }
            match budget.next_wait() {
                Some(slice) => self.poll(slice)?,
                None => return Err(QueueError::full(format!("{id} did not become ready"))),
            };
        }

        if let Err(err) = self.send_to(id, &wire) {
            warn!(peer = %id, error = %err, "send to child failed");
            self.drop_peer(id);
            return Err(err);
        }
        debug!(peer = %id, bytes = wire.len(), "sent");
        Ok(())
    }

    /// Send a PING to one child.
    pub fn ping(&mut self, id: PeerId) -> Result<()> {
        require(self.state, &[ServerState::Connected], "ping")?;
        if !self.peers.contains(id) {
            return Err(QueueError::full(format!("{id} is not connected")));
        }
        let wire = Message::Ping.encode()?;
        self.send_to(id, &wire)
    }

    /// Write a whole frame to one peer, waiting for write readiness if the
    /// kernel pushes back. Input from any peer arriving meanwhile is buffered.
    fn send_to(&mut self, id: PeerId, wire: &[u8]) -> Result<()> {
        let Some(peer) = self.peers.get_mut(id) else {
            return Err(QueueError::full(format!("{id} is not connected")));
        };
        let conn = peer.conn_mut();
        conn.queue(wire);
        if conn.flush()? {
            return Ok(());
        }

        self.peer_reactor.reregister(conn, id.token(), Interest::READABLE | Interest::WRITABLE)?;
        let flushed = self.await_flush(id);
        if let Some(peer) = self.peers.get_mut(id) {
            self.peer_reactor.reregister(peer.conn_mut(), id.token(), Interest::READABLE)?;
        }
        flushed
    }

    fn await_flush(&mut self, id: PeerId) -> Result<()> {
        loop {
            let mut done = false;
            for ready in self.peer_reactor.wait(Wait::Forever)? {
                let Some(other) = self.peers.id_for_token(ready.token) else {
                    continue;
                };
                let Some(peer) = self.peers.get_mut(other) else {
                    continue;
                };
                let conn = peer.conn_mut();
                if ready.readable {
                    if let Err(err) = conn.fill() {
                        if other == id {
                            return Err(err.into());
                        }
                        debug!(peer = %other, error = %err, "read failed while waiting to write");
                    }
                }
                if other == id && ready.writable && conn.flush()? {
                    done = true;
                }
            }
            if done {
                return Ok(());
            }
        }
    }

    /// Disconnect every child with DISCONN and release all sockets.
    pub fn close(&mut self) -> Result<()> {
        require(
            self.state,
            &[ServerState::Inactive, ServerState::Ready, ServerState::Connected],
            "close",
        )?;

        if !self.peers.is_empty() {
            let disconn = Message::Disconn.encode()?;
            let ids: Vec<PeerId> = self.peers.ids().collect();
            for id in ids {
                if let Err(err) = self.send_to(id, &disconn) {
                    warn!(peer = %id, error = %err, "could not signal DISCONN");
                }
            }
        }

        for mut peer in self.peers.drain() {
            if let Err(err) = self.peer_reactor.deregister(peer.conn_mut()) {
                debug!(peer = %peer.id(), error = %err, "deregister failed");
            }
            peer.conn().shutdown();
        }

        if let Some(mut listener) = self.listener.take() {
            if let Err(err) = self.accept_reactor.deregister(&mut listener) {
                debug!(error = %err, "listener deregister failed");
            }
        }

        self.state = ServerState::Closed;
        info!("server closed");
        Ok(())
    }
}

fn pump(conn: &mut Connection, readable: bool, writable: bool) -> io::Result<()> {
    if readable {
        conn.fill()?;
    }
    if writable {
        conn.flush()?;
    }
    Ok(())
}

impl std::fmt::Debug for QueueServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueServer")
            .field("state", &self.state)
            .field("addr", &self.listener.as_ref().and_then(|l| l.local_addr().ok()))
            .field("peers", &self.peers.len())
            .field("pending", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> QueueServer {
        QueueServer::new(NodeConfig::default()).unwrap()
    }

    fn assert_mismatch<T: std::fmt::Debug>(result: Result<T>, operation: &str) {
        match result {
            Err(QueueError::StateMismatch { operation: op, .. }) => assert_eq!(op, operation),
            other => panic!("expected StateMismatch for {operation}, got {other:?}"),
        }
    }

    #[test]
    fn unbound_server_rejects_everything_but_bind_and_close() {
        let mut server = server();

        assert_mismatch(server.accept_connections(Wait::Immediate), "accept");
        assert_mismatch(server.poll(Wait::Immediate), "poll");
        assert_mismatch(server.get(Wait::Immediate), "get");
        assert_mismatch(server.get_all(), "get");
        assert_mismatch(server.put("job", Wait::Immediate), "put");
        assert_mismatch(server.put_all("job"), "put");
        assert!(server.local_addr().is_err());
    }

    #[test]
    fn bind_moves_to_ready() {
        let mut server = server();
        server.bind("127.0.0.1", 0).unwrap();

        assert_eq!(server.state(), ServerState::Ready);
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_mismatch(server.bind("127.0.0.1", 0), "bind");
    }

    #[test]
    fn ready_server_has_no_peers_to_talk_to() {
        let mut server = server();
        server.bind("127.0.0.1", 0).unwrap();

        assert!(matches!(server.put("job", Wait::Immediate), Err(QueueError::Full { .. })));
        assert_mismatch(server.get(Wait::Immediate), "get");
        assert_mismatch(server.poll(Wait::Immediate), "poll");
        assert_eq!(server.accept_connections(Wait::Immediate).unwrap(), 0);
    }

    #[test]
    fn close_is_terminal() {
        let mut server = server();
        server.bind("127.0.0.1", 0).unwrap();
        server.close().unwrap();

        assert_eq!(server.state(), ServerState::Closed);
        assert_mismatch(server.close(), "close");
        assert_mismatch(server.bind("127.0.0.1", 0), "bind");
    }
}
