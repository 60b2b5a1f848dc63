//! Client end of a queue: one link to a parent.
//!
//! The client receives jobs as ENQUEUE frames from its parent and sends
//! responses back with [`QueueClient::put`].
//!
//! # Handlers
//!
//! | Frame   | Action                                           |
//! |---------|--------------------------------------------------|
//! | CONN    | announce status from the [`StatusProvider`]      |
//! | DISCONN | close without signalling                         |
//! | STATUS  | [`Telemetry::on_status`]                         |
//! | PING    | reply PONG                                       |
//! | PONG    | [`Telemetry::on_pong`]                           |
//! | ENQUEUE | append items to the inbound queue                |

use std::{
    collections::VecDeque,
    net::{TcpStream as StdStream, ToSocketAddrs},
};

use bytes::Bytes;
use mio::{Interest, Token, net::TcpStream};
use netqueue_proto::{Message, MsgType};
use tracing::{debug, info, warn};

use crate::{
    Item,
    config::NodeConfig,
    connection::{Connection, Inbound},
    error::{QueueError, Result},
    hooks::{LogTelemetry, NoStatus, Origin, StatusProvider, Telemetry},
    outgoing::Outgoing,
    reactor::Reactor,
    state::{ClientState, Lifecycle, require},
    wait::{Budget, Wait},
};

const PARENT: Token = Token(0);

/// Client end of a networked queue.
pub struct QueueClient {
    state: ClientState,
    config: NodeConfig,
    reactor: Reactor,
    conn: Option<Connection>,
    inbound: VecDeque<Item>,
    status: Box<dyn StatusProvider>,
    telemetry: Box<dyn Telemetry>,
}

impl QueueClient {
    /// Create an unconnected client.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let reactor = Reactor::new(config.event_capacity)?;
        Ok(Self {
            state: ClientState::Inactive,
            config,
            reactor,
            conn: None,
            inbound: VecDeque::new(),
            status: Box::new(NoStatus),
            telemetry: Box::new(LogTelemetry),
        })
    }

    /// Status announced after the parent acknowledges the connection.
    #[must_use]
    pub fn with_status(mut self, status: impl StatusProvider + 'static) -> Self {
        self.status = Box::new(status);
        self
    }

    /// Observer for STATUS and PONG frames from the parent.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: impl Telemetry + 'static) -> Self {
        self.telemetry = Box::new(telemetry);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Items received but not yet taken.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Connect to a parent and announce ourselves with CONN.
    ///
    /// Each resolved address is tried in turn with the configured connect
    /// timeout.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        require(self.state, &[ClientState::Inactive], "connect")?;

        let stream = self.dial(host, port)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        let mut conn = Connection::new(TcpStream::from_std(stream), &self.config);
        self.reactor.register(&mut conn, PARENT, Interest::READABLE)?;
        self.conn = Some(conn);
        self.state = ClientState::Connected;
        info!(host, port, "connected to parent");

        self.send(Message::Conn.encode()?)
    }

    fn dial(&self, host: &str, port: u16) -> Result<StdStream> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match StdStream::connect_timeout(&addr, self.config.connect_timeout()) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                },
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("{host}:{port} resolved to no addresses"),
                )
            })
            .into())
    }

    /// Wait for the parent link to become readable, then service one frame.
    ///
    /// Returns the type of the frame serviced, or `None` if nothing arrived
    /// within `wait`.
    pub fn poll(&mut self, wait: Wait) -> Result<Option<MsgType>> {
        require(self.state, &[ClientState::Connected], "poll")?;

        let Some(conn) = self.conn.as_mut() else {
            return Err(QueueError::StateMismatch { operation: "poll", state: "detached" });
        };

        if !conn.has_input() {
            for ready in self.reactor.wait(wait)? {
                if ready.token != PARENT {
                    continue;
                }
                if ready.readable {
                    conn.fill()?;
                }
                if ready.writable {
                    conn.flush()?;
                }
            }
        }

        self.service()
    }

    fn service(&mut self) -> Result<Option<MsgType>> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(None);
        };

        let frame = match conn.next_frame() {
            Ok(Inbound::Frame(frame)) => frame,
            Ok(Inbound::Pending) => return Ok(None),
            Ok(Inbound::Closed) => {
                warn!("parent closed the connection without DISCONN");
                self.teardown();
                return Err(QueueError::ConnectionLost { missing: 0 });
            },
            Err(QueueError::UnrecognizedMessageType(raw)) => {
                warn!(msg_type = raw, "dropping frame of unknown type from parent");
                return Ok(None);
            },
            Err(err) => {
                warn!(error = %err, "parent link failed");
                self.teardown();
                return Err(err);
            },
        };

        let msg_type = frame.msg_type();
        match Message::from_frame(&frame) {
            Ok(message) => self.handle(message)?,
            Err(err) => warn!(%msg_type, error = %err, "dropping undecodable frame from parent"),
        }
        Ok(Some(msg_type))
    }

    fn handle(&mut self, message: Message) -> Result<()> {
        debug!(msg_type = %message.msg_type(), "frame from parent");
        match message {
            Message::Conn => {
                if let Some(status) = self.status.status() {
                    self.send(Message::Status(status).encode()?)?;
                }
            },
            Message::Disconn => {
                info!("parent disconnected");
                self.teardown();
            },
            Message::Status(status) => self.telemetry.on_status(Origin::Parent, &status),
            Message::Ping => self.send(Message::Pong.encode()?)?,
            Message::Pong => self.telemetry.on_pong(Origin::Parent),
            Message::Enqueue(items) => self.inbound.push_back(items),
        }
        Ok(())
    }

    /// Take the oldest item, failing with [`QueueError::Empty`] if none
    /// arrives within `wait`.
    pub fn get(&mut self, wait: Wait) -> Result<Item> {
        self.get_or_none(wait)?.ok_or(QueueError::Empty)
    }

    /// Take the oldest item, or `None` if none arrives within `wait`.
    ///
    /// Frames already buffered are serviced without spending the wait.
    pub fn get_or_none(&mut self, wait: Wait) -> Result<Option<Item>> {
        let mut budget = Budget::new(wait);
        loop {
            require(self.state, &[ClientState::Connected], "get")?;
            if let Some(item) = self.inbound.pop_front() {
                return Ok(Some(item));
            }
            if self.has_buffered() {
                self.service()?;
                continue;
            }
            match budget.next_wait() {
                Some(slice) => self.poll(slice)?,
                None => return Ok(None),
            };
        }
    }

    /// Put an item back at the front of the inbound queue, so the next `get`
    /// returns it.
    pub fn requeue(&mut self, item: Item) {
        self.inbound.push_front(item);
    }

    /// Poll once without waiting, then take everything queued.
    pub fn get_all(&mut self) -> Result<Vec<Item>> {
        require(self.state, &[ClientState::Connected], "get")?;
        self.poll(Wait::Immediate)?;
        while self.state == ClientState::Connected && self.has_buffered() {
            self.service()?;
        }
        Ok(self.inbound.drain(..).collect())
    }

    fn has_buffered(&self) -> bool {
        self.conn.as_ref().is_some_and(Connection::has_input)
    }

    /// Send to the parent, blocking until the whole frame is written.
    pub fn put(&mut self, message: impl Into<Outgoing>) -> Result<()> {
        require(self.state, &[ClientState::Connected], "put")?;
        let wire = message.into().into_wire()?;
        self.send(wire)
    }

    /// Send a PING to the parent.
    pub fn ping(&mut self) -> Result<()> {
        self.put(Message::Ping)
    }

    fn send(&mut self, wire: Bytes) -> Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(QueueError::StateMismatch { operation: "send", state: self.state.name() });
        };

        conn.queue(&wire);
        if conn.flush()? {
            return Ok(());
        }

        // Kernel buffer full: wait for write readiness, keeping any input
        self.reactor.reregister(conn, PARENT, Interest::READABLE | Interest::WRITABLE)?;
        loop {
            let mut done = false;
            for ready in self.reactor.wait(Wait::Forever)? {
                if ready.token != PARENT {
                    continue;
                }
                if ready.readable {
                    conn.fill()?;
                }
                if ready.writable && conn.flush()? {
                    done = true;
                }
            }
            if done {
                break;
            }
        }
        self.reactor.reregister(conn, PARENT, Interest::READABLE)?;
        Ok(())
    }

    /// Close the link, optionally telling the parent with DISCONN first.
    pub fn close(&mut self, signal_disconnect: bool) -> Result<()> {
        require(self.state, &[ClientState::Inactive, ClientState::Connected], "close")?;

        let signalled = if signal_disconnect && self.state == ClientState::Connected {
            self.send(Message::Disconn.encode()?)
        } else {
            Ok(())
        };

        self.teardown();
        info!("client closed");
        signalled
    }

    fn teardown(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(err) = self.reactor.deregister(&mut conn) {
                debug!(error = %err, "deregister failed during teardown");
            }
            conn.shutdown();
        }
        self.state = ClientState::Closed;
    }
}

impl std::fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueClient")
            .field("state", &self.state)
            .field("peer", &self.conn.as_ref().and_then(Connection::peer_addr))
            .field("pending", &self.inbound.len())
            .finish_non_exhaustive()
    }
}
