//! A single peer socket.
//!
//! Sockets are non-blocking and readiness is edge-triggered, so a readable
//! event must drain the socket. [`Connection::fill`] reads everything
//! available into an inbound buffer and [`Connection::next_frame`] hands back
//! one complete frame at a time. Writes go through an outbound buffer that the
//! owning node flushes, waiting for write readiness if the kernel pushes back.

use std::{
    io::{self, Read, Write},
    net::SocketAddr,
};

use bytes::{Buf, BytesMut};
use mio::{Interest, Registry, Token, event::Source, net::TcpStream};
use netqueue_proto::{Frame, FrameHeader, ProtocolError};

use crate::{
    config::NodeConfig,
    error::{QueueError, Result},
};

/// Result of asking a connection for its next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete frame
    Frame(Frame),
    /// Nothing complete buffered yet
    Pending,
    /// Peer closed the socket at a frame boundary
    Closed,
}

/// Owned TCP stream plus its read and write buffers.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    inbox: BytesMut,
    outbox: BytesMut,
    chunk_size: usize,
    max_frame_size: usize,
    eof: bool,
}

impl Connection {
    /// Wrap a connected, non-blocking stream.
    pub fn new(stream: TcpStream, config: &NodeConfig) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream,
            peer_addr,
            inbox: BytesMut::with_capacity(config.max_frame_chunk_size),
            outbox: BytesMut::new(),
            chunk_size: config.max_frame_chunk_size.max(1),
            max_frame_size: config.max_frame_size,
            eof: false,
        }
    }

    /// Remote address, if the OS reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Whether the peer has closed its side.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Read everything the socket has, `chunk_size` bytes at a time.
    ///
    /// Returns the number of bytes read. A reset is treated like an orderly
    /// close: both end the byte stream.
    pub fn fill(&mut self) -> io::Result<usize> {
        let mut total = 0;
        while !self.eof {
            let start = self.inbox.len();
            self.inbox.resize(start + self.chunk_size, 0);

            match self.stream.read(&mut self.inbox[start..]) {
                Ok(0) => {
                    self.inbox.truncate(start);
                    self.eof = true;
                },
                Ok(n) => {
                    self.inbox.truncate(start + n);
                    total += n;
                },
                Err(err) => {
                    self.inbox.truncate(start);
                    match err.kind() {
                        io::ErrorKind::WouldBlock => break,
                        io::ErrorKind::Interrupted => {},
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                            self.eof = true;
                        },
                        _ => return Err(err),
                    }
                },
            }
        }
        Ok(total)
    }

    /// True if [`Self::next_frame`] would return something other than
    /// `Pending`.
    pub fn has_input(&self) -> bool {
        if self.eof {
            return true;
        }
        match FrameHeader::declared_length(&self.inbox) {
            None => false,
            Some(length) => {
                FrameHeader::validate_length(length, self.max_frame_size).is_err()
                    || self.inbox.len() >= FrameHeader::LENGTH_SIZE + length as usize
            },
        }
    }

    /// Take the next complete frame from the inbound buffer.
    ///
    /// # Errors
    ///
    /// - `UnrecognizedMessageType`: frame consumed, stream still usable
    /// - `ConnectionLost`: peer closed mid-frame
    /// - `Protocol`: declared length out of bounds, stream unusable
    pub fn next_frame(&mut self) -> Result<Inbound> {
        let Some(length) = FrameHeader::declared_length(&self.inbox) else {
            return match (self.eof, self.inbox.is_empty()) {
                (false, _) => Ok(Inbound::Pending),
                (true, true) => Ok(Inbound::Closed),
                (true, false) => Err(QueueError::ConnectionLost {
                    missing: FrameHeader::LENGTH_SIZE - self.inbox.len(),
                }),
            };
        };

        FrameHeader::validate_length(length, self.max_frame_size)?;

        let total = FrameHeader::LENGTH_SIZE + length as usize;
        if self.inbox.len() < total {
            return if self.eof {
                Err(QueueError::ConnectionLost { missing: total - self.inbox.len() })
            } else {
                Ok(Inbound::Pending)
            };
        }

        let bytes = self.inbox.split_to(total).freeze();
        match Frame::decode_owned(bytes) {
            Ok(frame) => Ok(Inbound::Frame(frame)),
            Err(ProtocolError::UnknownMessageType(raw)) => {
                Err(QueueError::UnrecognizedMessageType(raw))
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Append encoded bytes to the outbound buffer.
    pub fn queue(&mut self, bytes: &[u8]) {
        self.outbox.extend_from_slice(bytes);
    }

    /// Write as much of the outbound buffer as the socket accepts.
    ///
    /// Returns `true` once the buffer is empty.
    pub fn flush(&mut self) -> io::Result<bool> {
        while !self.outbox.is_empty() {
            match self.stream.write(&self.outbox) {
                Ok(0) => {
                    let err = io::Error::new(io::ErrorKind::WriteZero, "socket accepted no bytes");
                    return Err(err);
                },
                Ok(n) => self.outbox.advance(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {},
                Err(err) => return Err(err),
            }
        }
        Ok(true)
    }

    /// Bytes still waiting to be written.
    pub fn pending_writes(&self) -> usize {
        self.outbox.len()
    }

    /// Shut both directions down. Errors are ignored; the socket may already
    /// be gone.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl Source for Connection {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{TcpListener, TcpStream as StdStream},
        thread,
        time::Duration,
    };

    use netqueue_proto::{Message, MsgType};

    use super::*;

    /// Accepted side wrapped as a `Connection`, plus the raw remote end.
    fn pair(config: &NodeConfig) -> (Connection, StdStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let remote = StdStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (Connection::new(TcpStream::from_std(accepted), config), remote)
    }

    /// Fill until `cond` holds; loopback delivery is fast but not instant.
    fn fill_until(conn: &mut Connection, cond: impl Fn(&Connection) -> bool) {
        for _ in 0..100 {
            conn.fill().unwrap();
            if cond(conn) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn frames_split_across_reads_are_reassembled() {
        let config = NodeConfig { max_frame_chunk_size: 3, ..Default::default() };
        let (mut conn, mut remote) = pair(&config);

        let wire = Message::enqueue(["job-1", "job-2"]).encode().unwrap();
        remote.write_all(&wire[..5]).unwrap();
        fill_until(&mut conn, |c| c.inbox.len() == 5);
        assert!(!conn.has_input());
        assert_eq!(conn.next_frame().unwrap(), Inbound::Pending);

        remote.write_all(&wire[5..]).unwrap();
        fill_until(&mut conn, Connection::has_input);
        match conn.next_frame().unwrap() {
            Inbound::Frame(frame) => {
                let message = Message::from_frame(&frame).unwrap();
                assert_eq!(message, Message::enqueue(["job-1", "job-2"]));
            },
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn two_frames_in_one_read_come_out_one_at_a_time() {
        let (mut conn, mut remote) = pair(&NodeConfig::default());
        let mut wire = Message::Ping.encode().unwrap().to_vec();
        wire.extend_from_slice(&Message::Pong.encode().unwrap());
        remote.write_all(&wire).unwrap();

        fill_until(&mut conn, |c| c.inbox.len() == 12);
        let first = conn.next_frame().unwrap();
        assert_eq!(first, Inbound::Frame(Frame::empty(MsgType::Ping)));
        assert!(conn.has_input());
        let second = conn.next_frame().unwrap();
        assert_eq!(second, Inbound::Frame(Frame::empty(MsgType::Pong)));
        assert_eq!(conn.next_frame().unwrap(), Inbound::Pending);
    }

    #[test]
    fn close_at_boundary_is_clean() {
        let (mut conn, remote) = pair(&NodeConfig::default());
        drop(remote);

        fill_until(&mut conn, Connection::is_eof);
        assert_eq!(conn.next_frame().unwrap(), Inbound::Closed);
    }

    #[test]
    fn close_mid_frame_is_connection_lost() {
        let (mut conn, mut remote) = pair(&NodeConfig::default());
        remote.write_all(&[0, 0, 0, 10, 0, 6, b'a']).unwrap();
        drop(remote);

        fill_until(&mut conn, Connection::is_eof);
        let err = conn.next_frame().unwrap_err();
        assert!(matches!(err, QueueError::ConnectionLost { missing: 7 }));
    }

    #[test]
    fn unknown_type_consumed_and_reported() {
        let (mut conn, mut remote) = pair(&NodeConfig::default());
        remote.write_all(&[0, 0, 0, 2, 0, 99]).unwrap();
        remote.write_all(&Message::Ping.encode().unwrap()).unwrap();

        fill_until(&mut conn, |c| c.inbox.len() == 12);
        assert!(matches!(conn.next_frame(), Err(QueueError::UnrecognizedMessageType(99))));
        assert_eq!(conn.next_frame().unwrap(), Inbound::Frame(Frame::empty(MsgType::Ping)));
    }

    #[test]
    fn oversized_length_rejected_before_buffering() {
        let config = NodeConfig { max_frame_size: 64, ..Default::default() };
        let (mut conn, mut remote) = pair(&config);
        remote.write_all(&[0, 0, 1, 0]).unwrap();

        fill_until(&mut conn, Connection::has_input);
        let err = conn.next_frame().unwrap_err();
        assert!(matches!(
            err,
            QueueError::Protocol(ProtocolError::FrameTooLarge { size: 256, max: 64 })
        ));
    }

    #[test]
    fn queued_bytes_reach_the_peer() {
        let (mut conn, mut remote) = pair(&NodeConfig::default());
        let wire = Message::Status("idle".into()).encode().unwrap();

        conn.queue(&wire);
        assert_eq!(conn.pending_writes(), wire.len());
        assert!(conn.flush().unwrap());
        assert_eq!(conn.pending_writes(), 0);

        let mut received = vec![0u8; wire.len()];
        remote.read_exact(&mut received).unwrap();
        assert_eq!(received, wire.to_vec());
    }
}
