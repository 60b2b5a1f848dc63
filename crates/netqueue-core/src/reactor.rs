//! Readiness multiplexer.
//!
//! A thin layer over `mio::Poll` that turns one wait into a ready set. Nodes
//! own one reactor per group of sockets (a client has one, a server has one
//! for its listener and one for its peers).

use std::io;

use mio::{Events, Interest, Poll, Token, event::Source};

use crate::{
    error::{QueueError, Result},
    wait::Wait,
};

/// One entry of a ready set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Token the source was registered with
    pub token: Token,
    /// Data (or EOF) can be read
    pub readable: bool,
    /// Buffer space is available for writing
    pub writable: bool,
}

/// Poll instance plus its event buffer.
pub struct Reactor {
    poll: Poll,
    events: Events,
}

impl Reactor {
    /// Create a reactor fetching up to `capacity` events per wait.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self { poll: Poll::new()?, events: Events::with_capacity(capacity) })
    }

    /// Start watching `source`.
    pub fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().register(source, token, interest)
    }

    /// Change the interest of an already registered source.
    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().reregister(source, token, interest)
    }

    /// Stop watching `source`.
    pub fn deregister<S>(&self, source: &mut S) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().deregister(source)
    }

    /// Wait once for readiness.
    ///
    /// Returns an empty set on timeout. A signal arriving during the wait
    /// surfaces as [`QueueError::Interrupted`].
    pub fn wait(&mut self, wait: Wait) -> Result<Vec<Readiness>> {
        match self.poll.poll(&mut self.events, wait.as_poll_timeout()) {
            Ok(()) => {},
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                return Err(QueueError::Interrupted);
            },
            Err(err) => return Err(err.into()),
        }

        Ok(self
            .events
            .iter()
            .map(|event| Readiness {
                token: event.token(),
                // Errors and hang-ups surface through the next read
                readable: event.is_readable() || event.is_read_closed() || event.is_error(),
                writable: event.is_writable(),
            })
            .collect())
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor").field("capacity", &self.events.capacity()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        net::{TcpListener, TcpStream},
        time::Duration,
    };

    use super::*;

    #[test]
    fn immediate_wait_on_idle_socket_is_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        let mut stream = mio::net::TcpStream::from_std(accepted);

        let mut reactor = Reactor::new(8).unwrap();
        reactor.register(&mut stream, Token(3), Interest::READABLE).unwrap();

        let ready = reactor.wait(Wait::Immediate).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn data_makes_token_readable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        let mut stream = mio::net::TcpStream::from_std(accepted);

        let mut reactor = Reactor::new(8).unwrap();
        reactor.register(&mut stream, Token(7), Interest::READABLE).unwrap();

        client.write_all(b"x").unwrap();
        let ready = reactor.wait(Wait::Timeout(Duration::from_secs(2))).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].token, Token(7));
        assert!(ready[0].readable);
    }
}
