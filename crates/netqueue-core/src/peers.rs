//! Peer arena.
//!
//! Peers live in slots addressed by a [`PeerId`]. Removing a peer frees its
//! slot and bumps the slot's generation, so a stale id never resolves to a
//! newcomer that reused the slot. Join order is tracked separately and drives
//! round-robin selection.

use std::{collections::VecDeque, fmt, net::SocketAddr};

use mio::Token;

use crate::connection::Connection;

/// Stable handle to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId {
    slot: usize,
    generation: u32,
}

impl PeerId {
    /// Arena slot, also the peer's multiplexer token.
    pub fn slot(self) -> usize {
        self.slot
    }

    pub(crate) fn token(self) -> Token {
        Token(self.slot)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}.{}", self.slot, self.generation)
    }
}

/// A connected child as seen by the server.
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    conn: Connection,
    status: Option<String>,
}

impl Peer {
    pub(crate) fn new(id: PeerId, conn: Connection) -> Self {
        Self { id, conn, status: None }
    }

    /// Handle of this peer.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Remote address.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.conn.peer_addr()
    }

    /// Latest STATUS string the peer reported.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub(crate) fn set_status(&mut self, status: String) {
        self.status = Some(status);
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

#[derive(Debug)]
struct Slot<P> {
    generation: u32,
    value: Option<P>,
}

/// Arena of peers with join-order tracking.
#[derive(Debug)]
pub struct PeerSet<P = Peer> {
    slots: Vec<Slot<P>>,
    free: Vec<usize>,
    order: VecDeque<PeerId>,
}

impl<P> Default for PeerSet<P> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), order: VecDeque::new() }
    }
}

impl<P> PeerSet<P> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if there are no peers.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// True if `id` refers to a live peer.
    pub fn contains(&self, id: PeerId) -> bool {
        self.get(id).is_some()
    }

    /// Look up a live peer.
    pub fn get(&self, id: PeerId) -> Option<&P> {
        self.slots
            .get(id.slot)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: PeerId) -> Option<&mut P> {
        self.slots
            .get_mut(id.slot)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Peer ids in rotation order (join order until [`Self::rotate`] runs).
    pub fn ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.order.iter().copied()
    }

    /// Peers in rotation order.
    pub fn iter(&self) -> impl Iterator<Item = &P> + '_ {
        self.order.iter().filter_map(|id| self.get(*id))
    }

    /// Move the front peer to the back and return it.
    pub fn rotate(&mut self) -> Option<PeerId> {
        let id = self.order.pop_front()?;
        self.order.push_back(id);
        Some(id)
    }

    /// Id of whoever occupies the slot behind `token`.
    pub(crate) fn id_for_token(&self, token: Token) -> Option<PeerId> {
        let slot = self.slots.get(token.0)?;
        slot.value.as_ref().map(|_| PeerId { slot: token.0, generation: slot.generation })
    }

    pub(crate) fn insert_with(&mut self, make: impl FnOnce(PeerId) -> P) -> PeerId {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot { generation: 0, value: None });
                self.slots.len() - 1
            },
        };

        let id = PeerId { slot, generation: self.slots[slot].generation };
        self.slots[slot].value = Some(make(id));
        self.order.push_back(id);
        id
    }

    pub(crate) fn remove(&mut self, id: PeerId) -> Option<P> {
        let slot = self.slots.get_mut(id.slot).filter(|slot| slot.generation == id.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.order.retain(|other| *other != id);
        Some(value)
    }

    pub(crate) fn drain(&mut self) -> Vec<P> {
        let ids: Vec<PeerId> = self.order.iter().copied().collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}
