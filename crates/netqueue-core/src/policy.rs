//! Dispatch policies.
//!
//! A server asks its policy which peer should receive each single-target
//! message, and whether a given peer can take one right now. Readiness is
//! entirely policy-defined; the server only wraps it in the bounded-wait
//! contract of `put_to`.

use rand::{SeedableRng, rngs::StdRng, seq::IteratorRandom};

use crate::peers::{Peer, PeerId, PeerSet};

/// Chooses dispatch targets among a server's peers.
pub trait DispatchPolicy: Send {
    /// Peer for the next single-target message, `None` if there is none.
    fn choose(&mut self, peers: &mut PeerSet) -> Option<PeerId>;

    /// Whether `peer` can take a message now. Defaults to always.
    fn is_ready(&self, peer: &Peer) -> bool {
        let _ = peer;
        true
    }
}

/// Cycle through peers in join order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl DispatchPolicy for RoundRobin {
    fn choose(&mut self, peers: &mut PeerSet) -> Option<PeerId> {
        peers.rotate()
    }
}

/// Pick a peer uniformly at random.
#[derive(Debug, Clone)]
pub struct RandomChoice {
    rng: StdRng,
}

impl RandomChoice {
    /// Seeded from OS entropy.
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Deterministic sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for RandomChoice {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchPolicy for RandomChoice {
    fn choose(&mut self, peers: &mut PeerSet) -> Option<PeerId> {
        peers.ids().choose(&mut self.rng)
    }
}

impl<P: DispatchPolicy + ?Sized> DispatchPolicy for Box<P> {
    fn choose(&mut self, peers: &mut PeerSet) -> Option<PeerId> {
        (**self).choose(peers)
    }

    fn is_ready(&self, peer: &Peer) -> bool {
        (**self).is_ready(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_yields_no_target() {
        let mut peers = PeerSet::new();
        assert_eq!(RoundRobin.choose(&mut peers), None);
        assert_eq!(RandomChoice::seeded(3).choose(&mut peers), None);
    }
}
