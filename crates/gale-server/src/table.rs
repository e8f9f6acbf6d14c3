//! The peer table: authoritative endpoint-to-engine mapping with a
//! two-phase removal protocol.
//!
//! Removals are staged while dispatch or housekeeping may still be walking
//! the table and applied afterwards, so membership changes never invalidate
//! an active traversal. A staged ("condemned") entry stays visible to
//! lookups for the remainder of the tick, but callers must not schedule new
//! work for it.

use std::{collections::HashMap, net::SocketAddr};

use gale_core::error::{ErrorKind, Result};

/// Mapping from remote endpoint to live peer engine, bounded by a fixed
/// capacity. The single source of truth for "is this endpoint connected".
#[derive(Debug)]
pub struct PeerTable<E> {
    peers: HashMap<SocketAddr, E>,
    staged_removals: Vec<SocketAddr>,
    capacity: usize,
}

impl<E> PeerTable<E> {
    /// Creates an empty table bounded by `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            peers: HashMap::with_capacity(capacity),
            staged_removals: Vec::new(),
            capacity,
        }
    }

    /// Inserts an engine for an endpoint.
    ///
    /// Fails with [`ErrorKind::CapacityExceeded`] when the table is at its
    /// bound or the endpoint is already tracked.
    pub fn insert(&mut self, address: SocketAddr, engine: E) -> Result<()> {
        if self.peers.len() >= self.capacity || self.peers.contains_key(&address) {
            return Err(ErrorKind::CapacityExceeded);
        }
        self.peers.insert(address, engine);
        Ok(())
    }

    /// Returns true if the endpoint is tracked (staged entries included).
    pub fn contains(&self, address: &SocketAddr) -> bool {
        self.peers.contains_key(address)
    }

    /// Looks up the engine for an endpoint.
    pub fn get(&self, address: &SocketAddr) -> Option<&E> {
        self.peers.get(address)
    }

    /// Looks up the engine for an endpoint, mutably.
    pub fn get_mut(&mut self, address: &SocketAddr) -> Option<&mut E> {
        self.peers.get_mut(address)
    }

    /// Returns the number of tracked peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns true if no peers are tracked.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Returns the capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of all tracked endpoints, staged entries included.
    /// Order carries no meaning.
    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.peers.keys().copied().collect()
    }

    /// Iterates over all tracked peers.
    pub fn iter(&self) -> impl Iterator<Item = (&SocketAddr, &E)> {
        self.peers.iter()
    }

    /// Returns true if the endpoint is condemned: still visible to lookups
    /// but awaiting removal at the end of the tick.
    pub fn is_staged(&self, address: &SocketAddr) -> bool {
        self.staged_removals.contains(address)
    }

    /// Marks an endpoint for eviction. Idempotent: staging an endpoint that
    /// is already staged (or not tracked at all) has no effect.
    pub fn stage_removal(&mut self, address: SocketAddr) {
        if self.peers.contains_key(&address) && !self.is_staged(&address) {
            self.staged_removals.push(address);
        }
    }

    /// Removes every staged endpoint and hands back ownership of its
    /// engine. Must only be called outside any active traversal; this is
    /// the single point where an engine's ownership ends.
    pub fn apply_staged_removals(&mut self) -> Vec<(SocketAddr, E)> {
        let mut removed = Vec::with_capacity(self.staged_removals.len());
        for address in self.staged_removals.drain(..) {
            if let Some(engine) = self.peers.remove(&address) {
                removed.push((address, engine));
            }
        }
        removed
    }

    /// Drops every peer and staged removal unconditionally. Used for
    /// shutdown and fatal transport errors, where no traversal is active.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.staged_removals.clear();
    }
}
