//! Matchmaking state: the waiting queue and the pairing table.
//!
//! Both structures live in one [`MatchState`] so that a single lock covers
//! every transition. Nothing here sends messages; the engine decides what
//! to tell whom.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::registry::ConnectionId;

/// FIFO of connections waiting for a partner. Each id appears at most once.
#[derive(Debug, Default, Clone)]
pub struct WaitingQueue {
    entries: VecDeque<ConnectionId>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains(&id)
    }

    /// Oldest waiting connection, if any
    pub fn head(&self) -> Option<ConnectionId> {
        self.entries.front().copied()
    }

    pub fn pop_head(&mut self) -> Option<ConnectionId> {
        self.entries.pop_front()
    }

    /// Append to the tail. Returns false if the id was already queued.
    pub fn push(&mut self, id: ConnectionId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.entries.push_back(id);
        true
    }

    /// Remove every occurrence of `id`. Returns true if anything was removed.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|&queued| queued != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.entries.iter().copied()
    }
}

/// Symmetric partner mapping. Entries are only ever written and removed in pairs.
#[derive(Debug, Default, Clone)]
pub struct PairingTable {
    partners: HashMap<ConnectionId, ConnectionId>,
}

impl PairingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partner_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.partners.get(&id).copied()
    }

    pub fn is_paired(&self, id: ConnectionId) -> bool {
        self.partners.contains_key(&id)
    }

    /// Write both directions of a pair.
    pub fn pair(&mut self, a: ConnectionId, b: ConnectionId) {
        self.partners.insert(a, b);
        self.partners.insert(b, a);
    }

    /// Remove `id` and its partner's back-reference. Returns the former partner.
    pub fn unpair(&mut self, id: ConnectionId) -> Option<ConnectionId> {
        let partner = self.partners.remove(&id)?;
        // Only drop the back-reference if it still points at us
        if self.partners.get(&partner) == Some(&id) {
            self.partners.remove(&partner);
        }
        Some(partner)
    }

    /// Number of pairs (half the number of entries)
    pub fn pair_count(&self) -> usize {
        self.partners.len() / 2
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, ConnectionId)> + '_ {
        self.partners.iter().map(|(&a, &b)| (a, b))
    }
}

/// A broken structural invariant of [`MatchState`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("connection {0} is paired with itself")]
    SelfPair(ConnectionId),

    #[error("connection {a} points at {b}, but {b} does not point back")]
    Asymmetric { a: ConnectionId, b: ConnectionId },

    #[error("connection {0} is both queued and paired")]
    QueuedWhilePaired(ConnectionId),

    #[error("connection {0} is queued more than once")]
    DuplicateQueueEntry(ConnectionId),
}

/// Everything the engine mutates, guarded as one unit.
#[derive(Debug, Default, Clone)]
pub struct MatchState {
    pub waiting: WaitingQueue,
    pub pairs: PairingTable,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify queue uniqueness, pairing symmetry, no self-pairing and
    /// queue/table disjointness.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut seen = std::collections::HashSet::new();
        for id in self.waiting.iter() {
            if !seen.insert(id) {
                return Err(InvariantViolation::DuplicateQueueEntry(id));
            }
            if self.pairs.is_paired(id) {
                return Err(InvariantViolation::QueuedWhilePaired(id));
            }
        }

        for (a, b) in self.pairs.iter() {
            if a == b {
                return Err(InvariantViolation::SelfPair(a));
            }
            if self.pairs.partner_of(b) != Some(a) {
                return Err(InvariantViolation::Asymmetric { a, b });
            }
        }

        Ok(())
    }
}
