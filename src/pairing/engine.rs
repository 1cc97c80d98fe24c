//! Matchmaking and relay engine.
//!
//! Purely reactive: every inbound event is applied to [`MatchState`] under a
//! single lock, and any resulting sends are issued through the [`Registry`]
//! before the lock is released. That keeps each event atomic with respect to
//! every other connection and gives each recipient a consistent event order.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use super::state::{InvariantViolation, MatchState};
use crate::error::SignalingError;
use crate::registry::{ConnectionId, Registry};
use crate::signaling::protocol::{InboundEvent, OutboundEvent, Signal};

/// How relay targets are checked before forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayPolicy {
    /// Forward to whatever target the sender names
    #[default]
    Trusting,
    /// Forward only to the sender's current partner
    PairedOnly,
}

impl FromStr for RelayPolicy {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trusting" | "trust" | "open" => Ok(RelayPolicy::Trusting),
            "paired" | "paired_only" | "paired-only" | "strict" => Ok(RelayPolicy::PairedOnly),
            other => Err(SignalingError::Config(format!("Unknown relay policy: {}", other))),
        }
    }
}

/// Result of a match request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Appended to the tail of the waiting queue
    Queued,
    /// Already waiting; nothing changed
    AlreadyQueued,
    /// Already has a partner; nothing changed
    AlreadyPaired,
    /// Paired with the connection that had waited longest
    Matched(ConnectionId),
    /// The queue head was the requester itself; dropped
    SelfMatchRejected,
}

/// What a leave or disconnect cleaned up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupOutcome {
    /// Partner that was notified with `disconnect_peer`
    pub former_partner: Option<ConnectionId>,
    /// Whether the connection was removed from the waiting queue
    pub was_waiting: bool,
}

/// Engine counters, read through [`MatchEngine::stats`]
#[derive(Default)]
pub struct EngineStats {
    matches_formed: AtomicU64,
    relays_forwarded: AtomicU64,
    relays_dropped: AtomicU64,
    self_match_guard_hits: AtomicU64,
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStatsSnapshot {
    pub waiting: usize,
    pub pairs: usize,
    pub matches_formed: u64,
    pub relays_forwarded: u64,
    pub relays_dropped: u64,
    pub self_match_guard_hits: u64,
}

/// Owns the matchmaking state and routes events through a [`Registry`].
pub struct MatchEngine<R: Registry> {
    state: Mutex<MatchState>,
    registry: Arc<R>,
    policy: RelayPolicy,
    stats: EngineStats,
}

impl<R: Registry> MatchEngine<R> {
    pub fn new(registry: Arc<R>, policy: RelayPolicy) -> Self {
        Self {
            state: Mutex::new(MatchState::new()),
            registry,
            policy,
            stats: EngineStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn policy(&self) -> RelayPolicy {
        self.policy
    }

    /// Dispatch one decoded inbound event from `from`.
    pub fn handle(&self, from: ConnectionId, event: InboundEvent) {
        match event {
            InboundEvent::FindMatch => {
                self.request_match(from);
            }
            InboundEvent::Next => {
                self.next(from);
            }
            relay => {
                if let Some(signal) = relay.into_signal() {
                    self.relay(from, signal);
                }
            }
        }
    }

    /// Enqueue `c`, or pair it with the longest-waiting connection.
    pub fn request_match(&self, c: ConnectionId) -> MatchOutcome {
        let mut state = self.state.lock();
        self.request_match_locked(&mut state, c)
    }

    fn request_match_locked(&self, state: &mut MatchState, c: ConnectionId) -> MatchOutcome {
        if state.waiting.contains(c) {
            debug!("Connection {} is already in the queue", c);
            return MatchOutcome::AlreadyQueued;
        }

        if let Some(partner) = state.pairs.partner_of(c) {
            warn!(
                "Connection {} requested a match while paired with {}; ignoring",
                c, partner
            );
            return MatchOutcome::AlreadyPaired;
        }

        let Some(head) = state.waiting.head() else {
            state.waiting.push(c);
            info!("Connection {} added to waiting queue", c);
            return MatchOutcome::Queued;
        };

        if head == c {
            // Unreachable while the queue check above holds
            self.stats.self_match_guard_hits.fetch_add(1, Ordering::Relaxed);
            warn!("Skipping self-match for {}", c);
            return MatchOutcome::SelfMatchRejected;
        }

        let partner = head;
        state.waiting.pop_head();
        state.pairs.pair(c, partner);
        self.stats.matches_formed.fetch_add(1, Ordering::Relaxed);
        info!("Matching {} with {}", c, partner);

        self.registry.send(c, OutboundEvent::MatchFound(partner));
        self.registry.send(partner, OutboundEvent::MatchFound(c));

        MatchOutcome::Matched(partner)
    }

    /// Forward an offer, answer or candidate to its target.
    ///
    /// Returns true if the event was handed to the registry.
    pub fn relay(&self, from: ConnectionId, signal: Signal) -> bool {
        let Signal { kind, target, blob } = signal;

        if blob.is_null() {
            debug!("Dropping {} from {}: empty payload", kind.as_str(), from);
            self.stats.relays_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let state = self.state.lock();

        if self.policy == RelayPolicy::PairedOnly && state.pairs.partner_of(from) != Some(target) {
            warn!(
                "Rejected {} from {} to {}: not its partner",
                kind.as_str(),
                from,
                target
            );
            self.stats.relays_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if !self.registry.is_open(target) {
            debug!(
                "Dropping {} from {} to {}: target not connected",
                kind.as_str(),
                from,
                target
            );
            self.stats.relays_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        debug!("{} sent from {} to {}", kind.as_str(), from, target);
        self.registry
            .send(target, OutboundEvent::signal(kind, from, blob));
        self.stats.relays_forwarded.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Leave the current pair and immediately look for a new partner.
    pub fn next(&self, c: ConnectionId) -> (CleanupOutcome, MatchOutcome) {
        let mut state = self.state.lock();
        let cleanup = self.cleanup_locked(&mut state, c);
        if let Some(partner) = cleanup.former_partner {
            info!("Connection {} skipped {}", c, partner);
        }
        let rematch = self.request_match_locked(&mut state, c);
        (cleanup, rematch)
    }

    /// Remove a closed connection from all matchmaking state.
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub fn disconnect(&self, c: ConnectionId) -> CleanupOutcome {
        let mut state = self.state.lock();
        let cleanup = self.cleanup_locked(&mut state, c);
        if let Some(partner) = cleanup.former_partner {
            info!("Connection {} disconnected; notified {}", c, partner);
        }
        cleanup
    }

    fn cleanup_locked(&self, state: &mut MatchState, c: ConnectionId) -> CleanupOutcome {
        let former_partner = state.pairs.unpair(c);
        if let Some(partner) = former_partner {
            self.registry.send(partner, OutboundEvent::PeerDisconnected);
        }
        let was_waiting = state.waiting.remove(c);
        CleanupOutcome {
            former_partner,
            was_waiting,
        }
    }

    pub fn partner_of(&self, c: ConnectionId) -> Option<ConnectionId> {
        self.state.lock().pairs.partner_of(c)
    }

    pub fn is_waiting(&self, c: ConnectionId) -> bool {
        self.state.lock().waiting.contains(c)
    }

    /// Waiting connections, oldest first
    pub fn waiting(&self) -> Vec<ConnectionId> {
        self.state.lock().waiting.iter().collect()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.state.lock().check_invariants()
    }

    #[cfg(test)]
    fn seed_waiting(&self, ids: &[ConnectionId]) {
        let mut state = self.state.lock();
        for &id in ids {
            state.waiting.push(id);
        }
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        let state = self.state.lock();
        EngineStatsSnapshot {
            waiting: state.waiting.len(),
            pairs: state.pairs.pair_count(),
            matches_formed: self.stats.matches_formed.load(Ordering::Relaxed),
            relays_forwarded: self.stats.relays_forwarded.load(Ordering::Relaxed),
            relays_dropped: self.stats.relays_dropped.load(Ordering::Relaxed),
            self_match_guard_hits: self.stats.self_match_guard_hits.load(Ordering::Relaxed),
        }
    }
}
