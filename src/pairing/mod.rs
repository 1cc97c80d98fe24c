//! Matchmaking state machine and signal relay.

pub mod engine;
pub mod state;

pub use engine::{
    CleanupOutcome, EngineStats, EngineStatsSnapshot, MatchEngine, MatchOutcome, RelayPolicy,
};
pub use state::{InvariantViolation, MatchState, PairingTable, WaitingQueue};
